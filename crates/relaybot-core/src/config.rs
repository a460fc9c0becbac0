use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    correlation::RetentionPolicy,
    domain::UserId,
    engine::{BlockNotice, EngineConfig},
    errors::Error,
    Result,
};

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub owner_id: UserId,

    // Persistence
    pub data_dir: PathBuf,
    pub blocked_file: PathBuf,
    pub users_file: PathBuf,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_cooldown: Duration,

    // Behavior flags
    pub view_gate: bool,
    pub block_notice: BlockNotice,

    // Correlation retention
    pub correlation_max_entries: usize,
    pub correlation_max_age: Option<Duration>,

    // Health endpoint
    pub health_enabled: bool,
    pub health_addr: SocketAddr,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).and_then(non_empty);

        // Required
        let bot_token = var("BOT_TOKEN")
            .or_else(|| var("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| Error::Config("BOT_TOKEN environment variable is required".to_string()))?;
        let owner_id = var("OWNER_ID")
            .ok_or_else(|| Error::Config("OWNER_ID environment variable is required".to_string()))?
            .parse::<UserId>()
            .map_err(|e| Error::Config(format!("OWNER_ID must be a numeric user id: {e}")))?;

        // Persistence
        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let blocked_file = data_dir.join("blocked.json");
        let users_file = data_dir.join("users.json");

        // Rate limiting (0 disables)
        let cooldown_ms = parse_or(&var, "RATE_LIMIT_COOLDOWN_MS", 2_000u64)?;
        let rate_limit_cooldown = Duration::from_millis(cooldown_ms);
        let rate_limit_enabled = cooldown_ms > 0;

        // Behavior
        let view_gate = parse_bool(&var, "VIEW_GATE", true)?;
        let block_notice = match var("BLOCK_NOTICE").map(|s| s.trim().to_lowercase()) {
            None => BlockNotice::default(),
            Some(s) if s == "explicit" => BlockNotice::Explicit,
            Some(s) if s == "generic" => BlockNotice::Generic,
            Some(other) => {
                return Err(Error::Config(format!(
                    "BLOCK_NOTICE must be `explicit` or `generic`, got `{other}`"
                )))
            }
        };

        // Retention (age 0 = keep forever)
        let correlation_max_entries = parse_or(&var, "CORRELATION_MAX_ENTRIES", 10_000usize)?;
        let max_age_days = parse_or(&var, "CORRELATION_MAX_AGE_DAYS", 30u64)?;
        let correlation_max_age =
            (max_age_days > 0).then(|| Duration::from_secs(max_age_days * 86_400));

        // Health
        let health_enabled = parse_bool(&var, "HEALTH_ENABLED", true)?;
        let health_addr = parse_or(&var, "HEALTH_ADDR", SocketAddr::from(([0, 0, 0, 0], 10_000)))?;

        Ok(Self {
            bot_token,
            owner_id,
            data_dir,
            blocked_file,
            users_file,
            rate_limit_enabled,
            rate_limit_cooldown,
            view_gate,
            block_notice,
            correlation_max_entries,
            correlation_max_age,
            health_enabled,
            health_addr,
        })
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            owner: self.owner_id,
            view_gate: self.view_gate,
            block_notice: self.block_notice,
            rate_limit_enabled: self.rate_limit_enabled,
            cooldown: self.rate_limit_cooldown,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_entries: self.correlation_max_entries,
            max_age: self
                .correlation_max_age
                .and_then(|d| chrono::Duration::from_std(d).ok()),
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| Error::Config(format!("{key}: invalid value `{raw}`: {e}"))),
    }
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    let Some(raw) = var(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected a boolean, got `{raw}`"))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
