use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use relaybot_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use relaybot_core::{
    blocklist::{BlockDocument, BlockList},
    config::Config,
    correlation::{CorrelationDocument, CorrelationStore},
    engine::RoutingEngine,
    messaging::port::MessagingPort,
    store::JsonFileStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<RoutingEngine>,
    pub chat_locks: Arc<ChatLocks>,
}

/// Serializes updates coming from the same chat so a sender's messages are
/// routed in the order they arrived.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

const CHAT_LOCK_SWEEP: usize = 256;

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() >= CHAT_LOCK_SWEEP {
                // Held or awaited locks have a clone outside the map.
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Load both stores from the data directory and build the routing engine on
/// top of `messenger`.
pub async fn build_engine(cfg: &Config, messenger: Arc<dyn MessagingPort>) -> RoutingEngine {
    let blocked = BlockList::load(Arc::new(JsonFileStore::<BlockDocument>::new(
        cfg.blocked_file.clone(),
    )));
    let correlations = CorrelationStore::load(
        Arc::new(JsonFileStore::<CorrelationDocument>::new(cfg.users_file.clone())),
        cfg.retention(),
    );

    tracing::info!(
        blocked = blocked.list_all().await.len(),
        correlations = correlations.len().await,
        data_dir = %cfg.data_dir.display(),
        "stores loaded"
    );

    RoutingEngine::new(
        cfg.engine(),
        Arc::new(blocked),
        Arc::new(correlations),
        messenger,
    )
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), owner = %cfg.owner_id, "relaybot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }

    // Throttle outgoing calls to stay under Telegram flood limits.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let engine = Arc::new(build_engine(&cfg, messenger).await);

    let state = Arc::new(AppState {
        cfg,
        engine,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            tracing::debug!(update_id = upd.id, "unhandled update");
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped");
    Ok(())
}
