use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UserId)
    }
}

/// Telegram chat id (numeric). Private chats share the user's id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl From<UserId> for ChatId {
    fn from(u: UserId) -> Self {
        ChatId(u.0)
    }
}

/// Telegram message id (numeric, unique per chat only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// Who sent an inbound event, as seen by the transport at that moment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderIdentity {
    pub id: UserId,
    pub full_name: String,
    pub username: Option<String>,
}

impl SenderIdentity {
    pub fn new(id: UserId, full_name: impl Into<String>, username: Option<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            username,
        }
    }

    /// `@handle` or `none` for display.
    pub fn handle(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(u) => format!("@{u}"),
            None => "none".to_string(),
        }
    }
}
