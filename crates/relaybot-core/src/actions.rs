//! Inline-button payloads.
//!
//! [`CallbackData`] is what travels inside Telegram's `callback_data`
//! (64-byte limit). [`CallbackAction`] is the structured action the routing
//! engine works with: the wire token combined with the message the button is
//! attached to. Parsing happens once, at the transport boundary.

use std::str::FromStr;

use crate::{correlation::CorrelationKey, domain::MessageRef, domain::UserId};

/// Wire form: `reply`, `view`, `block:<id>`, `unblock:<id>`.
///
/// `reply:<chat>:<msg>` is also accepted so a button can point at a message
/// other than the one it sits under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackData {
    Reply(Option<CorrelationKey>),
    View,
    Block(UserId),
    Unblock(UserId),
}

impl CallbackData {
    pub fn encode(&self) -> String {
        match self {
            CallbackData::Reply(None) => "reply".to_string(),
            CallbackData::Reply(Some(key)) => format!("reply:{key}"),
            CallbackData::View => "view".to_string(),
            CallbackData::Block(id) => format!("block:{id}"),
            CallbackData::Unblock(id) => format!("unblock:{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseActionError {
    #[error("unrecognized callback data: {0}")]
    Unrecognized(String),
    #[error("callback {0} needs the message it is attached to")]
    Detached(String),
}

impl FromStr for CallbackData {
    type Err = ParseActionError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let bad = || ParseActionError::Unrecognized(data.to_string());
        let (verb, rest) = match data.split_once(':') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (data, None),
        };

        match (verb, rest) {
            ("reply", None) => Ok(CallbackData::Reply(None)),
            ("reply", Some(key)) => key
                .parse()
                .map(|k| CallbackData::Reply(Some(k)))
                .map_err(|_| bad()),
            ("view", None) => Ok(CallbackData::View),
            ("block", Some(id)) => id.parse().map(CallbackData::Block).map_err(|_| bad()),
            ("unblock", Some(id)) => id.parse().map(CallbackData::Unblock).map_err(|_| bad()),
            _ => Err(bad()),
        }
    }
}

/// A button press, ready for the routing engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// Owner wants to answer the notification identified by the key.
    Reply(CorrelationKey),
    Block(UserId),
    Unblock(UserId),
    /// Sender opens the answer behind the view prompt identified by the key.
    View(CorrelationKey),
}

impl CallbackAction {
    pub fn from_query(data: &str, attached: Option<MessageRef>) -> Result<Self, ParseActionError> {
        let detached = || ParseActionError::Detached(data.to_string());
        Ok(match data.parse::<CallbackData>()? {
            CallbackData::Reply(Some(key)) => CallbackAction::Reply(key),
            CallbackData::Reply(None) => {
                CallbackAction::Reply(attached.map(CorrelationKey::from).ok_or_else(detached)?)
            }
            CallbackData::View => {
                CallbackAction::View(attached.map(CorrelationKey::from).ok_or_else(detached)?)
            }
            CallbackData::Block(id) => CallbackAction::Block(id),
            CallbackData::Unblock(id) => CallbackAction::Unblock(id),
        })
    }

    /// Whether only the owner may trigger this action.
    pub fn is_owner_only(&self) -> bool {
        !matches!(self, CallbackAction::View(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId};

    fn attached() -> Option<MessageRef> {
        Some(MessageRef::new(ChatId(99), MessageId(7)))
    }

    #[test]
    fn reply_and_view_take_their_key_from_the_attached_message() {
        let key = CorrelationKey::new(ChatId(99), MessageId(7));
        assert_eq!(
            CallbackAction::from_query("reply", attached()),
            Ok(CallbackAction::Reply(key))
        );
        assert_eq!(
            CallbackAction::from_query("view", attached()),
            Ok(CallbackAction::View(key))
        );
        assert!(matches!(
            CallbackAction::from_query("view", None),
            Err(ParseActionError::Detached(_))
        ));
    }

    #[test]
    fn explicit_reply_key_wins_over_attached_message() {
        let key = CorrelationKey::new(ChatId(5), MessageId(6));
        assert_eq!(
            CallbackAction::from_query("reply:5:6", attached()),
            Ok(CallbackAction::Reply(key))
        );
    }

    #[test]
    fn block_and_unblock_carry_the_sender_id() {
        assert_eq!(
            CallbackAction::from_query("block:222", None),
            Ok(CallbackAction::Block(UserId(222)))
        );
        assert_eq!(
            CallbackAction::from_query("unblock:222", attached()),
            Ok(CallbackAction::Unblock(UserId(222)))
        );
    }

    #[test]
    fn encoded_data_parses_back() {
        for data in [
            CallbackData::Reply(None),
            CallbackData::Reply(Some(CorrelationKey::new(ChatId(-1001), MessageId(12)))),
            CallbackData::View,
            CallbackData::Block(UserId(42)),
            CallbackData::Unblock(UserId(42)),
        ] {
            assert_eq!(data.encode().parse::<CallbackData>(), Ok(data));
        }
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "reply:7", "block", "block:abc", "view:1", "askuser:1:2", "seen_1_2"] {
            assert!(
                matches!(raw.parse::<CallbackData>(), Err(ParseActionError::Unrecognized(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn only_view_is_open_to_senders() {
        let key = CorrelationKey::new(ChatId(1), MessageId(1));
        assert!(!CallbackAction::View(key).is_owner_only());
        assert!(CallbackAction::Reply(key).is_owner_only());
        assert!(CallbackAction::Block(UserId(1)).is_owner_only());
    }
}
