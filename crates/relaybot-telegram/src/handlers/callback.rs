use teloxide::types::CallbackQuery;

use relaybot_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::{self, IncomingUpdate},
};

use super::sender_identity;

pub(crate) fn to_update(q: &CallbackQuery) -> IncomingUpdate {
    IncomingUpdate::Callback(types::CallbackQuery {
        sender: sender_identity(&q.from),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message: q
            .message
            .as_ref()
            .map(|m| MessageRef::new(ChatId(m.chat.id.0), MessageId(m.id.0))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybot_core::domain::UserId;
    use serde_json::json;

    fn query(message: Option<serde_json::Value>) -> CallbackQuery {
        let mut q = json!({
            "id": "cb-1",
            "from": { "id": 1, "is_bot": false, "first_name": "Owner" },
            "chat_instance": "ci",
            "data": "reply",
        });
        if let (Some(obj), Some(m)) = (q.as_object_mut(), message) {
            obj.insert("message".to_string(), m);
        }
        serde_json::from_value(q).unwrap()
    }

    #[test]
    fn attached_message_becomes_a_message_ref() {
        let q = query(Some(json!({
            "message_id": 1000,
            "date": 1_700_000_000,
            "chat": { "id": 1, "type": "private", "first_name": "Owner" },
            "text": "New message"
        })));
        let IncomingUpdate::Callback(cb) = to_update(&q) else {
            panic!("expected callback");
        };
        assert_eq!(cb.sender.id, UserId(1));
        assert_eq!(cb.callback_id, "cb-1");
        assert_eq!(cb.data, "reply");
        assert_eq!(cb.message, Some(MessageRef::new(ChatId(1), MessageId(1000))));
    }

    #[test]
    fn inline_mode_queries_have_no_message() {
        let IncomingUpdate::Callback(cb) = to_update(&query(None)) else {
            panic!("expected callback");
        };
        assert_eq!(cb.message, None);
    }
}
