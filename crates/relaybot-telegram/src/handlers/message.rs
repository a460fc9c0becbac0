use teloxide::types::Message;

use relaybot_core::{
    domain::{ChatId, MessageId},
    messaging::types::{Command, IncomingUpdate, TextMessage},
};

use super::sender_identity;

/// Messages without a sender (channel posts) are dropped. Anything that is
/// not text becomes an empty text message so the engine can answer it with
/// the unsupported-content notice.
pub(crate) fn to_update(msg: &Message) -> Option<IncomingUpdate> {
    let sender = sender_identity(msg.from()?);
    let chat_id = ChatId(msg.chat.id.0);
    let message_id = MessageId(msg.id.0);
    let text = msg.text().unwrap_or_default();
    let reply_to = msg.reply_to_message().map(|m| MessageId(m.id.0));

    if let Some(cmd) = Command::parse(chat_id, sender.clone(), message_id, text) {
        return Some(IncomingUpdate::Command(cmd.with_reply_to(reply_to)));
    }

    Some(IncomingUpdate::Text(TextMessage {
        chat_id,
        sender,
        message_id,
        reply_to,
        text: text.to_string(),
    }))
}
