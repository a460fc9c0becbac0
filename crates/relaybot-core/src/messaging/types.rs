use crate::{
    actions::CallbackData,
    domain::{ChatId, MessageId, MessageRef, SenderIdentity},
};

/// Messenger-agnostic inbound update.
///
/// Non-text content reaches the engine as a `Text` with an empty body.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Text(TextMessage),
    Callback(CallbackQuery),
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub sender: SenderIdentity,
    pub message_id: MessageId,
    /// Lowercased, without the leading `/` or `@botname` suffix.
    pub name: String,
    pub args: String,
    /// Full original text, for relaying unknown commands as plain messages.
    pub raw: String,
    /// Message this one replies to (Telegram reply threading), same chat.
    pub reply_to: Option<MessageId>,
}

impl Command {
    /// Parse `/cmd@botname arg1 ...`. Returns `None` for non-command text.
    pub fn parse(
        chat_id: ChatId,
        sender: SenderIdentity,
        message_id: MessageId,
        text: &str,
    ) -> Option<Self> {
        let trimmed = text.trim();
        if !trimmed.starts_with('/') {
            return None;
        }

        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("").trim();
        let args = parts.next().unwrap_or("").trim().to_string();

        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            chat_id,
            sender,
            message_id,
            name,
            args,
            raw: text.to_string(),
            reply_to: None,
        })
    }

    pub fn with_reply_to(mut self, reply_to: Option<MessageId>) -> Self {
        self.reply_to = reply_to;
        self
    }

    /// Treat the command as an ordinary text message.
    pub fn into_text(self) -> TextMessage {
        TextMessage {
            chat_id: self.chat_id,
            sender: self.sender,
            message_id: self.message_id,
            reply_to: self.reply_to,
            text: self.raw,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub sender: SenderIdentity,
    pub message_id: MessageId,
    /// Message this one replies to (Telegram reply threading), same chat.
    pub reply_to: Option<MessageId>,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub sender: SenderIdentity,
    pub callback_id: String,
    pub data: String,
    /// Message the pressed button is attached to.
    pub message: Option<MessageRef>,
}

/// Inline keyboard, one button per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, data: CallbackData) -> Self {
        Self {
            label: label.into(),
            callback_data: data.encode(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    /// Parsed payloads, skipping buttons with foreign callback data.
    pub fn data(&self) -> Vec<CallbackData> {
        self.buttons
            .iter()
            .filter_map(|b| b.callback_data.parse().ok())
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub keyboard: Option<InlineKeyboard>,
    /// Thread the new message under this message of the same chat.
    pub reply_to: Option<MessageId>,
}

impl SendOptions {
    pub fn keyboard(keyboard: InlineKeyboard) -> Self {
        Self {
            keyboard: Some(keyboard),
            reply_to: None,
        }
    }

    pub fn reply_to(message_id: Option<MessageId>) -> Self {
        Self {
            keyboard: None,
            reply_to: message_id,
        }
    }

    pub fn with_reply_to(mut self, message_id: Option<MessageId>) -> Self {
        self.reply_to = message_id;
        self
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;

    fn sender() -> SenderIdentity {
        SenderIdentity::new(UserId(1), "A", None)
    }

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        let cmd = Command::parse(ChatId(1), sender(), MessageId(3), "/Block@relay_bot  222 ").unwrap();
        assert_eq!(cmd.name, "block");
        assert_eq!(cmd.args, "222");
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert!(Command::parse(ChatId(1), sender(), MessageId(3), "hello /start").is_none());
        assert!(Command::parse(ChatId(1), sender(), MessageId(3), "/").is_none());
    }

    #[test]
    fn command_falls_back_to_raw_text() {
        let cmd = Command::parse(ChatId(1), sender(), MessageId(3), "/weird thing").unwrap();
        let text = cmd.into_text();
        assert_eq!(text.text, "/weird thing");
        assert_eq!(text.message_id, MessageId(3));
        assert_eq!(text.reply_to, None);
    }

    #[test]
    fn threading_survives_the_text_fallback() {
        let cmd = Command::parse(ChatId(1), sender(), MessageId(3), "/etc/hosts is broken")
            .unwrap()
            .with_reply_to(Some(MessageId(1000)));
        assert_eq!(cmd.name, "etc/hosts");
        assert_eq!(cmd.into_text().reply_to, Some(MessageId(1000)));
    }
}
