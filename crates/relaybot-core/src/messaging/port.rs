use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{InlineKeyboard, MessagingCapabilities, SendOptions},
    Result,
};

/// Outbound half of the transport.
///
/// One attempt per call; failures come back as `Error::Transport` and the
/// routing engine decides who gets told.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str, opts: SendOptions)
        -> Result<MessageRef>;

    /// Replace (or with `None`, remove) the inline keyboard under a message.
    async fn edit_keyboard(&self, msg: MessageRef, keyboard: Option<InlineKeyboard>)
        -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
