//! Telegram update handlers.
//!
//! Each handler converts a teloxide update into a transport-neutral
//! `IncomingUpdate` and hands it to the routing engine. All user-facing
//! replies are sent by the engine through the messaging port.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};

use relaybot_core::domain::{SenderIdentity, UserId};

use crate::router::AppState;

mod callback;
mod message;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let update = callback::to_update(&q);
    let outcome = state.engine.handle(update).await;
    tracing::debug!(callback_id = %q.id, ?outcome, "callback handled");
    Ok(())
}

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Groups and channels are not relayed.
    if !msg.chat.is_private() {
        tracing::debug!(chat_id = msg.chat.id.0, "ignoring non-private chat");
        return Ok(());
    }

    let Some(update) = message::to_update(&msg) else {
        return Ok(());
    };

    let _guard = state.chat_locks.lock_chat(msg.chat.id.0).await;
    let outcome = state.engine.handle(update).await;
    tracing::debug!(chat_id = msg.chat.id.0, message_id = msg.id.0, ?outcome, "message handled");
    Ok(())
}

pub(crate) fn sender_identity(user: &User) -> SenderIdentity {
    SenderIdentity::new(
        UserId(user.id.0 as i64),
        user.full_name(),
        user.username.clone(),
    )
}
