//! Routing engine: decides, per inbound event, what gets sent where and which
//! state changes.
//!
//! Every event is handled as one transaction and produces an [`Outcome`].
//! Policy denials, missing correlations and transport failures are outcomes,
//! not errors: the engine tells the initiating party and carries on.

pub mod texts;

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::{
    actions::CallbackAction,
    blocklist::BlockList,
    correlation::{CorrelationKey, CorrelationRecord, CorrelationStore, Role},
    domain::{ChatId, MessageRef, SenderIdentity, UserId},
    formatting::escape_html,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, Command, IncomingUpdate, SendOptions, TextMessage},
    },
    rate_limit::RateLimiter,
};

/// How a blocked sender is told they cannot write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockNotice {
    /// "You have been blocked."
    #[default]
    Explicit,
    /// "You can't send messages right now."
    Generic,
}

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub owner: UserId,
    /// Disclose answers only after the sender taps "view".
    pub view_gate: bool,
    pub block_notice: BlockNotice,
    pub rate_limit_enabled: bool,
    pub cooldown: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    Blocked,
    RateLimited,
    /// A non-owner pressed an owner-only button.
    Unauthorized,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Sender message delivered to the owner as notification `key`.
    Relayed { key: CorrelationKey },
    Denied(Denial),
    EmptyContent,
    /// A single send attempt failed; the initiating party was told.
    DeliveryFailed,
    /// Owner selected a notification and is expected to type the answer.
    AwaitingReplyText { key: CorrelationKey },
    /// Answer delivered. `prompt` is the view prompt when the view-gate is on.
    ReplySent {
        sender: UserId,
        prompt: Option<CorrelationKey>,
    },
    /// Sender opened a gated answer.
    ReplyViewed { sender: UserId },
    CorrelationMiss,
    /// Owner wrote text without selecting or replying to a notification.
    NoReplyTarget,
    BlockChanged {
        id: UserId,
        blocked: bool,
        changed: bool,
    },
    Cancelled { had_pending: bool },
    /// Informational command answered (start, help, list, usage).
    Answered,
    Ignored,
}

pub struct RoutingEngine {
    cfg: EngineConfig,
    blocklist: Arc<BlockList>,
    correlations: Arc<CorrelationStore>,
    limiter: Mutex<RateLimiter>,
    /// Owner id -> notification currently being answered.
    pending: Mutex<HashMap<UserId, CorrelationKey>>,
    messenger: Arc<dyn MessagingPort>,
}

impl RoutingEngine {
    pub fn new(
        cfg: EngineConfig,
        blocklist: Arc<BlockList>,
        correlations: Arc<CorrelationStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            limiter: Mutex::new(RateLimiter::new(cfg.rate_limit_enabled, cfg.cooldown)),
            cfg,
            blocklist,
            correlations,
            pending: Mutex::new(HashMap::new()),
            messenger,
        }
    }

    pub fn owner(&self) -> UserId {
        self.cfg.owner
    }

    fn owner_chat(&self) -> ChatId {
        ChatId::from(self.cfg.owner)
    }

    fn is_owner(&self, sender: &SenderIdentity) -> bool {
        sender.id == self.cfg.owner
    }

    pub async fn pending_target(&self) -> Option<CorrelationKey> {
        self.pending.lock().await.get(&self.cfg.owner).copied()
    }

    pub async fn handle(&self, update: IncomingUpdate) -> Outcome {
        self.handle_at(update, Instant::now()).await
    }

    /// Like [`handle`](Self::handle) with an explicit clock for the cooldown.
    pub async fn handle_at(&self, update: IncomingUpdate, now: Instant) -> Outcome {
        match update {
            IncomingUpdate::Command(cmd) => self.on_command(cmd, now).await,
            IncomingUpdate::Text(msg) if self.is_owner(&msg.sender) => self.on_owner_text(msg).await,
            IncomingUpdate::Text(msg) => self.on_sender_message(msg, now).await,
            IncomingUpdate::Callback(q) => self.on_callback(q).await,
        }
    }

    // ============== Sender -> owner ==============

    async fn on_sender_message(&self, msg: TextMessage, now: Instant) -> Outcome {
        let sender = msg.sender.id;
        let thread = SendOptions::reply_to(Some(msg.message_id));

        if self.blocklist.is_blocked(sender).await {
            tracing::info!(sender = %sender, "dropped message from blocked sender");
            self.say(msg.chat_id, self.blocked_text(), thread).await;
            return Outcome::Denied(Denial::Blocked);
        }

        let wait = {
            let mut limiter = self.limiter.lock().await;
            if limiter.check_at(sender, now) {
                None
            } else {
                Some(
                    limiter
                        .retry_after(sender, now)
                        .unwrap_or_else(|| limiter.cooldown()),
                )
            }
        };
        if let Some(wait) = wait {
            tracing::debug!(sender = %sender, ?wait, "sender rate limited");
            self.say(msg.chat_id, &texts::slow_down(wait), thread).await;
            return Outcome::Denied(Denial::RateLimited);
        }

        if msg.text.trim().is_empty() {
            self.say(msg.chat_id, texts::UNSUPPORTED, thread).await;
            return Outcome::EmptyContent;
        }

        let max_len = self.messenger.capabilities().max_message_len;
        let note = texts::notification(&msg.sender, &msg.text, max_len);

        match self.notify_owner(sender, note).await {
            Ok(notification) => {
                let key = CorrelationKey::from(notification);
                self.correlations
                    .record(
                        key,
                        CorrelationRecord::awaiting_reply(sender, Some(msg.message_id)),
                    )
                    .await;
                tracing::info!(sender = %sender, key = %key, "relayed message to owner");
                self.say(msg.chat_id, texts::DELIVERED, thread).await;
                Outcome::Relayed { key }
            }
            Err(e) => {
                tracing::warn!(sender = %sender, error = %e, "failed to notify owner");
                self.say(msg.chat_id, texts::DELIVERY_FAILED, thread).await;
                Outcome::DeliveryFailed
            }
        }
    }

    /// Send the body messages (if any) and then the card, threaded under the
    /// first body message. Returns the card.
    async fn notify_owner(
        &self,
        sender: UserId,
        note: texts::Notification,
    ) -> crate::Result<MessageRef> {
        let owner_chat = self.owner_chat();
        let mut first_body = None;
        for chunk in &note.body {
            let sent = self
                .messenger
                .send_html(owner_chat, chunk, SendOptions::default())
                .await?;
            first_body.get_or_insert(sent.message_id);
        }

        let keyboard = texts::notification_keyboard(sender, false);
        self.messenger
            .send_html(
                owner_chat,
                &note.card,
                SendOptions::keyboard(keyboard).with_reply_to(first_body),
            )
            .await
    }

    fn blocked_text(&self) -> &'static str {
        match self.cfg.block_notice {
            BlockNotice::Explicit => texts::BLOCKED_EXPLICIT,
            BlockNotice::Generic => texts::BLOCKED_GENERIC,
        }
    }

    // ============== Owner -> sender ==============

    async fn on_owner_text(&self, msg: TextMessage) -> Outcome {
        let owner_chat = msg.chat_id;
        let thread = SendOptions::reply_to(Some(msg.message_id));

        let Some((key, record)) = self.reply_target(&msg).await else {
            let (text, outcome) = if msg.reply_to.is_some() {
                (texts::NOT_FOUND, Outcome::CorrelationMiss)
            } else {
                (texts::PRESS_REPLY_FIRST, Outcome::NoReplyTarget)
            };
            self.say(owner_chat, text, thread).await;
            return outcome;
        };
        let Some(record) = record else {
            self.pending.lock().await.remove(&self.cfg.owner);
            self.say(owner_chat, texts::NOT_FOUND, thread).await;
            return Outcome::CorrelationMiss;
        };

        if self.blocklist.is_blocked(record.sender_id).await {
            self.say(owner_chat, texts::TARGET_BLOCKED, thread).await;
            return Outcome::Denied(Denial::Blocked);
        }

        if msg.text.trim().is_empty() {
            self.say(owner_chat, texts::UNSUPPORTED, thread).await;
            return Outcome::EmptyContent;
        }

        let owner_reply = MessageRef::new(owner_chat, msg.message_id);
        match self.deliver_reply(key, &record, owner_reply, &msg.text).await {
            Ok(prompt) => {
                self.pending.lock().await.remove(&self.cfg.owner);
                tracing::info!(sender = %record.sender_id, key = %key, gated = prompt.is_some(), "reply delivered");
                self.say(owner_chat, texts::REPLY_SENT, thread).await;
                Outcome::ReplySent {
                    sender: record.sender_id,
                    prompt,
                }
            }
            Err(e) => {
                tracing::warn!(sender = %record.sender_id, error = %e, "failed to deliver reply");
                self.say(owner_chat, texts::DELIVERY_FAILED, thread).await;
                Outcome::DeliveryFailed
            }
        }
    }

    /// Pick the notification the owner is answering.
    ///
    /// A Telegram reply to a tracked notification wins; otherwise the pending
    /// selection is used. `Some((key, None))` means a pending selection that
    /// no longer resolves.
    async fn reply_target(
        &self,
        msg: &TextMessage,
    ) -> Option<(CorrelationKey, Option<CorrelationRecord>)> {
        if let Some(reply_to) = msg.reply_to {
            let key = CorrelationKey::new(msg.chat_id, reply_to);
            if let Some(rec) = self.awaiting_reply(key).await {
                return Some((key, Some(rec)));
            }
        }

        let key = self.pending_target().await?;
        Some((key, self.awaiting_reply(key).await))
    }

    async fn awaiting_reply(&self, key: CorrelationKey) -> Option<CorrelationRecord> {
        self.correlations
            .resolve(key)
            .await
            .filter(|rec| rec.role == Role::AwaitingReply)
    }

    /// Send the answer (or the view prompt guarding it) to the sender.
    async fn deliver_reply(
        &self,
        key: CorrelationKey,
        record: &CorrelationRecord,
        owner_reply: MessageRef,
        text: &str,
    ) -> crate::Result<Option<CorrelationKey>> {
        let sender_chat = ChatId::from(record.sender_id);

        if !self.cfg.view_gate {
            self.messenger
                .send_html(sender_chat, &escape_html(text), SendOptions::reply_to(record.origin))
                .await?;
            return Ok(None);
        }

        let prompt = self
            .messenger
            .send_html(
                sender_chat,
                texts::NEW_MESSAGE_PROMPT,
                SendOptions::keyboard(texts::view_keyboard()).with_reply_to(record.origin),
            )
            .await?;
        let prompt_key = CorrelationKey::from(prompt);
        self.correlations
            .record(
                prompt_key,
                CorrelationRecord::awaiting_view(
                    record.sender_id,
                    record.origin,
                    key,
                    Some(owner_reply),
                    text.to_string(),
                ),
            )
            .await;
        Ok(Some(prompt_key))
    }

    // ============== Buttons ==============

    async fn on_callback(&self, q: CallbackQuery) -> Outcome {
        let action = match CallbackAction::from_query(&q.data, q.message) {
            Ok(a) => a,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring callback");
                self.answer(&q.callback_id, Some(texts::TOAST_UNKNOWN)).await;
                return Outcome::Ignored;
            }
        };

        if action.is_owner_only() && !self.is_owner(&q.sender) {
            tracing::warn!(user = %q.sender.id, "non-owner pressed an owner button");
            self.answer(&q.callback_id, Some(texts::TOAST_UNAUTHORIZED))
                .await;
            return Outcome::Denied(Denial::Unauthorized);
        }

        match action {
            CallbackAction::Reply(key) => {
                self.answer(&q.callback_id, None).await;
                self.select_reply_target(key).await
            }
            CallbackAction::Block(id) => {
                self.answer(&q.callback_id, None).await;
                self.set_blocked(id, true, q.message).await
            }
            CallbackAction::Unblock(id) => {
                self.answer(&q.callback_id, None).await;
                self.set_blocked(id, false, q.message).await
            }
            CallbackAction::View(key) => self.on_view(&q, key).await,
        }
    }

    async fn select_reply_target(&self, key: CorrelationKey) -> Outcome {
        let owner_chat = self.owner_chat();
        if self.awaiting_reply(key).await.is_none() {
            self.say(owner_chat, texts::NOT_FOUND, SendOptions::default())
                .await;
            return Outcome::CorrelationMiss;
        }

        self.pending.lock().await.insert(self.cfg.owner, key);
        let thread = SendOptions::reply_to(Some(key.message().message_id));
        self.say(owner_chat, texts::REPLY_PROMPT, thread).await;
        Outcome::AwaitingReplyText { key }
    }

    async fn on_view(&self, q: &CallbackQuery, key: CorrelationKey) -> Outcome {
        let viewer = q.sender.id;
        let record = self
            .correlations
            .resolve(key)
            .await
            .filter(|rec| rec.role == Role::AwaitingView && rec.sender_id == viewer);
        let Some(record) = record else {
            self.answer(&q.callback_id, Some(texts::TOAST_NOT_FOUND))
                .await;
            return Outcome::CorrelationMiss;
        };

        if self.blocklist.is_blocked(viewer).await {
            self.answer(&q.callback_id, Some(self.blocked_text())).await;
            return Outcome::Denied(Denial::Blocked);
        }
        self.answer(&q.callback_id, None).await;

        let chat = key.message().chat_id;
        let text = record.reply_text.as_deref().unwrap_or_default();
        let sent = self
            .messenger
            .send_html(chat, &escape_html(text), SendOptions::reply_to(record.origin))
            .await;
        if let Err(e) = sent {
            tracing::warn!(sender = %viewer, error = %e, "failed to disclose reply");
            self.say(chat, texts::DELIVERY_FAILED, SendOptions::default())
                .await;
            return Outcome::DeliveryFailed;
        }

        if let Err(e) = self.messenger.edit_keyboard(key.message(), None).await {
            tracing::debug!(key = %key, error = %e, "could not remove view button");
        }

        let receipt_thread = record.admin_reply.map(|m| m.message_id);
        self.say(
            self.owner_chat(),
            texts::VIEWED,
            SendOptions::reply_to(receipt_thread),
        )
        .await;
        tracing::info!(sender = %viewer, key = %key, "reply viewed");
        Outcome::ReplyViewed { sender: viewer }
    }

    /// Block or unblock `id`. When pressed from a button, the menu it sits in
    /// is updated: a notification flips to the opposite action, the blocked
    /// list loses the entry.
    async fn set_blocked(&self, id: UserId, blocked: bool, attached: Option<MessageRef>) -> Outcome {
        let owner_chat = self.owner_chat();
        if id == self.cfg.owner {
            self.say(owner_chat, texts::CANNOT_BLOCK_SELF, SendOptions::default())
                .await;
            return Outcome::Ignored;
        }

        let changed = if blocked {
            self.blocklist.block(id).await
        } else {
            self.blocklist.unblock(id).await
        };
        tracing::info!(user = %id, blocked, changed, "block list updated");

        if let Some(msg) = attached {
            self.refresh_menu(msg, id, blocked).await;
        }

        self.say(
            owner_chat,
            &texts::block_confirmation(id, blocked, changed),
            SendOptions::default(),
        )
        .await;
        Outcome::BlockChanged {
            id,
            blocked,
            changed,
        }
    }

    /// Bring the keyboard the owner pressed back in line with the block list.
    async fn refresh_menu(&self, msg: MessageRef, id: UserId, blocked: bool) {
        let is_notification_for_id = self
            .awaiting_reply(msg.into())
            .await
            .is_some_and(|rec| rec.sender_id == id);

        let keyboard = if is_notification_for_id {
            Some(texts::notification_keyboard(id, blocked))
        } else if !blocked {
            // Outside notifications, unblock buttons only sit under the blocked list.
            let (_, list) = texts::blocked_list(&self.blocklist.list_all().await);
            (!list.is_empty()).then_some(list)
        } else {
            return;
        };

        if let Err(e) = self.messenger.edit_keyboard(msg, keyboard).await {
            tracing::debug!(error = %e, "could not update menu");
        }
    }

    // ============== Commands ==============

    async fn on_command(&self, cmd: Command, now: Instant) -> Outcome {
        let chat = cmd.chat_id;
        let thread = SendOptions::reply_to(Some(cmd.message_id));
        let is_owner = self.is_owner(&cmd.sender);

        match (cmd.name.as_str(), is_owner) {
            ("start", false) => {
                if self.blocklist.is_blocked(cmd.sender.id).await {
                    self.say(chat, self.blocked_text(), thread).await;
                    return Outcome::Denied(Denial::Blocked);
                }
                self.say(chat, texts::WELCOME, SendOptions::default()).await;
                Outcome::Answered
            }
            // Anything else a sender types is just a message.
            (_, false) => self.on_sender_message(cmd.into_text(), now).await,
            ("block", true) | ("unblock", true) => {
                let blocked = cmd.name == "block";
                match cmd.args.parse::<UserId>() {
                    Ok(id) => self.set_blocked(id, blocked, None).await,
                    Err(_) => {
                        self.say(chat, &texts::usage(&cmd.name), thread).await;
                        Outcome::Answered
                    }
                }
            }
            ("blocked", true) => {
                let ids = self.blocklist.list_all().await;
                if ids.is_empty() {
                    self.say(chat, texts::NOBODY_BLOCKED, thread).await;
                } else {
                    let (html, keyboard) = texts::blocked_list(&ids);
                    self.say(chat, &html, SendOptions::keyboard(keyboard)).await;
                }
                Outcome::Answered
            }
            ("cancel", true) => {
                let had_pending = self.pending.lock().await.remove(&self.cfg.owner).is_some();
                let text = if had_pending {
                    texts::CANCELLED
                } else {
                    texts::NOTHING_TO_CANCEL
                };
                self.say(chat, text, thread).await;
                Outcome::Cancelled { had_pending }
            }
            ("start", true) | ("help", true) => {
                self.say(chat, texts::HELP, SendOptions::default()).await;
                Outcome::Answered
            }
            // Threaded replies that merely start with `/` are answers.
            (_, true) if cmd.reply_to.is_some() => self.on_owner_text(cmd.into_text()).await,
            (_, true) => {
                self.say(chat, texts::HELP, SendOptions::default()).await;
                Outcome::Answered
            }
        }
    }

    // ============== Outbound helpers ==============

    /// Best-effort informational send. Failures are logged only: there is
    /// nobody left to tell.
    async fn say(&self, chat_id: ChatId, html: &str, opts: SendOptions) {
        if let Err(e) = self.messenger.send_html(chat_id, html, opts).await {
            tracing::warn!(chat = chat_id.0, error = %e, "failed to send notice");
        }
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>) {
        if let Err(e) = self.messenger.answer_callback_query(callback_id, text).await {
            tracing::debug!(error = %e, "failed to answer callback query");
        }
    }
}
