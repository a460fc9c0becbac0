//! Everything the bot says, in Telegram HTML.

use std::time::Duration;

use crate::{
    actions::CallbackData,
    domain::{SenderIdentity, UserId},
    formatting::{escape_html, split_text, visible_len},
    messaging::types::{InlineButton, InlineKeyboard},
};

pub const WELCOME: &str = "💬 Welcome to the anonymous inbox.\n\
Anything you send here reaches the owner, and answers come back without revealing who wrote them. ✉️";

pub const HELP: &str = "<b>Owner commands</b>\n\
/blocked - list blocked users\n\
/block &lt;id&gt; - block a user\n\
/unblock &lt;id&gt; - unblock a user\n\
/cancel - forget the message you were replying to\n\
/help - this text\n\n\
Press <b>Reply</b> under a notification (or reply to it directly) to answer.";

pub const DELIVERED: &str = "✅ Your message was sent.";
pub const DELIVERY_FAILED: &str = "⚠️ Could not deliver the message. Please try again later.";
pub const BLOCKED_EXPLICIT: &str = "❌ You have been blocked and cannot send messages.";
pub const BLOCKED_GENERIC: &str = "⚠️ You can't send messages right now.";
pub const UNSUPPORTED: &str = "⚠️ Only text messages are supported.";

pub const REPLY_PROMPT: &str = "📝 Write your reply.";
pub const PRESS_REPLY_FIRST: &str =
    "⛔ Press <b>Reply</b> under a message first, or reply to its notification.";
pub const NOT_FOUND: &str = "⛔ Original message not found.";
pub const TARGET_BLOCKED: &str = "⛔ This user is blocked. Unblock them first.";
pub const REPLY_SENT: &str = "✅ Reply sent.";
pub const NEW_MESSAGE_PROMPT: &str = "📩 You have a new message.";
pub const VIEWED: &str = "👁 Your reply was read.";
pub const MESSAGE_ABOVE: &str = "⬆️ <i>Message above</i>";

pub const NOBODY_BLOCKED: &str = "🚫 Nobody is blocked.";
pub const CANNOT_BLOCK_SELF: &str = "⛔ You cannot block yourself.";
pub const CANCELLED: &str = "↩️ Reply cancelled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

// Callback answers (plain text, shown as a toast).
pub const TOAST_UNKNOWN: &str = "Unknown action";
pub const TOAST_UNAUTHORIZED: &str = "Unauthorized";
pub const TOAST_NOT_FOUND: &str = "Message not found";

const REPLY_LABEL: &str = "✉️ Reply";
const BLOCK_LABEL: &str = "🚫 Block";
const UNBLOCK_LABEL: &str = "✅ Unblock";
const VIEW_LABEL: &str = "📬 View message";

pub fn slow_down(wait: Duration) -> String {
    let secs = wait.as_secs_f64().ceil().max(1.0) as u64;
    format!("⏳ Please wait {secs}s before sending another message.")
}

/// What the owner receives for one relayed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Sent first, without buttons, when the text does not fit in the card.
    pub body: Vec<String>,
    /// Sender card; carries the buttons and the correlation.
    pub card: String,
}

/// Owner-facing card for a relayed message. The text is never cut: when it
/// does not fit next to the header it goes out as separate body messages.
pub fn notification(sender: &SenderIdentity, text: &str, max_len: usize) -> Notification {
    let header = format!(
        "👤 <b>New message</b>\n\
▪️ Name: {}\n\
▪️ Username: {}\n\
▪️ ID: <code>{}</code>",
        escape_html(&sender.full_name),
        escape_html(&sender.handle()),
        sender.id
    );

    let inline = format!("{header}\n\n{}", escape_html(text));
    if visible_len(&inline) <= max_len {
        return Notification {
            body: Vec::new(),
            card: inline,
        };
    }

    Notification {
        body: split_text(text, max_len)
            .iter()
            .map(|chunk| escape_html(chunk))
            .collect(),
        card: format!("{header}\n\n{MESSAGE_ABOVE}"),
    }
}

pub fn notification_keyboard(sender: UserId, blocked: bool) -> InlineKeyboard {
    let toggle = if blocked {
        InlineButton::new(UNBLOCK_LABEL, CallbackData::Unblock(sender))
    } else {
        InlineButton::new(BLOCK_LABEL, CallbackData::Block(sender))
    };
    InlineKeyboard::new(vec![
        InlineButton::new(REPLY_LABEL, CallbackData::Reply(None)),
        toggle,
    ])
}

pub fn view_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(vec![InlineButton::new(VIEW_LABEL, CallbackData::View)])
}

pub fn blocked_list(ids: &[UserId]) -> (String, InlineKeyboard) {
    let lines = ids
        .iter()
        .map(|id| format!("▪️ <code>{id}</code>"))
        .collect::<Vec<_>>()
        .join("\n");
    let buttons = ids
        .iter()
        .map(|id| InlineButton::new(format!("{UNBLOCK_LABEL} {id}"), CallbackData::Unblock(*id)))
        .collect();
    (
        format!("🚫 <b>Blocked users</b> ({})\n{lines}", ids.len()),
        InlineKeyboard::new(buttons),
    )
}

pub fn block_confirmation(id: UserId, blocked: bool, changed: bool) -> String {
    match (blocked, changed) {
        (true, true) => format!("🚫 User <code>{id}</code> blocked."),
        (true, false) => format!("User <code>{id}</code> is already blocked."),
        (false, true) => format!("🔓 User <code>{id}</code> unblocked."),
        (false, false) => format!("User <code>{id}</code> is not blocked."),
    }
}

pub fn usage(command: &str) -> String {
    format!("Usage: /{command} &lt;numeric user id&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_escapes_untrusted_fields() {
        let s = SenderIdentity::new(UserId(111), "<b>Eve</b>", Some("eve".into()));
        let n = notification(&s, "1 < 2 & 3", 4096);
        assert!(n.body.is_empty());
        assert!(n.card.contains("&lt;b&gt;Eve&lt;/b&gt;"));
        assert!(n.card.contains("@eve"));
        assert!(n.card.contains("<code>111</code>"));
        assert!(n.card.ends_with("1 &lt; 2 &amp; 3"));
    }

    #[test]
    fn escaped_text_is_budgeted_by_parsed_length() {
        let s = SenderIdentity::new(UserId(1), "A", None);
        let text = "<".repeat(1100);
        let n = notification(&s, &text, 4096);
        assert!(n.body.is_empty());
        assert!(n.card.ends_with(&escape_html(&text)));
        assert!(n.card.contains("Username: none"));
    }

    #[test]
    fn long_text_moves_to_body_messages_whole() {
        let s = SenderIdentity::new(UserId(1), "A", None);
        let text = format!("{}END", "a".repeat(4050));
        let n = notification(&s, &text, 4096);
        assert_eq!(n.body.concat(), text);
        assert!(n.body.iter().all(|b| visible_len(b) <= 4096));
        assert!(n.card.ends_with(MESSAGE_ABOVE));
        assert!(visible_len(&n.card) <= 4096);
    }

    #[test]
    fn notification_keyboard_toggles() {
        let open = notification_keyboard(UserId(5), false).data();
        assert_eq!(
            open,
            vec![CallbackData::Reply(None), CallbackData::Block(UserId(5))]
        );
        let closed = notification_keyboard(UserId(5), true).data();
        assert_eq!(closed[1], CallbackData::Unblock(UserId(5)));
    }

    #[test]
    fn slow_down_rounds_up() {
        assert_eq!(
            slow_down(Duration::from_millis(1200)),
            "⏳ Please wait 2s before sending another message."
        );
        assert!(slow_down(Duration::ZERO).contains("1s"));
    }
}
