//! Messenger-facing abstractions. Telegram is the only adapter today.

pub mod port;
pub mod throttled;
pub mod types;
