//! Test doubles for the messaging port.

use std::{collections::HashSet, sync::Mutex};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities, SendOptions},
    },
    Result,
};

#[derive(Clone, Debug)]
pub struct Sent {
    pub msg: MessageRef,
    pub html: String,
    pub opts: SendOptions,
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sent: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageRef, Option<InlineKeyboard>)>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    failing: Mutex<HashSet<ChatId>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        if *guard == 0 {
            *guard = 1000;
        }
        let id = *guard;
        *guard += 1;
        MessageRef::new(chat_id, MessageId(id))
    }

    /// Make every later send to `chat_id` fail.
    pub fn fail_sends_to(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn heal(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().remove(&chat_id);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.msg.chat_id == chat_id)
            .collect()
    }

    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent_to(chat_id).into_iter().map(|s| s.html).collect()
    }

    pub fn last_to(&self, chat_id: ChatId) -> Option<Sent> {
        self.sent_to(chat_id).pop()
    }

    pub fn edits(&self) -> Vec<(MessageRef, Option<InlineKeyboard>)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            supports_inline_keyboards: true,
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str, opts: SendOptions) -> Result<MessageRef> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(Error::Transport(format!("chat {} unreachable", chat_id.0)));
        }
        let msg = self.alloc(chat_id);
        self.sent.lock().unwrap().push(Sent {
            msg,
            html: html.to_string(),
            opts,
        });
        Ok(msg)
    }

    async fn edit_keyboard(&self, msg: MessageRef, keyboard: Option<InlineKeyboard>) -> Result<()> {
        self.edits.lock().unwrap().push((msg, keyboard));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}
