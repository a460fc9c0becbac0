use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    store::Store,
};

/// Identifier of a message the bot itself sent (a notification in the owner
/// chat, or a view prompt in a sender chat).
///
/// Rendered as `<chat_id>:<message_id>` in the correlation document and in
/// callback data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CorrelationKey(pub MessageRef);

impl CorrelationKey {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self(MessageRef::new(chat_id, message_id))
    }

    pub fn message(&self) -> MessageRef {
        self.0
    }
}

impl From<MessageRef> for CorrelationKey {
    fn from(m: MessageRef) -> Self {
        Self(m)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.chat_id.0, self.0.message_id.0)
    }
}

impl FromStr for CorrelationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chat, msg) = s
            .split_once(':')
            .ok_or_else(|| format!("correlation key without ':': {s}"))?;
        let chat = chat
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("bad chat id in {s}: {e}"))?;
        let msg = msg
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("bad message id in {s}: {e}"))?;
        Ok(Self::new(ChatId(chat), MessageId(msg)))
    }
}

impl From<CorrelationKey> for String {
    fn from(k: CorrelationKey) -> Self {
        k.to_string()
    }
}

impl TryFrom<String> for CorrelationKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// What the counterpart event of a correlated message is expected to be.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Owner notification waiting for the owner's answer.
    #[default]
    #[serde(alias = "new")]
    AwaitingReply,
    /// View prompt in a sender chat waiting for the sender to open the answer.
    AwaitingView,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    #[serde(alias = "from_id")]
    pub sender_id: UserId,

    #[serde(default, alias = "type")]
    pub role: Role,

    /// The sender's own message, so answers thread under it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<MessageId>,

    /// View prompts only: the notification being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<CorrelationKey>,

    /// View prompts only: the owner's reply, for the read receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_reply: Option<MessageRef>,

    /// View prompts only: the answer withheld until the sender opens it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_text: Option<String>,

    #[serde(default = "chrono::Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl CorrelationRecord {
    pub fn awaiting_reply(sender_id: UserId, origin: Option<MessageId>) -> Self {
        Self {
            sender_id,
            role: Role::AwaitingReply,
            origin,
            target: None,
            admin_reply: None,
            reply_text: None,
            created_at: Utc::now(),
        }
    }

    pub fn awaiting_view(
        sender_id: UserId,
        origin: Option<MessageId>,
        target: CorrelationKey,
        admin_reply: Option<MessageRef>,
        reply_text: String,
    ) -> Self {
        Self {
            sender_id,
            role: Role::AwaitingView,
            origin,
            target: Some(target),
            admin_reply,
            reply_text: Some(reply_text),
            created_at: Utc::now(),
        }
    }
}

/// On-disk shape of `users.json`. Values stay loosely typed so one bad
/// entry does not discard the rest.
pub type CorrelationDocument = BTreeMap<String, serde_json::Value>;

/// Bounds on how many correlations are kept around.
#[derive(Clone, Copy, Debug)]
pub struct RetentionPolicy {
    /// Oldest records are evicted above this count. `0` means unbounded.
    pub max_entries: usize,
    /// Records older than this are dropped. `None` keeps them forever.
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_age: Some(Duration::days(30)),
        }
    }
}

/// Mapping from bot-sent messages back to the sender they concern.
pub struct CorrelationStore {
    records: Mutex<HashMap<CorrelationKey, CorrelationRecord>>,
    store: Arc<dyn Store<CorrelationDocument>>,
    retention: RetentionPolicy,
}

impl CorrelationStore {
    pub fn load(store: Arc<dyn Store<CorrelationDocument>>, retention: RetentionPolicy) -> Self {
        let doc = match store.load() {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load correlations, starting empty");
                CorrelationDocument::new()
            }
        };

        let mut records = HashMap::with_capacity(doc.len());
        for (raw_key, raw_rec) in doc {
            let rec = match serde_json::from_value::<CorrelationRecord>(raw_rec) {
                Ok(rec) => rec,
                Err(e) => {
                    tracing::warn!(key = %raw_key, error = %e, "skipping correlation entry");
                    continue;
                }
            };
            match parse_document_key(&raw_key, rec) {
                Ok((key, rec)) => {
                    records.insert(key, rec);
                }
                Err(e) => {
                    tracing::warn!(key = %raw_key, error = %e, "skipping correlation entry");
                }
            }
        }
        tracing::debug!(count = records.len(), "correlations loaded");

        Self {
            records: Mutex::new(records),
            store,
            retention,
        }
    }

    /// Insert (last write wins), prune, and flush before returning.
    pub async fn record(&self, key: CorrelationKey, record: CorrelationRecord) {
        let mut records = self.records.lock().await;
        records.insert(key, record);
        prune_locked(&mut records, self.retention, Utc::now());
        self.persist(&records);
    }

    pub async fn resolve(&self, key: CorrelationKey) -> Option<CorrelationRecord> {
        self.records.lock().await.get(&key).cloned()
    }

    /// Apply the retention policy as of `now`. Returns how many records were dropped.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.lock().await;
        let dropped = prune_locked(&mut records, self.retention, now);
        if dropped > 0 {
            self.persist(&records);
        }
        dropped
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    fn persist(&self, records: &HashMap<CorrelationKey, CorrelationRecord>) {
        let mut doc = CorrelationDocument::new();
        for (key, rec) in records {
            match serde_json::to_value(rec) {
                Ok(v) => {
                    doc.insert(key.to_string(), v);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "failed to encode correlation"),
            }
        }
        if let Err(e) = self.store.save(&doc) {
            tracing::warn!(error = %e, "failed to persist correlations");
        }
    }
}

/// Keys are `chat:msg`. Older documents key a record by the bare id of the
/// sender's own message; those land in the sender's chat with `origin` set.
fn parse_document_key(
    raw: &str,
    mut rec: CorrelationRecord,
) -> Result<(CorrelationKey, CorrelationRecord), String> {
    if let Ok(key) = raw.parse::<CorrelationKey>() {
        return Ok((key, rec));
    }
    let id = raw
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("unrecognized correlation key: {raw}"))?;
    rec.origin.get_or_insert(MessageId(id));
    Ok((
        CorrelationKey::new(ChatId::from(rec.sender_id), MessageId(id)),
        rec,
    ))
}

fn prune_locked(
    records: &mut HashMap<CorrelationKey, CorrelationRecord>,
    retention: RetentionPolicy,
    now: DateTime<Utc>,
) -> usize {
    let before = records.len();

    if let Some(max_age) = retention.max_age {
        let cutoff = now - max_age;
        records.retain(|_, rec| rec.created_at >= cutoff);
    }

    if retention.max_entries > 0 && records.len() > retention.max_entries {
        let mut by_age: Vec<(DateTime<Utc>, CorrelationKey)> = records
            .iter()
            .map(|(k, rec)| (rec.created_at, *k))
            .collect();
        by_age.sort();
        let excess = records.len() - retention.max_entries;
        for (_, key) in by_age.into_iter().take(excess) {
            records.remove(&key);
        }
    }

    let dropped = before - records.len();
    if dropped > 0 {
        tracing::debug!(dropped, remaining = records.len(), "pruned correlations");
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn key(chat: i64, msg: i32) -> CorrelationKey {
        CorrelationKey::new(ChatId(chat), MessageId(msg))
    }

    fn store_with(retention: RetentionPolicy) -> (Arc<MemoryStore<CorrelationDocument>>, CorrelationStore) {
        let backing = Arc::new(MemoryStore::new());
        let store = CorrelationStore::load(backing.clone(), retention);
        (backing, store)
    }

    #[test]
    fn key_display_and_parse_agree() {
        let k = key(-100123, 42);
        assert_eq!(k.to_string(), "-100123:42");
        assert_eq!("-100123:42".parse::<CorrelationKey>().unwrap(), k);
        assert!("42".parse::<CorrelationKey>().is_err());
        assert!("a:b".parse::<CorrelationKey>().is_err());
    }

    #[tokio::test]
    async fn resolves_exactly_what_was_recorded() {
        let (backing, store) = store_with(RetentionPolicy::default());
        let k = key(1, 10);
        let rec = CorrelationRecord::awaiting_reply(UserId(111), Some(MessageId(5)));

        store.record(k, rec.clone()).await;
        assert_eq!(store.resolve(k).await, Some(rec));
        assert_eq!(store.resolve(key(1, 11)).await, None);

        let doc = backing.snapshot().unwrap();
        assert_eq!(doc["1:10"]["sender_id"], json!(111));
        assert_eq!(doc["1:10"]["role"], json!("awaiting-reply"));
    }

    #[tokio::test]
    async fn record_overwrites_existing_key() {
        let (_backing, store) = store_with(RetentionPolicy::default());
        let k = key(1, 10);
        store
            .record(k, CorrelationRecord::awaiting_reply(UserId(1), None))
            .await;
        store
            .record(k, CorrelationRecord::awaiting_reply(UserId(2), None))
            .await;
        assert_eq!(store.resolve(k).await.unwrap().sender_id, UserId(2));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn loads_legacy_entries_and_skips_garbage() {
        let mut doc = CorrelationDocument::new();
        doc.insert("123".to_string(), json!({ "from_id": 111, "type": "new" }));
        doc.insert("7:101".to_string(), json!({ "sender_id": 222 }));
        doc.insert(
            "333:5".to_string(),
            json!({ "sender_id": 333, "role": "awaiting-view", "target": "7:101", "reply_text": "hi" }),
        );
        doc.insert("nonsense".to_string(), json!({ "sender_id": 1 }));
        doc.insert("7:102".to_string(), json!({ "role": "awaiting-reply" }));

        let store = CorrelationStore::load(
            Arc::new(MemoryStore::with_doc(doc)),
            RetentionPolicy::default(),
        );
        assert_eq!(store.len().await, 3);

        let legacy = store.resolve(key(111, 123)).await.unwrap();
        assert_eq!(legacy.sender_id, UserId(111));
        assert_eq!(legacy.role, Role::AwaitingReply);
        assert_eq!(legacy.origin, Some(MessageId(123)));

        let plain = store.resolve(key(7, 101)).await.unwrap();
        assert_eq!(plain.role, Role::AwaitingReply);

        let view = store.resolve(key(333, 5)).await.unwrap();
        assert_eq!(view.role, Role::AwaitingView);
        assert_eq!(view.target, Some(key(7, 101)));
        assert_eq!(view.reply_text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn legacy_document_survives_the_next_write() {
        let mut doc = CorrelationDocument::new();
        doc.insert("123".to_string(), json!({ "from_id": 111, "type": "new" }));
        doc.insert("124".to_string(), json!({ "from_id": 222, "type": "new" }));
        let backing = Arc::new(MemoryStore::with_doc(doc));
        let store = CorrelationStore::load(backing.clone(), RetentionPolicy::default());
        assert_eq!(store.len().await, 2);

        store
            .record(key(1, 9), CorrelationRecord::awaiting_reply(UserId(333), None))
            .await;

        let saved = backing.snapshot().unwrap();
        assert_eq!(saved.len(), 3);
        assert!(saved.contains_key("111:123"));
        assert!(saved.contains_key("222:124"));
    }

    #[tokio::test]
    async fn prune_drops_records_past_max_age() {
        let (_backing, store) = store_with(RetentionPolicy {
            max_entries: 0,
            max_age: Some(Duration::days(1)),
        });
        let mut old = CorrelationRecord::awaiting_reply(UserId(1), None);
        old.created_at = Utc::now() - Duration::hours(2);
        store.record(key(1, 1), old).await;
        store
            .record(key(1, 2), CorrelationRecord::awaiting_reply(UserId(2), None))
            .await;

        assert_eq!(store.prune(Utc::now()).await, 0);
        assert_eq!(store.prune(Utc::now() + Duration::hours(23)).await, 1);
        assert!(store.resolve(key(1, 1)).await.is_none());
        assert!(store.resolve(key(1, 2)).await.is_some());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_first() {
        let (_backing, store) = store_with(RetentionPolicy {
            max_entries: 2,
            max_age: None,
        });
        let base = Utc::now();
        for (i, mins) in [(1, 30), (2, 20), (3, 10)] {
            let mut rec = CorrelationRecord::awaiting_reply(UserId(i as i64), None);
            rec.created_at = base - Duration::minutes(mins);
            store.record(key(1, i), rec).await;
        }

        assert_eq!(store.len().await, 2);
        assert!(store.resolve(key(1, 1)).await.is_none());
        assert!(store.resolve(key(1, 2)).await.is_some());
        assert!(store.resolve(key(1, 3)).await.is_some());
    }
}
