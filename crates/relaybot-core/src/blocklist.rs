use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{domain::UserId, store::Store};

/// On-disk shape of `blocked.json`.
///
/// Saved as `{"<id>": true}`; a plain array of ids is accepted on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockDocument {
    Map(BTreeMap<String, bool>),
    List(Vec<serde_json::Value>),
}

impl BlockDocument {
    fn from_set(set: &BTreeSet<UserId>) -> Self {
        BlockDocument::Map(set.iter().map(|id| (id.to_string(), true)).collect())
    }

    fn into_set(self) -> BTreeSet<UserId> {
        match self {
            BlockDocument::Map(map) => map
                .into_iter()
                .filter(|(_, blocked)| *blocked)
                .filter_map(|(k, _)| k.parse::<UserId>().ok())
                .collect(),
            BlockDocument::List(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::Number(n) => n.as_i64().map(UserId),
                    serde_json::Value::String(s) => s.parse::<UserId>().ok(),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Set of blocked senders.
///
/// Every mutation is written through to the store. A failed write is logged
/// and the in-memory set stays authoritative for the running process.
pub struct BlockList {
    blocked: Mutex<BTreeSet<UserId>>,
    store: Arc<dyn Store<BlockDocument>>,
}

impl BlockList {
    /// Load the last snapshot. An unreadable document starts an empty list.
    pub fn load(store: Arc<dyn Store<BlockDocument>>) -> Self {
        let blocked = match store.load() {
            Ok(Some(doc)) => doc.into_set(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load block list, starting empty");
                BTreeSet::new()
            }
        };
        tracing::debug!(count = blocked.len(), "block list loaded");

        Self {
            blocked: Mutex::new(blocked),
            store,
        }
    }

    pub async fn is_blocked(&self, id: UserId) -> bool {
        self.blocked.lock().await.contains(&id)
    }

    /// Returns `true` when `id` was not blocked before.
    pub async fn block(&self, id: UserId) -> bool {
        let mut set = self.blocked.lock().await;
        let added = set.insert(id);
        self.persist(&set);
        added
    }

    /// Returns `true` when `id` was blocked before.
    pub async fn unblock(&self, id: UserId) -> bool {
        let mut set = self.blocked.lock().await;
        let removed = set.remove(&id);
        self.persist(&set);
        removed
    }

    /// Blocked ids in ascending order.
    pub async fn list_all(&self) -> Vec<UserId> {
        self.blocked.lock().await.iter().copied().collect()
    }

    fn persist(&self, set: &BTreeSet<UserId>) {
        if let Err(e) = self.store.save(&BlockDocument::from_set(set)) {
            tracing::warn!(error = %e, "failed to persist block list");
        }
    }
}
