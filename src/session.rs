//! In-memory session store for context items
//!
//! Owns every `ContextItem` captured during a session. The engine only
//! reads terminal state; the sole mutation it performs is the usage
//! bookkeeping written back after a request consumes an item.

use crate::ranking::ContextItem;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// Session-scoped context item store
#[derive(Default)]
pub struct SessionStore {
    items: DashMap<String, ContextItem>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item; ids are unique within the session.
    pub fn upsert(&self, item: ContextItem) -> String {
        let id = item.id.clone();
        self.items.insert(id.clone(), item);
        id
    }

    pub fn remove(&self, id: &str) -> Option<ContextItem> {
        self.items.remove(id).map(|(_, item)| item)
    }

    pub fn clear(&self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current items, oldest first.
    pub fn snapshot(&self) -> Vec<ContextItem> {
        let mut items: Vec<ContextItem> =
            self.items.iter().map(|entry| entry.value().clone()).collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    /// Record that a request delivered these items to the model.
    pub fn mark_used(&self, ids: &[String], message_id: &str) {
        let now = Utc::now();
        let mut touched = 0usize;
        for id in ids {
            if let Some(mut entry) = self.items.get_mut(id) {
                entry.last_used_at = Some(now);
                entry.last_used_in_message_id = Some(message_id.to_string());
                entry.usage_count += 1;
                touched += 1;
            }
        }
        debug!(touched, message_id, "usage bookkeeping written back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::ContextItemKind;

    #[test]
    fn test_upsert_and_snapshot_ordering() {
        let store = SessionStore::new();
        let first = ContextItem::new(ContextItemKind::Command, "ls");
        let mut second = ContextItem::new(ContextItemKind::Command, "pwd");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let first_id = store.upsert(first);
        store.upsert(second);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, first_id);
    }

    #[test]
    fn test_upsert_replaces_same_id() {
        let store = SessionStore::new();
        let mut item = ContextItem::new(ContextItemKind::File, "v1");
        let id = item.id.clone();
        store.upsert(item.clone());
        item.content = "v2".to_string();
        store.upsert(item);

        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].content, "v2");
        assert_eq!(store.snapshot()[0].id, id);
    }

    #[test]
    fn test_mark_used_updates_bookkeeping() {
        let store = SessionStore::new();
        let id = store.upsert(ContextItem::new(ContextItemKind::CommandOutput, "out"));
        store.mark_used(&[id.clone(), "missing".to_string()], "msg-1");

        let item = store.snapshot().remove(0);
        assert_eq!(item.usage_count, 1);
        assert!(item.last_used_at.is_some());
        assert_eq!(item.last_used_in_message_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SessionStore::new();
        let id = store.upsert(ContextItem::new(ContextItemKind::Selection, "sel"));
        assert!(store.remove(&id).is_some());
        assert!(store.remove(&id).is_none());

        store.upsert(ContextItem::new(ContextItemKind::Selection, "sel2"));
        store.clear();
        assert!(store.is_empty());
    }
}
