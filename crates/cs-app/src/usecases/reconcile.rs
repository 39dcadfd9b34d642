use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use cs_core::clipboard::ClipboardItem;
use cs_core::ids::ItemId;
use cs_core::ports::{load_json, save_json, KeyValueStorePort};
use tokio::sync::Mutex;
use tracing::debug;

/// Storage key of the cached, visible item list.
pub const ITEMS_KEY: &str = "clipboardItems";

fn newest_first(a: &ClipboardItem, b: &ClipboardItem) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.as_str().cmp(b.id.as_str()))
}

/// Merge an authoritative server listing with the local cache.
///
/// Server items always win. A cached item survives only while it is pending
/// and its id is unknown to the server. The output is sorted newest first and
/// is stable for identical inputs.
pub fn merge_items(server: &[ClipboardItem], cached: &[ClipboardItem]) -> Vec<ClipboardItem> {
    let mut seen: HashSet<&ItemId> = HashSet::new();
    let mut merged: Vec<ClipboardItem> = Vec::with_capacity(server.len() + cached.len());

    for item in server.iter().filter(|item| item.is_visible()) {
        if seen.insert(&item.id) {
            merged.push(item.clone());
        }
    }

    for item in cached {
        if item.pending && item.is_visible() && seen.insert(&item.id) {
            merged.push(item.clone());
        }
    }

    merged.sort_by(newest_first);
    merged
}

/// The single visible item list, persisted in durable storage.
///
/// Every mutation loads, transforms and fully replaces the stored list under
/// one write lock, then normalizes it: visible only, unique ids, newest
/// first, capped at `max_items`.
pub struct ItemCache {
    store: Arc<dyn KeyValueStorePort>,
    max_items: usize,
    write_lock: Mutex<()>,
}

impl ItemCache {
    pub fn new(store: Arc<dyn KeyValueStorePort>, max_items: usize) -> Self {
        Self {
            store,
            max_items,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn items(&self) -> Result<Vec<ClipboardItem>> {
        Ok(load_json(self.store.as_ref(), ITEMS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn pending_items(&self) -> Result<Vec<ClipboardItem>> {
        let mut pending: Vec<_> = self
            .items()
            .await?
            .into_iter()
            .filter(|item| item.pending)
            .collect();
        // Oldest first, so flushes preserve capture order.
        pending.reverse();
        Ok(pending)
    }

    /// Replace the cache with the merge of `server` and the current cache.
    pub async fn reconcile(&self, server: Vec<ClipboardItem>) -> Result<Vec<ClipboardItem>> {
        self.mutate(|cached| merge_items(&server, &cached)).await
    }

    /// Upsert an item received from another device.
    pub async fn apply_remote_insert(&self, item: ClipboardItem) -> Result<Vec<ClipboardItem>> {
        if !item.is_visible() {
            return self.apply_remote_soft_delete(&item.id).await;
        }
        self.mutate(move |mut items| {
            items.retain(|existing| existing.id != item.id);
            items.insert(0, item);
            items
        })
        .await
    }

    pub async fn apply_remote_soft_delete(&self, id: &ItemId) -> Result<Vec<ClipboardItem>> {
        self.remove(id).await
    }

    /// Upsert a confirmed local upload, dropping pending records it supersedes.
    pub async fn upsert_confirmed(&self, item: ClipboardItem) -> Result<Vec<ClipboardItem>> {
        self.mutate(move |mut items| {
            items.retain(|existing| {
                existing.id != item.id
                    && !(existing.pending
                        && existing.content_hash == item.content_hash
                        && existing.device_id == item.device_id)
            });
            items.insert(0, item);
            items
        })
        .await
    }

    /// Store a pending record unless one with the same fingerprint exists;
    /// returns whichever record is now cached.
    pub async fn add_pending(&self, item: ClipboardItem) -> Result<ClipboardItem> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.items().await?;

        if let Some(existing) = items
            .iter()
            .find(|existing| existing.pending && existing.content_hash == item.content_hash)
        {
            debug!(item_id = %existing.id, "pending record already cached");
            return Ok(existing.clone());
        }

        items.insert(0, item.clone());
        self.store_normalized(items).await?;
        Ok(item)
    }

    /// Swap a pending record for its confirmed counterpart.
    pub async fn replace(
        &self,
        pending_id: &ItemId,
        confirmed: ClipboardItem,
    ) -> Result<Vec<ClipboardItem>> {
        let pending_id = pending_id.clone();
        self.mutate(move |mut items| {
            items.retain(|existing| existing.id != pending_id && existing.id != confirmed.id);
            items.push(confirmed);
            items
        })
        .await
    }

    pub async fn remove(&self, id: &ItemId) -> Result<Vec<ClipboardItem>> {
        let id = id.clone();
        self.mutate(move |mut items| {
            items.retain(|existing| existing.id != id);
            items
        })
        .await
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(ITEMS_KEY).await
    }

    async fn mutate<F>(&self, apply: F) -> Result<Vec<ClipboardItem>>
    where
        F: FnOnce(Vec<ClipboardItem>) -> Vec<ClipboardItem>,
    {
        let _guard = self.write_lock.lock().await;
        let items = apply(self.items().await?);
        self.store_normalized(items).await
    }

    async fn store_normalized(&self, items: Vec<ClipboardItem>) -> Result<Vec<ClipboardItem>> {
        let mut seen = HashSet::new();
        let mut items: Vec<ClipboardItem> = items
            .into_iter()
            .filter(|item| item.is_visible() && seen.insert(item.id.clone()))
            .collect();
        items.sort_by(newest_first);
        items.truncate(self.max_items);

        save_json(self.store.as_ref(), ITEMS_KEY, &items).await?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use cs_core::clipboard::NewClipboardItem;
    use cs_core::ids::DeviceId;
    use cs_infra::storage::InMemoryKeyValueStore;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn new_item(content: &str, secs: i64) -> NewClipboardItem {
        NewClipboardItem {
            content: content.into(),
            content_hash: cs_core::fingerprint(content),
            user_id: None,
            device_id: DeviceId::from("device-a"),
            device_name: "A".into(),
            origin: "test".into(),
            created_at: at(secs),
            categories: vec![],
        }
    }

    fn confirmed(id: &str, content: &str, secs: i64) -> ClipboardItem {
        ClipboardItem::confirmed(ItemId::from(id), new_item(content, secs))
    }

    fn pending(content: &str, secs: i64) -> ClipboardItem {
        ClipboardItem::pending(new_item(content, secs))
    }

    fn cache(max_items: usize) -> ItemCache {
        ItemCache::new(Arc::new(InMemoryKeyValueStore::new()), max_items)
    }

    #[test]
    fn server_item_wins_over_cached_with_same_id() {
        let server = vec![confirmed("1", "server copy", 10)];
        let mut stale = confirmed("1", "cached copy", 10);
        stale.pending = true;

        let merged = merge_items(&server, &[stale]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "server copy");
    }

    #[test]
    fn only_pending_cached_items_survive_merge() {
        let server = vec![confirmed("1", "a", 10)];
        let cached = vec![pending("in flight", 20), confirmed("2", "gone remotely", 30)];

        let merged = merge_items(&server, &cached);
        let contents: Vec<_> = merged.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, vec!["in flight", "a"]);
    }

    #[test]
    fn merge_is_sorted_and_idempotent() {
        let server = vec![
            confirmed("1", "old", 1),
            confirmed("3", "new", 30),
            confirmed("2", "mid", 15),
            confirmed("4", "tie", 15),
        ];
        let cached = vec![pending("p", 20)];

        let once = merge_items(&server, &cached);
        let twice = merge_items(&server, &once);
        assert_eq!(once, twice);
        assert!(once.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn deleted_server_items_are_excluded() {
        let mut deleted = confirmed("1", "x", 1);
        deleted.is_deleted = true;
        assert!(merge_items(&[deleted], &[]).is_empty());
    }

    #[tokio::test]
    async fn remote_insert_upserts_and_caps() {
        let cache = cache(2);
        cache.apply_remote_insert(confirmed("1", "a", 1)).await.unwrap();
        cache.apply_remote_insert(confirmed("2", "b", 2)).await.unwrap();
        cache.apply_remote_insert(confirmed("3", "c", 3)).await.unwrap();
        let items = cache.apply_remote_insert(confirmed("3", "c", 3)).await.unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[tokio::test]
    async fn soft_delete_filters_item_out() {
        let cache = cache(10);
        cache.apply_remote_insert(confirmed("1", "a", 1)).await.unwrap();
        let items = cache.apply_remote_soft_delete(&ItemId::from("1")).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn pending_records_are_deduplicated_by_fingerprint() {
        let cache = cache(10);
        let first = cache.add_pending(pending("same", 1)).await.unwrap();
        let second = cache.add_pending(pending("same", 2)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(cache.pending_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_swaps_pending_for_confirmed() {
        let cache = cache(10);
        let stored = cache.add_pending(pending("text", 1)).await.unwrap();

        let items = cache
            .replace(&stored.id, confirmed("42", "text", 1))
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_str(), "42");
        assert!(!items[0].pending);
    }

    #[tokio::test]
    async fn confirmed_upload_supersedes_matching_pending_record() {
        let cache = cache(10);
        cache.add_pending(pending("text", 1)).await.unwrap();

        let items = cache.upsert_confirmed(confirmed("9", "text", 2)).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(!items[0].pending);
    }

    #[tokio::test]
    async fn pending_items_are_oldest_first() {
        let cache = cache(10);
        cache.add_pending(pending("first", 1)).await.unwrap();
        cache.add_pending(pending("second", 2)).await.unwrap();

        let pending = cache.pending_items().await.unwrap();
        assert_eq!(pending[0].content, "first");
        assert_eq!(pending[1].content, "second");
    }
}
