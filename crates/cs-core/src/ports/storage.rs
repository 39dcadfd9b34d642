use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// A key changed in durable storage. `new_value` is `None` on removal.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<Value>,
}

/// Durable local key-value storage with change notification.
#[async_trait]
pub trait KeyValueStorePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange>;
}

/// Read and deserialize a JSON value stored under `key`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStorePort,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .with_context(|| format!("decode stored value failed: {key}")),
        None => Ok(None),
    }
}

/// Serialize and store `value` under `key`.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStorePort,
    key: &str,
    value: &T,
) -> Result<()> {
    let value =
        serde_json::to_value(value).with_context(|| format!("encode value failed: {key}"))?;
    store.set(key, value).await
}

#[cfg(test)]
mockall::mock! {
    pub KeyValueStore {}

    #[async_trait]
    impl KeyValueStorePort for KeyValueStore {
        async fn get(&self, key: &str) -> Result<Option<Value>>;
        async fn set(&self, key: &str, value: Value) -> Result<()>;
        async fn remove(&self, key: &str) -> Result<()>;
        fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;

    #[tokio::test]
    async fn save_json_encodes_before_storing() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_set()
            .with(eq("numbers"), eq(json!([1, 2, 3])))
            .times(1)
            .returning(|_, _| Ok(()));

        save_json(&store, "numbers", &[1, 2, 3]).await.unwrap();
    }

    #[tokio::test]
    async fn load_json_reports_undecodable_values() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some(json!({"not": "a list"}))));

        let err = load_json::<Vec<u32>>(&store, "numbers").await.unwrap_err();
        assert!(err.to_string().contains("numbers"));
    }

    #[tokio::test]
    async fn load_json_missing_key_is_none() {
        let mut store = MockKeyValueStore::new();
        store.expect_get().times(1).returning(|_| Ok(None));

        let loaded: Option<Vec<u32>> = load_json(&store, "absent").await.unwrap();
        assert!(loaded.is_none());
    }
}
