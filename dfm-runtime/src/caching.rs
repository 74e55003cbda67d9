//! The caching collaborator: a content-addressed key derived from an
//! adapter's config + params + (recursively) its inputs' hash keys, and a
//! filesystem-backed store keyed by that hash.
//!
//! Cache folder layout: `<base>/<hash_key>/_dfm_cache_metadata.json`
//! (written on start), `<base>/<hash_key>/_dfm_cache_sentinel.json`
//! (written only on successful completion), plus one file per item. On
//! exception the sentinel is absent, signalling an incomplete cache that
//! must not be reused — "sentinel exists" is the canonical completeness
//! signal; no atomic rename is attempted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use dfm_core::{DfmError, DfmResult};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::adapter::Item;

const METADATA_FILE: &str = "_dfm_cache_metadata.json";
const SENTINEL_FILE: &str = "_dfm_cache_sentinel.json";

/// Derive the content-addressed hash key for an adapter: a stable JSON
/// serialization of `{config, params, inputs}` — `node_id` and any
/// wall-clock fields never enter this payload — SHA-256'd and
/// hex-encoded. `serde_json::Value`'s default `Map` is a `BTreeMap`
/// (this crate does not enable the `preserve_order` feature anywhere in
/// the workspace), so key iteration order is already canonical without
/// extra sorting.
pub fn compute_hash_key(config: &Value, params: &Value, input_hash_keys: &[String]) -> String {
    let payload = serde_json::json!({
        "config": config,
        "params": params,
        "inputs": input_hash_keys,
    });
    let canonical = serde_json::to_string(&payload).expect("json values always serialize");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Collaborator object an adapter may hold (never the adapter itself) to
/// cache its produced items across runs. Constructed lazily via an
/// adapter-overridable hook; adapters that don't want caching simply
/// leave `AdapterBody::caching_iterator` returning `None`.
#[async_trait]
pub trait CachingIterator: Send + Sync {
    fn pipeline_hash_key(&self) -> &str;

    /// Returns the cached items if a complete cache exists, `None` on a
    /// cache miss (including a partial/incomplete cache — that must not
    /// be reused).
    async fn load_values_from_cache(&self, expected_n: usize) -> DfmResult<Option<Vec<Item>>>;

    async fn write_value_to_cache(&self, idx: usize, item: &Item) -> DfmResult<()>;

    /// Write the metadata marker; called once when production starts.
    async fn write_metadata(&self) -> DfmResult<()>;

    /// Write the sentinel marker; called only after every item has been
    /// written successfully.
    async fn write_sentinel(&self) -> DfmResult<()>;
}

/// Filesystem-backed [`CachingIterator`].
pub struct FileCachingIterator {
    base: PathBuf,
    hash_key: String,
}

impl FileCachingIterator {
    pub fn new(base: impl Into<PathBuf>, hash_key: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            hash_key: hash_key.into(),
        }
    }

    fn folder(&self) -> PathBuf {
        self.base.join(&self.hash_key)
    }

    fn metadata_path(&self) -> PathBuf {
        self.folder().join(METADATA_FILE)
    }

    fn sentinel_path(&self) -> PathBuf {
        self.folder().join(SENTINEL_FILE)
    }

    fn item_path(&self, idx: usize) -> PathBuf {
        self.folder().join(format!("{idx}.json"))
    }

    fn io_err(e: std::io::Error) -> DfmError {
        DfmError::server(format!("cache io error: {e}"))
    }
}

#[async_trait]
impl CachingIterator for FileCachingIterator {
    fn pipeline_hash_key(&self) -> &str {
        &self.hash_key
    }

    async fn load_values_from_cache(&self, expected_n: usize) -> DfmResult<Option<Vec<Item>>> {
        if !self.sentinel_path().exists() {
            return Ok(None);
        }
        let mut items = Vec::with_capacity(expected_n);
        for idx in 0..expected_n {
            let path = self.item_path(idx);
            let content = tokio::fs::read_to_string(&path).await.map_err(Self::io_err)?;
            let item: Item = serde_json::from_str(&content)
                .map_err(|e| DfmError::server(format!("corrupt cache entry: {e}")))?;
            items.push(item);
        }
        Ok(Some(items))
    }

    async fn write_value_to_cache(&self, idx: usize, item: &Item) -> DfmResult<()> {
        tokio::fs::create_dir_all(self.folder()).await.map_err(Self::io_err)?;
        let serialized = serde_json::to_vec(item)
            .map_err(|e| DfmError::server(format!("cache serialization error: {e}")))?;
        tokio::fs::write(self.item_path(idx), serialized)
            .await
            .map_err(Self::io_err)
    }

    async fn write_metadata(&self) -> DfmResult<()> {
        tokio::fs::create_dir_all(self.folder()).await.map_err(Self::io_err)?;
        let metadata = serde_json::json!({
            "hash_key": self.hash_key,
            "written_at": Utc::now().to_rfc3339(),
        });
        tokio::fs::write(
            self.metadata_path(),
            serde_json::to_vec(&metadata).expect("json always serializes"),
        )
        .await
        .map_err(Self::io_err)
    }

    async fn write_sentinel(&self) -> DfmResult<()> {
        tokio::fs::write(self.sentinel_path(), b"{}")
            .await
            .map_err(Self::io_err)
    }
}

/// Run `produce` (a closure yielding the adapter's items in order) through
/// the cache: on a complete cache hit, return the cached items without
/// invoking `produce`; otherwise produce fresh, write each item as it
/// arrives, and write the sentinel only if every item was produced
/// successfully. `force_compute` bypasses both the read and the write, as
/// `FunctionCall::force_compute` requires.
pub async fn cached_or_produce<F, Fut>(
    cache: &dyn CachingIterator,
    expected_n: usize,
    force_compute: bool,
    produce: F,
) -> DfmResult<Vec<Item>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = DfmResult<Vec<Item>>>,
{
    if !force_compute {
        if let Some(cached) = cache.load_values_from_cache(expected_n).await? {
            return Ok(cached);
        }
    }

    cache.write_metadata().await?;
    let items = produce().await?;
    if !force_compute {
        for (idx, item) in items.iter().enumerate() {
            cache.write_value_to_cache(idx, item).await?;
        }
        cache.write_sentinel().await?;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_key_is_deterministic_across_calls() {
        let config = serde_json::json!({"greeting": "Hello"});
        let params = serde_json::json!({"name": "World"});
        let a = compute_hash_key(&config, &params, &[]);
        let b = compute_hash_key(&config, &params, &[]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_key_changes_with_inputs() {
        let config = serde_json::json!({});
        let params = serde_json::json!({});
        let a = compute_hash_key(&config, &params, &[]);
        let b = compute_hash_key(&config, &params, &["upstream-key".to_string()]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn sentinel_absent_until_successful_completion() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCachingIterator::new(dir.path(), "abc123");
        assert!(cache.load_values_from_cache(1).await.unwrap().is_none());

        cache.write_metadata().await.unwrap();
        assert!(dir.path().join("abc123").join(METADATA_FILE).exists());
        assert!(!dir.path().join("abc123").join(SENTINEL_FILE).exists());

        cache.write_value_to_cache(0, &Item::from("value")).await.unwrap();
        assert!(cache.load_values_from_cache(1).await.unwrap().is_none());

        cache.write_sentinel().await.unwrap();
        let loaded = cache.load_values_from_cache(1).await.unwrap().unwrap();
        assert_eq!(loaded, vec![Item::from("value")]);
    }

    #[tokio::test]
    async fn cached_or_produce_skips_producer_on_complete_cache() {
        let dir = tempfile::tempdir().unwrap();
        let hash_key = compute_hash_key(&serde_json::json!({}), &serde_json::json!({}), &[]);
        let cache = FileCachingIterator::new(dir.path(), hash_key);

        let first = cached_or_produce(&cache, 1, false, || async {
            Ok(vec![Item::from("computed")])
        })
        .await
        .unwrap();
        assert_eq!(first, vec![Item::from("computed")]);

        let second = cached_or_produce(&cache, 1, false, || async {
            panic!("must not recompute on a cache hit")
        })
        .await
        .unwrap();
        assert_eq!(second, vec![Item::from("computed")]);
    }

    #[tokio::test]
    async fn force_compute_bypasses_cache_read_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCachingIterator::new(dir.path(), "forced");
        let result = cached_or_produce(&cache, 1, true, || async { Ok(vec![Item::from(1)]) })
            .await
            .unwrap();
        assert_eq!(result, vec![Item::from(1)]);
        assert!(!dir.path().join("forced").join(SENTINEL_FILE).exists());
    }
}
