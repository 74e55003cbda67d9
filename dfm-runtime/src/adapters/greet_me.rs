use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::adapter::{AdapterBody, Item};
use crate::caching::{cached_or_produce, CachingIterator};
use crate::stream::Stream;

/// `GreetMe(name)` with config `{greeting}`: nullary; yields
/// `"{greeting} {name}"`. The canonical hello-world adapter used across
/// end-to-end fixtures, and the adapter the caching fixture (spec §4.2,
/// §8) is defined against — this is the one real adapter wired to a
/// [`CachingIterator`], so the cache-hit/sentinel path is reachable from
/// an actual pipeline run rather than only from `caching.rs`'s own tests.
pub struct GreetMe {
    node_id: Uuid,
    greeting: String,
    name: String,
    force_compute: bool,
    cache: Option<Arc<dyn CachingIterator>>,
}

impl GreetMe {
    pub fn new(node_id: Uuid, greeting: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_caching(node_id, greeting, name, false, None)
    }

    pub fn with_caching(
        node_id: Uuid,
        greeting: impl Into<String>,
        name: impl Into<String>,
        force_compute: bool,
        cache: Option<Arc<dyn CachingIterator>>,
    ) -> Self {
        Self {
            node_id,
            greeting: greeting.into(),
            name: name.into(),
            force_compute,
            cache,
        }
    }
}

#[async_trait]
impl AdapterBody for GreetMe {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let greeting = self.greeting.clone();
        let name = self.name.clone();
        let produce = || async move { Ok(vec![Item::from(format!("{greeting} {name}"))]) };

        let result = match &self.cache {
            Some(cache) => cached_or_produce(cache.as_ref(), 1, self.force_compute, produce).await,
            None => produce().await,
        };

        match result {
            Ok(mut items) => stream.start_from_single(items.pop().expect("GreetMe always yields one item")),
            Err(e) => stream.start_from_async_iterator(tokio_stream::once(Err(e))),
        }
    }

    fn caching_iterator(&self) -> Option<Arc<dyn CachingIterator>> {
        self.cache.clone()
    }
}
