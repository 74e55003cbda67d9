//! The Adapter contract: arities, the lazy shared stream, and the hook
//! points (`prepare_to_send`, the caching collaborator) concrete adapters
//! plug into.

use std::sync::Arc;

use async_trait::async_trait;
use dfm_core::{DfmError, ResponseBody};
use serde_json::Value;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::caching::CachingIterator;
use crate::stream::Stream;

/// The item type every adapter stream carries. The runtime is generic
/// over `serde_json::Value` rather than a type parameter per adapter: the
/// graph is assembled at runtime from a heterogeneous mix of adapters
/// (`Site::pre_instantiate_adapter` resolves them by string `api_class`),
/// so a single dynamic payload type is what keeps the compiler and the
/// execution loop adapter-agnostic, matching the source's dynamically
/// typed `Any`-like item flow.
pub type Item = Value;

/// Behaviour a concrete adapter (`Constant`, `GreetMe`, `Zip2`, …)
/// implements. [`AdapterHandle`] wraps this to provide the "at most one
/// `Stream`, created lazily, shared across consumers" contract uniformly.
#[async_trait]
pub trait AdapterBody: Send + Sync {
    fn node_id(&self) -> Uuid;

    /// Start producing into `stream`. Called exactly once, the first time
    /// this adapter's stream is requested.
    async fn start(&self, stream: &Stream<Item>);

    /// Optional hook converting a produced item into a specifically
    /// shaped `ResponseBody` (e.g. a `ListTextureFiles` bundle with
    /// `metadata_url`/`metadata`/`urls`) instead of the default
    /// `ValueResponse` wrapping.
    fn prepare_to_send(&self, _item: &Item) -> Option<ResponseBody> {
        None
    }

    /// Optional caching collaborator. Adapters that don't want caching
    /// simply don't override this.
    fn caching_iterator(&self) -> Option<Arc<dyn CachingIterator>> {
        None
    }
}

/// Wraps an [`AdapterBody`] with the lazy, idempotent, shared-stream
/// contract: `get_or_create_stream()` starts the body's production on
/// first call and hands the identical `Stream` to every subsequent
/// caller, including concurrent ones.
pub struct AdapterHandle {
    body: Arc<dyn AdapterBody>,
    stream: OnceCell<Stream<Item>>,
}

impl AdapterHandle {
    pub fn new(body: Arc<dyn AdapterBody>) -> Arc<Self> {
        Arc::new(Self {
            body,
            stream: OnceCell::new(),
        })
    }

    pub fn node_id(&self) -> Uuid {
        self.body.node_id()
    }

    pub fn body(&self) -> &Arc<dyn AdapterBody> {
        &self.body
    }

    /// Idempotent: the first caller's invocation starts production, every
    /// other (possibly concurrent) caller awaits the same initialization
    /// and receives the same `Stream` handle.
    pub async fn get_or_create_stream(&self) -> Stream<Item> {
        self.stream
            .get_or_init(|| async {
                let stream = Stream::new();
                self.body.start(&stream).await;
                stream
            })
            .await
            .clone()
    }

    pub fn prepare_to_send(&self, item: &Item) -> Option<ResponseBody> {
        self.body.prepare_to_send(item)
    }
}

/// A single positional input: a value read once, fully, and handed to the
/// owning adapter's body as a whole (as opposed to streamed item-by-item)
/// — used by adapters like `SendMessage` that want exactly one upstream
/// value.
pub async fn read_single_input(input: &Arc<AdapterHandle>) -> Result<Item, DfmError> {
    let stream = input.get_or_create_stream().await;
    let mut cursor = stream.cursor();
    match cursor.next().await {
        Some(Ok(item)) => Ok(item),
        Some(Err(e)) => Err(e),
        None => Err(DfmError::data("expected one input item, stream closed empty")),
    }
}
