use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::unfold;
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::{AdapterBody, AdapterHandle, Item};
use crate::combinators::join_discarding;
use crate::stream::Stream;

/// `SignalClient(after, message)`: unary-join-by-completion; reads all
/// items from one input stream (discarding values, but honouring
/// exceptions) and then yields `message` once. The standard "done"
/// beacon.
pub struct SignalClient {
    node_id: Uuid,
    after: Arc<AdapterHandle>,
    message: Value,
}

impl SignalClient {
    pub fn new(node_id: Uuid, after: Arc<AdapterHandle>, message: Value) -> Self {
        Self {
            node_id,
            after,
            message,
        }
    }
}

#[async_trait]
impl AdapterBody for SignalClient {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let after = self.after.get_or_create_stream().await;
        let message = self.message.clone();
        let source = unfold(Some(()), move |state| {
            let after = after.clone();
            let message = message.clone();
            async move {
                state?;
                match join_discarding(std::slice::from_ref(&after)).await {
                    Ok(()) => Some((Ok(message), None)),
                    Err(e) => Some((Err(e), None)),
                }
            }
        });
        stream.start_from_async_iterator(source);
    }
}
