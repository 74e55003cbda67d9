use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::stream::unfold;
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::{AdapterBody, AdapterHandle, Item};
use crate::combinators::join_discarding;
use crate::stream::Stream;

/// `SignalAllDone(after: list, message)`: n-ary-join-by-completion;
/// identical semantics to `SignalClient` but waits on every input stream
/// in a list before yielding once.
pub struct SignalAllDone {
    node_id: Uuid,
    after: Vec<Arc<AdapterHandle>>,
    message: Value,
}

impl SignalAllDone {
    pub fn new(node_id: Uuid, after: Vec<Arc<AdapterHandle>>, message: Value) -> Self {
        Self {
            node_id,
            after,
            message,
        }
    }
}

#[async_trait]
impl AdapterBody for SignalAllDone {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let streams = join_all(self.after.iter().map(|a| a.get_or_create_stream())).await;
        let message = self.message.clone();
        let source = unfold(Some(()), move |state| {
            let streams = streams.clone();
            let message = message.clone();
            async move {
                state?;
                match join_discarding(&streams).await {
                    Ok(()) => Some((Ok(message), None)),
                    Err(e) => Some((Err(e), None)),
                }
            }
        });
        stream.start_from_async_iterator(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::greet_me::GreetMe;

    #[tokio::test]
    async fn yields_once_after_every_input_closes() {
        let a = AdapterHandle::new(Arc::new(GreetMe::new(Uuid::new_v4(), "Hello", "World 1")));
        let b = AdapterHandle::new(Arc::new(GreetMe::new(Uuid::new_v4(), "Hello", "World 2")));
        let adapter = SignalAllDone::new(Uuid::new_v4(), vec![a, b], serde_json::json!("done"));

        let stream: Stream<Item> = Stream::new();
        adapter.start(&stream).await;
        let mut cursor = stream.cursor();
        assert_eq!(cursor.next().await.unwrap().unwrap(), serde_json::json!("done"));
        assert!(cursor.next().await.is_none());
    }
}
