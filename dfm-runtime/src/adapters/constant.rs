use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::{AdapterBody, Item};
use crate::stream::Stream;

/// `Constant(value)`: nullary; yields `value` once.
pub struct Constant {
    node_id: Uuid,
    value: Value,
}

impl Constant {
    pub fn new(node_id: Uuid, value: Value) -> Self {
        Self { node_id, value }
    }
}

#[async_trait]
impl AdapterBody for Constant {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        stream.start_from_single(self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_its_value_exactly_once() {
        let stream: Stream<Item> = Stream::new();
        let adapter = Constant::new(Uuid::new_v4(), serde_json::json!(42));
        adapter.start(&stream).await;
        let mut cursor = stream.cursor();
        assert_eq!(cursor.next().await.unwrap().unwrap(), serde_json::json!(42));
        assert!(cursor.next().await.is_none());
    }
}
