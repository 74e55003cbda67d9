use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::adapter::{AdapterBody, AdapterHandle, Item};
use crate::combinators::zip_into;
use crate::stream::Stream;

/// `Zip2(lhs, rhs)`: binary zip; yields `(lhs_i, rhs_i)` pairs (as a
/// two-element JSON array); terminates when either side terminates.
pub struct Zip2 {
    node_id: Uuid,
    lhs: Arc<AdapterHandle>,
    rhs: Arc<AdapterHandle>,
}

impl Zip2 {
    pub fn new(node_id: Uuid, lhs: Arc<AdapterHandle>, rhs: Arc<AdapterHandle>) -> Self {
        Self { node_id, lhs, rhs }
    }
}

#[async_trait]
impl AdapterBody for Zip2 {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let lhs = self.lhs.get_or_create_stream().await;
        let rhs = self.rhs.get_or_create_stream().await;
        zip_into(stream, lhs, rhs);
    }
}
