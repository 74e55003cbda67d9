use async_trait::async_trait;
use dfm_core::function_call::Execute as ExecuteNode;
use futures_util::stream::unfold;
use uuid::Uuid;

use crate::adapter::{AdapterBody, Item};
use crate::request::DfmRequest;
use crate::stream::Stream;

/// `Execute(site, body)`: nullary, control. Its body calls
/// `schedule_execute` on itself with `deadline = None` — it is the
/// federation boundary marker, not a value producer, so its stream closes
/// with no items on success.
pub struct Execute {
    node_id: Uuid,
    node: ExecuteNode,
    request: DfmRequest,
}

impl Execute {
    pub fn new(node: ExecuteNode, request: DfmRequest) -> Self {
        Self {
            node_id: node.meta.node_id,
            node,
            request,
        }
    }
}

#[async_trait]
impl AdapterBody for Execute {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let request = self.request.clone();
        let node = self.node.clone();
        let source = unfold(Some(()), move |state| {
            let request = request.clone();
            let node = node.clone();
            async move {
                state?;
                match request.schedule_execute(node, None).await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                }
            }
        });
        stream.start_from_async_iterator(source);
    }
}
