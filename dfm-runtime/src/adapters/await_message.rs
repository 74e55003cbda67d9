use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dfm_core::function_call::{AwaitMessage as AwaitMessageNode, Constant, FunctionCall, NodeMeta};
use dfm_core::{DfmError, AWAIT_MESSAGE_MAX_RESCHEDULES};
use futures_util::stream::unfold;
use uuid::Uuid;

use crate::adapter::{AdapterBody, Item};
use crate::request::DfmRequest;
use crate::stream::Stream;

/// `AwaitMessage(mailbox, body, wait_count, sleeptime)` — the only
/// self-rescheduling primitive in the core. A state machine with three
/// outcomes per tick: mailbox hit (splice a `Constant` over this node's
/// own id in `body` and schedule the body immediately), mailbox miss
/// under the reschedule bound (clone with `wait_count + 1` and schedule
/// *this* node at `now + sleeptime`), or miss at the bound (emit an
/// error and stop).
pub struct AwaitMessage {
    node: AwaitMessageNode,
    request: DfmRequest,
}

impl AwaitMessage {
    pub fn new(node: AwaitMessageNode, request: DfmRequest) -> Self {
        Self { node, request }
    }
}

#[async_trait]
impl AdapterBody for AwaitMessage {
    fn node_id(&self) -> Uuid {
        self.node.meta.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let node = self.node.clone();
        let request = self.request.clone();
        let source = unfold(Some(()), move |state| {
            let node = node.clone();
            let request = request.clone();
            async move {
                state?;
                match tick(&node, &request).await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                }
            }
        });
        stream.start_from_async_iterator(source);
    }
}

async fn tick(node: &AwaitMessageNode, request: &DfmRequest) -> Result<(), DfmError> {
    let node_id = node.meta.node_id;
    let this_site = request.this_site().to_string();

    let message = request.get_message(&node.mailbox).await?;
    if let Some(value) = message {
        let mut body = node.body.clone();
        body.insert(
            node_id,
            FunctionCall::Constant(Constant {
                meta: NodeMeta::new(node_id),
                value,
            }),
        );
        return request.schedule_body(this_site, node_id, body, None).await;
    }

    if node.wait_count < AWAIT_MESSAGE_MAX_RESCHEDULES {
        let mut rescheduled = node.clone();
        rescheduled.wait_count += 1;
        let deadline = Utc::now() + ChronoDuration::milliseconds((node.sleeptime * 1000.0) as i64);
        return request
            .schedule_node(
                this_site,
                Vec::new(),
                FunctionCall::AwaitMessage(rescheduled),
                Some(deadline),
            )
            .await;
    }

    let err = DfmError::server(format!(
        "AwaitMessage on mailbox '{}' exceeded {} reschedules",
        node.mailbox, AWAIT_MESSAGE_MAX_RESCHEDULES
    ));
    request.send_error(node_id, err.clone()).await?;
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfm_transport::{Channel, MockTransport, Transport};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn sample_node(wait_count: u32) -> AwaitMessageNode {
        let node_id = Uuid::new_v4();
        AwaitMessageNode {
            meta: NodeMeta::new(node_id),
            mailbox: "my_mailbox".to_string(),
            body: HashMap::new(),
            wait_count,
            sleeptime: 1.0,
        }
    }

    #[tokio::test]
    async fn mailbox_hit_splices_a_constant_and_schedules_the_body_immediately() {
        let transport = Arc::new(MockTransport::new());
        let request_id = Uuid::new_v4();
        let request = DfmRequest::new(transport.clone(), "A", "A", request_id);
        transport
            .set_mailbox(request_id, "my_mailbox", &serde_json::json!("Some Value"))
            .await
            .unwrap();

        let node = sample_node(0);
        let node_id = node.meta.node_id;
        let adapter = AwaitMessage::new(node, request);

        let stream: Stream<Item> = Stream::new();
        adapter.start(&stream).await;
        let mut cursor = stream.cursor();
        assert!(cursor.next().await.is_none());

        assert_eq!(transport.pending_len(Channel::Execute), 1);
        let delivery = transport.consume_job(Channel::Execute, "test").await.unwrap().unwrap();
        let spliced = delivery.item.execute.body.get(&node_id).unwrap();
        match spliced {
            FunctionCall::Constant(c) => assert_eq!(c.value, serde_json::json!("Some Value")),
            other => panic!("expected Constant, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mailbox_miss_reschedules_with_incremented_wait_count() {
        let transport = Arc::new(MockTransport::new());
        let request_id = Uuid::new_v4();
        let request = DfmRequest::new(transport.clone(), "A", "A", request_id);

        let node = sample_node(1);
        let node_id = node.meta.node_id;
        let adapter = AwaitMessage::new(node, request);

        let stream: Stream<Item> = Stream::new();
        adapter.start(&stream).await;
        let mut cursor = stream.cursor();
        assert!(cursor.next().await.is_none());

        assert_eq!(transport.pending_len(Channel::Execute), 0);
        assert_eq!(transport.pending_len(Channel::Scheduler), 1);
        let delivery = transport
            .consume_job(Channel::Scheduler, "test")
            .await
            .unwrap()
            .unwrap();
        let rescheduled = delivery.item.execute.body.get(&node_id).unwrap();
        match rescheduled {
            FunctionCall::AwaitMessage(a) => assert_eq!(a.wait_count, 2),
            other => panic!("expected AwaitMessage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_reschedule_budget_emits_an_error() {
        let transport = Arc::new(MockTransport::new());
        let request_id = Uuid::new_v4();
        let request = DfmRequest::new(transport.clone(), "A", "A", request_id);
        let node = sample_node(AWAIT_MESSAGE_MAX_RESCHEDULES);
        let adapter = AwaitMessage::new(node, request);

        let stream: Stream<Item> = Stream::new();
        adapter.start(&stream).await;
        let mut cursor = stream.cursor();
        assert!(cursor.next().await.unwrap().is_err());
        assert_eq!(transport.get_responses(request_id).await.unwrap().len(), 1);
    }
}
