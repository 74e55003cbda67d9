use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::unfold;
use uuid::Uuid;

use crate::adapter::{read_single_input, AdapterBody, AdapterHandle, Item};
use crate::request::DfmRequest;
use crate::stream::Stream;

/// `SendMessage(data, target_site, mailbox)`: unary; reads one item from
/// its `data` input, and calls `send_message` with the item's string
/// representation as the payload.
pub struct SendMessage {
    node_id: Uuid,
    data: Arc<AdapterHandle>,
    target_site: String,
    mailbox: String,
    request: DfmRequest,
}

impl SendMessage {
    pub fn new(
        node_id: Uuid,
        data: Arc<AdapterHandle>,
        target_site: String,
        mailbox: String,
        request: DfmRequest,
    ) -> Self {
        Self {
            node_id,
            data,
            target_site,
            mailbox,
            request,
        }
    }
}

/// The source's payload is always a string (`str(item)`); a bare JSON
/// string serializes without quotes here, everything else falls back to
/// its compact JSON rendering.
fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl AdapterBody for SendMessage {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let request = self.request.clone();
        let data = self.data.clone();
        let node_id = self.node_id;
        let target_site = self.target_site.clone();
        let mailbox = self.mailbox.clone();
        let source = unfold(Some(()), move |state| {
            let request = request.clone();
            let data = data.clone();
            let target_site = target_site.clone();
            let mailbox = mailbox.clone();
            async move {
                state?;
                let item = match read_single_input(&data).await {
                    Ok(item) => item,
                    Err(e) => return Some((Err(e), None)),
                };
                let payload = serde_json::Value::String(stringify(&item));
                match request.send_message(node_id, &target_site, &mailbox, payload).await {
                    Ok(()) => None,
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
    use crate::adapters::constant::Constant;
    use std::sync::Arc;

    #[tokio::test]
    async fn sends_the_first_input_item_as_a_string_payload() {
        let transport = Arc::new(dfm_transport::MockTransport::new());
        let request_id = Uuid::new_v4();
        let request = DfmRequest::new(transport.clone(), "A", "A", request_id);

        let data = AdapterHandle::new(Arc::new(Constant::new(Uuid::new_v4(), serde_json::json!("hi"))));
        let adapter = SendMessage::new(
            Uuid::new_v4(),
            data,
            "A".to_string(),
            "inbox".to_string(),
            request.clone(),
        );

        let stream: Stream<Item> = Stream::new();
        adapter.start(&stream).await;
        let mut cursor = stream.cursor();
        assert!(cursor.next().await.is_none());
        assert_eq!(
            request.get_message("inbox").await.unwrap(),
            Some(serde_json::json!("hi"))
        );
    }
}
