use async_trait::async_trait;
use futures_util::stream::unfold;
use uuid::Uuid;

use crate::adapter::{AdapterBody, Item};
use crate::request::DfmRequest;
use crate::stream::Stream;

/// `ReceiveMessage(mailbox, message, target_site)`: nullary; calls
/// `send_message` on the Request Context — it is how a site *delivers* a
/// message into someone's mailbox after being shipped cross-site by
/// `DfmRequest::send_message`.
pub struct ReceiveMessage {
    node_id: Uuid,
    mailbox: String,
    message: serde_json::Value,
    target_site: String,
    request: DfmRequest,
}

impl ReceiveMessage {
    pub fn new(
        node_id: Uuid,
        mailbox: String,
        message: serde_json::Value,
        target_site: String,
        request: DfmRequest,
    ) -> Self {
        Self {
            node_id,
            mailbox,
            message,
            target_site,
            request,
        }
    }
}

#[async_trait]
impl AdapterBody for ReceiveMessage {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let request = self.request.clone();
        let node_id = self.node_id;
        let mailbox = self.mailbox.clone();
        let message = self.message.clone();
        let target_site = self.target_site.clone();
        let source = unfold(Some(()), move |state| {
            let request = request.clone();
            let mailbox = mailbox.clone();
            let message = message.clone();
            let target_site = target_site.clone();
            async move {
                state?;
                match request.send_message(node_id, &target_site, &mailbox, message).await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                }
            }
        });
        stream.start_from_async_iterator(source);
    }
}
