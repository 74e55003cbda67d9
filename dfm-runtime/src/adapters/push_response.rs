use async_trait::async_trait;
use dfm_core::Response;
use futures_util::stream::unfold;
use uuid::Uuid;

use crate::adapter::{AdapterBody, Item};
use crate::request::DfmRequest;
use crate::stream::Stream;

/// `PushResponse(response)`: nullary; its body awaits
/// `push_local_response(response)` — the vehicle that carries cross-site
/// responses home. By the time this adapter runs it has already been
/// routed to `home_site` by the sending site's `send_*` call, so the
/// local append is always correct.
pub struct PushResponse {
    node_id: Uuid,
    response: Response,
    request: DfmRequest,
}

impl PushResponse {
    pub fn new(node_id: Uuid, response: Response, request: DfmRequest) -> Self {
        Self {
            node_id,
            response,
            request,
        }
    }
}

#[async_trait]
impl AdapterBody for PushResponse {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let request = self.request.clone();
        let response = self.response.clone();
        let source = unfold(Some(()), move |state| {
            let request = request.clone();
            let response = response.clone();
            async move {
                state?;
                match request.push_local_response(response).await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                }
            }
        });
        stream.start_from_async_iterator(source);
    }
}
