//! The Request Context (`DfmRequest`): the per-request facade over the
//! transport and site identity, and the single place the three-way
//! local/scheduler/execute/uplink routing decision is made.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dfm_core::function_call::{Execute, FunctionCall, NodeMeta, ReceiveMessage, PushResponse};
use dfm_core::{Body, DfmError, DfmResult, Job, Package, Response, Welcome};
use dfm_transport::{Channel, Transport, TransportError};
use tracing::Span;
use uuid::Uuid;

fn transport_err(e: TransportError) -> DfmError {
    DfmError::server(e.to_string())
}

/// Per-request object carrying `this_site`, `home_site`, `request_id`,
/// and a handle to the transport. Cheap to clone (an `Arc`-backed
/// transport plus three small owned fields) — adapters hold their own
/// clone rather than sharing a reference with a lifetime.
#[derive(Clone)]
pub struct DfmRequest {
    transport: Arc<dyn Transport>,
    this_site: String,
    home_site: String,
    request_id: Uuid,
}

impl DfmRequest {
    pub fn new(
        transport: Arc<dyn Transport>,
        this_site: impl Into<String>,
        home_site: impl Into<String>,
        request_id: Uuid,
    ) -> Self {
        Self {
            transport,
            this_site: this_site.into(),
            home_site: home_site.into(),
            request_id,
        }
    }

    pub fn this_site(&self) -> &str {
        &self.this_site
    }

    pub fn home_site(&self) -> &str {
        &self.home_site
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    fn is_local_to_home(&self) -> bool {
        self.this_site == self.home_site
    }

    /// A tracing span carrying this request's identity, entered once per
    /// `DfmRequest` and held for its lifetime — the Rust analogue of the
    /// source's `getLogger(name, dfm_request)` contextual logger.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "dfm_request",
            request_id = %self.request_id,
            home_site = %self.home_site,
            this_site = %self.this_site,
        )
    }

    async fn deliver(&self, response: Response) -> DfmResult<()> {
        if self.is_local_to_home() {
            self.transport
                .append_response(self.request_id, &response)
                .await
                .map_err(transport_err)
        } else {
            let node_id = Uuid::new_v4();
            let mut body: Body = HashMap::new();
            body.insert(
                node_id,
                FunctionCall::PushResponse(PushResponse {
                    meta: NodeMeta::new(node_id),
                    response,
                }),
            );
            let execute = Execute {
                meta: NodeMeta::new(Uuid::new_v4()),
                site: Some(self.home_site.clone()),
                body,
            };
            let job = Job::new(self.home_site.clone(), self.request_id, execute);
            let package = Package::new(self.this_site.clone(), self.home_site.clone(), job)
                .with_welcome(Welcome::current(self.this_site.clone()));
            self.transport.enqueue_package(&package).await.map_err(transport_err)
        }
    }

    pub async fn send_value(&self, node_id: Uuid, value: serde_json::Value) -> DfmResult<()> {
        self.deliver(Response::value(node_id, Utc::now(), value)).await
    }

    pub async fn send_error(&self, node_id: Uuid, err: DfmError) -> DfmResult<()> {
        self.deliver(Response::error(node_id, Utc::now(), err)).await
    }

    pub async fn send_status(&self, node_id: Uuid, message: impl Into<String>) -> DfmResult<()> {
        self.deliver(Response::status(node_id, Utc::now(), message)).await
    }

    pub async fn send_heartbeat(&self, node_id: Uuid) -> DfmResult<()> {
        self.deliver(Response::heartbeat(node_id, Utc::now())).await
    }

    pub async fn send_discovery(&self, node_id: Uuid, advice: serde_json::Value) -> DfmResult<()> {
        self.deliver(Response::discovery(node_id, Utc::now(), advice)).await
    }

    /// Deliver a pre-built [`dfm_core::ResponseBody`] as-is. The vehicle
    /// for `AdapterBody::prepare_to_send`'s custom response shapes (e.g.
    /// `ListTextureFiles`' bundle), which don't fit any of the `send_*`
    /// constructors above.
    pub async fn send_response_body(
        &self,
        node_id: Uuid,
        body: dfm_core::ResponseBody,
    ) -> DfmResult<()> {
        self.deliver(Response::new(node_id, Utc::now(), body)).await
    }

    /// Append a response directly to the local response list, bypassing
    /// routing. This is the vehicle `PushResponse`'s body uses: it only
    /// ever runs after a `send_*` call has already routed the response
    /// home, so by the time it executes, "local" is correct.
    pub async fn push_local_response(&self, response: Response) -> DfmResult<()> {
        self.transport
            .append_response(self.request_id, &response)
            .await
            .map_err(transport_err)
    }

    /// The single three-way routing decision point: package to uplink if
    /// `execute.site` names another site; else write to the scheduler
    /// stream if the job would be delayed; else write to the execute
    /// stream.
    pub async fn schedule_execute(
        &self,
        execute: Execute,
        deadline: Option<DateTime<Utc>>,
    ) -> DfmResult<()> {
        let mut job = Job::new(self.home_site.clone(), self.request_id, execute.clone());
        if let Some(d) = deadline {
            job = job.with_deadline(d);
        }

        if let Some(site) = &execute.site {
            if site != &self.this_site {
                let package = Package::new(self.this_site.clone(), site.clone(), job)
                    .with_welcome(Welcome::current(self.this_site.clone()));
                return self.transport.enqueue_package(&package).await.map_err(transport_err);
            }
        }

        if job.is_delayed() {
            self.transport
                .enqueue_job(Channel::Scheduler, &job)
                .await
                .map_err(transport_err)
        } else {
            self.transport
                .enqueue_job(Channel::Execute, &job)
                .await
                .map_err(transport_err)
        }
    }

    /// Synthesize `Execute(site=target_site, body=body)` and delegate to
    /// [`Self::schedule_execute`]. Used to propagate sub-pipelines, e.g.
    /// the body of an `AwaitMessage` after its message arrives.
    pub async fn schedule_body(
        &self,
        target_site: impl Into<String>,
        node_id: Uuid,
        body: Body,
        deadline: Option<DateTime<Utc>>,
    ) -> DfmResult<()> {
        let execute = Execute {
            meta: NodeMeta::new(node_id),
            site: Some(target_site.into()),
            body,
        };
        self.schedule_execute(execute, deadline).await
    }

    /// Schedule a single node (plus whatever supporting nodes it
    /// references) for re-execution, wrapping both into a one-shot
    /// `Execute` body. Used for timer-driven wake-ups such as
    /// `AwaitMessage`'s reschedule.
    pub async fn schedule_node(
        &self,
        target_site: impl Into<String>,
        inputs: Vec<FunctionCall>,
        node: FunctionCall,
        deadline: Option<DateTime<Utc>>,
    ) -> DfmResult<()> {
        let mut body: Body = HashMap::new();
        for input in inputs {
            body.insert(input.node_id(), input);
        }
        let node_id = node.node_id();
        body.insert(node_id, node);
        self.schedule_body(target_site, node_id, body, deadline).await
    }

    /// Write `message` into the mailbox slot `{request_id}.{mailbox}` on
    /// `target_site`: directly if local, otherwise via a one-node
    /// `Execute` wrapping a `ReceiveMessage` delivered through the normal
    /// routing path.
    pub async fn send_message(
        &self,
        node_id: Uuid,
        target_site: &str,
        mailbox: &str,
        message: serde_json::Value,
    ) -> DfmResult<()> {
        if target_site == self.this_site {
            self.transport
                .set_mailbox(self.request_id, mailbox, &message)
                .await
                .map_err(transport_err)
        } else {
            let receive = FunctionCall::ReceiveMessage(ReceiveMessage {
                meta: NodeMeta::new(node_id),
                mailbox: mailbox.to_string(),
                message,
                target_site: target_site.to_string(),
            });
            let mut body: Body = HashMap::new();
            body.insert(node_id, receive);
            self.schedule_body(target_site.to_string(), node_id, body, None).await
        }
    }

    /// Read (without deleting) the mailbox slot on this site. A second
    /// read returns the same value — mailboxes have no atomic take.
    pub async fn get_message(&self, mailbox: &str) -> DfmResult<Option<serde_json::Value>> {
        self.transport
            .get_mailbox(self.request_id, mailbox)
            .await
            .map_err(transport_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfm_transport::MockTransport;

    fn body_with_constant() -> (Uuid, Body) {
        let id = Uuid::new_v4();
        let mut body = HashMap::new();
        body.insert(
            id,
            FunctionCall::Constant(dfm_core::function_call::Constant {
                meta: NodeMeta::new(id),
                value: serde_json::json!(1),
            }),
        );
        (id, body)
    }

    #[tokio::test]
    async fn schedule_execute_routes_to_uplink_when_site_differs() {
        let transport = Arc::new(MockTransport::new());
        let req = DfmRequest::new(transport.clone(), "A", "A", Uuid::new_v4());
        let (_, body) = body_with_constant();
        let execute = Execute {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("B".to_string()),
            body,
        };
        req.schedule_execute(execute, None).await.unwrap();
        assert_eq!(transport.pending_len(Channel::Uplink), 1);
        assert_eq!(transport.pending_len(Channel::Execute), 0);
    }

    #[tokio::test]
    async fn schedule_execute_routes_to_scheduler_when_deadline_is_future() {
        let transport = Arc::new(MockTransport::new());
        let req = DfmRequest::new(transport.clone(), "A", "A", Uuid::new_v4());
        let (_, body) = body_with_constant();
        let execute = Execute {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("A".to_string()),
            body,
        };
        let deadline = Utc::now() + chrono::Duration::seconds(60);
        req.schedule_execute(execute, Some(deadline)).await.unwrap();
        assert_eq!(transport.pending_len(Channel::Scheduler), 1);
        assert_eq!(transport.pending_len(Channel::Execute), 0);
    }

    #[tokio::test]
    async fn schedule_execute_routes_to_execute_when_deadline_is_past_or_absent() {
        let transport = Arc::new(MockTransport::new());
        let req = DfmRequest::new(transport.clone(), "A", "A", Uuid::new_v4());
        let (_, body) = body_with_constant();
        let execute = Execute {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("A".to_string()),
            body,
        };
        req.schedule_execute(execute, None).await.unwrap();
        assert_eq!(transport.pending_len(Channel::Execute), 1);
    }

    #[tokio::test]
    async fn local_send_value_appends_to_the_response_list() {
        let transport = Arc::new(MockTransport::new());
        let request_id = Uuid::new_v4();
        let req = DfmRequest::new(transport.clone(), "A", "A", request_id);
        req.send_value(Uuid::new_v4(), serde_json::json!("Hello World"))
            .await
            .unwrap();
        let responses = transport.get_responses(request_id).await.unwrap();
        assert_eq!(responses.len(), 1);
    }

    #[tokio::test]
    async fn remote_send_value_packages_a_push_response() {
        let transport = Arc::new(MockTransport::new());
        let request_id = Uuid::new_v4();
        let req = DfmRequest::new(transport.clone(), "B", "A", request_id);
        req.send_value(Uuid::new_v4(), serde_json::json!("Hello World"))
            .await
            .unwrap();
        assert_eq!(transport.pending_len(Channel::Uplink), 1);
        assert!(transport.get_responses(request_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_send_discovery_appends_to_the_response_list() {
        let transport = Arc::new(MockTransport::new());
        let request_id = Uuid::new_v4();
        let req = DfmRequest::new(transport.clone(), "A", "A", request_id);
        req.send_discovery(Uuid::new_v4(), serde_json::json!({"field": "path"}))
            .await
            .unwrap();
        let responses = transport.get_responses(request_id).await.unwrap();
        assert_eq!(responses.len(), 1);
    }

    #[tokio::test]
    async fn send_response_body_delivers_the_body_verbatim() {
        let transport = Arc::new(MockTransport::new());
        let request_id = Uuid::new_v4();
        let req = DfmRequest::new(transport.clone(), "A", "A", request_id);
        let body = dfm_core::ResponseBody::Status(dfm_core::response::StatusResponse {
            message: "custom".to_string(),
        });
        req.send_response_body(Uuid::new_v4(), body.clone()).await.unwrap();
        let responses = transport.get_responses(request_id).await.unwrap();
        assert_eq!(responses[0].body, body);
    }

    #[tokio::test]
    async fn mailbox_round_trips_locally() {
        let transport = Arc::new(MockTransport::new());
        let req = DfmRequest::new(transport.clone(), "A", "A", Uuid::new_v4());
        req.send_message(Uuid::new_v4(), "A", "inbox", serde_json::json!("hi"))
            .await
            .unwrap();
        let got = req.get_message("inbox").await.unwrap();
        assert_eq!(got, Some(serde_json::json!("hi")));
    }
}
