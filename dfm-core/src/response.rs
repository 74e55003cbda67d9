use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The payload half of a [`Response`], tagged by `api_class` exactly like
/// `FunctionCall` — the wire format the Process Service streams to clients
/// carries the same polymorphic-record shape on both sides of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "api_class")]
pub enum ResponseBody {
    #[serde(rename = "dfm.api.dfm.ValueResponse")]
    Value(ValueResponse),
    #[serde(rename = "dfm.api.dfm.StatusResponse")]
    Status(StatusResponse),
    #[serde(rename = "dfm.api.dfm.HeartbeatResponse")]
    Heartbeat(HeartbeatResponse),
    #[serde(rename = "dfm.api.dfm.ErrorResponse")]
    Error(ErrorResponse),
    #[serde(rename = "dfm.api.dfm.DiscoveryResponse")]
    Discovery(DiscoveryResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {}

/// `kind` mirrors [`crate::error::DfmError::kind`] — a response never
/// carries the error itself across a site boundary, only its taxonomy tag
/// and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub advice: serde_json::Value,
}

impl From<crate::error::DfmError> for ErrorResponse {
    fn from(err: crate::error::DfmError) -> Self {
        ErrorResponse {
            kind: err.kind().to_string(),
            message: err.message(),
        }
    }
}

/// One entry in the per-`request_id` response list streamed to the client.
///
/// `timestamp` is stamped by whichever `DfmRequest::send_*` call produces
/// the response, not by this type's constructor, so tests can supply a
/// fixed clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub node_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(node_id: Uuid, timestamp: DateTime<Utc>, body: ResponseBody) -> Self {
        Self {
            node_id,
            timestamp,
            body,
        }
    }

    pub fn value(node_id: Uuid, timestamp: DateTime<Utc>, value: serde_json::Value) -> Self {
        Self::new(node_id, timestamp, ResponseBody::Value(ValueResponse { value }))
    }

    pub fn status(node_id: Uuid, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(
            node_id,
            timestamp,
            ResponseBody::Status(StatusResponse {
                message: message.into(),
            }),
        )
    }

    pub fn heartbeat(node_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self::new(node_id, timestamp, ResponseBody::Heartbeat(HeartbeatResponse {}))
    }

    pub fn error(node_id: Uuid, timestamp: DateTime<Utc>, err: crate::error::DfmError) -> Self {
        Self::new(node_id, timestamp, ResponseBody::Error(err.into()))
    }

    pub fn discovery(node_id: Uuid, timestamp: DateTime<Utc>, advice: serde_json::Value) -> Self {
        Self::new(node_id, timestamp, ResponseBody::Discovery(DiscoveryResponse { advice }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_response_round_trips_with_tag() {
        let r = Response::value(Uuid::nil(), Utc::now(), serde_json::json!("Hello World"));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["body"]["api_class"], "dfm.api.dfm.ValueResponse");
        let parsed: Response = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn error_response_carries_kind_tag_not_the_exception() {
        let err = crate::error::DfmError::data("missing input");
        let r = Response::error(Uuid::nil(), Utc::now(), err);
        match r.body {
            ResponseBody::Error(e) => {
                assert_eq!(e.kind, "DataError");
                assert_eq!(e.message, "missing input");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
