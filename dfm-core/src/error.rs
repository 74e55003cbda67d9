use serde::{Deserialize, Serialize};

/// Error taxonomy for the federation runtime.
///
/// Every variant maps to one of the kinds in `ResponseBody::Error` when it
/// crosses into a client-visible `Response`. Errors never cross a site
/// boundary as a raw exception — they are always packaged as a response
/// and delivered through the Request Context, so this type only needs to
/// round-trip within a single process plus serialize into `ErrorResponse`.
#[derive(Debug, thiserror::Error, Clone, Serialize, Deserialize)]
pub enum DfmError {
    /// Malformed graph, missing node reference, empty body, invalid file
    /// type, variable-not-found inside a dataset op.
    #[error("data error: {0}")]
    Data(String),
    /// Internal precondition violation, exceeded reschedule budget,
    /// adapter implementation failure.
    #[error("server error: {0}")]
    Server(String),
    /// Surfaced at the boundary; maps to HTTP 403.
    #[error("auth error: {0}")]
    Auth(String),
    /// Discovery selected a branch that leads only to errors.
    #[error("partial error: {0}")]
    Partial(String),
    /// A long-running operation exceeded its declared limit.
    #[error("timeout error: {0}")]
    Timeout(String),
}

impl DfmError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn partial(msg: impl Into<String>) -> Self {
        Self::Partial(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// The `kind` tag used in `ErrorResponse`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "DataError",
            Self::Server(_) => "ServerError",
            Self::Auth(_) => "AuthError",
            Self::Partial(_) => "PartialError",
            Self::Timeout(_) => "TimeoutError",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Data(m) | Self::Server(m) | Self::Auth(m) | Self::Partial(m) | Self::Timeout(m) => {
                m.clone()
            }
        }
    }
}

pub type DfmResult<T> = Result<T, DfmError>;
