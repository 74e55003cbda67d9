//! Data model for the DFM distributed pipeline runtime.
//!
//! Graph nodes ([`function_call::FunctionCall`]), enqueued work
//! ([`job::Job`]), site-to-site envelopes ([`package::Package`]), and
//! client-facing responses ([`response::Response`]) all serialize as flat
//! JSON objects tagged by an `api_class` field — the Rust analogue of the
//! source's runtime rewrite-on-deserialize hook, resolved by serde's
//! internally tagged enum support instead of an `importlib` registry.
//!
//! This crate performs no I/O: it is the shared vocabulary that
//! `dfm-transport`, `dfm-runtime`, `dfm-compiler` and the three service
//! binaries build on.

pub mod error;
pub mod function_call;
pub mod ids;
pub mod job;
pub mod package;
pub mod response;
pub mod welcome;

pub use error::{DfmError, DfmResult};
pub use function_call::{Body, FunctionCall, InputRef, NodeMeta, Provider};
pub use job::Job;
pub use package::Package;
pub use response::{Response, ResponseBody};
pub use welcome::Welcome;
