//! The Redis-backed message transport: the three named streams
//! (execute/scheduler/uplink) with consumer groups, the sorted-set
//! scheduler queue, the per-request JSON response list, and mailbox
//! slots.
//!
//! Generalizes an in-process typed pub/sub design
//! (`r2e-events::local`) into a durable, at-least-once, Redis
//! `XADD`/`XREADGROUP`/`XACK` transport: the [`Transport`] trait is the
//! seam, [`redis_transport::RedisTransport`] the production
//! implementation, [`mock::MockTransport`] the in-memory test double.

pub mod error;
pub mod mock;
pub mod names;
pub mod redis_transport;
pub mod transport;

pub use error::{TransportError, TransportResult};
pub use mock::MockTransport;
pub use names::{mailbox_key, request_key, Channel, RESPONSES_FIELD, SCHED_QUEUE_KEY};
pub use redis_transport::RedisTransport;
pub use transport::{Delivery, Transport};
