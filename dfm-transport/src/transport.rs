use async_trait::async_trait;
use dfm_core::{Job, Package, Response};
use uuid::Uuid;

use crate::error::TransportResult;
use crate::names::Channel;

/// An item pulled off a stream, with the handle needed to ack it.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    pub ack_id: String,
    pub item: T,
}

/// The shared key-value transport, abstracted so the routing logic in
/// `dfm-runtime` and the service loops in `dfm-scheduler`/`dfm-execute`
/// can run against either a live Redis ([`crate::redis_transport::RedisTransport`])
/// or an in-memory double ([`crate::mock::MockTransport`]) in tests.
///
/// Every method corresponds to one wire-level primitive: stream
/// `XADD`/`XREADGROUP`/`XACK`, sorted-set `ZADD`/`ZPOPMIN` with
/// keep-the-smaller-score semantics, and plain key-value get/set for
/// responses and mailboxes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `XADD` a Job onto `channel`'s stream.
    async fn enqueue_job(&self, channel: Channel, job: &Job) -> TransportResult<()>;

    /// `XREADGROUP` one Job off `channel`'s stream for `consumer`, creating
    /// the consumer group on first use. Returns `None` if nothing is
    /// pending within the call's polling budget.
    async fn consume_job(
        &self,
        channel: Channel,
        consumer: &str,
    ) -> TransportResult<Option<Delivery<Job>>>;

    /// `XACK` a previously consumed entry.
    async fn ack(&self, channel: Channel, ack_id: &str) -> TransportResult<()>;

    /// `XADD` a Package onto the uplink stream.
    async fn enqueue_package(&self, package: &Package) -> TransportResult<()>;

    /// `XREADGROUP` one Package off the uplink stream.
    async fn consume_package(&self, consumer: &str) -> TransportResult<Option<Delivery<Package>>>;

    /// Insert `job` into `sched-queue` keyed by `deadline_epoch_secs`,
    /// keeping the smaller score on duplicate inserts (`ZADD ... LT`).
    async fn sched_insert(&self, job: &Job, deadline_epoch_secs: f64) -> TransportResult<()>;

    /// Pop the minimum-scored entry from `sched-queue` if its score is
    /// `<= now_epoch_secs`. Per spec §4.6/§5 the popped element need not
    /// be the one a caller previously peeked — callers must not assume
    /// peek-then-pop is atomic across the pair of calls.
    async fn sched_pop_due(&self, now_epoch_secs: f64) -> TransportResult<Option<Job>>;

    /// Peek the minimum-scored entry without removing it (used by tests
    /// and diagnostics; the Scheduler's run loop uses `sched_pop_due`).
    async fn sched_peek_min(&self) -> TransportResult<Option<(Job, f64)>>;

    /// Append one `Response` to `request:{request_id}.responses`.
    async fn append_response(&self, request_id: Uuid, response: &Response) -> TransportResult<()>;

    /// Read the full accumulated response list for `request_id`.
    async fn get_responses(&self, request_id: Uuid) -> TransportResult<Vec<Response>>;

    /// Write a mailbox slot. Overwrites any prior value — mailboxes are
    /// not append-only.
    async fn set_mailbox(
        &self,
        request_id: Uuid,
        mailbox: &str,
        message: &serde_json::Value,
    ) -> TransportResult<()>;

    /// Read a mailbox slot without clearing it (mailboxes are read-only:
    /// a second read sees the same value, per spec §7).
    async fn get_mailbox(
        &self,
        request_id: Uuid,
        mailbox: &str,
    ) -> TransportResult<Option<serde_json::Value>>;
}
