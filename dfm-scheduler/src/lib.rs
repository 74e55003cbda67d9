//! The Scheduler Service loop (spec §4.6): two concurrent tasks sharing
//! the `sched-queue` sorted set.
//!
//! - The *input task* drains the scheduler stream: a Job with no deadline
//!   or one already past short-circuits straight to the execute stream;
//!   otherwise it is inserted into `sched-queue` keyed by its deadline,
//!   keeping the smaller score on duplicate inserts.
//! - The *run task* polls `sched-queue`'s minimum every 500ms and
//!   republishes anything due to the execute stream. The popped element
//!   need not be the one last peeked — it is only guaranteed that
//!   whatever comes off was actually due.
//!
//! Mirrors `original_source/src/dfm/service/scheduler/_scheduler.py`'s
//! two-coroutine loop, generalized to Rust's equivalent of that
//! cooperative scheduling model: two `tokio::spawn`ed tasks racing
//! against a shared `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dfm_core::Job;
use dfm_transport::{Channel, Transport, TransportResult};
use tokio_util::sync::CancellationToken;

/// How often the run task polls `sched-queue` for due entries.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long the input task backs off after finding nothing on the
/// scheduler stream, to avoid busy-polling a non-blocking `XREADGROUP`.
const IDLE_BACKOFF: Duration = Duration::from_millis(100);

/// Consume and route one Job from the scheduler stream, if any is
/// pending. Returns `true` if a job was processed.
pub async fn process_one_scheduled_job(transport: &dyn Transport, consumer: &str) -> TransportResult<bool> {
    let Some(delivery) = transport.consume_job(Channel::Scheduler, consumer).await? else {
        return Ok(false);
    };
    transport.ack(Channel::Scheduler, &delivery.ack_id).await?;
    route_job(transport, delivery.item).await?;
    Ok(true)
}

/// The input task's per-job routing decision: short-circuit to Execute
/// when undelayed, else hold in `sched-queue` until due.
async fn route_job(transport: &dyn Transport, job: Job) -> TransportResult<()> {
    if job.is_delayed() {
        let deadline = job.deadline.expect("is_delayed implies a deadline");
        transport.sched_insert(&job, deadline.timestamp() as f64).await
    } else {
        transport.enqueue_job(Channel::Execute, &job).await
    }
}

/// Pop and republish every `sched-queue` entry due at or before `now`.
/// Returns the number of jobs released.
pub async fn release_due_jobs(transport: &dyn Transport, now: chrono::DateTime<Utc>) -> TransportResult<usize> {
    let now_epoch = now.timestamp() as f64;
    let mut released = 0;
    while let Some(job) = transport.sched_pop_due(now_epoch).await? {
        transport.enqueue_job(Channel::Execute, &job).await?;
        released += 1;
    }
    Ok(released)
}

/// Run the input task until `cancel` fires: drain the scheduler stream
/// continuously, backing off briefly whenever it comes up empty.
pub async fn run_input_task(transport: Arc<dyn Transport>, consumer: String, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            processed = process_one_scheduled_job(&*transport, &consumer) => {
                match processed {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(IDLE_BACKOFF).await,
                    Err(e) => {
                        tracing::error!(error = %e, "scheduler input task failed to process a job");
                        tokio::time::sleep(IDLE_BACKOFF).await;
                    }
                }
            }
        }
    }
}

/// Run the run task until `cancel` fires: poll `sched-queue` every
/// [`POLL_INTERVAL`] and release whatever is due.
pub async fn run_run_task(transport: Arc<dyn Transport>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = release_due_jobs(&*transport, Utc::now()).await {
                    tracing::error!(error = %e, "scheduler run task failed to release due jobs");
                }
            }
        }
    }
}

/// Spawn both scheduler tasks and wait for `cancel` to fire.
pub async fn run(transport: Arc<dyn Transport>, consumer: String, cancel: CancellationToken) {
    let input = tokio::spawn(run_input_task(transport.clone(), consumer, cancel.clone()));
    let runner = tokio::spawn(run_run_task(transport, cancel));
    let _ = tokio::join!(input, runner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfm_core::function_call::{Constant, Execute, FunctionCall, NodeMeta};
    use dfm_transport::MockTransport;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn sample_execute() -> Execute {
        let id = Uuid::new_v4();
        let mut body = HashMap::new();
        body.insert(
            id,
            FunctionCall::Constant(Constant {
                meta: NodeMeta::new(id),
                value: serde_json::json!(1),
            }),
        );
        Execute {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("A".to_string()),
            body,
        }
    }

    #[tokio::test]
    async fn undelayed_job_short_circuits_straight_to_execute() {
        let transport = MockTransport::new();
        let job = Job::new("A", Uuid::new_v4(), sample_execute());
        transport.enqueue_job(Channel::Scheduler, &job).await.unwrap();

        let processed = process_one_scheduled_job(&transport, "scheduler-1").await.unwrap();
        assert!(processed);
        assert_eq!(transport.pending_len(Channel::Execute), 1);
        assert_eq!(transport.sched_queue_len(), 0);
    }

    #[tokio::test]
    async fn delayed_job_goes_into_the_sorted_set_not_execute() {
        let transport = MockTransport::new();
        let job = Job::new("A", Uuid::new_v4(), sample_execute())
            .with_deadline(Utc::now() + chrono::Duration::seconds(60));
        transport.enqueue_job(Channel::Scheduler, &job).await.unwrap();

        let processed = process_one_scheduled_job(&transport, "scheduler-1").await.unwrap();
        assert!(processed);
        assert_eq!(transport.pending_len(Channel::Execute), 0);
        assert_eq!(transport.sched_queue_len(), 1);
    }

    #[tokio::test]
    async fn nothing_pending_reports_no_job_processed() {
        let transport = MockTransport::new();
        let processed = process_one_scheduled_job(&transport, "scheduler-1").await.unwrap();
        assert!(!processed);
    }

    #[tokio::test]
    async fn duplicate_inserts_keep_the_earlier_deadline() {
        let transport = MockTransport::new();
        let request_id = Uuid::new_v4();
        let earlier = Utc::now() + chrono::Duration::seconds(30);
        let later = Utc::now() + chrono::Duration::seconds(300);

        let job_later = Job::new("A", request_id, sample_execute()).with_deadline(later);
        transport.sched_insert(&job_later, later.timestamp() as f64).await.unwrap();
        let job_earlier = Job::new("A", request_id, sample_execute()).with_deadline(earlier);
        transport
            .sched_insert(&job_earlier, earlier.timestamp() as f64)
            .await
            .unwrap();

        let (_, score) = transport.sched_peek_min().await.unwrap().unwrap();
        assert_eq!(score, earlier.timestamp() as f64);
    }

    #[tokio::test]
    async fn release_due_jobs_pops_everything_at_or_before_now_and_leaves_future_jobs() {
        let transport = MockTransport::new();
        let due = Job::new("A", Uuid::new_v4(), sample_execute())
            .with_deadline(Utc::now() - chrono::Duration::seconds(5));
        let future = Job::new("A", Uuid::new_v4(), sample_execute())
            .with_deadline(Utc::now() + chrono::Duration::seconds(600));
        transport
            .sched_insert(&due, due.deadline.unwrap().timestamp() as f64)
            .await
            .unwrap();
        transport
            .sched_insert(&future, future.deadline.unwrap().timestamp() as f64)
            .await
            .unwrap();

        let released = release_due_jobs(&transport, Utc::now()).await.unwrap();
        assert_eq!(released, 1);
        assert_eq!(transport.pending_len(Channel::Execute), 1);
        assert_eq!(transport.sched_queue_len(), 1);
    }

    #[tokio::test]
    async fn run_stops_promptly_when_cancelled() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), run(transport, "scheduler-1".to_string(), cancel))
            .await
            .expect("run should return promptly once cancelled");
    }
}
