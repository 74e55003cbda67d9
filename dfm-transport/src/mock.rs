//! An in-memory [`Transport`] double, grounded on
//! `original_source/src/tests/common/_mock_redis.py`: it reproduces the
//! same primitives (stream append/read/ack, sorted-set insert-keep-min/
//! pop-due, hash-field append, plain get/set) without a live Redis, so
//! routing logic and adapter tests can run fully in-process.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use dfm_core::{Job, Package, Response};
use uuid::Uuid;

use crate::error::TransportResult;
use crate::names::Channel;
use crate::transport::{Delivery, Transport};

struct StreamEntry<T> {
    id: String,
    item: T,
}

#[derive(Default)]
struct Streams {
    execute: VecDeque<StreamEntry<Job>>,
    scheduler: VecDeque<StreamEntry<Job>>,
    uplink: VecDeque<StreamEntry<Package>>,
    next_id: u64,
}

/// In-memory [`Transport`]. Cheap to construct; clone the handle (it is an
/// `Arc`-free plain struct wrapping a `Mutex`, so share it behind an `Arc`
/// the same way a live `RedisTransport` is shared) across tasks in a test.
#[derive(Default)]
pub struct MockTransport {
    streams: Mutex<Streams>,
    sched_queue: Mutex<BTreeMap<String, (Job, f64)>>,
    responses: Mutex<HashMap<Uuid, Vec<Response>>>,
    mailboxes: Mutex<HashMap<(Uuid, String), serde_json::Value>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(streams: &mut Streams) -> String {
        streams.next_id += 1;
        format!("{}-0", streams.next_id)
    }

    /// Test helper: number of jobs currently queued on `channel`, ignoring
    /// acknowledgement state (this double acks by simply discarding).
    pub fn pending_len(&self, channel: Channel) -> usize {
        let streams = self.streams.lock().unwrap();
        match channel {
            Channel::Execute => streams.execute.len(),
            Channel::Scheduler => streams.scheduler.len(),
            Channel::Uplink => streams.uplink.len(),
        }
    }

    pub fn sched_queue_len(&self) -> usize {
        self.sched_queue.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn enqueue_job(&self, channel: Channel, job: &Job) -> TransportResult<()> {
        let mut streams = self.streams.lock().unwrap();
        let id = Self::next_id(&mut streams);
        let entry = StreamEntry {
            id,
            item: job.clone(),
        };
        match channel {
            Channel::Execute => streams.execute.push_back(entry),
            Channel::Scheduler => streams.scheduler.push_back(entry),
            Channel::Uplink => unreachable!("jobs never enqueue directly onto the uplink channel"),
        }
        Ok(())
    }

    async fn consume_job(
        &self,
        channel: Channel,
        _consumer: &str,
    ) -> TransportResult<Option<Delivery<Job>>> {
        let mut streams = self.streams.lock().unwrap();
        let popped = match channel {
            Channel::Execute => streams.execute.pop_front(),
            Channel::Scheduler => streams.scheduler.pop_front(),
            Channel::Uplink => unreachable!("jobs never consume from the uplink channel"),
        };
        Ok(popped.map(|e| Delivery {
            ack_id: e.id,
            item: e.item,
        }))
    }

    async fn ack(&self, _channel: Channel, _ack_id: &str) -> TransportResult<()> {
        // This double pops eagerly on consume, so ack is a no-op; a
        // pending-entries-list model would track and remove by id here.
        Ok(())
    }

    async fn enqueue_package(&self, package: &Package) -> TransportResult<()> {
        let mut streams = self.streams.lock().unwrap();
        let id = Self::next_id(&mut streams);
        streams.uplink.push_back(StreamEntry {
            id,
            item: package.clone(),
        });
        Ok(())
    }

    async fn consume_package(&self, _consumer: &str) -> TransportResult<Option<Delivery<Package>>> {
        let mut streams = self.streams.lock().unwrap();
        Ok(streams.uplink.pop_front().map(|e| Delivery {
            ack_id: e.id,
            item: e.item,
        }))
    }

    async fn sched_insert(&self, job: &Job, deadline_epoch_secs: f64) -> TransportResult<()> {
        let member = serde_json::to_string(job)?;
        let mut queue = self.sched_queue.lock().unwrap();
        queue
            .entry(member)
            .and_modify(|(_, existing_score)| {
                if deadline_epoch_secs < *existing_score {
                    *existing_score = deadline_epoch_secs;
                }
            })
            .or_insert_with(|| (job.clone(), deadline_epoch_secs));
        Ok(())
    }

    async fn sched_pop_due(&self, now_epoch_secs: f64) -> TransportResult<Option<Job>> {
        let mut queue = self.sched_queue.lock().unwrap();
        let min_key = queue
            .iter()
            .min_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap())
            .map(|(k, (_, score))| (k.clone(), *score));
        match min_key {
            Some((key, score)) if score <= now_epoch_secs => {
                let (job, _) = queue.remove(&key).unwrap();
                Ok(Some(job))
            }
            _ => Ok(None),
        }
    }

    async fn sched_peek_min(&self) -> TransportResult<Option<(Job, f64)>> {
        let queue = self.sched_queue.lock().unwrap();
        Ok(queue
            .values()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .cloned())
    }

    async fn append_response(&self, request_id: Uuid, response: &Response) -> TransportResult<()> {
        let mut responses = self.responses.lock().unwrap();
        responses.entry(request_id).or_default().push(response.clone());
        Ok(())
    }

    async fn get_responses(&self, request_id: Uuid) -> TransportResult<Vec<Response>> {
        let responses = self.responses.lock().unwrap();
        Ok(responses.get(&request_id).cloned().unwrap_or_default())
    }

    async fn set_mailbox(
        &self,
        request_id: Uuid,
        mailbox: &str,
        message: &serde_json::Value,
    ) -> TransportResult<()> {
        let mut mailboxes = self.mailboxes.lock().unwrap();
        mailboxes.insert((request_id, mailbox.to_string()), message.clone());
        Ok(())
    }

    async fn get_mailbox(
        &self,
        request_id: Uuid,
        mailbox: &str,
    ) -> TransportResult<Option<serde_json::Value>> {
        let mailboxes = self.mailboxes.lock().unwrap();
        Ok(mailboxes.get(&(request_id, mailbox.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfm_core::function_call::{Constant, Execute as ExecuteNode, FunctionCall, NodeMeta};
    use std::collections::HashMap as StdHashMap;

    fn sample_job(deadline: Option<chrono::DateTime<chrono::Utc>>) -> Job {
        let node_id = Uuid::new_v4();
        let mut body = StdHashMap::new();
        body.insert(
            node_id,
            FunctionCall::Constant(Constant {
                meta: NodeMeta::new(node_id),
                value: serde_json::json!(1),
            }),
        );
        let execute = ExecuteNode {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("A".to_string()),
            body,
        };
        let mut job = Job::new("A", Uuid::new_v4(), execute);
        job.deadline = deadline;
        job
    }

    #[tokio::test]
    async fn enqueue_then_consume_returns_the_same_job() {
        let transport = MockTransport::new();
        let job = sample_job(None);
        transport.enqueue_job(Channel::Execute, &job).await.unwrap();
        let delivery = transport
            .consume_job(Channel::Execute, "consumer-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.item.request_id, job.request_id);
    }

    #[tokio::test]
    async fn sched_insert_keeps_the_smaller_score_on_duplicate() {
        let transport = MockTransport::new();
        let job = sample_job(None);
        transport.sched_insert(&job, 100.0).await.unwrap();
        transport.sched_insert(&job, 50.0).await.unwrap();
        let (_, score) = transport.sched_peek_min().await.unwrap().unwrap();
        assert_eq!(score, 50.0);
    }

    #[tokio::test]
    async fn sched_pop_due_only_pops_when_score_has_elapsed() {
        let transport = MockTransport::new();
        let job = sample_job(None);
        transport.sched_insert(&job, 1_000_000.0).await.unwrap();
        assert!(transport.sched_pop_due(500_000.0).await.unwrap().is_none());
        assert!(transport.sched_pop_due(1_000_001.0).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mailbox_read_is_non_destructive() {
        let transport = MockTransport::new();
        let rid = Uuid::new_v4();
        transport
            .set_mailbox(rid, "inbox", &serde_json::json!("hi"))
            .await
            .unwrap();
        let first = transport.get_mailbox(rid, "inbox").await.unwrap();
        let second = transport.get_mailbox(rid, "inbox").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.unwrap(), serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn responses_accumulate_in_append_order() {
        let transport = MockTransport::new();
        let rid = Uuid::new_v4();
        let node = Uuid::new_v4();
        transport
            .append_response(rid, &Response::status(node, chrono::Utc::now(), "one"))
            .await
            .unwrap();
        transport
            .append_response(rid, &Response::status(node, chrono::Utc::now(), "two"))
            .await
            .unwrap();
        let responses = transport.get_responses(rid).await.unwrap();
        assert_eq!(responses.len(), 2);
    }
}
