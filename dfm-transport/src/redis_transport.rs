use async_trait::async_trait;
use deadpool_redis::Pool;
use dfm_core::{Job, Package, Response};
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::{TransportError, TransportResult};
use crate::names::{mailbox_key, request_key, Channel, RESPONSES_FIELD, SCHED_QUEUE_KEY};
use crate::transport::{Delivery, Transport};

const PAYLOAD_FIELD: &str = "payload";

/// Live Redis-backed [`Transport`], pooled via `deadpool-redis`.
///
/// One instance is shared (cheaply cloned — the pool is an `Arc` inside)
/// across however many tasks a service process runs.
#[derive(Clone)]
pub struct RedisTransport {
    pool: Pool,
}

impl RedisTransport {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn ensure_group(&self, stream_key: &str, group_key: &str) -> TransportResult<()> {
        let mut conn = self.pool.get().await?;
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream_key)
            .arg(group_key)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => Ok(()),
            // BUSYGROUP: the group already exists, which is the steady state.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn xadd_json<T: serde::Serialize>(
        &self,
        stream_key: &str,
        item: &T,
    ) -> TransportResult<()> {
        let mut conn = self.pool.get().await?;
        let payload = serde_json::to_string(item)?;
        let _id: String = conn
            .xadd(stream_key, "*", &[(PAYLOAD_FIELD, payload)])
            .await?;
        Ok(())
    }

    async fn xreadgroup_one<T: serde::de::DeserializeOwned>(
        &self,
        channel: Channel,
        consumer: &str,
    ) -> TransportResult<Option<Delivery<T>>> {
        let stream_key = channel.stream_key();
        let group_key = channel.group_key();
        self.ensure_group(&stream_key, &group_key).await?;

        let mut conn = self.pool.get().await?;
        let opts = StreamReadOptions::default()
            .group(&group_key, consumer)
            .count(1);
        let reply: StreamReadReply = conn
            .xread_options(&[stream_key.as_str()], &[">"], &opts)
            .await?;

        for stream_key_entry in reply.keys {
            for id in stream_key_entry.ids {
                let payload: String = id
                    .get(PAYLOAD_FIELD)
                    .ok_or_else(|| TransportError::MalformedEntry(id.id.clone()))?;
                let item: T = serde_json::from_str(&payload)?;
                return Ok(Some(Delivery {
                    ack_id: id.id,
                    item,
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn enqueue_job(&self, channel: Channel, job: &Job) -> TransportResult<()> {
        self.xadd_json(&channel.stream_key(), job).await
    }

    async fn consume_job(
        &self,
        channel: Channel,
        consumer: &str,
    ) -> TransportResult<Option<Delivery<Job>>> {
        self.xreadgroup_one(channel, consumer).await
    }

    async fn ack(&self, channel: Channel, ack_id: &str) -> TransportResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.xack(channel.stream_key(), channel.group_key(), &[ack_id]).await?;
        Ok(())
    }

    async fn enqueue_package(&self, package: &Package) -> TransportResult<()> {
        self.xadd_json(&Channel::Uplink.stream_key(), package).await
    }

    async fn consume_package(&self, consumer: &str) -> TransportResult<Option<Delivery<Package>>> {
        self.xreadgroup_one(Channel::Uplink, consumer).await
    }

    async fn sched_insert(&self, job: &Job, deadline_epoch_secs: f64) -> TransportResult<()> {
        let mut conn = self.pool.get().await?;
        let member = serde_json::to_string(job)?;
        // "LT" keeps the smaller of the existing and new score when the
        // member already exists — this is the keep-the-minimum-deadline
        // semantics duplicate scheduling must have.
        let _: () = redis::cmd("ZADD")
            .arg(SCHED_QUEUE_KEY)
            .arg("LT")
            .arg(deadline_epoch_secs)
            .arg(&member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sched_pop_due(&self, now_epoch_secs: f64) -> TransportResult<Option<Job>> {
        let mut conn = self.pool.get().await?;
        let min: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(SCHED_QUEUE_KEY)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        let Some((member, score)) = min.into_iter().next() else {
            return Ok(None);
        };
        if score > now_epoch_secs {
            return Ok(None);
        }
        // Popping re-reads the minimum rather than trusting the peeked
        // member is still the minimum: another consumer may have popped
        // it between the ZRANGE and now. Spec §4.6 allows this — only
        // "some due element was emitted" is guaranteed, not which one.
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(SCHED_QUEUE_KEY)
            .arg(1)
            .query_async(&mut conn)
            .await?;
        match popped.into_iter().next() {
            Some((popped_member, popped_score)) if popped_score <= now_epoch_secs => {
                Ok(Some(serde_json::from_str(&popped_member)?))
            }
            Some((popped_member, popped_score)) => {
                // Not actually due: put it back and report nothing this tick.
                let _: () = redis::cmd("ZADD")
                    .arg(SCHED_QUEUE_KEY)
                    .arg("LT")
                    .arg(popped_score)
                    .arg(&popped_member)
                    .query_async(&mut conn)
                    .await?;
                Ok(None)
            }
            None => {
                let _ = member;
                Ok(None)
            }
        }
    }

    async fn sched_peek_min(&self) -> TransportResult<Option<(Job, f64)>> {
        let mut conn = self.pool.get().await?;
        let min: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(SCHED_QUEUE_KEY)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        match min.into_iter().next() {
            Some((member, score)) => Ok(Some((serde_json::from_str(&member)?, score))),
            None => Ok(None),
        }
    }

    async fn append_response(&self, request_id: Uuid, response: &Response) -> TransportResult<()> {
        let mut conn = self.pool.get().await?;
        let key = request_key(request_id);
        // Plain-Redis fallback for a RedisJSON-style JSON.ARRAPPEND: read
        // the current array, append, write the whole value back. See
        // DESIGN.md for why this, not a Lua script, was chosen.
        let existing: Option<String> = conn.hget(&key, RESPONSES_FIELD).await?;
        let mut list: Vec<Response> = match existing {
            Some(s) if !s.is_empty() => serde_json::from_str(&s)?,
            _ => Vec::new(),
        };
        list.push(response.clone());
        let serialized = serde_json::to_string(&list)?;
        let _: () = conn.hset(&key, RESPONSES_FIELD, serialized).await?;
        Ok(())
    }

    async fn get_responses(&self, request_id: Uuid) -> TransportResult<Vec<Response>> {
        let mut conn = self.pool.get().await?;
        let key = request_key(request_id);
        let existing: Option<String> = conn.hget(&key, RESPONSES_FIELD).await?;
        match existing {
            Some(s) if !s.is_empty() => Ok(serde_json::from_str(&s)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn set_mailbox(
        &self,
        request_id: Uuid,
        mailbox: &str,
        message: &serde_json::Value,
    ) -> TransportResult<()> {
        let mut conn = self.pool.get().await?;
        let key = mailbox_key(request_id, mailbox);
        let serialized = serde_json::to_string(message)?;
        let _: () = conn.set(key, serialized).await?;
        Ok(())
    }

    async fn get_mailbox(
        &self,
        request_id: Uuid,
        mailbox: &str,
    ) -> TransportResult<Option<serde_json::Value>> {
        let mut conn = self.pool.get().await?;
        let key = mailbox_key(request_id, mailbox);
        let existing: Option<String> = conn.get(key).await?;
        match existing {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }
}
