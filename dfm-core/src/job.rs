use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::function_call::Execute;

/// An enqueued unit of work on the execute or scheduler streams.
///
/// Mirrors the original `_job.py` exactly: `home_site` is the destination
/// for every response this job's execution produces, `request_id` threads
/// responses back to the right entry in `request:{request_id}.responses`,
/// and `is_discovery` selects the discovery compiler pass instead of the
/// normal one in the Execute Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub home_site: String,
    pub request_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_discovery: bool,
    pub execute: Execute,
}

impl Job {
    pub fn new(home_site: impl Into<String>, request_id: Uuid, execute: Execute) -> Self {
        Self {
            home_site: home_site.into(),
            request_id,
            deadline: None,
            is_discovery: false,
            execute,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_discovery(mut self, is_discovery: bool) -> Self {
        self.is_discovery = is_discovery;
        self
    }

    /// True iff `deadline` is set and still in the future relative to `now`.
    pub fn is_delayed_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d > now)
    }

    /// `is_delayed` evaluated against the current wall clock.
    pub fn is_delayed(&self) -> bool {
        self.is_delayed_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_call::{Constant, FunctionCall, NodeMeta};
    use std::collections::HashMap;

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

    #[test]
    fn job_without_deadline_is_not_delayed() {
        let job = Job::new("A", Uuid::new_v4(), sample_execute());
        assert!(!job.is_delayed());
    }

    #[test]
    fn job_with_future_deadline_is_delayed() {
        let job = Job::new("A", Uuid::new_v4(), sample_execute())
            .with_deadline(Utc::now() + chrono::Duration::seconds(60));
        assert!(job.is_delayed());
    }

    #[test]
    fn job_with_past_deadline_is_not_delayed() {
        let job = Job::new("A", Uuid::new_v4(), sample_execute())
            .with_deadline(Utc::now() - chrono::Duration::seconds(60));
        assert!(!job.is_delayed());
    }
}
