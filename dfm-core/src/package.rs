use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::welcome::Welcome;

/// A site-to-site envelope wrapping a [`Job`], produced by the Request
/// Context whenever an operation targets a non-local site and delivered
/// by the Uplink Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub timestamp: DateTime<Utc>,
    pub source_site: String,
    pub target_site: String,
    pub job: Job,
    /// Version/site identification attached by the sending site,
    /// optional so a `Package` built without one still round-trips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome: Option<Welcome>,
}

impl Package {
    pub fn new(source_site: impl Into<String>, target_site: impl Into<String>, job: Job) -> Self {
        Self {
            timestamp: Utc::now(),
            source_site: source_site.into(),
            target_site: target_site.into(),
            job,
            welcome: None,
        }
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        source_site: impl Into<String>,
        target_site: impl Into<String>,
        job: Job,
    ) -> Self {
        Self {
            timestamp,
            source_site: source_site.into(),
            target_site: target_site.into(),
            job,
            welcome: None,
        }
    }

    /// Attach a `Welcome` envelope, logged at `debug` by the receiving
    /// service once the Package is picked back up off the uplink stream.
    pub fn with_welcome(mut self, welcome: Welcome) -> Self {
        self.welcome = Some(welcome);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_call::{Constant, Execute, FunctionCall, NodeMeta};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn sample_job() -> Job {
        let id = Uuid::new_v4();
        let mut body = HashMap::new();
        body.insert(
            id,
            FunctionCall::Constant(Constant {
                meta: NodeMeta::new(id),
                value: serde_json::json!(1),
            }),
        );
        let execute = Execute {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("B".to_string()),
            body,
        };
        Job::new("A", Uuid::new_v4(), execute)
    }

    #[test]
    fn with_welcome_round_trips_through_json() {
        let package = Package::new("A", "B", sample_job()).with_welcome(Welcome::new("A", "0.1.0"));
        let json = serde_json::to_string(&package).unwrap();
        let back: Package = serde_json::from_str(&json).unwrap();
        assert_eq!(back.welcome, Some(Welcome::new("A", "0.1.0")));
    }

    #[test]
    fn package_without_welcome_round_trips_as_none() {
        let package = Package::new("A", "B", sample_job());
        let json = serde_json::to_string(&package).unwrap();
        assert!(!json.contains("welcome"));
        let back: Package = serde_json::from_str(&json).unwrap();
        assert_eq!(back.welcome, None);
    }
}
