/// The three logical transport channels, each a named Redis stream with
/// its own consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Execute,
    Scheduler,
    Uplink,
}

impl Channel {
    fn tag(self) -> &'static str {
        match self {
            Channel::Execute => "EXECUTE",
            Channel::Scheduler => "SCHEDULER",
            Channel::Uplink => "UPLINK",
        }
    }

    /// `ANY.{NAME}.req.stream`
    pub fn stream_key(self) -> String {
        format!("ANY.{}.req.stream", self.tag())
    }

    /// `ANY.{NAME}.req.group`
    pub fn group_key(self) -> String {
        format!("ANY.{}.req.group", self.tag())
    }
}

/// The scheduler's sorted-set delay queue, keyed by deadline epoch seconds.
pub const SCHED_QUEUE_KEY: &str = "sched-queue";

/// The key-value document holding a request's streamed response list.
pub fn request_key(request_id: uuid::Uuid) -> String {
    format!("request:{request_id}")
}

/// The field on `request_key` that holds the JSON-array accumulator.
pub const RESPONSES_FIELD: &str = "responses";

/// A per-request named mailbox slot.
pub fn mailbox_key(request_id: uuid::Uuid, mailbox: &str) -> String {
    format!("{request_id}.{mailbox}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_match_the_documented_keys() {
        assert_eq!(Channel::Execute.stream_key(), "ANY.EXECUTE.req.stream");
        assert_eq!(Channel::Execute.group_key(), "ANY.EXECUTE.req.group");
        assert_eq!(Channel::Scheduler.stream_key(), "ANY.SCHEDULER.req.stream");
        assert_eq!(Channel::Uplink.group_key(), "ANY.UPLINK.req.group");
    }
}
