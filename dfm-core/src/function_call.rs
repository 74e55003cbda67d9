use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::response::Response;

/// A graph node is either pinned to a named provider, or (discovery only)
/// carries the "advise me" sentinel in place of a provider name.
///
/// This is the Rust analogue of the source's `provider: str | Advise`
/// field: instead of a runtime-checked union we get an exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Provider {
    Named(String),
    Discovery(DiscoverySentinel),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySentinel {
    pub api_class: String,
}

impl Provider {
    pub fn discovery() -> Self {
        Provider::Discovery(DiscoverySentinel {
            api_class: "dfm.common.Advise".to_string(),
        })
    }

    pub fn is_discovery(&self) -> bool {
        matches!(self, Provider::Discovery(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Provider::Named(s) => Some(s),
            Provider::Discovery(_) => None,
        }
    }
}

/// Fields shared by every `FunctionCall` variant.
///
/// In the source these live on the polymorphic base model; here they are
/// `#[serde(flatten)]`ed into each variant struct so the wire format stays
/// a single flat JSON object carrying `api_class` plus the base fields
/// plus the variant's own fields — exactly what the original emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub node_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub is_output: bool,
    #[serde(default)]
    pub force_compute: bool,
}

impl NodeMeta {
    pub fn new(node_id: Uuid) -> Self {
        Self {
            node_id,
            provider: None,
            is_output: false,
            force_compute: false,
        }
    }
}

/// One node's worth of adapter input wiring: either a single referenced
/// node, or (for n-ary joins) a list of referenced nodes.
#[derive(Debug, Clone)]
pub enum InputRef {
    Single(Uuid),
    List(Vec<Uuid>),
}

pub type Body = HashMap<Uuid, FunctionCall>;

macro_rules! node_struct {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            #[serde(flatten)]
            pub meta: NodeMeta,
            $(pub $field: $ty,)*
        }
    };
}

node_struct!(Constant { value: serde_json::Value });
node_struct!(GreetMe { name: String });
node_struct!(Execute {
    site: Option<String>,
    body: Body,
});
node_struct!(PushResponse { response: Response });
node_struct!(ReceiveMessage {
    mailbox: String,
    message: serde_json::Value,
    target_site: String,
});
node_struct!(SendMessage {
    data: Uuid,
    target_site: String,
    mailbox: String,
});
node_struct!(Zip2 { lhs: Uuid, rhs: Uuid });
node_struct!(SignalClient {
    after: Uuid,
    message: serde_json::Value,
});
node_struct!(SignalAllDone {
    after: Vec<Uuid>,
    message: serde_json::Value,
});
node_struct!(Process { execute: Box<Execute> });

/// `AwaitMessage(mailbox, body, wait_count, sleeptime)` — the only
/// self-rescheduling primitive in the core. `wait_count` defaults to 0 and
/// is bumped by one on every reschedule; `AWAIT_MESSAGE_MAX_RESCHEDULES`
/// bounds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaitMessage {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub mailbox: String,
    pub body: Body,
    #[serde(default)]
    pub wait_count: u32,
    pub sleeptime: f64,
}

/// `ListTextureFiles(path, format, return_meta_data)`. `path` is omitted
/// by the field advisor when it wants the client to pick a subfolder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListTextureFiles {
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(default)]
    pub path: Option<String>,
    pub format: String,
    #[serde(default)]
    pub return_meta_data: bool,
}

/// The maximum number of times an `AwaitMessage` may reschedule itself
/// before giving up. This is the core's only built-in timeout.
pub const AWAIT_MESSAGE_MAX_RESCHEDULES: u32 = 500;

/// A graph node, tagged by `api_class` exactly as the wire format carries
/// it. Deserialization dispatches through this tag instead of the
/// source's `importlib`-based rewrite-on-deserialize hook — serde's
/// internally tagged enum support *is* the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "api_class")]
pub enum FunctionCall {
    #[serde(rename = "dfm.api.dfm.Constant")]
    Constant(Constant),
    #[serde(rename = "dfm.api.dfm.GreetMe")]
    GreetMe(GreetMe),
    #[serde(rename = "dfm.api.dfm.Execute")]
    Execute(Execute),
    #[serde(rename = "dfm.api.dfm.PushResponse")]
    PushResponse(PushResponse),
    #[serde(rename = "dfm.api.dfm.ReceiveMessage")]
    ReceiveMessage(ReceiveMessage),
    #[serde(rename = "dfm.api.dfm.SendMessage")]
    SendMessage(SendMessage),
    #[serde(rename = "dfm.api.dfm.Zip2")]
    Zip2(Zip2),
    #[serde(rename = "dfm.api.dfm.SignalClient")]
    SignalClient(SignalClient),
    #[serde(rename = "dfm.api.dfm.SignalAllDone")]
    SignalAllDone(SignalAllDone),
    #[serde(rename = "dfm.api.dfm.AwaitMessage")]
    AwaitMessage(AwaitMessage),
    #[serde(rename = "dfm.api.dfm.ListTextureFiles")]
    ListTextureFiles(ListTextureFiles),
    #[serde(rename = "dfm.api.dfm.Process")]
    Process(Process),
}

impl FunctionCall {
    pub fn meta(&self) -> &NodeMeta {
        match self {
            FunctionCall::Constant(n) => &n.meta,
            FunctionCall::GreetMe(n) => &n.meta,
            FunctionCall::Execute(n) => &n.meta,
            FunctionCall::PushResponse(n) => &n.meta,
            FunctionCall::ReceiveMessage(n) => &n.meta,
            FunctionCall::SendMessage(n) => &n.meta,
            FunctionCall::Zip2(n) => &n.meta,
            FunctionCall::SignalClient(n) => &n.meta,
            FunctionCall::SignalAllDone(n) => &n.meta,
            FunctionCall::AwaitMessage(n) => &n.meta,
            FunctionCall::ListTextureFiles(n) => &n.meta,
            FunctionCall::Process(n) => &n.meta,
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.meta().node_id
    }

    pub fn provider(&self) -> Option<&Provider> {
        self.meta().provider.as_ref()
    }

    pub fn force_compute(&self) -> bool {
        self.meta().force_compute
    }

    /// The fully-qualified type tag this node serializes under. Used by
    /// the Site when looking up the node's behaviour in a provider's
    /// `interface` table.
    pub fn api_class(&self) -> &'static str {
        match self {
            FunctionCall::Constant(_) => "dfm.api.dfm.Constant",
            FunctionCall::GreetMe(_) => "dfm.api.dfm.GreetMe",
            FunctionCall::Execute(_) => "dfm.api.dfm.Execute",
            FunctionCall::PushResponse(_) => "dfm.api.dfm.PushResponse",
            FunctionCall::ReceiveMessage(_) => "dfm.api.dfm.ReceiveMessage",
            FunctionCall::SendMessage(_) => "dfm.api.dfm.SendMessage",
            FunctionCall::Zip2(_) => "dfm.api.dfm.Zip2",
            FunctionCall::SignalClient(_) => "dfm.api.dfm.SignalClient",
            FunctionCall::SignalAllDone(_) => "dfm.api.dfm.SignalAllDone",
            FunctionCall::AwaitMessage(_) => "dfm.api.dfm.AwaitMessage",
            FunctionCall::ListTextureFiles(_) => "dfm.api.dfm.ListTextureFiles",
            FunctionCall::Process(_) => "dfm.api.dfm.Process",
        }
    }

    /// Named adapter-input slots this node declares, in the arity the
    /// spec assigns it (nullary/unary/binary/n-ary). The Pipeline Compiler
    /// uses this, not a hardcoded per-variant match, to resolve references
    /// through the symbol table and compute leaves.
    pub fn input_refs(&self) -> Vec<(&'static str, InputRef)> {
        match self {
            FunctionCall::SendMessage(n) => vec![("data", InputRef::Single(n.data))],
            FunctionCall::Zip2(n) => vec![
                ("lhs", InputRef::Single(n.lhs)),
                ("rhs", InputRef::Single(n.rhs)),
            ],
            FunctionCall::SignalClient(n) => vec![("after", InputRef::Single(n.after))],
            FunctionCall::SignalAllDone(n) => {
                vec![("after", InputRef::List(n.after.clone()))]
            }
            // Constant, GreetMe, Execute, PushResponse, ReceiveMessage,
            // AwaitMessage and ListTextureFiles are nullary: AwaitMessage's
            // `body` is a sub-pipeline scheduled separately, not an
            // adapter-input wire, and Execute's `body` is likewise its own
            // nested graph rather than a value flowing into Execute itself.
            _ => vec![],
        }
    }
}
