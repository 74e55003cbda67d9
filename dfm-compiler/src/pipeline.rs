//! The two-pass Pipeline Compiler (spec §4.1): pass 1 pre-instantiates a
//! placeholder for every node in a body, seeding the leaves set with every
//! node id; pass 2 resolves each node's input references (removing
//! referenced nodes from leaves) and finalizes its concrete adapter body.
//!
//! The source's two-pass shape relies on Python's mutable-object-identity
//! semantics: pass 1 creates every adapter object up front (regardless of
//! dependency order) and pass 2 wires them together by mutating attributes
//! in place. Rust's adapters are constructed with their inputs already
//! resolved and typed, so pass 1 here creates a [`DeferredBody`] behind
//! every [`AdapterHandle`] instead — a placeholder `AdapterBody` that
//! forwards to whatever concrete body pass 2 finalizes into it. This
//! reproduces the "no topological sort needed" property of the original
//! algorithm without requiring eagerly-typed constructors to run out of
//! order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dfm_core::function_call::{Execute as ExecuteNode, FunctionCall, InputRef};
use dfm_core::{Body, DfmError, DfmResult, ResponseBody};
use dfm_runtime::adapter::{AdapterBody, AdapterHandle, Item};
use dfm_runtime::adapters;
use dfm_runtime::request::DfmRequest;
use dfm_runtime::stream::Stream;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::site::Site;

/// A placeholder `AdapterBody` created in pass 1 and filled with the real
/// body in pass 2. Every method forwards to the finalized inner body;
/// calling any of them before finalization is a compiler bug (pass 2
/// always finalizes every node pass 1 created, in the same body), so it
/// panics rather than returning a routed error.
struct DeferredBody {
    node_id: Uuid,
    inner: OnceCell<Arc<dyn AdapterBody>>,
}

impl DeferredBody {
    fn new(node_id: Uuid) -> Self {
        Self {
            node_id,
            inner: OnceCell::new(),
        }
    }

    fn finalize(&self, body: Arc<dyn AdapterBody>) -> DfmResult<()> {
        self.inner
            .set(body)
            .map_err(|_| DfmError::server("adapter finalized twice by the Pipeline Compiler"))
    }

    fn inner(&self) -> &Arc<dyn AdapterBody> {
        self.inner
            .get()
            .expect("DeferredBody used before the Pipeline Compiler finalized it")
    }
}

#[async_trait]
impl AdapterBody for DeferredBody {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        self.inner().start(stream).await
    }

    fn prepare_to_send(&self, item: &Item) -> Option<ResponseBody> {
        self.inner().prepare_to_send(item)
    }

    fn caching_iterator(&self) -> Option<Arc<dyn dfm_runtime::caching::CachingIterator>> {
        self.inner().caching_iterator()
    }
}

struct Slot {
    handle: Arc<AdapterHandle>,
    deferred: Arc<DeferredBody>,
}

/// Compile `body` into a set of leaf [`AdapterHandle`]s — the nodes no
/// other node in `body` references as an input. Fails if any node
/// references a node id not present in `body` (naming the referring node
/// and the input slot), or if compilation leaves no leaves at all.
pub fn pipeline_dict_to_adapter_graph(
    body: &Body,
    site: &Site,
    request: &DfmRequest,
) -> DfmResult<Vec<Arc<AdapterHandle>>> {
    // Pass 1: pre-instantiate a deferred placeholder for every node and
    // seed the leaves set with every node id, regardless of reference
    // order.
    let mut slots: HashMap<Uuid, Slot> = HashMap::with_capacity(body.len());
    let mut leaves: HashSet<Uuid> = HashSet::with_capacity(body.len());
    for node_id in body.keys() {
        let deferred = Arc::new(DeferredBody::new(*node_id));
        let handle = AdapterHandle::new(deferred.clone() as Arc<dyn AdapterBody>);
        slots.insert(*node_id, Slot { handle, deferred });
        leaves.insert(*node_id);
    }
    let symbols: HashMap<Uuid, Arc<AdapterHandle>> =
        slots.iter().map(|(id, slot)| (*id, slot.handle.clone())).collect();

    // Pass 2: resolve each node's input references against the symbol
    // table (removing referenced nodes from the leaves set), then
    // finalize its concrete adapter body.
    for (node_id, node) in body {
        for (input_name, input_ref) in node.input_refs() {
            match input_ref {
                InputRef::Single(referenced) => {
                    require_in_body(body, *node_id, input_name, referenced)?;
                    leaves.remove(&referenced);
                }
                InputRef::List(referenced_ids) => {
                    for referenced in referenced_ids {
                        require_in_body(body, *node_id, input_name, referenced)?;
                        leaves.remove(&referenced);
                    }
                }
            }
        }

        let concrete = build_adapter_body(node, site, request, &symbols)?;
        slots[node_id].deferred.finalize(concrete)?;
    }

    if !body.is_empty() && leaves.is_empty() {
        return Err(DfmError::data("Pipeline does not have any leaf operations"));
    }

    Ok(leaves
        .into_iter()
        .map(|id| slots.remove(&id).expect("leaf id always has a slot").handle)
        .collect())
}

fn require_in_body(body: &Body, referring: Uuid, input_name: &str, referenced: Uuid) -> DfmResult<()> {
    if body.contains_key(&referenced) {
        Ok(())
    } else {
        Err(DfmError::data(format!(
            "node {referring} references unresolved input '{input_name}' -> {referenced}"
        )))
    }
}

fn lookup(
    symbols: &HashMap<Uuid, Arc<AdapterHandle>>,
    node_id: Uuid,
) -> DfmResult<Arc<AdapterHandle>> {
    symbols
        .get(&node_id)
        .cloned()
        .ok_or_else(|| DfmError::server(format!("symbol table missing resolved input {node_id}")))
}

/// Build the concrete [`AdapterBody`] for one node, resolving its
/// provider's static config and any adapter-input references through the
/// symbol table built in pass 1.
fn build_adapter_body(
    node: &FunctionCall,
    site: &Site,
    request: &DfmRequest,
    symbols: &HashMap<Uuid, Arc<AdapterHandle>>,
) -> DfmResult<Arc<dyn AdapterBody>> {
    match node {
        FunctionCall::Constant(n) => Ok(Arc::new(adapters::Constant::new(n.meta.node_id, n.value.clone()))),

        FunctionCall::GreetMe(n) => {
            let config = site.adapter_config(node)?;
            let greeting = config
                .as_ref()
                .and_then(|c| c.get("greeting"))
                .and_then(|v| v.as_str())
                .unwrap_or("Hello")
                .to_string();

            let config_value = config.clone().unwrap_or(serde_json::Value::Null);
            let params_value = serde_json::json!({ "name": n.name });
            let hash_key = dfm_runtime::caching::compute_hash_key(&config_value, &params_value, &[]);
            let provider_key = site.resolve_provider_key(node)?;
            let cache: Arc<dyn dfm_runtime::caching::CachingIterator> = Arc::new(
                dfm_runtime::caching::FileCachingIterator::new(site.cache_base_dir(provider_key), hash_key),
            );

            Ok(Arc::new(adapters::GreetMe::with_caching(
                n.meta.node_id,
                greeting,
                n.name.clone(),
                n.meta.force_compute,
                Some(cache),
            )))
        }

        FunctionCall::Execute(n) => {
            let execute_node: ExecuteNode = n.clone();
            Ok(Arc::new(adapters::Execute::new(execute_node, request.clone())))
        }

        FunctionCall::PushResponse(n) => Ok(Arc::new(adapters::PushResponse::new(
            n.meta.node_id,
            n.response.clone(),
            request.clone(),
        ))),

        FunctionCall::ReceiveMessage(n) => Ok(Arc::new(adapters::ReceiveMessage::new(
            n.meta.node_id,
            n.mailbox.clone(),
            n.message.clone(),
            n.target_site.clone(),
            request.clone(),
        ))),

        FunctionCall::SendMessage(n) => {
            let data = lookup(symbols, n.data)?;
            Ok(Arc::new(adapters::SendMessage::new(
                n.meta.node_id,
                data,
                n.target_site.clone(),
                n.mailbox.clone(),
                request.clone(),
            )))
        }

        FunctionCall::Zip2(n) => {
            let lhs = lookup(symbols, n.lhs)?;
            let rhs = lookup(symbols, n.rhs)?;
            Ok(Arc::new(adapters::Zip2::new(n.meta.node_id, lhs, rhs)))
        }

        FunctionCall::SignalClient(n) => {
            let after = lookup(symbols, n.after)?;
            Ok(Arc::new(adapters::SignalClient::new(
                n.meta.node_id,
                after,
                n.message.clone(),
            )))
        }

        FunctionCall::SignalAllDone(n) => {
            let afters = n
                .after
                .iter()
                .map(|id| lookup(symbols, *id))
                .collect::<DfmResult<Vec<_>>>()?;
            Ok(Arc::new(adapters::SignalAllDone::new(
                n.meta.node_id,
                afters,
                n.message.clone(),
            )))
        }

        FunctionCall::AwaitMessage(n) => Ok(Arc::new(adapters::AwaitMessage::new(n.clone(), request.clone()))),

        FunctionCall::ListTextureFiles(n) => {
            let config = site.adapter_config(node)?.ok_or_else(|| {
                DfmError::data("ListTextureFiles requires provider config under its api_class")
            })?;
            let parsed: adapters::ListTextureFilesConfig = serde_json::from_value(config)
                .map_err(|e| DfmError::data(format!("invalid ListTextureFiles provider config: {e}")))?;
            Ok(Arc::new(adapters::ListTextureFiles::new(
                n.meta.node_id,
                parsed,
                n.path.clone(),
                n.format.clone(),
                n.return_meta_data,
                site.filesystem(),
            )))
        }

        FunctionCall::Process(_) => Err(DfmError::data(
            "a Process node cannot itself be compiled into an adapter graph; its execute.body must be unwrapped first",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfm_config::SiteConfig;
    use dfm_core::function_call::{Constant, GreetMe, NodeMeta, SignalClient, Zip2};
    use dfm_transport::MockTransport;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc as StdArc;

    fn site() -> Site {
        Site::new(
            SiteConfig::from_yaml_str(
                r#"
site: site-a
providers:
  dfm:
    provider_class: dfm.provider.LocalProvider
    interface:
      dfm.api.dfm.GreetMe: { greeting: "Hello" }
"#,
            )
            .unwrap(),
        )
    }

    /// Like `site()`, but points `GreetMe`'s cache at `cache_dir` instead
    /// of the default `.dfm-cache` — for tests that actually run a
    /// `GreetMe` adapter's `start()` and must not write outside a tempdir.
    fn site_with_cache_dir(cache_dir: &std::path::Path) -> Site {
        Site::new(
            SiteConfig::from_yaml_str(&format!(
                r#"
site: site-a
providers:
  dfm:
    provider_class: dfm.provider.LocalProvider
    cache_fsspec_conf: {{ protocol: "file", path: "{}" }}
    interface:
      dfm.api.dfm.GreetMe: {{ greeting: "Hello" }}
"#,
                cache_dir.display()
            ))
            .unwrap(),
        )
    }

    fn request() -> DfmRequest {
        DfmRequest::new(StdArc::new(MockTransport::new()), "site-a", "site-a", Uuid::new_v4())
    }

    #[tokio::test]
    async fn a_single_constant_is_its_own_leaf() {
        let id = Uuid::new_v4();
        let mut body: Body = StdHashMap::new();
        body.insert(
            id,
            FunctionCall::Constant(Constant {
                meta: NodeMeta::new(id),
                value: serde_json::json!(42),
            }),
        );

        let leaves = pipeline_dict_to_adapter_graph(&body, &site(), &request()).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].node_id(), id);
    }

    #[tokio::test]
    async fn referenced_nodes_are_not_leaves() {
        let lhs_id = Uuid::new_v4();
        let rhs_id = Uuid::new_v4();
        let zip_id = Uuid::new_v4();
        let mut body: Body = StdHashMap::new();
        body.insert(
            lhs_id,
            FunctionCall::GreetMe(GreetMe {
                meta: NodeMeta::new(lhs_id),
                name: "lhs".to_string(),
            }),
        );
        body.insert(
            rhs_id,
            FunctionCall::GreetMe(GreetMe {
                meta: NodeMeta::new(rhs_id),
                name: "rhs".to_string(),
            }),
        );
        body.insert(
            zip_id,
            FunctionCall::Zip2(Zip2 {
                meta: NodeMeta::new(zip_id),
                lhs: lhs_id,
                rhs: rhs_id,
            }),
        );

        let cache_dir = tempfile::tempdir().unwrap();
        let leaves =
            pipeline_dict_to_adapter_graph(&body, &site_with_cache_dir(cache_dir.path()), &request())
                .unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].node_id(), zip_id);

        let stream = leaves[0].get_or_create_stream().await;
        let mut cursor = stream.cursor();
        let pair = cursor.next().await.unwrap().unwrap();
        assert_eq!(pair, serde_json::json!(["Hello lhs", "Hello rhs"]));
    }

    #[tokio::test]
    async fn pass1_order_does_not_matter_for_forward_references() {
        // SignalClient is inserted before the node it depends on — pass 1
        // must still succeed because every node gets a placeholder before
        // any reference is resolved.
        let after_id = Uuid::new_v4();
        let signal_id = Uuid::new_v4();
        let mut body: Body = StdHashMap::new();
        body.insert(
            signal_id,
            FunctionCall::SignalClient(SignalClient {
                meta: NodeMeta::new(signal_id),
                after: after_id,
                message: serde_json::json!("done"),
            }),
        );
        body.insert(
            after_id,
            FunctionCall::GreetMe(GreetMe {
                meta: NodeMeta::new(after_id),
                name: "World".to_string(),
            }),
        );

        let leaves = pipeline_dict_to_adapter_graph(&body, &site(), &request()).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].node_id(), signal_id);
    }

    #[tokio::test]
    async fn unresolved_input_reference_is_a_data_error_naming_node_and_input() {
        let zip_id = Uuid::new_v4();
        let missing_id = Uuid::new_v4();
        let mut body: Body = StdHashMap::new();
        body.insert(
            zip_id,
            FunctionCall::Zip2(Zip2 {
                meta: NodeMeta::new(zip_id),
                lhs: missing_id,
                rhs: missing_id,
            }),
        );

        let err = pipeline_dict_to_adapter_graph(&body, &site(), &request()).unwrap_err();
        let message = err.message();
        assert!(message.contains(&zip_id.to_string()));
        assert!(message.contains("lhs"));
    }

    #[tokio::test]
    async fn a_pipeline_where_every_node_is_referenced_has_no_leaves() {
        // Two Zip2 nodes referencing each other's node id would be a cycle
        // in practice unreachable from valid client graphs, but it is the
        // simplest way to exercise "compilation leaves nothing" without
        // also tripping the unresolved-reference check.
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let mut body: Body = StdHashMap::new();
        body.insert(
            a_id,
            FunctionCall::SignalClient(SignalClient {
                meta: NodeMeta::new(a_id),
                after: b_id,
                message: serde_json::json!("a"),
            }),
        );
        body.insert(
            b_id,
            FunctionCall::SignalClient(SignalClient {
                meta: NodeMeta::new(b_id),
                after: a_id,
                message: serde_json::json!("b"),
            }),
        );

        let err = pipeline_dict_to_adapter_graph(&body, &site(), &request()).unwrap_err();
        assert!(err.message().contains("leaf"));
    }

    #[test]
    fn empty_body_compiles_to_no_leaves_without_erroring() {
        let body: Body = StdHashMap::new();
        let leaves = pipeline_dict_to_adapter_graph(&body, &site(), &request()).unwrap();
        assert!(leaves.is_empty());
    }
}
