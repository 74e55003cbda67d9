//! Discovery mode (spec §4.7): instead of compiling a runnable adapter
//! graph, a discovery request asks each node's resolved provider(s) what
//! it would accept. A node carrying the discovery sentinel provider fans
//! out over every provider declaring its `api_class`; an ordinarily
//! provider-pinned node just describes that one provider's advice.
//!
//! Discovery never executes an adapter, so this module never touches
//! [`dfm_runtime::adapter::AdapterBody`]/`AdapterHandle` — a
//! [`DiscoveredAdapter`] only carries what `field_advisors()` needs
//! (the provider key and its static config for the node's `api_class`),
//! which keeps this pass independent of every adapter's constructor
//! signature.

use std::collections::HashMap;

use dfm_core::function_call::FunctionCall;
use dfm_core::{Body, DfmError, DfmResult};
use dfm_runtime::filesystem::advise_two_level_subdirectories;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::advice::{AdviceBuilder, AdviceContext, Advised, AdvisorDef, FieldAdvice};
use crate::site::Site;

/// One candidate provider for a node under discovery: its key and the
/// static config it declares for the node's `api_class`.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredAdapter {
    pub provider_key: String,
    pub api_class: &'static str,
    pub config: Option<Value>,
}

impl DiscoveredAdapter {
    /// The field advisors this candidate declares for its node, given the
    /// node's own provided field values. Only `ListTextureFiles`' single
    /// `path` advisor is wired up today; other `api_class`es resolve with
    /// no advisors (fully specified, nothing more for discovery to add).
    pub async fn field_advisors(&self, site: &Site, node: &FunctionCall) -> DfmResult<Vec<AdvisorDef>> {
        match node {
            FunctionCall::ListTextureFiles(n) if n.path.is_none() => {
                let config: dfm_runtime::adapters::ListTextureFilesConfig = self
                    .config
                    .clone()
                    .ok_or_else(|| DfmError::data("ListTextureFiles requires provider config"))
                    .and_then(|c| {
                        serde_json::from_value(c)
                            .map_err(|e| DfmError::data(format!("invalid ListTextureFiles provider config: {e}")))
                    })?;
                let candidates =
                    advise_two_level_subdirectories(&*site.filesystem(), &config.subfolder, &n.format).await?;
                Ok(vec![AdvisorDef::new(
                    "path",
                    0,
                    Advised::OneOf {
                        values: candidates.into_iter().map(Value::String).collect(),
                        split_on_advice: true,
                        break_on_advice: true,
                    },
                )])
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// A node's discovery result: either one fixed provider (ordinary
/// provider pinning) or the set of candidates a discovery-sentinel node
/// fans out over.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum DiscoveryOutput {
    Single(DiscoveredAdapter),
    Many(Vec<DiscoveredAdapter>),
}

/// Run the Discovery compiler pass over `body`: for each node, resolve
/// either its one pinned provider or every provider declaring its
/// `api_class` (discovery sentinel). Fails if a discovery-sentinel node's
/// `api_class` has no declaring provider, or a pinned node's provider
/// does not actually declare that `api_class`.
pub fn pipeline_dict_to_discovery_adapters(
    body: &Body,
    site: &Site,
) -> DfmResult<HashMap<Uuid, DiscoveryOutput>> {
    let mut out = HashMap::with_capacity(body.len());
    for (node_id, node) in body {
        let api_class = node.api_class();
        let output = if node.provider().is_some_and(|p| p.is_discovery()) {
            let provider_keys = site.providers_declaring(api_class);
            if provider_keys.is_empty() {
                return Err(DfmError::data(format!(
                    "no provider declares '{api_class}' for discovery on node {node_id}"
                )));
            }
            let candidates = provider_keys
                .into_iter()
                .map(|key| {
                    let provider = site.provider(key).expect("key came from providers_declaring");
                    DiscoveredAdapter {
                        provider_key: key.to_string(),
                        api_class,
                        config: provider.interface.get(api_class).cloned(),
                    }
                })
                .collect();
            DiscoveryOutput::Many(candidates)
        } else {
            let key = site.resolve_provider_key(node)?;
            let provider = site.provider(key)?;
            if !provider.interface.contains_key(api_class) {
                return Err(DfmError::data(format!(
                    "provider '{key}' does not declare '{api_class}' (node {node_id})"
                )));
            }
            DiscoveryOutput::Single(DiscoveredAdapter {
                provider_key: key.to_string(),
                api_class,
                config: provider.interface.get(api_class).cloned(),
            })
        };
        out.insert(*node_id, output);
    }
    Ok(out)
}

/// The field values a node's wire representation already carries, as a
/// flat map discovery treats as the client's "provided" baseline — every
/// JSON field except the shared `NodeMeta`/tag fields.
fn provided_fields(node: &FunctionCall) -> HashMap<String, Value> {
    const META_FIELDS: &[&str] = &["api_class", "node_id", "provider", "is_output", "force_compute"];
    match serde_json::to_value(node) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter(|(k, _)| !META_FIELDS.contains(&k.as_str()))
            .collect(),
        _ => HashMap::new(),
    }
}

/// Build the full [`FieldAdvice`] tree for one discovered candidate.
/// Returns `None` when the candidate declares no advisors for this node
/// (it is already fully specified).
pub async fn build_advice_tree(
    candidate: &DiscoveredAdapter,
    node: &FunctionCall,
    site: &Site,
) -> DfmResult<Option<FieldAdvice>> {
    let advisors = candidate.field_advisors(site, node).await?;
    let builder = AdviceBuilder::new(advisors);
    let ctx = AdviceContext::with_provided(provided_fields(node));
    Ok(builder.build(&ctx))
}
