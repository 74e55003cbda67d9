//! The Site/Provider registry, the two-pass Pipeline Compiler, and the
//! Discovery advice tree: turns a wire-level [`dfm_core::Body`] into
//! either a runnable [`dfm_runtime::adapter::AdapterHandle`] graph or, in
//! discovery mode, a tree of [`advice::FieldAdvice`] a client can walk to
//! fill in the fields it omitted.

pub mod advice;
pub mod discovery;
pub mod pipeline;
pub mod site;

pub use advice::{AdviceBuilder, AdviceContext, Advised, AdvisorDef, FieldAdvice};
pub use discovery::{build_advice_tree, pipeline_dict_to_discovery_adapters, DiscoveredAdapter, DiscoveryOutput};
pub use pipeline::pipeline_dict_to_adapter_graph;
pub use site::Site;
