//! `dfm` — a single-dependency facade over the federation runtime's
//! sub-crates, in the same spirit as the teacher's own `r2e` facade: one
//! crate, feature-gated re-exports, no functionality of its own.
//!
//! ```ignore
//! use dfm::prelude::*;
//! ```
//!
//! | Feature     | Default | Crate           |
//! |-------------|---------|-----------------|
//! | `runtime`   | **yes** | `dfm-runtime`   |
//! | `compiler`  | **yes** | `dfm-compiler`  |
//! | `scheduler` | no      | `dfm-scheduler` |
//! | `execute`   | no      | `dfm-execute`   |
//! | `process`   | no      | `dfm-process`   |
//! | `full`      | no      | all of the above |

pub use dfm_config as config;
pub use dfm_core as core;
pub use dfm_transport as transport;

#[cfg(feature = "runtime")]
pub use dfm_runtime as runtime;

#[cfg(feature = "compiler")]
pub use dfm_compiler as compiler;

#[cfg(feature = "scheduler")]
pub use dfm_scheduler as scheduler;

#[cfg(feature = "execute")]
pub use dfm_execute as execute;

#[cfg(feature = "process")]
pub use dfm_process as process;

/// Unified prelude — import the data model, transport trait, and (when
/// enabled) the runtime/compiler entry points with `use dfm::prelude::*`.
pub mod prelude {
    pub use dfm_core::function_call::{Execute, FunctionCall, NodeMeta, Process, Provider};
    pub use dfm_core::{DfmError, DfmResult, Job, Package, Response, ResponseBody};
    pub use dfm_transport::{Channel, Transport};

    #[cfg(feature = "runtime")]
    pub use dfm_runtime::adapter::AdapterHandle;
    #[cfg(feature = "runtime")]
    pub use dfm_runtime::request::DfmRequest;
    #[cfg(feature = "runtime")]
    pub use dfm_runtime::stream::Stream;

    #[cfg(feature = "compiler")]
    pub use dfm_compiler::{pipeline_dict_to_adapter_graph, Site};
}
