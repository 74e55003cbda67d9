//! Site config/secrets loading and environment variable parsing for the
//! DFM runtime.
//!
//! Grounded on `r2e-core/src/config`'s YAML-plus-environment-overlay
//! pattern, specialized to the DFM site config's fixed shape (`site` +
//! `providers`) rather than `r2e`'s generic dot-path flatten — a site
//! config is validated against one known struct, not queried by
//! arbitrary key at runtime.

pub mod env;
pub mod error;
pub mod site;

pub use env::{load_dotenv, AuthMethod, LoggingConfig, RedisEndpoint};
pub use error::ConfigError;
pub use site::{ProviderConfig, SiteConfig, SiteSecrets};
