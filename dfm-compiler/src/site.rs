//! The Site/Provider registry: resolves a graph node's provider and looks
//! up its static adapter configuration, backing both the Pipeline Compiler
//! and the Discovery pass.

use std::path::PathBuf;
use std::sync::Arc;

use dfm_config::{ProviderConfig, SiteConfig};
use dfm_core::function_call::{FunctionCall, Provider};
use dfm_core::{DfmError, DfmResult};
use dfm_runtime::filesystem::{FileSystem, LocalFileSystem};

/// A loaded [`SiteConfig`] plus the filesystem seam its providers read
/// through. One `Site` is built per service process at startup and shared
/// (cheap to clone — everything behind it is an `Arc` or owned data copied
/// once) across every request the process handles.
#[derive(Clone)]
pub struct Site {
    config: Arc<SiteConfig>,
    filesystem: Arc<dyn FileSystem>,
}

impl Site {
    pub fn new(config: SiteConfig) -> Self {
        Self::with_filesystem(config, Arc::new(LocalFileSystem::new(".")))
    }

    pub fn with_filesystem(config: SiteConfig, filesystem: Arc<dyn FileSystem>) -> Self {
        Self {
            config: Arc::new(config),
            filesystem,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.site
    }

    pub fn filesystem(&self) -> Arc<dyn FileSystem> {
        self.filesystem.clone()
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// The provider key a node resolves against: its own `provider` name,
    /// or the site's default when the node omits one. Calling this on a
    /// node carrying the discovery sentinel is a caller error — discovery
    /// fans out over every provider declaring the node's `api_class`
    /// instead (see [`crate::discovery`]).
    pub fn resolve_provider_key(&self, node: &FunctionCall) -> DfmResult<&str> {
        match node.provider() {
            Some(Provider::Named(name)) => Ok(name.as_str()),
            Some(Provider::Discovery(_)) => Err(DfmError::server(
                "resolve_provider_key called on a node carrying the discovery sentinel",
            )),
            None => Ok(&self.config.default_provider),
        }
    }

    pub fn provider(&self, key: &str) -> DfmResult<&ProviderConfig> {
        self.config
            .providers
            .get(key)
            .ok_or_else(|| DfmError::data(format!("unknown provider '{key}'")))
    }

    /// The static config a node's resolved provider declares for its
    /// `api_class`, if any. `None` means the provider exposes the
    /// `api_class` with no configuration beyond selecting it.
    pub fn adapter_config(&self, node: &FunctionCall) -> DfmResult<Option<serde_json::Value>> {
        let key = self.resolve_provider_key(node)?;
        let provider = self.provider(key)?;
        Ok(provider.interface.get(node.api_class()).cloned())
    }

    /// The filesystem root an adapter's `CachingIterator` writes under for
    /// the given provider: `cache_fsspec_conf.path` if the provider
    /// declares one, else a per-site default folder. Only the
    /// `protocol = "file"` case is resolved here, matching
    /// `filesystem.rs`'s `LocalFileSystem`.
    pub fn cache_base_dir(&self, provider_key: &str) -> PathBuf {
        let configured = self
            .provider(provider_key)
            .ok()
            .and_then(|p| p.cache_fsspec_conf.as_ref())
            .and_then(|conf| conf.get("path"))
            .and_then(|v| v.as_str());
        match configured {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(".dfm-cache"),
        }
    }

    /// Every provider key whose `interface` declares `api_class` — the
    /// candidate set Discovery fans a sentinel node out over.
    pub fn providers_declaring(&self, api_class: &str) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .config
            .providers
            .iter()
            .filter(|(_, p)| p.interface.contains_key(api_class))
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort();
        keys
    }
}
