use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One provider's entry in the site config's `providers` map.
///
/// `interface` maps an `api_class` (the same tag `FunctionCall`
/// serializes under) to either a bare adapter config string (the adapter
/// takes no static configuration beyond selecting it) or a structured
/// config object, matching the source's `Dict[api_class, adapter_config |
/// str]` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_class: String,
    #[serde(default)]
    pub cache_fsspec_conf: Option<serde_json::Value>,
    #[serde(default)]
    pub interface: HashMap<String, serde_json::Value>,
    /// Provider-level storage options (endpoint, bucket, etc.); secrets
    /// loaded from the parallel secrets file are merged into this map at
    /// runtime under the same provider key.
    #[serde(flatten)]
    pub storage_options: HashMap<String, serde_json::Value>,
}

/// The site config file: `site` (this site's name) plus a `providers` map
/// keyed by provider name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub site: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// The provider key used when a `FunctionCall` omits `provider`
    /// entirely.
    #[serde(default = "default_provider_key")]
    pub default_provider: String,
}

fn default_provider_key() -> String {
    "dfm".to_string()
}

/// The parallel secrets file: provider name -> map of secret key/value
/// pairs merged into that provider's storage options at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteSecrets {
    #[serde(flatten)]
    pub providers: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl SiteConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_yaml_str(&content)
    }

    /// Merge a secrets document into this config's provider storage
    /// options, in place. Unknown provider keys in the secrets file are
    /// ignored — a secrets file may be shared across several site config
    /// variants.
    pub fn merge_secrets(&mut self, secrets: &SiteSecrets) {
        for (provider_name, secret_values) in &secrets.providers {
            if let Some(provider) = self.providers.get_mut(provider_name) {
                for (k, v) in secret_values {
                    provider.storage_options.insert(k.clone(), v.clone());
                }
            }
        }
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

impl SiteSecrets {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_yaml_str(&content)
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
site: site-a
providers:
  dfm:
    provider_class: dfm.provider.LocalProvider
    interface:
      dfm.api.dfm.GreetMe: { greeting: "Hello" }
      dfm.api.dfm.Constant: "default"
    endpoint: http://localhost:9000
"#;

    #[test]
    fn parses_site_and_provider_interface_table() {
        let cfg = SiteConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.site, "site-a");
        let provider = cfg.provider("dfm").unwrap();
        assert_eq!(provider.provider_class, "dfm.provider.LocalProvider");
        assert_eq!(
            provider.interface["dfm.api.dfm.GreetMe"]["greeting"],
            "Hello"
        );
    }

    #[test]
    fn secrets_merge_into_matching_provider_only() {
        let mut cfg = SiteConfig::from_yaml_str(SAMPLE).unwrap();
        let secrets = SiteSecrets::from_yaml_str(
            r#"
dfm:
  access_key: "shh"
other:
  access_key: "ignored"
"#,
        )
        .unwrap();
        cfg.merge_secrets(&secrets);
        assert_eq!(cfg.provider("dfm").unwrap().storage_options["access_key"], "shh");
        assert!(!cfg.providers.contains_key("other"));
    }
}
