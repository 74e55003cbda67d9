use serde::{Deserialize, Serialize};

/// A small envelope attached optionally to uplink deliveries, carrying
/// version/site identification for diagnostics.
///
/// Cheap to construct and logged at `debug` on every Package/Job
/// delivery, which is useful when diagnosing a federation of sites
/// running mismatched builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    pub site: String,
    pub version: String,
}

impl Welcome {
    pub fn new(site: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            version: version.into(),
        }
    }

    pub fn current(site: impl Into<String>) -> Self {
        Self::new(site, env!("CARGO_PKG_VERSION"))
    }
}
