use std::fmt;

/// Error type for configuration loading.
///
/// Kept independent of [`dfm_core::DfmError`] — a bad site config file is a
/// startup-time failure, not something that ever reaches a client as a
/// `Response`.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O or YAML parsing error occurred while loading a config or
    /// secrets file.
    Load(String),
    /// A required environment variable was not set.
    MissingEnv(&'static str),
    /// An environment variable was set but could not be parsed as the
    /// expected type.
    InvalidEnv { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "config load error: {msg}"),
            ConfigError::MissingEnv(key) => write!(f, "missing required environment variable: {key}"),
            ConfigError::InvalidEnv { key, value } => {
                write!(f, "invalid value for environment variable {key}: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
