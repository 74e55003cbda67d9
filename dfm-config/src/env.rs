use crate::error::ConfigError;

/// Load a `.env` file from the current directory into the process
/// environment, if one is present — mirrors the teacher's
/// `dotenvy::dotenv()` call ahead of reading any `K8S_*`/`DFM_*`/
/// `SERVICE_LOGGING_*` variable. Like `dotenvy::dotenv()` itself, this
/// never overwrites a variable already set in the environment, and a
/// missing `.env` file is not an error — every service binary calls this
/// once at startup before its first `std::env::var` read.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
        Err(dotenvy::Error::Io(_)) => {}
        Err(e) => tracing::warn!(error = %e, "failed to parse .env file"),
    }
}

/// Redis connection parameters for one service's connection, read from its
/// `K8S_{SERVICE}_REDIS_{HOST,PORT,DB,PASSWORD}` quadruple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisEndpoint {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl RedisEndpoint {
    /// Read `K8S_{prefix}_REDIS_HOST/PORT/DB/PASSWORD`. Only `HOST` is
    /// required; `PORT` defaults to 6379, `DB` to 0, `PASSWORD` to none.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let host_key = format!("K8S_{prefix}_REDIS_HOST");
        let host = std::env::var(&host_key).map_err(|_| ConfigError::Load(host_key.clone()))?;

        let port = match std::env::var(format!("K8S_{prefix}_REDIS_PORT")) {
            Ok(v) => v.parse().map_err(|_| ConfigError::Load(format!("K8S_{prefix}_REDIS_PORT")))?,
            Err(_) => 6379,
        };
        let db = match std::env::var(format!("K8S_{prefix}_REDIS_DB")) {
            Ok(v) => v.parse().map_err(|_| ConfigError::Load(format!("K8S_{prefix}_REDIS_DB")))?,
            Err(_) => 0,
        };
        let password = std::env::var(format!("K8S_{prefix}_REDIS_PASSWORD")).ok();

        Ok(Self { host, port, db, password })
    }

    /// A `redis://` URL suitable for `redis::Client::open`.
    pub fn url(&self) -> String {
        match &self.password {
            Some(p) => format!("redis://:{p}@{host}:{port}/{db}", p = p, host = self.host, port = self.port, db = self.db),
            None => format!("redis://{host}:{port}/{db}", host = self.host, port = self.port, db = self.db),
        }
    }
}

/// `DFM_AUTH_METHOD` selects the Process Service's gateway-style auth
/// filter; `"none"` disables the `X-DFM-Auth` gate entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    ApiKey(String),
}

impl AuthMethod {
    pub fn from_env() -> Result<Self, ConfigError> {
        let method = std::env::var("DFM_AUTH_METHOD").unwrap_or_else(|_| "api_key".to_string());
        match method.as_str() {
            "none" => Ok(AuthMethod::None),
            "api_key" => {
                let key = std::env::var("DFM_AUTH_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("DFM_AUTH_API_KEY"))?;
                Ok(AuthMethod::ApiKey(key))
            }
            other => Err(ConfigError::InvalidEnv {
                key: "DFM_AUTH_METHOD",
                value: other.to_string(),
            }),
        }
    }
}

/// `SERVICE_LOGGING_LEVEL` / `SERVICE_LOGGING_ENABLE_JSON` — consumed by
/// each binary's `tracing_subscriber` setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let level = std::env::var("SERVICE_LOGGING_LEVEL").unwrap_or_else(|_| "info".to_string());
        let json = std::env::var("SERVICE_LOGGING_ENABLE_JSON")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self { level, json }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn redis_endpoint_defaults_port_and_db() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("K8S_EXECUTE_REDIS_HOST", "redis.local");
        std::env::remove_var("K8S_EXECUTE_REDIS_PORT");
        std::env::remove_var("K8S_EXECUTE_REDIS_DB");
        std::env::remove_var("K8S_EXECUTE_REDIS_PASSWORD");

        let endpoint = RedisEndpoint::from_env("EXECUTE").unwrap();
        assert_eq!(endpoint.host, "redis.local");
        assert_eq!(endpoint.port, 6379);
        assert_eq!(endpoint.db, 0);
        assert_eq!(endpoint.url(), "redis://redis.local:6379/0");
    }

    #[test]
    fn auth_method_none_bypasses_the_gate() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DFM_AUTH_METHOD", "none");
        assert_eq!(AuthMethod::from_env().unwrap(), AuthMethod::None);
        std::env::remove_var("DFM_AUTH_METHOD");
    }

    #[test]
    fn load_dotenv_sets_new_vars_but_never_overwrites_an_existing_one() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "DFM_TEST_DOTENV_NEW=from_file\nDFM_TEST_DOTENV_EXISTING=from_file\n",
        )
        .unwrap();
        std::env::remove_var("DFM_TEST_DOTENV_NEW");
        std::env::set_var("DFM_TEST_DOTENV_EXISTING", "from_process");

        let original_cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        load_dotenv();
        std::env::set_current_dir(&original_cwd).unwrap();

        assert_eq!(std::env::var("DFM_TEST_DOTENV_NEW").unwrap(), "from_file");
        assert_eq!(std::env::var("DFM_TEST_DOTENV_EXISTING").unwrap(), "from_process");
        std::env::remove_var("DFM_TEST_DOTENV_NEW");
        std::env::remove_var("DFM_TEST_DOTENV_EXISTING");
    }

    #[test]
    fn load_dotenv_is_a_silent_no_op_without_a_dot_env_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let original_cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        load_dotenv();
        std::env::set_current_dir(&original_cwd).unwrap();
    }
}
