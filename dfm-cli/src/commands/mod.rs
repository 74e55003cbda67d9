pub mod site;
pub mod submit;
pub mod tail;

use std::sync::Arc;

use dfm_transport::{RedisTransport, Transport};

/// Build a `RedisTransport` from `K8S_CLI_REDIS_*`, the same env
/// convention every other service binary reads its own prefix from.
pub(crate) async fn connect() -> anyhow::Result<Arc<dyn Transport>> {
    let endpoint = dfm_config::RedisEndpoint::from_env("CLI")?;
    let pool = deadpool_redis::Config::from_url(endpoint.url()).create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    Ok(Arc::new(RedisTransport::new(pool)))
}
