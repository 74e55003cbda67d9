//! The Scheduler Service binary: wires a live `RedisTransport` to
//! [`dfm_scheduler::run`] and runs until `SIGINT`/`SIGTERM`.

use std::sync::Arc;

use dfm_config::{LoggingConfig, RedisEndpoint};
use dfm_transport::{RedisTransport, Transport};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dfm_config::load_dotenv();
    let logging = LoggingConfig::from_env();
    init_tracing(&logging);

    let endpoint = RedisEndpoint::from_env("SCHEDULER")?;
    let pool = deadpool_redis::Config::from_url(endpoint.url())
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let transport: Arc<dyn Transport> = Arc::new(RedisTransport::new(pool));

    let consumer = format!("scheduler-{}", uuid::Uuid::new_v4());
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("scheduler received shutdown signal");
        shutdown.cancel();
    });

    tracing::info!(consumer = %consumer, "scheduler service starting");
    dfm_scheduler::run(transport, consumer, cancel).await;
    Ok(())
}
