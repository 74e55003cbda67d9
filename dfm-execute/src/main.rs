//! The Execute Service binary: wires a live `RedisTransport` and a loaded
//! `Site` to [`dfm_execute::run`] and runs until `SIGINT`/`SIGTERM`.

use std::sync::Arc;

use dfm_compiler::Site;
use dfm_config::{LoggingConfig, RedisEndpoint, SiteConfig, SiteSecrets};
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

fn load_site() -> anyhow::Result<Site> {
    let config_path = std::env::var("K8S_EXECUTE_SITE_CONFIG")?;
    let mut config = SiteConfig::load_file(&config_path)?;

    if let Ok(secrets_path) = std::env::var("K8S_EXECUTE_SITE_SECRETS") {
        let secrets = SiteSecrets::load_file(&secrets_path)?;
        config.merge_secrets(&secrets);
    }

    Ok(Site::new(config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dfm_config::load_dotenv();
    let logging = LoggingConfig::from_env();
    init_tracing(&logging);

    let site = load_site()?;

    let endpoint = RedisEndpoint::from_env("EXECUTE")?;
    let pool = deadpool_redis::Config::from_url(endpoint.url())
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let transport: Arc<dyn Transport> = Arc::new(RedisTransport::new(pool));

    let consumer = format!("execute-{}", uuid::Uuid::new_v4());
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("execute service received shutdown signal");
        shutdown.cancel();
    });

    tracing::info!(consumer = %consumer, site = site.name(), "execute service starting");
    dfm_execute::run(transport, consumer, site, cancel).await;
    Ok(())
}
