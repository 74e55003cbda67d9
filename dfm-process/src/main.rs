//! The Process Service binary: bind the HTTP surface to a live
//! `RedisTransport` and serve until `SIGINT`/`SIGTERM`.

use std::sync::Arc;

use dfm_config::{AuthMethod, LoggingConfig, RedisEndpoint};
use dfm_process::{router, AppState};
use dfm_transport::{RedisTransport, Transport};
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

/// Wait for `SIGINT` (or `SIGTERM` on Unix), the same shutdown signal
/// every other service binary in the workspace waits on.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl_c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("process service received shutdown signal");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dfm_config::load_dotenv();
    let logging = LoggingConfig::from_env();
    init_tracing(&logging);

    let site_name = std::env::var("K8S_PROCESS_SITE_NAME").unwrap_or_else(|_| "default".to_string());
    let auth = AuthMethod::from_env()?;

    let endpoint = RedisEndpoint::from_env("PROCESS")?;
    let pool = deadpool_redis::Config::from_url(endpoint.url())
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let transport: Arc<dyn Transport> = Arc::new(RedisTransport::new(pool));

    let state = AppState::new(transport, site_name, auth);
    let app = router(state);

    let addr = std::env::var("K8S_PROCESS_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "process service listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("process service stopped");
    Ok(())
}
