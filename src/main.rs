// Wins pool service entry point.
//
// Startup sequence:
// 1. Initialize tracing (stdout)
// 2. Load config (copying defaults on first run)
// 3. Open database
// 4. Select the wins provider
// 5. Build the router and serve

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use winspool::config;
use winspool::db::Database;
use winspool::events::EventBus;
use winspool::server::{self, AppContext};
use winspool::sync::provider::{EspnProvider, StubProvider};
use winspool::sync::WinsProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("winspool starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: listening on {}:{}, sync {}",
        config.server.host,
        config.server.port,
        if config.sync.enabled { "enabled" } else { "disabled" }
    );

    // 3. Open database
    let db = Database::open(&config.database.path).context("failed to open database")?;
    info!("Database opened at {}", config.database.path);

    // 4. Select the wins provider
    let provider: Arc<dyn WinsProvider> = match config.sync.provider.as_str() {
        "stub" => Arc::new(StubProvider::empty()),
        _ => Arc::new(EspnProvider::new().context("failed to build wins provider")?),
    };
    info!("Wins provider: {}", provider.name());

    // 5. Build the router and serve
    let ctx = AppContext {
        db: Arc::new(db),
        bus: Arc::new(EventBus::new()),
        sync: config.sync.clone(),
        provider,
    };
    let app = server::router(ctx);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .context("server exited with an error")?;

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("winspool=info,warn")),
        )
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
