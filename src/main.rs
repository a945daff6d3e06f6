//! Realm Gateway binary
//!
//! Wires the shard pool, player listener, HTTP endpoints, operator console
//! and shutdown handling together.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use realm_gateway::config::ServerConfig;
use realm_gateway::console::{self, ConsoleAction, ControlConsole};
use realm_gateway::gate::ConnectionGate;
use realm_gateway::http::{self, AppState};
use realm_gateway::identity::{IdentityLinker, LedgerClient, OAuthClient};
use realm_gateway::metrics::ServerMetrics;
use realm_gateway::network;
use realm_gateway::shard::{Shard, ShardPool};
use realm_gateway::shutdown::ShutdownCoordinator;
use realm_gateway::store::{MySqlStore, WalletStore};
use realm_gateway::world::{IdleBots, LocalShard};
use realm_gateway::ServerContext;

/// Delay between binding the player socket and booting shards
const SOCKET_WARMUP: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let config = ServerConfig::from_env()?;

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("realm_gateway={}", config.log_level).parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if config.log_format == "pretty" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        name = %config.name,
        worlds = config.worlds,
        "Initializing {} game engine...",
        config.name
    );

    let metrics = ServerMetrics::install()?;

    let store: Option<Arc<dyn WalletStore>> = match config.persistence_url()? {
        Some(url) => Some(Arc::new(
            MySqlStore::connect(url, config.database_max_connections).await?,
        )),
        None => {
            info!("Offline mode - running without persistence");
            None
        }
    };

    let max_players = config.max_players;
    let pool = ShardPool::initialize(config.worlds, &move |index: u32| -> Arc<dyn Shard> {
        Arc::new(LocalShard::new(index, max_players))
    })?;

    let ctx = Arc::new(ServerContext::new(pool, config.connect_url(), store, metrics));

    let linker = Arc::new(IdentityLinker::new(
        Arc::clone(&ctx),
        Arc::new(OAuthClient::new(config.oauth.clone())),
        Arc::new(LedgerClient::new(config.ledger.clone())),
    ));
    let gate = Arc::new(ConnectionGate::new(Arc::clone(&ctx)));
    let operator_console =
        ControlConsole::new(Arc::clone(&ctx), Arc::new(IdleBots), config.console_prefix);
    let coordinator = ShutdownCoordinator::new(Arc::clone(&ctx));

    let player_listener =
        tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;

    let http_addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    info!(port = config.http_port, "Starting HTTP server");
    let http_server = axum::serve(
        tokio::net::TcpListener::bind(http_addr).await?,
        http::router(AppState {
            ctx: Arc::clone(&ctx),
            linker,
        }),
    );

    // Boot shards once the socket is up; admission opens on the last completion
    let boot_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        tokio::time::sleep(SOCKET_WARMUP).await;
        boot_ctx.boot_shards();
        boot_ctx.readiness.wait_ready().await;
        boot_ctx.metrics.set_shards_ready(boot_ctx.pool.len());
        info!(shards = boot_ctx.pool.len(), "Admission open");
    });

    let console_task = async {
        if operator_console.run(console::stdin_lines()).await == ConsoleAction::Exit {
            std::process::exit(0);
        }
        // stdin closed; keep serving until a signal arrives
        std::future::pending::<()>().await
    };

    tokio::select! {
        _ = network::serve_players(player_listener, gate) => {}
        result = http_server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = console_task => {}
        _ = coordinator.listen() => {}
    }

    info!("Gateway shutdown complete");
    Ok(())
}
