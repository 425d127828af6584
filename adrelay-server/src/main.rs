use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use adrelay_debounce::RedisDebounceManager;
use adrelay_gateway::{Gateway, GatewayDispatcher};
use adrelay_server::config::AdrelayServerConfig;
use adrelay_server::state_factory;
use adrelay_server::ServerError;

/// HTTP server for the advertising event relay.
#[derive(Parser, Debug)]
#[command(name = "adrelay-server", about = "Standalone HTTP server for adrelay")]
struct Cli {
    /// Path to the server's own TOML configuration file (host/port/state backend).
    #[arg(short, long, default_value = "adrelay-server.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let server_config: AdrelayServerConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "server config file not found, using defaults");
        AdrelayServerConfig::default()
    };

    let app_config = Arc::new(adrelay_config::load_config().await?);
    let client = adrelay_forwarder::build_client()?;

    let (request_log, event_log) = state_factory::create_state(&server_config.state).await?;

    let debounce = if app_config.settings.debounce.enabled {
        let dispatcher = Arc::new(GatewayDispatcher::new(
            Arc::clone(&app_config),
            Arc::clone(&request_log),
            client.clone(),
        ));
        let manager = Arc::new(RedisDebounceManager::new(
            &app_config.settings.redis,
            &app_config.settings.debounce,
            dispatcher,
        )?);
        manager.start();
        Some(manager)
    } else {
        None
    };

    let mut builder = Gateway::builder()
        .config(Arc::clone(&app_config))
        .request_log(request_log)
        .event_log(event_log)
        .client(client);
    if let Some(manager) = debounce.clone() {
        builder = builder.debounce(manager);
    }
    let gateway = Arc::new(builder.build()?);

    let state = adrelay_server::api::AppState { gateway };
    let app = adrelay_server::api::router(state);

    let host = cli.host.unwrap_or(server_config.server.host);
    let port = cli.port.unwrap_or(server_config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(ServerError::Io)?;
    info!(address = %addr, "adrelay-server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(manager) = debounce {
        manager.shutdown().await;
    }

    info!("adrelay-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
