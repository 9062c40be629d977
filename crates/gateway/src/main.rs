use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use i3g_domain::config::Config;
use i3g_gateway::bootstrap::build_app_state;
use i3g_gateway::cli::{Cli, Command, ConfigCommand};
use i3g_gateway::rpc::{tcp, ws::ws_handler};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            match i3g_gateway::cli::load_config() {
                Ok((config, _path)) => run_server(Arc::new(config)).await,
                Err(e) => Err(e),
            }
        }
        Some(Command::Config(ConfigCommand::Validate)) => match i3g_gateway::cli::load_config() {
            Ok((config, config_path)) => {
                if i3g_gateway::cli::config::validate(&config, &config_path) {
                    Ok(())
                } else {
                    std::process::exit(2);
                }
            }
            Err(e) => Err(e),
        },
        Some(Command::Config(ConfigCommand::Show)) => match i3g_gateway::cli::load_config() {
            Ok((config, _path)) => {
                i3g_gateway::cli::config::show(&config);
                Ok(())
            }
            Err(e) => Err(e),
        },
        Some(Command::Version) => {
            println!("i3gated {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(3);
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,i3g_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server: validate config, build the shared state and
/// background tasks, bind whichever API transports are enabled, and serve
/// until a shutdown signal arrives.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("i3gated starting");

    let shutdown = CancellationToken::new();
    let state = build_app_state(config.clone(), shutdown.clone())?;

    if !config.api.ws.enabled && !config.api.tcp.enabled {
        anyhow::bail!("neither api.ws nor api.tcp is enabled — nothing to serve");
    }

    let mut tcp_handle = None;
    if config.api.tcp.enabled {
        let addr = format!("{}:{}", config.api.tcp.host, config.api.tcp.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding tcp api to {addr}"))?;
        tracing::info!(addr = %addr, "tcp api listening");
        let state = state.clone();
        let shutdown = shutdown.clone();
        tcp_handle = Some(tokio::spawn(async move {
            tcp::serve(listener, state, shutdown).await;
        }));
    }

    let mut ws_handle = None;
    if config.api.ws.enabled {
        let addr = format!("{}:{}", config.api.ws.host, config.api.ws.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding ws api to {addr}"))?;
        tracing::info!(addr = %addr, "websocket api listening");
        let app: Router = Router::new().route("/ws", get(ws_handler)).with_state(state.clone());
        let shutdown = shutdown.clone();
        ws_handle = Some(tokio::spawn(async move {
            let _ = axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await;
        }));
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    if let Some(h) = tcp_handle {
        h.abort();
    }
    if let Some(h) = ws_handle {
        let _ = h.await;
    }

    if let Err(e) = state.gateway_state.flush() {
        tracing::warn!(error = %e, "final state flush failed");
    }
    tracing::info!("i3gated stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
