use anyhow::Result;
use axum::{Router, routing::get};
use clap::Parser;
use lenscast_core::IceServerConfig;
use lenscast_server::{AppState, RelayService, RoomRegistry, run_console, ws_handler};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lenscast-server", about = "Signaling relay for lenscast sessions")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// STUN endpoints advertised to clients. Repeatable.
    #[arg(long = "stun", default_value = "stun:stun.l.google.com:19302")]
    stun: Vec<String>,

    /// Optional TURN endpoint advertised to clients.
    #[arg(long)]
    turn: Option<String>,

    #[arg(long, requires = "turn")]
    turn_username: Option<String>,

    #[arg(long, requires = "turn")]
    turn_credential: Option<String>,
}

fn ice_servers(args: &Args) -> Vec<IceServerConfig> {
    let mut servers = vec![IceServerConfig {
        urls: args.stun.clone(),
        username: None,
        credential: None,
    }];
    if let Some(turn) = &args.turn {
        servers.push(IceServerConfig {
            urls: vec![turn.clone()],
            username: args.turn_username.clone(),
            credential: args.turn_credential.clone(),
        });
    }
    servers
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let relay = RelayService::new();
    let registry = Arc::new(RoomRegistry::new(Arc::new(relay.clone())));

    let state = Arc::new(AppState {
        registry: registry.clone(),
        relay,
        ice_servers: ice_servers(&args),
    });

    tokio::spawn(run_console(registry));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state);

    info!("signaling relay listening on http://{}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
