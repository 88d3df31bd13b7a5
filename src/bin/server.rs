use std::error::Error;
use std::path::{Path, PathBuf};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use platform_race_server::config::RaceConfig;
use platform_race_server::constants::{ENEMY_BATCH_SIZE, MAX_RACERS, RACE_DURATION_MS};
use platform_race_server::course::{generate_course, validate_course};
use platform_race_server::runtime::{
    spawn_session, OutboundMessage, SessionCommand, CLIENT_QUEUE_CAPACITY,
};
use platform_race_server::server_protocol::parse_client_message;
use platform_race_server::server_utils::{make_id, now_rfc3339};
use platform_race_server::session::RaceSession;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative server for the multiplayer platform race")]
struct Args {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    /// Session seed; every race course is derived from it.
    #[arg(long, env = "RACE_SEED")]
    seed: Option<u32>,
    #[arg(long, env = "RACE_SECONDS", default_value_t = RACE_DURATION_MS / 1000)]
    race_seconds: u64,
    #[arg(long, env = "MAX_RACERS", default_value_t = MAX_RACERS)]
    max_racers: usize,
    #[arg(long, env = "ENEMY_COUNT", default_value_t = ENEMY_BATCH_SIZE)]
    enemies: usize,
    /// Optional presentation bundle to serve next to the socket endpoint.
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

impl Args {
    fn race_config(&self) -> RaceConfig {
        RaceConfig {
            race_duration_ms: self.race_seconds.saturating_mul(1000),
            max_racers: self.max_racers,
            enemy_count: self.enemies,
            ..RaceConfig::default()
        }
    }
}

#[derive(Clone)]
struct AppState {
    commands: mpsc::Sender<SessionCommand>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let args = Args::parse();

    let config = args.race_config();
    if let Err(err) = config.validate() {
        error!(error = %err, "invalid race configuration");
        return Err(err.into());
    }
    let seed = args.seed.unwrap_or_else(rand::random::<u32>);
    if let Err(err) = validate_course(&generate_course(&config, seed), &config) {
        error!(error = %err, seed, "course generator self-check failed");
        return Err(err.into());
    }

    let commands = spawn_session(RaceSession::new(config, seed));
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(AppState { commands });

    let app = if let Some(static_dir) = resolve_static_dir(args.static_dir.as_deref()) {
        info!(path = %static_dir.display(), "serving static files");
        let index_file = static_dir.join("index.html");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        app
    };

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, %bind_addr, "failed to bind server socket");
            return Err(err.into());
        }
    };
    info!(%bind_addr, seed, "listening");
    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "server runtime failed");
        return Err(err.into());
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn resolve_static_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    let path = explicit?;
    if path.join("index.html").is_file() {
        return Some(path.to_path_buf());
    }
    warn!(path = %path.display(), "static dir has no index.html, not serving it");
    None
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let (reply, rx) = oneshot::channel();
    let status = match state.commands.send(SessionCommand::Status { reply }).await {
        Ok(()) => rx.await.ok(),
        Err(_) => None,
    };
    match status {
        Some(session) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "time": now_rfc3339(), "session": session })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ok": false, "time": now_rfc3339() })),
        ),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let conn_id = make_id("conn");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);
    let connect = SessionCommand::Connect {
        conn_id: conn_id.clone(),
        tx,
    };
    if state.commands.send(connect).await.is_err() {
        warn!(conn_id = %conn_id, "session loop is gone, refusing connection");
        return;
    }
    info!(conn_id = %conn_id, "connection opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let OutboundMessage::Text(payload) = outbound;
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };
        let raw = match message {
            Message::Text(raw) => raw.to_string(),
            Message::Binary(raw) => match String::from_utf8(raw.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    let reject = SessionCommand::Reject {
                        conn_id: conn_id.clone(),
                        reason: "invalid utf8 message".to_string(),
                    };
                    if state.commands.send(reject).await.is_err() {
                        break;
                    }
                    continue;
                }
            },
            Message::Close(_) => break,
            _ => continue,
        };

        let command = match parse_client_message(&raw) {
            Some(command) => SessionCommand::Client {
                conn_id: conn_id.clone(),
                command,
            },
            None => SessionCommand::Reject {
                conn_id: conn_id.clone(),
                reason: "invalid message".to_string(),
            },
        };
        if state.commands.send(command).await.is_err() {
            break;
        }
    }

    let disconnect = SessionCommand::Disconnect {
        conn_id: conn_id.clone(),
    };
    if state.commands.send(disconnect).await.is_err() {
        debug!(conn_id = %conn_id, "session loop already stopped");
    }
    let _ = writer.await;
    info!(conn_id = %conn_id, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_shape_the_race_config() {
        let args = Args::try_parse_from([
            "server",
            "--race-seconds",
            "90",
            "--max-racers",
            "4",
            "--enemies",
            "3",
        ])
        .expect("arguments should parse");
        let config = args.race_config();
        assert_eq!(config.race_duration_ms, 90_000);
        assert_eq!(config.max_racers, 4);
        assert_eq!(config.enemy_count, 3);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn missing_static_dir_is_not_served() {
        let missing = std::env::temp_dir().join("platform-race-no-such-dir");
        assert_eq!(resolve_static_dir(Some(missing.as_path())), None);
        assert_eq!(resolve_static_dir(None), None);
    }
}
