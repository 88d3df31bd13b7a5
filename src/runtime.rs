use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::server_protocol::{ClientCommand, QueuePolicy};
use crate::session::{Dispatch, RaceSession};
use crate::types::RacePhase;

pub const CLIENT_QUEUE_CAPACITY: usize = 256;
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
pub enum OutboundMessage {
    Text(String),
}

#[derive(Debug)]
pub enum SessionCommand {
    Connect {
        conn_id: String,
        tx: mpsc::Sender<OutboundMessage>,
    },
    Disconnect {
        conn_id: String,
    },
    Client {
        conn_id: String,
        command: ClientCommand,
    },
    Reject {
        conn_id: String,
        reason: String,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionStatus {
    pub phase: RacePhase,
    pub racers: usize,
    pub spectators: usize,
    pub ready: usize,
    pub connections: usize,
    pub seed: u32,
    #[serde(rename = "remainingMs")]
    pub remaining_ms: Option<u64>,
}

#[derive(Default)]
struct ClientHub {
    clients: HashMap<String, mpsc::Sender<OutboundMessage>>,
}

impl ClientHub {
    fn deliver(&self, dispatch: &Dispatch) -> Vec<String> {
        let payload = match serde_json::to_string(&dispatch.event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize outbound event");
                return Vec::new();
            }
        };
        let policy = dispatch.event.queue_policy();
        let mut failed = Vec::new();
        for (conn_id, tx) in &self.clients {
            if !dispatch.reaches(conn_id) {
                continue;
            }
            if tx.try_send(OutboundMessage::Text(payload.clone())).is_err()
                && policy == QueuePolicy::DisconnectOnFull
            {
                failed.push(conn_id.clone());
            }
        }
        failed
    }
}

pub fn spawn_session(session: RaceSession) -> mpsc::Sender<SessionCommand> {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    tokio::spawn(run_session(session, rx));
    tx
}

pub async fn run_session(mut session: RaceSession, mut commands: mpsc::Receiver<SessionCommand>) {
    let clock = Instant::now();
    let mut hub = ClientHub::default();
    let mut ticker = tokio::time::interval(session.config().tick_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(seed = session.seed(), "session loop started");
    loop {
        let deadline = session
            .next_deadline()
            .map(|at_ms| clock + Duration::from_millis(at_ms));

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                apply_command(&mut session, &mut hub, command, elapsed_ms(clock));
            }
            _ = ticker.tick() => {
                let now_ms = elapsed_ms(clock);
                session.poll_timers(now_ms);
                session.tick_enemies(now_ms);
            }
            _ = sleep_until_deadline(deadline) => {
                session.poll_timers(elapsed_ms(clock));
            }
        }

        flush(&mut session, &mut hub, elapsed_ms(clock));
    }
    info!("session loop stopped");
}

fn apply_command(
    session: &mut RaceSession,
    hub: &mut ClientHub,
    command: SessionCommand,
    now_ms: u64,
) {
    match command {
        SessionCommand::Connect { conn_id, tx } => {
            debug!(conn_id = %conn_id, "connection registered");
            hub.clients.insert(conn_id, tx);
        }
        SessionCommand::Disconnect { conn_id } => {
            hub.clients.remove(&conn_id);
            session.leave(&conn_id, now_ms);
        }
        SessionCommand::Client { conn_id, command } => {
            session.handle(&conn_id, command, now_ms);
        }
        SessionCommand::Reject { conn_id, reason } => {
            warn!(conn_id = %conn_id, reason = %reason, "malformed client frame");
            session.reject(&conn_id, reason);
        }
        SessionCommand::Status { reply } => {
            let counts = session.roster_counts();
            let status = SessionStatus {
                phase: session.phase(),
                racers: counts.racers,
                spectators: counts.spectators,
                ready: session.ready_count(),
                connections: hub.clients.len(),
                seed: session.seed(),
                remaining_ms: session.remaining_race_ms(now_ms),
            };
            let _ = reply.send(status);
        }
    }
}

fn flush(session: &mut RaceSession, hub: &mut ClientHub, now_ms: u64) {
    loop {
        let dispatches = session.drain_outbox();
        if dispatches.is_empty() {
            break;
        }
        let mut dropped = Vec::new();
        for dispatch in &dispatches {
            dropped.extend(hub.deliver(dispatch));
        }
        for conn_id in dropped {
            if hub.clients.remove(&conn_id).is_some() {
                warn!(conn_id = %conn_id, "client queue full, dropping connection");
                session.leave(&conn_id, now_ms);
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn elapsed_ms(clock: Instant) -> u64 {
    clock.elapsed().as_millis() as u64
}
