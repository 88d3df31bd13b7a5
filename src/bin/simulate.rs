use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use platform_race_server::config::RaceConfig;
use platform_race_server::physics::{solid_at, PredictInput, Predictor};
use platform_race_server::rng::Rng;
use platform_race_server::server_protocol::{MoveReport, ServerEvent};
use platform_race_server::session::RaceSession;
use platform_race_server::types::{FinishRecord, RaceEndReason, RacePhase};
use serde::Serialize;
use serde_json::{json, Value};

const STUCK_TICKS: u32 = 30;
const RANDOM_JUMP_CHANCE: f32 = 0.02;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs one headless race with predictor-driven bots")]
struct Cli {
    #[arg(long, default_value_t = 1)]
    seed: u32,
    #[arg(long, default_value_t = 4)]
    racers: usize,
    #[arg(long, default_value_t = 120)]
    max_seconds: u64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct RaceSummary {
    seed: u32,
    racers: usize,
    reason: Option<RaceEndReason>,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    ticks: u64,
    finishers: Vec<FinishRecord>,
    checkpoints: usize,
    stomps: usize,
    respawns: usize,
}

#[derive(Clone, Debug, Serialize)]
struct LogLine {
    #[serde(rename = "atMs")]
    at_ms: u64,
    tick: u64,
    event: String,
    details: Value,
}

struct Bot {
    id: String,
    predictor: Predictor,
    rng: Rng,
    best_x: f32,
    idle_ticks: u32,
}

impl Bot {
    fn decide(&mut self, session: &RaceSession) -> PredictInput {
        let body = self.predictor.body;
        let course = session.course();
        let config = session.config();

        if body.x > self.best_x + 1.0 {
            self.best_x = body.x;
            self.idle_ticks = 0;
        } else {
            self.idle_ticks += 1;
        }

        let probe_x = body.x + body.width + body.vx.max(1.0) * 6.0;
        let wall_ahead = solid_at(course, probe_x, body.y + body.height / 2.0);
        let pit_ahead = !solid_at(course, probe_x, config.ground_top() + 1.0)
            && body.y + body.height >= config.ground_top() - 1.0;
        let enemy_ahead = session.enemies().iter().any(|enemy| {
            enemy.active
                && enemy.body.x > body.x
                && enemy.body.x - (body.x + body.width) < 48.0
                && (enemy.body.y - body.y).abs() < body.height * 2.0
        });
        let stuck = self.idle_ticks > STUCK_TICKS;
        let wants_jump = wall_ahead
            || pit_ahead
            || enemy_ahead
            || stuck
            || self.rng.bool(RANDOM_JUMP_CHANCE);

        PredictInput {
            left: false,
            right: true,
            jump: (body.on_ground && wants_jump) || (self.predictor.jumping && body.vy < 0.0),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let (summary, lines) = run_race(cli.seed, cli.racers, cli.max_seconds);
    for line in &lines {
        match serde_json::to_string(line) {
            Ok(text) => println!("{text}"),
            Err(err) => tracing::error!(error = %err, "failed to serialize log line"),
        }
    }

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            tracing::error!(error = %err, path = %path.display(), "summary write failed");
            std::process::exit(2);
        }
    }
    if summary.reason.is_none() {
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run_race(seed: u32, racers: usize, max_seconds: u64) -> (RaceSummary, Vec<LogLine>) {
    let config = RaceConfig {
        race_duration_ms: max_seconds.max(1) * 1000,
        max_racers: racers.max(RaceConfig::default().max_racers),
        ..RaceConfig::default()
    };
    let tick_rate = u64::from(config.tick_rate.max(1));
    let mut session = RaceSession::new(config, seed);
    let mut lines = Vec::new();

    let ids: Vec<String> = (0..racers).map(|idx| format!("bot_{}", idx + 1)).collect();
    for (idx, id) in ids.iter().enumerate() {
        if let Err(err) = session.join(id, &format!("Bot-{:02}", idx + 1), 0) {
            tracing::warn!(bot = %id, error = %err, "bot could not join");
        }
    }
    for id in &ids {
        session.signal_ready(id, 0);
    }
    session.drain_outbox();

    let mut tick = 0u64;
    let mut summary = RaceSummary {
        seed,
        racers,
        reason: None,
        duration_ms: 0,
        ticks: 0,
        finishers: Vec::new(),
        checkpoints: 0,
        stomps: 0,
        respawns: 0,
    };
    let mut bots: Vec<Bot> = Vec::new();
    let race_span_ms = session.config().countdown_ms + session.config().race_duration_ms;
    let limit_ticks = race_span_ms * tick_rate / 1000 + 10;

    while tick < limit_ticks {
        tick += 1;
        let now_ms = tick * 1000 / tick_rate;
        session.poll_timers(now_ms);

        if session.phase() == RacePhase::Racing {
            if bots.is_empty() {
                bots = ids
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, id)| {
                        let participant = session.participant(id)?;
                        Some(Bot {
                            id: id.clone(),
                            predictor: Predictor::new(participant.body),
                            rng: Rng::new(seed ^ (idx as u32 + 1).wrapping_mul(0x9e37_79b9)),
                            best_x: participant.body.x,
                            idle_ticks: 0,
                        })
                    })
                    .collect();
            }
            session.tick_enemies(now_ms);
            for bot in &mut bots {
                let Some(participant) = session.participant(&bot.id) else {
                    continue;
                };
                if participant.finished {
                    continue;
                }
                bot.predictor.body = participant.body;
                let input = bot.decide(&session);
                bot.predictor.step(input, session.course(), session.config());
                let body = bot.predictor.body;
                let report = MoveReport {
                    x: body.x,
                    y: body.y,
                    vx: body.vx,
                    vy: body.vy,
                    on_ground: body.on_ground,
                };
                session.report_move(&bot.id, report, now_ms);
            }
        }

        for dispatch in session.drain_outbox() {
            record_event(&dispatch.event, tick, now_ms, &mut summary, &mut lines);
        }
        if summary.reason.is_some() {
            break;
        }
    }

    summary.ticks = tick;
    (summary, lines)
}

fn record_event(
    event: &ServerEvent,
    tick: u64,
    now_ms: u64,
    summary: &mut RaceSummary,
    lines: &mut Vec<LogLine>,
) {
    let (name, details) = match event {
        ServerEvent::CountdownStarted { duration_ms } => {
            ("countdown_started", json!({ "durationMs": duration_ms }))
        }
        ServerEvent::RaceStarted {
            seed,
            course,
            enemies,
            ..
        } => (
            "race_started",
            json!({ "seed": seed, "blocks": course.len(), "enemies": enemies.len() }),
        ),
        ServerEvent::CheckpointProgress {
            participant_id,
            checkpoint_id,
        } => {
            summary.checkpoints += 1;
            (
                "checkpoint_progress",
                json!({ "participantId": participant_id, "checkpointId": checkpoint_id }),
            )
        }
        ServerEvent::EnemyDefeated {
            enemy_id,
            participant_id,
        } => {
            summary.stomps += 1;
            (
                "enemy_defeated",
                json!({ "enemyId": enemy_id, "participantId": participant_id }),
            )
        }
        ServerEvent::ParticipantRespawned { .. } => {
            summary.respawns += 1;
            return;
        }
        ServerEvent::ParticipantFinished {
            participant_id,
            elapsed_ms,
            rank,
            ..
        } => (
            "participant_finished",
            json!({ "participantId": participant_id, "elapsedMs": elapsed_ms, "rank": rank }),
        ),
        ServerEvent::RaceEnded {
            reason, results, ..
        } => {
            summary.reason = Some(*reason);
            summary.finishers = results.clone();
            summary.duration_ms = now_ms;
            (
                "race_ended",
                json!({ "reason": reason, "finishers": results.len(), "respawns": summary.respawns }),
            )
        }
        _ => return,
    };
    lines.push(LogLine {
        at_ms: now_ms,
        tick,
        event: name.to_string(),
        details,
    });
}

fn write_summary(path: &Path, summary: &RaceSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
