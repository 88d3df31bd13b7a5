use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::RaceConfig;
use crate::enemy::Enemy;
use crate::types::{
    Checkpoint, CourseBlock, FinishRecord, Participant, RaceEndReason, RacePhase, Role,
    RosterCounts,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveReport {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub on_ground: bool,
}

impl MoveReport {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.vx.is_finite() && self.vy.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientCommand {
    Join { name: String },
    Spectate,
    SignalReady,
    ReportMove(MoveReport),
    SendChat { text: String },
}

pub fn parse_client_message(raw: &str) -> Option<ClientCommand> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "join" => {
            let name = match object.get("name") {
                None | Some(Value::Null) => String::new(),
                Some(value) => value.as_str()?.to_string(),
            };
            Some(ClientCommand::Join { name })
        }
        "spectate" => Some(ClientCommand::Spectate),
        "signal-ready" => Some(ClientCommand::SignalReady),
        "report-move" => {
            let report = MoveReport {
                x: parse_finite(object, "x")?,
                y: parse_finite(object, "y")?,
                vx: parse_finite(object, "vx")?,
                vy: parse_finite(object, "vy")?,
                on_ground: match object.get("onGround") {
                    None => false,
                    Some(value) => value.as_bool()?,
                },
            };
            Some(ClientCommand::ReportMove(report))
        }
        "send-chat" => {
            let text = object.get("text")?.as_str()?.to_string();
            Some(ClientCommand::SendChat { text })
        }
        _ => None,
    }
}

fn parse_finite(object: &Map<String, Value>, key: &str) -> Option<f32> {
    let number = object.get(key)?.as_f64()?;
    let narrowed = number as f32;
    if !narrowed.is_finite() {
        return None;
    }
    Some(narrowed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    Joined {
        #[serde(rename = "participantId")]
        participant_id: String,
        role: Role,
        config: RaceConfig,
        phase: RacePhase,
        participants: Vec<Participant>,
        course: Vec<CourseBlock>,
        checkpoints: Vec<Checkpoint>,
        enemies: Vec<Enemy>,
        #[serde(rename = "remainingMs")]
        remaining_ms: Option<u64>,
    },
    ParticipantJoined {
        participant: Participant,
    },
    ParticipantLeft {
        #[serde(rename = "participantId")]
        participant_id: String,
    },
    ParticipantCorrected {
        #[serde(rename = "participantId")]
        participant_id: String,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
        #[serde(rename = "onGround")]
        on_ground: bool,
    },
    EnemyTick {
        enemies: Vec<Enemy>,
    },
    EnemyDefeated {
        #[serde(rename = "enemyId")]
        enemy_id: String,
        #[serde(rename = "participantId")]
        participant_id: String,
    },
    ParticipantRespawned {
        #[serde(rename = "participantId")]
        participant_id: String,
        x: f32,
        y: f32,
    },
    CheckpointProgress {
        #[serde(rename = "participantId")]
        participant_id: String,
        #[serde(rename = "checkpointId")]
        checkpoint_id: u32,
    },
    ParticipantFinished {
        #[serde(rename = "participantId")]
        participant_id: String,
        name: String,
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
        rank: u32,
    },
    CountdownStarted {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    RaceStarted {
        seed: u32,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        course: Vec<CourseBlock>,
        checkpoints: Vec<Checkpoint>,
        enemies: Vec<Enemy>,
        participants: Vec<Participant>,
    },
    RaceEnded {
        reason: RaceEndReason,
        results: Vec<FinishRecord>,
        unfinished: Vec<Participant>,
        participants: Vec<Participant>,
    },
    ChatBroadcast {
        #[serde(rename = "participantId")]
        participant_id: String,
        name: String,
        text: String,
        #[serde(rename = "atMs")]
        at_ms: u64,
    },
    RosterCounts(RosterCounts),
    Rejected {
        reason: String,
    },
}

impl ServerEvent {
    // Per-tick state is replaced by the next tick, so a full queue just skips it.
    pub fn queue_policy(&self) -> QueuePolicy {
        match self {
            Self::EnemyTick { .. } | Self::ParticipantCorrected { .. } => QueuePolicy::DropOnFull,
            _ => QueuePolicy::DisconnectOnFull,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_join_message() {
        let parsed = parse_client_message(r#"{"type":"join","name":"Mario"}"#)
            .expect("join message should parse");
        assert_eq!(
            parsed,
            ClientCommand::Join {
                name: "Mario".to_string()
            }
        );

        let parsed =
            parse_client_message(r#"{"type":"join"}"#).expect("nameless join should parse");
        assert_eq!(
            parsed,
            ClientCommand::Join {
                name: String::new()
            }
        );
        assert!(parse_client_message(r#"{"type":"join","name":7}"#).is_none());
    }

    #[test]
    fn parse_report_move_message() {
        let parsed = parse_client_message(
            r#"{"type":"report-move","x":120.5,"y":504,"vx":4,"vy":0,"onGround":true}"#,
        )
        .expect("move message should parse");
        assert_eq!(
            parsed,
            ClientCommand::ReportMove(MoveReport {
                x: 120.5,
                y: 504.0,
                vx: 4.0,
                vy: 0.0,
                on_ground: true,
            })
        );
    }

    #[test]
    fn report_move_rejects_missing_or_oversized_numbers() {
        assert!(parse_client_message(r#"{"type":"report-move","x":1,"y":2,"vx":3}"#).is_none());
        assert!(parse_client_message(
            r#"{"type":"report-move","x":1e300,"y":2,"vx":3,"vy":4}"#
        )
        .is_none());
        assert!(parse_client_message(
            r#"{"type":"report-move","x":"1","y":2,"vx":3,"vy":4}"#
        )
        .is_none());
        assert!(parse_client_message(
            r#"{"type":"report-move","x":1,"y":2,"vx":3,"vy":4,"onGround":"yes"}"#
        )
        .is_none());
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(
            parse_client_message(r#"{"type":"spectate"}"#),
            Some(ClientCommand::Spectate)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"signal-ready"}"#),
            Some(ClientCommand::SignalReady)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"send-chat","text":"gg"}"#),
            Some(ClientCommand::SendChat {
                text: "gg".to_string()
            })
        );
    }

    #[test]
    fn unknown_or_malformed_messages_are_rejected() {
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message("[1,2]").is_none());
        assert!(parse_client_message(r#"{"type":"teleport"}"#).is_none());
        assert!(parse_client_message(r#"{"name":"x"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"send-chat"}"#).is_none());
    }

    #[test]
    fn events_serialize_with_kebab_case_type_tags() {
        let value = serde_json::to_value(ServerEvent::CheckpointProgress {
            participant_id: "conn_1".to_string(),
            checkpoint_id: 2,
        })
        .expect("event should serialize");
        assert_eq!(value["type"], "checkpoint-progress");
        assert_eq!(value["participantId"], "conn_1");
        assert_eq!(value["checkpointId"], 2);

        let value = serde_json::to_value(ServerEvent::RosterCounts(RosterCounts {
            total: 3,
            racers: 2,
            spectators: 1,
        }))
        .expect("event should serialize");
        assert_eq!(value["type"], "roster-counts");
        assert_eq!(value["racers"], 2);

        let value = serde_json::to_value(ServerEvent::RaceEnded {
            reason: RaceEndReason::NotEnoughRacers,
            results: Vec::new(),
            unfinished: Vec::new(),
            participants: Vec::new(),
        })
        .expect("event should serialize");
        assert_eq!(value["type"], "race-ended");
        assert_eq!(value["reason"], "not-enough-racers");
    }

    #[test]
    fn only_per_tick_events_may_be_dropped() {
        let tick = ServerEvent::EnemyTick {
            enemies: Vec::new(),
        };
        assert_eq!(tick.queue_policy(), QueuePolicy::DropOnFull);
        let rejected = ServerEvent::Rejected {
            reason: "full".to_string(),
        };
        assert_eq!(rejected.queue_policy(), QueuePolicy::DisconnectOnFull);
    }
}
