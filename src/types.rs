use serde::Serialize;

use crate::physics::{Aabb, Body};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Ground,
    Platform,
    Spike,
    Goal,
}

impl BlockKind {
    // Ground and platforms stop movement. Goals are triggers and spikes are
    // decoration.
    pub fn is_solid(self) -> bool {
        matches!(self, Self::Ground | Self::Platform)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CourseBlock {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(rename = "type")]
    pub kind: BlockKind,
}

impl CourseBlock {
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Checkpoint {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Checkpoint {
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Racer,
    Spectator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    Lobby,
    Countdown,
    Racing,
    Finished,
}

impl RacePhase {
    pub fn can_transition_to(self, next: RacePhase) -> bool {
        matches!(
            (self, next),
            (Self::Lobby, Self::Countdown)
                | (Self::Countdown, Self::Racing)
                | (Self::Racing, Self::Finished)
                | (Self::Finished, Self::Lobby)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RaceEndReason {
    AllFinished,
    TimeUp,
    NotEnoughRacers,
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(flatten)]
    pub body: Body,
    pub finished: bool,
    #[serde(rename = "finishTimeMs")]
    pub finish_time_ms: Option<u64>,
    #[serde(rename = "currentCheckpoint")]
    pub current_checkpoint: u32,
    pub color: String,
}

impl Participant {
    pub fn is_racer(&self) -> bool {
        self.role == Role::Racer
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FinishRecord {
    #[serde(rename = "participantId")]
    pub participant_id: String,
    pub name: String,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub rank: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RosterCounts {
    pub total: usize,
    pub racers: usize,
    pub spectators: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ground_and_platform_are_solid() {
        assert!(BlockKind::Ground.is_solid());
        assert!(BlockKind::Platform.is_solid());
        assert!(!BlockKind::Spike.is_solid());
        assert!(!BlockKind::Goal.is_solid());
    }

    #[test]
    fn phases_only_move_forward() {
        use RacePhase::*;
        let all = [Lobby, Countdown, Racing, Finished];
        let allowed = [
            (Lobby, Countdown),
            (Countdown, Racing),
            (Racing, Finished),
            (Finished, Lobby),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn participant_serializes_flat_body_fields() {
        let participant = Participant {
            id: "conn_1".to_string(),
            name: "A".to_string(),
            role: Role::Racer,
            body: Body::new(50.0, 504.0, 32.0, 32.0),
            finished: false,
            finish_time_ms: None,
            current_checkpoint: 0,
            color: "hsl(10, 70%, 50%)".to_string(),
        };
        let value = serde_json::to_value(&participant).expect("participant should serialize");
        assert_eq!(value["x"], 50.0);
        assert_eq!(value["onGround"], false);
        assert_eq!(value["currentCheckpoint"], 0);
        assert_eq!(value["role"], "racer");
    }
}
