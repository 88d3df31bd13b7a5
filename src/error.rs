use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("block size must be positive, got {0}")]
    BlockSize(f32),
    #[error("world {width}x{height} is too small for a course of {block_size}px blocks")]
    WorldTooSmall {
        width: f32,
        height: f32,
        block_size: f32,
    },
    #[error("tick rate must be positive")]
    TickRate,
    #[error("racer capacity {capacity} is below the ready quorum {quorum}")]
    Capacity { capacity: usize, quorum: usize },
    #[error("ready quorum must be at least 2, got {0}")]
    Quorum(usize),
    #[error("race duration must be positive")]
    RaceDuration,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum CourseError {
    #[error("expected exactly one goal block, found {0}")]
    GoalCount(usize),
    #[error("expected {expected} checkpoints, found {found}")]
    CheckpointCount { expected: usize, found: usize },
    #[error("checkpoint ids or positions are not strictly increasing at id {0}")]
    CheckpointOrder(u32),
    #[error("no solid ground beneath the {0}")]
    MissingGround(String),
    #[error("platform at x={x} is out of single-jump reach")]
    UnreachablePlatform { x: f32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("the race is full ({capacity} racers)")]
    RaceFull { capacity: usize },
    #[error("this connection has already joined")]
    AlreadyJoined,
}
