use std::time::Duration;

use serde::Serialize;

use crate::constants::{
    ACCELERATION, AIR_CONTROL, BLOCK_SIZE, COUNTDOWN_MS, ENEMY_BATCH_SIZE, FRICTION, GRAVITY,
    JUMP_FORCE, JUMP_RELEASE_CAP, MAX_RACERS, MAX_SPEED, MIN_READY_RACERS,
    PLATFORM_MAX_LIFT_BLOCKS, RACE_DURATION_MS, SPAWN_SAFE_BLOCKS, SPAWN_X, STOMP_BOUNCE,
    TICK_RATE, WORLD_HEIGHT, WORLD_WIDTH,
};
use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PhysicsTuning {
    pub gravity: f32,
    #[serde(rename = "jumpForce")]
    pub jump_force: f32,
    #[serde(rename = "jumpReleaseCap")]
    pub jump_release_cap: f32,
    pub acceleration: f32,
    #[serde(rename = "maxSpeed")]
    pub max_speed: f32,
    pub friction: f32,
    #[serde(rename = "airControl")]
    pub air_control: f32,
    #[serde(rename = "stompBounce")]
    pub stomp_bounce: f32,
}

impl Default for PhysicsTuning {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            jump_force: JUMP_FORCE,
            jump_release_cap: JUMP_RELEASE_CAP,
            acceleration: ACCELERATION,
            max_speed: MAX_SPEED,
            friction: FRICTION,
            air_control: AIR_CONTROL,
            stomp_bounce: STOMP_BOUNCE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RaceConfig {
    #[serde(rename = "worldWidth")]
    pub world_width: f32,
    #[serde(rename = "worldHeight")]
    pub world_height: f32,
    #[serde(rename = "blockSize")]
    pub block_size: f32,
    #[serde(rename = "raceDurationMs")]
    pub race_duration_ms: u64,
    #[serde(rename = "countdownMs")]
    pub countdown_ms: u64,
    #[serde(rename = "maxRacers")]
    pub max_racers: usize,
    #[serde(rename = "minReadyRacers")]
    pub min_ready_racers: usize,
    #[serde(rename = "tickRate")]
    pub tick_rate: u32,
    #[serde(rename = "enemyCount")]
    pub enemy_count: usize,
    #[serde(rename = "falloutMargin")]
    pub fallout_margin: f32,
    #[serde(rename = "spawnX")]
    pub spawn_x: f32,
    pub physics: PhysicsTuning,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            block_size: BLOCK_SIZE,
            race_duration_ms: RACE_DURATION_MS,
            countdown_ms: COUNTDOWN_MS,
            max_racers: MAX_RACERS,
            min_ready_racers: MIN_READY_RACERS,
            tick_rate: TICK_RATE,
            enemy_count: ENEMY_BATCH_SIZE,
            fallout_margin: BLOCK_SIZE,
            spawn_x: SPAWN_X,
            physics: PhysicsTuning::default(),
        }
    }
}

impl RaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.block_size.is_finite() || self.block_size <= 0.0 {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        // Spawn zone, three checkpoint quarters and the goal must not collide,
        // and the floor band plus the highest platform must fit vertically.
        let min_width = self.block_size * (SPAWN_SAFE_BLOCKS as f32 * 4.0);
        let min_height = self.block_size * (PLATFORM_MAX_LIFT_BLOCKS as f32 + 4.0);
        if !self.world_width.is_finite()
            || !self.world_height.is_finite()
            || self.world_width < min_width
            || self.world_height < min_height
        {
            return Err(ConfigError::WorldTooSmall {
                width: self.world_width,
                height: self.world_height,
                block_size: self.block_size,
            });
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::TickRate);
        }
        if self.min_ready_racers < 2 {
            return Err(ConfigError::Quorum(self.min_ready_racers));
        }
        if self.max_racers < self.min_ready_racers {
            return Err(ConfigError::Capacity {
                capacity: self.max_racers,
                quorum: self.min_ready_racers,
            });
        }
        if self.race_duration_ms == 0 {
            return Err(ConfigError::RaceDuration);
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn ground_top(&self) -> f32 {
        self.world_height - self.block_size * 2.0
    }

    pub fn spawn_point(&self) -> (f32, f32) {
        (self.spawn_x, self.world_height - self.block_size * 3.0)
    }

    pub fn fallout_line(&self) -> f32 {
        self.world_height + self.fallout_margin
    }
}
