pub const WORLD_WIDTH: f32 = 3200.0;
pub const WORLD_HEIGHT: f32 = 600.0;
pub const BLOCK_SIZE: f32 = 32.0;

pub const RACE_DURATION_MS: u64 = 300_000;
pub const COUNTDOWN_MS: u64 = 3_000;
pub const MAX_RACERS: usize = 8;
pub const MIN_READY_RACERS: usize = 2;

pub const TICK_RATE: u32 = 60;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const SPAWN_X: f32 = 50.0;

pub const CHECKPOINT_COUNT: u32 = 3;
pub const ENEMY_BATCH_SIZE: usize = 10;

pub const GRAVITY: f32 = 0.6;
pub const JUMP_FORCE: f32 = -15.0;
pub const JUMP_RELEASE_CAP: f32 = -6.0;
pub const ACCELERATION: f32 = 0.5;
pub const MAX_SPEED: f32 = 4.0;
pub const FRICTION: f32 = 0.8;
pub const AIR_CONTROL: f32 = 0.5;
pub const STOMP_BOUNCE: f32 = -8.0;

// Generator tuning, in pixels unless the name says blocks.
pub const PLATFORM_FIRST_X: f32 = 200.0;
pub const PLATFORM_EDGE_MARGIN: f32 = 200.0;
pub const PLATFORM_SPACING_MIN: f32 = 150.0;
pub const PLATFORM_SPACING_SPREAD: f32 = 200.0;
pub const PLATFORM_WIDTH_MIN: f32 = 60.0;
pub const PLATFORM_WIDTH_SPREAD: f32 = 120.0;
pub const PLATFORM_MIN_LIFT_BLOCKS: i32 = 3;
pub const PLATFORM_MAX_LIFT_BLOCKS: i32 = 9;
pub const MAX_JUMP_RISE_BLOCKS: f32 = 4.0;
pub const MAX_JUMP_SPAN_BLOCKS: f32 = 5.0;
pub const SPIKE_CHANCE: f32 = 0.3;
pub const GROUND_GAP_CHANCE: f32 = 0.08;
pub const GROUND_GAP_MIN_BLOCKS: i32 = 2;
pub const GROUND_GAP_MAX_BLOCKS: i32 = 3;
pub const GROUND_MIN_RUN_BLOCKS: usize = 4;
pub const SPAWN_SAFE_BLOCKS: usize = 6;
pub const ENEMY_MIN_X: f32 = 300.0;

// Enemy tuning, per tick.
pub const ENEMY_SPEED_MIN: f32 = 0.5;
pub const ENEMY_SPEED_SPREAD: f32 = 1.0;
pub const ENEMY_JUMP_IMPULSE: f32 = -10.0;
pub const ENEMY_JUMP_COOLDOWN_MIN: i32 = 60;
pub const ENEMY_JUMP_COOLDOWN_MAX: i32 = 150;
pub const AERIAL_AMPLITUDE: f32 = 24.0;
pub const AERIAL_PHASE_STEP: f32 = 0.05;
pub const AERIAL_MIN_ALTITUDE_BLOCKS: i32 = 5;
pub const AERIAL_MAX_ALTITUDE_BLOCKS: i32 = 9;

pub const CHAT_MAX_CHARS: usize = 200;
pub const NAME_MAX_CHARS: usize = 15;

// Largest per-axis gap between a reported move and the server result that
// the originating client is left to predict on its own.
pub const CORRECTION_TOLERANCE: f32 = 0.5;

pub const DEFAULT_RACER_NAME: &str = "Racer";
pub const SPECTATOR_NAME: &str = "Spectator";
