use std::f32::consts::TAU;

use serde::Serialize;

use crate::config::RaceConfig;
use crate::constants::{
    AERIAL_AMPLITUDE, AERIAL_MAX_ALTITUDE_BLOCKS, AERIAL_MIN_ALTITUDE_BLOCKS, AERIAL_PHASE_STEP,
    ENEMY_JUMP_COOLDOWN_MAX, ENEMY_JUMP_COOLDOWN_MIN, ENEMY_JUMP_IMPULSE, ENEMY_MIN_X,
    ENEMY_SPEED_MIN, ENEMY_SPEED_SPREAD,
};
use crate::physics::{
    has_fallen_out, has_ground_beneath, is_supported, settle_on_solids, solid_at, Body,
};
use crate::rng::Rng;
use crate::types::CourseBlock;

const GROUND_SPAWN_ATTEMPTS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnemyKind {
    GroundPatrol,
    JumpingPatrol,
    AerialDrifter,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Behavior {
    GroundPatrol,
    JumpingPatrol {
        #[serde(rename = "jumpCooldown")]
        jump_cooldown: i32,
    },
    AerialDrifter {
        phase: f32,
        #[serde(rename = "baselineY")]
        baseline_y: f32,
    },
}

impl Behavior {
    pub fn fresh(kind: EnemyKind, baseline_y: f32, rng: &mut Rng) -> Self {
        match kind {
            EnemyKind::GroundPatrol => Self::GroundPatrol,
            EnemyKind::JumpingPatrol => Self::JumpingPatrol {
                jump_cooldown: rng.int(ENEMY_JUMP_COOLDOWN_MIN, ENEMY_JUMP_COOLDOWN_MAX),
            },
            EnemyKind::AerialDrifter => Self::AerialDrifter {
                phase: rng.spread(0.0, TAU),
                baseline_y,
            },
        }
    }

    pub fn kind(&self) -> EnemyKind {
        match self {
            Self::GroundPatrol => EnemyKind::GroundPatrol,
            Self::JumpingPatrol { .. } => EnemyKind::JumpingPatrol,
            Self::AerialDrifter { .. } => EnemyKind::AerialDrifter,
        }
    }
}

// aerial-drifter 20%, jumping-patrol 40%, ground-patrol 40%.
pub fn roll_kind(rng: &mut Rng) -> EnemyKind {
    let roll = rng.next_f32();
    if roll < 0.2 {
        EnemyKind::AerialDrifter
    } else if roll < 0.6 {
        EnemyKind::JumpingPatrol
    } else {
        EnemyKind::GroundPatrol
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Enemy {
    pub id: String,
    #[serde(flatten)]
    pub body: Body,
    #[serde(flatten)]
    pub behavior: Behavior,
    pub active: bool,
    #[serde(rename = "mutatedFrom")]
    pub mutated_from: Option<EnemyKind>,
}

impl Enemy {
    pub fn spawn(
        id: String,
        kind: EnemyKind,
        rng: &mut Rng,
        course: &[CourseBlock],
        config: &RaceConfig,
    ) -> Self {
        let size = config.block_size;
        let mut enemy = Self {
            id,
            body: Body::new(0.0, 0.0, size, size),
            behavior: Behavior::GroundPatrol,
            active: true,
            mutated_from: None,
        };
        enemy.reinitialize(kind, rng, course, config);
        enemy
    }

    pub fn kind(&self) -> EnemyKind {
        self.behavior.kind()
    }

    pub fn advance(&mut self, course: &[CourseBlock], config: &RaceConfig, rng: &mut Rng) {
        // Defeated enemies stay where they were stomped.
        if !self.active {
            return;
        }
        match self.behavior {
            Behavior::GroundPatrol => self.patrol(course, config),
            Behavior::JumpingPatrol { .. } => self.hop(course, config, rng),
            Behavior::AerialDrifter { .. } => self.drift(course, config, rng),
        }

        if has_fallen_out(&self.body, config) {
            self.respawn(rng, course, config);
        }
    }

    pub fn respawn(&mut self, rng: &mut Rng, course: &[CourseBlock], config: &RaceConfig) {
        let kind = roll_kind(rng);
        self.reinitialize(kind, rng, course, config);
        self.active = true;
        self.mutated_from = None;
    }

    pub fn mutate_into_walker(
        &mut self,
        rng: &mut Rng,
        course: &[CourseBlock],
        config: &RaceConfig,
    ) {
        let origin = self.kind();
        let kind = if rng.bool(0.5) {
            EnemyKind::GroundPatrol
        } else {
            EnemyKind::JumpingPatrol
        };
        self.reinitialize(kind, rng, course, config);
        self.mutated_from = Some(origin);
    }

    fn reinitialize(
        &mut self,
        kind: EnemyKind,
        rng: &mut Rng,
        course: &[CourseBlock],
        config: &RaceConfig,
    ) {
        let (x, y) = spawn_position(kind, rng, course, config);
        self.body.place(x, y);
        self.body.on_ground = false;
        self.body.vx = rng.sign() * rng.spread(ENEMY_SPEED_MIN, ENEMY_SPEED_SPREAD);
        self.behavior = Behavior::fresh(kind, y, rng);
    }

    fn patrol(&mut self, course: &[CourseBlock], config: &RaceConfig) {
        let previous_top = self.body.y;
        self.body.x += self.body.vx;
        bounce_off_world_edges(&mut self.body, config.world_width);
        self.fall_and_settle(previous_top, course, config);
    }

    fn hop(&mut self, course: &[CourseBlock], config: &RaceConfig, rng: &mut Rng) {
        let previous_top = self.body.y;
        if self.body.on_ground {
            let lead_x = if self.body.vx >= 0.0 {
                self.body.x + self.body.width + self.body.vx
            } else {
                self.body.x + self.body.vx
            };
            let at_edge = lead_x <= 0.0 || lead_x >= config.world_width;
            let floor_ahead = solid_at(course, lead_x, self.body.y + self.body.height + 1.0);
            if at_edge || !floor_ahead {
                self.body.vx = -self.body.vx;
            }

            if let Behavior::JumpingPatrol { jump_cooldown } = &mut self.behavior {
                *jump_cooldown -= 1;
                if *jump_cooldown <= 0 {
                    self.body.vy = ENEMY_JUMP_IMPULSE;
                    self.body.on_ground = false;
                    *jump_cooldown = rng.int(ENEMY_JUMP_COOLDOWN_MIN, ENEMY_JUMP_COOLDOWN_MAX);
                }
            }
        }

        self.body.x += self.body.vx;
        bounce_off_world_edges(&mut self.body, config.world_width);
        self.fall_and_settle(previous_top, course, config);
    }

    fn drift(&mut self, course: &[CourseBlock], config: &RaceConfig, rng: &mut Rng) {
        let Behavior::AerialDrifter { phase, baseline_y } = &mut self.behavior else {
            return;
        };
        *phase += AERIAL_PHASE_STEP;
        self.body.x += self.body.vx;
        self.body.y = *baseline_y + phase.sin() * AERIAL_AMPLITUDE;
        self.body.vy = 0.0;

        if self.body.x < 0.0 || self.body.x > config.world_width - self.body.width {
            self.mutate_into_walker(rng, course, config);
        }
    }

    fn fall_and_settle(&mut self, previous_top: f32, course: &[CourseBlock], config: &RaceConfig) {
        if !self.body.on_ground {
            self.body.vy += config.physics.gravity;
        }
        self.body.y += self.body.vy;
        settle_on_solids(&mut self.body, previous_top, course);
        if !self.body.on_ground && self.body.vy >= 0.0 && is_supported(&self.body, course) {
            self.body.vy = 0.0;
            self.body.on_ground = true;
        }
    }
}

fn bounce_off_world_edges(body: &mut Body, world_width: f32) {
    let max_x = world_width - body.width;
    if body.x <= 0.0 {
        body.x = 0.0;
        body.vx = body.vx.abs();
    } else if body.x >= max_x {
        body.x = max_x;
        body.vx = -body.vx.abs();
    }
}

fn spawn_position(
    kind: EnemyKind,
    rng: &mut Rng,
    course: &[CourseBlock],
    config: &RaceConfig,
) -> (f32, f32) {
    let size = config.block_size;
    let min_x = ENEMY_MIN_X.min(config.world_width / 4.0);
    let max_x = config.world_width - min_x - size;
    let ground_top = config.ground_top();

    match kind {
        EnemyKind::AerialDrifter => {
            let altitude = rng.int(AERIAL_MIN_ALTITUDE_BLOCKS, AERIAL_MAX_ALTITUDE_BLOCKS);
            (
                rng.spread(min_x, max_x - min_x),
                ground_top - size * altitude as f32,
            )
        }
        EnemyKind::GroundPatrol | EnemyKind::JumpingPatrol => {
            let mut x = rng.spread(min_x, max_x - min_x);
            for _ in 0..GROUND_SPAWN_ATTEMPTS {
                if has_ground_beneath(course, x, size, ground_top) {
                    break;
                }
                x = rng.spread(min_x, max_x - min_x);
            }
            (x, ground_top - size)
        }
    }
}
