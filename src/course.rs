use serde::Serialize;

use crate::config::RaceConfig;
use crate::constants::{
    CHECKPOINT_COUNT, GROUND_GAP_CHANCE, GROUND_GAP_MAX_BLOCKS, GROUND_GAP_MIN_BLOCKS,
    GROUND_MIN_RUN_BLOCKS, MAX_JUMP_RISE_BLOCKS, MAX_JUMP_SPAN_BLOCKS, PLATFORM_EDGE_MARGIN,
    PLATFORM_FIRST_X, PLATFORM_MAX_LIFT_BLOCKS, PLATFORM_MIN_LIFT_BLOCKS, PLATFORM_SPACING_MIN,
    PLATFORM_SPACING_SPREAD, PLATFORM_WIDTH_MIN, PLATFORM_WIDTH_SPREAD, SPAWN_SAFE_BLOCKS,
    SPIKE_CHANCE,
};
use crate::enemy::{roll_kind, Enemy};
use crate::error::CourseError;
use crate::physics::has_ground_beneath;
use crate::rng::Rng;
use crate::types::{BlockKind, Checkpoint, CourseBlock};

#[derive(Clone, Debug, PartialEq)]
pub struct PlatformSpan {
    pub x: f32,
    pub width: f32,
    pub top: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedCourse {
    pub course: Vec<CourseBlock>,
    pub checkpoints: Vec<Checkpoint>,
    pub enemies: Vec<Enemy>,
    #[serde(skip)]
    pub platforms: Vec<PlatformSpan>,
}

impl GeneratedCourse {
    pub fn goal(&self) -> Option<&CourseBlock> {
        self.course
            .iter()
            .find(|block| block.kind == BlockKind::Goal)
    }
}

pub fn generate_course(config: &RaceConfig, seed: u32) -> GeneratedCourse {
    let mut rng = Rng::new(seed);
    let block = config.block_size;
    let columns = (config.world_width / block).ceil() as usize;

    let checkpoints = place_checkpoints(config);
    let goal = goal_block(config);

    let mut solid = carve_ground_gaps(columns, &mut rng);
    protect_columns(&mut solid, block, 0.0, block * SPAWN_SAFE_BLOCKS as f32);
    for checkpoint in &checkpoints {
        protect_columns(
            &mut solid,
            block,
            checkpoint.x - block,
            checkpoint.x + checkpoint.width + block,
        );
    }
    protect_columns(&mut solid, block, goal.x - block * 2.0, config.world_width);

    let mut course = ground_blocks(&solid, config);
    let platforms = scatter_platforms(config, &mut rng);
    for platform in &platforms {
        let mut x = platform.x;
        while x < platform.x + platform.width {
            course.push(CourseBlock {
                x,
                y: platform.top,
                width: block,
                height: block,
                kind: BlockKind::Platform,
            });
            x += block;
        }
        if rng.bool(SPIKE_CHANCE) {
            course.push(CourseBlock {
                x: platform.x + platform.width / 2.0,
                y: platform.top - block,
                width: block,
                height: block,
                kind: BlockKind::Spike,
            });
        }
    }
    course.push(goal);

    let enemies = (0..config.enemy_count)
        .map(|index| {
            let kind = roll_kind(&mut rng);
            Enemy::spawn(format!("enemy_{}", index + 1), kind, &mut rng, &course, config)
        })
        .collect();

    GeneratedCourse {
        course,
        checkpoints,
        enemies,
        platforms,
    }
}

/// Checks the construction guarantees of a generated course. A failure here
/// means the generator constants or the config are wrong.
pub fn validate_course(generated: &GeneratedCourse, config: &RaceConfig) -> Result<(), CourseError> {
    let goals: Vec<&CourseBlock> = generated
        .course
        .iter()
        .filter(|block| block.kind == BlockKind::Goal)
        .collect();
    if goals.len() != 1 {
        return Err(CourseError::GoalCount(goals.len()));
    }

    if generated.checkpoints.len() != CHECKPOINT_COUNT as usize {
        return Err(CourseError::CheckpointCount {
            expected: CHECKPOINT_COUNT as usize,
            found: generated.checkpoints.len(),
        });
    }
    let mut previous: Option<&Checkpoint> = None;
    for (index, checkpoint) in generated.checkpoints.iter().enumerate() {
        let in_order = match previous {
            Some(prev) => checkpoint.id > prev.id && checkpoint.x > prev.x,
            None => checkpoint.id == 1,
        };
        if !in_order || checkpoint.id != index as u32 + 1 {
            return Err(CourseError::CheckpointOrder(checkpoint.id));
        }
        previous = Some(checkpoint);
    }

    let ground_top = config.ground_top();
    let course = &generated.course;
    if !has_ground_beneath(course, config.spawn_x, config.block_size, ground_top) {
        return Err(CourseError::MissingGround("spawn point".to_string()));
    }
    for checkpoint in &generated.checkpoints {
        if !has_ground_beneath(course, checkpoint.x, checkpoint.width, ground_top) {
            return Err(CourseError::MissingGround(format!(
                "checkpoint {}",
                checkpoint.id
            )));
        }
    }
    let goal = goals[0];
    if !has_ground_beneath(course, goal.x, goal.width, ground_top) {
        return Err(CourseError::MissingGround("goal".to_string()));
    }

    let max_rise = config.block_size * MAX_JUMP_RISE_BLOCKS + 0.01;
    let max_span = config.block_size * MAX_JUMP_SPAN_BLOCKS + 0.01;
    let mut reach_top = ground_top;
    let mut reach_end: Option<f32> = None;
    for platform in &generated.platforms {
        let too_high = reach_top - platform.top > max_rise;
        let too_far = reach_end.is_some_and(|end| platform.x - end > max_span);
        if too_high || too_far {
            return Err(CourseError::UnreachablePlatform { x: platform.x });
        }
        reach_top = platform.top;
        reach_end = Some(platform.x + platform.width);
    }

    Ok(())
}

pub fn place_checkpoints(config: &RaceConfig) -> Vec<Checkpoint> {
    let step = config.world_width / (CHECKPOINT_COUNT + 1) as f32;
    (1..=CHECKPOINT_COUNT)
        .map(|id| Checkpoint {
            id,
            x: step * id as f32,
            y: config.world_height - config.block_size * 4.0,
            width: config.block_size,
            height: config.block_size * 2.0,
        })
        .collect()
}

fn goal_block(config: &RaceConfig) -> CourseBlock {
    let size = config.block_size * 2.0;
    CourseBlock {
        x: config.world_width - size,
        y: config.world_height - config.block_size * 4.0,
        width: size,
        height: size,
        kind: BlockKind::Goal,
    }
}

// Per-column floor pattern: gaps of a few columns, each followed by a
// minimum solid run.
fn carve_ground_gaps(columns: usize, rng: &mut Rng) -> Vec<bool> {
    let mut solid = vec![true; columns];
    let mut run = 0;
    let mut column = 0;
    while column < columns {
        if run >= GROUND_MIN_RUN_BLOCKS && rng.bool(GROUND_GAP_CHANCE) {
            let width = rng.int(GROUND_GAP_MIN_BLOCKS, GROUND_GAP_MAX_BLOCKS) as usize;
            let end = (column + width).min(columns);
            for cell in &mut solid[column..end] {
                *cell = false;
            }
            column = end;
            run = 0;
        } else {
            run += 1;
            column += 1;
        }
    }
    solid
}

fn protect_columns(solid: &mut [bool], block: f32, from: f32, to: f32) {
    if solid.is_empty() {
        return;
    }
    let first = (from / block).floor().max(0.0) as usize;
    let last = ((to / block).ceil().max(0.0) as usize).min(solid.len());
    for cell in solid.iter_mut().take(last).skip(first) {
        *cell = true;
    }
}

fn ground_blocks(solid: &[bool], config: &RaceConfig) -> Vec<CourseBlock> {
    let block = config.block_size;
    let ground_top = config.ground_top();
    let mut course = Vec::new();
    for row in 0..2 {
        for (column, _) in solid.iter().enumerate().filter(|(_, is_solid)| **is_solid) {
            course.push(CourseBlock {
                x: column as f32 * block,
                y: ground_top + block * row as f32,
                width: block,
                height: block,
                kind: BlockKind::Ground,
            });
        }
    }
    course
}

/// Platforms left to right. Each top stays within one jump of the previous
/// platform top and each start within one jump span of the previous end.
fn scatter_platforms(config: &RaceConfig, rng: &mut Rng) -> Vec<PlatformSpan> {
    let block = config.block_size;
    let ground_top = config.ground_top();
    let max_rise = block * MAX_JUMP_RISE_BLOCKS;
    let max_span = block * MAX_JUMP_SPAN_BLOCKS;
    let limit = config.world_width - PLATFORM_EDGE_MARGIN;

    let mut platforms = Vec::new();
    let mut x = PLATFORM_FIRST_X;
    let mut reach_top = ground_top;
    while x < limit {
        let planned_width = rng.spread(PLATFORM_WIDTH_MIN, PLATFORM_WIDTH_SPREAD);
        let lift = block * rng.int(PLATFORM_MIN_LIFT_BLOCKS, PLATFORM_MAX_LIFT_BLOCKS) as f32;
        let top = (ground_top - lift).max(reach_top - max_rise);
        let width = (planned_width / block).ceil() * block;
        platforms.push(PlatformSpan { x, width, top });

        reach_top = top;
        let planned_end = x + planned_width;
        let spacing = rng.spread(PLATFORM_SPACING_MIN, PLATFORM_SPACING_SPREAD);
        x = (x + spacing)
            .max(planned_end + block)
            .min(x + width + max_span);
    }
    platforms
}
