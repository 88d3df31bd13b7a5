use serde::Serialize;

use crate::config::RaceConfig;
use crate::types::CourseBlock;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Aabb {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    pub fn contains_point(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Body {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub width: f32,
    pub height: f32,
    #[serde(rename = "onGround")]
    pub on_ground: bool,
}

impl Body {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            width,
            height,
            on_ground: false,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.x, self.y, self.width, self.height)
    }

    pub fn place(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.vx = 0.0;
        self.vy = 0.0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axes {
    Both,
    VerticalOnly,
}

// Resolves `body` against every solid block, in course order. Per
// overlapping block: land on it when falling from above, bump its underside
// when rising from below, otherwise stop at the near edge in the direction
// of travel. `previous_top` is the body's top before this step's movement.
pub fn resolve_solids(body: &mut Body, previous_top: f32, course: &[CourseBlock]) {
    resolve(body, previous_top, course, Axes::Both);
}

pub fn settle_on_solids(body: &mut Body, previous_top: f32, course: &[CourseBlock]) {
    resolve(body, previous_top, course, Axes::VerticalOnly);
}

fn resolve(body: &mut Body, previous_top: f32, course: &[CourseBlock], axes: Axes) {
    body.on_ground = false;
    for block in course.iter().filter(|block| block.kind.is_solid()) {
        let solid = block.aabb();
        if !body.aabb().overlaps(&solid) {
            continue;
        }
        if body.vy > 0.0 && previous_top < solid.y {
            body.y = solid.y - body.height;
            body.vy = 0.0;
            body.on_ground = true;
        } else if body.vy < 0.0 && previous_top > solid.y {
            body.y = solid.bottom();
            body.vy = 0.0;
        } else if axes == Axes::Both {
            if body.vx > 0.0 {
                body.x = solid.x - body.width;
                body.vx = 0.0;
            } else if body.vx < 0.0 {
                body.x = solid.right();
                body.vx = 0.0;
            }
        }
    }
}

pub fn clamp_to_world(body: &mut Body, world_width: f32) {
    body.x = body.x.clamp(0.0, (world_width - body.width).max(0.0));
}

pub fn has_fallen_out(body: &Body, config: &RaceConfig) -> bool {
    body.y > config.fallout_line()
}

pub fn solid_at(course: &[CourseBlock], px: f32, py: f32) -> bool {
    course
        .iter()
        .any(|block| block.kind.is_solid() && block.aabb().contains_point(px, py))
}

pub fn is_supported(body: &Body, course: &[CourseBlock]) -> bool {
    let feet = body.y + body.height + 0.5;
    solid_at(course, body.x + 1.0, feet) || solid_at(course, body.x + body.width - 1.0, feet)
}

pub fn has_ground_beneath(course: &[CourseBlock], x: f32, width: f32, ground_top: f32) -> bool {
    let probe_y = ground_top + 1.0;
    solid_at(course, x + 1.0, probe_y) && solid_at(course, (x + width - 1.0).max(x), probe_y)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PredictInput {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Predictor {
    pub body: Body,
    pub jumping: bool,
}

impl Predictor {
    pub fn new(body: Body) -> Self {
        Self {
            body,
            jumping: false,
        }
    }

    pub fn step(&mut self, input: PredictInput, course: &[CourseBlock], config: &RaceConfig) {
        let tuning = &config.physics;
        let body = &mut self.body;
        let control = if body.on_ground {
            1.0
        } else {
            tuning.air_control
        };

        if input.left {
            body.vx -= tuning.acceleration * control;
        }
        if input.right {
            body.vx += tuning.acceleration * control;
        }
        if !input.left && !input.right {
            body.vx *= tuning.friction;
        }
        body.vx = body.vx.clamp(-tuning.max_speed, tuning.max_speed);

        if input.jump {
            if body.on_ground && !self.jumping {
                body.vy = tuning.jump_force;
                self.jumping = true;
                body.on_ground = false;
            }
        } else if self.jumping && body.vy < tuning.jump_release_cap {
            body.vy = tuning.jump_release_cap;
        }

        if !body.on_ground {
            body.vy += tuning.gravity;
        }

        let previous_top = body.y;
        body.x += body.vx;
        body.y += body.vy;

        resolve_solids(body, previous_top, course);
        if body.on_ground {
            self.jumping = false;
        }
        clamp_to_world(body, config.world_width);
    }
}
