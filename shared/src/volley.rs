//! Volleyball ("slimevolley") entity model and physics
//!
//! Constants are expressed per reference frame at 60 ticks per second and every
//! update scales them by `dt / REFERENCE_DT`, so the simulation behaves the same
//! at any tick rate. `dt` is in milliseconds.

use crate::protocol::SessionId;
use crate::vec::{check_wall_collision, Body, Direction, Vec2, Wall};
use serde::{Deserialize, Serialize};

pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;
pub const FLOOR_Y: f32 = 580.0;

pub const NET: Wall = Wall {
    x: 397.0,
    y: 510.0,
    x2: 403.0,
    y2: 580.0,
};

/// Duration of one reference frame (60 fps) in milliseconds.
pub const REFERENCE_DT: f32 = 1000.0 / 60.0;

pub const BALL_RADIUS: f32 = 20.0;
pub const BALL_GRAVITY: f32 = 0.5;
pub const BALL_DAMPENING: f32 = 0.95;
pub const BALL_MAX_SPEED: f32 = 16.0;

pub const SLIME_RADIUS: f32 = 50.0;
pub const SLIME_GRAVITY: f32 = 0.7;
pub const SLIME_SPEED: f32 = 6.0;
pub const SLIME_JUMP: f32 = -13.4;

pub const MAX_SCORE: u32 = 5;
pub const ROUND_RESET_DELAY_MS: f64 = 800.0;
pub const MAX_NAME_LEN: usize = 8;

pub const LEFT_SLIME_START: Vec2 = Vec2::new(200.0, FLOOR_Y);
pub const RIGHT_SLIME_START: Vec2 = Vec2::new(600.0, FLOOR_Y);
pub const BALL_START_LEFT: Vec2 = Vec2::new(200.0, 200.0);
pub const BALL_START_RIGHT: Vec2 = Vec2::new(600.0, 200.0);

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn slime_start(self) -> Vec2 {
        match self {
            Side::Left => LEFT_SLIME_START,
            Side::Right => RIGHT_SLIME_START,
        }
    }

    pub fn ball_start(self) -> Vec2 {
        match self {
            Side::Left => BALL_START_LEFT,
            Side::Right => BALL_START_RIGHT,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// The half of the arena `x` lies in.
    pub fn of_x(x: f32) -> Side {
        if x < ARENA_WIDTH / 2.0 {
            Side::Left
        } else {
            Side::Right
        }
    }

    /// Horizontal range a slime's centre may occupy on this side of the net.
    pub fn x_bounds(self, radius: f32) -> (f32, f32) {
        match self {
            Side::Left => (radius, NET.x - radius),
            Side::Right => (NET.x2 + radius, ARENA_WIDTH - radius),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VolleyPlayer {
    pub id: SessionId,
    pub name: String,
    pub color: String,
    pub is_ready: bool,
    pub side: Side,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub score: u32,
    /// Cosmetic celebration flag, set only right after this side scores.
    pub is_dancing: bool,
}

impl VolleyPlayer {
    pub fn new(id: SessionId, side: Side) -> Self {
        Self {
            id,
            name: String::new(),
            color: String::new(),
            is_ready: false,
            side,
            position: side.slime_start(),
            velocity: Vec2::ZERO,
            radius: SLIME_RADIUS,
            score: 0,
            is_dancing: false,
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.position.y >= FLOOR_Y
    }

    pub fn body(&self) -> Body {
        Body {
            position: self.position,
            velocity: self.velocity,
            radius: self.radius,
        }
    }

    /// Puts the slime back on its spawn point at rest.
    pub fn respawn(&mut self) {
        self.position = self.side.slime_start();
        self.velocity = Vec2::ZERO;
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ball {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
}

impl Ball {
    pub fn new(side: Side) -> Self {
        Self {
            position: side.ball_start(),
            velocity: Vec2::ZERO,
            radius: BALL_RADIUS,
        }
    }

    pub fn body(&self) -> Body {
        Body {
            position: self.position,
            velocity: self.velocity,
            radius: self.radius,
        }
    }
}

/// Truncates a display name to the volleyball limit, counted in characters.
pub fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_LEN).collect()
}

/// Advances one slime by `dt` milliseconds.
///
/// Horizontal velocity is set directly from `move_direction` (-1, 0 or 1).
/// A jump only happens if the slime is grounded. Returns true if it jumped.
pub fn update_player_physics(
    player: &mut VolleyPlayer,
    move_direction: i8,
    wants_jump: bool,
    dt: f32,
) -> bool {
    let scale = dt / REFERENCE_DT;
    let mut did_jump = false;

    player.velocity.x = move_direction.signum() as f32 * SLIME_SPEED;

    let grounded = player.is_grounded();
    if grounded && wants_jump {
        player.velocity.y = SLIME_JUMP;
        did_jump = true;
    }
    if !grounded {
        player.velocity.y += SLIME_GRAVITY * scale;
    }

    player.position += player.velocity * scale;

    let (min_x, max_x) = player.side.x_bounds(player.radius);
    player.position.x = player.position.x.clamp(min_x, max_x);

    if player.position.y > FLOOR_Y {
        player.position.y = FLOOR_Y;
        player.velocity.y = 0.0;
    }

    did_jump
}

/// A slime is a half-disc resting on the floor, so the ball only collides
/// with it while the ball's centre is above the slime's centre.
pub fn ball_slime_collide(ball: &Body, slime: &Body) -> bool {
    if ball.position.y >= slime.position.y {
        return false;
    }
    ball.position.distance(slime.position) <= ball.radius + slime.radius
}

/// Elastic ball/slime response by rotating into the collision frame.
///
/// Along the collision normal the ball leaves with twice the slime's speed
/// minus its own, so even a resting slime deflects it. The ball is then moved
/// out along the normal by exactly the overlap. Returns the new ball body.
pub fn resolve_ball_collision(ball: &Body, slime: &Body) -> Body {
    let offset = ball.position - slime.position;
    let distance = offset.length();
    if distance == 0.0 {
        return *ball;
    }

    let collision_angle = (slime.position - ball.position).angle();
    let speed_ball = ball.velocity.length();
    let speed_slime = slime.velocity.length();
    let direction_ball = ball.velocity.angle();
    let direction_slime = slime.velocity.angle();

    let along_ball = speed_ball * (direction_ball - collision_angle).cos();
    let across_ball = speed_ball * (direction_ball - collision_angle).sin();
    let along_slime = speed_slime * (direction_slime - collision_angle).cos();

    let final_along = 2.0 * along_slime - along_ball;
    let final_across = across_ball;

    let (sin, cos) = collision_angle.sin_cos();
    let velocity = Vec2::new(
        cos * final_along - sin * final_across,
        sin * final_along + cos * final_across,
    );

    let translation = offset * ((ball.radius + slime.radius - distance) / distance);

    Body {
        position: ball.position + translation,
        velocity,
        radius: ball.radius,
    }
}

/// Advances the ball by `dt` milliseconds against the given slimes, the net,
/// the walls and the ceiling.
///
/// Floor contact is bounced but not scored here: the return value is true
/// when the ball touched the floor line so the caller can award the point.
pub fn update_ball_physics(ball: &mut Ball, slimes: &[Body], dt: f32) -> bool {
    let scale = dt / REFERENCE_DT;

    ball.velocity.y += BALL_GRAVITY * scale;
    ball.position += ball.velocity * scale;

    let mut did_collide = false;

    for slime in slimes {
        let body = ball.body();
        if ball_slime_collide(&body, slime) {
            let resolved = resolve_ball_collision(&body, slime);
            ball.position = resolved.position;
            ball.velocity = resolved.velocity;
            did_collide = true;
        }
    }

    match check_wall_collision(&ball.body(), &NET) {
        Direction::Right => {
            ball.position.x = NET.x - ball.radius;
            ball.velocity.x = -ball.velocity.x.abs() * BALL_DAMPENING;
            did_collide = true;
        }
        Direction::Left => {
            ball.position.x = NET.x2 + ball.radius;
            ball.velocity.x = ball.velocity.x.abs() * BALL_DAMPENING;
            did_collide = true;
        }
        Direction::Up | Direction::Down => {
            // The net stands on the floor, so any vertical hit lands on its top
            ball.position.y = NET.y - ball.radius;
            ball.velocity.y = -ball.velocity.y.abs() * BALL_DAMPENING;
            did_collide = true;
        }
        Direction::None => {}
    }

    if ball.position.x - ball.radius < 0.0 {
        ball.position.x = ball.radius;
        ball.velocity.x = -ball.velocity.x * BALL_DAMPENING;
        did_collide = true;
    } else if ball.position.x + ball.radius > ARENA_WIDTH {
        ball.position.x = ARENA_WIDTH - ball.radius;
        ball.velocity.x = -ball.velocity.x * BALL_DAMPENING;
        did_collide = true;
    }

    if ball.position.y - ball.radius < 0.0 {
        ball.position.y = ball.radius;
        ball.velocity.y = -ball.velocity.y * BALL_DAMPENING;
        did_collide = true;
    }

    let hit_floor = ball.position.y + ball.radius >= FLOOR_Y;
    if hit_floor {
        ball.position.y = FLOOR_Y - ball.radius;
        ball.velocity.y = -ball.velocity.y * BALL_DAMPENING;
        did_collide = true;
    }

    if did_collide {
        clamp_speed(ball);
    }

    hit_floor
}

fn clamp_speed(ball: &mut Ball) {
    let speed = ball.velocity.length();
    if speed > BALL_MAX_SPEED {
        ball.velocity = ball.velocity * (BALL_MAX_SPEED / speed);
    }
}
