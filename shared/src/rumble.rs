//! Survival ("rumble") entity model and physics
//!
//! Players are equal-mass discs on a circular ice floe centred on the origin.
//! Every tick they accelerate towards their held direction, glide with drag,
//! and bounce off each other. Leaving the floe eliminates a player.
//!
//! All durations are in milliseconds and velocities in arena units per millisecond,
//! so the same step runs on the server tick and in client prediction.

use crate::protocol::SessionId;
use crate::vec::Vec2;
use serde::{Deserialize, Serialize};

pub const ACCELERATION: f32 = 0.007;
pub const DRAG: f32 = 0.95;
pub const PLAYER_RADIUS: f32 = 10.0;
pub const KICK_RADIUS: f32 = 0.2;
pub const KICK_POWER: f32 = 0.1;
/// Charge is measured in milliseconds of regeneration.
pub const MAX_CHARGE: f32 = 2000.0;
pub const WORLD_SIZE: f32 = 100.0;
/// Velocity components below this magnitude snap to zero.
pub const VELOCITY_EPSILON: f32 = 0.001;
/// Default match length in seconds, adjustable by the host.
pub const DEFAULT_GAME_TIME: u32 = 75;
pub const GAME_OVER_DELAY_MS: f64 = 2000.0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RumblePlayer {
    pub id: SessionId,
    pub name: String,
    pub color: String,
    pub is_alive: bool,
    pub is_ready: bool,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Held acceleration direction in radians, `None` while coasting.
    pub accel_direction: Option<f32>,
    pub charge: f32,
}

impl RumblePlayer {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            name: String::new(),
            color: String::new(),
            is_alive: true,
            is_ready: false,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            accel_direction: None,
            charge: MAX_CHARGE,
        }
    }

    pub fn is_charged(&self) -> bool {
        self.charge >= MAX_CHARGE
    }

    /// Adds one tick of acceleration along the held direction. Dead players drift.
    pub fn accelerate(&mut self) {
        if !self.is_alive {
            return;
        }
        if let Some(angle) = self.accel_direction {
            self.velocity += Vec2::from_angle(angle) * ACCELERATION;
        }
    }

    /// Moves by velocity, applies drag, and regenerates kick charge.
    pub fn integrate(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        self.velocity = self.velocity * DRAG;
        if self.velocity.x.abs() < VELOCITY_EPSILON {
            self.velocity.x = 0.0;
        }
        if self.velocity.y.abs() < VELOCITY_EPSILON {
            self.velocity.y = 0.0;
        }
        self.charge = (self.charge + dt).min(MAX_CHARGE);
    }

    /// One full single-body step, as run by client prediction for its own entity.
    pub fn step(&mut self, dt: f32) {
        self.accelerate();
        self.integrate(dt);
    }

    pub fn is_outside(&self, world_size: f32) -> bool {
        self.position.length() > world_size
    }
}

/// Distance within which a kick reaches another player.
pub fn kick_reach() -> f32 {
    PLAYER_RADIUS * KICK_RADIUS + PLAYER_RADIUS * 2.0
}

/// Pushes `target` directly away from `kicker_position` if it is within reach.
/// Returns true if the impulse was applied.
pub fn apply_kick(kicker_position: Vec2, target: &mut RumblePlayer) -> bool {
    let delta = kicker_position - target.position;
    if delta.length() >= kick_reach() {
        return false;
    }
    target.velocity -= Vec2::from_angle(delta.angle()) * KICK_POWER;
    true
}

/// Resolves an overlap between two players.
///
/// Velocity components along the line between the centres are exchanged
/// (elastic, equal mass) and both discs are pushed apart by half the overlap
/// each so they end exactly `2 * PLAYER_RADIUS` apart. Returns true if the
/// pair was overlapping.
pub fn resolve_collision(a: &mut RumblePlayer, b: &mut RumblePlayer) -> bool {
    let min_distance = PLAYER_RADIUS * 2.0;
    let delta = a.position - b.position;
    let distance = delta.length();

    if distance / min_distance >= 1.0 {
        return false;
    }

    if distance == 0.0 {
        // No contact normal to work with; separate along x and leave velocities alone
        a.position.x += PLAYER_RADIUS;
        b.position.x -= PLAYER_RADIUS;
        return true;
    }

    let normal = Vec2::from_angle(delta.angle());
    let a_along = a.velocity.dot(normal);
    let b_along = b.velocity.dot(normal);
    a.velocity += normal * (b_along - a_along);
    b.velocity += normal * (a_along - b_along);

    let correction = normal * ((min_distance - distance) / 2.0);
    a.position += correction;
    b.position -= correction;
    true
}

/// Evenly spaced spawn points on the circle of radius `world_size - 2 * PLAYER_RADIUS`,
/// starting at `start_angle`.
pub fn spawn_positions(count: usize, world_size: f32, start_angle: f32) -> Vec<Vec2> {
    if count == 0 {
        return Vec::new();
    }
    let step = std::f32::consts::TAU / count as f32;
    let distance = world_size - PLAYER_RADIUS * 2.0;
    (0..count)
        .map(|i| Vec2::from_angle(start_angle + step * i as f32) * distance)
        .collect()
}
