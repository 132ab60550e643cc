//! 2D vector primitives and the rectangle collision classifier shared by both games

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A vector in 2D arena space. Positive y points down (towards the floor).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians).
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Angle of the vector in radians, as returned by `atan2(y, x)`.
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Returns the normalized vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec2 {
        let len = self.length();
        if len == 0.0 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn lerp(&self, target: Vec2, t: f32) -> Vec2 {
        Vec2::new(lerp(self.x, target.x, t), lerp(self.y, target.y, t))
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// A circular moving body: the collision shape used by slimes and the ball.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
}

/// Axis-aligned rectangle given by its top-left `(x, y)` and bottom-right `(x2, y2)` corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Which face of a wall a moving circle struck.
///
/// `Left` means the circle hit the wall while travelling left, i.e. it struck
/// the wall's right face; `Up` means it was travelling up and struck the bottom face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    Up,
    Right,
    Down,
    Left,
}

/// Classifies a circle/rectangle overlap by the axis with the smaller penetration,
/// measured against the face the circle is travelling towards.
pub fn check_wall_collision(body: &Body, wall: &Wall) -> Direction {
    let goes_left = body.velocity.x < 0.0;
    let goes_up = body.velocity.y < 0.0;
    let left = wall.x2 - body.position.x + body.radius;
    let right = body.position.x + body.radius - wall.x;
    let top = wall.y2 - body.position.y + body.radius;
    let bottom = body.position.y + body.radius - wall.y;

    if left > 0.0 && right > 0.0 && top > 0.0 && bottom > 0.0 {
        let x = if goes_left { left } else { right };
        let y = if goes_up { top } else { bottom };
        if x < y {
            if goes_left {
                Direction::Left
            } else {
                Direction::Right
            }
        } else if goes_up {
            Direction::Up
        } else {
            Direction::Down
        }
    } else {
        Direction::None
    }
}
