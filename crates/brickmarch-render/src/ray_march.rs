//! Host-side rays, used to turn cursor positions into terrain hits.

use glam::Vec3;

/// Ray for marching through the scene.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get point along ray at distance t.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Hit result from ray marching.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub t: f32,
    pub position: Vec3,
    pub normal: Vec3,
}

/// Configuration for the ray marcher.
#[derive(Debug, Clone)]
pub struct RayMarchConfig {
    pub max_steps: u32,
    pub max_distance: f32,
    /// Height error at which bisection stops.
    pub epsilon: f32,
}

impl Default for RayMarchConfig {
    fn default() -> Self {
        Self {
            max_steps: 512,
            max_distance: 200.0,
            epsilon: 0.001,
        }
    }
}

impl RayMarchConfig {
    /// Fixed step length of the coarse march.
    pub fn step(&self) -> f32 {
        self.max_distance / self.max_steps.max(1) as f32
    }
}
