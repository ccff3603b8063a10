//! Host copy of the terrain, updated with every stroke the GPU applies so
//! the editor can place the brush without reading back GPU memory.
//! Smoothing and 8-bit splat storage make it an approximation of the GPU
//! heightmap, close enough for cursor placement.

use brickmarch_core::{BrushParams, Heightfield};
use glam::{Vec2, Vec3};

use crate::config::TerrainConfig;
use crate::params::BrushCursor;
use crate::ray_march::{Ray, RayHit, RayMarchConfig};

/// Terrain heightfield in world space.
///
/// The terrain is a square of `world_size` centered on the origin in XZ;
/// UV (0, 0) is the corner at `-world_size / 2`.
#[derive(Clone, Debug)]
pub struct TerrainMirror {
    field: Heightfield,
    world_size: f32,
    height_scale: f32,
}

impl TerrainMirror {
    pub fn new(config: &TerrainConfig) -> Self {
        Self {
            field: Heightfield::new(config.resolution),
            world_size: config.world_size,
            height_scale: config.height_scale,
        }
    }

    pub fn field(&self) -> &Heightfield {
        &self.field
    }

    pub fn world_size(&self) -> f32 {
        self.world_size
    }

    pub fn height_scale(&self) -> f32 {
        self.height_scale
    }

    pub fn world_to_uv(&self, xz: Vec2) -> Vec2 {
        xz / self.world_size + 0.5
    }

    pub fn uv_to_world(&self, uv: Vec2) -> Vec2 {
        (uv - 0.5) * self.world_size
    }

    /// Scaled height at `uv`; the terrain is flat at 0 outside 0..1.
    pub fn height_at_uv(&self, uv: Vec2) -> f32 {
        if uv.cmplt(Vec2::ZERO).any() || uv.cmpgt(Vec2::ONE).any() {
            return 0.0;
        }
        self.field.sample(uv) * self.height_scale
    }

    pub fn height_at_world(&self, xz: Vec2) -> f32 {
        self.height_at_uv(self.world_to_uv(xz))
    }

    /// Surface normal from central differences one texel apart.
    pub fn normal_at_world(&self, xz: Vec2) -> Vec3 {
        let e = self.world_size / self.field.resolution().max(1) as f32;
        let dx = self.height_at_world(xz + Vec2::new(e, 0.0))
            - self.height_at_world(xz - Vec2::new(e, 0.0));
        let dz = self.height_at_world(xz + Vec2::new(0.0, e))
            - self.height_at_world(xz - Vec2::new(0.0, e));
        Vec3::new(-dx, 2.0 * e, -dz).normalize()
    }

    /// Mirror a stroke the GPU has just been asked to execute.
    pub fn apply(&mut self, params: &BrushParams) {
        self.field.apply(params);
    }

    /// First intersection of `ray` with the terrain surface.
    ///
    /// Rays starting below the surface never hit.
    pub fn raycast(&self, ray: &Ray, config: &RayMarchConfig) -> Option<RayHit> {
        let above = |t: f32| {
            let p = ray.at(t);
            p.y - self.height_at_world(Vec2::new(p.x, p.z))
        };

        if above(0.0) < 0.0 {
            return None;
        }

        let step = config.step();
        let mut t_prev = 0.0;
        let mut t = step;
        while t <= config.max_distance {
            if above(t) <= 0.0 {
                let t_hit = bisect(&above, t_prev, t, config.epsilon);
                let position = ray.at(t_hit);
                return Some(RayHit {
                    t: t_hit,
                    position,
                    normal: self.normal_at_world(Vec2::new(position.x, position.z)),
                });
            }
            t_prev = t;
            t += step;
        }
        None
    }

    /// Brush cursor and stroke center where `ray` meets the terrain.
    ///
    /// Returns the world-space cursor to draw and the UV to stroke at.
    pub fn brush_cursor(&self, ray: &Ray, radius_uv: f32) -> Option<(BrushCursor, Vec2)> {
        let hit = self.raycast(ray, &RayMarchConfig::default())?;
        let uv = self.world_to_uv(Vec2::new(hit.position.x, hit.position.z));
        if uv.cmplt(Vec2::ZERO).any() || uv.cmpgt(Vec2::ONE).any() {
            return None;
        }
        Some((
            BrushCursor {
                position: hit.position,
                radius: radius_uv * self.world_size,
            },
            uv,
        ))
    }
}

/// Narrow `[lo, hi]` around the sign change of `f` (positive at `lo`).
fn bisect(f: impl Fn(f32) -> f32, mut lo: f32, mut hi: f32, epsilon: f32) -> f32 {
    for _ in 0..32 {
        let mid = 0.5 * (lo + hi);
        let value = f(mid);
        if value.abs() < epsilon {
            return mid;
        }
        if value > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use brickmarch_core::BrushMode;

    fn mirror() -> TerrainMirror {
        TerrainMirror::new(&TerrainConfig {
            resolution: 64,
            world_size: 64.0,
            height_scale: 1.0,
        })
    }

    #[test]
    fn uv_world_mapping_is_centered() {
        let terrain = mirror();
        assert_eq!(terrain.world_to_uv(Vec2::ZERO), Vec2::splat(0.5));
        assert_eq!(terrain.world_to_uv(Vec2::splat(-32.0)), Vec2::ZERO);
        assert_eq!(terrain.uv_to_world(Vec2::ONE), Vec2::splat(32.0));
    }

    #[test]
    fn raycast_hits_flat_ground() {
        let terrain = mirror();
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -1.0, 1.0));
        let hit = terrain.raycast(&ray, &RayMarchConfig::default()).unwrap();
        assert_relative_eq!(hit.position.y, 0.0, epsilon = 1e-2);
        assert_relative_eq!(hit.position.z, 5.0, epsilon = 1e-2);
        assert_relative_eq!(hit.normal.y, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn raycast_hits_raised_terrain_first() {
        let mut terrain = mirror();
        terrain.apply(&BrushParams::new(
            BrushMode::Flatten,
            Vec2::splat(0.5),
            0.2,
            1.0,
        ).with_target_height(3.0));
        assert!(terrain.height_at_world(Vec2::ZERO) > 2.5);

        let ray = Ray::new(Vec3::new(0.0, 10.0, -0.01), Vec3::NEG_Y);
        let hit = terrain.raycast(&ray, &RayMarchConfig::default()).unwrap();
        assert!(hit.position.y > 2.5, "hit at {}", hit.position.y);
    }

    #[test]
    fn rays_missing_or_starting_below_do_not_hit() {
        let terrain = mirror();
        let up = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        assert!(terrain.raycast(&up, &RayMarchConfig::default()).is_none());
        let below = Ray::new(Vec3::new(0.0, -1.0, 0.0), Vec3::NEG_Y);
        assert!(terrain.raycast(&below, &RayMarchConfig::default()).is_none());
    }

    #[test]
    fn outside_terrain_is_flat() {
        let mut terrain = mirror();
        terrain.apply(&BrushParams::new(BrushMode::Raise, Vec2::splat(0.0), 0.5, 5.0));
        assert_eq!(terrain.height_at_world(Vec2::splat(-100.0)), 0.0);
    }

    #[test]
    fn brush_cursor_reports_uv_and_world_radius() {
        let terrain = mirror();
        let ray = Ray::new(Vec3::new(16.0, 4.0, 0.0), Vec3::NEG_Y);
        let (cursor, uv) = terrain.brush_cursor(&ray, 0.05).unwrap();
        assert_relative_eq!(uv.x, 0.75, epsilon = 1e-3);
        assert_relative_eq!(uv.y, 0.5, epsilon = 1e-3);
        assert_relative_eq!(cursor.radius, 3.2);
    }
}
