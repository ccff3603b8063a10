//! Picking results.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Hit index written when nothing was resolved.
pub const NO_HIT: i32 = -1;
/// Hit index reserved for the ground plane / terrain.
pub const GROUND_HIT: i32 = 0;

/// Selection buffer contents (binding 4 of the raymarch set).
///
/// ```glsl
/// layout(std430, binding = 4) buffer Selection {
///     int hit_index;   // -1 none, 0 ground, N = edit N-1
///     vec4 position;   // world-space hit position (offset 16)
/// } selection;
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuSelection {
    pub hit_index: i32,
    pub _pad: [u32; 3],
    pub position: [f32; 4],
}

impl GpuSelection {
    /// The "nothing picked" sentinel.
    pub const NONE: Self = Self {
        hit_index: NO_HIT,
        _pad: [0; 3],
        position: [0.0; 4],
    };

    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub const fn is_none(&self) -> bool {
        self.hit_index < GROUND_HIT
    }
}

impl Default for GpuSelection {
    fn default() -> Self {
        Self::NONE
    }
}

/// What a pick landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HitTarget {
    /// Ground plane or terrain.
    Ground,
    /// Edit at this index of the edit list.
    Edit(usize),
}

/// A resolved pick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    pub target: HitTarget,
    /// World-space hit position.
    pub position: Vec3,
}

impl Selection {
    /// Decode a selection record. Returns `None` for the sentinel.
    pub fn from_gpu(raw: &GpuSelection) -> Option<Self> {
        let target = match raw.hit_index {
            i if i < GROUND_HIT => return None,
            GROUND_HIT => HitTarget::Ground,
            i => HitTarget::Edit((i - 1) as usize),
        };
        Some(Self {
            target,
            position: Vec3::new(raw.position[0], raw.position[1], raw.position[2]),
        })
    }

    /// The shader-side hit index of this selection.
    pub fn hit_index(&self) -> i32 {
        match self.target {
            HitTarget::Ground => GROUND_HIT,
            HitTarget::Edit(i) => i as i32 + 1,
        }
    }

    /// Index of the picked edit, if an edit was hit.
    pub const fn edit_index(&self) -> Option<usize> {
        match self.target {
            HitTarget::Edit(i) => Some(i),
            HitTarget::Ground => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_layout() {
        assert_eq!(GpuSelection::SIZE, 32);
        assert_eq!(std::mem::offset_of!(GpuSelection, position), 16);
    }

    #[test]
    fn hit_index_decoding() {
        let mut raw = GpuSelection::NONE;
        assert!(raw.is_none());
        assert_eq!(Selection::from_gpu(&raw), None);

        raw.hit_index = 0;
        raw.position = [1.0, 0.0, 2.0, 1.0];
        let ground = Selection::from_gpu(&raw).unwrap();
        assert_eq!(ground.target, HitTarget::Ground);
        assert_eq!(ground.position, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(ground.edit_index(), None);

        raw.hit_index = 3;
        let edit = Selection::from_gpu(&raw).unwrap();
        assert_eq!(edit.target, HitTarget::Edit(2));
        assert_eq!(edit.hit_index(), 3);
    }
}
