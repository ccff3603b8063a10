//! SDF scene edit types.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};

/// Shape of an SDF primitive.
///
/// Discriminants match the `primitive_type` switch in `sdf_raymarch.comp`.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    #[default]
    Sphere = 0,
    Box = 1,
    Torus = 2,
    Capsule = 3,
    Cylinder = 4,
}

impl PrimitiveType {
    /// Every primitive, in discriminant order.
    pub const ALL: [Self; 5] = [
        Self::Sphere,
        Self::Box,
        Self::Torus,
        Self::Capsule,
        Self::Cylinder,
    ];

    /// Decode a shader-side tag.
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Sphere),
            1 => Some(Self::Box),
            2 => Some(Self::Torus),
            3 => Some(Self::Capsule),
            4 => Some(Self::Cylinder),
            _ => None,
        }
    }

    /// Display name used by editor listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sphere => "Sphere",
            Self::Box => "Box",
            Self::Torus => "Torus",
            Self::Capsule => "Capsule",
            Self::Cylinder => "Cylinder",
        }
    }
}

/// How an edit combines with everything before it in the edit list.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CombineOp {
    #[default]
    Union = 0,
    Subtraction = 1,
    Intersection = 2,
    SmoothUnion = 3,
    SmoothSubtraction = 4,
}

impl CombineOp {
    /// Every operation, in discriminant order.
    pub const ALL: [Self; 5] = [
        Self::Union,
        Self::Subtraction,
        Self::Intersection,
        Self::SmoothUnion,
        Self::SmoothSubtraction,
    ];

    /// Decode a shader-side tag.
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Union),
            1 => Some(Self::Subtraction),
            2 => Some(Self::Intersection),
            3 => Some(Self::SmoothUnion),
            4 => Some(Self::SmoothSubtraction),
            _ => None,
        }
    }

    /// Whether the blend factor affects this operation.
    #[must_use]
    pub const fn is_smooth(self) -> bool {
        matches!(self, Self::SmoothUnion | Self::SmoothSubtraction)
    }

    /// Display name used by editor listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Union => "Union",
            Self::Subtraction => "Subtract",
            Self::Intersection => "Intersect",
            Self::SmoothUnion => "Smooth Union",
            Self::SmoothSubtraction => "Smooth Subtract",
        }
    }
}

/// Surface material of an edit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    /// Linear base color.
    pub albedo: Vec3,
    /// Roughness (0.0 = mirror, 1.0 = diffuse)
    pub roughness: f32,
    /// Metallic (0.0 = dielectric, 1.0 = metal)
    pub metallic: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: Vec3::new(0.8, 0.3, 0.2),
            roughness: 0.5,
            metallic: 0.0,
        }
    }
}

impl Material {
    pub const fn new(albedo: Vec3, roughness: f32, metallic: f32) -> Self {
        Self {
            albedo,
            roughness,
            metallic,
        }
    }
}

/// One primitive contributing to the scene's signed distance field.
///
/// Identity is positional: the edit at index `i` of the edit list is
/// reported by picking as hit index `i + 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SdfEdit {
    pub position: Vec3,
    pub rotation: Quat,
    /// Non-uniform scale; interpretation depends on the primitive.
    pub scale: Vec3,
    pub primitive: PrimitiveType,
    pub operation: CombineOp,
    /// Blend radius for smooth operations.
    pub blend: f32,
    /// Whether the edit is driven by simulation rather than the editor.
    pub dynamic: bool,
    pub material: Material,
}

impl Default for SdfEdit {
    /// A freshly added editor object: a union sphere in front of the camera.
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 5.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            primitive: PrimitiveType::Sphere,
            operation: CombineOp::Union,
            blend: 0.3,
            dynamic: false,
            material: Material::default(),
        }
    }
}

impl SdfEdit {
    /// Create an edit of the given shape at `position` with default settings.
    #[must_use]
    pub fn new(primitive: PrimitiveType, position: Vec3) -> Self {
        Self {
            primitive,
            position,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub const fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub const fn with_operation(mut self, operation: CombineOp, blend: f32) -> Self {
        self.operation = operation;
        self.blend = blend;
        self
    }

    #[must_use]
    pub const fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Label shown in edit listings, e.g. `"Box Union #2"`.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        format!(
            "{} {} #{index}",
            self.primitive.name(),
            self.operation.name()
        )
    }

    /// Pack this edit into its shader layout.
    #[must_use]
    pub fn to_gpu(&self) -> GpuSdfEdit {
        GpuSdfEdit {
            position: self.position.to_array(),
            _pad0: 0.0,
            rotation: self.rotation.normalize().to_array(),
            scale: self.scale.to_array(),
            primitive_type: self.primitive as u32,
            operation: self.operation as u32,
            blend_factor: self.blend.max(0.0),
            is_dynamic: u32::from(self.dynamic),
            _pad1: 0.0,
            albedo: self.material.albedo.to_array(),
            roughness: self.material.roughness,
            metallic: self.material.metallic,
            _pad2: [0.0; 3],
        }
    }
}

/// Edit record as laid out in the GPU edit buffer (std430, 96 bytes).
///
/// Must match `struct SdfEdit` in `sdf_raymarch.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuSdfEdit {
    pub position: [f32; 3],
    pub _pad0: f32,
    /// Quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub primitive_type: u32,
    pub operation: u32,
    pub blend_factor: f32,
    pub is_dynamic: u32,
    pub _pad1: f32,
    pub albedo: [f32; 3],
    pub roughness: f32,
    pub metallic: f32,
    pub _pad2: [f32; 3],
}

impl GpuSdfEdit {
    /// Size in bytes of one record.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// The scene a new session starts with.
#[must_use]
pub fn default_scene() -> Vec<SdfEdit> {
    vec![
        SdfEdit::new(PrimitiveType::Sphere, Vec3::new(0.0, 1.0, 5.0)).with_material(
            Material::new(Vec3::new(0.9, 0.3, 0.2), 0.3, 0.0),
        ),
        SdfEdit::new(PrimitiveType::Box, Vec3::new(3.0, 0.8, 5.0))
            .with_scale(Vec3::splat(0.8))
            .with_material(Material::new(Vec3::new(0.3, 0.7, 0.9), 0.5, 0.2)),
        SdfEdit::new(PrimitiveType::Torus, Vec3::new(-2.5, 0.7, 6.0))
            .with_scale(Vec3::new(0.8, 0.25, 1.0))
            .with_material(Material::new(Vec3::new(0.9, 0.8, 0.2), 0.3, 0.8)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_edit_layout() {
        assert_eq!(GpuSdfEdit::SIZE, 96);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, position), 0);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, rotation), 16);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, scale), 32);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, primitive_type), 44);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, operation), 48);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, blend_factor), 52);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, is_dynamic), 56);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, albedo), 64);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, roughness), 76);
        assert_eq!(std::mem::offset_of!(GpuSdfEdit, metallic), 80);
    }

    #[test]
    fn tags_roundtrip_through_u32() {
        for primitive in PrimitiveType::ALL {
            assert_eq!(PrimitiveType::from_u32(primitive as u32), Some(primitive));
        }
        for op in CombineOp::ALL {
            assert_eq!(CombineOp::from_u32(op as u32), Some(op));
        }
        assert_eq!(PrimitiveType::from_u32(5), None);
        assert_eq!(CombineOp::from_u32(99), None);
    }

    #[test]
    fn to_gpu_packs_tags_and_material() {
        let edit = SdfEdit::new(PrimitiveType::Capsule, Vec3::new(1.0, 2.0, 3.0))
            .with_operation(CombineOp::SmoothSubtraction, 0.5)
            .with_material(Material::new(Vec3::new(0.1, 0.2, 0.3), 0.7, 1.0));
        let gpu = edit.to_gpu();

        assert_eq!(gpu.position, [1.0, 2.0, 3.0]);
        assert_eq!(gpu.rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(gpu.primitive_type, 3);
        assert_eq!(gpu.operation, 4);
        assert_eq!(gpu.blend_factor, 0.5);
        assert_eq!(gpu.is_dynamic, 0);
        assert_eq!(gpu.albedo, [0.1, 0.2, 0.3]);
        assert_eq!(gpu.metallic, 1.0);
    }

    #[test]
    fn default_scene_has_three_union_objects() {
        let scene = default_scene();
        assert_eq!(scene.len(), 3);
        assert!(scene.iter().all(|e| e.operation == CombineOp::Union));
        assert_eq!(scene[2].primitive, PrimitiveType::Torus);
        assert_eq!(scene[2].label(2), "Torus Union #2");
    }
}
