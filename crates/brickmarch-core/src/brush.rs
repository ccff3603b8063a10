//! Terrain brush parameters, the single-slot brush queue and the host
//! reference of the brush kernel run by `terrain_brush.comp`.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Number of splat layers stored in the splatmap channels.
pub const SPLAT_LAYERS: u32 = 4;

/// What a brush stroke does to the terrain.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BrushMode {
    #[default]
    Raise = 0,
    Lower = 1,
    Flatten = 2,
    Smooth = 3,
    Paint = 4,
}

impl BrushMode {
    /// Decode a shader-side tag.
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Raise),
            1 => Some(Self::Lower),
            2 => Some(Self::Flatten),
            3 => Some(Self::Smooth),
            4 => Some(Self::Paint),
            _ => None,
        }
    }
}

/// One brush stroke in terrain UV space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushParams {
    /// Brush center in UV space (0..1).
    pub center: Vec2,
    /// Brush radius in UV units.
    pub radius: f32,
    pub strength: f32,
    pub mode: BrushMode,
    /// Splat layer written by [`BrushMode::Paint`] (0 = base).
    pub layer: u32,
    /// Height approached by [`BrushMode::Flatten`].
    pub target_height: f32,
}

impl BrushParams {
    #[must_use]
    pub const fn new(mode: BrushMode, center: Vec2, radius: f32, strength: f32) -> Self {
        Self {
            center,
            radius,
            strength,
            mode,
            layer: 0,
            target_height: 0.0,
        }
    }

    /// Select the splat layer, clamped to the available channels.
    #[must_use]
    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer.min(SPLAT_LAYERS - 1);
        self
    }

    #[must_use]
    pub const fn with_target_height(mut self, target_height: f32) -> Self {
        self.target_height = target_height;
        self
    }

    /// Falloff weight at `uv`: `(radius - d) / radius` inside the brush,
    /// `None` outside it.
    #[must_use]
    pub fn falloff(&self, uv: Vec2) -> Option<f32> {
        if self.radius <= 0.0 {
            return None;
        }
        let distance = uv.distance(self.center);
        (distance < self.radius).then(|| (self.radius - distance) / self.radius)
    }

    /// Pack for the brush push-constant block.
    #[must_use]
    pub fn to_gpu(&self) -> GpuBrushParams {
        GpuBrushParams {
            uv: self.center.to_array(),
            radius: self.radius,
            strength: self.strength,
            mode: self.mode as u32,
            layer: self.layer.min(SPLAT_LAYERS - 1),
            target_height: self.target_height,
            _pad: 0.0,
        }
    }
}

/// Push constants for `terrain_brush.comp`.
///
/// ```glsl
/// layout(push_constant) uniform BrushParams {
///     vec2 uv;            // 8 bytes
///     float radius;       // 4 bytes
///     float strength;     // 4 bytes
///     uint mode;          // 4 bytes
///     uint layer;         // 4 bytes
///     float target_height;// 4 bytes
///     float _pad;         // 4 bytes
/// } brush;
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuBrushParams {
    pub uv: [f32; 2],
    pub radius: f32,
    pub strength: f32,
    pub mode: u32,
    pub layer: u32,
    pub target_height: f32,
    pub _pad: f32,
}

impl GpuBrushParams {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
}

/// Holds at most one brush stroke waiting for the next frame.
///
/// Queuing a stroke while another is pending replaces it: the newest
/// stroke wins and the older one is never applied.
#[derive(Debug, Default)]
pub struct BrushQueue {
    pending: Option<BrushParams>,
    dropped: u64,
}

impl BrushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `params` the pending stroke. Returns `true` if an unexecuted
    /// stroke was discarded.
    pub fn queue(&mut self, params: BrushParams) -> bool {
        let replaced = self.pending.replace(params).is_some();
        if replaced {
            self.dropped += 1;
            tracing::debug!(
                dropped = self.dropped,
                "Brush stroke replaced before execution"
            );
        }
        replaced
    }

    /// Remove and return the pending stroke, clearing the pending flag.
    pub fn take(&mut self) -> Option<BrushParams> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&BrushParams> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Strokes overwritten before they could execute.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

/// Host copy of a square heightmap + splatmap pair.
///
/// `apply` uses the same falloff and per-mode formulas as
/// `terrain_brush.comp`, so the editor can query heights without reading
/// back GPU memory. The copy is close but not exact: the GPU smooths
/// against neighbours in place and stores splat weights as 8-bit.
#[derive(Clone, Debug)]
pub struct Heightfield {
    resolution: u32,
    heights: Vec<f32>,
    splat: Vec<[f32; 4]>,
}

impl Heightfield {
    /// Flat terrain fully weighted to the base layer.
    pub fn new(resolution: u32) -> Self {
        let texels = (resolution as usize) * (resolution as usize);
        Self {
            resolution,
            heights: vec![0.0; texels],
            splat: vec![[1.0, 0.0, 0.0, 0.0]; texels],
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.resolution as usize + x as usize
    }

    /// UV of the center of texel `(x, y)`.
    pub fn texel_uv(&self, x: u32, y: u32) -> Vec2 {
        (Vec2::new(x as f32, y as f32) + 0.5) / self.resolution as f32
    }

    fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.resolution && y < self.resolution
    }

    /// Height of texel `(x, y)`, or `None` outside the field.
    pub fn height(&self, x: u32, y: u32) -> Option<f32> {
        self.in_bounds(x, y).then(|| self.heights[self.index(x, y)])
    }

    /// Splat weights of texel `(x, y)`, or `None` outside the field.
    pub fn splat(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        self.in_bounds(x, y).then(|| self.splat[self.index(x, y)])
    }

    /// Bilinearly filtered height at `uv`, clamped to the edges.
    pub fn sample(&self, uv: Vec2) -> f32 {
        if self.resolution == 0 {
            return 0.0;
        }
        let max = (self.resolution - 1) as f32;
        let p = (uv * self.resolution as f32 - 0.5).clamp(Vec2::ZERO, Vec2::splat(max));
        let x0 = p.x.floor() as u32;
        let y0 = p.y.floor() as u32;
        let x1 = (x0 + 1).min(self.resolution - 1);
        let y1 = (y0 + 1).min(self.resolution - 1);
        let t = p - Vec2::new(x0 as f32, y0 as f32);

        let h = |x: u32, y: u32| self.heights[self.index(x, y)];
        let top = lerp(h(x0, y0), h(x1, y0), t.x);
        let bottom = lerp(h(x0, y1), h(x1, y1), t.x);
        lerp(top, bottom, t.y)
    }

    /// Apply one stroke.
    ///
    /// Smoothing reads neighbours from the heights as they were before the
    /// stroke began.
    pub fn apply(&mut self, params: &BrushParams) {
        let Some((min, max)) = self.footprint(params) else {
            return;
        };
        let snapshot = (params.mode == BrushMode::Smooth).then(|| self.heights.clone());

        for y in min.1..=max.1 {
            for x in min.0..=max.0 {
                let Some(falloff) = params.falloff(self.texel_uv(x, y)) else {
                    continue;
                };
                let index = self.index(x, y);
                let amount = params.strength * falloff;
                let blend = amount.clamp(0.0, 1.0);

                match params.mode {
                    BrushMode::Raise => self.heights[index] += amount,
                    BrushMode::Lower => self.heights[index] -= amount,
                    BrushMode::Flatten => {
                        self.heights[index] = lerp(self.heights[index], params.target_height, blend);
                    }
                    BrushMode::Smooth => {
                        if let Some(source) = &snapshot {
                            let average = self.neighbour_average(source, x, y);
                            self.heights[index] = lerp(source[index], average, blend);
                        }
                    }
                    BrushMode::Paint => {
                        let layer = params.layer.min(SPLAT_LAYERS - 1) as usize;
                        let weights = &mut self.splat[index];
                        for (channel, weight) in weights.iter_mut().enumerate() {
                            let target = if channel == layer { 1.0 } else { 0.0 };
                            *weight = lerp(*weight, target, blend);
                        }
                        let sum: f32 = weights.iter().sum();
                        if sum > f32::EPSILON {
                            weights.iter_mut().for_each(|w| *w /= sum);
                        }
                    }
                }
            }
        }
    }

    fn neighbour_average(&self, source: &[f32], x: u32, y: u32) -> f32 {
        let last = self.resolution - 1;
        let left = source[self.index(x.saturating_sub(1), y)];
        let right = source[self.index((x + 1).min(last), y)];
        let down = source[self.index(x, y.saturating_sub(1))];
        let up = source[self.index(x, (y + 1).min(last))];
        (left + right + down + up) * 0.25
    }

    /// Inclusive texel bounds touched by `params`, if any.
    fn footprint(&self, params: &BrushParams) -> Option<((u32, u32), (u32, u32))> {
        if self.resolution == 0 || params.radius <= 0.0 {
            return None;
        }
        let res = self.resolution as f32;
        let lo = ((params.center - params.radius) * res - 0.5).floor();
        let hi = ((params.center + params.radius) * res - 0.5).ceil();
        if hi.x < 0.0 || hi.y < 0.0 || lo.x > res - 1.0 || lo.y > res - 1.0 {
            return None;
        }
        let clamp = |v: f32| v.clamp(0.0, res - 1.0) as u32;
        Some(((clamp(lo.x), clamp(lo.y)), (clamp(hi.x), clamp(hi.y))))
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raise(center: Vec2) -> BrushParams {
        BrushParams::new(BrushMode::Raise, center, 0.1, 1.0)
    }

    #[test]
    fn brush_params_layout() {
        assert_eq!(GpuBrushParams::SIZE, 32);
        assert_eq!(std::mem::offset_of!(GpuBrushParams, radius), 8);
        assert_eq!(std::mem::offset_of!(GpuBrushParams, mode), 16);
        assert_eq!(std::mem::offset_of!(GpuBrushParams, layer), 20);
        assert_eq!(std::mem::offset_of!(GpuBrushParams, target_height), 24);
    }

    #[test]
    fn layer_is_clamped() {
        let params = raise(Vec2::splat(0.5)).with_layer(9);
        assert_eq!(params.layer, 3);
        assert_eq!(params.to_gpu().layer, 3);
    }

    #[test]
    fn falloff_peaks_at_center_and_vanishes_at_radius() {
        let params = raise(Vec2::splat(0.5));
        assert_relative_eq!(params.falloff(Vec2::splat(0.5)).unwrap(), 1.0);
        assert_relative_eq!(
            params.falloff(Vec2::new(0.55, 0.5)).unwrap(),
            0.5,
            epsilon = 1e-5
        );
        assert!(params.falloff(Vec2::new(0.65, 0.5)).is_none());
    }

    #[test]
    fn raise_affects_center_more_than_outside_radius() {
        let mut field = Heightfield::new(64);
        field.apply(&raise(Vec2::splat(0.5)));

        let center = field.sample(Vec2::splat(0.5));
        let outside = field.sample(Vec2::new(0.65, 0.5));
        assert!(center > 0.5);
        assert!(center > outside);
        assert_relative_eq!(outside, 0.0);
    }

    #[test]
    fn lower_is_the_inverse_of_raise() {
        let mut field = Heightfield::new(32);
        let center = Vec2::splat(0.5);
        field.apply(&raise(center));
        field.apply(&BrushParams::new(BrushMode::Lower, center, 0.1, 1.0));
        for y in 0..32 {
            for x in 0..32 {
                assert_relative_eq!(field.height(x, y).unwrap(), 0.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn flatten_moves_toward_target() {
        let mut field = Heightfield::new(32);
        let params = BrushParams::new(BrushMode::Flatten, Vec2::splat(0.5), 0.2, 1.0)
            .with_target_height(2.0);
        field.apply(&params);
        let h = field.sample(Vec2::splat(0.5));
        assert!(h > 1.5 && h <= 2.0, "height {h}");
    }

    #[test]
    fn smooth_reduces_a_spike() {
        let mut field = Heightfield::new(16);
        let idx = field.index(8, 8);
        field.heights[idx] = 4.0;
        let params = BrushParams::new(BrushMode::Smooth, field.texel_uv(8, 8), 0.2, 1.0);
        field.apply(&params);
        assert!(field.height(8, 8).unwrap() < 4.0);
        assert!(field.height(9, 8).unwrap() > 0.0);
    }

    #[test]
    fn smooth_reads_heights_from_before_the_stroke() {
        let mut field = Heightfield::new(16);
        let idx = field.index(8, 8);
        field.heights[idx] = 4.0;
        let params = BrushParams::new(BrushMode::Smooth, field.texel_uv(8, 8), 0.2, 1.0);
        field.apply(&params);

        // Scan order does not leak into the result.
        let left = field.height(7, 8).unwrap();
        assert_relative_eq!(left, field.height(9, 8).unwrap());
        assert_relative_eq!(left, field.height(8, 7).unwrap());
        assert_relative_eq!(left, field.height(8, 9).unwrap());
    }

    #[test]
    fn texel_accessors_reject_out_of_range() {
        let field = Heightfield::new(8);
        assert_eq!(field.height(7, 7), Some(0.0));
        assert_eq!(field.height(8, 0), None);
        assert_eq!(field.splat(0, 8), None);
        assert_eq!(Heightfield::new(0).height(0, 0), None);
    }

    #[test]
    fn paint_keeps_weights_normalised() {
        let mut field = Heightfield::new(16);
        let params =
            BrushParams::new(BrushMode::Paint, Vec2::splat(0.5), 0.3, 0.6).with_layer(2);
        field.apply(&params);
        let w = field.splat(8, 8).unwrap();
        assert!(w[2] > 0.0);
        assert!(w[0] < 1.0);
        assert_relative_eq!(w.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert_eq!(field.splat(0, 0), Some([1.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn queue_keeps_only_the_newest_stroke() {
        let a = raise(Vec2::new(0.25, 0.25));
        let b = raise(Vec2::new(0.75, 0.75));
        let mut queue = BrushQueue::new();
        assert!(!queue.queue(a));
        assert!(queue.queue(b));
        assert_eq!(queue.dropped_count(), 1);

        let mut field = Heightfield::new(64);
        while let Some(stroke) = queue.take() {
            field.apply(&stroke);
        }
        assert!(!queue.is_pending());
        assert_relative_eq!(field.sample(Vec2::new(0.25, 0.25)), 0.0);
        assert!(field.sample(Vec2::new(0.75, 0.75)) > 0.5);
    }
}
