//! Editor session state and the scene commands that mutate it.
//!
//! UI code never touches renderer fields directly. It submits
//! [`SceneCommand`]s, which the frame orchestrator applies in submission
//! order before any recording for the frame begins.

use std::collections::VecDeque;

use brickmarch_core::{BrushMode, BrushParams, HitTarget, InputState, SdfEdit, Selection};
use glam::Vec2;

use crate::camera::FlyCamera;
use crate::edit_buffer::EditList;
use crate::params::{BrushCursor, FrameParams, RenderMode};
use crate::terrain_mirror::TerrainMirror;

/// An intended mutation of the scene or the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneCommand {
    /// Append an edit and select it.
    AddEdit(SdfEdit),
    /// Remove the edit at this index; later edits shift down.
    RemoveEdit(usize),
    UpdateEdit { index: usize, edit: SdfEdit },
    Select(Option<usize>),
    SetRenderMode(RenderMode),
    SetShowGround(bool),
    SetShowGrid(bool),
    /// Resolve what lies under an output pixel on the next frame.
    Pick { x: f32, y: f32 },
    Brush(BrushParams),
    SetBrushCursor(Option<BrushCursor>),
}

/// Work a command leaves for the GPU stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandEffect {
    None,
    Pick(Vec2),
    Brush(BrushParams),
}

/// Shading options of the raymarch pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub mode: RenderMode,
    pub show_ground: bool,
    pub show_grid: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::Lit,
            show_ground: true,
            show_grid: false,
        }
    }
}

/// Brush tool settings chosen in the editor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushSettings {
    pub mode: BrushMode,
    /// Radius in terrain UV units.
    pub radius: f32,
    pub strength: f32,
    pub layer: u32,
    /// Flatten target; `None` flattens toward the height under the cursor.
    pub target_height: Option<f32>,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            mode: BrushMode::Raise,
            radius: 0.05,
            strength: 0.5,
            layer: 0,
            target_height: None,
        }
    }
}

impl BrushSettings {
    /// Stroke centered on `uv`. `surface_height` is used as the flatten
    /// target when none is set.
    pub fn stroke_at(&self, uv: Vec2, surface_height: f32) -> BrushParams {
        BrushParams::new(self.mode, uv, self.radius, self.strength)
            .with_layer(self.layer)
            .with_target_height(self.target_height.unwrap_or(surface_height))
    }
}

/// Everything the editor owns across frames.
#[derive(Debug, Default)]
pub struct EditorSession {
    pub camera: FlyCamera,
    pub render: RenderSettings,
    pub brush: BrushSettings,
    pub brush_cursor: Option<BrushCursor>,
    selected: Option<usize>,
    elapsed: f32,
    commands: VecDeque<SceneCommand>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command for the next frame.
    pub fn submit(&mut self, command: SceneCommand) {
        self.commands.push_back(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Take the queued commands in submission order.
    pub fn take_commands(&mut self) -> VecDeque<SceneCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Advance the clock and fly the camera.
    pub fn update(&mut self, input: &InputState, dt: f32) {
        self.elapsed += dt;
        self.camera.update(input, dt);
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Apply one command to the session and `edits`.
    pub fn apply(&mut self, command: SceneCommand, edits: &mut EditList) -> CommandEffect {
        match command {
            SceneCommand::AddEdit(edit) => {
                let index = edits.push(edit);
                self.selected = Some(index);
                tracing::debug!(index, "Added edit");
            }
            SceneCommand::RemoveEdit(index) => {
                if edits.remove(index).is_some() {
                    self.clamp_selection(edits.len());
                    tracing::debug!(index, remaining = edits.len(), "Removed edit");
                } else {
                    tracing::warn!(index, len = edits.len(), "Ignoring removal of missing edit");
                }
            }
            SceneCommand::UpdateEdit { index, edit } => {
                if !edits.update(index, edit) {
                    tracing::warn!(index, len = edits.len(), "Ignoring update of missing edit");
                }
            }
            SceneCommand::Select(selected) => {
                self.selected = selected.filter(|&i| i < edits.len());
            }
            SceneCommand::SetRenderMode(mode) => self.render.mode = mode,
            SceneCommand::SetShowGround(show) => self.render.show_ground = show,
            SceneCommand::SetShowGrid(show) => self.render.show_grid = show,
            SceneCommand::Pick { x, y } => return CommandEffect::Pick(Vec2::new(x, y)),
            SceneCommand::Brush(params) => return CommandEffect::Brush(params),
            SceneCommand::SetBrushCursor(cursor) => self.brush_cursor = cursor,
        }
        CommandEffect::None
    }

    fn clamp_selection(&mut self, len: usize) {
        if let Some(selected) = self.selected {
            if selected >= len {
                self.selected = len.checked_sub(1);
            }
        }
    }

    /// Select whatever a pick landed on. Ground clears the selection.
    pub fn apply_selection(&mut self, selection: &Selection, edits: &EditList) {
        self.selected = match selection.target {
            HitTarget::Edit(index) if index < edits.len() => Some(index),
            HitTarget::Edit(_) | HitTarget::Ground => None,
        };
    }

    /// Aim the brush at output pixel `cursor` and return the stroke to
    /// queue there. Clears the cursor when the ray misses the terrain.
    pub fn brush_at_cursor(
        &mut self,
        cursor: Vec2,
        width: u32,
        height: u32,
        terrain: &TerrainMirror,
    ) -> Option<BrushParams> {
        let ray = self.camera.camera().ray_through(cursor, width, height);
        let Some((brush_cursor, uv)) = terrain.brush_cursor(&ray, self.brush.radius) else {
            self.brush_cursor = None;
            return None;
        };
        self.brush_cursor = Some(brush_cursor);
        Some(self.brush.stroke_at(uv, terrain.field().sample(uv)))
    }

    /// Parameter block for the next dispatch.
    pub fn frame_params(
        &self,
        width: u32,
        height: u32,
        edits: &EditList,
        terrain: &TerrainMirror,
        pick: Option<Vec2>,
    ) -> FrameParams {
        FrameParams::new(self.camera.position, self.camera.direction(), width, height)
            .with_time(self.elapsed)
            .with_edit_count(edits.gpu_count())
            .with_render_mode(self.render.mode)
            .with_overlays(self.render.show_ground, self.render.show_grid)
            .with_pick(pick)
            .with_brush_cursor(self.brush_cursor)
            .with_terrain(terrain.world_size(), terrain.height_scale())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use brickmarch_core::{default_scene, GpuSelection, PrimitiveType};
    use glam::Vec3;

    fn three_edits() -> EditList {
        EditList::from_edits(default_scene())
    }

    fn small_terrain() -> TerrainMirror {
        TerrainMirror::new(&TerrainConfig {
            resolution: 64,
            world_size: 64.0,
            height_scale: 1.0,
        })
    }

    #[test]
    fn removal_renumbers_pick_targets() {
        let mut edits = three_edits();
        let formerly_second = *edits.get(2).unwrap();
        let mut session = EditorSession::new();

        session.apply(SceneCommand::RemoveEdit(1), &mut edits);
        assert_eq!(edits.len(), 2);

        let raw = GpuSelection {
            hit_index: 2,
            ..GpuSelection::NONE
        };
        let selection = Selection::from_gpu(&raw).unwrap();
        assert_eq!(selection.target, HitTarget::Edit(1));
        assert_eq!(*edits.get(1).unwrap(), formerly_second);
    }

    #[test]
    fn add_selects_new_edit() {
        let mut edits = three_edits();
        let mut session = EditorSession::new();
        let effect = session.apply(SceneCommand::AddEdit(SdfEdit::default()), &mut edits);
        assert_eq!(effect, CommandEffect::None);
        assert_eq!(session.selected(), Some(3));
    }

    #[test]
    fn out_of_range_removal_is_a_no_op() {
        let mut edits = three_edits();
        let generation = edits.generation();
        let mut session = EditorSession::new();
        session.apply(SceneCommand::RemoveEdit(7), &mut edits);
        assert_eq!(edits.len(), 3);
        assert_eq!(edits.generation(), generation);
    }

    #[test]
    fn removal_clamps_selection() {
        let mut edits = three_edits();
        let mut session = EditorSession::new();
        session.apply(SceneCommand::Select(Some(2)), &mut edits);
        session.apply(SceneCommand::RemoveEdit(2), &mut edits);
        assert_eq!(session.selected(), Some(1));

        session.apply(SceneCommand::RemoveEdit(0), &mut edits);
        session.apply(SceneCommand::RemoveEdit(0), &mut edits);
        assert!(edits.is_empty());
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn select_ignores_missing_edits() {
        let mut edits = three_edits();
        let mut session = EditorSession::new();
        session.apply(SceneCommand::Select(Some(9)), &mut edits);
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn pick_and_brush_are_forwarded() {
        let mut edits = three_edits();
        let mut session = EditorSession::new();
        assert_eq!(
            session.apply(SceneCommand::Pick { x: 3.0, y: 4.0 }, &mut edits),
            CommandEffect::Pick(Vec2::new(3.0, 4.0))
        );
        let stroke = BrushParams::new(BrushMode::Lower, Vec2::splat(0.5), 0.1, 1.0);
        assert_eq!(
            session.apply(SceneCommand::Brush(stroke), &mut edits),
            CommandEffect::Brush(stroke)
        );
    }

    #[test]
    fn ground_pick_clears_selection() {
        let edits = three_edits();
        let mut session = EditorSession::new();
        let hit = Selection {
            target: HitTarget::Edit(0),
            position: Vec3::ZERO,
        };
        session.apply_selection(&hit, &edits);
        assert_eq!(session.selected(), Some(0));

        let ground = Selection {
            target: HitTarget::Ground,
            position: Vec3::ZERO,
        };
        session.apply_selection(&ground, &edits);
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn frame_params_reflect_session() {
        let mut edits = three_edits();
        edits.push(SdfEdit::new(PrimitiveType::Cylinder, Vec3::ZERO));
        let mut session = EditorSession::new();
        session.apply(SceneCommand::SetRenderMode(RenderMode::Normals), &mut edits);
        session.apply(SceneCommand::SetShowGrid(true), &mut edits);

        let params = session.frame_params(320, 200, &edits, &small_terrain(), None);
        assert_eq!(params.edit_count, 4.0);
        assert_eq!(params.render_mode, RenderMode::Normals.as_u32());
        assert_eq!(params.show_grid, 1);
        assert_eq!(params.show_ground, 1);
        assert!(!params.has_pick());
        assert_eq!(params.cam_pos[..3], [0.0, 2.5, -5.0]);
    }

    #[test]
    fn brush_at_cursor_hits_ground_below_camera() {
        let mut session = EditorSession::new();
        session.camera.position = Vec3::new(0.0, 5.0, 0.0);
        session.camera.pitch = -FlyCamera::PITCH_LIMIT;
        session.brush.mode = BrushMode::Flatten;

        let stroke = session
            .brush_at_cursor(Vec2::new(50.0, 50.0), 100, 100, &small_terrain())
            .unwrap();
        assert!(session.brush_cursor.is_some());
        assert_eq!(stroke.mode, BrushMode::Flatten);
        assert_eq!(stroke.target_height, 0.0);
        assert!((stroke.center - Vec2::splat(0.5)).length() < 0.05);
    }
}
