//! Headless run: device bootstrap, scripted editing and image output.

use std::path::PathBuf;

use anyhow::{bail, Context};
use brickmarch_core::{default_scene, BrushMode, CombineOp, InputState, Material, PrimitiveType, SdfEdit};
use brickmarch_gpu::GpuContext;
use brickmarch_render::{
    capture_screenshot, FrameOrchestrator, RenderMode, RendererConfig, SceneCommand, EditorSession,
};
use glam::{UVec3, Vec2, Vec3};

/// Simulated frame time.
const FRAME_DT: f32 = 1.0 / 60.0;

/// Configuration for a headless run (from CLI or defaults).
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessConfig {
    pub frames: u32,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub shader_dir: Option<PathBuf>,
    pub validation: bool,
    /// Pixel picked on the first frame; image center if unset.
    pub pick: Option<(f32, f32)>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frames: 8,
            output: PathBuf::from("brickmarch.png"),
            width: 1280,
            height: 720,
            shader_dir: None,
            validation: false,
            pick: None,
        }
    }
}

impl HeadlessConfig {
    /// Parse from the process arguments.
    pub fn from_args() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        Self::parse_args(&args)
    }

    /// Parse from a slice of arguments (the first is the program name).
    pub fn parse_args(args: &[String]) -> anyhow::Result<Self> {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || {
                i += 1;
                args.get(i)
                    .map(String::as_str)
                    .with_context(|| format!("{flag} expects a value"))
            };
            match flag {
                "-n" | "--frames" => {
                    let v = value()?;
                    config.frames = v.parse().with_context(|| format!("invalid frame count {v:?}"))?;
                }
                "-o" | "--output" => config.output = PathBuf::from(value()?),
                "--size" => {
                    let (width, height) = parse_size(value()?)?;
                    config.width = width;
                    config.height = height;
                }
                "--shaders" => config.shader_dir = Some(PathBuf::from(value()?)),
                "--pick" => config.pick = Some(parse_point(value()?)?),
                "--validation" => config.validation = true,
                other => tracing::warn!("Ignoring unknown argument {other:?}"),
            }
            i += 1;
        }

        if config.frames == 0 {
            bail!("--frames must be at least 1");
        }
        Ok(config)
    }

    pub fn renderer_config(&self) -> RendererConfig {
        let config = RendererConfig::new().with_size(self.width, self.height);
        match &self.shader_dir {
            Some(dir) => config.with_shader_dir(dir),
            None => config,
        }
    }

    fn pick_point(&self) -> Vec2 {
        self.pick.map_or_else(
            || Vec2::new(self.width as f32, self.height as f32) * 0.5,
            |(x, y)| Vec2::new(x, y),
        )
    }
}

/// Parse `WxH`.
fn parse_size(s: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("size {s:?} is not WxH"))?;
    let width: u32 = w.trim().parse().with_context(|| format!("invalid width in {s:?}"))?;
    let height: u32 = h.trim().parse().with_context(|| format!("invalid height in {s:?}"))?;
    if width == 0 || height == 0 {
        bail!("size {s:?} is empty");
    }
    Ok((width, height))
}

/// Parse `X,Y`.
fn parse_point(s: &str) -> anyhow::Result<(f32, f32)> {
    let (x, y) = s
        .split_once(',')
        .with_context(|| format!("point {s:?} is not X,Y"))?;
    Ok((
        x.trim().parse().with_context(|| format!("invalid x in {s:?}"))?,
        y.trim().parse().with_context(|| format!("invalid y in {s:?}"))?,
    ))
}

/// One scripted editor action.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Command(SceneCommand),
    /// Aim the brush at this output pixel and stroke.
    BrushAt(Vec2),
}

/// Edit added on frame 1 and removed again on frame 4.
fn scripted_edit() -> SdfEdit {
    SdfEdit::new(PrimitiveType::Capsule, Vec3::new(1.4, 0.6, 4.0))
        .with_operation(CombineOp::SmoothUnion, 0.4)
        .with_material(Material::new(Vec3::new(0.2, 0.8, 0.4), 0.4, 0.0))
}

/// Editing actions replayed before `frame`.
pub fn script_for_frame(frame: u32, width: u32, height: u32, pick: Vec2) -> Vec<ScriptStep> {
    let ground = Vec2::new(width as f32 * 0.5, height as f32 * 0.85);
    match frame {
        0 => vec![ScriptStep::Command(SceneCommand::Pick { x: pick.x, y: pick.y })],
        1 => vec![ScriptStep::Command(SceneCommand::AddEdit(scripted_edit()))],
        // Two strokes before one frame: only the second is applied.
        2 => vec![ScriptStep::BrushAt(ground), ScriptStep::BrushAt(ground + Vec2::new(40.0, 0.0))],
        3 => vec![ScriptStep::BrushAt(ground - Vec2::new(60.0, 0.0))],
        4 => vec![
            ScriptStep::Command(SceneCommand::RemoveEdit(default_scene().len())),
            ScriptStep::Command(SceneCommand::SetShowGrid(true)),
        ],
        5 => vec![ScriptStep::Command(SceneCommand::SetRenderMode(RenderMode::Lit))],
        _ => Vec::new(),
    }
}

/// Run the headless session described by `config`.
pub fn run(config: &HeadlessConfig) -> anyhow::Result<()> {
    let ctx = GpuContext::builder()
        .app_name("Brickmarch Headless")
        .validation(config.validation)
        .build()
        .context("failed to create GPU context")?;
    tracing::info!("Using device {}", ctx.device_name());

    // Declared after the context so it is dropped first.
    let mut renderer = FrameOrchestrator::new(&ctx, config.renderer_config(), default_scene())
        .context("failed to create renderer")?;
    let mut session = EditorSession::new();
    session.brush.mode = BrushMode::Raise;
    session.brush.strength = 0.8;

    // One brick near the origin keeps the index upload path exercised.
    let brick = renderer.allocate_brick(UVec3::new(32, 32, 32))?;
    tracing::debug!(slot = brick.slot(), "Allocated brick");

    let pick = config.pick_point();
    let input = InputState::default();

    for frame in 0..config.frames {
        for step in script_for_frame(frame, config.width, config.height, pick) {
            match step {
                ScriptStep::Command(command) => session.submit(command),
                ScriptStep::BrushAt(cursor) => {
                    if !renderer.brush_at_cursor(&mut session, cursor) {
                        tracing::warn!("Brush cursor {cursor} is not over the terrain");
                    }
                }
            }
        }

        session.update(&input, FRAME_DT);
        let last = frame + 1 == config.frames;
        let report = renderer.render_frame(&mut session, last)?;
        tracing::debug!(?report, "Frame recorded");

        if report.pick.is_some() {
            renderer.wait_idle()?;
            match renderer.resolve_pick(&mut session)? {
                Some(selection) => tracing::info!(
                    "Picked {:?} at {}; selected edit {:?}",
                    selection.target,
                    selection.position,
                    session.selected()
                ),
                None => tracing::info!("Pick at {pick} hit nothing"),
            }
        }
    }

    tracing::info!(
        "Rendered {} frames, {} edits, terrain height at origin {:.3}",
        renderer.frame_number(),
        renderer.edits().len(),
        renderer.terrain().height_at_world(Vec2::ZERO)
    );

    capture_screenshot(|| renderer.read_output(), renderer.dimensions(), &config.output)?;

    if let Some(slot) = renderer.free_brick(UVec3::new(32, 32, 32))? {
        tracing::debug!(slot, live = renderer.atlas().allocator().live_count(), "Released brick");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("brickmarch-headless")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let config = HeadlessConfig::parse_args(&args(&[])).unwrap();
        assert_eq!(config, HeadlessConfig::default());
        assert_eq!(config.pick_point(), Vec2::new(640.0, 360.0));
    }

    #[test]
    fn parses_every_flag() {
        let config = HeadlessConfig::parse_args(&args(&[
            "--frames", "3", "-o", "out.png", "--size", "320x200", "--shaders", "spv",
            "--validation", "--pick", "10,20",
        ]))
        .unwrap();
        assert_eq!(config.frames, 3);
        assert_eq!(config.output, PathBuf::from("out.png"));
        assert_eq!((config.width, config.height), (320, 200));
        assert_eq!(config.shader_dir, Some(PathBuf::from("spv")));
        assert!(config.validation);
        assert_eq!(config.pick, Some((10.0, 20.0)));

        let renderer = config.renderer_config();
        assert_eq!((renderer.width, renderer.height), (320, 200));
        assert_eq!(renderer.shader_dir, PathBuf::from("spv"));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(HeadlessConfig::parse_args(&args(&["--size", "wide"])).is_err());
        assert!(HeadlessConfig::parse_args(&args(&["--size", "0x10"])).is_err());
        assert!(HeadlessConfig::parse_args(&args(&["--pick", "5"])).is_err());
        assert!(HeadlessConfig::parse_args(&args(&["--frames", "0"])).is_err());
        assert!(HeadlessConfig::parse_args(&args(&["--frames"])).is_err());
    }

    #[test]
    fn script_adds_then_removes_the_same_edit() {
        let pick = Vec2::ZERO;
        let added = script_for_frame(1, 64, 64, pick);
        assert_eq!(
            added,
            [ScriptStep::Command(SceneCommand::AddEdit(scripted_edit()))]
        );

        let removed = script_for_frame(4, 64, 64, pick);
        assert_eq!(
            removed[0],
            ScriptStep::Command(SceneCommand::RemoveEdit(default_scene().len()))
        );
        assert!(script_for_frame(40, 64, 64, pick).is_empty());
    }
}
