//! Saving rendered frames to image files.

use std::path::{Path, PathBuf};

use brickmarch_gpu::GpuError;
use image::{ImageBuffer, Rgba};

/// Save RGBA8 pixel data to an image file.
///
/// The format is taken from the file extension.
pub fn save_screenshot(
    data: Vec<u8>,
    width: u32,
    height: u32,
    path: impl AsRef<Path>,
) -> Result<(), ScreenshotError> {
    let path = path.as_ref();

    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
        .ok_or(ScreenshotError::InvalidImageData { width, height })?;

    image
        .save(path)
        .map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;

    tracing::info!("Screenshot saved: {}", path.display());
    Ok(())
}

/// Read a frame through `read_output` and save it.
pub fn capture_screenshot<F>(
    read_output: F,
    (width, height): (u32, u32),
    path: impl AsRef<Path>,
) -> Result<(), ScreenshotError>
where
    F: FnOnce() -> Result<Vec<u8>, GpuError>,
{
    let data = read_output().map_err(|e| ScreenshotError::ReadbackFailed(e.to_string()))?;
    save_screenshot(data, width, height, path)
}

/// Expand `{}` in `pattern` to the frame number.
pub fn frame_output_path(pattern: &str, frame: u64) -> PathBuf {
    PathBuf::from(pattern.replace("{}", &frame.to_string()))
}

/// Errors that can occur while saving a frame.
#[derive(Debug)]
pub enum ScreenshotError {
    /// Failed to read pixel data from the GPU.
    ReadbackFailed(String),
    /// Pixel data does not match the image size.
    InvalidImageData { width: u32, height: u32 },
    /// Failed to write the image file.
    SaveFailed(String),
}

impl std::fmt::Display for ScreenshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadbackFailed(e) => write!(f, "Failed to read screenshot data: {e}"),
            Self::InvalidImageData { width, height } => {
                write!(f, "Pixel data does not fill a {width}x{height} RGBA image")
            }
            Self::SaveFailed(e) => write!(f, "Failed to save screenshot: {e}"),
        }
    }
}

impl std::error::Error for ScreenshotError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_expands_frame_number() {
        assert_eq!(frame_output_path("shot_{}.png", 12), PathBuf::from("shot_12.png"));
        assert_eq!(frame_output_path("out.png", 3), PathBuf::from("out.png"));
    }

    #[test]
    fn short_data_is_rejected() {
        let err = save_screenshot(vec![0; 7], 2, 1, std::env::temp_dir().join("x.png")).unwrap_err();
        assert!(matches!(err, ScreenshotError::InvalidImageData { width: 2, height: 1 }));
    }

    #[test]
    fn saves_png() {
        let path = std::env::temp_dir().join(format!("brickmarch-shot-{}.png", std::process::id()));
        let pixels = vec![255, 0, 0, 255, 0, 255, 0, 255];
        save_screenshot(pixels, 2, 1, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (2, 1));
        assert_eq!(loaded.get_pixel(1, 0).0, [0, 255, 0, 255]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn readback_errors_are_reported() {
        let err = capture_screenshot(
            || Err(GpuError::InvalidState("not mapped".to_string())),
            (1, 1),
            std::env::temp_dir().join("unused.png"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not mapped"));
    }
}
