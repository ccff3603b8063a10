//! Compute programs for the Brickmarch SDF editor.
//!
//! This crate contains the GLSL sources of the raymarch and terrain brush
//! programs and loads their precompiled SPIR-V from a shader directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Environment variable overriding the default shader directory.
pub const SHADER_DIR_ENV: &str = "BRICKMARCH_SHADER_DIR";

/// Errors raised while loading a compute program.
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("shader binary not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed SPIR-V in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl ShaderError {
    /// File the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) | Self::Read { path, .. } | Self::Malformed { path, .. } => path,
        }
    }
}

/// The compute programs the renderer dispatches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComputeProgram {
    /// Raymarches the edit list and terrain into the output image.
    SdfRaymarch,
    /// Applies one brush stroke to the heightmap/splatmap pair.
    TerrainBrush,
}

impl ComputeProgram {
    pub const ALL: [Self; 2] = [Self::SdfRaymarch, Self::TerrainBrush];

    /// SPIR-V file name inside the shader directory.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::SdfRaymarch => "sdf_raymarch.spv",
            Self::TerrainBrush => "terrain_brush.spv",
        }
    }

    /// GLSL source the binary is compiled from.
    pub const fn source(self) -> &'static str {
        match self {
            Self::SdfRaymarch => include_str!("../shaders/sdf_raymarch.comp"),
            Self::TerrainBrush => include_str!("../shaders/terrain_brush.comp"),
        }
    }

    /// Load this program's SPIR-V words from `dir`.
    pub fn load(self, dir: &Path) -> Result<Vec<u32>, ShaderError> {
        let path = dir.join(self.file_name());
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ShaderError::NotFound(path));
            }
            Err(source) => return Err(ShaderError::Read { path, source }),
        };

        let words = parse_spirv(&bytes).map_err(|reason| ShaderError::Malformed {
            path: path.clone(),
            reason,
        })?;
        tracing::debug!("Loaded {} ({} words)", path.display(), words.len());
        Ok(words)
    }
}

/// Shader directory used when none is configured: `$BRICKMARCH_SHADER_DIR`
/// if set, otherwise `spv/` next to this crate's GLSL sources.
pub fn default_shader_dir() -> PathBuf {
    std::env::var_os(SHADER_DIR_ENV).map_or_else(
        || PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/spv")),
        PathBuf::from,
    )
}

/// Convert little-endian bytes to SPIR-V words, checking length and magic.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("length {} is not a multiple of 4", bytes.len()));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        None => Err("empty module".to_string()),
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(format!("bad magic number {other:#010x}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn parse_accepts_valid_header() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_spirv(&[]).is_err());
        assert!(parse_spirv(&[0x03, 0x02, 0x23]).is_err());
        assert!(parse_spirv(&module_bytes(&[0xdead_beef])).is_err());
    }

    #[test]
    fn missing_binary_is_not_found() {
        let dir = std::env::temp_dir().join("brickmarch-shaders-missing");
        let err = ComputeProgram::SdfRaymarch.load(&dir).unwrap_err();
        assert!(matches!(err, ShaderError::NotFound(_)));
        assert!(err.path().ends_with("sdf_raymarch.spv"));
    }

    #[test]
    fn load_reads_binary_from_dir() {
        let dir = std::env::temp_dir().join(format!("brickmarch-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(ComputeProgram::TerrainBrush.file_name());
        std::fs::write(&path, module_bytes(&[SPIRV_MAGIC, 0x0001_0300, 0, 1, 0])).unwrap();

        let words = ComputeProgram::TerrainBrush.load(&dir).unwrap();
        assert_eq!(words[1], 0x0001_0300);

        std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();
        let err = ComputeProgram::TerrainBrush.load(&dir).unwrap_err();
        assert!(matches!(err, ShaderError::Malformed { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn sources_use_8x8_workgroups() {
        for program in ComputeProgram::ALL {
            assert!(
                program
                    .source()
                    .contains("layout(local_size_x = 8, local_size_y = 8, local_size_z = 1) in;"),
                "{program:?}"
            );
        }
    }

    #[test]
    fn raymarch_source_declares_bindings() {
        let source = ComputeProgram::SdfRaymarch.source();
        for binding in 0..5 {
            assert!(source.contains(&format!("layout(set = 0, binding = {binding}")));
        }
        assert!(source.contains("layout(set = 1, binding = 0, r32f)"));
        assert!(source.contains("SdfEdit edits[256]"));
    }
}
