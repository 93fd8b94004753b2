/*

loaded from a RON file next to the scene, all fields optional

*/
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Resource, Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrushEditorConfig {
    /// Side of the square pick readback texture.
    pub readback_texture_size: u32,

    /// Readback textures allocated up front.
    pub readback_ring_size: usize,

    /// Cursor used by tools that do not bring their own.
    pub default_cursor_texture: PathBuf,

    pub brush_texture_folder: PathBuf,

    /// RGBA of the landscape cursor overlay.
    pub cursor_color: [f32; 4],

    /// Where tool settings are loaded from and saved to, if anywhere.
    pub tool_settings_path: Option<PathBuf>,
}

impl Default for BrushEditorConfig {
    fn default() -> Self {
        Self {
            readback_texture_size: 8,
            readback_ring_size: 4,
            default_cursor_texture: "brushes/cursor.png".into(),
            brush_texture_folder: "brushes".into(),
            cursor_color: [0.5, 0.5, 1.0, 1.0],
            tool_settings_path: None,
        }
    }
}

impl BrushEditorConfig {
    pub fn load_from_file(file_path: impl AsRef<Path>) -> Result<BrushEditorConfig> {
        let file_path = file_path.as_ref();
        let contents = std::fs::read_to_string(file_path)
            .with_context(|| format!("failed to open {}", file_path.display()))?;
        ron::from_str(&contents).with_context(|| format!("failed to parse {}", file_path.display()))
    }

    pub fn set_readback_ring_size(mut self, size: usize) -> Self {
        self.readback_ring_size = size;
        self
    }

    pub fn set_default_cursor_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_cursor_texture = path.into();
        self
    }

    pub fn set_tool_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_settings_path = Some(path.into());
        self
    }

    pub fn cursor_color(&self) -> Vec4 {
        Vec4::from_array(self.cursor_color)
    }

    pub fn brush_texture_path(&self, file_name: &str) -> PathBuf {
        self.brush_texture_folder.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_files_keep_the_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(readback_ring_size: 6, brush_texture_folder: \"art/brushes\")").unwrap();

        let config = BrushEditorConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.readback_ring_size, 6);
        assert_eq!(config.readback_texture_size, 8);
        assert_eq!(
            config.brush_texture_path("round.png"),
            PathBuf::from("art/brushes/round.png")
        );
    }

    #[test]
    fn malformed_files_are_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(readback_ring_size: \"four\")").unwrap();

        assert!(BrushEditorConfig::load_from_file(file.path()).is_err());
    }
}
