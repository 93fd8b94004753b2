use thiserror::Error;

use crate::gpu::TextureHandle;

/// Recoverable failures of the brush editor.
///
/// Broken preconditions of the stroke state machine (double begin, stroke
/// without an active tool) are not represented here, they are debug asserts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrushEditorError {
    #[error("no landscape is being edited")]
    NoEditedLandscape,

    #[error("input lock for the edited scene is held by another editing mode")]
    InputLockUnavailable,

    #[error("unknown landscape tool `{0}`")]
    UnknownTool(String),

    #[error("landscape has {found} heightmap textures, expected exactly one")]
    UnsupportedHeightmapLayout { found: usize },

    #[error("brush material `{0}` is not ready to draw")]
    MaterialNotReady(String),

    #[error("texture {0:?} does not exist")]
    MissingTexture(TextureHandle),

    #[error("readback of texture {texture:?} failed: {reason}")]
    Readback {
        texture: TextureHandle,
        reason: String,
    },

    #[error("failed to load texture `{0}`")]
    TextureLoad(String),
}

impl BrushEditorError {
    pub fn readback<T: ToString>(texture: TextureHandle, reason: T) -> Self {
        BrushEditorError::Readback {
            texture,
            reason: reason.to_string(),
        }
    }
}

pub type BrushResult<T> = Result<T, BrushEditorError>;
