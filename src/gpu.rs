//! The narrow slice of the renderer the brush editor talks to.
//!
//! Everything here is consumed through [`GpuBackend`], whose methods take
//! `&self` the same way a wgpu device does. Pixel results never come back
//! synchronously with the work that produced them: callers tag work with the
//! current frame fence and wait for the fence callback before reading.

use std::path::Path;

use bevy::math::{Rect, URect, UVec2};
use image::{Rgba32FImage, RgbaImage};

use crate::error::BrushResult;
use crate::material::Material;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// Signals once all GPU work queued before it has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceId(pub u64);

/// Identifies a registered fence callback so it can be unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(pub u64);

/// Invoked by the backend when a fence signals. May run on any thread.
pub type FenceCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgba32F,
    R32F,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgba32F => 16,
            TextureFormat::R32F => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub needs_readback: bool,
}

impl TextureDescriptor {
    /// Single mip render target that the CPU can read back.
    pub fn readback_target(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: 1,
            needs_readback: true,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn mip_size(&self, level: u32) -> UVec2 {
        UVec2::new((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

/// One scissored full screen quad draw into `target`.
///
/// `scissor` is expressed in normalized target space, `None` covers the whole
/// target.
#[derive(Debug, Clone, Copy)]
pub struct BrushDraw<'a> {
    pub target: TextureHandle,
    pub target_level: u32,
    pub material: &'a Material,
    pub scissor: Option<Rect>,
}

pub trait GpuBackend: Send + Sync {
    fn create_texture(&self, descriptor: &TextureDescriptor) -> TextureHandle;

    fn release_texture(&self, texture: TextureHandle);

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor>;

    /// Loads a single mip, clamp-addressed texture (brush shapes, cursors).
    fn load_texture(&self, path: &Path) -> BrushResult<TextureHandle>;

    /// Fence covering all work queued so far in the current frame.
    fn current_frame_fence(&self) -> FenceId;

    /// Registers a one-shot callback fired when `fence` signals.
    fn register_fence_callback(&self, fence: FenceId, callback: FenceCallback) -> CallbackToken;

    fn unregister_fence_callback(&self, token: CallbackToken);

    /// Size of the runtime uv-picking texture the landscape renders into.
    fn pick_texture_size(&self) -> UVec2;

    /// Copies `source` (pick texture pixels) of the last rendered picking
    /// buffer into `target`.
    fn blit_pick_rect(&self, source: Rect, target: TextureHandle);

    fn read_texture_f32(&self, texture: TextureHandle) -> BrushResult<Rgba32FImage>;

    /// Reads mip 0 of an RGBA8 texture over `region` (pixels).
    fn read_texture_region(&self, texture: TextureHandle, region: URect)
        -> BrushResult<RgbaImage>;

    /// Copies every mip level of `source` into `target`.
    fn copy_texture(&self, source: TextureHandle, target: TextureHandle);

    /// Fails with [`crate::error::BrushEditorError::MaterialNotReady`] when
    /// the material cannot be built for drawing yet.
    fn draw_brush(&self, draw: &BrushDraw) -> BrushResult<()>;

    fn set_picking_pass(&self, enabled: bool);
}
