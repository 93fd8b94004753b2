use bevy::math::{Rect, Vec2, Vec3, Vec4};

use crate::commands::{CommandNotification, EditorCommand, HeightmapUpdater};
use crate::editor_config::BrushEditorConfig;
use crate::gpu::{GpuBackend, TextureHandle};
use crate::landscape::{lock_landscape, LandscapeTextureSemantic, SharedLandscape, TextureSlot};
use crate::objects::SharedObjectLayer;
use crate::overrides::{lock_overrides, SharedOverrides};

/// Everything a tool may touch while it is active, lent by the editor.
#[derive(Clone, Copy)]
pub struct EditContext<'a> {
    pub backend: &'a dyn GpuBackend,
    pub landscape: &'a SharedLandscape,
    pub overrides: &'a SharedOverrides,
    pub objects: &'a SharedObjectLayer,
    pub config: &'a BrushEditorConfig,
}

impl<'a> EditContext<'a> {
    /// The real texture of `slot`, ignoring overrides.
    pub fn original_texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        let overrides = lock_overrides(self.overrides);
        let landscape = lock_landscape(self.landscape);
        overrides.original_texture(&*landscape, slot)
    }

    pub fn set_override_texture(&self, slot: TextureSlot, texture: TextureHandle) {
        let mut overrides = lock_overrides(self.overrides);
        let mut landscape = lock_landscape(self.landscape);
        overrides.set_override(&mut *landscape, slot, texture);
    }

    pub fn texture_count(&self, semantic: LandscapeTextureSemantic) -> usize {
        lock_landscape(self.landscape).texture_count(semantic)
    }

    pub fn landscape_size(&self) -> f32 {
        lock_landscape(self.landscape).landscape_size()
    }

    pub fn landscape_height(&self) -> f32 {
        lock_landscape(self.landscape).landscape_height()
    }

    pub fn heightmap_updater(&self) -> HeightmapUpdater {
        HeightmapUpdater::new(self.landscape.clone(), self.overrides.clone())
    }
}

/// One incremental brush application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushDab {
    /// Landscape UV of the cursor (y flipped to texture space) and the brush
    /// size.
    pub cursor_uv_size: Vec3,
    /// (sin, cos) of the brush rotation.
    pub rotation: Vec2,
    pub invert_factor: f32,
    /// Region touched by this dab, normalized landscape UV.
    pub apply_rect: Rect,
    pub reference_uv: Vec4,
    pub clone_offset: Option<Vec2>,
}

/// GPU side of a tool: snapshots before a stroke, dabs during it and the
/// undo command after it.
pub trait BrushApplicant: Send + Sync {
    fn store_snapshots(&mut self, ctx: &EditContext);

    /// Must tolerate a zero area `dab.apply_rect`.
    fn apply_brush(&mut self, ctx: &EditContext, dab: &BrushDab);

    /// `operation_rect` is the union of every dab rect of the stroke.
    fn create_diff_command(
        &mut self,
        ctx: &EditContext,
        operation_rect: Rect,
    ) -> Option<Box<dyn EditorCommand>>;

    /// Called for every command executed in the document, not only ours.
    fn on_command_executed(&mut self, ctx: &EditContext, notification: &CommandNotification);

    /// The stroke was dropped without a diff command. Everything drawn or
    /// edited since `store_snapshots` must be undone.
    fn cancel_operation(&mut self, ctx: &EditContext);
}
