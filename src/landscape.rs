use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bevy::math::URect;

use crate::gpu::TextureHandle;
use crate::material::Material;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LandscapeTextureSemantic {
    Heightmap,
    Tangent,
    Color,
    TileMask,
    Tile,
}

/// (semantic, index) key of one landscape texture slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureSlot {
    pub semantic: LandscapeTextureSemantic,
    pub index: usize,
}

impl TextureSlot {
    pub const HEIGHTMAP: TextureSlot = TextureSlot::new(LandscapeTextureSemantic::Heightmap, 0);
    pub const TANGENT: TextureSlot = TextureSlot::new(LandscapeTextureSemantic::Tangent, 0);

    pub const fn new(semantic: LandscapeTextureSemantic, index: usize) -> Self {
        Self { semantic, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    NoInstancing,
    Instancing,
    #[default]
    InstancingMorphing,
}

/// The terrain render object living in the scene graph.
pub trait Landscape: Send {
    fn texture(&self, slot: TextureSlot) -> Option<TextureHandle>;

    fn set_texture(&mut self, slot: TextureSlot, texture: TextureHandle);

    fn texture_count(&self, semantic: LandscapeTextureSemantic) -> usize;

    /// World size of one landscape side.
    fn landscape_size(&self) -> f32;

    /// World height mapped to the maximum heightmap value.
    fn landscape_height(&self) -> f32;

    fn render_mode(&self) -> RenderMode;

    fn material(&self) -> &Material;

    fn material_mut(&mut self) -> &mut Material;

    fn set_visible_in_picking_pass(&mut self, visible: bool);

    fn is_visible_in_picking_pass(&self) -> bool;

    /// Writes `data` (row major, `rect` sized) into the heightmap and
    /// refreshes whatever depends on it.
    fn update_heightmap(&mut self, data: &[u16], rect: URect);
}

pub type SharedLandscape = Arc<Mutex<dyn Landscape>>;

pub fn shared_landscape<L: Landscape + 'static>(landscape: L) -> SharedLandscape {
    Arc::new(Mutex::new(landscape))
}

/// A panic while the landscape was locked leaves it usable, so poisoning is
/// ignored.
pub fn lock_landscape(landscape: &SharedLandscape) -> MutexGuard<'_, dyn Landscape + 'static> {
    landscape.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn same_landscape(a: &SharedLandscape, b: &SharedLandscape) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}
