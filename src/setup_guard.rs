use std::sync::Arc;

use bevy::math::{Vec2, Vec4};

use crate::commands::{CommandKind, EditorCommand};
use crate::gpu::{GpuBackend, TextureHandle};
use crate::landscape::{lock_landscape, SharedLandscape};
use crate::material::{names, MaterialProperty};

/// Editor only wiring of the landscape while a tool is active: the picking
/// pass and the cursor/cover shader inputs.
///
/// Applied directly by the editor, never pushed to the undo stack. Inverted,
/// it strips the same wiring from a document about to be saved.
#[derive(Clone)]
pub struct LandscapeSetupGuard {
    landscape: SharedLandscape,
    backend: Arc<dyn GpuBackend>,
    cursor_texture: TextureHandle,
    cover_texture: Option<TextureHandle>,
    cursor_color: Vec4,
}

impl LandscapeSetupGuard {
    pub fn new(
        landscape: SharedLandscape,
        backend: Arc<dyn GpuBackend>,
        cursor_texture: TextureHandle,
        cover_texture: Option<TextureHandle>,
        cursor_color: Vec4,
    ) -> Self {
        Self {
            landscape,
            backend,
            cursor_texture,
            cover_texture,
            cursor_color,
        }
    }
}

impl EditorCommand for LandscapeSetupGuard {
    fn execute(&mut self) {
        self.backend.set_picking_pass(true);

        let mut landscape = lock_landscape(&self.landscape);
        landscape.set_visible_in_picking_pass(true);

        let material = landscape.material_mut();
        material.add_flag(names::CURSOR_FLAG, 1);
        if let Some(cover) = self.cover_texture {
            material.add_flag(names::COVER_FLAG, 1);
            material.add_texture(names::COVER_TEXTURE_SLOT, cover);
        }

        material.add_property(
            names::CURSOR_COLOR_PROP,
            MaterialProperty::Vec4(self.cursor_color),
        );
        material.add_texture(names::CURSOR_TEXTURE_SLOT, self.cursor_texture);
        material.add_property(names::CURSOR_POS_PROP, MaterialProperty::Vec4(Vec4::ZERO));
        material.add_property(
            names::CURSOR_ROTATION_PROP,
            MaterialProperty::Vec2(Vec2::new(0.0, 1.0)),
        );
    }

    fn undo(&mut self) {
        self.backend.set_picking_pass(false);

        let mut landscape = lock_landscape(&self.landscape);
        landscape.set_visible_in_picking_pass(false);

        let material = landscape.material_mut();
        material.remove_flag(names::CURSOR_FLAG);
        if self.cover_texture.is_some() {
            material.remove_flag(names::COVER_FLAG);
            material.remove_texture(names::COVER_TEXTURE_SLOT);
        }

        material.remove_property(names::CURSOR_COLOR_PROP);
        material.remove_texture(names::CURSOR_TEXTURE_SLOT);
        material.remove_property(names::CURSOR_POS_PROP);
        material.remove_property(names::CURSOR_ROTATION_PROP);
    }

    fn description(&self) -> &str {
        "Landscape editor setup"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::LandscapeSetup
    }
}
