use std::collections::BTreeMap;

use bevy::math::{Vec2, Vec3, Vec4};

use crate::gpu::TextureHandle;

/// Shader slot and uniform names shared by the landscape material and the
/// brush phases.
pub mod names {
    pub const LANDSCAPE_BRUSH_FX: &str = "~res:/Materials2/LandscapeBrush.material";

    pub const CURSOR_FLAG: &str = "LANDSCAPE_CURSOR_V2";
    pub const COVER_FLAG: &str = "LANDSCAPE_COVER_TEXTURE";

    pub const CURSOR_TEXTURE_SLOT: &str = "cursorTexture";
    pub const COVER_TEXTURE_SLOT: &str = "coverTexture";
    pub const CURSOR_COLOR_PROP: &str = "landCursorColor";
    pub const CURSOR_POS_PROP: &str = "landCursorPosition";
    pub const CURSOR_ROTATION_PROP: &str = "cursorRotation";

    pub const BRUSH_TEXTURE_SLOT: &str = "brushTexture";
    pub const BRUSH_CURSOR_UV_PROP: &str = "cursorUV";
    pub const BRUSH_ROTATION_PROP: &str = "brushRotation";
    pub const BRUSH_INVERT_PROP: &str = "invertFactor";
    pub const BRUSH_PARAMS_PROP: &str = "params";
    pub const BRUSH_KERNEL_PROP: &str = "kernel";
    pub const BRUSH_UV_POS_PROP: &str = "uvPos";
    pub const BRUSH_CLONE_OFFSET_PROP: &str = "cloneOffset";
    pub const LANDSCAPE_PARAMS_PROP: &str = "landscapeParams";

    pub const R32F_TO_MORPH_FLAG: &str = "R32F_TO_MORPH";
    pub const MORPH_TO_R32F_FLAG: &str = "MORPH_TO_R32F";
    pub const GENERATE_TANGENT_MAP_FLAG: &str = "GENERATE_TANGENT_MAP";

    pub const TEXTURE0_SLOT: &str = "texture0";
    pub const TEXTURE1_SLOT: &str = "texture1";
    pub const MIP_TEXTURE_SIZE_PROP: &str = "mipTextureSize";
    pub const FLOAT_TEXTURE_SIZE_PROP: &str = "floatTextureSize";
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialProperty {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

/// Local flags, texture slots and uniforms of one material.
///
/// Only locally added entries are tracked; whatever the material inherits
/// from its fx template is the renderer's business.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    fx_name: String,
    flags: BTreeMap<String, i32>,
    textures: BTreeMap<String, TextureHandle>,
    properties: BTreeMap<String, MaterialProperty>,
}

impl Material {
    pub fn new(fx_name: impl Into<String>) -> Self {
        Self {
            fx_name: fx_name.into(),
            ..Default::default()
        }
    }

    pub fn fx_name(&self) -> &str {
        &self.fx_name
    }

    pub fn add_flag(&mut self, name: &str, value: i32) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn remove_flag(&mut self, name: &str) -> Option<i32> {
        self.flags.remove(name)
    }

    pub fn has_local_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn flag(&self, name: &str) -> Option<i32> {
        self.flags.get(name).copied()
    }

    pub fn local_flag_count(&self) -> usize {
        self.flags.len()
    }

    pub fn add_texture(&mut self, slot: &str, texture: TextureHandle) {
        self.textures.insert(slot.to_string(), texture);
    }

    /// Replaces the texture of an existing local slot.
    pub fn set_texture(&mut self, slot: &str, texture: TextureHandle) {
        debug_assert!(self.has_local_texture(slot), "no local texture slot `{slot}`");
        if let Some(current) = self.textures.get_mut(slot) {
            *current = texture;
        }
    }

    pub fn remove_texture(&mut self, slot: &str) -> Option<TextureHandle> {
        self.textures.remove(slot)
    }

    pub fn has_local_texture(&self, slot: &str) -> bool {
        self.textures.contains_key(slot)
    }

    pub fn texture(&self, slot: &str) -> Option<TextureHandle> {
        self.textures.get(slot).copied()
    }

    pub fn local_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn add_property(&mut self, name: &str, value: MaterialProperty) {
        self.properties.insert(name.to_string(), value);
    }

    /// Updates the value of an existing local property. Returns false when
    /// the property was never added.
    pub fn set_property_value(&mut self, name: &str, value: MaterialProperty) -> bool {
        match self.properties.get_mut(name) {
            Some(current) => {
                *current = value;
                true
            }
            None => false,
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<MaterialProperty> {
        self.properties.remove(name)
    }

    pub fn has_local_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn property(&self, name: &str) -> Option<MaterialProperty> {
        self.properties.get(name).copied()
    }

    pub fn local_property_count(&self) -> usize {
        self.properties.len()
    }
}
