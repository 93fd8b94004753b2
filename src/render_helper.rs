use bevy::log::{debug, warn};
use bevy::math::Vec2;

use crate::applicant::BrushDab;
use crate::error::BrushEditorError;
use crate::gpu::{BrushDraw, GpuBackend, TextureHandle};
use crate::material::{names, Material, MaterialProperty};

/// One draw of a dab: a material rendered into one level of a target.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushPhase {
    pub material: Material,
    pub target: TextureHandle,
    pub target_level: u32,
}

impl BrushPhase {
    pub fn new(material: Material, target: TextureHandle, target_level: u32) -> Self {
        Self {
            material,
            target,
            target_level,
        }
    }
}

pub struct BrushRenderHelper;

impl BrushRenderHelper {
    /// Pushes the dab parameters into every phase that declares them and
    /// draws the phases in order, scissored to the dab rect.
    ///
    /// A material that is not ready drops the rest of the dab. Returns
    /// whether every phase was drawn.
    pub fn apply_brush(
        backend: &dyn GpuBackend,
        phases: &mut [BrushPhase],
        dab: &BrushDab,
    ) -> bool {
        if dab.apply_rect.is_empty() {
            return false;
        }

        for phase in phases.iter_mut() {
            Self::set_dab_properties(&mut phase.material, dab);

            let draw = BrushDraw {
                target: phase.target,
                target_level: phase.target_level,
                material: &phase.material,
                scissor: Some(dab.apply_rect),
            };

            match backend.draw_brush(&draw) {
                Ok(()) => {}
                Err(BrushEditorError::MaterialNotReady(fx)) => {
                    debug!("skipping brush dab, material {fx} is not ready");
                    return false;
                }
                Err(err) => {
                    warn!("brush draw failed: {err}");
                    return false;
                }
            }
        }

        true
    }

    fn set_dab_properties(material: &mut Material, dab: &BrushDab) {
        material.set_property_value(
            names::BRUSH_CURSOR_UV_PROP,
            MaterialProperty::Vec3(dab.cursor_uv_size),
        );
        material.set_property_value(
            names::BRUSH_ROTATION_PROP,
            MaterialProperty::Vec2(dab.rotation),
        );
        material.set_property_value(
            names::BRUSH_INVERT_PROP,
            MaterialProperty::Float(dab.invert_factor),
        );
        material.set_property_value(
            names::BRUSH_UV_POS_PROP,
            MaterialProperty::Vec2(dab.reference_uv.truncate().truncate()),
        );
        if let Some(offset) = dab.clone_offset {
            material.set_property_value(
                names::BRUSH_CLONE_OFFSET_PROP,
                MaterialProperty::Vec2(offset),
            );
        }
    }
}

/// Material of a phase that only needs the dab parameters.
pub fn brush_material(flag: Option<&str>) -> Material {
    let mut material = Material::new(names::LANDSCAPE_BRUSH_FX);
    if let Some(flag) = flag {
        material.add_flag(flag, 1);
    }
    material.add_property(names::BRUSH_CURSOR_UV_PROP, MaterialProperty::Vec3(Default::default()));
    material.add_property(names::BRUSH_ROTATION_PROP, MaterialProperty::Vec2(Vec2::new(0.0, 1.0)));
    material.add_property(names::BRUSH_INVERT_PROP, MaterialProperty::Float(1.0));
    material
}
