//! Heightmap sculpting tools.
//!
//! Every height tool renders the same way: a tool specific phase writes the
//! new heights into a float texture, then the float texture is packed back
//! into every mip of the morph heightmap and the tangent map is regenerated
//! from it. Only the first phase differs between tools.

use std::path::{Path, PathBuf};

use bevy::input::keyboard::KeyCode;
use bevy::log::{debug, info, warn};
use bevy::math::{Rect, Vec2, Vec4};

use crate::applicant::{BrushApplicant, BrushDab, EditContext};
use crate::commands::{CommandKind, CommandNotification, EditorCommand, HeightmapDiffCommand};
use crate::error::{BrushEditorError, BrushResult};
use crate::gpu::{BrushDraw, GpuBackend, TextureDescriptor, TextureFormat, TextureHandle};
use crate::heightmap::{pixel_region, HeightMap, HeightMapU16};
use crate::input::{
    BrushInputController, CloneOffsetController, FrozenReferenceController,
    KeyboardInputController,
};
use crate::landscape::{LandscapeTextureSemantic, TextureSlot};
use crate::material::{names, Material, MaterialProperty};
use crate::render_helper::{brush_material, BrushPhase, BrushRenderHelper};
use crate::settings::ToolSettings;
use crate::tool::LandscapeTool;

const BASE_SETTINGS_SECTION: &str = "BaseHeightEditTool";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeightBrushKind {
    AddSub,
    Flatten,
    Smooth,
    Sharpen,
    Noise,
    Average,
    CloneStamp,
    PushPull,
    RaiseLower,
    Set,
}

impl HeightBrushKind {
    pub const fn id(self) -> &'static str {
        match self {
            HeightBrushKind::AddSub => "HeightAddSubTool",
            HeightBrushKind::Flatten => "HeightFlattenTool",
            HeightBrushKind::Smooth => "HeightSmoothTool",
            HeightBrushKind::Sharpen => "HeightSharpenTool",
            HeightBrushKind::Noise => "HeightNoiseTool",
            HeightBrushKind::Average => "HeightAverageTool",
            HeightBrushKind::CloneStamp => "HeightCloneStampTool",
            HeightBrushKind::PushPull => "HeightPushPullTool",
            HeightBrushKind::RaiseLower => "HeightRaiseLowerTool",
            HeightBrushKind::Set => "HeightSetTool",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            HeightBrushKind::AddSub => "Add / subtract height",
            HeightBrushKind::Flatten => "Flatten",
            HeightBrushKind::Smooth => "Smooth",
            HeightBrushKind::Sharpen => "Sharpen",
            HeightBrushKind::Noise => "Noise",
            HeightBrushKind::Average => "Average height",
            HeightBrushKind::CloneStamp => "Clone stamp",
            HeightBrushKind::PushPull => "Push / pull",
            HeightBrushKind::RaiseLower => "Raise / lower",
            HeightBrushKind::Set => "Set height",
        }
    }

    pub const fn sort_key(self) -> i32 {
        match self {
            HeightBrushKind::AddSub => 100,
            HeightBrushKind::RaiseLower => 95,
            HeightBrushKind::Set => 90,
            HeightBrushKind::Flatten => 80,
            HeightBrushKind::Smooth => 70,
            HeightBrushKind::Sharpen => 60,
            HeightBrushKind::Noise => 50,
            HeightBrushKind::Average => 40,
            HeightBrushKind::CloneStamp => 30,
            HeightBrushKind::PushPull => 20,
        }
    }

    /// Shader flag selecting the tool phase.
    pub const fn shader_flag(self) -> &'static str {
        match self {
            HeightBrushKind::AddSub => "HEIGHT_ADD_SUB",
            HeightBrushKind::Flatten => "HEIGHT_FLATTEN",
            HeightBrushKind::Smooth => "HEIGHT_SMOOTH",
            HeightBrushKind::Sharpen => "HEIGHT_SHARPEN",
            HeightBrushKind::Noise => "HEIGHT_NOISE",
            HeightBrushKind::Average => "HEIGHT_AVERAGE",
            HeightBrushKind::CloneStamp => "HEIGHT_CLONE",
            HeightBrushKind::PushPull => "HEIGHT_PUSH_PULL",
            HeightBrushKind::RaiseLower => "HEIGHT_RAISE_LOWER",
            HeightBrushKind::Set => "HEIGHT_SET",
        }
    }

    pub const fn uses_kernel(self) -> bool {
        matches!(
            self,
            HeightBrushKind::Smooth | HeightBrushKind::Sharpen | HeightBrushKind::Average
        )
    }

    fn input_controller(self) -> Box<dyn BrushInputController> {
        let mut keyboard = KeyboardInputController::default()
            .with_keyboard_control(KeyCode::KeyY, 1.0)
            .with_keyboard_control(KeyCode::KeyH, 1.0)
            .with_keyboard_control(KeyCode::KeyN, 0.1);

        if self.uses_kernel() {
            keyboard.add_keyboard_control(KeyCode::KeyK, 0.1);
            keyboard.add_keyboard_control(KeyCode::KeyI, 0.1);
        }

        match self {
            HeightBrushKind::CloneStamp => Box::new(CloneOffsetController::new(keyboard)),
            HeightBrushKind::Average => Box::new(FrozenReferenceController::new(keyboard, false)),
            _ => Box::new(keyboard),
        }
    }
}

/// How the average tool picks its reference height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AverageMode {
    /// Follows the cursor.
    #[default]
    Continuous,
    /// Sampled once where the stroke began.
    Single,
}

impl AverageMode {
    fn to_setting(self) -> i64 {
        match self {
            AverageMode::Continuous => 0,
            AverageMode::Single => 1,
        }
    }

    fn from_setting(value: i64) -> Self {
        match value {
            1 => AverageMode::Single,
            _ => AverageMode::Continuous,
        }
    }
}

/// Normalized brush parameters, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightBrushParams {
    pub size: f32,
    pub rotation: f32,
    pub strength: f32,
    pub kernel_size: f32,
    pub kernel_strength: f32,
    pub target_height: f32,
}

impl Default for HeightBrushParams {
    fn default() -> Self {
        Self {
            size: 0.05,
            rotation: 0.0,
            strength: 0.1,
            kernel_size: 0.5,
            kernel_strength: 0.5,
            target_height: 0.5,
        }
    }
}

pub struct HeightEditTool {
    kind: HeightBrushKind,
    params: HeightBrushParams,
    average_mode: AverageMode,
    brush_path: Option<PathBuf>,
    cursor_texture: Option<TextureHandle>,
    controller: Box<dyn BrushInputController>,
    applicant: Option<HeightBrushApplicant>,
    landscape_size: f32,
    landscape_height: f32,
}

impl HeightEditTool {
    pub fn new(kind: HeightBrushKind) -> Self {
        Self {
            kind,
            params: HeightBrushParams::default(),
            average_mode: AverageMode::default(),
            brush_path: None,
            cursor_texture: None,
            controller: kind.input_controller(),
            applicant: None,
            landscape_size: 1.0,
            landscape_height: 1.0,
        }
    }

    pub fn kind(&self) -> HeightBrushKind {
        self.kind
    }

    pub fn params(&self) -> &HeightBrushParams {
        &self.params
    }

    pub fn brush_path(&self) -> Option<&Path> {
        self.brush_path.as_deref()
    }

    pub fn strength(&self) -> f32 {
        self.params.strength
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.params.strength = strength.clamp(0.0, 1.0);
        self.push_params();
    }

    /// World units, valid while active.
    pub fn brush_radius(&self) -> f32 {
        self.params.size * self.landscape_size
    }

    pub fn set_brush_radius(&mut self, radius: f32) {
        self.set_brush_size(radius / self.landscape_size);
    }

    pub fn strength_in_meters(&self) -> f32 {
        self.params.strength * self.landscape_height
    }

    pub fn set_strength_in_meters(&mut self, meters: f32) {
        self.set_strength(meters / self.landscape_height);
    }

    pub fn rotation_angle(&self) -> f32 {
        self.params.rotation * 360.0
    }

    pub fn set_rotation_angle(&mut self, degrees: f32) {
        self.set_brush_rotation(degrees / 360.0);
    }

    pub fn set_kernel_size(&mut self, kernel_size: f32) {
        self.params.kernel_size = kernel_size.clamp(0.0, 1.0);
        self.push_params();
    }

    pub fn set_kernel_strength(&mut self, kernel_strength: f32) {
        self.params.kernel_strength = kernel_strength.clamp(0.0, 1.0);
        self.push_params();
    }

    pub fn set_target_height(&mut self, target_height: f32) {
        self.params.target_height = target_height.clamp(0.0, 1.0);
        self.push_params();
    }

    pub fn average_mode(&self) -> AverageMode {
        self.average_mode
    }

    pub fn set_average_mode(&mut self, mode: AverageMode) {
        self.average_mode = mode;
        self.controller
            .set_reference_frozen(mode == AverageMode::Single);
    }

    pub fn height_applicant(&self) -> Option<&HeightBrushApplicant> {
        self.applicant.as_ref()
    }

    fn push_params(&mut self) {
        let params = self.params;
        let landscape_height = self.landscape_height;
        if let Some(applicant) = self.applicant.as_mut() {
            applicant.set_params(&params, landscape_height);
        }
    }

    fn load_settings(&mut self, ctx: &EditContext, settings: &ToolSettings) {
        let defaults = HeightBrushParams::default();

        let base = settings.section(BASE_SETTINGS_SECTION);
        self.brush_path = base
            .and_then(|section| section.get_text("brushTexture"))
            .map(PathBuf::from)
            .or_else(|| first_brush_texture(&ctx.config.brush_texture_folder));
        if let Some(base) = base {
            self.params.rotation = base.get_f32("brushRotation", defaults.rotation);
            self.params.size = base.get_f32("brushSize", defaults.size);
            self.params.strength = base.get_f32("strength", defaults.strength);
        }

        if let Some(section) = settings.section(self.kind.id()) {
            self.params.kernel_size = section.get_f32("kernelSize", defaults.kernel_size);
            self.params.kernel_strength =
                section.get_f32("kernelStrength", defaults.kernel_strength);
            self.params.target_height = section.get_f32("targetHeight", defaults.target_height);
            self.average_mode = AverageMode::from_setting(section.get_i64("averageMode", 0));
        }
    }

    fn save_settings(&self, settings: &mut ToolSettings) {
        let base = settings.section_mut(BASE_SETTINGS_SECTION);
        if let Some(path) = &self.brush_path {
            base.set_text("brushTexture", path.to_string_lossy());
        }
        base.set_f32("brushRotation", self.params.rotation);
        base.set_f32("brushSize", self.params.size);
        base.set_f32("strength", self.params.strength);

        let section = settings.section_mut(self.kind.id());
        if self.kind.uses_kernel() {
            section.set_f32("kernelSize", self.params.kernel_size);
            section.set_f32("kernelStrength", self.params.kernel_strength);
        }
        match self.kind {
            HeightBrushKind::Set => section.set_f32("targetHeight", self.params.target_height),
            HeightBrushKind::Average => {
                section.set_i64("averageMode", self.average_mode.to_setting())
            }
            _ => {}
        }
    }
}

/// First file of the brush folder, by name.
fn first_brush_texture(folder: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files.into_iter().next()
}

impl LandscapeTool for HeightEditTool {
    fn id(&self) -> &'static str {
        self.kind.id()
    }

    fn display_name(&self) -> &'static str {
        self.kind.display_name()
    }

    fn sort_key(&self) -> i32 {
        self.kind.sort_key()
    }

    fn activate(&mut self, ctx: &EditContext, settings: &ToolSettings) -> BrushResult<()> {
        self.load_settings(ctx, settings);

        self.cursor_texture = match &self.brush_path {
            Some(path) => match ctx.backend.load_texture(path) {
                Ok(texture) => Some(texture),
                Err(err) => {
                    warn!("{}: {err}", self.kind.id());
                    None
                }
            },
            None => None,
        };

        self.landscape_size = ctx.landscape_size();
        self.landscape_height = ctx.landscape_height();

        let applicant = match HeightBrushApplicant::create(ctx, self.kind, self.cursor_texture) {
            Ok(applicant) => applicant,
            Err(err) => {
                if let Some(cursor) = self.cursor_texture.take() {
                    ctx.backend.release_texture(cursor);
                }
                return Err(err);
            }
        };
        self.applicant = Some(applicant);

        let mode = self.average_mode;
        self.set_average_mode(mode);
        self.push_params();

        info!("{} activated", self.kind.id());
        Ok(())
    }

    fn deactivate(&mut self, ctx: &EditContext, settings: &mut ToolSettings) {
        if let Some(applicant) = self.applicant.take() {
            applicant.release(ctx.backend);
        }
        if let Some(cursor) = self.cursor_texture.take() {
            ctx.backend.release_texture(cursor);
        }

        self.save_settings(settings);
        info!("{} deactivated", self.kind.id());
    }

    fn process(&mut self, _delta_seconds: f32) {
        let adjustments = self.controller.take_adjustments();
        if adjustments.is_empty() {
            return;
        }

        for adjustment in adjustments {
            let params = &mut self.params;
            let value = match adjustment.key {
                KeyCode::KeyY => &mut params.rotation,
                KeyCode::KeyH => &mut params.size,
                KeyCode::KeyN => &mut params.strength,
                KeyCode::KeyK => &mut params.kernel_size,
                KeyCode::KeyI => &mut params.kernel_strength,
                _ => continue,
            };
            *value = (*value + adjustment.delta).clamp(0.0, 1.0);
        }

        self.push_params();
    }

    fn input_controller(&self) -> &dyn BrushInputController {
        self.controller.as_ref()
    }

    fn input_controller_mut(&mut self) -> &mut dyn BrushInputController {
        self.controller.as_mut()
    }

    fn applicant(&mut self) -> Option<&mut dyn BrushApplicant> {
        self.applicant
            .as_mut()
            .map(|applicant| applicant as &mut dyn BrushApplicant)
    }

    fn cursor_texture(&self) -> Option<TextureHandle> {
        self.cursor_texture
    }

    fn brush_size(&self) -> f32 {
        self.params.size
    }

    fn set_brush_size(&mut self, size: f32) {
        self.params.size = size.clamp(0.0, 1.0);
    }

    fn brush_rotation(&self) -> f32 {
        self.params.rotation
    }

    fn set_brush_rotation(&mut self, rotation: f32) {
        self.params.rotation = rotation.clamp(0.0, 1.0);
    }
}

/// GPU resources and phases of an active height tool.
pub struct HeightBrushApplicant {
    kind: HeightBrushKind,
    float_texture: TextureHandle,
    morph_texture: TextureHandle,
    normal_texture: Option<TextureHandle>,
    snapshot: Option<TextureHandle>,
    phases: Vec<BrushPhase>,
}

impl HeightBrushApplicant {
    /// Allocates the working textures and overrides the landscape heightmap
    /// (and tangent map, if it has one) with them.
    pub fn create(
        ctx: &EditContext,
        kind: HeightBrushKind,
        brush_texture: Option<TextureHandle>,
    ) -> BrushResult<Self> {
        let heightmaps = ctx.texture_count(LandscapeTextureSemantic::Heightmap);
        if heightmaps != 1 {
            return Err(BrushEditorError::UnsupportedHeightmapLayout { found: heightmaps });
        }

        let height = ctx
            .original_texture(TextureSlot::HEIGHTMAP)
            .ok_or(BrushEditorError::UnsupportedHeightmapLayout { found: 0 })?;
        let height_descriptor = ctx
            .backend
            .texture_descriptor(height)
            .ok_or(BrushEditorError::MissingTexture(height))?;

        let float_texture = ctx.backend.create_texture(&TextureDescriptor {
            format: TextureFormat::R32F,
            mip_levels: 1,
            needs_readback: true,
            ..height_descriptor.clone()
        });
        copy_height_to_float(ctx.backend, height, float_texture);

        let morph_texture = ctx.backend.create_texture(&TextureDescriptor {
            needs_readback: true,
            ..height_descriptor.clone()
        });
        ctx.backend.copy_texture(height, morph_texture);

        let tangent = ctx.original_texture(TextureSlot::TANGENT);
        let normal_texture = tangent
            .and_then(|tangent| ctx.backend.texture_descriptor(tangent).map(|d| (tangent, d)))
            .map(|(tangent, descriptor)| {
                let normal = ctx.backend.create_texture(&TextureDescriptor {
                    needs_readback: true,
                    ..descriptor
                });
                ctx.backend.copy_texture(tangent, normal);
                normal
            });

        ctx.set_override_texture(TextureSlot::HEIGHTMAP, morph_texture);
        if let Some(normal) = normal_texture {
            ctx.set_override_texture(TextureSlot::TANGENT, normal);
        }

        let mut applicant = Self {
            kind,
            float_texture,
            morph_texture,
            normal_texture,
            snapshot: None,
            phases: Vec::new(),
        };
        applicant.build_phases(ctx, &height_descriptor, brush_texture);
        Ok(applicant)
    }

    fn build_phases(
        &mut self,
        ctx: &EditContext,
        height_descriptor: &TextureDescriptor,
        brush_texture: Option<TextureHandle>,
    ) {
        let landscape_size = ctx.landscape_size();
        let landscape_height = ctx.landscape_height();

        let mut tool = brush_material(Some(self.kind.shader_flag()));
        if let Some(brush) = brush_texture {
            tool.add_texture(names::BRUSH_TEXTURE_SLOT, brush);
        }
        tool.add_texture(names::TEXTURE0_SLOT, self.morph_texture);
        tool.add_property(names::BRUSH_PARAMS_PROP, MaterialProperty::Vec4(Vec4::ZERO));
        tool.add_property(names::BRUSH_KERNEL_PROP, MaterialProperty::Vec2(Vec2::ZERO));
        tool.add_property(names::BRUSH_UV_POS_PROP, MaterialProperty::Vec2(Vec2::ZERO));
        if self.kind == HeightBrushKind::CloneStamp {
            tool.add_property(names::BRUSH_CLONE_OFFSET_PROP, MaterialProperty::Vec2(Vec2::ZERO));
        }
        tool.add_property(
            names::LANDSCAPE_PARAMS_PROP,
            MaterialProperty::Vec4(Vec4::new(landscape_size, landscape_height, 0.0, 0.0)),
        );
        self.phases.push(BrushPhase::new(tool, self.float_texture, 0));

        let float_width = height_descriptor.width;
        for mip in 0..height_descriptor.mip_levels.max(1) {
            let mut material = Material::new(names::LANDSCAPE_BRUSH_FX);
            material.add_flag(names::R32F_TO_MORPH_FLAG, 1);
            material.add_texture(names::TEXTURE0_SLOT, self.float_texture);
            material.add_property(
                names::MIP_TEXTURE_SIZE_PROP,
                MaterialProperty::Float((float_width >> mip) as f32),
            );
            self.phases.push(BrushPhase::new(material, self.morph_texture, mip));
        }

        let Some(normal) = self.normal_texture else {
            return;
        };
        let normal_mips = ctx
            .backend
            .texture_descriptor(normal)
            .map_or(1, |descriptor| descriptor.mip_levels.max(1));
        for mip in 0..normal_mips {
            let mut material = Material::new(names::LANDSCAPE_BRUSH_FX);
            material.add_flag(names::GENERATE_TANGENT_MAP_FLAG, 1);
            material.add_texture(names::TEXTURE1_SLOT, self.morph_texture);
            material.add_property(
                names::FLOAT_TEXTURE_SIZE_PROP,
                MaterialProperty::Float(float_width as f32),
            );
            material.add_property(
                names::LANDSCAPE_PARAMS_PROP,
                MaterialProperty::Vec4(Vec4::new(
                    landscape_size,
                    landscape_height,
                    (float_width >> mip) as f32,
                    0.0,
                )),
            );
            self.phases.push(BrushPhase::new(material, normal, mip));
        }
    }

    pub fn set_params(&mut self, params: &HeightBrushParams, landscape_height: f32) {
        let Some(tool) = self.phases.first_mut() else {
            return;
        };

        tool.material.set_property_value(
            names::BRUSH_PARAMS_PROP,
            MaterialProperty::Vec4(Vec4::new(
                params.strength * landscape_height,
                params.target_height * landscape_height,
                0.0,
                0.0,
            )),
        );
        tool.material.set_property_value(
            names::BRUSH_KERNEL_PROP,
            MaterialProperty::Vec2(Vec2::new(params.kernel_size, params.kernel_strength)),
        );
    }

    pub fn phases(&self) -> &[BrushPhase] {
        &self.phases
    }

    pub fn float_texture(&self) -> TextureHandle {
        self.float_texture
    }

    pub fn morph_texture(&self) -> TextureHandle {
        self.morph_texture
    }

    pub fn normal_texture(&self) -> Option<TextureHandle> {
        self.normal_texture
    }

    pub fn snapshot_texture(&self) -> Option<TextureHandle> {
        self.snapshot
    }

    pub fn release(self, backend: &dyn GpuBackend) {
        backend.release_texture(self.float_texture);
        backend.release_texture(self.morph_texture);
        if let Some(normal) = self.normal_texture {
            backend.release_texture(normal);
        }
        if let Some(snapshot) = self.snapshot {
            backend.release_texture(snapshot);
        }
    }
}

fn copy_height_to_float(
    backend: &dyn GpuBackend,
    height: TextureHandle,
    float_texture: TextureHandle,
) {
    let mut material = Material::new(names::LANDSCAPE_BRUSH_FX);
    material.add_flag(names::MORPH_TO_R32F_FLAG, 1);
    material.add_texture(names::TEXTURE0_SLOT, height);

    let draw = BrushDraw {
        target: float_texture,
        target_level: 0,
        material: &material,
        scissor: None,
    };
    if let Err(err) = backend.draw_brush(&draw) {
        debug!("height to float conversion skipped: {err}");
    }
}

impl HeightBrushApplicant {
    /// Rebuilds the float, morph and normal copies from the landscape's own
    /// textures, discarding every dab drawn since.
    fn refresh_working_textures(&self, ctx: &EditContext) {
        if let Some(height) = ctx.original_texture(TextureSlot::HEIGHTMAP) {
            copy_height_to_float(ctx.backend, height, self.float_texture);
            ctx.backend.copy_texture(height, self.morph_texture);
        }
        if let (Some(tangent), Some(normal)) =
            (ctx.original_texture(TextureSlot::TANGENT), self.normal_texture)
        {
            ctx.backend.copy_texture(tangent, normal);
        }
    }
}

impl BrushApplicant for HeightBrushApplicant {
    fn store_snapshots(&mut self, ctx: &EditContext) {
        let Some(height) = ctx.original_texture(TextureSlot::HEIGHTMAP) else {
            return;
        };

        let snapshot = match self.snapshot {
            Some(snapshot) => snapshot,
            None => {
                let Some(descriptor) = ctx.backend.texture_descriptor(height) else {
                    return;
                };
                let snapshot = ctx.backend.create_texture(&TextureDescriptor::readback_target(
                    descriptor.width,
                    descriptor.height,
                    TextureFormat::Rgba8,
                ));
                self.snapshot = Some(snapshot);
                snapshot
            }
        };

        ctx.backend.copy_texture(height, snapshot);
    }

    fn apply_brush(&mut self, ctx: &EditContext, dab: &BrushDab) {
        BrushRenderHelper::apply_brush(ctx.backend, &mut self.phases, dab);
    }

    fn create_diff_command(
        &mut self,
        ctx: &EditContext,
        operation_rect: Rect,
    ) -> Option<Box<dyn EditorCommand>> {
        let snapshot = self.snapshot?;
        let descriptor = ctx.backend.texture_descriptor(snapshot)?;
        debug_assert_eq!(
            ctx.backend
                .texture_descriptor(self.morph_texture)
                .map(|morph| morph.size()),
            Some(descriptor.size())
        );

        let region = pixel_region(operation_rect, descriptor.size())?;

        let read = |texture: TextureHandle| match ctx.backend.read_texture_region(texture, region) {
            Ok(image) => Some(HeightMapU16::load_from_image(&image)),
            Err(err) => {
                warn!("heightmap diff readback failed: {err}");
                None
            }
        };
        let before = read(snapshot)?;
        let after = read(self.morph_texture)?;

        let command = HeightmapDiffCommand::new(ctx.heightmap_updater(), before, after, region)?;
        Some(Box::new(command))
    }

    fn on_command_executed(&mut self, ctx: &EditContext, notification: &CommandNotification) {
        if notification.kind != CommandKind::ModifyHeightmap {
            return;
        }
        self.refresh_working_textures(ctx);
    }

    fn cancel_operation(&mut self, ctx: &EditContext) {
        self.refresh_working_textures(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{BrushInputEvent, InputModifiers};

    fn key(key: KeyCode, pressed: bool) -> BrushInputEvent {
        let modifiers = InputModifiers::empty();
        if pressed {
            BrushInputEvent::KeyPressed { key, modifiers }
        } else {
            BrushInputEvent::KeyReleased { key, modifiers }
        }
    }

    fn drag(tool: &mut HeightEditTool, pin: KeyCode, dy: f32) {
        let controller = tool.input_controller_mut();
        controller.on_input(&BrushInputEvent::CursorMoved {
            position: Vec2::new(0.5, 0.5),
            modifiers: InputModifiers::empty(),
        });
        controller.on_input(&key(pin, true));
        controller.on_input(&BrushInputEvent::CursorMoved {
            position: Vec2::new(0.5, 0.5 - dy),
            modifiers: InputModifiers::empty(),
        });
        controller.on_input(&key(pin, false));
        tool.process(0.016);
    }

    #[test]
    fn keyboard_pins_adjust_and_saturate_parameters() {
        let mut tool = HeightEditTool::new(HeightBrushKind::AddSub);
        let strength = tool.strength();

        drag(&mut tool, KeyCode::KeyN, 0.5);
        assert!((tool.strength() - (strength + 0.05)).abs() < 1e-5);

        drag(&mut tool, KeyCode::KeyH, 2.0);
        assert_eq!(tool.brush_size(), 1.0);

        drag(&mut tool, KeyCode::KeyY, -0.5);
        assert_eq!(tool.brush_rotation(), 0.0);
    }

    #[test]
    fn kernel_keys_only_belong_to_kernel_tools() {
        let mut smooth = HeightEditTool::new(HeightBrushKind::Smooth);
        let kernel = smooth.params().kernel_size;
        drag(&mut smooth, KeyCode::KeyK, 0.5);
        assert!((smooth.params().kernel_size - (kernel + 0.05)).abs() < 1e-5);

        let mut add = HeightEditTool::new(HeightBrushKind::AddSub);
        let kernel = add.params().kernel_size;
        drag(&mut add, KeyCode::KeyK, 0.5);
        assert_eq!(add.params().kernel_size, kernel);
    }

    #[test]
    fn unit_conversions_follow_the_landscape_dimensions() {
        let mut tool = HeightEditTool::new(HeightBrushKind::Set);
        tool.landscape_size = 2000.0;
        tool.landscape_height = 50.0;

        tool.set_brush_radius(100.0);
        assert!((tool.brush_size() - 0.05).abs() < 1e-6);
        assert!((tool.brush_radius() - 100.0).abs() < 1e-3);

        tool.set_strength_in_meters(500.0);
        assert_eq!(tool.strength(), 1.0);

        tool.set_rotation_angle(90.0);
        assert!((tool.brush_rotation() - 0.25).abs() < 1e-6);
        assert!((tool.rotation_angle() - 90.0).abs() < 1e-4);
    }

    #[test]
    fn single_average_mode_freezes_the_reference() {
        let mut tool = HeightEditTool::new(HeightBrushKind::Average);
        tool.set_average_mode(AverageMode::Single);

        let begin = Vec4::new(0.2, 0.2, 0.0, 0.0);
        let controller = tool.input_controller_mut();
        controller.begin_operation(begin);
        controller.update_current_cursor_uv(Vec4::new(0.6, 0.6, 0.0, 0.0));

        assert_eq!(tool.input_controller().reference_cursor_uv(), begin);
    }

    #[test]
    fn settings_round_trip_through_the_store() {
        let mut tool = HeightEditTool::new(HeightBrushKind::Average);
        tool.params.size = 0.3;
        tool.params.kernel_strength = 0.9;
        tool.average_mode = AverageMode::Single;
        tool.brush_path = Some("brushes/soft.png".into());

        let mut settings = ToolSettings::default();
        tool.save_settings(&mut settings);

        let base = settings.section(BASE_SETTINGS_SECTION).unwrap();
        assert_eq!(base.get_f32("brushSize", 0.0), 0.3);
        assert_eq!(base.get_text("brushTexture"), Some("brushes/soft.png"));

        let section = settings.section("HeightAverageTool").unwrap();
        assert_eq!(section.get_f32("kernelStrength", 0.0), 0.9);
        assert_eq!(section.get_i64("averageMode", 0), 1);
    }
}
