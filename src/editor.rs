//! The brush stroke state machine.
//!
//! Input events only raise request flags. Once per frame [`LandscapeEditor::process`]
//! issues the cursor pick copy, resolves at most one stroke transition and
//! dabs the active tool's brush at the last decoded cursor UV.

use std::f32::consts::TAU;
use std::sync::Arc;

use bevy::log::{debug, info, warn};
use bevy::math::{Rect, URect, UVec2, Vec2, Vec3, Vec4};
use bevy::prelude::Resource;

use crate::applicant::{BrushDab, EditContext};
use crate::commands::{
    CommandExecutor, CommandNotification, EditorCommand, HeightmapUpdater, InputLock, Inverted,
};
use crate::editor_config::BrushEditorConfig;
use crate::error::{BrushEditorError, BrushResult};
use crate::gpu::{GpuBackend, TextureDescriptor, TextureFormat, TextureHandle};
use crate::heightmap::flip_to_storage;
use crate::input::{BrushInputEvent, BrushMouseButton, InputResponse};
use crate::landscape::{
    lock_landscape, same_landscape, LandscapeTextureSemantic, RenderMode, SharedLandscape,
    TextureSlot,
};
use crate::material::{names, MaterialProperty};
use crate::objects::SharedObjectLayer;
use crate::overrides::{lock_overrides, OriginalTexturesScope, SharedOverrides};
use crate::readback::ReadbackRing;
use crate::settings::ToolSettings;
use crate::setup_guard::LandscapeSetupGuard;
use crate::tool::{builtin_tools, instantiate_tools, LandscapeTool, ToolRegistration};

/// Everything lent to tools through an [`EditContext`].
struct EditorResources {
    backend: Arc<dyn GpuBackend>,
    config: BrushEditorConfig,
    overrides: SharedOverrides,
    objects: SharedObjectLayer,
}

impl EditorResources {
    fn context<'a>(&'a self, landscape: &'a SharedLandscape) -> EditContext<'a> {
        EditContext {
            backend: self.backend.as_ref(),
            landscape,
            overrides: &self.overrides,
            objects: &self.objects,
            config: &self.config,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct StrokeState {
    began: bool,
    begin_requested: bool,
    end_requested: bool,
    cancel_requested: bool,
    /// Union of every dab rect of the stroke.
    rect: Option<Rect>,
}

/// What the tool activation installed and deactivation has to take back.
struct ActiveTool {
    index: usize,
    guard: LandscapeSetupGuard,
    current_cursor: TextureHandle,
    cursor_color: Vec4,
    /// Default cursor loaded for a tool without its own.
    owned_cursor: Option<TextureHandle>,
}

#[derive(Resource)]
pub struct LandscapeEditor {
    resources: EditorResources,
    settings: ToolSettings,
    executor: Box<dyn CommandExecutor>,
    input_lock: Box<dyn InputLock>,
    landscape: Option<SharedLandscape>,
    tools: Vec<Box<dyn LandscapeTool>>,
    active: Option<ActiveTool>,
    readback: ReadbackRing,
    stroke: StrokeState,
    cursor_in_viewport: bool,
}

impl LandscapeEditor {
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        executor: Box<dyn CommandExecutor>,
        input_lock: Box<dyn InputLock>,
        config: BrushEditorConfig,
    ) -> Self {
        Self::with_tools(backend, executor, input_lock, config, &builtin_tools())
    }

    pub fn with_tools(
        backend: Arc<dyn GpuBackend>,
        executor: Box<dyn CommandExecutor>,
        input_lock: Box<dyn InputLock>,
        config: BrushEditorConfig,
        registrations: &[ToolRegistration],
    ) -> Self {
        let size = config.readback_texture_size.max(2);
        let readback = ReadbackRing::new(
            backend.clone(),
            TextureDescriptor::readback_target(size, size, TextureFormat::Rgba32F),
            config.readback_ring_size,
        );

        let settings = match &config.tool_settings_path {
            Some(path) if path.exists() => match ToolSettings::load_from_file(path) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!("{err:#}");
                    ToolSettings::default()
                }
            },
            _ => ToolSettings::default(),
        };

        Self {
            resources: EditorResources {
                backend,
                config,
                overrides: SharedOverrides::default(),
                objects: SharedObjectLayer::default(),
            },
            settings,
            executor,
            input_lock,
            landscape: None,
            tools: instantiate_tools(registrations),
            active: None,
            readback,
            stroke: StrokeState::default(),
            cursor_in_viewport: true,
        }
    }

    pub fn with_object_layer(mut self, objects: SharedObjectLayer) -> Self {
        self.resources.objects = objects;
        self
    }

    pub fn with_settings(mut self, settings: ToolSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn config(&self) -> &BrushEditorConfig {
        &self.resources.config
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn object_layer(&self) -> &SharedObjectLayer {
        &self.resources.objects
    }

    pub fn overrides(&self) -> &SharedOverrides {
        &self.resources.overrides
    }

    pub fn edited_landscape(&self) -> Option<&SharedLandscape> {
        self.landscape.as_ref()
    }

    pub fn available_tools(&self) -> impl Iterator<Item = &dyn LandscapeTool> + '_ {
        self.tools.iter().map(|tool| tool.as_ref())
    }

    pub fn active_tool(&self) -> Option<&dyn LandscapeTool> {
        let active = self.active.as_ref()?;
        Some(self.tools[active.index].as_ref())
    }

    pub fn active_tool_mut(&mut self) -> Option<&mut dyn LandscapeTool> {
        let active = self.active.as_ref()?;
        Some(self.tools[active.index].as_mut())
    }

    /// The OS cursor is hidden over the viewport while a tool is active.
    pub fn hides_system_cursor(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_operation_active(&self) -> bool {
        self.stroke.began
    }

    pub fn operation_rect(&self) -> Option<Rect> {
        self.stroke.rect
    }

    /// Live morphing is the only render mode the brushes can draw into.
    pub fn is_editing_allowed(&self) -> bool {
        self.landscape.as_ref().is_some_and(|landscape| {
            lock_landscape(landscape).render_mode() == RenderMode::InstancingMorphing
        })
    }

    /// Switches the edited landscape. Any change of landscape, leaving edit
    /// mode included, deactivates the active tool first: its setup guard is
    /// bound to the landscape it was installed on.
    pub fn prepare_for_edit(&mut self, landscape: Option<SharedLandscape>) {
        let same = match (&self.landscape, &landscape) {
            (Some(current), Some(next)) => same_landscape(current, next),
            _ => false,
        };
        if !same {
            self.deactivate_tool();
        }
        self.landscape = landscape;
    }

    /// Called when a landscape leaves the scene.
    pub fn remove_landscape(&mut self, landscape: &SharedLandscape) {
        let edited = self
            .landscape
            .as_ref()
            .is_some_and(|current| same_landscape(current, landscape));
        if edited {
            self.prepare_for_edit(None);
        }
    }

    /// Returns false, and changes nothing, when the tool cannot be activated.
    pub fn activate_tool(&mut self, id: &str) -> bool {
        match self.try_activate_tool(id) {
            Ok(()) => true,
            Err(err) => {
                warn!("cannot activate {id}: {err}");
                false
            }
        }
    }

    pub fn try_activate_tool(&mut self, id: &str) -> BrushResult<()> {
        let Some(landscape) = self.landscape.clone() else {
            return Err(BrushEditorError::NoEditedLandscape);
        };
        let index = self
            .tools
            .iter()
            .position(|tool| tool.id() == id)
            .ok_or_else(|| BrushEditorError::UnknownTool(id.to_string()))?;

        let previous = self.active.as_ref().map(|active| active.index);
        if previous == Some(index) {
            return Ok(());
        }
        self.deactivate_tool();

        let Err(err) = self.activate_index(&landscape, index) else {
            return Ok(());
        };
        // a failed switch puts the previous tool back
        if let Some(previous) = previous {
            if let Err(restore_err) = self.activate_index(&landscape, previous) {
                warn!(
                    "cannot restore {}: {restore_err}",
                    self.tools[previous].id()
                );
            }
        }
        Err(err)
    }

    fn activate_index(&mut self, landscape: &SharedLandscape, index: usize) -> BrushResult<()> {
        if !self.input_lock.acquire_input_lock() {
            return Err(BrushEditorError::InputLockUnavailable);
        }

        let ctx = self.resources.context(landscape);
        let tool = &mut self.tools[index];
        if let Err(err) = tool.activate(&ctx, &self.settings) {
            restore_overrides(landscape, &self.resources.overrides);
            self.input_lock.release_input_lock();
            return Err(err);
        }

        let (current_cursor, owned_cursor) = match tool.cursor_texture() {
            Some(cursor) => (cursor, None),
            None => {
                let path = &self.resources.config.default_cursor_texture;
                match self.resources.backend.load_texture(path) {
                    Ok(cursor) => (cursor, Some(cursor)),
                    Err(err) => {
                        tool.deactivate(&ctx, &mut self.settings);
                        restore_overrides(landscape, &self.resources.overrides);
                        self.input_lock.release_input_lock();
                        return Err(err);
                    }
                }
            }
        };

        let cursor_color = tool
            .cursor_color()
            .unwrap_or_else(|| self.resources.config.cursor_color());
        let mut guard = LandscapeSetupGuard::new(
            landscape.clone(),
            self.resources.backend.clone(),
            current_cursor,
            tool.cover_texture(),
            cursor_color,
        );
        guard.execute();

        tool.input_controller_mut().reset();

        info!("landscape tool {} active", tool.id());
        self.active = Some(ActiveTool {
            index,
            guard,
            current_cursor,
            cursor_color,
            owned_cursor,
        });
        Ok(())
    }

    pub fn deactivate_tool(&mut self) {
        let Some(landscape) = self.landscape.clone() else {
            return;
        };
        if self.active.is_none() {
            return;
        }

        if self.stroke.began {
            warn!("tool deactivated in the middle of a stroke, dropping the stroke");
            self.end_operation(true);
        }

        let Some(mut active) = self.active.take() else {
            return;
        };

        active.guard.undo();
        restore_overrides(&landscape, &self.resources.overrides);

        let ctx = self.resources.context(&landscape);
        let tool = &mut self.tools[active.index];
        tool.input_controller_mut().reset();
        tool.deactivate(&ctx, &mut self.settings);

        if let Some(cursor) = active.owned_cursor.take() {
            self.resources.backend.release_texture(cursor);
        }

        self.stroke = StrokeState::default();
        self.input_lock.release_input_lock();
        info!("landscape tool {} inactive", tool.id());

        if let Some(path) = &self.resources.config.tool_settings_path {
            if let Err(err) = self.settings.save_to_file(path) {
                warn!("{err:#}");
            }
        }
    }

    /// Inverted setup guard for the save pipeline: applying it strips the
    /// editor wiring from the landscape, undoing it puts it back.
    pub fn prepare_for_save(&self) -> Option<Box<dyn EditorCommand>> {
        let active = self.active.as_ref()?;
        Some(Box::new(Inverted::new(active.guard.clone())))
    }

    pub fn set_cursor_in_viewport(&mut self, inside: bool) {
        self.cursor_in_viewport = inside;
    }

    pub fn input(&mut self, event: &BrushInputEvent) -> InputResponse {
        let Some(active) = &self.active else {
            return InputResponse::Pass;
        };
        let tool = &mut self.tools[active.index];

        if tool.input_controller_mut().on_input(event) == InputResponse::Consumed {
            return InputResponse::Consumed;
        }

        match event {
            BrushInputEvent::ButtonPressed {
                button: BrushMouseButton::Left,
                ..
            } if !self.stroke.began => {
                self.stroke.begin_requested = true;
                InputResponse::Consumed
            }
            BrushInputEvent::ButtonReleased {
                button: BrushMouseButton::Left,
                ..
            } if self.stroke.began || self.stroke.begin_requested => {
                self.stroke.end_requested = true;
                InputResponse::Consumed
            }
            _ => InputResponse::Pass,
        }
    }

    /// Cancels a running stroke on the next [`Self::process`], or drops a
    /// stroke that was requested but has not begun.
    pub fn input_cancelled(&mut self) {
        if self.stroke.began {
            self.stroke.cancel_requested = true;
        } else {
            self.stroke = StrokeState::default();
        }
    }

    pub fn process(&mut self, delta_seconds: f32) {
        let Some(active_index) = self.active.as_ref().map(|active| active.index) else {
            return;
        };
        let Some(landscape) = self.landscape.clone() else {
            return;
        };

        for texture in self.readback.collect_ready() {
            self.read_pick_texture(texture);
        }

        self.tools[active_index].process(delta_seconds);
        self.update_cursor_uniforms(&landscape);
        self.request_pick_copy();

        if !self.cursor_in_viewport {
            if self.stroke.began {
                self.end_operation(true);
            }
            return;
        }

        if self.stroke.began && self.stroke.cancel_requested {
            self.end_operation(true);
        } else if self.stroke.began && self.stroke.end_requested {
            self.end_operation(false);
        } else if self.stroke.begin_requested {
            self.begin_operation();
        }

        if self.stroke.began {
            self.apply_brush(&landscape);
        }
    }

    fn update_cursor_uniforms(&mut self, landscape: &SharedLandscape) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let tool = &self.tools[active.index];
        let controller = tool.input_controller();

        let mut landscape = lock_landscape(landscape);
        let material = landscape.material_mut();

        let color = tool
            .cursor_color()
            .unwrap_or_else(|| self.resources.config.cursor_color());
        if color != active.cursor_color {
            active.cursor_color = color;
            material.set_property_value(names::CURSOR_COLOR_PROP, MaterialProperty::Vec4(color));
        }

        if let Some(cursor) = tool.cursor_texture() {
            if cursor != active.current_cursor {
                active.current_cursor = cursor;
                material.set_texture(names::CURSOR_TEXTURE_SLOT, cursor);
            }
        }

        let uv = controller.current_cursor_uv();
        let position = if uv.w == 0.0 && self.cursor_in_viewport {
            let size = tool.brush_size();
            Vec4::new(uv.x, uv.y, size, size)
        } else {
            Vec4::new(uv.x, uv.y, 0.0, 0.0)
        };
        material.set_property_value(names::CURSOR_POS_PROP, MaterialProperty::Vec4(position));
        material.set_property_value(
            names::CURSOR_ROTATION_PROP,
            MaterialProperty::Vec2(rotation_sin_cos(tool.brush_rotation())),
        );
    }

    /// Copies the pick texture patch under the cursor for a later frame.
    fn request_pick_copy(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let backend = &self.resources.backend;
        let cursor = self.tools[active.index].input_controller().cursor_position();

        let pick_size = backend.pick_texture_size().as_vec2();
        let readback_size = self.readback.descriptor().size().as_vec2();
        let source = Rect::from_center_size(cursor * pick_size, readback_size);

        let fence = backend.current_frame_fence();
        let target = self.readback.acquire_texture(fence);
        backend.blit_pick_rect(source, target);
    }

    /// Feeds the 2x2 average around the patch center into the active
    /// controller as its current cursor UV.
    pub fn read_pick_texture(&mut self, texture: TextureHandle) {
        let Some(active) = &self.active else {
            return;
        };

        let image = match self.resources.backend.read_texture_f32(texture) {
            Ok(image) => image,
            Err(err) => {
                warn!("{err}");
                return;
            }
        };
        let size = UVec2::new(image.width(), image.height());
        debug_assert_eq!(size, self.readback.descriptor().size());
        if size.x < 2 || size.y < 2 {
            return;
        }

        let (x0, y0) = (size.x / 2 - 1, size.y / 2 - 1);
        let sum = [(x0, y0), (x0 + 1, y0), (x0, y0 + 1), (x0 + 1, y0 + 1)]
            .into_iter()
            .map(|(x, y)| Vec4::from_array(image.get_pixel(x, y).0))
            .fold(Vec4::ZERO, |sum, sample| sum + sample);

        self.tools[active.index]
            .input_controller_mut()
            .update_current_cursor_uv(sum / 4.0);
    }

    fn begin_operation(&mut self) {
        debug_assert!(self.active.is_some(), "stroke without an active tool");
        debug_assert!(!self.stroke.began, "stroke began twice");
        let (Some(active), Some(landscape)) = (&self.active, &self.landscape) else {
            return;
        };

        self.stroke.began = true;
        self.stroke.begin_requested = false;

        let ctx = self.resources.context(landscape);
        let tool = &mut self.tools[active.index];
        if let Some(applicant) = tool.applicant() {
            applicant.store_snapshots(&ctx);
        }

        let controller = tool.input_controller_mut();
        let uv = controller.current_cursor_uv();
        controller.begin_operation(uv);
        debug!("stroke began at {uv}");
    }

    fn apply_brush(&mut self, landscape: &SharedLandscape) {
        let Some(active) = &self.active else {
            return;
        };
        let tool = &mut self.tools[active.index];
        let controller = tool.input_controller();

        let uv = controller.current_cursor_uv();
        if uv.w != 0.0 {
            return;
        }

        let size = tool.brush_size();
        let apply_rect = clamp_apply_rect(Vec2::new(uv.x, uv.y), Vec2::splat(size));
        self.stroke.rect = Some(match self.stroke.rect {
            Some(rect) => rect.union(apply_rect),
            None => apply_rect,
        });

        let dab = BrushDab {
            cursor_uv_size: Vec3::new(uv.x, 1.0 - uv.y, size),
            rotation: rotation_sin_cos(tool.brush_rotation()),
            invert_factor: 1.0,
            apply_rect,
            reference_uv: controller.reference_cursor_uv(),
            clone_offset: controller.clone_offset(),
        };

        let ctx = self.resources.context(landscape);
        if let Some(applicant) = tool.applicant() {
            applicant.apply_brush(&ctx, &dab);
        }
    }

    fn end_operation(&mut self, canceled: bool) {
        debug_assert!(self.stroke.began, "ending a stroke that never began");

        if !canceled {
            self.submit_diff_command();
        } else {
            self.cancel_applicant();
            debug!("stroke canceled");
        }

        self.stroke = StrokeState::default();
        if let Some(active) = &self.active {
            self.tools[active.index]
                .input_controller_mut()
                .end_operation();
        }
    }

    fn cancel_applicant(&mut self) {
        let (Some(active), Some(landscape)) = (&self.active, &self.landscape) else {
            return;
        };
        let ctx = self.resources.context(landscape);
        if let Some(applicant) = self.tools[active.index].applicant() {
            applicant.cancel_operation(&ctx);
        }
    }

    fn submit_diff_command(&mut self) {
        let (Some(active), Some(landscape), Some(rect)) =
            (&self.active, &self.landscape, self.stroke.rect)
        else {
            return;
        };

        let ctx = self.resources.context(landscape);
        let tool = &mut self.tools[active.index];
        let Some(applicant) = tool.applicant() else {
            return;
        };
        let Some(command) = applicant.create_diff_command(&ctx, flip_to_storage(rect)) else {
            debug!("stroke changed nothing");
            return;
        };

        let description = command.description().to_string();
        let notification = {
            let _originals = OriginalTexturesScope::enter(landscape, &self.resources.overrides);
            self.executor.exec(command)
        };
        info!("{description} submitted for {rect:?}");

        applicant.on_command_executed(&ctx, &notification);
    }

    /// Lets the active tool refresh its working copies after any document
    /// command ran, including undo and redo.
    pub fn process_command(&mut self, notification: &CommandNotification) {
        let (Some(active), Some(landscape)) = (&self.active, &self.landscape) else {
            return;
        };
        let ctx = self.resources.context(landscape);
        if let Some(applicant) = self.tools[active.index].applicant() {
            applicant.on_command_executed(&ctx, notification);
        }
    }

    pub fn landscape_texture_count(&self, semantic: LandscapeTextureSemantic) -> usize {
        self.landscape
            .as_ref()
            .map_or(0, |landscape| lock_landscape(landscape).texture_count(semantic))
    }

    pub fn set_override_texture(
        &mut self,
        slot: TextureSlot,
        texture: TextureHandle,
    ) -> BrushResult<()> {
        let landscape = self
            .landscape
            .as_ref()
            .ok_or(BrushEditorError::NoEditedLandscape)?;
        self.resources.context(landscape).set_override_texture(slot, texture);
        Ok(())
    }

    pub fn original_landscape_texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        let landscape = self.landscape.as_ref()?;
        self.resources.context(landscape).original_texture(slot)
    }

    /// Writes heights into the real heightmap even while overrides are
    /// installed.
    pub fn update_heightmap(&self, data: &[u16], rect: URect) -> BrushResult<()> {
        let landscape = self
            .landscape
            .as_ref()
            .ok_or(BrushEditorError::NoEditedLandscape)?;
        HeightmapUpdater::new(landscape.clone(), self.resources.overrides.clone())
            .update_heightmap(data, rect);
        Ok(())
    }
}

fn restore_overrides(landscape: &SharedLandscape, overrides: &SharedOverrides) {
    let mut overrides = lock_overrides(overrides);
    let mut landscape = lock_landscape(landscape);
    overrides.restore_all(&mut *landscape);
}

fn rotation_sin_cos(rotation: f32) -> Vec2 {
    let (sin, cos) = (TAU * rotation).sin_cos();
    Vec2::new(sin, cos)
}

/// Brush sized rect around `center`, kept inside the unit square.
///
/// The origin is saturated first, then the far edge is cut back to one, so a
/// brush hanging over the border shrinks instead of sliding inwards.
pub fn clamp_apply_rect(center: Vec2, size: Vec2) -> Rect {
    let min = (center - size * 0.5).clamp(Vec2::ZERO, Vec2::ONE);
    let max = (min + size).min(Vec2::ONE);
    Rect { min, max }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandHistory, SceneInputLock};
    use crate::headless::{HeadlessGpu, MemoryLandscape};
    use crate::input::InputModifiers;
    use crate::landscape::shared_landscape;

    fn editor() -> (LandscapeEditor, Arc<HeadlessGpu>) {
        let gpu = Arc::new(HeadlessGpu::default());
        let editor = LandscapeEditor::new(
            gpu.clone(),
            Box::new(CommandHistory::shared()),
            Box::new(SceneInputLock::default()),
            BrushEditorConfig::default(),
        );
        (editor, gpu)
    }

    fn press(editor: &mut LandscapeEditor) {
        editor.input(&BrushInputEvent::ButtonPressed {
            button: BrushMouseButton::Left,
            position: Vec2::splat(0.5),
            modifiers: InputModifiers::empty(),
        });
    }

    #[test]
    fn apply_rect_is_cut_at_the_far_edge() {
        let rect = clamp_apply_rect(Vec2::new(0.95, 0.5), Vec2::splat(0.2));
        assert_eq!(rect.max.x, 1.0);
        assert!((rect.min.x - 0.85).abs() < 1e-6);
        assert!((rect.height() - 0.2).abs() < 1e-6);

        let corner = clamp_apply_rect(Vec2::new(0.02, 0.99), Vec2::splat(0.5));
        assert_eq!(corner.min.x, 0.0);
        assert_eq!(corner.max.y, 1.0);
        assert!(corner.min.cmpge(Vec2::ZERO).all() && corner.max.cmple(Vec2::ONE).all());
    }

    #[test]
    fn only_morphing_landscapes_can_be_edited() {
        let (mut editor, _gpu) = editor();
        assert!(!editor.is_editing_allowed());

        editor.prepare_for_edit(Some(shared_landscape(
            MemoryLandscape::new(8, 8).with_render_mode(RenderMode::Instancing),
        )));
        assert!(!editor.is_editing_allowed());

        editor.prepare_for_edit(Some(shared_landscape(MemoryLandscape::new(8, 8))));
        assert!(editor.is_editing_allowed());
    }

    #[test]
    fn a_press_is_a_request_until_the_next_tick() {
        let (mut editor, _gpu) = editor();
        editor.prepare_for_edit(Some(shared_landscape(MemoryLandscape::new(8, 8))));
        assert!(editor.activate_tool("ObjectPlacementTool"));

        press(&mut editor);
        assert!(editor.stroke.begin_requested);
        assert!(!editor.is_operation_active());

        editor.process(0.016);
        assert!(editor.is_operation_active());
        assert!(!editor.stroke.begin_requested);
    }

    #[test]
    fn cancelling_before_the_stroke_begins_drops_the_press() {
        let (mut editor, _gpu) = editor();
        editor.prepare_for_edit(Some(shared_landscape(MemoryLandscape::new(8, 8))));
        assert!(editor.activate_tool("ObjectPlacementTool"));

        press(&mut editor);
        editor.input_cancelled();
        editor.process(0.016);
        assert!(!editor.is_operation_active());

        press(&mut editor);
        editor.process(0.016);
        editor.process(0.016);
        assert!(editor.is_operation_active());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "stroke began twice")]
    fn beginning_twice_is_a_fault() {
        let (mut editor, _gpu) = editor();
        editor.prepare_for_edit(Some(shared_landscape(MemoryLandscape::new(8, 8))));
        assert!(editor.activate_tool("ObjectPlacementTool"));

        editor.begin_operation();
        editor.begin_operation();
    }

    #[test]
    fn prepare_for_save_inverts_the_setup() {
        let (mut editor, _gpu) = editor();
        let landscape = shared_landscape(MemoryLandscape::new(8, 8));
        editor.prepare_for_edit(Some(landscape.clone()));
        assert!(editor.prepare_for_save().is_none());

        assert!(editor.activate_tool("ObjectPlacementTool"));
        let mut strip = editor.prepare_for_save().unwrap();

        strip.execute();
        assert!(!lock_landscape(&landscape)
            .material()
            .has_local_flag(names::CURSOR_FLAG));
        strip.undo();
        assert!(lock_landscape(&landscape)
            .material()
            .has_local_flag(names::CURSOR_FLAG));
    }

    #[test]
    fn removing_the_edited_landscape_deactivates_the_tool() {
        let (mut editor, gpu) = editor();
        let landscape = shared_landscape(MemoryLandscape::new(8, 8));
        editor.prepare_for_edit(Some(landscape.clone()));
        assert!(editor.activate_tool("ObjectPlacementTool"));
        assert!(gpu.picking_pass_enabled());

        editor.remove_landscape(&shared_landscape(MemoryLandscape::new(8, 8)));
        assert!(editor.active_tool().is_some());

        editor.remove_landscape(&landscape);
        assert!(editor.active_tool().is_none());
        assert!(editor.edited_landscape().is_none());
        assert!(!gpu.picking_pass_enabled());
    }

    #[test]
    fn unknown_tools_do_not_activate() {
        let (mut editor, _gpu) = editor();
        editor.prepare_for_edit(Some(shared_landscape(MemoryLandscape::new(8, 8))));

        assert_eq!(
            editor.try_activate_tool("TerrainPainter"),
            Err(BrushEditorError::UnknownTool("TerrainPainter".into()))
        );
        assert!(!editor.hides_system_cursor());
    }

    #[test]
    fn a_held_input_lock_blocks_activation() {
        let lock = SceneInputLock::default();
        let mut other_mode = lock.handle();
        assert!(other_mode.acquire_input_lock());

        let mut editor = LandscapeEditor::new(
            Arc::new(HeadlessGpu::default()),
            Box::new(CommandHistory::shared()),
            Box::new(lock.handle()),
            BrushEditorConfig::default(),
        );
        editor.prepare_for_edit(Some(shared_landscape(MemoryLandscape::new(8, 8))));

        assert_eq!(
            editor.try_activate_tool("ObjectPlacementTool"),
            Err(BrushEditorError::InputLockUnavailable)
        );

        other_mode.release_input_lock();
        assert!(editor.activate_tool("ObjectPlacementTool"));
        assert!(lock.is_locked());
        editor.deactivate_tool();
        assert!(!lock.is_locked());
    }

    #[test]
    fn pick_decode_averages_the_center_block() {
        let (mut editor, gpu) = editor();
        editor.prepare_for_edit(Some(shared_landscape(MemoryLandscape::new(8, 8))));
        assert!(editor.activate_tool("ObjectPlacementTool"));

        let texture = gpu.create_texture(&TextureDescriptor::readback_target(
            8,
            8,
            TextureFormat::Rgba32F,
        ));
        let mut pixels = vec![0.0f32; 8 * 8 * 4];
        for (x, y, value) in [(3, 3, 0.1), (4, 3, 0.3), (3, 4, 0.5), (4, 4, 0.7)] {
            pixels[(y * 8 + x) * 4] = value;
        }
        gpu.write_texture(texture, 0, bytemuck::cast_slice(&pixels));

        editor.read_pick_texture(texture);

        let uv = editor.active_tool().unwrap().input_controller().current_cursor_uv();
        assert!((uv.x - 0.4).abs() < 1e-6);
        assert_eq!(uv.w, 0.0);
    }
}
