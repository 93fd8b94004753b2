//! Scatters objects over the landscape, or clears them, under the brush.

use bevy::input::keyboard::KeyCode;
use bevy::log::{debug, info};
use bevy::math::{Rect, Vec2, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::applicant::{BrushApplicant, BrushDab, EditContext};
use crate::commands::{CommandNotification, EditorCommand};
use crate::error::BrushResult;
use crate::gpu::TextureHandle;
use crate::input::{BrushInputController, KeyboardInputController};
use crate::objects::{lock_objects, PlaceObjectsCommand, PlacedObject, SharedObjectLayer};
use crate::settings::ToolSettings;
use crate::tool::LandscapeTool;

/// Smallest accepted spacing between two objects, landscape UV units.
pub const MIN_OBJECT_DISTANCE: f32 = 1e-4;

pub const REMOVE_CURSOR_COLOR: Vec4 = Vec4::new(1.0, 0.35, 0.35, 1.0);

/// Scatter grid half extent, in cells, for a single dab.
const MAX_SCATTER_STEPS: i32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    #[default]
    Spawn,
    Remove,
}

impl PlacementMode {
    fn to_setting(self) -> i64 {
        match self {
            PlacementMode::Spawn => 0,
            PlacementMode::Remove => 1,
        }
    }

    fn from_setting(value: i64) -> Self {
        match value {
            1 => PlacementMode::Remove,
            _ => PlacementMode::Spawn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementParams {
    pub mode: PlacementMode,
    /// Chance for each scatter point to spawn, [0, 1].
    pub density: f32,
    /// Landscape UV units.
    pub min_distance: f32,
    pub rotation_range: (f32, f32),
    pub scale_range: (f32, f32),
}

impl Default for PlacementParams {
    fn default() -> Self {
        Self {
            mode: PlacementMode::Spawn,
            density: 1.0,
            min_distance: 0.01,
            rotation_range: (0.0, 360.0),
            scale_range: (0.8, 1.2),
        }
    }
}

pub struct ObjectPlacementTool {
    params: PlacementParams,
    size: f32,
    rotation: f32,
    seed: u64,
    controller: KeyboardInputController,
    applicant: Option<ObjectPlacementApplicant>,
}

impl Default for ObjectPlacementTool {
    fn default() -> Self {
        Self {
            params: PlacementParams::default(),
            size: 0.05,
            rotation: 0.0,
            seed: 0x5eed,
            controller: KeyboardInputController::default()
                .with_keyboard_control(KeyCode::KeyH, 1.0),
            applicant: None,
        }
    }
}

impl ObjectPlacementTool {
    pub const ID: &'static str = "ObjectPlacementTool";
    pub const SORT_KEY: i32 = 10;

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn params(&self) -> &PlacementParams {
        &self.params
    }

    pub fn mode(&self) -> PlacementMode {
        self.params.mode
    }

    pub fn set_mode(&mut self, mode: PlacementMode) {
        self.params.mode = mode;
        self.push_params();
    }

    pub fn set_density(&mut self, density: f32) {
        self.params.density = density.clamp(0.0, 1.0);
        self.push_params();
    }

    pub fn set_min_distance(&mut self, min_distance: f32) {
        self.params.min_distance = min_distance.max(MIN_OBJECT_DISTANCE);
        self.push_params();
    }

    pub fn set_rotation_range(&mut self, min: f32, max: f32) {
        self.params.rotation_range = (min.min(max), min.max(max));
        self.push_params();
    }

    pub fn set_scale_range(&mut self, min: f32, max: f32) {
        self.params.scale_range = (min.min(max), min.max(max));
        self.push_params();
    }

    fn push_params(&mut self) {
        let params = self.params;
        if let Some(applicant) = self.applicant.as_mut() {
            applicant.params = params;
        }
    }

    fn load_settings(&mut self, settings: &ToolSettings) {
        let Some(section) = settings.section(Self::ID) else {
            return;
        };
        let defaults = PlacementParams::default();

        self.size = section.get_f32("brushSize", self.size);
        self.params.mode = PlacementMode::from_setting(section.get_i64("mode", 0));
        self.params.density = section.get_f32("density", defaults.density).clamp(0.0, 1.0);
        self.params.min_distance = section
            .get_f32("minDistanceBetweenObjects", defaults.min_distance)
            .max(MIN_OBJECT_DISTANCE);
        self.set_rotation_range(
            section.get_f32("rotationMin", defaults.rotation_range.0),
            section.get_f32("rotationMax", defaults.rotation_range.1),
        );
        self.set_scale_range(
            section.get_f32("scaleMin", defaults.scale_range.0),
            section.get_f32("scaleMax", defaults.scale_range.1),
        );
    }

    fn save_settings(&self, settings: &mut ToolSettings) {
        let section = settings.section_mut(Self::ID);
        section.set_f32("brushSize", self.size);
        section.set_i64("mode", self.params.mode.to_setting());
        section.set_f32("density", self.params.density);
        section.set_f32("minDistanceBetweenObjects", self.params.min_distance);
        section.set_f32("rotationMin", self.params.rotation_range.0);
        section.set_f32("rotationMax", self.params.rotation_range.1);
        section.set_f32("scaleMin", self.params.scale_range.0);
        section.set_f32("scaleMax", self.params.scale_range.1);
    }
}

impl LandscapeTool for ObjectPlacementTool {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn display_name(&self) -> &'static str {
        "Object placement"
    }

    fn sort_key(&self) -> i32 {
        Self::SORT_KEY
    }

    fn activate(&mut self, ctx: &EditContext, settings: &ToolSettings) -> BrushResult<()> {
        self.load_settings(settings);
        self.applicant = Some(ObjectPlacementApplicant::new(
            ctx.objects.clone(),
            self.params,
            self.seed,
        ));
        info!("{} activated", Self::ID);
        Ok(())
    }

    fn deactivate(&mut self, _ctx: &EditContext, settings: &mut ToolSettings) {
        self.applicant = None;
        self.save_settings(settings);
        info!("{} deactivated", Self::ID);
    }

    fn process(&mut self, _delta_seconds: f32) {
        for adjustment in self.controller.take_adjustments() {
            if adjustment.key == KeyCode::KeyH {
                self.size = (self.size + adjustment.delta).clamp(0.0, 1.0);
            }
        }
    }

    fn input_controller(&self) -> &dyn BrushInputController {
        &self.controller
    }

    fn input_controller_mut(&mut self) -> &mut dyn BrushInputController {
        &mut self.controller
    }

    fn applicant(&mut self) -> Option<&mut dyn BrushApplicant> {
        self.applicant
            .as_mut()
            .map(|applicant| applicant as &mut dyn BrushApplicant)
    }

    fn cursor_texture(&self) -> Option<TextureHandle> {
        None
    }

    fn cursor_color(&self) -> Option<Vec4> {
        match self.params.mode {
            PlacementMode::Spawn => None,
            PlacementMode::Remove => Some(REMOVE_CURSOR_COLOR),
        }
    }

    fn brush_size(&self) -> f32 {
        self.size
    }

    fn set_brush_size(&mut self, size: f32) {
        self.size = size.clamp(0.0, 1.0);
    }

    fn brush_rotation(&self) -> f32 {
        self.rotation
    }

    fn set_brush_rotation(&mut self, rotation: f32) {
        self.rotation = rotation.clamp(0.0, 1.0);
    }
}

/// Edits the object layer live during a stroke and hands the net change
/// over as one command at the end.
pub struct ObjectPlacementApplicant {
    layer: SharedObjectLayer,
    params: PlacementParams,
    rng: StdRng,
    added: Vec<PlacedObject>,
    removed: Vec<PlacedObject>,
}

impl ObjectPlacementApplicant {
    pub fn new(layer: SharedObjectLayer, params: PlacementParams, seed: u64) -> Self {
        Self {
            layer,
            params,
            rng: StdRng::seed_from_u64(seed),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    fn random_object(&mut self, id: u64, uv: Vec2) -> PlacedObject {
        let (min_rotation, max_rotation) = self.params.rotation_range;
        let (min_scale, max_scale) = self.params.scale_range;
        PlacedObject {
            id,
            uv,
            rotation: self.rng.gen_range(min_rotation..=max_rotation),
            scale: self.rng.gen_range(min_scale..=max_scale),
        }
    }

    fn spawn(&mut self, center: Vec2, radius: f32) {
        let min_distance = self.params.min_distance.max(MIN_OBJECT_DISTANCE);
        // past MAX_SCATTER_STEPS the grid widens instead of growing
        let spacing = (min_distance * 2.0).max(radius / MAX_SCATTER_STEPS as f32);
        let jitter = spacing * 0.25;
        let steps = ((radius / spacing).floor() as i32).min(MAX_SCATTER_STEPS);
        let density = self.params.density.clamp(0.0, 1.0) as f64;

        let mut candidates = Vec::new();
        for j in -steps..=steps {
            for i in -steps..=steps {
                let offset = Vec2::new(i as f32, j as f32) * spacing;
                let jittered = offset
                    + Vec2::new(
                        self.rng.gen_range(-jitter..=jitter),
                        self.rng.gen_range(-jitter..=jitter),
                    );
                if jittered.length() > radius || !self.rng.gen_bool(density) {
                    continue;
                }
                candidates.push(center + jittered);
            }
        }
        if candidates.is_empty() && self.rng.gen_bool(density) {
            candidates.push(center);
        }

        let layer = self.layer.clone();
        let mut layer = lock_objects(&layer);
        for uv in candidates {
            if !Rect::new(0.0, 0.0, 1.0, 1.0).contains(uv) {
                continue;
            }
            if layer.within(uv, min_distance).next().is_some() {
                continue;
            }
            let id = layer.allocate_id();
            let object = self.random_object(id, uv);
            layer.insert(object);
            self.added.push(object);
        }
    }

    fn remove(&mut self, center: Vec2, radius: f32) {
        let mut layer = lock_objects(&self.layer);
        let doomed: Vec<u64> = layer.within(center, radius).map(|object| object.id).collect();
        for id in doomed {
            let Some(object) = layer.remove(id) else {
                continue;
            };
            // removing something this stroke spawned just cancels the spawn
            if let Some(index) = self.added.iter().position(|added| added.id == id) {
                self.added.swap_remove(index);
            } else {
                self.removed.push(object);
            }
        }
    }

    /// Puts the layer back the way it was before the stroke.
    fn revert_live_edits(&mut self) {
        let mut layer = lock_objects(&self.layer);
        for object in &self.added {
            layer.remove(object.id);
        }
        for object in &self.removed {
            layer.insert(*object);
        }
    }
}

impl BrushApplicant for ObjectPlacementApplicant {
    fn store_snapshots(&mut self, _ctx: &EditContext) {
        self.added.clear();
        self.removed.clear();
    }

    fn apply_brush(&mut self, _ctx: &EditContext, dab: &BrushDab) {
        if dab.apply_rect.is_empty() {
            return;
        }

        // the dab carries the cursor in heightmap texture space
        let center = Vec2::new(dab.cursor_uv_size.x, 1.0 - dab.cursor_uv_size.y);
        let radius = dab.cursor_uv_size.z * 0.5;
        match self.params.mode {
            PlacementMode::Spawn => self.spawn(center, radius),
            PlacementMode::Remove => self.remove(center, radius),
        }
    }

    fn create_diff_command(
        &mut self,
        _ctx: &EditContext,
        _operation_rect: Rect,
    ) -> Option<Box<dyn EditorCommand>> {
        self.revert_live_edits();

        let added = std::mem::take(&mut self.added);
        let removed = std::mem::take(&mut self.removed);
        debug!("object stroke: {} added, {} removed", added.len(), removed.len());

        let command = PlaceObjectsCommand::new(self.layer.clone(), added, removed)?;
        Some(Box::new(command))
    }

    fn on_command_executed(&mut self, _ctx: &EditContext, _notification: &CommandNotification) {}

    fn cancel_operation(&mut self, _ctx: &EditContext) {
        self.revert_live_edits();
        let (added, removed) = (self.added.len(), self.removed.len());
        self.added.clear();
        self.removed.clear();
        debug!("object stroke canceled: {added} spawns and {removed} removals reverted");
    }
}
