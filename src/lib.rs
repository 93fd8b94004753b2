use bevy::input::keyboard::KeyCode;
use bevy::input::ButtonInput;
use bevy::prelude::*;

use systems::{
    forward_brush_input, handle_landscape_requests, sync_system_cursor, tick_landscape_editor,
    ActivateLandscapeTool, DeactivateLandscapeTool, EditLandscape, LandscapeCommandExecuted,
    LandscapeToolChanged,
};

pub mod applicant;
pub mod commands;
pub mod editor;
pub mod editor_config;
pub mod error;
pub mod gpu;
pub mod headless;
pub mod height_tool;
pub mod heightmap;
pub mod input;
pub mod landscape;
pub mod material;
pub mod object_placement;
pub mod objects;
pub mod overrides;
pub mod readback;
pub mod render_helper;
pub mod settings;
pub mod setup_guard;
pub mod systems;
pub mod tool;

pub use editor::LandscapeEditor;
pub use editor_config::BrushEditorConfig;

/// Registers the brush editor events and systems.
///
/// The [`LandscapeEditor`] resource is inserted by the application, which
/// owns the GPU backend and the document. Nothing runs until it exists.
#[derive(Default)]
pub struct LandscapeBrushPlugin;

impl Plugin for LandscapeBrushPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<ActivateLandscapeTool>();
        app.add_event::<DeactivateLandscapeTool>();
        app.add_event::<EditLandscape>();
        app.add_event::<LandscapeCommandExecuted>();
        app.add_event::<LandscapeToolChanged>();

        app.init_resource::<ButtonInput<KeyCode>>();

        app.add_systems(
            Update,
            (
                handle_landscape_requests,
                forward_brush_input,
                tick_landscape_editor,
                sync_system_cursor,
            )
                .chain()
                .run_if(resource_exists::<LandscapeEditor>),
        );
    }
}
