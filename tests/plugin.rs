use std::sync::{Arc, Mutex};

use bevy::input::keyboard::{Key, KeyboardInput};
use bevy::input::mouse::{MouseButton, MouseButtonInput};
use bevy::input::{ButtonState, InputPlugin};
use bevy::prelude::*;
use bevy::window::{PrimaryWindow, WindowPlugin};

use bevy_landscape_brush::commands::{CommandHistory, SceneInputLock};
use bevy_landscape_brush::headless::{HeadlessGpu, MemoryLandscape};
use bevy_landscape_brush::landscape::SharedLandscape;
use bevy_landscape_brush::systems::{
    ActivateLandscapeTool, DeactivateLandscapeTool, EditLandscape, LandscapeToolChanged,
};
use bevy_landscape_brush::{BrushEditorConfig, LandscapeBrushPlugin, LandscapeEditor};

fn app() -> App {
    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins,
        InputPlugin,
        WindowPlugin::default(),
        LandscapeBrushPlugin,
    ));

    app.insert_resource(LandscapeEditor::new(
        Arc::new(HeadlessGpu::default()),
        Box::new(CommandHistory::shared()),
        Box::new(SceneInputLock::default()),
        BrushEditorConfig::default(),
    ));

    let landscape: SharedLandscape = Arc::new(Mutex::new(MemoryLandscape::new(16, 16)));
    app.world_mut().send_event(EditLandscape(Some(landscape)));
    app.update();
    app
}

fn primary_window(app: &mut App) -> Entity {
    app.world_mut()
        .query_filtered::<Entity, With<PrimaryWindow>>()
        .single(app.world())
}

fn cursor_visible(app: &mut App) -> bool {
    let window = primary_window(app);
    app.world().get::<Window>(window).unwrap().cursor.visible
}

fn tool_changes(app: &App) -> Vec<LandscapeToolChanged> {
    let events = app.world().resource::<Events<LandscapeToolChanged>>();
    events.get_reader().read(events).cloned().collect()
}

#[test]
fn activation_requests_hide_the_system_cursor() {
    let mut app = app();
    assert!(cursor_visible(&mut app));

    app.world_mut().send_event(ActivateLandscapeTool {
        tool_id: "ObjectPlacementTool".to_string(),
    });
    app.update();

    assert_eq!(
        tool_changes(&app),
        vec![LandscapeToolChanged {
            active_tool: Some("ObjectPlacementTool")
        }]
    );
    assert!(!cursor_visible(&mut app));

    app.world_mut().send_event(DeactivateLandscapeTool);
    app.update();

    assert!(tool_changes(&app).contains(&LandscapeToolChanged { active_tool: None }));
    assert!(cursor_visible(&mut app));
}

#[test]
fn unknown_tools_change_nothing() {
    let mut app = app();

    app.world_mut().send_event(ActivateLandscapeTool {
        tool_id: "PaintbrushTool".to_string(),
    });
    app.update();

    assert!(tool_changes(&app).is_empty());
    assert!(app.world().resource::<LandscapeEditor>().active_tool().is_none());
    assert!(cursor_visible(&mut app));
}

#[test]
fn window_clicks_drive_strokes() {
    let mut app = app();
    let window = primary_window(&mut app);

    app.world_mut().send_event(ActivateLandscapeTool {
        tool_id: "ObjectPlacementTool".to_string(),
    });
    app.update();

    app.world_mut().send_event(CursorMoved {
        window,
        position: Vec2::new(640.0, 360.0),
        delta: None,
    });
    app.world_mut().send_event(MouseButtonInput {
        button: MouseButton::Left,
        state: ButtonState::Pressed,
        window,
    });
    app.update();

    let editor = app.world().resource::<LandscapeEditor>();
    assert!(editor.is_operation_active());
    let position = editor
        .active_tool()
        .unwrap()
        .input_controller()
        .cursor_position();
    assert!((position - Vec2::splat(0.5)).length() < 1e-6);

    app.world_mut().send_event(MouseButtonInput {
        button: MouseButton::Left,
        state: ButtonState::Released,
        window,
    });
    app.update();

    assert!(!app
        .world()
        .resource::<LandscapeEditor>()
        .is_operation_active());
}

#[test]
fn a_pin_key_pressed_with_a_drag_takes_the_drag() {
    let mut app = app();
    let window = primary_window(&mut app);

    app.world_mut().send_event(ActivateLandscapeTool {
        tool_id: "ObjectPlacementTool".to_string(),
    });
    app.world_mut().send_event(CursorMoved {
        window,
        position: Vec2::new(640.0, 360.0),
        delta: None,
    });
    app.update();
    let size_before = app
        .world()
        .resource::<LandscapeEditor>()
        .active_tool()
        .unwrap()
        .brush_size();

    // both arrive within one frame
    app.world_mut().send_event(KeyboardInput {
        key_code: KeyCode::KeyH,
        logical_key: Key::Character("h".into()),
        state: ButtonState::Pressed,
        window,
    });
    app.world_mut().send_event(CursorMoved {
        window,
        position: Vec2::new(640.0, 180.0),
        delta: None,
    });
    app.update();

    let tool = app
        .world()
        .resource::<LandscapeEditor>()
        .active_tool()
        .unwrap();
    assert!((tool.brush_size() - (size_before + 0.25)).abs() < 1e-5);
    let position = tool.input_controller().cursor_position();
    assert!((position - Vec2::splat(0.5)).length() < 1e-6);
}
