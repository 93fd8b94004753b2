//! Bevy side of the brush editor: window input, the per frame tick and the
//! UI request events.

use bevy::input::keyboard::KeyboardInput;
use bevy::input::mouse::{MouseButton, MouseButtonInput};
use bevy::input::ButtonState;
use bevy::prelude::*;
use bevy::window::{CursorEntered, CursorLeft, PrimaryWindow};

use crate::commands::CommandNotification;
use crate::editor::LandscapeEditor;
use crate::input::{BrushInputEvent, BrushMouseButton, InputModifiers};
use crate::landscape::SharedLandscape;

#[derive(Event, Debug, Clone)]
pub struct ActivateLandscapeTool {
    pub tool_id: String,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct DeactivateLandscapeTool;

/// Starts editing a landscape, or stops editing with `None`.
#[derive(Event, Clone)]
pub struct EditLandscape(pub Option<SharedLandscape>);

/// A command of the edited document ran outside the editor (undo, redo).
#[derive(Event, Debug, Clone, Copy)]
pub struct LandscapeCommandExecuted(pub CommandNotification);

#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub struct LandscapeToolChanged {
    pub active_tool: Option<&'static str>,
}

fn modifiers(keys: &ButtonInput<KeyCode>) -> InputModifiers {
    let mut modifiers = InputModifiers::empty();
    modifiers.set(
        InputModifiers::SHIFT,
        keys.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]),
    );
    modifiers.set(
        InputModifiers::CTRL,
        keys.any_pressed([KeyCode::ControlLeft, KeyCode::ControlRight]),
    );
    modifiers.set(
        InputModifiers::ALT,
        keys.any_pressed([KeyCode::AltLeft, KeyCode::AltRight]),
    );
    modifiers
}

fn brush_button(button: MouseButton) -> Option<BrushMouseButton> {
    match button {
        MouseButton::Left => Some(BrushMouseButton::Left),
        MouseButton::Right => Some(BrushMouseButton::Right),
        MouseButton::Middle => Some(BrushMouseButton::Middle),
        _ => None,
    }
}

/// Turns primary window events into brush input with positions normalized to
/// the window.
#[allow(clippy::too_many_arguments)]
pub fn forward_brush_input(
    mut editor: ResMut<LandscapeEditor>,
    keys: Res<ButtonInput<KeyCode>>,
    window_query: Query<(Entity, &Window), With<PrimaryWindow>>,
    mut cursor_moved: EventReader<CursorMoved>,
    mut cursor_entered: EventReader<CursorEntered>,
    mut cursor_left: EventReader<CursorLeft>,
    mut mouse_buttons: EventReader<MouseButtonInput>,
    mut keyboard: EventReader<KeyboardInput>,
    mut last_position: Local<Vec2>,
) {
    let Ok((window_entity, window)) = window_query.get_single() else {
        return;
    };
    let window_size = Vec2::new(window.width(), window.height()).max(Vec2::ONE);
    let modifiers = modifiers(&keys);

    for _ in cursor_entered.read().filter(|ev| ev.window == window_entity) {
        editor.set_cursor_in_viewport(true);
    }

    // keys first, so a pin pressed this frame sees this frame's moves
    for ev in keyboard.read().filter(|ev| ev.window == window_entity) {
        let key = ev.key_code;
        if key == KeyCode::Escape && ev.state == ButtonState::Pressed {
            editor.input_cancelled();
            continue;
        }
        let event = match ev.state {
            ButtonState::Pressed => BrushInputEvent::KeyPressed { key, modifiers },
            ButtonState::Released => BrushInputEvent::KeyReleased { key, modifiers },
        };
        editor.input(&event);
    }

    for ev in cursor_moved.read().filter(|ev| ev.window == window_entity) {
        *last_position = ev.position / window_size;
        editor.input(&BrushInputEvent::CursorMoved {
            position: *last_position,
            modifiers,
        });
    }

    for ev in mouse_buttons.read().filter(|ev| ev.window == window_entity) {
        let Some(button) = brush_button(ev.button) else {
            continue;
        };
        let position = *last_position;
        let event = match ev.state {
            ButtonState::Pressed => BrushInputEvent::ButtonPressed {
                button,
                position,
                modifiers,
            },
            ButtonState::Released => BrushInputEvent::ButtonReleased {
                button,
                position,
                modifiers,
            },
        };
        editor.input(&event);
    }

    for _ in cursor_left.read().filter(|ev| ev.window == window_entity) {
        editor.set_cursor_in_viewport(false);
    }
}

pub fn tick_landscape_editor(mut editor: ResMut<LandscapeEditor>, time: Res<Time>) {
    editor.process(time.delta_seconds());
}

pub fn handle_landscape_requests(
    mut editor: ResMut<LandscapeEditor>,
    mut edit_requests: EventReader<EditLandscape>,
    mut activate_requests: EventReader<ActivateLandscapeTool>,
    mut deactivate_requests: EventReader<DeactivateLandscapeTool>,
    mut executed_commands: EventReader<LandscapeCommandExecuted>,
    mut tool_changed: EventWriter<LandscapeToolChanged>,
) {
    let before = editor.active_tool().map(|tool| tool.id());

    for EditLandscape(landscape) in edit_requests.read() {
        editor.prepare_for_edit(landscape.clone());
    }

    for _ in deactivate_requests.read() {
        editor.deactivate_tool();
    }

    for ev in activate_requests.read() {
        editor.activate_tool(&ev.tool_id);
    }

    for LandscapeCommandExecuted(notification) in executed_commands.read() {
        editor.process_command(notification);
    }

    let after = editor.active_tool().map(|tool| tool.id());
    if before != after {
        tool_changed.send(LandscapeToolChanged { active_tool: after });
    }
}

/// Hides the OS cursor over the primary window while a tool draws its own.
pub fn sync_system_cursor(
    editor: Res<LandscapeEditor>,
    mut window_query: Query<&mut Window, With<PrimaryWindow>>,
) {
    let visible = !editor.hides_system_cursor();
    for mut window in window_query.iter_mut() {
        if window.cursor.visible != visible {
            window.cursor.visible = visible;
        }
    }
}
