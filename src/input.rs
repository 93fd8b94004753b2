//! Cursor tracking in landscape space and the controllers tools layer on top
//! of it.
//!
//! Positions are normalized to the edit viewport. Cursor UVs are 4 component:
//! xy is the landscape UV, w is zero on the landscape and one when invalid.

use std::collections::HashSet;

use bevy::input::keyboard::KeyCode;
use bevy::math::{Vec2, Vec4};

/// UV reported when the cursor is not over the landscape.
pub const INVALID_CURSOR_UV: Vec4 = Vec4::W;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct InputModifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrushMouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrushInputEvent {
    CursorMoved {
        position: Vec2,
        modifiers: InputModifiers,
    },
    ButtonPressed {
        button: BrushMouseButton,
        position: Vec2,
        modifiers: InputModifiers,
    },
    ButtonReleased {
        button: BrushMouseButton,
        position: Vec2,
        modifiers: InputModifiers,
    },
    KeyPressed {
        key: KeyCode,
        modifiers: InputModifiers,
    },
    KeyReleased {
        key: KeyCode,
        modifiers: InputModifiers,
    },
}

impl BrushInputEvent {
    pub fn modifiers(&self) -> InputModifiers {
        match self {
            BrushInputEvent::CursorMoved { modifiers, .. }
            | BrushInputEvent::ButtonPressed { modifiers, .. }
            | BrushInputEvent::ButtonReleased { modifiers, .. }
            | BrushInputEvent::KeyPressed { modifiers, .. }
            | BrushInputEvent::KeyReleased { modifiers, .. } => *modifiers,
        }
    }

    pub fn position(&self) -> Option<Vec2> {
        match self {
            BrushInputEvent::CursorMoved { position, .. }
            | BrushInputEvent::ButtonPressed { position, .. }
            | BrushInputEvent::ButtonReleased { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// Whether a controller swallowed an event or the editor should see it too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputResponse {
    Consumed,
    Pass,
}

/// A pinned key moved the cursor by `delta` (scaled) while held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyAdjustment {
    pub key: KeyCode,
    pub delta: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CursorTracker {
    position: Vec2,
    current_uv: Vec4,
    begin_uv: Vec4,
    modifiers: InputModifiers,
    pressed_keys: HashSet<KeyCode>,
}

impl Default for CursorTracker {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            current_uv: INVALID_CURSOR_UV,
            begin_uv: INVALID_CURSOR_UV,
            modifiers: InputModifiers::empty(),
            pressed_keys: HashSet::new(),
        }
    }
}

impl CursorTracker {
    pub fn track(&mut self, event: &BrushInputEvent) {
        self.modifiers = event.modifiers();

        match event {
            BrushInputEvent::CursorMoved { position, .. }
            | BrushInputEvent::ButtonPressed { position, .. }
            | BrushInputEvent::ButtonReleased { position, .. } => self.position = *position,
            BrushInputEvent::KeyPressed { key, .. } => {
                self.pressed_keys.insert(*key);
            }
            BrushInputEvent::KeyReleased { key, .. } => {
                self.pressed_keys.remove(key);
            }
        }
    }
}

/// Shared surface of every input controller.
///
/// Implementors only provide access to their [`CursorTracker`]; specialized
/// controllers override [`BrushInputController::on_input`] and hand whatever
/// they do not recognize to the controller they wrap.
pub trait BrushInputController: Send + Sync {
    fn tracker(&self) -> &CursorTracker;

    fn tracker_mut(&mut self) -> &mut CursorTracker;

    fn on_input(&mut self, event: &BrushInputEvent) -> InputResponse {
        self.tracker_mut().track(event);
        InputResponse::Pass
    }

    fn begin_operation(&mut self, uv: Vec4) {
        let tracker = self.tracker_mut();
        tracker.begin_uv = uv;
        tracker.current_uv = uv;
    }

    fn update_current_cursor_uv(&mut self, uv: Vec4) {
        self.tracker_mut().current_uv = uv;
    }

    fn end_operation(&mut self) {
        let tracker = self.tracker_mut();
        tracker.begin_uv = INVALID_CURSOR_UV;
        tracker.current_uv = INVALID_CURSOR_UV;
    }

    fn is_in_operation(&self) -> bool {
        self.tracker().begin_uv.w < 1.0
    }

    fn current_cursor_uv(&self) -> Vec4 {
        self.tracker().current_uv
    }

    fn begin_cursor_uv(&self) -> Vec4 {
        self.tracker().begin_uv
    }

    /// UV the brush samples its reference values at.
    fn reference_cursor_uv(&self) -> Vec4 {
        self.current_cursor_uv()
    }

    fn cursor_position(&self) -> Vec2 {
        self.tracker().position
    }

    fn modifiers(&self) -> InputModifiers {
        self.tracker().modifiers
    }

    fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.tracker().pressed_keys.contains(&key)
    }

    /// Pinned key movements since the last call.
    fn take_adjustments(&mut self) -> Vec<KeyAdjustment> {
        Vec::new()
    }

    /// Offset from the stroke start to the clone source, if there is one.
    fn clone_offset(&self) -> Option<Vec2> {
        None
    }

    fn set_reference_frozen(&mut self, _frozen: bool) {}

    /// Forgets the stroke, pins and pressed keys. The cursor position stays.
    fn reset(&mut self) {
        let position = self.tracker().position;
        *self.tracker_mut() = CursorTracker {
            position,
            ..Default::default()
        };
    }
}

/// Tracks the physical cursor and nothing else.
#[derive(Debug, Clone, Default)]
pub struct DefaultInputController {
    tracker: CursorTracker,
}

impl BrushInputController for DefaultInputController {
    fn tracker(&self) -> &CursorTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut CursorTracker {
        &mut self.tracker
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct KeyPin {
    key: KeyCode,
    scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActivePin {
    pin: KeyPin,
    last_position: Vec2,
}

/// Lets a held key turn vertical cursor movement into a numeric adjustment.
///
/// While a key is pinned the tracked cursor position stays where it was when
/// the key went down.
#[derive(Debug, Clone, Default)]
pub struct KeyboardInputController {
    tracker: CursorTracker,
    pins: Vec<KeyPin>,
    active: Option<ActivePin>,
    adjustments: Vec<KeyAdjustment>,
}

impl KeyboardInputController {
    pub fn add_keyboard_control(&mut self, key: KeyCode, scale: f32) {
        self.pins.retain(|pin| pin.key != key);
        self.pins.push(KeyPin { key, scale });
    }

    pub fn with_keyboard_control(mut self, key: KeyCode, scale: f32) -> Self {
        self.add_keyboard_control(key, scale);
        self
    }

    pub fn pinned_key(&self) -> Option<KeyCode> {
        self.active.map(|active| active.pin.key)
    }
}

impl BrushInputController for KeyboardInputController {
    fn tracker(&self) -> &CursorTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut CursorTracker {
        &mut self.tracker
    }

    fn on_input(&mut self, event: &BrushInputEvent) -> InputResponse {
        match (event, self.active.as_mut()) {
            (BrushInputEvent::CursorMoved { position, .. }, Some(active)) => {
                let delta = active.last_position.y - position.y;
                active.last_position = *position;
                self.adjustments.push(KeyAdjustment {
                    key: active.pin.key,
                    delta: delta * active.pin.scale,
                });
                InputResponse::Consumed
            }
            (BrushInputEvent::KeyPressed { key, .. }, None) => {
                let Some(pin) = self.pins.iter().find(|pin| pin.key == *key).copied() else {
                    self.tracker.track(event);
                    return InputResponse::Pass;
                };

                self.tracker.track(event);
                self.active = Some(ActivePin {
                    pin,
                    last_position: self.tracker.position,
                });
                InputResponse::Consumed
            }
            (BrushInputEvent::KeyReleased { key, .. }, Some(active)) if active.pin.key == *key => {
                self.active = None;
                self.tracker.track(event);
                InputResponse::Consumed
            }
            _ => {
                self.tracker.track(event);
                InputResponse::Pass
            }
        }
    }

    fn take_adjustments(&mut self) -> Vec<KeyAdjustment> {
        std::mem::take(&mut self.adjustments)
    }

    fn reset(&mut self) {
        let position = self.tracker.position;
        self.tracker = CursorTracker {
            position,
            ..Default::default()
        };
        self.active = None;
        self.adjustments.clear();
    }
}

/// Alt + left click picks the clone source instead of starting a stroke.
#[derive(Debug, Clone, Default)]
pub struct CloneOffsetController {
    inner: KeyboardInputController,
    anchor: Option<Vec2>,
    offset: Option<Vec2>,
}

impl CloneOffsetController {
    pub fn new(inner: KeyboardInputController) -> Self {
        Self {
            inner,
            anchor: None,
            offset: None,
        }
    }

    pub fn anchor(&self) -> Option<Vec2> {
        self.anchor
    }
}

impl BrushInputController for CloneOffsetController {
    fn tracker(&self) -> &CursorTracker {
        self.inner.tracker()
    }

    fn tracker_mut(&mut self) -> &mut CursorTracker {
        self.inner.tracker_mut()
    }

    fn on_input(&mut self, event: &BrushInputEvent) -> InputResponse {
        match event {
            BrushInputEvent::ButtonPressed {
                button: BrushMouseButton::Left,
                modifiers,
                ..
            } if modifiers.contains(InputModifiers::ALT) => {
                self.inner.tracker_mut().track(event);
                let uv = self.current_cursor_uv();
                if uv.w < 1.0 {
                    self.anchor = Some(uv.truncate().truncate());
                }
                InputResponse::Consumed
            }
            _ => self.inner.on_input(event),
        }
    }

    fn begin_operation(&mut self, uv: Vec4) {
        self.inner.begin_operation(uv);
        self.offset = self.anchor.map(|anchor| anchor - uv.truncate().truncate());
    }

    fn end_operation(&mut self) {
        self.inner.end_operation();
        self.offset = None;
    }

    fn take_adjustments(&mut self) -> Vec<KeyAdjustment> {
        self.inner.take_adjustments()
    }

    fn clone_offset(&self) -> Option<Vec2> {
        self.offset
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.offset = None;
    }
}

/// Samples reference values at the stroke start while frozen.
#[derive(Debug, Clone, Default)]
pub struct FrozenReferenceController {
    inner: KeyboardInputController,
    frozen: bool,
}

impl FrozenReferenceController {
    pub fn new(inner: KeyboardInputController, frozen: bool) -> Self {
        Self { inner, frozen }
    }
}

impl BrushInputController for FrozenReferenceController {
    fn tracker(&self) -> &CursorTracker {
        self.inner.tracker()
    }

    fn tracker_mut(&mut self) -> &mut CursorTracker {
        self.inner.tracker_mut()
    }

    fn on_input(&mut self, event: &BrushInputEvent) -> InputResponse {
        self.inner.on_input(event)
    }

    fn reference_cursor_uv(&self) -> Vec4 {
        if self.frozen && self.is_in_operation() {
            self.begin_cursor_uv()
        } else {
            self.current_cursor_uv()
        }
    }

    fn take_adjustments(&mut self) -> Vec<KeyAdjustment> {
        self.inner.take_adjustments()
    }

    fn set_reference_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moved(x: f32, y: f32) -> BrushInputEvent {
        BrushInputEvent::CursorMoved {
            position: Vec2::new(x, y),
            modifiers: InputModifiers::empty(),
        }
    }

    fn key_down(key: KeyCode) -> BrushInputEvent {
        BrushInputEvent::KeyPressed {
            key,
            modifiers: InputModifiers::empty(),
        }
    }

    fn key_up(key: KeyCode) -> BrushInputEvent {
        BrushInputEvent::KeyReleased {
            key,
            modifiers: InputModifiers::empty(),
        }
    }

    #[test]
    fn operation_bracketing_follows_the_begin_uv() {
        let mut controller = DefaultInputController::default();
        assert!(!controller.is_in_operation());

        let uv = Vec4::new(0.25, 0.75, 0.0, 0.0);
        controller.begin_operation(uv);
        assert!(controller.is_in_operation());

        controller.update_current_cursor_uv(Vec4::new(0.3, 0.7, 0.0, 0.0));
        assert_eq!(controller.begin_cursor_uv(), uv);
        assert_eq!(controller.current_cursor_uv().x, 0.3);

        controller.end_operation();
        assert!(!controller.is_in_operation());
        assert_eq!(controller.current_cursor_uv(), INVALID_CURSOR_UV);
    }

    #[test]
    fn pinned_key_turns_moves_into_adjustments() {
        let mut controller =
            KeyboardInputController::default().with_keyboard_control(KeyCode::KeyH, 1.0);

        controller.on_input(&moved(0.5, 0.5));
        assert_eq!(
            controller.on_input(&key_down(KeyCode::KeyH)),
            InputResponse::Consumed
        );
        assert_eq!(controller.on_input(&moved(0.6, 0.4)), InputResponse::Consumed);
        controller.on_input(&moved(0.6, 0.3));

        let adjustments = controller.take_adjustments();
        assert_eq!(adjustments.len(), 2);
        let total: f32 = adjustments.iter().map(|adjustment| adjustment.delta).sum();
        assert!((total - 0.2).abs() < 1e-6);

        // the tracked cursor did not follow the pinned moves
        assert_eq!(controller.cursor_position(), Vec2::new(0.5, 0.5));

        controller.on_input(&key_up(KeyCode::KeyH));
        controller.on_input(&moved(0.1, 0.1));
        assert_eq!(controller.cursor_position(), Vec2::new(0.1, 0.1));
        assert!(controller.take_adjustments().is_empty());
    }

    #[test]
    fn key_up_without_key_down_changes_nothing() {
        let mut controller =
            KeyboardInputController::default().with_keyboard_control(KeyCode::KeyY, 1.0);

        assert_eq!(controller.on_input(&key_up(KeyCode::KeyY)), InputResponse::Pass);
        assert_eq!(controller.pinned_key(), None);

        controller.on_input(&moved(0.2, 0.2));
        assert_eq!(controller.cursor_position(), Vec2::new(0.2, 0.2));
    }

    #[test]
    fn unregistered_keys_pass_through() {
        let mut controller =
            KeyboardInputController::default().with_keyboard_control(KeyCode::KeyY, 1.0);

        assert_eq!(controller.on_input(&key_down(KeyCode::KeyQ)), InputResponse::Pass);
        assert!(controller.is_key_pressed(KeyCode::KeyQ));
        assert_eq!(controller.pinned_key(), None);
    }

    #[test]
    fn alt_click_sets_the_clone_anchor() {
        let mut controller = CloneOffsetController::default();
        controller.update_current_cursor_uv(Vec4::new(0.2, 0.2, 0.0, 0.0));

        let response = controller.on_input(&BrushInputEvent::ButtonPressed {
            button: BrushMouseButton::Left,
            position: Vec2::new(0.5, 0.5),
            modifiers: InputModifiers::ALT,
        });
        assert_eq!(response, InputResponse::Consumed);
        assert_eq!(controller.anchor(), Some(Vec2::new(0.2, 0.2)));

        controller.begin_operation(Vec4::new(0.5, 0.4, 0.0, 0.0));
        let offset = controller.clone_offset().unwrap();
        assert!((offset - Vec2::new(-0.3, -0.2)).length() < 1e-6);

        controller.end_operation();
        assert_eq!(controller.clone_offset(), None);
    }

    #[test]
    fn frozen_reference_sticks_to_the_stroke_start() {
        let mut controller = FrozenReferenceController::new(Default::default(), true);
        let begin = Vec4::new(0.1, 0.1, 0.0, 0.0);
        controller.begin_operation(begin);
        controller.update_current_cursor_uv(Vec4::new(0.9, 0.9, 0.0, 0.0));
        assert_eq!(controller.reference_cursor_uv(), begin);

        controller.set_reference_frozen(false);
        assert_eq!(controller.reference_cursor_uv().x, 0.9);
    }
}
