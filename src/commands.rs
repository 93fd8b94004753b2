//! Undoable editor commands and the document side collaborators that run
//! them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bevy::log::{debug, info};
use bevy::math::URect;

use crate::landscape::{lock_landscape, SharedLandscape};
use crate::overrides::{OriginalTexturesScope, SharedOverrides};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ModifyHeightmap,
    PlaceObjects,
    LandscapeSetup,
}

/// Sent to the editor after any command of the document ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandNotification {
    pub kind: CommandKind,
    /// False when the command was undone.
    pub redo: bool,
}

pub trait EditorCommand: Send + Sync {
    fn execute(&mut self);

    fn undo(&mut self);

    fn description(&self) -> &str;

    fn kind(&self) -> CommandKind;
}

/// Runs commands for the edited document and records them for undo.
pub trait CommandExecutor: Send + Sync {
    fn exec(&mut self, command: Box<dyn EditorCommand>) -> CommandNotification;
}

/// Only one exclusive editing mode may own the scene input at a time.
pub trait InputLock: Send + Sync {
    fn acquire_input_lock(&mut self) -> bool;

    fn release_input_lock(&mut self);
}

/// Plain undo/redo stack.
#[derive(Default)]
pub struct CommandHistory {
    done: Vec<Box<dyn EditorCommand>>,
    undone: Vec<Box<dyn EditorCommand>>,
}

pub type SharedHistory = Arc<Mutex<CommandHistory>>;

impl CommandHistory {
    pub fn shared() -> SharedHistory {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn push_and_execute(&mut self, mut command: Box<dyn EditorCommand>) -> CommandNotification {
        info!("executing command: {}", command.description());
        command.execute();
        let notification = CommandNotification {
            kind: command.kind(),
            redo: true,
        };
        self.done.push(command);
        self.undone.clear();
        notification
    }

    pub fn undo(&mut self) -> Option<CommandNotification> {
        let mut command = self.done.pop()?;
        debug!("undo: {}", command.description());
        command.undo();
        let notification = CommandNotification {
            kind: command.kind(),
            redo: false,
        };
        self.undone.push(command);
        Some(notification)
    }

    pub fn redo(&mut self) -> Option<CommandNotification> {
        let mut command = self.undone.pop()?;
        debug!("redo: {}", command.description());
        command.execute();
        let notification = CommandNotification {
            kind: command.kind(),
            redo: true,
        };
        self.done.push(command);
        Some(notification)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.done
            .iter()
            .map(|command| command.description().to_string())
            .collect()
    }
}

impl CommandExecutor for SharedHistory {
    fn exec(&mut self, command: Box<dyn EditorCommand>) -> CommandNotification {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_and_execute(command)
    }
}

/// Input lock shared between every editing mode of one scene.
#[derive(Debug, Clone, Default)]
pub struct SceneInputLock {
    locked: Arc<AtomicBool>,
    held: bool,
}

impl SceneInputLock {
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Another handle on the same scene lock, not holding it.
    pub fn handle(&self) -> Self {
        Self {
            locked: self.locked.clone(),
            held: false,
        }
    }
}

impl InputLock for SceneInputLock {
    fn acquire_input_lock(&mut self) -> bool {
        if self.held {
            return true;
        }
        self.held = self
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.held
    }

    fn release_input_lock(&mut self) {
        if std::mem::take(&mut self.held) {
            self.locked.store(false, Ordering::SeqCst);
        }
    }
}

/// Writes heightmap data into the real landscape textures, bypassing any
/// override installed by the active tool.
#[derive(Clone)]
pub struct HeightmapUpdater {
    landscape: SharedLandscape,
    overrides: SharedOverrides,
}

impl HeightmapUpdater {
    pub fn new(landscape: SharedLandscape, overrides: SharedOverrides) -> Self {
        Self {
            landscape,
            overrides,
        }
    }

    pub fn update_heightmap(&self, data: &[u16], rect: URect) {
        let _originals = OriginalTexturesScope::enter(&self.landscape, &self.overrides);
        lock_landscape(&self.landscape).update_heightmap(data, rect);
    }
}

/// Before/after heights of the pixel rect touched by one stroke.
pub struct HeightmapDiffCommand {
    updater: HeightmapUpdater,
    before: Vec<u16>,
    after: Vec<u16>,
    rect: URect,
}

impl HeightmapDiffCommand {
    /// `None` when the stroke did not change anything.
    pub fn new(
        updater: HeightmapUpdater,
        before: Vec<u16>,
        after: Vec<u16>,
        rect: URect,
    ) -> Option<Self> {
        debug_assert_eq!(before.len(), after.len());
        debug_assert_eq!(before.len(), (rect.width() * rect.height()) as usize);

        if before == after {
            return None;
        }

        Some(Self {
            updater,
            before,
            after,
            rect,
        })
    }

    pub fn rect(&self) -> URect {
        self.rect
    }

    pub fn before(&self) -> &[u16] {
        &self.before
    }

    pub fn after(&self) -> &[u16] {
        &self.after
    }
}

impl EditorCommand for HeightmapDiffCommand {
    fn execute(&mut self) {
        self.updater.update_heightmap(&self.after, self.rect);
    }

    fn undo(&mut self) {
        self.updater.update_heightmap(&self.before, self.rect);
    }

    fn description(&self) -> &str {
        "Modify heightmap"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::ModifyHeightmap
    }
}

/// Runs a command backwards: execute undoes and undo re-executes.
pub struct Inverted<C: EditorCommand> {
    inner: C,
}

impl<C: EditorCommand> Inverted<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: EditorCommand> EditorCommand for Inverted<C> {
    fn execute(&mut self) {
        self.inner.undo();
    }

    fn undo(&mut self) {
        self.inner.execute();
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn kind(&self) -> CommandKind {
        self.inner.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureHandle;
    use crate::headless::MemoryLandscape;
    use crate::landscape::{shared_landscape, Landscape, TextureSlot};
    use crate::overrides::lock_overrides;

    #[test]
    fn identical_heights_make_no_command() {
        let updater = HeightmapUpdater::new(
            shared_landscape(MemoryLandscape::new(4, 4)),
            SharedOverrides::default(),
        );
        let rect = URect::new(0, 0, 2, 1);

        assert!(HeightmapDiffCommand::new(updater, vec![3, 4], vec![3, 4], rect).is_none());
    }

    #[test]
    fn undo_and_redo_restore_each_side_exactly() {
        let memory = Arc::new(Mutex::new(MemoryLandscape::new(8, 8)));
        let landscape: SharedLandscape = memory.clone();
        let rect = URect::new(2, 3, 5, 5);
        let before = vec![10, 11, 12, 13, 14, 15];
        let after = vec![20, 21, 22, 23, 24, 25];

        let updater = HeightmapUpdater::new(landscape.clone(), SharedOverrides::default());
        let mut command =
            HeightmapDiffCommand::new(updater, before.clone(), after.clone(), rect).unwrap();

        command.execute();
        assert_eq!(memory.lock().unwrap().heightmap_region(rect), after);

        command.undo();
        assert_eq!(memory.lock().unwrap().heightmap_region(rect), before);

        command.execute();
        assert_eq!(memory.lock().unwrap().heightmap_region(rect), after);
        assert_eq!(memory.lock().unwrap().height_at(0, 0), 0);
    }

    #[test]
    fn heightmap_updates_see_the_original_textures() {
        let memory = Arc::new(Mutex::new(
            MemoryLandscape::new(4, 4).with_texture(TextureSlot::HEIGHTMAP, TextureHandle(1)),
        ));
        let landscape: SharedLandscape = memory.clone();
        let overrides = SharedOverrides::default();
        {
            let mut map = lock_overrides(&overrides);
            let mut land = lock_landscape(&landscape);
            map.set_override(&mut *land, TextureSlot::HEIGHTMAP, TextureHandle(2));
        }

        let updater = HeightmapUpdater::new(landscape.clone(), overrides);
        updater.update_heightmap(&[1], URect::new(0, 0, 1, 1));

        let memory = memory.lock().unwrap();
        let (_, live_during_update) = &memory.heightmap_updates()[0];
        assert_eq!(
            live_during_update.get(&TextureSlot::HEIGHTMAP),
            Some(&TextureHandle(1))
        );
        assert_eq!(memory.texture(TextureSlot::HEIGHTMAP), Some(TextureHandle(2)));
    }

    #[test]
    fn history_undo_redo_and_inversion() {
        let memory = Arc::new(Mutex::new(MemoryLandscape::new(2, 1)));
        let landscape: SharedLandscape = memory.clone();
        let rect = URect::new(0, 0, 2, 1);
        let updater = HeightmapUpdater::new(landscape, SharedOverrides::default());

        let mut history = CommandHistory::shared();
        let command = HeightmapDiffCommand::new(updater.clone(), vec![0, 0], vec![5, 6], rect)
            .map(Inverted::new)
            .map(Inverted::new)
            .unwrap();

        let notification = history.exec(Box::new(command));
        assert_eq!(notification.kind, CommandKind::ModifyHeightmap);
        assert_eq!(memory.lock().unwrap().heights(), &[5, 6]);

        let undone = history.lock().unwrap().undo().unwrap();
        assert!(!undone.redo);
        assert_eq!(memory.lock().unwrap().heights(), &[0, 0]);

        history.lock().unwrap().redo();
        assert_eq!(memory.lock().unwrap().heights(), &[5, 6]);

        let mut inverted = Inverted::new(
            HeightmapDiffCommand::new(updater, vec![0, 0], vec![5, 6], rect).unwrap(),
        );
        inverted.execute();
        assert_eq!(memory.lock().unwrap().heights(), &[0, 0]);
    }

    #[test]
    fn scene_input_lock_is_exclusive() {
        let mut first = SceneInputLock::default();
        let mut second = first.handle();

        assert!(first.acquire_input_lock());
        assert!(!second.acquire_input_lock());

        first.release_input_lock();
        assert!(second.acquire_input_lock());
        assert!(second.is_locked());

        // releasing a lock that is not held is a no-op
        first.release_input_lock();
        assert!(second.is_locked());
    }
}
