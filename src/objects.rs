use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bevy::math::Vec2;

use crate::commands::{CommandKind, EditorCommand};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedObject {
    pub id: u64,
    /// Landscape UV of the object.
    pub uv: Vec2,
    /// Degrees around the up axis.
    pub rotation: f32,
    pub scale: f32,
}

impl PlacedObject {
    pub fn at(id: u64, uv: Vec2) -> Self {
        Self {
            id,
            uv,
            rotation: 0.0,
            scale: 1.0,
        }
    }
}

/// Objects scattered over the edited landscape.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectLayer {
    objects: Vec<PlacedObject>,
    next_id: u64,
}

pub type SharedObjectLayer = Arc<Mutex<ObjectLayer>>;

pub fn lock_objects(layer: &SharedObjectLayer) -> MutexGuard<'_, ObjectLayer> {
    layer.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ObjectLayer {
    pub fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert(&mut self, object: PlacedObject) {
        self.next_id = self.next_id.max(object.id);
        self.objects.push(object);
    }

    pub fn remove(&mut self, id: u64) -> Option<PlacedObject> {
        let index = self.objects.iter().position(|object| object.id == id)?;
        Some(self.objects.remove(index))
    }

    pub fn objects(&self) -> &[PlacedObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn within(&self, center: Vec2, radius: f32) -> impl Iterator<Item = &PlacedObject> + '_ {
        self.objects
            .iter()
            .filter(move |object| object.uv.distance(center) <= radius)
    }
}

/// Objects added and removed by one placement stroke.
pub struct PlaceObjectsCommand {
    layer: SharedObjectLayer,
    added: Vec<PlacedObject>,
    removed: Vec<PlacedObject>,
}

impl PlaceObjectsCommand {
    /// `None` when the stroke neither added nor removed anything.
    pub fn new(
        layer: SharedObjectLayer,
        added: Vec<PlacedObject>,
        removed: Vec<PlacedObject>,
    ) -> Option<Self> {
        if added.is_empty() && removed.is_empty() {
            return None;
        }

        Some(Self {
            layer,
            added,
            removed,
        })
    }

    pub fn added(&self) -> &[PlacedObject] {
        &self.added
    }

    pub fn removed(&self) -> &[PlacedObject] {
        &self.removed
    }
}

impl EditorCommand for PlaceObjectsCommand {
    fn execute(&mut self) {
        let mut layer = lock_objects(&self.layer);
        for object in &self.removed {
            layer.remove(object.id);
        }
        for object in &self.added {
            layer.insert(*object);
        }
    }

    fn undo(&mut self) {
        let mut layer = lock_objects(&self.layer);
        for object in &self.added {
            layer.remove(object.id);
        }
        for object in &self.removed {
            layer.insert(*object);
        }
    }

    fn description(&self) -> &str {
        "Place objects"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::PlaceObjects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_command_swaps_added_and_removed_objects() {
        let layer = SharedObjectLayer::default();
        let existing = PlacedObject::at(1, Vec2::new(0.5, 0.5));
        lock_objects(&layer).insert(existing);

        let spawned = PlacedObject {
            rotation: 45.0,
            ..PlacedObject::at(2, Vec2::new(0.1, 0.1))
        };
        let mut command =
            PlaceObjectsCommand::new(layer.clone(), vec![spawned], vec![existing]).unwrap();

        command.execute();
        assert_eq!(lock_objects(&layer).objects(), &[spawned]);

        command.undo();
        assert_eq!(lock_objects(&layer).objects(), &[existing]);
    }

    #[test]
    fn empty_strokes_make_no_command() {
        assert!(PlaceObjectsCommand::new(SharedObjectLayer::default(), vec![], vec![]).is_none());
    }

    #[test]
    fn within_filters_by_distance() {
        let mut layer = ObjectLayer::default();
        for (id, x) in [(1, 0.1), (2, 0.5), (3, 0.52)] {
            layer.insert(PlacedObject::at(id, Vec2::new(x, 0.5)));
        }

        let ids: Vec<u64> = layer
            .within(Vec2::new(0.5, 0.5), 0.05)
            .map(|object| object.id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(layer.allocate_id(), 4);
    }
}
