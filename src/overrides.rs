//! Bookkeeping for landscape textures temporarily replaced by a tool's
//! working (morph) textures.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::gpu::TextureHandle;
use crate::landscape::{lock_landscape, Landscape, SharedLandscape, TextureSlot};

/// Slot -> original texture, for every slot whose live texture is a working
/// texture.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TextureOverrides {
    originals: BTreeMap<TextureSlot, TextureHandle>,
}

pub type SharedOverrides = Arc<Mutex<TextureOverrides>>;

/// Overrides are always locked before the landscape they refer to.
pub fn lock_overrides(overrides: &SharedOverrides) -> MutexGuard<'_, TextureOverrides> {
    overrides.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TextureOverrides {
    /// Puts `texture` in place of the live texture of `slot`, remembering the
    /// original. A slot can only be overridden once.
    pub fn set_override(
        &mut self,
        landscape: &mut dyn Landscape,
        slot: TextureSlot,
        texture: TextureHandle,
    ) {
        debug_assert!(
            !self.originals.contains_key(&slot),
            "texture slot {slot:?} is already overridden"
        );
        if self.originals.contains_key(&slot) {
            return;
        }

        let Some(original) = landscape.texture(slot) else {
            return;
        };

        landscape.set_texture(slot, texture);
        self.originals.insert(slot, original);
    }

    /// The real texture of `slot`, whether or not it is overridden.
    pub fn original_texture(
        &self,
        landscape: &dyn Landscape,
        slot: TextureSlot,
    ) -> Option<TextureHandle> {
        self.originals
            .get(&slot)
            .copied()
            .or_else(|| landscape.texture(slot))
    }

    pub fn is_overridden(&self, slot: TextureSlot) -> bool {
        self.originals.contains_key(&slot)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureSlot, TextureHandle)> + '_ {
        self.originals.iter().map(|(slot, texture)| (*slot, *texture))
    }

    /// Swaps the originals back in and returns whatever was live before.
    fn swap_in_originals(
        &self,
        landscape: &mut dyn Landscape,
    ) -> BTreeMap<TextureSlot, TextureHandle> {
        let mut live = BTreeMap::new();
        for (slot, original) in self.iter() {
            if let Some(current) = landscape.texture(slot) {
                live.insert(slot, current);
            }
            landscape.set_texture(slot, original);
        }
        live
    }

    /// Puts every original back for good and forgets the mapping.
    pub fn restore_all(&mut self, landscape: &mut dyn Landscape) {
        for (slot, original) in std::mem::take(&mut self.originals) {
            landscape.set_texture(slot, original);
        }
    }
}

/// While alive, the landscape shows its original textures instead of the
/// overrides. Dropping it swaps the overrides back, also during unwinding.
///
/// No lock is held for the lifetime of the scope, so code running inside it
/// may lock the landscape (or open another scope) freely.
pub struct OriginalTexturesScope {
    landscape: SharedLandscape,
    live: BTreeMap<TextureSlot, TextureHandle>,
}

impl OriginalTexturesScope {
    pub fn enter(landscape: &SharedLandscape, overrides: &SharedOverrides) -> Self {
        let overrides = lock_overrides(overrides);
        let live = {
            let mut landscape = lock_landscape(landscape);
            overrides.swap_in_originals(&mut *landscape)
        };

        Self {
            landscape: landscape.clone(),
            live,
        }
    }
}

impl Drop for OriginalTexturesScope {
    fn drop(&mut self) {
        let mut landscape = lock_landscape(&self.landscape);
        for (slot, texture) in std::mem::take(&mut self.live) {
            landscape.set_texture(slot, texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::MemoryLandscape;
    use crate::landscape::shared_landscape;

    const HEIGHT: TextureHandle = TextureHandle(10);
    const TANGENT: TextureHandle = TextureHandle(11);
    const MORPH: TextureHandle = TextureHandle(20);
    const NORMAL_COPY: TextureHandle = TextureHandle(21);

    fn overridden_landscape() -> (SharedLandscape, SharedOverrides) {
        let landscape = shared_landscape(
            MemoryLandscape::new(16, 16)
                .with_texture(TextureSlot::HEIGHTMAP, HEIGHT)
                .with_texture(TextureSlot::TANGENT, TANGENT),
        );
        let overrides = SharedOverrides::default();
        {
            let mut map = lock_overrides(&overrides);
            let mut land = lock_landscape(&landscape);
            map.set_override(&mut *land, TextureSlot::HEIGHTMAP, MORPH);
            map.set_override(&mut *land, TextureSlot::TANGENT, NORMAL_COPY);
        }
        (landscape, overrides)
    }

    #[test]
    fn overridden_slots_show_the_working_texture() {
        let (landscape, overrides) = overridden_landscape();
        let map = lock_overrides(&overrides);
        let land = lock_landscape(&landscape);

        assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(MORPH));
        assert_eq!(land.texture(TextureSlot::TANGENT), Some(NORMAL_COPY));
        assert_eq!(map.original_texture(&*land, TextureSlot::HEIGHTMAP), Some(HEIGHT));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn scope_shows_originals_and_swaps_back() {
        let (landscape, overrides) = overridden_landscape();

        {
            let _scope = OriginalTexturesScope::enter(&landscape, &overrides);
            let land = lock_landscape(&landscape);
            assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(HEIGHT));
            assert_eq!(land.texture(TextureSlot::TANGENT), Some(TANGENT));
        }

        let land = lock_landscape(&landscape);
        assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(MORPH));
        assert_eq!(land.texture(TextureSlot::TANGENT), Some(NORMAL_COPY));
    }

    #[test]
    fn back_to_back_scopes_leave_live_textures_unchanged() {
        let (landscape, overrides) = overridden_landscape();

        drop(OriginalTexturesScope::enter(&landscape, &overrides));
        drop(OriginalTexturesScope::enter(&landscape, &overrides));

        let land = lock_landscape(&landscape);
        assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(MORPH));
        assert_eq!(land.texture(TextureSlot::TANGENT), Some(NORMAL_COPY));
    }

    #[test]
    fn nested_scopes_restore_in_order() {
        let (landscape, overrides) = overridden_landscape();

        {
            let _outer = OriginalTexturesScope::enter(&landscape, &overrides);
            {
                let _inner = OriginalTexturesScope::enter(&landscape, &overrides);
            }
            let land = lock_landscape(&landscape);
            assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(HEIGHT));
        }

        let land = lock_landscape(&landscape);
        assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(MORPH));
    }

    #[test]
    fn scope_restores_overrides_when_the_work_panics() {
        let (landscape, overrides) = overridden_landscape();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = OriginalTexturesScope::enter(&landscape, &overrides);
            panic!("readback failed");
        }));
        assert!(result.is_err());

        let land = lock_landscape(&landscape);
        assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(MORPH));
    }

    #[test]
    fn restore_all_empties_the_mapping() {
        let (landscape, overrides) = overridden_landscape();
        {
            let mut map = lock_overrides(&overrides);
            let mut land = lock_landscape(&landscape);
            map.restore_all(&mut *land);
        }

        assert!(lock_overrides(&overrides).is_empty());
        let land = lock_landscape(&landscape);
        assert_eq!(land.texture(TextureSlot::HEIGHTMAP), Some(HEIGHT));
        assert_eq!(land.texture(TextureSlot::TANGENT), Some(TANGENT));
    }
}
