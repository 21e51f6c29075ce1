//! # Bridge
//!
//! Moves volumes between tracked categories and the store: `[owner] local id = volume ; name`.

use crate::host::{SoundCategory, VolumeControl};
use crate::registry::{CategoryEntry, CategoryRegistry};
use crate::store::{PersistedStore, ABSENT};

/// Writes the live volume of every tracked category into `store`, overwriting earlier values.
///
/// Returns how many categories were written.
pub fn write_volumes<C: SoundCategory>(
    registry: &CategoryRegistry<C>,
    store: &mut PersistedStore,
) -> usize {
    let mut written = 0;
    registry.for_each(|_, entry| {
        let category = entry.category.get();
        store.set_f64(
            &entry.owner,
            &entry.key(),
            f64::from(category.volume()),
            Some(&category.name()),
        );
        written += 1;
    });
    written
}

/// Volume stored for `entry`, if there is one
pub fn stored_volume<C>(store: &PersistedStore, entry: &CategoryEntry<C>) -> Option<f32> {
    let volume = store.get_f64(&entry.owner, &entry.key(), ABSENT);
    // exact comparison: the sentinel is what comes back untouched when nothing is stored
    #[allow(clippy::float_cmp)]
    let absent = volume == ABSENT;
    (!absent).then_some(volume as f32)
}

/// Pushes stored volumes back into the game. Categories without a stored volume keep whatever the game gave them.
///
/// Returns how many categories were changed.
pub fn apply_volumes<C, V>(
    registry: &CategoryRegistry<C>,
    store: &PersistedStore,
    control: &V,
) -> usize
where
    V: VolumeControl<C>,
{
    let mut applied = 0;
    registry.for_each(|form_id, entry| {
        if let Some(volume) = stored_volume(store, entry) {
            log::debug!("setting volume for formid {form_id:08X} to {volume}");
            control.set_volume(entry.category, volume);
            applied += 1;
        }
    });
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{MockCategory, MockVolumeControl};

    #[test]
    /// Every tracked category lands in its owner's section under its local id
    fn test_write_volumes() {
        let mut registry = CategoryRegistry::new();
        let music = MockCategory::leak(0x0500_0010, true, 0.8, "Music");
        let voice = MockCategory::leak(0xFE00_1801, true, 0.25, "Voice");
        registry.upsert(0x0500_0010, CategoryEntry::new("A.esp", music));
        registry.upsert(0xFE00_1801, CategoryEntry::new("Light.esl", voice));

        let mut store = PersistedStore::parse("[A.esp]\n00000010 = 0.1\n[Other.esp]\n00000001 = 0.9\n");
        assert_eq!(write_volumes(&registry, &mut store), 2);

        assert_eq!(store.get_f64("A.esp", "00000010", ABSENT) as f32, 0.8);
        assert_eq!(store.get_f64("Light.esl", "00000801", ABSENT), 0.25);
        // entries nobody tracks this session survive
        assert_eq!(store.get_f64("Other.esp", "00000001", ABSENT), 0.9);
        assert!(store.to_string().contains("00000010 = 0.800000 ; Music"));
    }

    #[test]
    /// Only categories with a stored volume are touched
    fn test_apply_volumes() {
        let mut registry = CategoryRegistry::new();
        let stored = MockCategory::leak(0x0600_002A, true, 1.0, "SFX");
        let missing = MockCategory::leak(0x0600_002B, true, 0.7, "Ambient");
        registry.upsert(0x0600_002A, CategoryEntry::new("C.esp", stored));
        registry.upsert(0x0600_002B, CategoryEntry::new("C.esp", missing));

        let store = PersistedStore::parse("[C.esp]\n0000002A = 0.5\n0000002C = 0.1\n");
        let control = MockVolumeControl::default();

        assert_eq!(apply_volumes(&registry, &store, &control), 1);
        assert_eq!(control.calls.get(), 1);
        assert_eq!(stored.get().volume(), 0.5);
        assert_eq!(missing.get().volume(), 0.7);
    }

    #[test]
    /// A literal sentinel in the file reads as nothing stored
    fn test_sentinel_is_absent() {
        let category = MockCategory::leak(0x0500_0010, true, 0.6, "Music");
        let entry = CategoryEntry::new("A.esp", category);

        let store = PersistedStore::parse("[A.esp]\n00000010 = -1.0\n");
        assert_eq!(stored_volume(&store, &entry), None);

        let store = PersistedStore::parse("[A.esp]\n00000010 = 0\n");
        assert_eq!(stored_volume(&store, &entry), Some(0.0));
    }
}
