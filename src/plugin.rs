//! # Plugin
//!
//! Lifecycle of one activation: `Unvalidated -> Validated -> PatchesInstalled -> Listening`.
//!
//! Validation failures and a missing store are terminal; the plugin then never patches anything. Once listening, the
//! registry follows every category load, every preference save rewrites the store, and the first "data loaded"
//! broadcast pushes stored volumes back into the game.

use std::path::{Path, PathBuf};

use crate::bridge;
use crate::error::Error;
use crate::handlers::{self, LoadOutcome};
use crate::host::{CategoryRef, SoundCategory, VolumeControl};
use crate::registry::CategoryRegistry;
use crate::reloc::{offsets_for, Offsets, RuntimeVersion};
use crate::store::PersistedStore;

/// Loader broadcast sent once every package has been loaded
pub const MESSAGE_DATA_LOADED: u32 = 8;

/// Where an activation is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing checked yet
    Unvalidated,
    /// Build and loader checked, store loaded
    Validated,
    /// Both function table slots point at our interposers
    PatchesInstalled,
    /// Registered for loader broadcasts
    Listening,
}

/// What the loader tells us about the process we're in
#[derive(Clone, Copy, Debug)]
pub struct HostEnvironment {
    /// Build of the running game
    pub runtime_version: RuntimeVersion,
    /// Whether this is the Creation Kit
    pub is_editor: bool,
    /// Whether the messaging interface is available
    pub messaging_available: bool,
}

/// Checks that the plugin can run in `env`, returning the offsets for its build
pub fn validate(env: &HostEnvironment) -> Result<&'static Offsets, Error> {
    if env.is_editor {
        return Err(Error::Editor);
    }
    let offsets =
        offsets_for(env.runtime_version).ok_or(Error::UnsupportedRuntime(env.runtime_version))?;
    if !env.messaging_available {
        return Err(Error::MissingInterface("messaging"));
    }
    Ok(offsets)
}

/// State of a validated activation
pub struct Plugin<C, V> {
    /// Current lifecycle stage
    stage: Stage,
    /// Categories to save
    registry: CategoryRegistry<C>,
    /// Volumes read at startup, updated on every save
    store: PersistedStore,
    /// File backing `store`
    store_path: PathBuf,
    /// The game's volume setter
    volume_control: V,
    /// Whether stored volumes have been pushed into the game yet
    volumes_applied: bool,
}
impl<C, V> Plugin<C, V>
where
    C: SoundCategory,
    V: VolumeControl<C>,
{
    /// Loads the store at `store_path`.
    ///
    /// A store that can't be read is fatal: running without it would overwrite the user's volumes on the next save.
    pub fn load(store_path: impl Into<PathBuf>, volume_control: V) -> Result<Self, Error> {
        let store_path = store_path.into();
        let store = PersistedStore::load(&store_path)?;
        Ok(Self {
            stage: Stage::Validated,
            registry: CategoryRegistry::new(),
            store,
            store_path,
            volume_control,
            volumes_applied: false,
        })
    }

    /// Current lifecycle stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Records that both interposers are installed
    pub fn patches_installed(&mut self) {
        self.advance(Stage::PatchesInstalled);
    }

    /// Records that the broadcast listener is registered
    pub fn listening(&mut self) {
        self.advance(Stage::Listening);
    }

    /// Moves forward to `stage`; stages never go backwards
    fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    /// Tracked categories
    pub fn registry(&self) -> &CategoryRegistry<C> {
        &self.registry
    }

    /// Current store contents
    pub fn store(&self) -> &PersistedStore {
        &self.store
    }

    /// File the store is saved to
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Whether stored volumes have been applied
    pub fn volumes_applied(&self) -> bool {
        self.volumes_applied
    }

    /// The game finished loading `category` from `owner`; `loaded` is what the game's own load returned
    pub fn category_loaded(
        &mut self,
        category: CategoryRef<C>,
        owner: &str,
        loaded: bool,
    ) -> LoadOutcome {
        handlers::category_loaded(&mut self.registry, category, owner, loaded)
    }

    /// The game saved its preferences; save ours alongside. A failed save is logged and otherwise ignored.
    pub fn preferences_saved(&mut self) -> bool {
        match handlers::preferences_saved(&self.registry, &mut self.store, &self.store_path) {
            Ok(written) => {
                log::debug!("saved {written} sound categories");
                true
            }
            Err(e) => {
                log::warn!("warning: unable to save snct ini: {e}");
                false
            }
        }
    }

    /// Handles a loader broadcast. Returns how many volumes were applied, if this was the first "data loaded".
    pub fn handle_message(&mut self, kind: u32) -> Option<usize> {
        if kind != MESSAGE_DATA_LOADED || self.volumes_applied {
            return None;
        }
        self.volumes_applied = true;
        log::info!("game has loaded, setting volumes");
        let applied = bridge::apply_volumes(&self.registry, &self.store, &self.volume_control);
        log::info!("applied {applied} of {} sound category volumes", self.registry.len());
        Some(applied)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::registry::tests::{MockCategory, MockVolumeControl};
    use crate::reloc::RUNTIME_VERSION_1_5_39;

    /// Environment the plugin accepts
    fn supported() -> HostEnvironment {
        HostEnvironment {
            runtime_version: RUNTIME_VERSION_1_5_39,
            is_editor: false,
            messaging_available: true,
        }
    }

    #[test]
    /// Only the exact build, outside the editor, with messaging, validates
    fn test_validate() {
        assert!(validate(&supported()).is_ok());

        let editor = HostEnvironment {
            is_editor: true,
            ..supported()
        };
        assert!(matches!(validate(&editor), Err(Error::Editor)));

        let wrong_build = HostEnvironment {
            runtime_version: RuntimeVersion::new(1, 5, 97, 0),
            ..supported()
        };
        assert!(matches!(
            validate(&wrong_build),
            Err(Error::UnsupportedRuntime(v)) if v == RuntimeVersion::new(1, 5, 97, 0)
        ));

        let no_messaging = HostEnvironment {
            messaging_available: false,
            ..supported()
        };
        assert!(matches!(
            validate(&no_messaging),
            Err(Error::MissingInterface("messaging"))
        ));
    }

    #[test]
    /// A missing store stops activation
    fn test_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let result = Plugin::<MockCategory, _>::load(
            dir.path().join("SNCTSave.ini"),
            MockVolumeControl::default(),
        );
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[test]
    /// Stages only move forward
    fn test_stages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SNCTSave.ini");
        fs::write(&path, "").unwrap();

        let mut plugin =
            Plugin::<MockCategory, _>::load(&path, MockVolumeControl::default()).unwrap();
        assert_eq!(plugin.stage(), Stage::Validated);
        plugin.patches_installed();
        assert_eq!(plugin.stage(), Stage::PatchesInstalled);
        plugin.listening();
        plugin.patches_installed();
        assert_eq!(plugin.stage(), Stage::Listening);
    }

    #[test]
    /// Two packages save their categories, and a fresh activation puts the volumes back
    fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SNCTSave.ini");
        fs::write(&path, "").unwrap();

        let mut first = Plugin::<MockCategory, _>::load(&path, MockVolumeControl::default()).unwrap();
        let music = MockCategory::leak(0x0500_0010, true, 0.8, "Music");
        let sfx = MockCategory::leak(0x0600_002A, true, 0.5, "SFX");
        first.category_loaded(music, "A", true);
        first.category_loaded(sfx, "C", true);
        assert!(first.preferences_saved());

        let saved = PersistedStore::load(&path).unwrap();
        assert_eq!(saved.get("A", "00000010"), Some("0.800000"));
        assert_eq!(saved.get("C", "0000002A"), Some("0.500000"));

        // next session: the game loads the categories at their defaults
        let mut second = Plugin::<MockCategory, _>::load(&path, MockVolumeControl::default()).unwrap();
        let music = MockCategory::leak(0x0500_0010, true, 1.0, "Music");
        let sfx = MockCategory::leak(0x0600_002A, true, 1.0, "SFX");
        let untouched = MockCategory::leak(0x0600_002B, true, 0.3, "Ambient");
        second.category_loaded(music, "A", true);
        second.category_loaded(sfx, "C", true);
        second.category_loaded(untouched, "C", true);

        assert_eq!(second.handle_message(MESSAGE_DATA_LOADED), Some(2));
        assert_eq!(music.get().volume(), 0.8);
        assert_eq!(sfx.get().volume(), 0.5);
        assert_eq!(untouched.get().volume(), 0.3);
    }

    #[test]
    /// Volumes are applied on the first "data loaded" only, other broadcasts are ignored
    fn test_apply_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SNCTSave.ini");
        fs::write(&path, "[A]\n00000010 = 0.25\n").unwrap();

        let mut plugin = Plugin::<MockCategory, _>::load(&path, MockVolumeControl::default()).unwrap();
        let music = MockCategory::leak(0x0500_0010, true, 1.0, "Music");
        plugin.category_loaded(music, "A", true);

        assert_eq!(plugin.handle_message(0), None);
        assert_eq!(plugin.handle_message(3), None);
        assert!(!plugin.volumes_applied());
        assert_eq!(music.get().volume(), 1.0);

        assert_eq!(plugin.handle_message(MESSAGE_DATA_LOADED), Some(1));
        assert_eq!(music.get().volume(), 0.25);

        // the player changes it, a second broadcast must not undo that
        music.get().volume.set(0.9);
        assert_eq!(plugin.handle_message(MESSAGE_DATA_LOADED), None);
        assert_eq!(music.get().volume(), 0.9);
        assert_eq!(plugin.volume_control.calls.get(), 1);
    }

    #[test]
    /// A failed save leaves the plugin running
    fn test_save_failure_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SNCTSave.ini");
        fs::write(&path, "").unwrap();

        let mut plugin = Plugin::<MockCategory, _>::load(&path, MockVolumeControl::default()).unwrap();
        let music = MockCategory::leak(0x0500_0010, true, 0.8, "Music");
        plugin.category_loaded(music, "A", true);

        // replace the file with a directory so the write fails
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        assert!(!plugin.preferences_saved());
        assert_eq!(plugin.registry().len(), 1);
        assert_eq!(plugin.store_path(), path);
        assert_eq!(plugin.store().get("A", "00000010"), Some("0.800000"));
    }
}
