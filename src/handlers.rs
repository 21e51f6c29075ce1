//! # Handlers
//!
//! What the interposers do after the original game function has run. Nothing here can change the result the game sees;
//! the `extern "C"` interposers in [`crate::skse`] return the original's result no matter what happens in here.

use std::path::Path;

use crate::bridge;
use crate::host::{CategoryRef, SoundCategory};
use crate::registry::{CategoryEntry, CategoryRegistry};
use crate::store::{PersistedStore, StoreError};

/// What a category load did to the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The category is shown on the menu and is now tracked
    Tracked,
    /// The category isn't shown on the menu; any earlier entry for it was dropped
    Untracked,
    /// The game failed to load the category, so nothing changed
    Failed,
}

/// Records the result of the game loading `category` from the package `owner`.
///
/// A later package can hide a category an earlier one showed, so a load without the menu flag removes the entry.
pub fn category_loaded<C: SoundCategory>(
    registry: &mut CategoryRegistry<C>,
    category: CategoryRef<C>,
    owner: &str,
    loaded: bool,
) -> LoadOutcome {
    if !loaded {
        log::warn!("sound category load error in {owner}, leaving it untracked");
        return LoadOutcome::Failed;
    }

    let form = category.get();
    let form_id = form.form_id();
    if form.is_menu_visible() {
        log::debug!("[{owner}] tracking sound category {form_id:08X} ({})", form.name());
        registry.upsert(form_id, CategoryEntry::new(owner, category));
        LoadOutcome::Tracked
    } else {
        if registry.remove(form_id).is_some() {
            log::debug!("[{owner}] sound category {form_id:08X} is no longer on the menu");
        }
        LoadOutcome::Untracked
    }
}

/// Saves the volume of every tracked category into `store` and writes it to `path`.
///
/// Returns how many categories were written.
pub fn preferences_saved<C: SoundCategory>(
    registry: &CategoryRegistry<C>,
    store: &mut PersistedStore,
    path: &Path,
) -> Result<usize, StoreError> {
    let written = bridge::write_volumes(registry, store);
    store.save(path)?;
    Ok(written)
}
