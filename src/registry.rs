//! # Registry
//!
//! Tracks every sound category that should currently be saved, keyed by global form identifier.

use std::collections::HashMap;

use crate::host::{CategoryRef, SoundCategory};

/// Top byte of form identifiers belonging to light (ESL) packages
pub const LIGHT_PACKAGE_SENTINEL: u32 = 0xFE;

/// Whether `form_id` belongs to a light package
pub const fn is_light_form(form_id: u32) -> bool {
    form_id >> 24 == LIGHT_PACKAGE_SENTINEL
}

/// Package-relative part of a global form identifier.
///
/// The owning package index lives in the top byte; light packages also use the next 12 bits for their index.
pub const fn local_form_id(form_id: u32) -> u32 {
    let local = form_id & 0x00FF_FFFF;
    if is_light_form(form_id) {
        local & 0x0000_0FFF
    } else {
        local
    }
}

/// Store key for a local form identifier: eight uppercase hex digits
pub fn local_key(local_id: u32) -> String {
    format!("{local_id:08X}")
}

/// One category that is saved
pub struct CategoryEntry<C> {
    /// Name of the package that last defined the category; used as the store section
    pub owner: String,
    /// Package-relative form identifier
    pub local_id: u32,
    /// The live game object
    pub category: CategoryRef<C>,
}
impl<C: SoundCategory> CategoryEntry<C> {
    /// Creates an entry for `category` as defined by the package `owner`
    pub fn new(owner: impl Into<String>, category: CategoryRef<C>) -> Self {
        Self {
            owner: owner.into(),
            local_id: local_form_id(category.get().form_id()),
            category,
        }
    }
}
impl<C> CategoryEntry<C> {
    /// Key of this entry within its store section
    pub fn key(&self) -> String {
        local_key(self.local_id)
    }
}

/// Categories currently eligible for saving
pub struct CategoryRegistry<C> {
    /// Entries by global form identifier
    entries: HashMap<u32, CategoryEntry<C>>,
}
impl<C> Default for CategoryRegistry<C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}
impl<C> CategoryRegistry<C> {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry`, replacing whatever was tracked for `form_id`
    pub fn upsert(&mut self, form_id: u32, entry: CategoryEntry<C>) -> Option<CategoryEntry<C>> {
        self.entries.insert(form_id, entry)
    }

    /// Stops tracking `form_id`. Does nothing if it wasn't tracked.
    pub fn remove(&mut self, form_id: u32) -> Option<CategoryEntry<C>> {
        self.entries.remove(&form_id)
    }

    /// Entry for `form_id`
    pub fn get(&self, form_id: u32) -> Option<&CategoryEntry<C>> {
        self.entries.get(&form_id)
    }

    /// Whether `form_id` is tracked
    pub fn contains(&self, form_id: u32) -> bool {
        self.entries.contains_key(&form_id)
    }

    /// Number of tracked categories
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over every tracked entry. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &CategoryEntry<C>)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Visits every tracked entry
    pub fn for_each(&self, mut visitor: impl FnMut(u32, &CategoryEntry<C>)) {
        for (id, entry) in self.iter() {
            visitor(id, entry);
        }
    }
}
