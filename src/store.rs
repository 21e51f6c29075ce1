//! # Store
//!
//! The INI document volumes are persisted in.
//!
//! ```ini
//! [Dawnguard.esm]
//! 00000010 = 0.800000 ; Music
//! ```
//!
//! Sections are package names, keys are local form identifiers, and the trailing comment is the category's name.
//! Comments are for people reading the file and are never read back. Section and key lookups ignore ASCII case.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Value [`PersistedStore::get_f64`] callers pass to mean "not stored"
pub const ABSENT: f64 = -1.0;

/// Errors when reading or writing the store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file couldn't be read
    #[error("unable to load {}: {source}", path.display())]
    Load {
        /// File that was being read
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
    /// The file couldn't be written
    #[error("unable to save {}: {source}", path.display())]
    Save {
        /// File that was being written
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

/// A `key = value` line
#[derive(Clone, Debug, PartialEq)]
struct Entry {
    /// Key as first written
    key: String,
    /// Raw value text
    value: String,
    /// Inline comment, without the leading `;`
    comment: Option<String>,
}

/// A `[section]` and its entries
#[derive(Clone, Debug, PartialEq)]
struct Section {
    /// Section name as first written
    name: String,
    /// Entries in file order
    entries: Vec<Entry>,
}
impl Section {
    /// Entry for `key`
    fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key.eq_ignore_ascii_case(key))
    }
}

/// Sections of `key = value` pairs, kept in file order so a save rewrites the file the way it was read
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistedStore {
    /// Sections in file order
    sections: Vec<Section>,
}
impl PersistedStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses the file at `path`. A missing file is an error.
    ///
    /// Bytes that aren't UTF-8, e.g. a category name written in the local code page, are replaced rather than
    /// rejected. They only ever show up in comments.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| StoreError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Parses INI text. Lines that are neither sections, comments nor `key = value` pairs are skipped.
    pub fn parse(text: &str) -> Self {
        let mut store = Self::new();
        // keys before any section header go in the unnamed section
        let mut current = String::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim_start_matches('\u{feff}').trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some((name, rest)) = line.strip_prefix('[').and_then(|l| l.split_once(']')) {
                let rest = rest.trim_start();
                if rest.is_empty() || rest.starts_with(';') || rest.starts_with('#') {
                    current = name.trim().to_string();
                    store.section_mut(&current);
                    continue;
                }
            }
            let Some((key, rest)) = line.split_once('=') else {
                log::debug!("skipping line {} of store: {line:?}", number + 1);
                continue;
            };
            let (value, comment) = split_comment(rest);
            store.set(&current, key.trim(), value, comment);
        }
        store
    }

    /// Writes the whole store to `path`, replacing the file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        fs::write(path, self.to_string()).map_err(|source| StoreError::Save {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Raw value text for `key` in `section`
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .entry(key)
            .map(|entry| entry.value.as_str())
    }

    /// Numeric value for `key` in `section`, or `default` when it's missing or not a number
    pub fn get_f64(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get(section, key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// Sets `key` in `section` to `value`, creating either as needed
    pub fn set_f64(&mut self, section: &str, key: &str, value: f64, comment: Option<&str>) {
        self.set(section, key, &format!("{value:.6}"), comment);
    }

    /// Section names in file order
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Keys of `section` in file order
    pub fn keys<'a>(&'a self, section: &str) -> impl Iterator<Item = &'a str> {
        self.section(section)
            .into_iter()
            .flat_map(|s| s.entries.iter().map(|e| e.key.as_str()))
    }

    /// Section named `name`
    fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Section named `name`, appended if it doesn't exist yet
    fn section_mut(&mut self, name: &str) -> &mut Section {
        let index = match self
            .sections
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
        {
            Some(index) => index,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    /// Sets the raw text of `key`, keeping the existing spelling of the key if there is one
    fn set(&mut self, section: &str, key: &str, value: &str, comment: Option<&str>) {
        let comment = comment
            .map(|c| c.replace(['\r', '\n'], " ").trim().to_string())
            .filter(|c| !c.is_empty());
        let section = self.section_mut(section);
        match section
            .entries
            .iter_mut()
            .find(|e| e.key.eq_ignore_ascii_case(key))
        {
            Some(entry) => {
                entry.value = value.to_string();
                entry.comment = comment;
            }
            None => section.entries.push(Entry {
                key: key.to_string(),
                value: value.to_string(),
                comment,
            }),
        }
    }
}

impl fmt::Display for PersistedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for section in &self.sections {
            if !first {
                writeln!(f)?;
            }
            first = false;
            if !section.name.is_empty() {
                writeln!(f, "[{}]", section.name)?;
            }
            for entry in &section.entries {
                write!(f, "{} = {}", entry.key, entry.value)?;
                if let Some(comment) = &entry.comment {
                    write!(f, " ; {comment}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Splits `value ; comment`. A comment marker only counts at the start or after whitespace.
fn split_comment(rest: &str) -> (&str, Option<&str>) {
    let bytes = rest.as_bytes();
    let marker = (0..bytes.len()).find(|&i| {
        matches!(bytes[i], b';' | b'#') && (i == 0 || bytes[i - 1].is_ascii_whitespace())
    });
    match marker {
        Some(i) => (rest[..i].trim(), Some(rest[i + 1..].trim())),
        None => (rest.trim(), None),
    }
}
