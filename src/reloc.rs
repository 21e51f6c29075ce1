//! # Reloc
//!
//! Resolves build-specific offsets into absolute addresses inside the host's main module.
//!
//! Offsets are only meaningful for the exact runtime build they were measured against, so they live
//! in a table keyed by [`RuntimeVersion`] and are never consulted for any other build.

use std::fmt;

use thiserror::Error;

/// Errors when locating the host module
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The loader could not hand out a handle for the host executable
    #[error("unable to get a handle to the host module")]
    Unavailable,
    /// The current platform has no way of locating the host module
    #[error("host module lookup is not supported on this platform")]
    Unsupported,
}

/// Packed runtime version as reported by the loader: `major.minor.build.sub`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeVersion(u32);
impl RuntimeVersion {
    /// Packs a version the same way the loader does
    pub const fn new(major: u32, minor: u32, build: u32, sub: u32) -> Self {
        Self(((major & 0xFF) << 24) | ((minor & 0xFF) << 16) | ((build & 0xFFF) << 4) | (sub & 0xF))
    }
    /// Wraps an already packed version
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    /// Packed representation
    pub const fn raw(self) -> u32 {
        self.0
    }
    /// Major version
    pub const fn major(self) -> u32 {
        self.0 >> 24
    }
    /// Minor version
    pub const fn minor(self) -> u32 {
        (self.0 >> 16) & 0xFF
    }
    /// Build number
    pub const fn build(self) -> u32 {
        (self.0 >> 4) & 0xFFF
    }
    /// Sub-build number
    pub const fn sub(self) -> u32 {
        self.0 & 0xF
    }
}
impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{} ({:08X})",
            self.major(),
            self.minor(),
            self.build(),
            self.sub(),
            self.0
        )
    }
}

/// Skyrim Special Edition 1.5.39
pub const RUNTIME_VERSION_1_5_39: RuntimeVersion = RuntimeVersion::new(1, 5, 39, 0);

/// Offsets from the host module base, valid for a single runtime build
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Offsets {
    /// `BGSSoundCategory` vtable, slot 6 (`LoadForm`)
    pub sound_category_load_form_slot: usize,
    /// `INIPrefSettingCollection` vtable, slot 8 (save from the settings menu)
    pub pref_collection_save_slot: usize,
    /// `BSISoundCategory::SetVolume`, called directly and never patched
    pub sound_category_set_volume: usize,
}

/// Every runtime build the plugin knows offsets for
pub static OFFSETS: &[(RuntimeVersion, Offsets)] = &[(
    RUNTIME_VERSION_1_5_39,
    Offsets {
        sound_category_load_form_slot: 0x0159_1050,
        pref_collection_save_slot: 0x0154_FB18,
        sound_category_set_volume: 0x002C_E090,
    },
)];

/// Looks up the offsets measured against exactly `version`
pub fn offsets_for(version: RuntimeVersion) -> Option<&'static Offsets> {
    OFFSETS
        .iter()
        .find(|(known, _)| *known == version)
        .map(|(_, offsets)| offsets)
}

/// Load address of the host's main module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleBase(usize);
impl ModuleBase {
    /// Wraps a known base address
    pub const fn new(address: usize) -> Self {
        Self(address)
    }

    /// Queries the loader for the base of the executable that started this process
    #[cfg(windows)]
    pub fn current() -> Result<Self, ModuleError> {
        use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;

        // Safety: a null module name asks for the calling process's executable and has no other preconditions
        let handle = unsafe { GetModuleHandleW(std::ptr::null()) };
        if handle == 0 {
            return Err(ModuleError::Unavailable);
        }
        Ok(Self(handle as usize))
    }

    /// Queries the loader for the base of the executable that started this process
    #[cfg(not(windows))]
    pub fn current() -> Result<Self, ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Base address
    pub const fn address(self) -> usize {
        self.0
    }

    /// Resolves `offset` against this base
    pub const fn resolve(self, offset: usize) -> RelocAddr {
        RelocAddr(self.0.wrapping_add(offset))
    }
}

/// An absolute address inside the host module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelocAddr(usize);
impl RelocAddr {
    /// Absolute address
    pub const fn address(self) -> usize {
        self.0
    }
    /// Reinterprets the address as a pointer to `T`
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}
