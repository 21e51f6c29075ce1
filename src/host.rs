//! # Host
//!
//! Views onto objects owned by the game. Nothing here allocates or frees host memory; the plugin only reads
//! fields and asks the game to change a category's volume through its own accessor.

use std::ffi::{c_char, c_void, CStr};
use std::ptr::{self, NonNull};

/// A sound category as far as the plugin is concerned
pub trait SoundCategory {
    /// Global form identifier, including the owning package index in the high byte
    fn form_id(&self) -> u32;
    /// Whether the category is shown on the audio settings menu, and therefore saved
    fn is_menu_visible(&self) -> bool;
    /// Volume currently set for the category
    fn volume(&self) -> f32;
    /// Display name
    fn name(&self) -> String;
}

/// Non-owning reference to a host object.
///
/// The host owns the object and keeps it alive for the rest of the process once it has been loaded.
pub struct CategoryRef<C>(NonNull<C>);
impl<C> CategoryRef<C> {
    /// Wraps a pointer handed to us by the host
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live object that outlives every use of the returned reference
    pub unsafe fn from_raw(ptr: NonNull<C>) -> Self {
        Self(ptr)
    }
    /// Wraps an object that lives for the rest of the process
    pub fn from_static(category: &'static C) -> Self {
        Self(NonNull::from(category))
    }
    /// Pointer to the host object
    pub fn as_ptr(&self) -> *mut C {
        self.0.as_ptr()
    }
    /// Borrows the host object for reading
    pub fn get(&self) -> &C {
        // Safety: the constructors require the object to outlive this reference
        unsafe { self.0.as_ref() }
    }
}
impl<C> Clone for CategoryRef<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C> Copy for CategoryRef<C> {}
impl<C> PartialEq for CategoryRef<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<C> std::fmt::Debug for CategoryRef<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CategoryRef({:p})", self.0)
    }
}
// Safety: host objects are only ever touched from the host's main thread, the mutex around the plugin state only
// exists to satisfy `static`
unsafe impl<C> Send for CategoryRef<C> {}

/// The game's own "set volume" capability
pub trait VolumeControl<C> {
    /// Sets the volume of `category`
    fn set_volume(&self, category: CategoryRef<C>, volume: f32);
}

/// `BSFixedString`: a pointer into the game's string pool
#[repr(C)]
pub struct BSFixedString {
    /// Pooled, nul-terminated string, or null for the empty string
    data: *const c_char,
}
impl BSFixedString {
    /// Wraps a nul-terminated string
    pub const fn new(data: *const c_char) -> Self {
        Self { data }
    }
    /// Copies the string out of the pool
    pub fn to_string_lossy(&self) -> String {
        if self.data.is_null() {
            return String::new();
        }
        // Safety: non-null pool entries are always nul-terminated
        unsafe { CStr::from_ptr(self.data) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Bit in [`SoundCategoryForm::flags`] set for categories shown on the settings menu
pub const SHOULD_APPEAR_ON_MENU: u32 = 0x2;

/// `BGSSoundCategory`, laid out as in 1.5.39
#[repr(C)]
pub struct SoundCategoryForm {
    /// `TESForm` vtable
    pub vtable: *const usize, // 00
    /// Files that touched this form
    pub source_files: *mut c_void, // 08
    /// `TESForm` flags
    pub form_flags: u32, // 10
    /// Global form identifier
    pub form_id: u32, // 14
    /// In-game form flags
    pub in_game_form_flags: u16, // 18
    /// Form type
    pub form_type: u8, // 1A
    /// Padding
    pub _pad1b: [u8; 5], // 1B
    /// `TESFullName` vtable
    pub full_name_vtable: *const usize, // 20
    /// Display name
    pub full_name: BSFixedString, // 28
    /// `BSISoundCategory` vtable; the address of this field is the interface pointer the game passes around
    pub sound_category_vtable: *const usize, // 30
    /// Parent category
    pub parent_category: *mut SoundCategoryForm, // 38
    /// Unknown
    pub unk40: *mut c_void, // 40
    /// Category flags, see [`SHOULD_APPEAR_ON_MENU`]
    pub flags: u32, // 48
    /// Static volume multiplier
    pub static_volume_mult: u16, // 4C
    /// Default slider position
    pub default_menu_value: u16, // 4E
    /// Volume as set from the settings menu
    pub in_game_volume: f32, // 50
    /// Frequency multiplier
    pub frequency_mult: f32, // 54
}
impl SoundCategoryForm {
    /// Pointer to the `BSISoundCategory` sub-object of the form at `this`
    pub fn interface_ptr(this: *mut Self) -> *mut c_void {
        // Safety: only computes an address inside the object, nothing is read
        unsafe { ptr::addr_of_mut!((*this).sound_category_vtable).cast() }
    }
}
impl SoundCategory for SoundCategoryForm {
    fn form_id(&self) -> u32 {
        self.form_id
    }
    fn is_menu_visible(&self) -> bool {
        self.flags & SHOULD_APPEAR_ON_MENU != 0
    }
    fn volume(&self) -> f32 {
        // Safety: the game writes this field itself, so read it fresh every time
        unsafe { ptr::read_volatile(&self.in_game_volume) }
    }
    fn name(&self) -> String {
        self.full_name.to_string_lossy()
    }
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(std::mem::offset_of!(SoundCategoryForm, form_id) == 0x14);
    assert!(std::mem::offset_of!(SoundCategoryForm, full_name) == 0x28);
    assert!(std::mem::offset_of!(SoundCategoryForm, sound_category_vtable) == 0x30);
    assert!(std::mem::offset_of!(SoundCategoryForm, flags) == 0x48);
    assert!(std::mem::offset_of!(SoundCategoryForm, in_game_volume) == 0x50);
    assert!(std::mem::size_of::<SoundCategoryForm>() == 0x58);
};

/// Max length of a package file name
pub const MAX_PATH: usize = 260;

/// `ModInfo`: the package a form is being loaded from. Only the leading part the plugin reads is described.
#[repr(C)]
pub struct ModInfo {
    /// Fields the plugin never touches
    pub _unk000: [u8; 0x58],
    /// Package file name, e.g. `Dawnguard.esm`
    pub name: [c_char; MAX_PATH], // 58
}
impl ModInfo {
    /// Package file name, up to the first nul
    pub fn name(&self) -> String {
        let bytes: Vec<u8> = self
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// `BSISoundCategory::SetVolume`
pub type SetVolumeFn = unsafe extern "C" fn(this: *mut c_void, volume: f32) -> bool;

/// Sets volumes by calling the game's `BSISoundCategory::SetVolume` directly
#[derive(Clone, Copy)]
pub struct HostVolumeControl {
    /// Resolved address of the game function
    set_volume: SetVolumeFn,
}
impl HostVolumeControl {
    /// Wraps the game's setter
    ///
    /// # Safety
    ///
    /// `set_volume` must be the game's `BSISoundCategory::SetVolume` for the running build
    pub unsafe fn new(set_volume: SetVolumeFn) -> Self {
        Self { set_volume }
    }
}
impl VolumeControl<SoundCategoryForm> for HostVolumeControl {
    fn set_volume(&self, category: CategoryRef<SoundCategoryForm>, volume: f32) {
        let interface = SoundCategoryForm::interface_ptr(category.as_ptr());
        // Safety: `category` is a live game object and the setter matches the running build
        unsafe { (self.set_volume)(interface, volume) };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::ffi::c_void;
    use std::ptr;

    use super::*;

    /// Builds a zeroed category with the given identity
    pub fn form(form_id: u32, flags: u32, volume: f32, name: &'static [u8]) -> SoundCategoryForm {
        SoundCategoryForm {
            vtable: ptr::null(),
            source_files: ptr::null_mut(),
            form_flags: 0,
            form_id,
            in_game_form_flags: 0,
            form_type: 0,
            _pad1b: [0; 5],
            full_name_vtable: ptr::null(),
            full_name: BSFixedString::new(name.as_ptr().cast()),
            sound_category_vtable: ptr::null(),
            parent_category: ptr::null_mut(),
            unk40: ptr::null_mut(),
            flags,
            static_volume_mult: 0,
            default_menu_value: 0,
            in_game_volume: volume,
            frequency_mult: 1.0,
        }
    }

    #[test]
    /// Fields are read through the trait the way the handlers see them
    fn test_form_fields() {
        let music = form(0x0500_0010, SHOULD_APPEAR_ON_MENU, 0.8, b"Music\0");
        assert_eq!(music.form_id(), 0x0500_0010);
        assert!(music.is_menu_visible());
        assert_eq!(music.volume(), 0.8);
        assert_eq!(music.name(), "Music");

        let hidden = form(0x0500_0011, 0x1 | 0x4, 1.0, b"\0");
        assert!(!hidden.is_menu_visible());
        assert_eq!(hidden.name(), "");

        let unnamed = BSFixedString::new(ptr::null());
        assert_eq!(unnamed.to_string_lossy(), "");
    }

    /// Builds package info for `name`
    pub fn mod_info(name: &str) -> ModInfo {
        let mut info = ModInfo {
            _unk000: [0; 0x58],
            name: [0; MAX_PATH],
        };
        for (dst, src) in info.name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        info
    }

    #[test]
    /// Package names stop at the first nul
    fn test_mod_info_name() {
        assert_eq!(mod_info("Dawnguard.esm").name(), "Dawnguard.esm");
        assert_eq!(mod_info("").name(), "");
    }

    /// Fake `SetVolume` that writes back into the form owning the interface
    unsafe extern "C" fn fake_set_volume(this: *mut c_void, volume: f32) -> bool {
        let offset = std::mem::offset_of!(SoundCategoryForm, sound_category_vtable);
        let form = this.cast::<u8>().sub(offset).cast::<SoundCategoryForm>();
        (*form).in_game_volume = volume;
        true
    }

    #[test]
    /// The setter is handed the interface sub-object, not the form
    fn test_host_volume_control() {
        let mut sfx = form(0x0600_002A, SHOULD_APPEAR_ON_MENU, 1.0, b"SFX\0");
        let category = unsafe { CategoryRef::from_raw(NonNull::from(&mut sfx)) };

        let control = unsafe { HostVolumeControl::new(fake_set_volume) };
        control.set_volume(category, 0.5);

        assert_eq!(category.get().volume(), 0.5);
    }
}
