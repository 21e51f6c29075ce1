//! # Hook
//!
//! This module covers hooks, which redirect calls made through a function table to an interposer

pub mod slot;

pub use self::slot::{install, InstallError};

/// Trait for hooks
///
/// # Safety
///
/// Hooks are inherently unsafe; it is up to the hook to leave the target in a callable state at all times
pub unsafe trait Hook {
    /// Errors that could happen during a hook
    type Error;
    /// Hook guard to allow functions to be automatically unhooked when the guard goes out of scope
    type Guard<'a>: HookGuard + 'a
    where
        Self: 'a;

    /// Points the function table `slot` at `destination`.
    ///
    /// # Safety
    ///
    /// - `slot` must be a valid, pointer-aligned function table entry
    /// - `destination` must be a function with exactly the calling contract of the one currently in `slot`
    unsafe fn hook(
        &self,
        slot: *mut usize,
        destination: *const (),
    ) -> Result<Self::Guard<'_>, Self::Error>;
}

/// Guard for a currently active hook
///
/// # Safety
///
/// Must ensure that the guard fully unhooks whether dropped or unhooked via `unhook`
pub unsafe trait HookGuard: Sized {
    /// The function that was in the slot before the hook, for forwarding
    fn original(&self) -> *const ();

    /// Manually unhooks the hook rather than letting the guard go out of scope
    fn unhook(self) {
        // most guards will implement all functionality in [`Drop::drop`]
    }

    /// Leaves the hook installed for the lifetime of the process and returns the original function
    fn persist(self) -> *const ();
}
