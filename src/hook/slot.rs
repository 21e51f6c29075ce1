//! # Slot Hook
//!
//! This hook type overwrites one entry of a function table, so every virtual call through that entry lands in the interposer

use crate::patcher::mem::{PermissionError, PermissionWrapper};
use crate::patcher::word::{WordError, WordPatcher};
use crate::patcher::{PatchGuard, Patcher};

use super::{Hook, HookGuard};

/// Errors when installing an interposer into a read-only function table
pub type InstallError = PermissionError<WordError>;

/// Function table slot hook
pub struct SlotHook<P> {
    /// Underlying patcher to be used to hook
    patcher: P,
}
impl<P: Patcher> SlotHook<P> {
    /// Creates a new slot hook
    pub fn new(patcher: P) -> Self {
        Self { patcher }
    }
}
unsafe impl<P: Patcher> Hook for SlotHook<P> {
    type Error = P::Error;
    type Guard<'a> = SlotHookGuard<P::Guard<'a>>
    where
        Self: 'a;

    unsafe fn hook(
        &self,
        slot: *mut usize,
        destination: *const (),
    ) -> Result<Self::Guard<'_>, Self::Error> {
        let patch = self.patcher.patch(slot, destination as usize)?;
        Ok(SlotHookGuard::new(patch))
    }
}

/// Guard for slot hooks
pub struct SlotHookGuard<G: PatchGuard> {
    /// Underlying patch guard that we're wrapping
    guard: G,
}
impl<G: PatchGuard> SlotHookGuard<G> {
    /// Creates a new slot hook guard that wraps `guard`
    fn new(guard: G) -> Self {
        Self { guard }
    }
    /// Get the underlying patch guard in case info is needed
    pub fn patch(&self) -> &G {
        &self.guard
    }
}
unsafe impl<G: PatchGuard> HookGuard for SlotHookGuard<G> {
    fn original(&self) -> *const () {
        self.guard.original() as *const ()
    }

    fn persist(self) -> *const () {
        self.guard.persist() as *const ()
    }
}

/// Permanently points the read-only function table `slot` at `replacement` and returns the function it held before.
///
/// Installing over an already hooked slot chains: the previous interposer is what comes back as the original.
///
/// # Safety
///
/// - `slot` must be a valid, pointer-aligned function table entry in this process
/// - `replacement` must have exactly the calling contract of the function currently in `slot`
/// - nothing may be calling through `slot` while it is being written
pub unsafe fn install(slot: *mut usize, replacement: *const ()) -> Result<*const (), InstallError> {
    let hook = SlotHook::new(PermissionWrapper::new(WordPatcher::new()));
    let guard = hook.hook(slot, replacement)?;
    Ok(guard.persist())
}
