//! # Patcher
//!
//! This module covers patchers, which overwrite a single pointer-sized word in memory and remember what was there

pub mod mem;
pub mod word;

/// All patchers save the word they replaced and are able to put it back on-command
///
/// # Safety
///
/// Patchers are inherently unsafe. The implementor must ensure that the implementation of `patch` works correctly and is properly documented for avoiding undefined behavior
pub unsafe trait Patcher {
    /// Error type that can occur when patching
    type Error;
    /// Guard type for the patcher. When this guard is dropped, the location should be restored.
    type Guard<'a>: PatchGuard + 'a
    where
        Self: 'a;

    /// Replaces the word at `target` with `value`
    ///
    /// # Safety
    ///
    /// `target` must be valid for reads and writes of a `usize`, and nothing else may be accessing it during the patch
    unsafe fn patch<'a>(
        &'a self,
        target: *mut usize,
        value: usize,
    ) -> Result<Self::Guard<'a>, Self::Error>;
}

/// Guard for a patch
///
/// # Safety
///
/// Guard must fully unpatch the location when dropped, even if `restore` is not called
pub unsafe trait PatchGuard: Sized {
    /// The word that was at the location before it was patched
    fn original(&self) -> usize;

    /// Restores the original value of a patch
    fn restore(self) {
        // most implementations have their functionality in their [`Drop::drop`] implementation
    }

    /// Keeps the patch in place for the rest of the process, returning the word it replaced
    fn persist(self) -> usize {
        let original = self.original();
        std::mem::forget(self);
        original
    }
}
