//! This module contains a patcher for single aligned words, such as function table slots

use std::mem;
use std::ptr;

use thiserror::Error;

use super::{PatchGuard, Patcher};

/// Errors when writing a word
#[derive(Debug, Error)]
pub enum WordError {
    /// Function table slots are always pointer aligned; anything else means the offset is wrong
    #[error("slot at {0:#X} is not pointer aligned")]
    Misaligned(usize),
    /// Null is never a valid slot
    #[error("slot address is null")]
    Null,
}

/// Patcher that swaps one aligned `usize` in place.
/// The write is a single volatile store, so readers see either the old or the new pointer.
#[derive(Default)]
pub struct WordPatcher;
impl WordPatcher {
    /// Creates a new [`WordPatcher`]
    pub fn new() -> Self {
        Self
    }
}
unsafe impl Patcher for WordPatcher {
    type Error = WordError;
    type Guard<'a> = WordPatchGuard;

    unsafe fn patch<'a>(
        &'a self,
        target: *mut usize,
        value: usize,
    ) -> Result<Self::Guard<'a>, Self::Error> {
        if target.is_null() {
            return Err(WordError::Null);
        }
        if target as usize % mem::align_of::<usize>() != 0 {
            return Err(WordError::Misaligned(target as usize));
        }
        Ok(WordPatchGuard::patch(target, value))
    }
}

/// Guard for word patches
///
/// See [`WordPatcher`].
pub struct WordPatchGuard {
    /// Word that was at `location` before the patch
    original: usize,
    /// Location of the patch
    location: *mut usize,
}
impl WordPatchGuard {
    /// Captures the current word, then writes `value` over it
    ///
    /// # Safety
    ///
    /// `location` must be aligned and valid for reads and writes
    unsafe fn patch(location: *mut usize, value: usize) -> Self {
        let original = ptr::read_volatile(location);
        ptr::write_volatile(location, value);
        Self { original, location }
    }
}
unsafe impl PatchGuard for WordPatchGuard {
    fn original(&self) -> usize {
        self.original
    }
}
impl Drop for WordPatchGuard {
    fn drop(&mut self) {
        // Safety: the location was valid and writable when the guard was created
        unsafe { ptr::write_volatile(self.location, self.original) }
    }
}
