//! This module contains a patcher which adjusts memory permissions to patch read-only data
//!
//! Function tables live in read-only sections of the host executable, so writing a slot directly would fault.

use std::mem;

use region::Protection;
use thiserror::Error;

use super::word::WordError;
use super::{PatchGuard, Patcher};

/// Errors when using permission patching
#[derive(Debug, Error)]
pub enum PermissionError<E> {
    /// Error when setting memory protections
    #[error("error setting memory protections")]
    ProtectionError(#[from] region::Error),
    /// Error from the underlying patcher
    #[error("{0}")]
    CustomError(E),
}
impl From<WordError> for PermissionError<WordError> {
    fn from(e: WordError) -> Self {
        Self::CustomError(e)
    }
}

/// This struct wraps patchers to allow them to write to memory that's normally unwritable.
/// It achieves this result by changing the memory permissions of the target word, triggering the patch, and then reverting the permissions.
///
/// The previous protection is restored by a scoped handle, so it is put back whether the inner patch succeeds or not.
pub struct PermissionWrapper<P: Patcher> {
    /// Underlying patcher.
    patcher: P,
}
impl<P: Patcher> PermissionWrapper<P> {
    /// Creates a new PermissionWrapper
    pub fn new(patcher: P) -> Self {
        Self { patcher }
    }
}

/// Converts a const pointer to a mutable pointer to be passed into our [`Patcher::patch`] implementation.
///
/// # Safety
///
/// **THIS FUNCTION DOES NOT CHANGE MEMORY PERMISSIONS.**
///
/// It is **NOT** safe to treat the returned value as mutable, as this function does not change memory permissions.
///
/// This function should **ONLY** be called in conjunction with our [`Patcher::patch`] implementation, which properly changes the memory permissions.
pub unsafe fn to_mut<T>(ptr: *const T) -> *mut T {
    ptr as _
}

unsafe impl<P> Patcher for PermissionWrapper<P>
where
    P: Patcher,
    PermissionError<P::Error>: From<P::Error>,
{
    type Error = PermissionError<P::Error>;
    type Guard<'a> = PermissionWrapperGuard<P::Guard<'a>> where Self: 'a;

    unsafe fn patch<'a>(
        &'a self,
        target: *mut usize,
        value: usize,
    ) -> Result<Self::Guard<'a>, Self::Error> {
        let _protection =
            region::protect_with_handle(target, mem::size_of::<usize>(), Protection::all())?;
        self.patcher
            .patch(target, value)
            .map(|g| PermissionWrapperGuard::guard(g, target))
            .map_err(Into::into)
    }
}

/// Permission guard for the underlying patch guard
pub struct PermissionWrapperGuard<G: PatchGuard> {
    /// Underlying patch guard for the wrapped patcher. `Option` so that we can drop it in our [`Drop::drop`] impl
    guard: Option<G>,
    /// Location of the patch
    location: *const usize,
}
impl<G: PatchGuard> PermissionWrapperGuard<G> {
    /// Wrap a patcher's guard. When this guard is dropped, the underlying guard will also be dropped with its target location made writable
    fn guard(guard: G, location: *const usize) -> Self {
        Self {
            guard: Some(guard),
            location,
        }
    }
}
unsafe impl<G: PatchGuard> PatchGuard for PermissionWrapperGuard<G> {
    fn original(&self) -> usize {
        self.guard.as_ref().map_or(0, PatchGuard::original)
    }
}

impl<G: PatchGuard> Drop for PermissionWrapperGuard<G> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        // Safety: the location was valid when the guard was created and its protection was changed successfully then
        match unsafe {
            region::protect_with_handle(self.location, mem::size_of::<usize>(), Protection::all())
        } {
            Ok(_protection) => guard.restore(),
            Err(e) => {
                // writing without permission would fault, so leave the patch in place instead
                log::error!("unable to restore slot at {:p}: {e}", self.location);
                mem::forget(guard);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::mem;
    use std::ptr;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use region::Protection;

    use crate::patcher::mem::{to_mut, PermissionWrapper};
    use crate::patcher::word::WordPatcher;
    use crate::patcher::{PatchGuard, Patcher};

    /// Stand-in for a function table. Immutable statics are placed in a read-only section of the binary.
    static TABLE: [usize; 4] = [0x1111, 0x2222, 0x3333, 0x4444];

    /// Held by every test that changes the protection of read-only statics, which may share a page
    static READ_ONLY_PAGES: Mutex<()> = Mutex::new(());

    /// Serializes protection changes on read-only statics across tests
    pub fn lock_read_only_pages() -> MutexGuard<'static, ()> {
        READ_ONLY_PAGES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the word at `ptr` without letting the compiler fold in the static's initial value
    fn read(ptr: *const usize) -> usize {
        unsafe { ptr::read_volatile(ptr) }
    }

    /// Asserts the page holding `ptr` is read-only and not guarded
    fn assert_read_only(ptr: *const usize) {
        for region in region::query_range(ptr, mem::size_of::<usize>()).unwrap() {
            let region = region.unwrap();
            assert!(!region.is_guarded());
            assert_eq!(region.protection(), Protection::READ);
        }
    }

    #[test]
    /// Test patch and revert functionality
    fn test_patch() {
        let mut table = vec![1usize, 2, 3, 4];
        let slot = unsafe { table.as_mut_ptr().add(1) };

        // create the patcher and wrapper
        let wrapper = PermissionWrapper::new(WordPatcher::new());

        let patch = unsafe { wrapper.patch(slot, 9).unwrap() };
        assert_eq!(patch.original(), 2);
        assert_eq!(read(slot), 9);

        patch.restore();
        assert_eq!(table, [1, 2, 3, 4]);
    }

    #[test]
    /// Tests to ensure permissions are actually set and put back
    fn test_perms() {
        // Normally, writing to this static would result in a segfault, but PermissionWrapper changes the permissions to be writable so that no fault occurs
        let _pages = lock_read_only_pages();
        let slot = unsafe { TABLE.as_ptr().add(2) };

        // sanity check
        assert_eq!(read(slot), 0x3333);
        assert_read_only(slot);

        let wrapper = PermissionWrapper::new(WordPatcher::new());
        let patch = unsafe { wrapper.patch(to_mut(slot), 0xABCD).unwrap() };

        // make sure the data was actually changed and the page is read-only again
        assert_eq!(patch.original(), 0x3333);
        assert_eq!(read(slot), 0xABCD);
        assert_read_only(slot);

        // restore the patch
        patch.restore();

        // make sure the patch was restored and the permissions with it
        assert_eq!(read(slot), 0x3333);
        assert_read_only(slot);
    }
}
