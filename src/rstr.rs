//! RosieString: the length+pointer byte span that crosses the C boundary.
//!
//! A RosieString is either owned (allocated here, released exactly once
//! with [`RosieString::free`]) or borrowed (a view over caller memory that
//! is only valid for the duration of one call). A NULL pointer with a
//! small `len` is a [`Sentinel`], never a zero-length string: an owned
//! empty string still carries a non-NULL (dangling) pointer.

use std::ptr;
use std::slice;

use crate::error::{Result, RosieError, Sentinel};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosieString {
    pub len: u32,
    pub ptr: *mut u8,
}

impl RosieString {
    /// NULL pointer, zero length. Doubles as the "nothing to report" value
    /// for message outputs and as the [`Sentinel::NoMatch`] encoding.
    pub const fn null() -> Self {
        RosieString {
            len: 0,
            ptr: ptr::null_mut(),
        }
    }

    pub const fn sentinel(reason: Sentinel) -> Self {
        RosieString {
            len: reason as u32,
            ptr: ptr::null_mut(),
        }
    }

    /// Copy `bytes` into a fresh owned allocation.
    pub fn new_owned(bytes: &[u8]) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes.len())
            .map_err(|e| RosieError::OutOfMemory(e.to_string()))?;
        buf.extend_from_slice(bytes);
        Self::from_vec(buf)
    }

    /// Take ownership of `bytes` without copying when the capacity is exact.
    pub fn from_vec(bytes: Vec<u8>) -> Result<Self> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            RosieError::InvalidArgument(format!(
                "string of {} bytes exceeds the 4 GiB RosieString limit",
                bytes.len()
            ))
        })?;
        let boxed: Box<[u8]> = bytes.into_boxed_slice();
        let ptr = Box::into_raw(boxed) as *mut u8;
        Ok(RosieString { len, ptr })
    }

    /// Zero-copy view over caller memory. Never pass a view to `free`.
    pub fn view(bytes: &[u8]) -> Self {
        RosieString {
            len: bytes.len().min(u32::MAX as usize) as u32,
            ptr: bytes.as_ptr() as *mut u8,
        }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// The sentinel encoded by a NULL pointer, if any.
    pub fn sentinel_code(&self) -> Option<Sentinel> {
        if self.ptr.is_null() {
            Sentinel::from_code(self.len)
        } else {
            None
        }
    }

    /// Borrow the bytes behind a non-NULL string.
    ///
    /// # Safety
    /// `ptr` must point to `len` readable bytes that outlive `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> Option<&'a [u8]> {
        if self.ptr.is_null() {
            None
        } else {
            Some(slice::from_raw_parts(self.ptr, self.len as usize))
        }
    }

    /// Release an owned string. NULL strings are ignored.
    ///
    /// # Safety
    /// `self` must have been produced by [`RosieString::new_owned`] or
    /// [`RosieString::from_vec`] and not freed before.
    pub unsafe fn free(self) {
        if !self.ptr.is_null() {
            let raw = ptr::slice_from_raw_parts_mut(self.ptr, self.len as usize);
            drop(Box::from_raw(raw));
        }
    }
}

/// An owned RosieString held by the engine in its single-slot cache.
///
/// The allocation is released when the slot is overwritten or the engine
/// is torn down. Any copy handed to a caller becomes dangling at that point.
#[derive(Debug)]
pub struct PendingString(RosieString);

// The wrapped allocation is uniquely owned by the slot.
unsafe impl Send for PendingString {}

impl PendingString {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        RosieString::from_vec(bytes).map(PendingString)
    }

    /// An aliasing copy of the cached string, valid until the slot changes.
    pub fn alias(&self) -> RosieString {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0.len == 0
    }
}

impl Drop for PendingString {
    fn drop(&mut self) {
        // SAFETY: constructed from `from_vec` and never exposed for freeing.
        unsafe { self.0.free() }
    }
}
