//! Memory alignment utilities.
//!
//! Provides [`TrackedBuffer`], a fixed-length, 64-byte aligned, zero-initialized
//! buffer backed by `std::alloc`. Every buffer reports its byte size to a
//! [`MemoryTracker`] on creation and releases it exactly once on drop.
//!
//! Allocation is fallible: a failed allocation surfaces as
//! [`FvError::Allocation`] instead of aborting the process.

use bytemuck::Pod;
use rayon::prelude::*;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::error::{FvError, FvResult};
use crate::metrics::MemoryTracker;

/// Alignment used for every tracked buffer (cache line / AVX-512).
pub const BUFFER_ALIGN: usize = 64;

/// Aligned, tracked, owning buffer.
pub struct TrackedBuffer<T: Pod> {
    ptr: NonNull<T>,
    len: usize,
    tracker: MemoryTracker,
}

unsafe impl<T: Pod + Send> Send for TrackedBuffer<T> {}
unsafe impl<T: Pod + Sync> Sync for TrackedBuffer<T> {}

impl<T: Pod> TrackedBuffer<T> {
    /// Allocate a zero-filled buffer of `len` elements and register it with `tracker`.
    pub fn zeroed(len: usize, tracker: &MemoryTracker) -> FvResult<Self> {
        if len == 0 || std::mem::size_of::<T>() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
                tracker: tracker.clone(),
            });
        }

        let layout = Self::layout_for(len)?;
        // SAFETY: layout has non-zero size; all-zero bytes are a valid `T: Pod`.
        let raw = unsafe { alloc_zeroed(layout) as *mut T };
        let ptr = NonNull::new(raw).ok_or_else(|| FvError::allocation(layout.size()))?;

        debug_assert_eq!((raw as usize) % layout.align(), 0, "Alignment guarantee violated");

        tracker.record_alloc(layout.size());
        Ok(Self {
            ptr,
            len,
            tracker: tracker.clone(),
        })
    }

    /// Allocate and copy from a slice.
    pub fn from_slice(data: &[T], tracker: &MemoryTracker) -> FvResult<Self> {
        let mut buf = Self::zeroed(data.len(), tracker)?;
        buf.copy_from_slice(data);
        Ok(buf)
    }

    /// Length in elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Empty check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes reported to the tracker.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// Tracker this buffer reports to.
    #[inline]
    pub fn tracker(&self) -> &MemoryTracker {
        &self.tracker
    }

    /// Raw pointer.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Mutable raw pointer.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Immutable slice view.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid for len initialized elements (or dangling with len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable slice view.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: unique access through &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Parallel fill.
    pub fn par_fill(&mut self, value: T)
    where
        T: Send + Sync,
    {
        self.as_mut_slice().par_iter_mut().for_each(|v| *v = value);
    }

    fn layout_for(len: usize) -> FvResult<Layout> {
        let size = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| FvError::allocation(usize::MAX))?;
        Layout::from_size_align(size, BUFFER_ALIGN.max(std::mem::align_of::<T>()))
            .map_err(|_| FvError::allocation(size))
    }
}

impl<T: Pod> Deref for TrackedBuffer<T> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: Pod> DerefMut for TrackedBuffer<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for TrackedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedBuffer")
            .field("len", &self.len)
            .field("bytes", &self.size_bytes())
            .finish()
    }
}

impl<T: Pod> Drop for TrackedBuffer<T> {
    fn drop(&mut self) {
        if self.len == 0 || std::mem::size_of::<T>() == 0 {
            return;
        }
        // Layout was valid at construction, so it is valid now.
        if let Ok(layout) = Self::layout_for(self.len) {
            // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
            self.tracker.record_release(layout.size());
        }
    }
}
