use std::ptr::NonNull;

/// Identifies one arena session: which allocator, and which reset of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Provenance {
  pub arena: u64,
  pub generation: u64,
}

/// A granted block. Move-only: handing it to [`crate::Allocator::release`]
/// consumes it, so the same allocation can't be released twice through
/// safe code.
///
/// The handle remembers the allocator and session it came from, which lets
/// `release` reject foreign or stale handles instead of corrupting the heap.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping an Allocation leaks its block until the arena is reset"]
pub struct Allocation {
  ptr: NonNull<u8>,
  size: usize,
  provenance: Provenance,
}

impl Allocation {
  pub(crate) fn new(
    ptr: NonNull<u8>,
    size: usize,
    provenance: Provenance,
  ) -> Self {
    Self { ptr, size, provenance }
  }

  /// Writable start of the payload.
  pub fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }

  pub fn as_non_null(&self) -> NonNull<u8> {
    self.ptr
  }

  /// Usable bytes, at least the aligned request.
  pub fn size(&self) -> usize {
    self.size
  }

  /// Gives up the handle and keeps the raw pointer, for use with
  /// [`crate::Allocator::release_ptr`].
  pub fn into_raw(self) -> NonNull<u8> {
    self.ptr
  }

  pub(crate) fn provenance(&self) -> Provenance {
    self.provenance
  }
}
