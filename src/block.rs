use std::{mem, ptr::NonNull};

use crate::align;

/// Machine word in bytes. Every block size is a multiple of this.
pub const WORD_SIZE: usize = mem::size_of::<usize>();

/// Size of [`Block`], including the first payload word it embeds.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Bytes between the start of a block and its payload.
const PAYLOAD_OFFSET: usize = HEADER_SIZE - WORD_SIZE;

/// Header of one arena cell.
///
/// ```text
///   ┌──────────────────────────┐ <- block
///   │ size: usize              │
///   │ used: bool (+ padding)   │
///   │ next: *mut Block         │
///   ├──────────────────────────┤ <- payload returned to the caller
///   │ data: first payload word │
///   ├──────────────────────────┤
///   │ rest of payload          │   size - WORD_SIZE bytes
///   └──────────────────────────┘
/// ```
///
/// `next` always links to the physically following block of the arena. Size
/// classes and the explicit free list are tracked outside of the header.
#[repr(C)]
pub struct Block {
  pub size: usize,
  pub used: bool,
  pub next: *mut Block,
  #[allow(dead_code)]
  data: [usize; 1],
}

/// Read-only snapshot of a block, as seen by traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  pub size: usize,
  pub used: bool,
}

impl Block {
  /// Writes a fresh header at `address`.
  ///
  /// # Safety
  ///
  /// `address` must be word aligned and own at least
  /// `total_footprint(size)` bytes, with `size >= WORD_SIZE`.
  pub unsafe fn write(
    address: NonNull<u8>,
    size: usize,
    used: bool,
    next: *mut Block,
  ) -> NonNull<Block> {
    let block = address.cast::<Block>();
    unsafe {
      let raw = block.as_ptr();
      (*raw).size = size;
      (*raw).used = used;
      (*raw).next = next;
    }
    block
  }

  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn info(block: NonNull<Block>) -> BlockInfo {
    unsafe {
      let raw = block.as_ptr();
      BlockInfo {
        payload: payload_of(block),
        size: (*raw).size,
        used: (*raw).used,
      }
    }
  }
}

/// Rounds a request to the size a block actually stores. Anything below a
/// word (including zero) still gets one word, so the header is always whole.
#[inline]
pub const fn block_size(requested: usize) -> usize {
  let size = align!(requested);
  if size < WORD_SIZE { WORD_SIZE } else { size }
}

/// Bytes a block of `size` payload bytes occupies in the arena. The first
/// payload word lives inside the header, so a one word request adds nothing.
#[inline]
pub const fn total_footprint(size: usize) -> usize {
  PAYLOAD_OFFSET + size
}

/// Recovers the header from a payload pointer.
///
/// # Safety
///
/// `payload` must have been produced by [`payload_of`] for a live block.
#[inline]
pub unsafe fn header_of(payload: NonNull<u8>) -> NonNull<Block> {
  unsafe { payload.sub(PAYLOAD_OFFSET).cast() }
}

/// # Safety
///
/// `block` must point to a live header.
#[inline]
pub unsafe fn payload_of(block: NonNull<Block>) -> NonNull<u8> {
  unsafe { block.cast::<u8>().add(PAYLOAD_OFFSET) }
}

/// First address past the block.
///
/// # Safety
///
/// `block` must point to a live header.
#[inline]
pub unsafe fn end_of(block: NonNull<Block>) -> *mut Block {
  unsafe {
    let size = (*block.as_ptr()).size;
    block.cast::<u8>().as_ptr().add(total_footprint(size)).cast()
  }
}
