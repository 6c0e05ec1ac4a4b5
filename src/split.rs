//! Carving oversized blocks and merging freed neighbours.
//!
//! ```text
//!   split(block, size):
//!   ┌──────────────── block.size ────────────────┐
//!   ┌────────┬──────────┐┌────────┬──────────────┐
//!   │ header │   size   ││ header │  remainder   │
//!   └────────┴──────────┘└────────┴──────────────┘
//!   block (used)          free, keeps block.next
//!
//!   coalesce(block):  block ─▶ free neighbour  ==>  one block spanning both
//! ```

use std::ptr::NonNull;

use tracing::trace;

use crate::block::{Block, HEADER_SIZE, end_of, total_footprint};

/// A split needs room for a whole header plus at least one payload word.
///
/// # Safety
///
/// `block` must point to a live header.
#[inline]
pub unsafe fn can_split(
  block: NonNull<Block>,
  size: usize,
) -> bool {
  unsafe { (*block.as_ptr()).size >= size + HEADER_SIZE }
}

/// Shrinks `block` to exactly `size` and writes a free block over the rest.
/// Returns the remainder, which sits between `block` and its old successor.
///
/// # Safety
///
/// `block` must point to a live header and [`can_split`] must hold.
pub unsafe fn split(
  block: NonNull<Block>,
  size: usize,
) -> NonNull<Block> {
  unsafe {
    let raw = block.as_ptr();
    let remainder_size = (*raw).size - total_footprint(size);
    let address = block.cast::<u8>().add(total_footprint(size));

    let remainder = Block::write(address, remainder_size, false, (*raw).next);

    (*raw).size = size;
    (*raw).next = remainder.as_ptr();

    trace!(size, remainder = remainder_size, "split block");

    remainder
  }
}

/// Whether the physically following block is free and can be absorbed.
///
/// # Safety
///
/// `block` must point to a live header.
#[inline]
pub unsafe fn can_coalesce(block: NonNull<Block>) -> bool {
  unsafe {
    let next = (*block.as_ptr()).next;
    !next.is_null() && !(*next).used && next == end_of(block)
  }
}

/// Absorbs the successor of `block`, header included, and returns the
/// absorbed block so callers can fix up anything that referenced it.
///
/// # Safety
///
/// `block` must point to a live header and [`can_coalesce`] must hold.
pub unsafe fn coalesce(block: NonNull<Block>) -> NonNull<Block> {
  unsafe {
    let raw = block.as_ptr();
    let next = (*raw).next;

    (*raw).size += total_footprint((*next).size);
    (*raw).next = (*next).next;

    trace!(size = (*raw).size, "coalesced block");

    NonNull::new_unchecked(next)
  }
}

#[cfg(test)]
mod tests {
  use std::ptr;

  use super::*;
  use crate::block::{WORD_SIZE, payload_of};

  fn arena() -> Vec<usize> {
    vec![0; 64]
  }

  fn base(arena: &mut [usize]) -> NonNull<u8> {
    NonNull::new(arena.as_mut_ptr()).unwrap().cast()
  }

  #[test]
  fn test_split_leaves_free_remainder() {
    let mut memory = arena();

    unsafe {
      let block = Block::write(base(&mut memory), 8 * WORD_SIZE, false, ptr::null_mut());

      assert!(can_split(block, 2 * WORD_SIZE));
      let remainder = split(block, 2 * WORD_SIZE);

      assert_eq!((*block.as_ptr()).size, 2 * WORD_SIZE);
      assert_eq!((*block.as_ptr()).next, remainder.as_ptr());
      assert_eq!(remainder.as_ptr(), end_of(block));
      assert!(!(*remainder.as_ptr()).used);
      assert!((*remainder.as_ptr()).next.is_null());

      // Both cells together cover exactly the original footprint.
      assert_eq!(
        total_footprint(2 * WORD_SIZE) + total_footprint((*remainder.as_ptr()).size),
        total_footprint(8 * WORD_SIZE)
      );
    }
  }

  #[test]
  fn test_split_needs_room_for_header() {
    let mut memory = arena();

    unsafe {
      let block = Block::write(base(&mut memory), 4 * WORD_SIZE, false, ptr::null_mut());

      assert!(can_split(block, 4 * WORD_SIZE - HEADER_SIZE));
      assert!(!can_split(block, 4 * WORD_SIZE - HEADER_SIZE + WORD_SIZE));
      assert!(!can_split(block, 4 * WORD_SIZE));
    }
  }

  #[test]
  fn test_coalesce_undoes_split() {
    let mut memory = arena();

    unsafe {
      let block = Block::write(base(&mut memory), 10 * WORD_SIZE, true, ptr::null_mut());
      let remainder = split(block, 3 * WORD_SIZE);

      assert!(can_coalesce(block));
      let absorbed = coalesce(block);

      assert_eq!(absorbed, remainder);
      assert_eq!((*block.as_ptr()).size, 10 * WORD_SIZE);
      assert!((*block.as_ptr()).next.is_null());
    }
  }

  #[test]
  fn test_coalesce_skips_used_or_distant_neighbours() {
    let mut memory = arena();

    unsafe {
      let first = Block::write(base(&mut memory), WORD_SIZE, true, ptr::null_mut());
      let second = Block::write(
        NonNull::new_unchecked(end_of(first)).cast(),
        WORD_SIZE,
        true,
        ptr::null_mut(),
      );
      (*first.as_ptr()).next = second.as_ptr();

      assert!(!can_coalesce(first));
      assert!(!can_coalesce(second));

      (*second.as_ptr()).used = false;
      assert!(can_coalesce(first));

      // A free successor that is not physically adjacent stays separate.
      let distant = Block::write(
        payload_of(second).add(4 * WORD_SIZE),
        WORD_SIZE,
        false,
        ptr::null_mut(),
      );
      (*first.as_ptr()).next = distant.as_ptr();
      assert!(!can_coalesce(first));
    }
  }
}
