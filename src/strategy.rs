use std::{fmt, ptr::NonNull};

use crate::{block::Block, traverse::Chain};

/// Policy used to find a reusable free block. Chosen when the allocator is
/// initialized and fixed until the next [`crate::Allocator::initialize`].
///
/// | Mode             | Looks at                         | Cost            |
/// |------------------|----------------------------------|-----------------|
/// | `FirstFit`       | arena from the start             | O(n)            |
/// | `NextFit`        | arena from the last hit, wraps   | O(n)            |
/// | `BestFit`        | whole arena, smallest fit wins   | O(n), full scan |
/// | `FreeList`       | registered free blocks only      | O(free)         |
/// | `SegregatedList` | the bucket of the exact size     | O(bucket)       |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchMode {
  #[default]
  FirstFit,
  NextFit,
  BestFit,
  FreeList,
  SegregatedList,
}

impl SearchMode {
  pub const ALL: [SearchMode; 5] = [
    SearchMode::FirstFit,
    SearchMode::NextFit,
    SearchMode::BestFit,
    SearchMode::FreeList,
    SearchMode::SegregatedList,
  ];

  /// Segregated buckets never split or coalesce.
  pub fn reshapes_blocks(self) -> bool {
    self != SearchMode::SegregatedList
  }
}

impl fmt::Display for SearchMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let name = match self {
      SearchMode::FirstFit => "first-fit",
      SearchMode::NextFit => "next-fit",
      SearchMode::BestFit => "best-fit",
      SearchMode::FreeList => "free-list",
      SearchMode::SegregatedList => "segregated-list",
    };
    f.write_str(name)
  }
}

#[inline]
unsafe fn fits(
  block: NonNull<Block>,
  size: usize,
) -> bool {
  unsafe {
    let raw = block.as_ptr();
    !(*raw).used && (*raw).size >= size
  }
}

/// First free block with enough room, in iteration order.
///
/// # Safety
///
/// Every block yielded by `blocks` must be live.
pub unsafe fn first_fit(
  blocks: impl IntoIterator<Item = NonNull<Block>>,
  size: usize,
) -> Option<NonNull<Block>> {
  blocks.into_iter().find(|&block| unsafe { fits(block, size) })
}

/// Scans from `cursor` (or `head` if there is none yet) to the end of the
/// chain, then wraps around to `head` and stops once it is back where it
/// started.
///
/// # Safety
///
/// `head` and `cursor` must be null or live blocks of the same chain.
pub unsafe fn next_fit(
  head: *mut Block,
  cursor: *mut Block,
  size: usize,
) -> Option<NonNull<Block>> {
  unsafe {
    let start = if cursor.is_null() { head } else { cursor };
    let mut block = start;

    while let Some(current) = NonNull::new(block) {
      if fits(current, size) {
        return Some(current);
      }

      block = (*block).next;
      if block.is_null() {
        block = head;
      }
      if block == start {
        break;
      }
    }

    None
  }
}

/// Smallest free block with enough room. Ties go to the first one seen.
///
/// # Safety
///
/// `head` must be null or the first live block of a chain.
pub unsafe fn best_fit(
  head: *mut Block,
  size: usize,
) -> Option<NonNull<Block>> {
  let mut best: Option<NonNull<Block>> = None;

  unsafe {
    for block in Chain::new(head) {
      if !fits(block, size) {
        continue;
      }

      match best {
        Some(current) if (*current.as_ptr()).size <= (*block.as_ptr()).size => {}
        _ => best = Some(block),
      }
    }
  }

  best
}

/// Position of the first registered free block with enough room.
///
/// # Safety
///
/// Every entry of `free_list` must be a live block.
pub unsafe fn free_list_fit(
  free_list: &[NonNull<Block>],
  size: usize,
) -> Option<usize> {
  free_list
    .iter()
    .position(|&block| unsafe { fits(block, size) })
}
