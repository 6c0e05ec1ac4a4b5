use std::{iter::FusedIterator, marker::PhantomData, ptr::NonNull, slice};

use crate::block::{Block, BlockInfo};

/// Follows `next` links from a head block until the end of the chain.
pub(crate) struct Chain {
  current: *mut Block,
}

impl Chain {
  /// # Safety
  ///
  /// `head` must be null or the first block of a chain of live blocks that
  /// stays untouched while the iterator is in use.
  pub unsafe fn new(head: *mut Block) -> Self {
    Self { current: head }
  }
}

impl Iterator for Chain {
  type Item = NonNull<Block>;

  fn next(&mut self) -> Option<Self::Item> {
    let block = NonNull::new(self.current)?;
    self.current = unsafe { (*block.as_ptr()).next };
    Some(block)
  }
}

impl FusedIterator for Chain {}

enum Walk<'a> {
  Chain(Chain),
  Buckets {
    buckets: slice::Iter<'a, Vec<NonNull<Block>>>,
    current: slice::Iter<'a, NonNull<Block>>,
  },
}

/// Read-only walk over every block, returned by [`crate::Allocator::blocks`].
///
/// Arena order for every mode but segregated, where each bucket is walked
/// in turn, smallest class first.
pub struct Blocks<'a> {
  walk: Walk<'a>,
  marker: PhantomData<&'a Block>,
}

impl<'a> Blocks<'a> {
  /// # Safety
  ///
  /// Same contract as [`Chain::new`], for the lifetime `'a`.
  pub(crate) unsafe fn chain(head: *mut Block) -> Self {
    Self {
      walk: Walk::Chain(unsafe { Chain::new(head) }),
      marker: PhantomData,
    }
  }

  pub(crate) fn buckets(buckets: &'a [Vec<NonNull<Block>>]) -> Self {
    Self {
      walk: Walk::Buckets {
        buckets: buckets.iter(),
        current: Default::default(),
      },
      marker: PhantomData,
    }
  }
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let block = match &mut self.walk {
      Walk::Chain(chain) => chain.next()?,
      Walk::Buckets { buckets, current } => loop {
        if let Some(&block) = current.next() {
          break block;
        }
        *current = buckets.next()?.iter();
      },
    };

    Some(unsafe { Block::info(block) })
  }
}

impl FusedIterator for Blocks<'_> {}

/// Occupancy summary of an arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub used_blocks: usize,
  pub free_blocks: usize,
  pub used_bytes: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
  /// Bytes obtained from the heap source, headers included.
  pub claimed_bytes: usize,
}

impl HeapStats {
  pub(crate) fn collect(
    blocks: impl Iterator<Item = BlockInfo>,
    claimed_bytes: usize,
  ) -> Self {
    blocks.fold(
      Self {
        claimed_bytes,
        ..Self::default()
      },
      |mut stats, block| {
        stats.blocks += 1;
        if block.used {
          stats.used_blocks += 1;
          stats.used_bytes += block.size;
        } else {
          stats.free_blocks += 1;
          stats.free_bytes += block.size;
          stats.largest_free = stats.largest_free.max(block.size);
        }
        stats
      },
    )
  }

  /// Share of free payload bytes outside the largest free block: 0.0 when
  /// all free space is in one piece, approaching 1.0 as it scatters.
  pub fn fragmentation(&self) -> f64 {
    if self.free_bytes == 0 {
      return 0.0;
    }
    1.0 - self.largest_free as f64 / self.free_bytes as f64
  }
}

#[cfg(test)]
mod tests {
  use std::ptr;

  use super::*;
  use crate::block::{WORD_SIZE, end_of};

  #[test]
  fn test_chain_and_stats() {
    let mut memory = vec![0usize; 64];
    let base = NonNull::new(memory.as_mut_ptr()).unwrap().cast::<u8>();

    unsafe {
      let first = Block::write(base, 2 * WORD_SIZE, true, ptr::null_mut());
      let second = Block::write(
        NonNull::new_unchecked(end_of(first)).cast(),
        4 * WORD_SIZE,
        false,
        ptr::null_mut(),
      );
      let third = Block::write(
        NonNull::new_unchecked(end_of(second)).cast(),
        WORD_SIZE,
        false,
        ptr::null_mut(),
      );
      (*first.as_ptr()).next = second.as_ptr();
      (*second.as_ptr()).next = third.as_ptr();

      let sizes: Vec<(usize, bool)> = Blocks::chain(first.as_ptr())
        .map(|block| (block.size, block.used))
        .collect();
      assert_eq!(sizes, vec![(2 * WORD_SIZE, true), (4 * WORD_SIZE, false), (WORD_SIZE, false)]);

      let stats = HeapStats::collect(Blocks::chain(first.as_ptr()), 0);
      assert_eq!(stats.blocks, 3);
      assert_eq!(stats.used_blocks, 1);
      assert_eq!(stats.free_bytes, 5 * WORD_SIZE);
      assert_eq!(stats.largest_free, 4 * WORD_SIZE);
      assert!((stats.fragmentation() - 0.2).abs() < 1e-9);
    }
  }

  #[test]
  fn test_bucket_walk_skips_empty_buckets() {
    let mut memory = vec![0usize; 64];
    let base = NonNull::new(memory.as_mut_ptr()).unwrap().cast::<u8>();

    unsafe {
      let small = Block::write(base, WORD_SIZE, true, ptr::null_mut());
      let large = Block::write(
        NonNull::new_unchecked(end_of(small)).cast(),
        2 * WORD_SIZE,
        false,
        ptr::null_mut(),
      );

      let buckets = vec![Vec::new(), vec![small], Vec::new(), vec![large], Vec::new()];
      let sizes: Vec<usize> = Blocks::buckets(&buckets).map(|block| block.size).collect();

      assert_eq!(sizes, vec![WORD_SIZE, 2 * WORD_SIZE]);
    }
  }

  #[test]
  fn test_empty_stats() {
    let stats = HeapStats::collect(std::iter::empty(), 0);
    assert_eq!(stats, HeapStats::default());
    assert_eq!(stats.fragmentation(), 0.0);
  }
}
