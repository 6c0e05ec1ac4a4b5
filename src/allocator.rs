use std::{
  ptr::{self, NonNull},
  sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, trace, warn};

use crate::{
  block::{Block, BlockInfo, HEADER_SIZE, block_size, header_of, payload_of, total_footprint},
  config::{AllocatorConfig, SizeClasses},
  error::AllocError,
  handle::{Allocation, Provenance},
  source::{HeapSource, Sbrk},
  split::{can_coalesce, can_split, coalesce, split},
  strategy::{SearchMode, best_fit, first_fit, free_list_fit, next_fit},
  traverse::{Blocks, Chain, HeapStats},
};

static NEXT_ARENA: AtomicU64 = AtomicU64::new(0);

/// Largest request that still leaves room for a header without overflowing.
const MAX_REQUEST: usize = isize::MAX as usize - HEADER_SIZE;

/// A heap over one growable arena, searched with a single [`SearchMode`].
///
/// All state lives in this value, so independent allocators (each with its
/// own [`HeapSource`]) can coexist. It is neither `Send` nor `Sync`: one
/// caller at a time.
pub struct Allocator<S: HeapSource = Sbrk> {
  source: S,
  mode: SearchMode,
  size_classes: SizeClasses,
  /// Lowest block of the arena chain.
  heap_start: *mut Block,
  /// Highest block of the arena chain, where extensions are linked.
  top: *mut Block,
  /// Last next-fit hit.
  search_start: *mut Block,
  /// Free blocks known to the free-list strategy, in registration order.
  free_list: Vec<NonNull<Block>>,
  /// One chain per size class, in creation order.
  buckets: Vec<Vec<NonNull<Block>>>,
  provenance: Provenance,
}

impl Allocator<Sbrk> {
  /// An allocator growing the process data segment.
  pub fn new(config: impl Into<AllocatorConfig>) -> Self {
    Self::with_source(config, Sbrk::new())
  }
}

impl<S: HeapSource> Allocator<S> {
  pub fn with_source(
    config: impl Into<AllocatorConfig>,
    source: S,
  ) -> Self {
    let config = config.into();
    let buckets = vec![Vec::new(); config.size_classes.len()];

    debug!(mode = %config.mode, classes = config.size_classes.len(), "allocator created");

    Self {
      source,
      mode: config.mode,
      size_classes: config.size_classes,
      heap_start: ptr::null_mut(),
      top: ptr::null_mut(),
      search_start: ptr::null_mut(),
      free_list: Vec::new(),
      buckets,
      provenance: Provenance {
        arena: NEXT_ARENA.fetch_add(1, Ordering::Relaxed),
        generation: 0,
      },
    }
  }

  /// Switches to `mode` and starts over with an empty arena. Every
  /// outstanding [`Allocation`] becomes stale.
  pub fn initialize(
    &mut self,
    mode: SearchMode,
  ) {
    self.reset_arena();
    self.mode = mode;
    debug!(mode = %mode, "allocator initialized");
  }

  pub fn mode(&self) -> SearchMode {
    self.mode
  }

  pub fn size_classes(&self) -> &SizeClasses {
    &self.size_classes
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Grants at least `size` bytes (rounded up to a word, one word minimum).
  ///
  /// A reusable free block found by the active strategy wins; otherwise the
  /// arena is extended. Fails when the source can't grow, or in segregated
  /// mode when no size class matches. A failure leaves the heap untouched.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Allocation, AllocError> {
    if size > MAX_REQUEST {
      return Err(AllocError::ArenaExhausted { requested: size });
    }

    let size = block_size(size);

    let bucket = match self.mode {
      SearchMode::SegregatedList => Some(
        self
          .size_classes
          .index_of(size)
          .ok_or(AllocError::UnsupportedSizeClass { size })?,
      ),
      _ => None,
    };

    let block = match unsafe { self.find_block(size, bucket) } {
      Some(block) => block,
      None => self.extend(size, bucket)?,
    };

    Ok(unsafe { self.grant(block) })
  }

  /// Returns an allocation to the free pool, merging it with a free
  /// neighbour right after it when the mode allows.
  ///
  /// # Panics
  ///
  /// If `allocation` was handed out by another allocator, or before the
  /// last reset of this one.
  pub fn release(
    &mut self,
    allocation: Allocation,
  ) {
    assert_eq!(
      allocation.provenance(),
      self.provenance,
      "allocation does not belong to this arena session"
    );

    unsafe { self.release_block(header_of(allocation.into_raw())) }
  }

  /// Unchecked counterpart of [`Allocator::release`].
  ///
  /// # Safety
  ///
  /// `payload` must come from [`Allocation::into_raw`] of an allocation made
  /// by this allocator since its last reset, and must not have been released
  /// yet.
  pub unsafe fn release_ptr(
    &mut self,
    payload: NonNull<u8>,
  ) {
    unsafe { self.release_block(header_of(payload)) }
  }

  /// Current header state of a live allocation, `None` for handles of
  /// another arena session.
  pub fn inspect(
    &self,
    allocation: &Allocation,
  ) -> Option<BlockInfo> {
    if allocation.provenance() != self.provenance {
      return None;
    }

    Some(unsafe { Block::info(header_of(allocation.as_non_null())) })
  }

  /// Every block, in traversal order. See [`Blocks`].
  pub fn blocks(&self) -> Blocks<'_> {
    match self.mode {
      SearchMode::SegregatedList => Blocks::buckets(&self.buckets),
      _ => unsafe { Blocks::chain(self.heap_start) },
    }
  }

  pub fn for_each_block(
    &self,
    visitor: impl FnMut(BlockInfo),
  ) {
    self.blocks().for_each(visitor);
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats::collect(self.blocks(), self.source.claimed())
  }

  /// Hands all arena memory back to the source and forgets every block.
  /// Outstanding allocations become stale.
  pub fn reset_arena(&mut self) {
    let claimed = self.source.claimed();
    self.source.release_all();

    self.heap_start = ptr::null_mut();
    self.top = ptr::null_mut();
    self.search_start = ptr::null_mut();
    self.free_list.clear();
    self.buckets.iter_mut().for_each(Vec::clear);
    self.provenance.generation += 1;

    debug!(claimed, generation = self.provenance.generation, "arena reset");
  }

  unsafe fn find_block(
    &mut self,
    size: usize,
    bucket: Option<usize>,
  ) -> Option<NonNull<Block>> {
    unsafe {
      let block = match self.mode {
        SearchMode::FirstFit => first_fit(Chain::new(self.heap_start), size)?,
        SearchMode::NextFit => {
          let block = next_fit(self.heap_start, self.search_start, size)?;
          self.search_start = block.as_ptr();
          block
        }
        SearchMode::BestFit => best_fit(self.heap_start, size)?,
        SearchMode::FreeList => {
          let index = free_list_fit(&self.free_list, size)?;
          self.free_list.remove(index)
        }
        SearchMode::SegregatedList => first_fit(self.buckets[bucket?].iter().copied(), size)?,
      };

      self.take(block, size);

      Some(block)
    }
  }

  /// Marks a found block used, splitting off whatever the request doesn't
  /// need when the rest can hold a block of its own.
  unsafe fn take(
    &mut self,
    block: NonNull<Block>,
    size: usize,
  ) {
    unsafe {
      if self.mode.reshapes_blocks() && can_split(block, size) {
        let remainder = split(block, size);

        if block.as_ptr() == self.top {
          self.top = remainder.as_ptr();
        }
        if self.mode == SearchMode::FreeList {
          self.free_list.push(remainder);
        }
      }

      (*block.as_ptr()).used = true;

      trace!(size, granted = (*block.as_ptr()).size, "reused free block");
    }
  }

  fn extend(
    &mut self,
    size: usize,
    bucket: Option<usize>,
  ) -> Result<NonNull<Block>, AllocError> {
    let requested = total_footprint(size);

    let Some(address) = self.source.extend(requested) else {
      warn!(requested, claimed = self.source.claimed(), "heap source exhausted");
      return Err(AllocError::ArenaExhausted { requested });
    };

    let block = unsafe { Block::write(address, size, true, ptr::null_mut()) };

    if self.heap_start.is_null() {
      self.heap_start = block.as_ptr();
    }
    if let Some(top) = NonNull::new(self.top) {
      unsafe { (*top.as_ptr()).next = block.as_ptr() };
    }
    self.top = block.as_ptr();

    if let Some(bucket) = bucket {
      self.buckets[bucket].push(block);
    }

    debug!(size, requested, claimed = self.source.claimed(), "extended arena");

    Ok(block)
  }

  unsafe fn grant(
    &self,
    block: NonNull<Block>,
  ) -> Allocation {
    unsafe { Allocation::new(payload_of(block), (*block.as_ptr()).size, self.provenance) }
  }

  unsafe fn release_block(
    &mut self,
    block: NonNull<Block>,
  ) {
    unsafe {
      debug_assert!((*block.as_ptr()).used, "block released twice");

      if self.mode.reshapes_blocks() && can_coalesce(block) {
        let absorbed = coalesce(block).as_ptr();

        if absorbed == self.top {
          self.top = block.as_ptr();
        }
        if absorbed == self.search_start {
          self.search_start = block.as_ptr();
        }
        if self.mode == SearchMode::FreeList {
          self.free_list.retain(|free| free.as_ptr() != absorbed);
        }
      }

      (*block.as_ptr()).used = false;

      if self.mode == SearchMode::FreeList {
        self.free_list.push(block);
      }
    }
  }
}
