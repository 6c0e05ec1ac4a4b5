use crate::{
  block::{WORD_SIZE, block_size},
  strategy::SearchMode,
};

/// Payload sizes served by [`SearchMode::SegregatedList`], one bucket each.
///
/// Sizes are word aligned, sorted and unique. A request is routed to the
/// bucket whose size equals its aligned size; there is no rounding up to a
/// larger class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeClasses {
  sizes: Vec<usize>,
}

impl SizeClasses {
  pub fn new(sizes: impl IntoIterator<Item = usize>) -> Self {
    let mut sizes: Vec<usize> = sizes.into_iter().map(block_size).collect();
    sizes.sort_unstable();
    sizes.dedup();
    Self { sizes }
  }

  /// Builds the table from a bucket-index function: bucket `i` serves
  /// `size_of(i)` bytes.
  pub fn from_fn(
    count: usize,
    size_of: impl Fn(usize) -> usize,
  ) -> Self {
    Self::new((0..count).map(size_of))
  }

  /// `first, 2 * first, 4 * first, ...`, `count` classes in total.
  pub fn powers_of_two(
    first: usize,
    count: usize,
  ) -> Self {
    Self::from_fn(count, |index| first << index)
  }

  /// Every word multiple up to `count` words, i.e. bucket = size / word - 1.
  pub fn word_multiples(count: usize) -> Self {
    Self::from_fn(count, |index| (index + 1) * WORD_SIZE)
  }

  pub fn index_of(
    &self,
    size: usize,
  ) -> Option<usize> {
    self.sizes.binary_search(&size).ok()
  }

  pub fn size_of(
    &self,
    index: usize,
  ) -> Option<usize> {
    self.sizes.get(index).copied()
  }

  pub fn len(&self) -> usize {
    self.sizes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sizes.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
    self.sizes.iter().copied()
  }
}

impl Default for SizeClasses {
  /// 8, 16, 32, 64 and 128 bytes on a 64 bit machine.
  fn default() -> Self {
    Self::powers_of_two(WORD_SIZE, 5)
  }
}

/// Everything an [`crate::Allocator`] needs to know up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorConfig {
  pub mode: SearchMode,
  pub size_classes: SizeClasses,
}

impl AllocatorConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_mode(
    mut self,
    mode: SearchMode,
  ) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_size_classes(
    mut self,
    size_classes: SizeClasses,
  ) -> Self {
    self.size_classes = size_classes;
    self
  }
}

impl From<SearchMode> for AllocatorConfig {
  fn from(mode: SearchMode) -> Self {
    Self::new().with_mode(mode)
  }
}
