use crate::block::WORD_SIZE;

/// Rounds a payload request up to the next multiple of [`WORD_SIZE`].
///
/// # Examples
///
/// ```rust
/// use fitallocator::{WORD_SIZE, align};
///
/// // Three `u16`s still occupy a whole word.
/// assert_eq!(align!(3 * std::mem::size_of::<u16>()), WORD_SIZE);
/// // One byte past a word spills into the next one.
/// assert_eq!(align!(WORD_SIZE + 1), 2 * WORD_SIZE);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align::align($value)
  };
}

/// Function form of [`align!`], handy where a macro can't be passed around.
#[inline]
pub const fn align(value: usize) -> usize {
  (value + WORD_SIZE - 1) & !(WORD_SIZE - 1)
}
