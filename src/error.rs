use std::{error, fmt};

/// Why an allocation could not be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// The heap source refused to grow the arena by `requested` bytes.
  ArenaExhausted { requested: usize },
  /// Segregated mode has no bucket for this (aligned) size.
  UnsupportedSizeClass { size: usize },
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::ArenaExhausted { requested } => {
        write!(f, "arena exhausted: could not extend the heap by {} bytes", requested)
      }
      AllocError::UnsupportedSizeClass { size } => {
        write!(f, "no size class for a {} byte block", size)
      }
    }
  }
}

impl error::Error for AllocError {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display() {
    let exhausted = AllocError::ArenaExhausted { requested: 48 };
    assert_eq!(exhausted.to_string(), "arena exhausted: could not extend the heap by 48 bytes");

    let unsupported = AllocError::UnsupportedSizeClass { size: 24 };
    assert_eq!(unsupported.to_string(), "no size class for a 24 byte block");
  }
}
