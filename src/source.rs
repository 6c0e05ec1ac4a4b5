//! Where new arena memory comes from.
//!
//! ```text
//!   claimed bytes                     frontier
//!   ┌─────────┬─────────┬─────────┐   ▼
//!   │ block A │ block B │ block C │ ─────── extend(n) ──▶ new block here
//!   └─────────┴─────────┴─────────┘
//!   ▲
//!   start (rewound to on release_all)
//! ```
//!
//! Sources only ever grow between resets. Blocks are never handed back one
//! by one.

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t};
use tracing::warn;

use crate::block::WORD_SIZE;

/// A monotonic supply of raw, word aligned memory.
pub trait HeapSource {
  /// Grows the arena by `bytes` and returns the old frontier, or `None` when
  /// the operating system refuses.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>>;

  /// Gives every claimed byte back and rewinds to an empty arena.
  fn release_all(&mut self);

  /// Bytes currently claimed through [`HeapSource::extend`].
  fn claimed(&self) -> usize;
}

/// The process data segment, grown with `sbrk(2)`.
///
/// The program break is process-wide. If someone else moves it between two
/// extensions, the arena has a foreign hole in it and rolling the break back
/// would hand out their memory. [`Sbrk::release_all`] therefore rewinds only
/// an arena that is one unbroken run ending at the current break.
pub struct Sbrk {
  start: *mut u8,
  end: *mut u8,
  claimed: usize,
  contiguous: bool,
}

impl Sbrk {
  pub fn new() -> Self {
    Self {
      start: ptr::null_mut(),
      end: ptr::null_mut(),
      claimed: 0,
      contiguous: true,
    }
  }

  fn is_failure(address: *mut c_void) -> bool {
    address == usize::MAX as *mut c_void
  }

  /// Whether every byte between the first and the last extension is ours.
  pub fn is_contiguous(&self) -> bool {
    self.contiguous
  }
}

impl Default for Sbrk {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapSource for Sbrk {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    let increment = intptr_t::try_from(bytes).ok()?;

    unsafe {
      let current = libc::sbrk(0);
      if Self::is_failure(current) {
        return None;
      }

      let misalignment = current as usize % WORD_SIZE;
      if misalignment != 0 {
        let pad = (WORD_SIZE - misalignment) as intptr_t;
        if Self::is_failure(libc::sbrk(pad)) {
          return None;
        }
      }

      let address = libc::sbrk(increment);
      if Self::is_failure(address) {
        return None;
      }

      let address = address as *mut u8;
      if self.start.is_null() {
        self.start = address;
      } else if address != self.end {
        warn!(
          expected = ?self.end,
          actual = ?address,
          "program break moved by another user, arena is no longer contiguous"
        );
        self.contiguous = false;
      }
      self.end = address.add(bytes);
      self.claimed += bytes;

      NonNull::new(address)
    }
  }

  fn release_all(&mut self) {
    if self.start.is_null() {
      return;
    }

    unsafe {
      if self.contiguous && libc::sbrk(0) as *mut u8 == self.end {
        libc::brk(self.start as *mut c_void);
      } else {
        warn!(
          claimed = self.claimed,
          contiguous = self.contiguous,
          "program break shared with another user, leaving arena memory in place"
        );
      }
    }

    *self = Self::new();
  }

  fn claimed(&self) -> usize {
    self.claimed
  }
}

/// A private reservation of `capacity` bytes with a break of its own.
///
/// Pages are mapped lazily by the kernel, so a large capacity is cheap.
/// Running past the reservation is reported as exhaustion, which makes
/// out-of-memory paths reproducible.
pub struct Region {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
}

impl Region {
  /// Reserves `capacity` bytes (rounded up to whole pages). Returns `None`
  /// if `mmap(2)` fails.
  pub fn reserve(capacity: usize) -> Option<Self> {
    let page = page_size();
    let capacity = capacity.checked_add(page - 1)? & !(page - 1);

    if capacity == 0 {
      return None;
    }

    let protection = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;

    unsafe {
      match libc::mmap(ptr::null_mut(), capacity, protection, flags, -1, 0) {
        libc::MAP_FAILED => None,
        address => Some(Self {
          base: NonNull::new(address as *mut u8)?,
          capacity,
          used: 0,
        }),
      }
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

impl HeapSource for Region {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    let used = self.used.checked_add(bytes)?;
    if used > self.capacity {
      return None;
    }

    let address = unsafe { self.base.add(self.used) };
    self.used = used;
    Some(address)
  }

  fn release_all(&mut self) {
    if self.used == 0 {
      return;
    }

    let page = page_size();
    let length = (self.used + page - 1) & !(page - 1);

    unsafe {
      let base = self.base.as_ptr() as *mut c_void;
      if libc::madvise(base, length, libc::MADV_DONTNEED) != 0 {
        warn!(length, "madvise failed, region pages stay resident");
      }
    }

    self.used = 0;
  }

  fn claimed(&self) -> usize {
    self.used
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    unsafe {
      if libc::munmap(self.base.as_ptr() as *mut c_void, self.capacity) != 0 {
        warn!(capacity = self.capacity, "munmap failed, region leaked");
      }
    }
  }
}

fn page_size() -> usize {
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    size if size > 0 => size as usize,
    _ => 4096,
  }
}

/// Serializes tests that move the process-wide program break.
#[cfg(test)]
pub(crate) fn lock_program_break() -> std::sync::MutexGuard<'static, ()> {
  static PROGRAM_BREAK: std::sync::Mutex<()> = std::sync::Mutex::new(());
  PROGRAM_BREAK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn program_break() -> usize {
    unsafe { libc::sbrk(0) as usize }
  }

  /// Plays another user of the break, returning the start of its region.
  fn foreign_sbrk(bytes: usize) -> usize {
    let address = unsafe { libc::sbrk(bytes as intptr_t) };
    assert!(!Sbrk::is_failure(address));
    address as usize
  }

  #[test]
  fn test_sbrk_release_all_rewinds_own_break() {
    let _guard = lock_program_break();
    let mut sbrk = Sbrk::new();

    let first = sbrk.extend(64).unwrap();
    let second = sbrk.extend(64).unwrap();

    assert_eq!(first.as_ptr() as usize % WORD_SIZE, 0);
    assert_eq!(sbrk.claimed(), 128);

    // Only rewound when nothing else in the process grew the heap meanwhile.
    if sbrk.is_contiguous() && program_break() == second.as_ptr() as usize + 64 {
      sbrk.release_all();
      assert_eq!(program_break(), first.as_ptr() as usize);
    } else {
      sbrk.release_all();
    }
    assert_eq!(sbrk.claimed(), 0);
  }

  #[test]
  fn test_sbrk_keeps_foreign_region_between_extends() {
    let _guard = lock_program_break();
    let mut sbrk = Sbrk::new();

    let ours = sbrk.extend(64).unwrap().as_ptr() as usize;
    let foreign = foreign_sbrk(4096);
    let again = sbrk.extend(64).unwrap().as_ptr() as usize;

    assert!(foreign >= ours + 64);
    assert!(again >= foreign + 4096);
    assert!(!sbrk.is_contiguous());
    assert_eq!(sbrk.claimed(), 128);

    sbrk.release_all();

    assert!(program_break() >= foreign + 4096);
    assert_eq!(sbrk.claimed(), 0);
    assert!(sbrk.is_contiguous());

    unsafe { (foreign as *mut u8).write_bytes(0x5A, 4096) };
  }

  #[test]
  fn test_sbrk_keeps_foreign_region_after_last_extend() {
    let _guard = lock_program_break();
    let mut sbrk = Sbrk::new();

    sbrk.extend(64).unwrap();
    sbrk.extend(64).unwrap();
    let foreign = foreign_sbrk(4096);

    sbrk.release_all();

    assert!(program_break() >= foreign + 4096);
    assert_eq!(sbrk.claimed(), 0);

    unsafe { (foreign as *mut u8).write_bytes(0x5A, 4096) };
  }

  #[test]
  fn test_region_extend() {
    let mut region = Region::reserve(1024).unwrap();
    assert!(region.capacity() >= 1024);

    let first = region.extend(32).unwrap();
    let second = region.extend(48).unwrap();

    assert_eq!(second.as_ptr() as usize - first.as_ptr() as usize, 32);
    assert_eq!(first.as_ptr() as usize % WORD_SIZE, 0);
    assert_eq!(region.claimed(), 80);

    unsafe {
      second.as_ptr().write_bytes(0xAB, 48);
      assert_eq!(*second.as_ptr().add(47), 0xAB);
    }
  }

  #[test]
  fn test_region_exhaustion() {
    let mut region = Region::reserve(1).unwrap();
    let capacity = region.capacity();

    assert!(region.extend(capacity + 1).is_none());
    assert_eq!(region.claimed(), 0);

    assert!(region.extend(capacity).is_some());
    assert!(region.extend(WORD_SIZE).is_none());
    assert_eq!(region.claimed(), capacity);
  }

  #[test]
  fn test_region_release_all() {
    let mut region = Region::reserve(4096).unwrap();

    let first = region.extend(64).unwrap();
    unsafe { first.as_ptr().write_bytes(0xFF, 64) };

    region.release_all();
    assert_eq!(region.claimed(), 0);

    let again = region.extend(64).unwrap();
    assert_eq!(again, first);

    // MADV_DONTNEED on private anonymous memory hands back zeroed pages.
    if cfg!(target_os = "linux") {
      unsafe { assert_eq!(*again.as_ptr(), 0) };
    }
  }
}
