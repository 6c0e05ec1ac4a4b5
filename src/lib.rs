//! # fitallocator - A Heap Allocator With Pluggable Search Strategies
//!
//! This crate manages one growable memory arena and hands out blocks from it,
//! reusing freed blocks according to one of five classical search policies.
//! The arena grows through `sbrk(2)` by default, or through a private `mmap(2)`
//! reservation.
//!
//! ## Overview
//!
//! ```text
//!   Arena:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │   heap_start                                           top           │
//!   │   ▼                                                    ▼             │
//!   │   ┌─────────┐   ┌─────────┐   ┌─────────┐   ┌─────────┐              │
//!   │   │ used 8  │──▶│ free 48 │──▶│ used 16 │──▶│ free 24 │  ◀── extend  │
//!   │   └─────────┘   └─────────┘   └─────────┘   └─────────┘              │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   allocate(n): ask the strategy for a free block >= n
//!                ├─ hit:  split off the rest if it can hold a block, mark used
//!                └─ miss: extend the arena by one block at the frontier
//!
//!   release(a):  merge with the next block if it is free, mark free
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   fitallocator
//!   ├── align      - Word alignment (align!, align())
//!   ├── block      - Block header layout and pointer arithmetic
//!   ├── source     - Heap sources: Sbrk, Region
//!   ├── split      - Splitting and coalescing
//!   ├── strategy   - SearchMode and the five search functions
//!   ├── config     - AllocatorConfig, SizeClasses
//!   ├── handle     - Allocation handles
//!   ├── allocator  - Allocator facade
//!   ├── traverse   - Block iteration and HeapStats
//!   └── error      - AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fitallocator::{Allocator, SearchMode};
//!
//! fn main() {
//!     let mut allocator = Allocator::new(SearchMode::BestFit);
//!
//!     let allocation = allocator.allocate(24).expect("out of memory");
//!     unsafe { (allocation.as_ptr() as *mut u64).write(42) };
//!
//!     allocator.release(allocation);
//!
//!     for block in allocator.blocks() {
//!         println!("[size = {}, used = {}]", block.size, block.used);
//!     }
//! }
//! ```
//!
//! ## Strategies
//!
//! | Mode             | Search                                   |
//! |------------------|------------------------------------------|
//! | `FirstFit`       | first free block from the arena start    |
//! | `NextFit`        | first free block from the last hit, wraps|
//! | `BestFit`        | smallest free block that fits            |
//! | `FreeList`       | first fit among released blocks only     |
//! | `SegregatedList` | first fit in the bucket of the exact size|
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Allocator` is neither `Send` nor `Sync`
//! - **Monotonic arena**: memory goes back to the OS only on reset
//! - **Forward coalescing only**: a freed block never merges with its predecessor
//! - **Unix-only**: requires `libc` for `sbrk` and `mmap`
//!
//! ## Safety
//!
//! Allocation, release and inspection are safe. Writing through the returned
//! pointers, and [`Allocator::release_ptr`], are not.

pub mod align;
mod allocator;
mod block;
mod config;
mod error;
mod handle;
mod source;
mod split;
mod strategy;
mod traverse;

pub use align::align;
pub use allocator::Allocator;
pub use block::{BlockInfo, HEADER_SIZE, WORD_SIZE, total_footprint};
pub use config::{AllocatorConfig, SizeClasses};
pub use error::AllocError;
pub use handle::Allocation;
pub use source::{HeapSource, Region, Sbrk};
pub use strategy::SearchMode;
pub use traverse::{Blocks, HeapStats};
