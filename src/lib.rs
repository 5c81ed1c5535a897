//! `kway-sort` is an external k-way merge sort implementation.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data: data
//! that does not fit into the main memory (RAM) of a computer and instead resides in slower
//! external memory. Sorting is achieved in two passes. During the first pass RAM-sized chunks of
//! the input are sorted locally, during the second pass the sorted runs are merged together, each
//! streamed through a small read-ahead window of RAM. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! The external medium is simulated by [`ExternalStorage`], a fixed-capacity block-addressed
//! sequence that counts block reads, block writes and seeks as its cost metric. [`RamStorage`]
//! models the bounded fast workspace. [`Sorter`] drives the two passes, using the RAM both for
//! the per-run read-ahead windows and for the output accumulator. A single merge pass suffices
//! whenever the RAM capacity is at least on the order of the square root of the input size.
//!
//! # Example
//!
//! ```
//! use kway_sort::{ExternalStorage, RamStorage, Sorter};
//!
//! fn main() {
//!     let mut input = ExternalStorage::from_values(vec![15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
//!     let mut output: ExternalStorage<i32> = ExternalStorage::new(16);
//!     let mut ram: RamStorage<i32> = RamStorage::new(8);
//!
//!     let sorter = Sorter::new(None).unwrap();
//!     sorter.sort(&mut input, &mut output, &mut ram).unwrap();
//!
//!     assert_eq!(output.first_disorder_index(), None);
//!     assert_eq!(output.as_slice(), (0..16).collect::<Vec<_>>().as_slice());
//! }
//! ```

pub mod chunk;
pub mod sort;
pub mod storage;

pub use chunk::{ChunkError, ChunkReader};
pub use sort::{chunk_count, SortError, Sorter};
pub use storage::{ExternalStorage, IoStats, RamStorage, Storage, StorageError};
