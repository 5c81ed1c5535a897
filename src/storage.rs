//! Storage model: fixed-capacity addressable sequences with I/O cost accounting.
//!
//! [`Storage`] simulates a block-addressed medium: every bulk access is charged
//! `ceil(len / block_size)` block operations plus one seek. [`RamStorage`] and
//! [`ExternalStorage`] are thin specializations, one operation each.

use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::ops::{Deref, DerefMut};

use rayon::slice::ParallelSliceMut;

/// Storage access error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Positional access outside `[0, capacity)`.
    OutOfBounds { pos: usize, len: usize, capacity: usize },
}

impl Error for StorageError {}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::OutOfBounds { pos, len, capacity } => {
                write!(
                    f,
                    "access of {} element(s) at position {} is out of bounds for capacity {}",
                    len, pos, capacity
                )
            }
        }
    }
}

/// Read-only snapshot of a storage's accumulated I/O cost.
///
/// Every bulk access of length `len` is charged `ceil(len / block_size)`
/// block operations plus one seek; zero-length and failed accesses are not
/// charged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub block_reads: u64,
    pub block_writes: u64,
    pub seeks: u64,
}

/// Interior-mutable counters so that `read` can stay `&self`.
#[derive(Debug, Default)]
struct IoCounters {
    block_reads: Cell<u64>,
    block_writes: Cell<u64>,
    seeks: Cell<u64>,
}

impl IoCounters {
    // a zero-length access touches no blocks and is not an I/O at all
    fn record_read(&self, blocks: u64) {
        if blocks == 0 {
            return;
        }
        self.block_reads.set(self.block_reads.get() + blocks);
        self.seeks.set(self.seeks.get() + 1);
    }

    fn record_write(&self, blocks: u64) {
        if blocks == 0 {
            return;
        }
        self.block_writes.set(self.block_writes.get() + blocks);
        self.seeks.set(self.seeks.get() + 1);
    }

    fn snapshot(&self) -> IoStats {
        IoStats {
            block_reads: self.block_reads.get(),
            block_writes: self.block_writes.get(),
            seeks: self.seeks.get(),
        }
    }
}

/// A fixed-capacity, positionally-addressable sequence of elements.
///
/// Created with a fixed capacity (cells initialized to `T::default()`, the
/// "empty" state) or from an existing vector; never resized afterwards. All
/// accesses are bounds-checked against `[0, capacity)` and bulk accesses never
/// straddle past the capacity.
pub struct Storage<T> {
    cells: Vec<T>,
    block_size: usize,
    counters: IoCounters,
}

impl<T: Clone> Storage<T> {
    /// Creates a storage of `capacity` empty cells.
    pub fn with_capacity(capacity: usize) -> Self
    where
        T: Default,
    {
        Storage::from_values(vec![T::default(); capacity])
    }

    /// Creates a storage holding `values`; the capacity is the vector length.
    pub fn from_values(values: Vec<T>) -> Self {
        Storage {
            cells: values,
            block_size: 1,
            counters: IoCounters::default(),
        }
    }

    /// Sets the block size used for cost accounting. Zero is clamped to one,
    /// the minimal addressing unit.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        return self;
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// True iff the capacity is zero.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    /// Returns the accumulated I/O cost of this storage.
    pub fn io_stats(&self) -> IoStats {
        self.counters.snapshot()
    }

    fn check_range(&self, pos: usize, len: usize) -> Result<(), StorageError> {
        let out_of_bounds = match pos.checked_add(len) {
            Some(end) => end > self.cells.len(),
            None => true,
        };
        if out_of_bounds {
            return Err(StorageError::OutOfBounds {
                pos,
                len,
                capacity: self.cells.len(),
            });
        }
        Ok(())
    }

    fn blocks(&self, len: usize) -> u64 {
        len.div_ceil(self.block_size) as u64
    }

    /// Bulk-copies `data` into `cells[pos..pos + data.capacity())`.
    pub fn write(&mut self, pos: usize, data: &Storage<T>) -> Result<(), StorageError> {
        let len = data.cells.len();
        self.check_range(pos, len)?;
        self.cells[pos..pos + len].clone_from_slice(&data.cells);
        self.counters.record_write(self.blocks(len));
        Ok(())
    }

    /// Copies `cells[pos..pos + len)` out into a new storage view.
    pub fn read(&self, pos: usize, len: usize) -> Result<Storage<T>, StorageError> {
        self.check_range(pos, len)?;
        self.counters.record_read(self.blocks(len));
        Ok(Storage {
            cells: self.cells[pos..pos + len].to_vec(),
            block_size: self.block_size,
            counters: IoCounters::default(),
        })
    }

    /// Single-element bounds-checked access. Not charged to the cost model.
    pub fn get(&self, pos: usize) -> Result<&T, StorageError> {
        self.cells.get(pos).ok_or(StorageError::OutOfBounds {
            pos,
            len: 1,
            capacity: self.cells.len(),
        })
    }

    /// Single-element bounds-checked write. Not charged to the cost model.
    pub fn set(&mut self, pos: usize, value: T) -> Result<(), StorageError> {
        let capacity = self.cells.len();
        match self.cells.get_mut(pos) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(StorageError::OutOfBounds { pos, len: 1, capacity }),
        }
    }

    /// Resets every cell to the empty state. Not charged to the cost model.
    pub fn clear(&mut self)
    where
        T: Default,
    {
        for cell in self.cells.iter_mut() {
            *cell = T::default();
        }
    }

    /// Copies the whole of `from` to position 0 of self.
    pub fn read_from(&mut self, from: &Storage<T>) -> Result<(), StorageError> {
        self.read_from_range(from, 0, 0, from.capacity())
    }

    /// Copies `min(self.capacity(), from.capacity() - their_pos)` elements
    /// starting at `their_pos` of `from` to position 0 of self.
    pub fn read_from_offset(&mut self, from: &Storage<T>, their_pos: usize) -> Result<(), StorageError> {
        let available = from
            .capacity()
            .checked_sub(their_pos)
            .ok_or(StorageError::OutOfBounds {
                pos: their_pos,
                len: 0,
                capacity: from.capacity(),
            })?;
        let len = self.capacity().min(available);
        self.read_from_range(from, their_pos, 0, len)
    }

    /// Copies `len` elements from `from` at `their_pos` to self at `my_pos`.
    pub fn read_from_range(
        &mut self,
        from: &Storage<T>,
        their_pos: usize,
        my_pos: usize,
        len: usize,
    ) -> Result<(), StorageError> {
        self.write(my_pos, &from.read(their_pos, len)?)
    }

    /// Copies the whole of self to position 0 of `to`.
    pub fn write_to(&self, to: &mut Storage<T>) -> Result<(), StorageError> {
        to.write(0, &self.read(0, self.capacity())?)
    }

    /// Copies the whole of self to `to` at `their_pos`.
    pub fn write_to_offset(&self, to: &mut Storage<T>, their_pos: usize) -> Result<(), StorageError> {
        to.write(their_pos, &self.read(0, self.capacity())?)
    }

    /// Copies `len` elements from self at `my_pos` to `to` at `their_pos`.
    pub fn write_to_range(
        &self,
        to: &mut Storage<T>,
        their_pos: usize,
        my_pos: usize,
        len: usize,
    ) -> Result<(), StorageError> {
        to.write(their_pos, &self.read(my_pos, len)?)
    }
}

/// The bounded fast-memory workspace of the sort.
pub struct RamStorage<T>(Storage<T>);

impl<T: Clone> RamStorage<T> {
    pub fn new(capacity: usize) -> Self
    where
        T: Default,
    {
        RamStorage(Storage::with_capacity(capacity))
    }

    /// Stable ascending in-place sort of the entire contents.
    ///
    /// Runs as a rayon parallel sort; callers may install it into a dedicated
    /// thread pool. Cells still empty sort ahead by their default value, so
    /// populate before sorting.
    pub fn sort(&mut self)
    where
        T: Ord + Send,
    {
        let len = self.0.cells.len();
        self.sort_prefix(len);
    }

    /// Sorts only `cells[0..len)`. Used when a loaded run is shorter than the
    /// RAM: sorting the whole contents would fold stale tail cells from the
    /// previous run into the write-back.
    pub(crate) fn sort_prefix(&mut self, len: usize)
    where
        T: Ord + Send,
    {
        let len = len.min(self.0.cells.len());
        self.0.cells[..len].par_sort();
    }
}

impl<T> Deref for RamStorage<T> {
    type Target = Storage<T>;

    fn deref(&self) -> &Storage<T> {
        &self.0
    }
}

impl<T> DerefMut for RamStorage<T> {
    fn deref_mut(&mut self) -> &mut Storage<T> {
        &mut self.0
    }
}

/// The large slow-memory input/output of the sort.
pub struct ExternalStorage<T>(Storage<T>);

impl<T: Clone> ExternalStorage<T> {
    pub fn new(capacity: usize) -> Self
    where
        T: Default,
    {
        ExternalStorage(Storage::with_capacity(capacity))
    }

    pub fn from_values(values: Vec<T>) -> Self {
        ExternalStorage(Storage::from_values(values))
    }

    pub fn with_block_size(self, block_size: usize) -> Self {
        ExternalStorage(self.0.with_block_size(block_size))
    }

    /// Returns the left index of the first out-of-order adjacent pair, or
    /// [`None`] if the contents are non-decreasing end to end. Verification
    /// helper, not used by the sort itself.
    pub fn first_disorder_index(&self) -> Option<usize>
    where
        T: Ord,
    {
        self.0.cells.windows(2).position(|pair| pair[0] > pair[1])
    }
}

impl<T> Deref for ExternalStorage<T> {
    type Target = Storage<T>;

    fn deref(&self) -> &Storage<T> {
        &self.0
    }
}

impl<T> DerefMut for ExternalStorage<T> {
    fn deref_mut(&mut self) -> &mut Storage<T> {
        &mut self.0
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ExternalStorage, RamStorage, Storage, StorageError};

    #[rstest]
    fn test_single_element_access() {
        let mut storage: Storage<i32> = Storage::with_capacity(4);
        storage.set(0, 7).unwrap();
        storage.set(3, 9).unwrap();

        assert_eq!(*storage.get(0).unwrap(), 7);
        assert_eq!(*storage.get(3).unwrap(), 9);
        assert_eq!(
            storage.set(4, 1),
            Err(StorageError::OutOfBounds {
                pos: 4,
                len: 1,
                capacity: 4
            })
        );
        assert_eq!(
            storage.get(4).unwrap_err(),
            StorageError::OutOfBounds {
                pos: 4,
                len: 1,
                capacity: 4
            }
        );
    }

    #[rstest]
    fn test_zero_capacity_storage_is_empty() {
        assert!(Storage::<i32>::with_capacity(0).is_empty());
        assert!(!Storage::from_values(vec![1]).is_empty());
    }

    #[rstest]
    fn test_bulk_copy_forms() {
        let source = Storage::from_values(vec![1, 2, 3, 4, 5, 6]);
        let mut dest: Storage<i32> = Storage::with_capacity(3);

        // offset form is capped by both capacities
        dest.read_from_offset(&source, 4).unwrap();
        assert_eq!(&dest.as_slice()[..2], &[5, 6]);

        dest.read_from_range(&source, 1, 0, 3).unwrap();
        assert_eq!(dest.as_slice(), &[2, 3, 4]);

        let mut wide: Storage<i32> = Storage::with_capacity(6);
        dest.write_to_offset(&mut wide, 3).unwrap();
        assert_eq!(&wide.as_slice()[3..], &[2, 3, 4]);

        dest.write_to_range(&mut wide, 0, 1, 2).unwrap();
        assert_eq!(&wide.as_slice()[..2], &[3, 4]);

        assert!(matches!(
            dest.read_from_range(&source, 4, 0, 3),
            Err(StorageError::OutOfBounds { .. })
        ));
        assert!(matches!(
            dest.write_to_range(&mut wide, 5, 0, 3),
            Err(StorageError::OutOfBounds { .. })
        ));
    }

    #[rstest]
    fn test_full_copy() {
        let source = Storage::from_values(vec![3, 1, 2]);
        let mut dest: Storage<i32> = Storage::with_capacity(5);
        dest.read_from(&source).unwrap();
        assert_eq!(&dest.as_slice()[..3], &[3, 1, 2]);

        let mut exact: Storage<i32> = Storage::with_capacity(5);
        dest.write_to(&mut exact).unwrap();
        assert_eq!(exact.as_slice(), dest.as_slice());
    }

    #[rstest]
    #[case(1, 10, 10)]
    #[case(4, 10, 3)]
    #[case(16, 10, 1)]
    fn test_block_accounting(#[case] block_size: usize, #[case] len: usize, #[case] expected_blocks: u64) {
        let source = Storage::from_values(vec![0; 16]).with_block_size(block_size);
        let mut dest = Storage::from_values(vec![0; 16]).with_block_size(block_size);

        dest.read_from_range(&source, 0, 0, len).unwrap();

        assert_eq!(source.io_stats().block_reads, expected_blocks);
        assert_eq!(source.io_stats().seeks, 1);
        assert_eq!(dest.io_stats().block_writes, expected_blocks);
        assert_eq!(dest.io_stats().seeks, 1);
    }

    #[rstest]
    fn test_clear_resets_cells() {
        let mut storage = Storage::from_values(vec![3, 1, 2]);
        storage.clear();
        assert_eq!(storage.as_slice(), &[0, 0, 0]);
        assert_eq!(storage.capacity(), 3);
        assert_eq!(storage.io_stats().seeks, 0);
    }

    #[rstest]
    fn test_zero_length_access_is_not_charged() {
        let source = Storage::from_values(vec![1, 2, 3, 4]);
        let mut dest: Storage<i32> = Storage::with_capacity(2);

        // offset at the very end of the source copies nothing
        dest.read_from_offset(&source, 4).unwrap();

        assert_eq!(source.io_stats().block_reads, 0);
        assert_eq!(source.io_stats().seeks, 0);
        assert_eq!(dest.io_stats().block_writes, 0);
        assert_eq!(dest.io_stats().seeks, 0);
    }

    #[rstest]
    fn test_failed_access_is_not_charged() {
        let storage = Storage::from_values(vec![0; 4]);
        assert!(storage.read(2, 3).is_err());
        assert_eq!(storage.io_stats().block_reads, 0);
        assert_eq!(storage.io_stats().seeks, 0);
    }

    #[rstest]
    fn test_ram_sort() {
        let mut ram = RamStorage(Storage::from_values(vec![4, 1, 3, 2]));
        ram.sort();
        assert_eq!(ram.as_slice(), &[1, 2, 3, 4]);
    }

    #[rstest]
    fn test_ram_sort_prefix_leaves_tail_untouched() {
        let mut ram = RamStorage(Storage::from_values(vec![4, 1, 3, 0]));
        ram.sort_prefix(3);
        assert_eq!(ram.as_slice(), &[1, 3, 4, 0]);
    }

    #[rstest]
    #[case(vec![], None)]
    #[case(vec![5], None)]
    #[case(vec![1, 2, 2, 3], None)]
    #[case(vec![1, 3, 2], Some(1))]
    #[case(vec![2, 1, 3], Some(0))]
    fn test_first_disorder_index(#[case] values: Vec<i32>, #[case] expected: Option<usize>) {
        let storage = ExternalStorage::from_values(values);
        assert_eq!(storage.first_disorder_index(), expected);
    }
}
