//! Chunk readers: stream a sorted run through a fixed RAM window.

use std::error::Error;
use std::fmt;
use std::ops::Range;

use crate::storage::{ExternalStorage, RamStorage, StorageError};

/// Chunk reader error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Window or source bounds are non-increasing or exceed a storage
    /// capacity. Indicates an arithmetic defect in the merge-pass setup,
    /// not a user error.
    InvalidRange { window: Range<usize>, source: Range<usize> },
    /// `advance` called again after the reader already reported exhaustion.
    Exhausted { source: Range<usize> },
    /// `peek` called before the first `advance`.
    PeekBeforeAdvance,
    /// Bulk copy failed during a window load.
    Storage(StorageError),
}

impl Error for ChunkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChunkError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::InvalidRange { window, source } => {
                write!(
                    f,
                    "invalid chunk ranges: window [{}..{}), source [{}..{})",
                    window.start, window.end, source.start, source.end
                )
            }
            ChunkError::Exhausted { source } => {
                write!(f, "chunk over source [{}..{}) has no next element", source.start, source.end)
            }
            ChunkError::PeekBeforeAdvance => write!(f, "peek called before the first advance"),
            ChunkError::Storage(err) => write!(f, "chunk load failed: {}", err),
        }
    }
}

impl From<StorageError> for ChunkError {
    fn from(err: StorageError) -> Self {
        ChunkError::Storage(err)
    }
}

/// Streams one sorted run of external storage through a reserved RAM window,
/// refilling the window from the source whenever it is exhausted.
///
/// The reader holds cursor state only; the shared storages are passed into
/// each call, so disjoint readers can share one RAM as long as their windows
/// never overlap. Reads are monotonic over the source range, no backtracking.
pub struct ChunkReader {
    /// Reserved window in RAM, exclusive to this reader.
    window_start: usize,
    window_end: usize,
    /// This run's range in external storage.
    source_start: usize,
    source_end: usize,
    /// Next source index not yet loaded.
    next_load_pos: usize,
    /// Next window index not yet consumed.
    next_read_pos: usize,
    /// End of valid data in the window.
    loaded_end: usize,
    valid: bool,
}

impl ChunkReader {
    /// Creates a reader over `source` in `storage` windowed through `window`
    /// in `ram`, and performs the initial window load.
    pub fn new<T: Clone>(
        window: Range<usize>,
        source: Range<usize>,
        ram: &mut RamStorage<T>,
        storage: &ExternalStorage<T>,
    ) -> Result<Self, ChunkError> {
        if window.start >= window.end
            || source.start >= source.end
            || window.end > ram.capacity()
            || source.end > storage.capacity()
        {
            return Err(ChunkError::InvalidRange { window, source });
        }

        let mut reader = ChunkReader {
            window_start: window.start,
            window_end: window.end,
            source_start: source.start,
            source_end: source.end,
            next_load_pos: source.start,
            next_read_pos: window.start,
            loaded_end: window.start,
            valid: true,
        };
        reader.load(ram, storage)?;

        Ok(reader)
    }

    /// Loads the next window-sized portion of the source into the window.
    /// Loading zero elements is legal and yields an empty window.
    fn load<T: Clone>(&mut self, ram: &mut RamStorage<T>, storage: &ExternalStorage<T>) -> Result<(), ChunkError> {
        let window_size = self.window_end - self.window_start;
        let to_read = window_size.min(self.source_end - self.next_load_pos);

        ram.read_from_range(storage, self.next_load_pos, self.window_start, to_read)?;

        self.next_load_pos += to_read;
        self.next_read_pos = self.window_start;
        self.loaded_end = self.window_start + to_read;

        log::trace!(
            "chunk load: source cursor {}, window [{}..{})",
            self.next_load_pos,
            self.window_start,
            self.loaded_end,
        );

        Ok(())
    }

    /// True iff unconsumed source or window data remains.
    pub fn has_next(&self) -> bool {
        self.next_load_pos < self.source_end || self.next_read_pos < self.loaded_end
    }

    /// Yields the next element of the run, refilling the window as needed.
    ///
    /// Exhaustion is two-phased: the first call after the run is drained
    /// marks the reader invalid and returns `Ok(None)`; any later call fails
    /// with [`ChunkError::Exhausted`]. The merge loop must observe
    /// [`ChunkReader::is_valid`] before consulting a reader again.
    pub fn advance<T: Clone>(
        &mut self,
        ram: &mut RamStorage<T>,
        storage: &ExternalStorage<T>,
    ) -> Result<Option<T>, ChunkError> {
        if !self.has_next() {
            if self.valid {
                self.valid = false;
                return Ok(None);
            }
            return Err(ChunkError::Exhausted {
                source: self.source_start..self.source_end,
            });
        }

        if self.next_read_pos == self.loaded_end {
            self.load(ram, storage)?;
        }

        let value = ram.get(self.next_read_pos)?.clone();
        self.next_read_pos += 1;
        Ok(Some(value))
    }

    /// Returns the element last produced by [`ChunkReader::advance`].
    pub fn peek<T: Clone>(&self, ram: &RamStorage<T>) -> Result<T, ChunkError> {
        if self.next_read_pos == self.window_start {
            return Err(ChunkError::PeekBeforeAdvance);
        }
        Ok(ram.get(self.next_read_pos - 1)?.clone())
    }

    /// True until the reader has reported exhaustion; never true again after.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod test {
    use std::ops::Range;

    use rstest::*;

    use super::{ChunkError, ChunkReader};
    use crate::storage::{ExternalStorage, RamStorage};

    #[fixture]
    fn storage() -> ExternalStorage<i32> {
        ExternalStorage::from_values(vec![8, 9, 10, 11, 12, 13, 14, 15, 0, 1, 2, 3, 4, 5, 6, 7])
    }

    #[rstest]
    fn test_streams_run_through_smaller_window(storage: ExternalStorage<i32>) {
        let mut ram: RamStorage<i32> = RamStorage::new(9);
        let mut reader = ChunkReader::new(0..3, 0..8, &mut ram, &storage).unwrap();

        let mut produced = Vec::new();
        while reader.has_next() {
            produced.push(reader.advance(&mut ram, &storage).unwrap().unwrap());
        }

        assert_eq!(produced, vec![8, 9, 10, 11, 12, 13, 14, 15]);
        // peek keeps returning the last produced element
        assert_eq!(reader.peek(&ram).unwrap(), 15);
        assert!(reader.is_valid());
    }

    #[rstest]
    fn test_window_larger_than_run(storage: ExternalStorage<i32>) {
        let mut ram: RamStorage<i32> = RamStorage::new(9);
        let mut reader = ChunkReader::new(3..6, 3..4, &mut ram, &storage).unwrap();

        assert_eq!(reader.advance(&mut ram, &storage).unwrap(), Some(11));
        assert!(!reader.has_next());
        assert_eq!(reader.peek(&ram).unwrap(), 11);
    }

    #[rstest]
    fn test_two_phase_exhaustion(storage: ExternalStorage<i32>) {
        let mut ram: RamStorage<i32> = RamStorage::new(4);
        let mut reader = ChunkReader::new(0..2, 8..11, &mut ram, &storage).unwrap();

        for expected in [0, 1, 2] {
            assert!(reader.is_valid());
            assert_eq!(reader.advance(&mut ram, &storage).unwrap(), Some(expected));
        }

        assert_eq!(reader.advance(&mut ram, &storage).unwrap(), None);
        assert!(!reader.is_valid());
        assert!(matches!(
            reader.advance(&mut ram, &storage),
            Err(ChunkError::Exhausted { .. })
        ));
        assert!(!reader.is_valid());
    }

    #[rstest]
    #[case(2..2, 0..4)]
    #[case(3..2, 0..4)]
    #[case(0..2, 4..4)]
    #[case(0..10, 0..4)]
    #[case(0..2, 0..17)]
    fn test_invalid_ranges(
        storage: ExternalStorage<i32>,
        #[case] window: Range<usize>,
        #[case] source: Range<usize>,
    ) {
        let mut ram: RamStorage<i32> = RamStorage::new(9);
        assert!(matches!(
            ChunkReader::new(window, source, &mut ram, &storage),
            Err(ChunkError::InvalidRange { .. })
        ));
    }

    #[rstest]
    fn test_peek_before_advance(storage: ExternalStorage<i32>) {
        let mut ram: RamStorage<i32> = RamStorage::new(9);
        let reader = ChunkReader::new(0..3, 0..8, &mut ram, &storage).unwrap();
        assert_eq!(reader.peek(&ram), Err(ChunkError::PeekBeforeAdvance));
    }
}
