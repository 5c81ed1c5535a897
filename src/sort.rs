//! External k-way merge sorter.

use std::error::Error;
use std::fmt;

use crate::chunk::{ChunkError, ChunkReader};
use crate::storage::{ExternalStorage, RamStorage, StorageError};

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// `sort` called with an empty input, output or RAM storage.
    InvalidArgument(&'static str),
    /// RAM cannot host one window per run plus an accumulator slot.
    InsufficientRam { ram_size: usize, required: usize },
    /// Workers thread pool initialization error.
    ThreadPoolBuild(rayon::ThreadPoolBuildError),
    /// Bulk storage copy error.
    Storage(StorageError),
    /// Chunk reader error.
    Chunk(ChunkError),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SortError::ThreadPoolBuild(err) => Some(err),
            SortError::Storage(err) => Some(err),
            SortError::Chunk(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            SortError::InsufficientRam { ram_size, required } => {
                write!(f, "RAM size less than (chunk count + 1): {} < {}", ram_size, required)
            }
            SortError::ThreadPoolBuild(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::Storage(err) => write!(f, "storage operation failed: {}", err),
            SortError::Chunk(err) => write!(f, "chunk operation failed: {}", err),
        }
    }
}

impl From<StorageError> for SortError {
    fn from(err: StorageError) -> Self {
        SortError::Storage(err)
    }
}

impl From<ChunkError> for SortError {
    fn from(err: ChunkError) -> Self {
        SortError::Chunk(err)
    }
}

/// Number of runs the input is partitioned into: 1 if the whole input fits in
/// RAM, `ceil(storage_size / ram_size)` otherwise. A zero `ram_size` is
/// treated as a single cell; `sort` itself rejects empty RAM up front.
pub fn chunk_count(ram_size: usize, storage_size: usize) -> usize {
    if ram_size >= storage_size {
        return 1;
    }
    storage_size.div_ceil(ram_size.max(1))
}

/// External k-way merge sorter.
///
/// Sorts an [`ExternalStorage`] whose size may vastly exceed the
/// [`RamStorage`] workspace, in two passes: a local sort pass that turns the
/// input into RAM-sized sorted runs, and a merge pass that streams all runs
/// through disjoint RAM windows, repeatedly picking the globally-smallest
/// head element. A single merge pass suffices as long as the RAM capacity is
/// on the order of the square root of the input size or greater.
pub struct Sorter {
    /// Thread pool for the local sort pass.
    thread_pool: rayon::ThreadPool,
}

impl Sorter {
    /// Creates a sorter.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort runs in
    ///   parallel. If the parameter is [`None`] threads number will be
    ///   selected based on available CPU core number.
    pub fn new(threads_number: Option<usize>) -> Result<Self, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder.build().map_err(SortError::ThreadPoolBuild)?;

        return Ok(Sorter { thread_pool });
    }

    /// Sorts the contents of `input` into `output` using `ram` as the only
    /// working space.
    ///
    /// All validation happens before any mutation. On success `output` holds
    /// the sorted permutation of the input; `input` is left run-sorted by the
    /// local sort pass.
    pub fn sort<T>(
        &self,
        input: &mut ExternalStorage<T>,
        output: &mut ExternalStorage<T>,
        ram: &mut RamStorage<T>,
    ) -> Result<(), SortError>
    where
        T: Ord + Clone + Send,
    {
        if input.is_empty() || output.is_empty() || ram.is_empty() {
            return Err(SortError::InvalidArgument(
                "input, output and RAM storages must be non-empty",
            ));
        }

        let runs = chunk_count(ram.capacity(), input.capacity());
        let required = runs + 1;
        if ram.capacity() < required {
            return Err(SortError::InsufficientRam {
                ram_size: ram.capacity(),
                required,
            });
        }
        log::debug!("chunk count is {}", runs);

        if runs == 1 {
            log::debug!("input fits in RAM, sorting in a single pass");
            return self.base_sort(input, output, ram);
        }

        log::debug!("local sort pass over {} runs", runs);
        for i in 0..runs {
            let offset = i * ram.capacity();
            let len = ram.capacity().min(input.capacity() - offset);
            ram.read_from_offset(input, offset)?;
            self.thread_pool.install(|| ram.sort_prefix(len));
            ram.write_to_range(input, offset, 0, len)?;
        }

        self.merge(input, output, ram, runs)
    }

    /// Degenerate single-run case: load all, sort, store all.
    fn base_sort<T>(
        &self,
        input: &ExternalStorage<T>,
        output: &mut ExternalStorage<T>,
        ram: &mut RamStorage<T>,
    ) -> Result<(), SortError>
    where
        T: Ord + Clone + Send,
    {
        let len = input.capacity();
        ram.read_from(input)?;
        self.thread_pool.install(|| ram.sort_prefix(len));
        ram.write_to_range(output, 0, 0, len)?;
        Ok(())
    }

    /// Merge pass: one reader per run over disjoint RAM windows, one trailing
    /// accumulator region that is flushed to the output whenever full.
    fn merge<T>(
        &self,
        input: &ExternalStorage<T>,
        output: &mut ExternalStorage<T>,
        ram: &mut RamStorage<T>,
        runs: usize,
    ) -> Result<(), SortError>
    where
        T: Ord + Clone,
    {
        log::debug!(
            "merge pass: input size = {}, RAM size = {}",
            input.capacity(),
            ram.capacity()
        );
        // the division remainder goes to the accumulator, making it the
        // largest region
        let ram_chunk_size = ram.capacity() / (runs + 1);
        let accumulate_left = runs * ram_chunk_size;
        let accumulate_len = ram.capacity() - accumulate_left;
        log::debug!("RAM chunk size is {}", ram_chunk_size);

        let mut readers = Vec::with_capacity(runs);
        for i in 0..runs {
            let window = i * ram_chunk_size..(i + 1) * ram_chunk_size;
            let source = i * ram.capacity()..input.capacity().min((i + 1) * ram.capacity());
            readers.push(ChunkReader::new(window, source, ram, input)?);
        }
        for reader in readers.iter_mut() {
            reader.advance(ram, input)?;
        }

        let mut cur_accumulate_pos = accumulate_left;
        let mut out_pos = 0;
        for _ in 0..input.capacity() {
            if cur_accumulate_pos == ram.capacity() {
                log::debug!("flushing accumulator to output at {}", out_pos);
                ram.write_to_range(output, out_pos, accumulate_left, accumulate_len)?;
                out_pos += accumulate_len;
                cur_accumulate_pos = accumulate_left;
            }

            // first-encountered wins on equal heads, keeping equal elements
            // stable toward lower run indices
            let mut min_idx: Option<usize> = None;
            for (idx, reader) in readers.iter().enumerate() {
                if !reader.is_valid() {
                    continue;
                }
                let is_smaller = match min_idx {
                    None => true,
                    Some(best) => reader.peek(ram)? < readers[best].peek(ram)?,
                };
                if is_smaller {
                    min_idx = Some(idx);
                }
            }
            let min_idx = match min_idx {
                Some(idx) => idx,
                // all runs drained; the loop bound is an upper bound only
                None => break,
            };

            let value = readers[min_idx].peek(ram)?;
            ram.set(cur_accumulate_pos, value)?;
            cur_accumulate_pos += 1;
            readers[min_idx].advance(ram, input)?;
        }

        if cur_accumulate_pos > accumulate_left {
            log::debug!("flushing accumulator remainder to output at {}", out_pos);
            ram.write_to_range(output, out_pos, accumulate_left, cur_accumulate_pos - accumulate_left)?;
        }

        log::debug!("output io stats: {:?}", output.io_stats());
        Ok(())
    }
}
