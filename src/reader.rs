//! The block-parallel BAM reader.
//!
//! The reader owns three buffers: a *primary* buffer of compressed bytes,
//! a *spare* buffer that is prefetched while decompression runs, and the
//! decompressed *data* buffer that record views point into. Each call to
//! [`BamReader::fill_reads`] scans whole BGZF blocks out of the primary
//! buffer, inflates them across worker threads into the data buffer, then
//! splits the complete records into one *lane* per thread so that record
//! consumption can fan out again.
//!
//! Buffer cursors and fill levels only advance after a fully successful
//! pass; a corruption error leaves the reader at its last committed state.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::AtomicBool;

use byteorder::{ByteOrder, LittleEndian};

use crate::bgzf::{inflate_span, partition_blocks, scan_blocks, BlockScan};
use crate::buffer::ByteBuffer;
use crate::error::{ConfigError, CorruptionError, FormatError, Result, SequenceError};
use crate::header::{BamHeader, DecodedRead};
use crate::parallel::RecordProcessor;
use crate::record::Record;
use crate::source::{ByteSource, FileSource, StreamSource};
use crate::{
    BGZF_EOF_MARKER, BGZF_MIN_BLOCK_LEN, DEFAULT_CHUNKS_PER_BUFFER, DEFAULT_DATA_BUFFER_CAP,
    DEFAULT_FILE_BUFFER_CAP,
};

/// Smallest allowed scan chunk; below this the scanner would thrash.
const MIN_CHUNK_SIZE: usize = 1 << 20;
/// Reads at least this large fan out over independent file handles.
const MULTI_READ_MIN: usize = 1 << 22;
/// Per-round decompression target while parsing the header.
const HEADER_DECOMPRESS_STEP: usize = 1 << 20;

/// Outcome of a [`BamReader::fill_reads`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillStatus {
    /// Lanes hold a fresh batch of records.
    Ready,
    /// The source is exhausted and every buffer is drained.
    EndOfStream,
}

/// One worker's slice of the decoded record region, `[cursor, end)` into
/// the data buffer, both ends on record boundaries.
#[derive(Clone, Copy, Debug, Default)]
struct Lane {
    cursor: usize,
    end: usize,
}

impl Lane {
    fn is_drained(&self) -> bool {
        self.cursor >= self.end
    }
}

/// Builder for [`BamReader`] tuning knobs.
///
/// ```no_run
/// use pbam::ReaderOptions;
///
/// let mut reader = ReaderOptions::default()
///     .threads(4)
///     .open_path("aligned.bam")?;
/// # Ok::<(), pbam::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    threads: usize,
    file_buffer_cap: usize,
    data_buffer_cap: usize,
    chunks_per_buffer: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            file_buffer_cap: DEFAULT_FILE_BUFFER_CAP,
            data_buffer_cap: DEFAULT_DATA_BUFFER_CAP,
            chunks_per_buffer: DEFAULT_CHUNKS_PER_BUFFER,
        }
    }
}

impl ReaderOptions {
    /// Number of worker threads and record lanes; 0 means all cores.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Capacity of each of the two compressed file buffers.
    #[must_use]
    pub fn file_buffer_cap(mut self, bytes: usize) -> Self {
        self.file_buffer_cap = bytes;
        self
    }

    /// Capacity of the decompressed data buffer.
    #[must_use]
    pub fn data_buffer_cap(mut self, bytes: usize) -> Self {
        self.data_buffer_cap = bytes;
        self
    }

    /// How many chunks a file buffer is divided into; one chunk is the
    /// prefetch and swap granularity.
    #[must_use]
    pub fn chunks_per_buffer(mut self, chunks: usize) -> Self {
        self.chunks_per_buffer = chunks;
        self
    }

    /// Open a BAM file on disk.
    pub fn open_path<P: AsRef<Path>>(self, path: P) -> Result<BamReader<FileSource>> {
        self.open(FileSource::open(path)?)
    }

    /// Open any seekable stream of BGZF-compressed bytes.
    pub fn open_stream<R: Read + Seek + Send>(self, stream: R) -> Result<BamReader<StreamSource<R>>> {
        self.open(StreamSource::new(stream)?)
    }

    /// Open a custom [`ByteSource`].
    pub fn open<S: ByteSource>(self, mut source: S) -> Result<BamReader<S>> {
        let (threads, chunk_size) = self.validate()?;
        check_eof_marker(&mut source)?;

        let mut reader = BamReader {
            source,
            threads,
            chunk_size,
            file_cap: self.file_buffer_cap,
            data_cap: self.data_buffer_cap,
            primary: ByteBuffer::new(),
            spare: ByteBuffer::new(),
            data: ByteBuffer::new(),
            header: None,
            lanes: vec![Lane::default(); threads],
            records_end: 0,
            progress: 0,
            progress_mark: 0,
        };
        reader.refill_file_buffers()?;
        reader.read_header()?;
        Ok(reader)
    }

    fn validate(&self) -> Result<(usize, usize)> {
        if self.chunks_per_buffer == 0 {
            return Err(ConfigError::ChunkTooSmall(0).into());
        }
        let chunk_size = self.file_buffer_cap / self.chunks_per_buffer;
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::ChunkTooSmall(chunk_size).into());
        }
        if self.data_buffer_cap < self.file_buffer_cap {
            return Err(ConfigError::DataCapBelowFileCap {
                data: self.data_buffer_cap,
                file: self.file_buffer_cap,
            }
            .into());
        }
        // 0 means all cores; explicit requests are capped at the core count
        let cores = num_cpus::get().max(1);
        let threads = if self.threads == 0 {
            cores
        } else {
            self.threads.min(cores)
        };
        Ok((threads, chunk_size))
    }
}

/// A well-formed BAM file ends with the empty EOF block; anything else is
/// refused at open time rather than discovered as corruption mid-read.
fn check_eof_marker<S: ByteSource>(source: &mut S) -> Result<()> {
    let len = source.len();
    if len < (BGZF_MIN_BLOCK_LEN * 2) as u64 {
        return Err(FormatError::FileTooShort(len).into());
    }
    let mut tail = [0u8; BGZF_EOF_MARKER.len()];
    source.seek_to(len - tail.len() as u64)?;
    source.read_exact(&mut tail)?;
    if tail != *BGZF_EOF_MARKER {
        return Err(FormatError::MissingEofMarker.into());
    }
    source.seek_to(0)
}

/// A multithreaded reader of BGZF-compressed BAM files.
///
/// See the [crate docs](crate) for the fill/supply cycle.
pub struct BamReader<S: ByteSource = FileSource> {
    source: S,
    threads: usize,
    chunk_size: usize,
    file_cap: usize,
    data_cap: usize,
    /// Compressed bytes currently being scanned and inflated.
    primary: ByteBuffer,
    /// Compressed bytes prefetched while inflation runs.
    spare: ByteBuffer,
    /// Decompressed bytes that record views point into.
    data: ByteBuffer,
    header: Option<BamHeader>,
    lanes: Vec<Lane>,
    /// End of the complete-record region within the data buffer; bytes
    /// beyond it are a partial record awaiting the next fill.
    records_end: usize,
    progress: u64,
    /// Value of `progress` at the last [`BamReader::inc_progress`] call.
    progress_mark: u64,
}

impl<S: ByteSource> std::fmt::Debug for BamReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamReader")
            .field("threads", &self.threads)
            .field("file_size", &self.source.len())
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl BamReader<FileSource> {
    /// Open a BAM file with default options and all cores.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        ReaderOptions::default().open_path(path)
    }
}

impl<S: ByteSource> BamReader<S> {
    /// The parsed header, available as soon as the reader is open.
    pub fn header(&self) -> Result<&BamHeader> {
        self.header
            .as_ref()
            .ok_or_else(|| SequenceError::HeaderNotRead.into())
    }

    /// Reference names and lengths from the header dictionary.
    pub fn reference_table(&self) -> Result<(Vec<String>, Vec<u32>)> {
        Ok(self.header()?.reference_table())
    }

    /// Number of record lanes, equal to the worker thread count.
    #[must_use]
    pub fn n_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Compressed bytes decompressed so far.
    #[must_use]
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Compressed bytes decompressed since the previous call; the first
    /// call reports everything since open. Dividing by
    /// [`file_size`](Self::file_size) gives a per-batch progress fraction.
    pub fn inc_progress(&mut self) -> u64 {
        let delta = self.progress - self.progress_mark;
        self.progress_mark = self.progress;
        delta
    }

    /// Total compressed file size.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.source.len()
    }

    fn read_header(&mut self) -> Result<()> {
        if self.header.is_some() {
            return Err(SequenceError::HeaderAlreadyRead.into());
        }
        let header = BamHeader::read_from(self)?;
        self.header = Some(header);
        Ok(())
    }

    /// Decompress the next batch of blocks and split the complete records
    /// into lanes.
    ///
    /// Every lane must be drained first; otherwise records would be
    /// silently dropped and a [`SequenceError::LanesNotDrained`] is
    /// returned instead. On [`FillStatus::Ready`] each lane holds a run of
    /// whole records; a partial record at the end of the decoded region is
    /// carried over into the next fill.
    pub fn fill_reads(&mut self) -> Result<FillStatus> {
        if self.header.is_none() {
            return Err(SequenceError::HeaderNotRead.into());
        }
        if let Some(lane) = self.lanes.iter().position(|l| !l.is_drained()) {
            return Err(SequenceError::LanesNotDrained(lane).into());
        }

        // discard the batch just consumed, keep any partial-record tail
        let consumed = self.records_end.saturating_sub(self.data.cursor());
        self.data.consume(consumed);
        self.data.compact();
        self.records_end = 0;

        self.decompress(self.data_cap)?;

        self.records_end = self.split_lanes();
        if self.records_end == 0 {
            if self.exhausted() {
                return Ok(FillStatus::EndOfStream);
            }
            // the data buffer filled up without completing a single record
            return Err(CorruptionError::RecordOverrun {
                lane: 0,
                cursor: 0,
                end: self.data.cap(),
            }
            .into());
        }
        Ok(FillStatus::Ready)
    }

    /// The next record in `lane`, or `None` once the lane is drained.
    pub fn supply_read(&mut self, lane: usize) -> Result<Option<Record<'_>>> {
        let lanes = self.lanes.len();
        let slot = self
            .lanes
            .get_mut(lane)
            .ok_or(SequenceError::InvalidLane { lane, lanes })?;
        if slot.is_drained() {
            return Ok(None);
        }
        let (cursor, end) = (slot.cursor, slot.end);

        let data = self.data.filled();
        let overrun = || CorruptionError::RecordOverrun { lane, cursor, end };
        let body_len = LittleEndian::read_u32(&data[cursor..]) as usize;
        let body = data
            .get(cursor + 4..cursor + 4 + body_len)
            .ok_or_else(overrun)?;
        let record = Record::try_new(body).ok_or_else(overrun)?;

        self.lanes[lane].cursor = cursor + 4 + body_len;
        Ok(Some(record))
    }

    /// Count of records left in `lane`.
    pub fn remaining_in_lane(&self, lane: usize) -> Result<usize> {
        let lanes = self.lanes.len();
        let slot = self
            .lanes
            .get(lane)
            .ok_or(SequenceError::InvalidLane { lane, lanes })?;
        let data = self.data.filled();
        let mut pos = slot.cursor;
        let mut count = 0;
        while pos + 4 <= slot.end {
            pos += 4 + LittleEndian::read_u32(&data[pos..]) as usize;
            count += 1;
        }
        Ok(count)
    }

    /// Drive the whole file through `processor`: fill a batch, fan one
    /// clone of the processor out per lane on scoped threads, repeat until
    /// the stream ends.
    pub fn process_parallel<P: RecordProcessor>(&mut self, processor: P) -> Result<()> {
        loop {
            if self.fill_reads()? == FillStatus::EndOfStream {
                return Ok(());
            }
            let Self { data, lanes, .. } = self;
            let data = data.filled();

            std::thread::scope(|s| -> Result<()> {
                let mut handles = Vec::with_capacity(lanes.len());
                for (lane_id, lane) in lanes.iter_mut().enumerate() {
                    let mut worker = processor.clone();
                    handles.push(s.spawn(move || -> Result<()> {
                        worker.set_lane(lane_id);
                        while lane.cursor < lane.end {
                            let cursor = lane.cursor;
                            let overrun = || CorruptionError::RecordOverrun {
                                lane: lane_id,
                                cursor,
                                end: lane.end,
                            };
                            let body_len = LittleEndian::read_u32(&data[cursor..]) as usize;
                            let body = data
                                .get(cursor + 4..cursor + 4 + body_len)
                                .ok_or_else(overrun)?;
                            let record = Record::try_new(body).ok_or_else(overrun)?;
                            worker.process_record(record)?;
                            lane.cursor = cursor + 4 + body_len;
                        }
                        worker.on_batch_complete()
                    }));
                }
                let mut first_err = None;
                for handle in handles {
                    match handle.join() {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => first_err = first_err.or(Some(e)),
                        Err(_) => {
                            first_err = first_err
                                .or_else(|| Some(anyhow::anyhow!("record worker panicked").into()));
                        }
                    }
                }
                first_err.map_or(Ok(()), Err)
            })?;
        }
    }

    // ==================== Decompression cycle ====================

    /// Inflate blocks until `target` decompressed bytes were added, the
    /// data budget is spent, or the source runs dry.
    fn decompress(&mut self, target: usize) -> Result<usize> {
        let mut added = 0usize;
        while added < target {
            if self.primary.remaining() < self.chunk_size {
                self.refill_file_buffers()?;
            }
            if self.primary.is_drained() {
                break;
            }
            let budget = (self.data_cap - self.data.cap()).min(target - added);
            if budget == 0 {
                break;
            }
            let scan = scan_blocks(
                self.primary.unconsumed(),
                self.primary.remaining(),
                budget,
                self.primary.cursor(),
            )?;
            if scan.is_empty() {
                break;
            }
            added += scan.dst_len;
            self.inflate_scan(&scan)?;
        }
        Ok(added)
    }

    /// Inflate one scanned batch in parallel and commit the cursors.
    ///
    /// Worker threads inflate disjoint destination spans while the calling
    /// thread prefetches the next chunk of compressed bytes into the spare
    /// buffer. Cursors and fill levels advance only if every worker
    /// succeeded.
    fn inflate_scan(&mut self, scan: &BlockScan) -> Result<()> {
        let ranges = partition_blocks(&scan.blocks, self.threads);
        let prefetch = self
            .chunk_size
            .min(self.file_cap.saturating_sub(self.spare.cap()))
            .min(usize::try_from(self.source.bytes_left()).unwrap_or(usize::MAX));

        let Self {
            source,
            primary,
            spare,
            data,
            progress,
            ..
        } = self;
        let src = &primary.unconsumed()[..scan.src_len];
        let dst_start = data.cap();
        let dst = data.region_mut(dst_start, dst_start + scan.dst_len);
        let failed = AtomicBool::new(false);

        std::thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(ranges.len());
            let mut rest = dst;
            for range in &ranges {
                let span = &scan.blocks[range.clone()];
                let span_dst: usize = span.iter().map(|b| b.dst_len).sum();
                let (mine, tail) = std::mem::take(&mut rest).split_at_mut(span_dst);
                rest = tail;
                let failed = &failed;
                handles.push(s.spawn(move || inflate_span(span, src, mine, failed)));
            }

            // overlap the next chunk's file read with decompression
            let prefetch_result = fill_spare(source, spare, prefetch);

            let mut first_err = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => first_err = first_err.or(Some(e)),
                    Err(_) => {
                        first_err = first_err.or_else(|| {
                            Some(anyhow::anyhow!("block decompression worker panicked").into())
                        });
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => prefetch_result.map(|_| ()),
            }
        })?;

        primary.consume(scan.src_len);
        data.advance_cap(scan.dst_len);
        *progress += scan.src_len as u64;
        Ok(())
    }

    /// Compact the primary buffer, pull in everything the spare buffer
    /// holds, then top up from the source.
    fn refill_file_buffers(&mut self) -> Result<()> {
        self.primary.compact();

        if self.spare.remaining() > 0 {
            let take = self
                .spare
                .remaining()
                .min(self.file_cap - self.primary.cap());
            let start = self.primary.cap();
            self.primary
                .spare_mut(start + take)
                .copy_from_slice(&self.spare.unconsumed()[..take]);
            self.primary.advance_cap(take);
            self.spare.consume(take);
            self.spare.compact();
        }

        let free = self.file_cap - self.primary.cap();
        let want = free.min(usize::try_from(self.source.bytes_left()).unwrap_or(usize::MAX));
        if want > 0 {
            let start = self.primary.cap();
            let dst = self.primary.spare_mut(start + want);
            read_span(&mut self.source, dst, self.threads)?;
            self.primary.advance_cap(want);
        }
        Ok(())
    }

    fn exhausted(&self) -> bool {
        self.source.is_eof() && self.primary.is_drained() && self.spare.is_drained()
    }

    /// Walk the decoded region for complete records and cut it into lanes
    /// balanced by bytes, never splitting a record. Returns the end of the
    /// complete-record region.
    fn split_lanes(&mut self) -> usize {
        let data = self.data.filled();

        let mut pos = 0usize;
        while pos + 4 <= data.len() {
            let body_len = LittleEndian::read_u32(&data[pos..]) as usize;
            if pos + 4 + body_len > data.len() {
                break;
            }
            pos += 4 + body_len;
        }
        let records_end = pos;

        for lane in &mut self.lanes {
            *lane = Lane::default();
        }
        if records_end == 0 {
            return 0;
        }

        let n = self.lanes.len();
        // divider * n > records_end, so at most n - 1 boundaries trigger
        let divider = 1 + records_end / n;
        let mut next_boundary = divider.min(records_end);
        let mut lane = 0usize;
        let mut start = 0usize;
        let mut pos = 0usize;
        while pos < records_end {
            pos += 4 + LittleEndian::read_u32(&data[pos..]) as usize;
            if pos > next_boundary && lane < n - 1 {
                self.lanes[lane] = Lane { cursor: start, end: pos };
                start = pos;
                lane += 1;
                next_boundary = (next_boundary + divider).min(records_end);
            }
        }
        self.lanes[lane] = Lane {
            cursor: start,
            end: records_end,
        };
        records_end
    }
}

impl<S: ByteSource> DecodedRead for BamReader<S> {
    fn read_decoded(&mut self, dst: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < dst.len() {
            if self.data.is_drained() && self.decompress(HEADER_DECOMPRESS_STEP)? == 0 {
                break;
            }
            let avail = self.data.unconsumed();
            let n = avail.len().min(dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&avail[..n]);
            self.data.consume(n);
            filled += n;
        }
        Ok(filled)
    }
}

/// Append up to `want` bytes from the source to the spare buffer.
fn fill_spare<S: ByteSource>(source: &mut S, spare: &mut ByteBuffer, want: usize) -> Result<usize> {
    let want = want.min(usize::try_from(source.bytes_left()).unwrap_or(usize::MAX));
    if want == 0 {
        return Ok(0);
    }
    let start = spare.cap();
    source.read_exact(spare.spare_mut(start + want))?;
    spare.advance_cap(want);
    Ok(want)
}

/// Fill `dst` from the source, fanning large reads on file-backed sources
/// out over independent file handles.
fn read_span<S: ByteSource>(source: &mut S, dst: &mut [u8], workers: usize) -> Result<()> {
    if dst.is_empty() {
        return Ok(());
    }
    if workers > 1 && dst.len() >= MULTI_READ_MIN {
        if let Some(path) = source.path().map(Path::to_path_buf) {
            let base = source.position();
            multi_handle_read(&path, base, dst, workers)?;
            return source.seek_to(base + dst.len() as u64);
        }
    }
    source.read_exact(dst)
}

fn multi_handle_read(path: &Path, base: u64, dst: &mut [u8], workers: usize) -> Result<()> {
    // divider * workers > dst.len(), so every worker gets at most one span
    let span = 1 + dst.len() / workers;
    std::thread::scope(|s| -> Result<()> {
        let mut handles = Vec::with_capacity(workers);
        let mut rest = dst;
        let mut offset = base;
        while !rest.is_empty() {
            let take = span.min(rest.len());
            let (mine, tail) = std::mem::take(&mut rest).split_at_mut(take);
            rest = tail;
            let start = offset;
            offset += take as u64;
            handles.push(s.spawn(move || -> Result<()> {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(start))?;
                file.read_exact(mine)?;
                Ok(())
            }));
        }
        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("file read worker panicked"))??;
        }
        Ok(())
    })
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::testutil::{bam_file, RecordSpec};
    use crate::Error;

    fn open_bytes(bytes: Vec<u8>, threads: usize) -> Result<BamReader<StreamSource<Cursor<Vec<u8>>>>> {
        ReaderOptions::default()
            .threads(threads)
            .open_stream(Cursor::new(bytes))
    }

    fn three_records() -> Vec<RecordSpec> {
        vec![
            RecordSpec::new("r1", 0, 100).seq("ACGT").qual(&[30; 4]),
            RecordSpec::new("r2", 0, 200).seq("GGTA").qual(&[31; 4]),
            RecordSpec::new("r3", 1, 50).seq("TTAACC").qual(&[32; 6]),
        ]
    }

    #[test]
    fn test_open_reads_header() {
        let bytes = bam_file(
            "@HD\tVN:1.6\n",
            &[("chr1", 1000), ("chr2", 2000)],
            &three_records(),
            4096,
        );
        let reader = open_bytes(bytes, 2).unwrap();

        let header = reader.header().unwrap();
        assert_eq!(header.text, "@HD\tVN:1.6\n");
        assert_eq!(header.n_references(), 2);
        let (names, lens) = reader.reference_table().unwrap();
        assert_eq!(names, vec!["chr1", "chr2"]);
        assert_eq!(lens, vec![1000, 2000]);
        assert_eq!(reader.n_lanes(), 2usize.min(num_cpus::get()));
    }

    #[test]
    fn test_thread_request_clamped_to_core_count() {
        let bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        let cores = num_cpus::get();
        let reader = open_bytes(bytes, cores + 16).unwrap();
        assert_eq!(reader.n_lanes(), cores);
    }

    #[test]
    fn test_reader_debug_is_printable() {
        let bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        let reader = open_bytes(bytes, 1).unwrap();
        let printed = format!("{reader:?}");
        assert!(printed.contains("BamReader"));
        assert!(printed.contains("file_size"));
    }

    #[test]
    fn test_inc_progress_reports_deltas() {
        let bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        let mut reader = open_bytes(bytes, 1).unwrap();

        // the first call covers everything decompressed during open
        let first = reader.inc_progress();
        assert!(first > 0);
        assert_eq!(reader.inc_progress(), 0);

        while reader.fill_reads().unwrap() == FillStatus::Ready {
            while reader.supply_read(0).unwrap().is_some() {}
        }
        assert_eq!(first + reader.inc_progress(), reader.progress());
        assert_eq!(reader.progress(), reader.file_size());
    }

    #[test]
    fn test_fill_and_supply_single_lane() {
        let bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        let mut reader = open_bytes(bytes, 1).unwrap();

        assert_eq!(reader.fill_reads().unwrap(), FillStatus::Ready);
        assert_eq!(reader.remaining_in_lane(0).unwrap(), 3);

        let names: Vec<String> = std::iter::from_fn(|| {
            reader
                .supply_read(0)
                .unwrap()
                .map(|r| r.name_str().unwrap().to_string())
        })
        .collect();
        assert_eq!(names, vec!["r1", "r2", "r3"]);

        // drained lane keeps answering None
        assert!(reader.supply_read(0).unwrap().is_none());
        assert_eq!(reader.fill_reads().unwrap(), FillStatus::EndOfStream);
    }

    #[test]
    fn test_lanes_cover_all_records() {
        let records: Vec<RecordSpec> = (0..100)
            .map(|i| {
                RecordSpec::new(&format!("read{i}"), 0, i)
                    .seq("ACGTACGT")
                    .qual(&[30; 8])
            })
            .collect();
        let bytes = bam_file("@HD\n", &[("chr1", 100_000)], &records, 1024);
        let mut reader = open_bytes(bytes, 4).unwrap();

        assert_eq!(reader.fill_reads().unwrap(), FillStatus::Ready);
        let mut seen = Vec::new();
        for lane in 0..reader.n_lanes() {
            while let Some(rec) = reader.supply_read(lane).unwrap() {
                seen.push(rec.pos());
            }
        }
        // lanes partition the batch in order with nothing lost
        assert_eq!(seen, (0..100).collect::<Vec<i32>>());
        assert_eq!(reader.fill_reads().unwrap(), FillStatus::EndOfStream);
    }

    #[test]
    fn test_fill_before_drain_is_sequence_error() {
        let bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        let mut reader = open_bytes(bytes, 1).unwrap();

        reader.fill_reads().unwrap();
        reader.supply_read(0).unwrap().unwrap();
        let err = reader.fill_reads().unwrap_err();
        assert!(matches!(
            err,
            Error::Sequence(SequenceError::LanesNotDrained(0))
        ));

        // the reader is still usable after the contract violation
        while reader.supply_read(0).unwrap().is_some() {}
        assert_eq!(reader.fill_reads().unwrap(), FillStatus::EndOfStream);
    }

    #[test]
    fn test_invalid_lane_id() {
        let bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        let mut reader = open_bytes(bytes, 2).unwrap();
        reader.fill_reads().unwrap();

        let err = reader.supply_read(5).unwrap_err();
        assert!(matches!(
            err,
            Error::Sequence(SequenceError::InvalidLane { lane: 5, .. })
        ));
    }

    #[test]
    fn test_missing_eof_marker_rejected_at_open() {
        let mut bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        bytes.truncate(bytes.len() - 4);
        let err = open_bytes(bytes, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::MissingEofMarker)
        ));
    }

    #[test]
    fn test_tiny_file_rejected_at_open() {
        let err = open_bytes(BGZF_EOF_MARKER.to_vec(), 1).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::FileTooShort(28))));
    }

    #[test]
    fn test_corrupt_block_fails_without_commit() {
        let records: Vec<RecordSpec> = (0..50)
            .map(|i| RecordSpec::new(&format!("q{i}"), 0, i).seq("ACGT").qual(&[30; 4]))
            .collect();
        let mut bytes = bam_file("", &[("chr1", 1000)], &records, 512);

        // flip a stored CRC in the last data block's trailer
        let crc_byte = bytes.len() - BGZF_EOF_MARKER.len() - 6;
        bytes[crc_byte] ^= 0xff;

        match open_bytes(bytes, 2) {
            // corruption may already surface while reading the header
            Err(e) => assert!(e.is_corruption()),
            Ok(mut reader) => {
                let before = reader.progress();
                let err = reader.fill_reads().unwrap_err();
                assert!(err.is_corruption());
                assert_eq!(reader.progress(), before);
            }
        }
    }

    #[test]
    fn test_options_validation() {
        let err = ReaderOptions::default()
            .file_buffer_cap(1 << 20)
            .chunks_per_buffer(4)
            .open_stream(Cursor::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::ChunkTooSmall(_))
        ));

        let err = ReaderOptions::default()
            .file_buffer_cap(64 << 20)
            .data_buffer_cap(32 << 20)
            .open_stream(Cursor::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::DataCapBelowFileCap { .. })
        ));
    }

    #[test]
    fn test_lane_count_pads_past_record_count() {
        let bytes = bam_file("", &[("chr1", 1000), ("chr2", 2000)], &three_records(), 4096);
        let mut reader = open_bytes(bytes, 8).unwrap();

        reader.fill_reads().unwrap();
        let total: usize = (0..reader.n_lanes())
            .map(|l| reader.remaining_in_lane(l).unwrap())
            .sum();
        assert_eq!(total, 3);
        for lane in 0..reader.n_lanes() {
            while reader.supply_read(lane).unwrap().is_some() {}
        }
        assert_eq!(reader.fill_reads().unwrap(), FillStatus::EndOfStream);
    }
}
