//! # pbam
//!
//! A multithreaded block-parallel reader for BAM alignment files.
//!
//! BAM files are BGZF-compressed: a sequence of independently deflated
//! blocks, each carrying its own CRC-32 and decompressed length. This crate
//! decompresses those blocks across a caller-chosen number of worker
//! threads into a shared data buffer, then hands out zero-copy [`Record`]
//! views partitioned into per-worker *lanes* so that record consumption can
//! itself run in parallel.
//!
//! The typical cycle is:
//!
//! 1. [`BamReader::from_path`] validates the BGZF EOF marker, reads the
//!    BAM header once, exposes reference names and lengths.
//! 2. [`BamReader::fill_reads`] decompresses a batch of blocks in
//!    parallel and assigns lane boundaries on record boundaries.
//! 3. [`BamReader::supply_read`] returns the next record view for a
//!    lane, or `None` once the lane is drained.
//! 4. Repeat from step 2 until [`FillStatus::EndOfStream`].
//!
//! For a ready-made fan-out loop over all lanes see [`RecordProcessor`]
//! and [`BamReader::process_parallel`].

mod bgzf;
mod buffer;
mod error;
mod header;
mod parallel;
mod reader;
mod record;
mod source;

#[cfg(test)]
pub(crate) mod testutil;

pub use bgzf::{BlockDescriptor, BlockScan};
pub use error::{
    ConfigError, CorruptionError, Error, FormatError, Result, SequenceError, TagError,
};
pub use header::{BamHeader, Reference};
pub use parallel::RecordProcessor;
pub use reader::{BamReader, FillStatus, ReaderOptions};
pub use record::{Cigar, CigarOp, OwnedRecord, Record, TagValue};
pub use source::{ByteSource, FileSource, StreamSource};

/// Fixed prefix of every BGZF block: gzip magic, FEXTRA flag, and the
/// `BC` extra-field header declaring the two-byte block-size payload.
pub const BGZF_BLOCK_PREFIX: &[u8; 16] =
    b"\x1f\x8b\x08\x04\x00\x00\x00\x00\x00\xff\x06\x00\x42\x43\x02\x00";

/// The empty BGZF block that terminates every well-formed BAM file.
pub const BGZF_EOF_MARKER: &[u8; 28] =
    b"\x1f\x8b\x08\x04\x00\x00\x00\x00\x00\xff\x06\x00\x42\x43\x02\x00\
      \x1b\x00\x03\x00\x00\x00\x00\x00\x00\x00\x00\x00";

/// Magic bytes opening the decompressed BAM stream.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Byte offset of the little-endian `u16` holding (block length - 1).
pub(crate) const BGZF_LEN_OFFSET: usize = 16;
/// Byte offset of the deflate payload within a block.
pub(crate) const BGZF_DATA_OFFSET: usize = 18;
/// Trailer: CRC-32 of the decompressed payload (4 bytes) + its length (4 bytes).
pub(crate) const BGZF_TRAILER_LEN: usize = 8;
/// Smallest possible BGZF block (the EOF marker).
pub(crate) const BGZF_MIN_BLOCK_LEN: usize = 28;

/// Default capacity of each of the two compressed file buffers (200 MB).
pub const DEFAULT_FILE_BUFFER_CAP: usize = 200_000_000;
/// Default capacity of the decompressed data buffer (1 GB).
pub const DEFAULT_DATA_BUFFER_CAP: usize = 1_000_000_000;
/// Default number of chunks a file buffer is divided into; one chunk is the
/// prefetch/swap granularity.
pub const DEFAULT_CHUNKS_PER_BUFFER: usize = 5;
