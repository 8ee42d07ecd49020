//! BGZF block scanning, partitioning, and decompression.
//!
//! A BGZF stream is a sequence of independently deflated blocks. Each block
//! opens with a fixed 16-byte signature, declares its own compressed length
//! in a little-endian `u16` (stored as length - 1), and closes with an
//! 8-byte trailer: the CRC-32 of the decompressed payload followed by the
//! decompressed length. Because every block is self-contained, a scan pass
//! can compute source and destination ranges for a whole batch of blocks
//! without inflating anything, and the inflation itself can then run on
//! disjoint destination ranges across worker threads.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{ByteOrder, LittleEndian};
use flate2::{Decompress, FlushDecompress};

use crate::error::{CorruptionError, Result};
use crate::{
    BGZF_BLOCK_PREFIX, BGZF_DATA_OFFSET, BGZF_LEN_OFFSET, BGZF_MIN_BLOCK_LEN, BGZF_TRAILER_LEN,
};

/// How often the scanner re-validates the block signature. Checking every
/// block costs measurable throughput for no added safety in practice;
/// checking periodically still bounds how far a desynchronized scan can run.
const SIGNATURE_CHECK_INTERVAL: usize = 1000;

/// Source and destination coordinates of one compressed block, produced by
/// [`scan_blocks`] without decompressing anything.
///
/// Offsets are relative to the start of the scanned source region and the
/// start of the destination region for the same pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub src_offset: usize,
    pub src_len: usize,
    pub dst_offset: usize,
    pub dst_len: usize,
    /// CRC-32 of the decompressed payload, from the block trailer.
    pub crc: u32,
}

/// The outcome of one scan pass: an ordered run of block descriptors plus
/// the total source and destination spans they cover.
#[derive(Debug, Default)]
pub struct BlockScan {
    pub blocks: Vec<BlockDescriptor>,
    pub src_len: usize,
    pub dst_len: usize,
}

impl BlockScan {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Walk consecutive BGZF blocks at the start of `region`, stopping before
/// `chunk_limit` source bytes or `dst_budget` destination bytes would be
/// exceeded, or when the next block is not fully present in `region`.
///
/// Running out of buffered bytes or budget is normal truncation - the scan
/// simply reports what fits this round. A failed signature check is a
/// corruption error; `base_offset` is folded into the reported offset so
/// the error localizes the block within the primary buffer.
pub fn scan_blocks(
    region: &[u8],
    chunk_limit: usize,
    dst_budget: usize,
    base_offset: usize,
) -> Result<BlockScan> {
    let mut scan = BlockScan::default();
    let mut src_cursor = 0usize;
    let mut dst_cursor = 0usize;
    let mut block_count = 0usize;

    while src_cursor < chunk_limit {
        if src_cursor + BGZF_MIN_BLOCK_LEN > region.len() {
            break;
        }

        if block_count % SIGNATURE_CHECK_INTERVAL == 0
            && region[src_cursor..src_cursor + BGZF_BLOCK_PREFIX.len()] != BGZF_BLOCK_PREFIX[..]
        {
            return Err(CorruptionError::BlockSignature(base_offset + src_cursor).into());
        }
        block_count += 1;

        let block_len =
            LittleEndian::read_u16(&region[src_cursor + BGZF_LEN_OFFSET..]) as usize + 1;
        // no block is smaller than the empty EOF block; a shorter declared
        // length means the length field itself is damaged
        if block_len < BGZF_MIN_BLOCK_LEN {
            return Err(CorruptionError::BlockSignature(base_offset + src_cursor).into());
        }
        if src_cursor + block_len > region.len() {
            break;
        }
        if src_cursor + block_len > chunk_limit {
            break;
        }

        let trailer = src_cursor + block_len - BGZF_TRAILER_LEN;
        let crc = LittleEndian::read_u32(&region[trailer..]);
        let dst_len = LittleEndian::read_u32(&region[trailer + 4..]) as usize;
        if dst_cursor + dst_len > dst_budget {
            break;
        }

        scan.blocks.push(BlockDescriptor {
            src_offset: src_cursor,
            src_len: block_len,
            dst_offset: dst_cursor,
            dst_len,
            crc,
        });
        src_cursor += block_len;
        dst_cursor += dst_len;
    }

    scan.src_len = src_cursor;
    scan.dst_len = dst_cursor;
    Ok(scan)
}

/// Split `blocks` into `workers` contiguous index ranges balanced by
/// cumulative *source* bytes, never splitting a block. Trailing ranges may
/// be empty when there are fewer blocks than workers.
pub fn partition_blocks(blocks: &[BlockDescriptor], workers: usize) -> Vec<Range<usize>> {
    assert!(workers > 0);
    let src_total: usize = blocks.iter().map(|b| b.src_len).sum();

    // divider * workers > src_total, so at most workers - 1 boundaries trigger
    let divider = 1 + src_total / workers;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0usize;
    let mut consumed = 0usize;
    let mut next_boundary = divider.min(src_total);

    for (idx, block) in blocks.iter().enumerate() {
        consumed += block.src_len;
        if consumed > next_boundary && ranges.len() < workers - 1 {
            ranges.push(start..idx + 1);
            start = idx + 1;
            next_boundary = (next_boundary + divider).min(src_total);
        }
    }
    ranges.push(start..blocks.len());
    while ranges.len() < workers {
        ranges.push(blocks.len()..blocks.len());
    }
    ranges
}

/// Inflate a run of blocks sequentially into `dst`, verifying each block's
/// CRC-32 against its trailer.
///
/// `src` is the full scanned source region; `dst` covers exactly the
/// destination span of `blocks`, so block destination offsets are rebased
/// against the first block's. The shared `failed` flag is checked before
/// each block so that sibling workers abort early once any of them errors.
pub fn inflate_span(
    blocks: &[BlockDescriptor],
    src: &[u8],
    dst: &mut [u8],
    failed: &AtomicBool,
) -> Result<()> {
    let Some(first) = blocks.first() else {
        return Ok(());
    };
    let dst_base = first.dst_offset;

    for block in blocks {
        if failed.load(Ordering::Relaxed) {
            return Ok(());
        }
        if block.dst_len == 0 {
            // The EOF marker block inflates to nothing.
            continue;
        }

        let payload =
            &src[block.src_offset + BGZF_DATA_OFFSET..block.src_offset + block.src_len - BGZF_TRAILER_LEN];
        let out = &mut dst[block.dst_offset - dst_base..block.dst_offset - dst_base + block.dst_len];

        inflate_block(payload, out).inspect_err(|_| {
            failed.store(true, Ordering::Relaxed);
        })?;

        let computed = crc32fast::hash(out);
        if computed != block.crc {
            failed.store(true, Ordering::Relaxed);
            return Err(CorruptionError::CrcMismatch {
                stored: block.crc,
                computed,
            }
            .into());
        }
    }
    Ok(())
}

/// Raw-deflate a single block payload into an exactly-sized output slice.
fn inflate_block(payload: &[u8], out: &mut [u8]) -> Result<()> {
    let mut inflater = Decompress::new(false);
    inflater
        .decompress(payload, out, FlushDecompress::Finish)
        .map_err(|e| CorruptionError::Inflate(e.to_string()))?;
    if inflater.total_out() as usize != out.len() {
        return Err(CorruptionError::LengthMismatch {
            declared: out.len(),
            got: inflater.total_out() as usize,
        }
        .into());
    }
    Ok(())
}
