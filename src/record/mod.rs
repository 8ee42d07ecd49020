//! Zero-copy record views over decompressed BAM bytes.
//!
//! Each alignment record is a length-prefixed blob: a fixed 32-byte core
//! followed by the read name, packed CIGAR operations, 4-bit-packed
//! sequence, per-base qualities, and a trailing auxiliary tag table.
//! [`Record`] overlays those bytes without copying; [`OwnedRecord`] holds a
//! private copy for callers who need the record to outlive the reader's
//! next refill cycle.

mod cigar;
mod tags;

use std::cell::OnceCell;

use bytemuck::{Pod, Zeroable};
use byteorder::{ByteOrder, LittleEndian};

pub use cigar::{Cigar, CigarOp};
pub use tags::TagValue;
pub(crate) use tags::TagIndex;

use crate::error::{Result, TagError};

/// Size of the fixed record core, bytes `[0, 32)` of the record body.
pub(crate) const CORE_SIZE: usize = 32;
/// Smallest valid record: 4-byte length prefix + 32-byte core.
pub(crate) const MIN_RECORD_SIZE: usize = 36;

/// The fixed-width core fields at the head of every record body.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct RecordCore {
    pub ref_id: i32,
    pub pos: i32,
    pub l_read_name: u8,
    pub mapq: u8,
    pub bin: u16,
    pub n_cigar_op: u16,
    pub flag: u16,
    pub l_seq: u32,
    pub next_ref_id: i32,
    pub next_pos: i32,
    pub tlen: i32,
}

impl RecordCore {
    /// Byte length of the fixed plus variable-length sections, excluding
    /// the auxiliary tag table.
    fn layout_len(&self) -> usize {
        CORE_SIZE
            + self.l_read_name as usize
            + 4 * self.n_cigar_op as usize
            + (self.l_seq as usize + 1) / 2
            + self.l_seq as usize
    }
}

/// A borrowed view of one record, pointing into the reader's decompressed
/// buffer. Valid only until that buffer is next refilled - the borrow
/// checker enforces this, since refilling requires `&mut` on the reader.
///
/// Use [`Record::to_owned`] to obtain a refill-surviving copy.
#[derive(Clone, Debug)]
pub struct Record<'a> {
    /// The record body: everything after the 4-byte length prefix.
    data: &'a [u8],
    core: RecordCore,
    tag_index: OnceCell<TagIndex>,
}

impl<'a> Record<'a> {
    /// Overlay a record body, validating its length arithmetic.
    ///
    /// Returns `None` if the declared length is below the 36-byte minimum
    /// or the core's variable-length sections overrun the body.
    pub(crate) fn try_new(data: &'a [u8]) -> Option<Self> {
        if data.len() + 4 < MIN_RECORD_SIZE {
            return None;
        }
        let core: RecordCore = bytemuck::pod_read_unaligned(&data[..CORE_SIZE]);
        if core.layout_len() > data.len() {
            return None;
        }
        Some(Self {
            data,
            core,
            tag_index: OnceCell::new(),
        })
    }

    /// The record body length as declared by the length prefix.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.data.len()
    }

    // ==================== Core getters ====================

    #[must_use]
    pub fn ref_id(&self) -> i32 {
        self.core.ref_id
    }
    #[must_use]
    pub fn pos(&self) -> i32 {
        self.core.pos
    }
    #[must_use]
    pub fn mapq(&self) -> u8 {
        self.core.mapq
    }
    #[must_use]
    pub fn bin(&self) -> u16 {
        self.core.bin
    }
    #[must_use]
    pub fn flag(&self) -> u16 {
        self.core.flag
    }
    #[must_use]
    pub fn next_ref_id(&self) -> i32 {
        self.core.next_ref_id
    }
    #[must_use]
    pub fn next_pos(&self) -> i32 {
        self.core.next_pos
    }
    #[must_use]
    pub fn tlen(&self) -> i32 {
        self.core.tlen
    }
    /// Sequence length in bases.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.core.l_seq as usize
    }

    // ==================== Section offsets ====================

    fn name_offset(&self) -> usize {
        CORE_SIZE
    }
    fn cigar_offset(&self) -> usize {
        self.name_offset() + self.core.l_read_name as usize
    }
    fn seq_offset(&self) -> usize {
        self.cigar_offset() + 4 * self.core.n_cigar_op as usize
    }
    fn qual_offset(&self) -> usize {
        self.seq_offset() + (self.core.l_seq as usize + 1) / 2
    }
    pub(crate) fn tag_offset(&self) -> usize {
        self.qual_offset() + self.core.l_seq as usize
    }

    // ==================== Variable-length getters ====================

    /// The read name, without its trailing NUL.
    #[must_use]
    pub fn name(&self) -> &'a [u8] {
        let len = (self.core.l_read_name as usize).saturating_sub(1);
        &self.data[self.name_offset()..self.name_offset() + len]
    }

    pub fn name_str(&self) -> Result<&'a str> {
        Ok(std::str::from_utf8(self.name())?)
    }

    /// The CIGAR operations, transparently following the `CG` tag
    /// indirection used for reads whose operation count overflows the
    /// 16-bit core field.
    #[must_use]
    pub fn cigar(&self) -> Cigar<'a> {
        if let Some(long) = self.long_cigar() {
            return long;
        }
        let n_ops = self.core.n_cigar_op as usize;
        Cigar::new(
            &self.data[self.cigar_offset()..self.cigar_offset() + 4 * n_ops],
            n_ops,
        )
    }

    /// Detect the long-read sentinel: exactly two inline operations, a
    /// soft-clip spanning the full sequence followed by a reference skip,
    /// with the real operation list stashed in a `CG:B,I` tag.
    fn long_cigar(&self) -> Option<Cigar<'a>> {
        if self.core.n_cigar_op != 2 {
            return None;
        }
        let off = self.cigar_offset();
        let first = LittleEndian::read_u32(&self.data[off..]);
        let second = LittleEndian::read_u32(&self.data[off + 4..]);
        if CigarOp::from_code(first & 0xf) != Some(CigarOp::SoftClip)
            || CigarOp::from_code(second & 0xf) != Some(CigarOp::RefSkip)
            || first >> 4 != self.core.l_seq
        {
            return None;
        }
        match self.tag(*b"CG") {
            Ok(Some(TagValue::ArrayU32(bytes, count))) => Some(Cigar::new(bytes, count)),
            _ => None,
        }
    }

    /// The packed 4-bit-per-base sequence.
    #[must_use]
    pub fn seq_packed(&self) -> &'a [u8] {
        let len = (self.core.l_seq as usize + 1) / 2;
        &self.data[self.seq_offset()..self.seq_offset() + len]
    }

    /// Decode the sequence into ASCII bases, appending to `dst`.
    pub fn decode_seq(&self, dst: &mut Vec<u8>) {
        const BASES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";
        let packed = self.seq_packed();
        dst.reserve(self.seq_len());
        for i in 0..self.seq_len() {
            let byte = packed[i / 2];
            let code = if i % 2 == 0 { byte >> 4 } else { byte & 0xf };
            dst.push(BASES[code as usize]);
        }
    }

    /// The per-base quality scores.
    #[must_use]
    pub fn qual(&self) -> &'a [u8] {
        &self.data[self.qual_offset()..self.qual_offset() + self.core.l_seq as usize]
    }

    /// Whether quality scores are present; a leading `0xFF` marks the
    /// sentinel "absent" run.
    #[must_use]
    pub fn has_qual(&self) -> bool {
        self.qual().first() != Some(&0xff)
    }

    // ==================== Tag getters ====================

    fn tag_index(&self) -> Result<&TagIndex> {
        if let Some(index) = self.tag_index.get() {
            return Ok(index);
        }
        let index = TagIndex::build(self.data, self.tag_offset())?;
        Ok(self.tag_index.get_or_init(|| index))
    }

    /// Whether the lazy tag index has been built; test instrumentation for
    /// the build-once contract.
    #[cfg(test)]
    pub(crate) fn tag_index_built(&self) -> bool {
        self.tag_index.get().is_some()
    }

    /// Names of all auxiliary tags on this record.
    pub fn tag_names(&self) -> Result<Vec<[u8; 2]>> {
        Ok(self.tag_index()?.names())
    }

    /// Look up a tag by its 2-byte name, decoding to its stored type.
    ///
    /// The tag index is built on first access and reused afterwards, so
    /// repeated lookups are O(1).
    pub fn tag(&self, name: [u8; 2]) -> Result<Option<TagValue<'a>>> {
        let Some(entry) = self.tag_index()?.get(name) else {
            return Ok(None);
        };
        entry.decode(self.data).map(Some)
    }

    pub fn tag_char(&self, name: [u8; 2]) -> Result<Option<u8>> {
        match self.tag(name)? {
            None => Ok(None),
            Some(TagValue::Char(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(name, &other, 'A')),
        }
    }

    pub fn tag_i32(&self, name: [u8; 2]) -> Result<Option<i32>> {
        match self.tag(name)? {
            None => Ok(None),
            Some(TagValue::I32(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(name, &other, 'i')),
        }
    }

    pub fn tag_u32(&self, name: [u8; 2]) -> Result<Option<u32>> {
        match self.tag(name)? {
            None => Ok(None),
            Some(TagValue::U32(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(name, &other, 'I')),
        }
    }

    pub fn tag_f32(&self, name: [u8; 2]) -> Result<Option<f32>> {
        match self.tag(name)? {
            None => Ok(None),
            Some(TagValue::Float(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(name, &other, 'f')),
        }
    }

    pub fn tag_str(&self, name: [u8; 2]) -> Result<Option<&'a str>> {
        match self.tag(name)? {
            None => Ok(None),
            Some(TagValue::String(bytes)) => Ok(Some(std::str::from_utf8(bytes)?)),
            Some(other) => Err(type_mismatch(name, &other, 'Z')),
        }
    }

    // ==================== Realization ====================

    /// Copy the record bytes into an independent, refill-surviving
    /// allocation.
    #[must_use]
    pub fn to_owned(&self) -> OwnedRecord {
        OwnedRecord {
            data: self.data.to_vec(),
            core: self.core,
        }
    }
}

fn type_mismatch(name: [u8; 2], found: &TagValue<'_>, requested: char) -> crate::Error {
    TagError::TypeMismatch {
        tag: String::from_utf8_lossy(&name).into_owned(),
        found: found.type_char(),
        requested,
    }
    .into()
}

/// A record holding its own copy of the underlying bytes.
///
/// Produced by [`Record::to_owned`]; validity was established when the
/// source view was constructed and is assumed stable thereafter.
#[derive(Clone)]
pub struct OwnedRecord {
    data: Vec<u8>,
    core: RecordCore,
}

impl OwnedRecord {
    /// Borrow the owned bytes as a regular [`Record`] view.
    #[must_use]
    pub fn as_record(&self) -> Record<'_> {
        Record {
            data: &self.data,
            core: self.core,
            tag_index: OnceCell::new(),
        }
    }
}
