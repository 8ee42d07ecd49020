//! Builders for synthetic BGZF/BAM bytes used across the test suite.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::record::CigarOp;
use crate::{BAM_MAGIC, BGZF_BLOCK_PREFIX, BGZF_DATA_OFFSET, BGZF_EOF_MARKER, BGZF_TRAILER_LEN};

/// Wrap `payload` in a single well-formed BGZF block.
pub fn bgzf_block(payload: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    let deflated = encoder.finish().unwrap();

    let total = BGZF_DATA_OFFSET + deflated.len() + BGZF_TRAILER_LEN;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(BGZF_BLOCK_PREFIX);
    out.extend_from_slice(&u16::try_from(total - 1).unwrap().to_le_bytes());
    out.extend_from_slice(&deflated);
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(&u32::try_from(payload.len()).unwrap().to_le_bytes());
    out
}

/// Encode a decompressed BAM preamble: magic, header text, reference
/// dictionary.
pub fn bam_header_bytes(text: &str, refs: &[(&str, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(BAM_MAGIC);
    out.extend_from_slice(&u32::try_from(text.len()).unwrap().to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(&u32::try_from(refs.len()).unwrap().to_le_bytes());
    for (name, length) in refs {
        out.extend_from_slice(&u32::try_from(name.len() + 1).unwrap().to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&length.to_le_bytes());
    }
    out
}

/// Declarative description of one alignment record.
#[derive(Clone)]
pub struct RecordSpec {
    pub name: String,
    pub ref_id: i32,
    pub pos: i32,
    pub mapq: u8,
    pub flag: u16,
    seq: Vec<u8>,
    qual: Vec<u8>,
    cigar: Vec<(u32, CigarOp)>,
    long_cigar: Option<Vec<(u32, CigarOp)>>,
    tags: Vec<u8>,
}

impl RecordSpec {
    pub fn new(name: &str, ref_id: i32, pos: i32) -> Self {
        Self {
            name: name.to_string(),
            ref_id,
            pos,
            mapq: 60,
            flag: 0,
            seq: Vec::new(),
            qual: Vec::new(),
            cigar: Vec::new(),
            long_cigar: None,
            tags: Vec::new(),
        }
    }

    pub fn seq(mut self, seq: &str) -> Self {
        self.seq = seq.as_bytes().to_vec();
        self
    }

    pub fn qual(mut self, qual: &[u8]) -> Self {
        self.qual = qual.to_vec();
        self
    }

    pub fn flag(mut self, flag: u16) -> Self {
        self.flag = flag;
        self
    }

    pub fn cigar(mut self, ops: &[(u32, CigarOp)]) -> Self {
        self.cigar = ops.to_vec();
        self
    }

    /// Store `ops` behind the long-read indirection: the inline CIGAR
    /// becomes the two-op sentinel and the real list lands in a `CG:B,I`
    /// tag.
    pub fn long_cigar(mut self, ops: &[(u32, CigarOp)]) -> Self {
        self.long_cigar = Some(ops.to_vec());
        self
    }

    pub fn tag_i32(mut self, name: [u8; 2], value: i32) -> Self {
        self.tags.extend_from_slice(&name);
        self.tags.push(b'i');
        self.tags.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn tag_str(mut self, name: [u8; 2], value: &str) -> Self {
        self.tags.extend_from_slice(&name);
        self.tags.push(b'Z');
        self.tags.extend_from_slice(value.as_bytes());
        self.tags.push(0);
        self
    }
}

fn base_code(base: u8) -> u8 {
    let table = b"=ACMGRSVTWYHKDBN";
    table
        .iter()
        .position(|&b| b == base)
        .map_or(15, |p| p as u8)
}

fn pack_op(len: u32, op: CigarOp) -> [u8; 4] {
    ((len << 4) | op.code()).to_le_bytes()
}

/// Encode one record, including its 4-byte length prefix.
pub fn bam_record_bytes(spec: &RecordSpec) -> Vec<u8> {
    assert_eq!(
        spec.seq.len(),
        spec.qual.len(),
        "record spec needs matching seq and qual lengths"
    );
    let l_seq = u32::try_from(spec.seq.len()).unwrap();

    let (inline_ops, cg_tag) = match &spec.long_cigar {
        Some(real) => {
            let ref_span: u32 = real
                .iter()
                .filter(|(_, op)| op.consumes_reference())
                .map(|(len, _)| *len)
                .sum();
            let mut tag = Vec::new();
            tag.extend_from_slice(b"CGBI");
            tag.extend_from_slice(&u32::try_from(real.len()).unwrap().to_le_bytes());
            for &(len, op) in real {
                tag.extend_from_slice(&pack_op(len, op));
            }
            (
                vec![(l_seq, CigarOp::SoftClip), (ref_span, CigarOp::RefSkip)],
                tag,
            )
        }
        None => (spec.cigar.clone(), Vec::new()),
    };

    let mut body = Vec::new();
    body.extend_from_slice(&spec.ref_id.to_le_bytes());
    body.extend_from_slice(&spec.pos.to_le_bytes());
    body.push(u8::try_from(spec.name.len() + 1).unwrap());
    body.push(spec.mapq);
    body.extend_from_slice(&0u16.to_le_bytes()); // bin
    body.extend_from_slice(&u16::try_from(inline_ops.len()).unwrap().to_le_bytes());
    body.extend_from_slice(&spec.flag.to_le_bytes());
    body.extend_from_slice(&l_seq.to_le_bytes());
    body.extend_from_slice(&(-1i32).to_le_bytes()); // next_ref_id
    body.extend_from_slice(&(-1i32).to_le_bytes()); // next_pos
    body.extend_from_slice(&0i32.to_le_bytes()); // tlen

    body.extend_from_slice(spec.name.as_bytes());
    body.push(0);
    for &(len, op) in &inline_ops {
        body.extend_from_slice(&pack_op(len, op));
    }
    for pair in spec.seq.chunks(2) {
        let hi = base_code(pair[0]) << 4;
        let lo = pair.get(1).map_or(0, |&b| base_code(b));
        body.push(hi | lo);
    }
    body.extend_from_slice(&spec.qual);
    body.extend_from_slice(&spec.tags);
    body.extend_from_slice(&cg_tag);

    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&u32::try_from(body.len()).unwrap().to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Assemble a complete BGZF-compressed BAM file, splitting the
/// decompressed stream into blocks of at most `block_payload` bytes.
pub fn bam_file(
    text: &str,
    refs: &[(&str, u32)],
    records: &[RecordSpec],
    block_payload: usize,
) -> Vec<u8> {
    let mut decoded = bam_header_bytes(text, refs);
    for record in records {
        decoded.extend_from_slice(&bam_record_bytes(record));
    }

    let mut out = Vec::new();
    for chunk in decoded.chunks(block_payload.max(1)) {
        out.extend_from_slice(&bgzf_block(chunk));
    }
    out.extend_from_slice(BGZF_EOF_MARKER);
    out
}

#[cfg(test)]
mod testing {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    #[test]
    fn test_bgzf_block_shape() {
        let block = bgzf_block(b"hello bam");
        assert_eq!(&block[..BGZF_BLOCK_PREFIX.len()], BGZF_BLOCK_PREFIX);
        let declared = LittleEndian::read_u16(&block[16..]) as usize + 1;
        assert_eq!(declared, block.len());
        let isize_field = LittleEndian::read_u32(&block[block.len() - 4..]);
        assert_eq!(isize_field, 9);
    }

    #[test]
    fn test_record_bytes_length_prefix() {
        let spec = RecordSpec::new("abc", 0, 7).seq("ACGT").qual(&[1, 2, 3, 4]);
        let bytes = bam_record_bytes(&spec);
        let declared = LittleEndian::read_u32(&bytes) as usize;
        assert_eq!(declared + 4, bytes.len());
    }
}
