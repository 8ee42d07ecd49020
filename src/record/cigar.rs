//! Packed CIGAR operations.
//!
//! Each operation is one little-endian `u32`: length in the high 28 bits,
//! operation code in the low 4. The view borrows the packed bytes straight
//! from the record and decodes on iteration.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

/// A single CIGAR operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CigarOp {
    Match,
    Ins,
    Del,
    RefSkip,
    SoftClip,
    HardClip,
    Pad,
    Equal,
    Diff,
}

impl CigarOp {
    /// Decode the low-4-bit operation code, `None` for codes above 8.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Match,
            1 => Self::Ins,
            2 => Self::Del,
            3 => Self::RefSkip,
            4 => Self::SoftClip,
            5 => Self::HardClip,
            6 => Self::Pad,
            7 => Self::Equal,
            8 => Self::Diff,
            _ => return None,
        })
    }

    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Match => 0,
            Self::Ins => 1,
            Self::Del => 2,
            Self::RefSkip => 3,
            Self::SoftClip => 4,
            Self::HardClip => 5,
            Self::Pad => 6,
            Self::Equal => 7,
            Self::Diff => 8,
        }
    }

    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            Self::Match => 'M',
            Self::Ins => 'I',
            Self::Del => 'D',
            Self::RefSkip => 'N',
            Self::SoftClip => 'S',
            Self::HardClip => 'H',
            Self::Pad => 'P',
            Self::Equal => '=',
            Self::Diff => 'X',
        }
    }

    /// Whether the operation consumes reference positions.
    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Del | Self::RefSkip | Self::Equal | Self::Diff
        )
    }

    /// Whether the operation consumes query (read) positions.
    #[must_use]
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Ins | Self::SoftClip | Self::Equal | Self::Diff
        )
    }
}

/// A borrowed view of a record's CIGAR operations.
#[derive(Clone, Copy)]
pub struct Cigar<'a> {
    packed: &'a [u8],
    n_ops: usize,
}

impl<'a> Cigar<'a> {
    pub(crate) fn new(packed: &'a [u8], n_ops: usize) -> Self {
        debug_assert!(packed.len() >= 4 * n_ops);
        Self { packed, n_ops }
    }

    #[must_use]
    pub fn n_ops(&self) -> usize {
        self.n_ops
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n_ops == 0
    }

    /// The operation at `index`, or `None` past the end or on an
    /// unrecognized code.
    #[must_use]
    pub fn op(&self, index: usize) -> Option<(u32, CigarOp)> {
        if index >= self.n_ops {
            return None;
        }
        let raw = LittleEndian::read_u32(&self.packed[4 * index..]);
        CigarOp::from_code(raw & 0xf).map(|op| (raw >> 4, op))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, CigarOp)> + 'a {
        let packed = self.packed;
        (0..self.n_ops).filter_map(move |i| {
            let raw = LittleEndian::read_u32(&packed[4 * i..]);
            CigarOp::from_code(raw & 0xf).map(|op| (raw >> 4, op))
        })
    }

    /// Total reference span covered by the operations.
    #[must_use]
    pub fn reference_len(&self) -> u64 {
        self.iter()
            .filter(|(_, op)| op.consumes_reference())
            .map(|(len, _)| u64::from(len))
            .sum()
    }

    /// Total query bases covered by the operations.
    #[must_use]
    pub fn query_len(&self) -> u64 {
        self.iter()
            .filter(|(_, op)| op.consumes_query())
            .map(|(len, _)| u64::from(len))
            .sum()
    }
}

impl fmt::Display for Cigar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "*");
        }
        for (len, op) in self.iter() {
            write!(f, "{len}{}", op.to_char())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    fn pack(ops: &[(u32, CigarOp)]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 * ops.len());
        for &(len, op) in ops {
            out.extend_from_slice(&((len << 4) | op.code()).to_le_bytes());
        }
        out
    }

    #[test]
    fn test_decode_and_display() {
        let ops = [
            (5, CigarOp::SoftClip),
            (90, CigarOp::Match),
            (2, CigarOp::Del),
            (5, CigarOp::HardClip),
        ];
        let packed = pack(&ops);
        let cigar = Cigar::new(&packed, ops.len());

        assert_eq!(cigar.n_ops(), 4);
        assert_eq!(cigar.op(1), Some((90, CigarOp::Match)));
        assert_eq!(cigar.op(4), None);
        let decoded: Vec<_> = cigar.iter().collect();
        assert_eq!(decoded, ops);
        assert_eq!(cigar.to_string(), "5S90M2D5H");
    }

    #[test]
    fn test_reference_and_query_spans() {
        let ops = [
            (5, CigarOp::SoftClip),
            (90, CigarOp::Match),
            (10, CigarOp::RefSkip),
            (3, CigarOp::Ins),
        ];
        let packed = pack(&ops);
        let cigar = Cigar::new(&packed, ops.len());
        assert_eq!(cigar.reference_len(), 100);
        assert_eq!(cigar.query_len(), 98);
    }

    #[test]
    fn test_empty_displays_star() {
        let cigar = Cigar::new(&[], 0);
        assert!(cigar.is_empty());
        assert_eq!(cigar.to_string(), "*");
    }

    #[test]
    fn test_round_trip_codes() {
        for code in 0..9 {
            let op = CigarOp::from_code(code).unwrap();
            assert_eq!(op.code(), code);
        }
        assert_eq!(CigarOp::from_code(9), None);
    }
}
