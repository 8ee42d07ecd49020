//! One-time parse of the BAM preamble.
//!
//! The decompressed stream opens with the `BAM\x01` magic, a free-text
//! header (the SAM-format `@` lines), and the reference dictionary:
//! a name and length for each reference sequence the records may map to.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{FormatError, Result};
use crate::BAM_MAGIC;

/// One reference sequence from the BAM header dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub length: u32,
}

/// The parsed BAM preamble. Immutable once read; the reader parses it
/// exactly once per opened stream.
#[derive(Clone, Debug, Default)]
pub struct BamHeader {
    /// The free-text SAM header block.
    pub text: String,
    /// Reference sequences, in file order; record reference ids index
    /// into this table.
    pub references: Vec<Reference>,
}

impl BamHeader {
    #[must_use]
    pub fn n_references(&self) -> usize {
        self.references.len()
    }

    /// Reference names and lengths as parallel vectors.
    #[must_use]
    pub fn reference_table(&self) -> (Vec<String>, Vec<u32>) {
        let names = self.references.iter().map(|r| r.name.clone()).collect();
        let lens = self.references.iter().map(|r| r.length).collect();
        (names, lens)
    }

    /// Parse the preamble from a decoded-byte reader.
    pub(crate) fn read_from<R: DecodedRead>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        read_all(reader, &mut magic)?;
        if magic[..4] != BAM_MAGIC[..] {
            let mut found = [0u8; 4];
            found.copy_from_slice(&magic[..4]);
            return Err(FormatError::InvalidMagic(found).into());
        }

        let l_text = LittleEndian::read_u32(&magic[4..]) as usize;
        let mut text = vec![0u8; l_text];
        read_all(reader, &mut text)?;
        // tolerate an embedded NUL terminator in the text blob
        if text.last() == Some(&0) {
            text.pop();
        }
        let text = String::from_utf8_lossy(&text).into_owned();

        let mut u32_buf = [0u8; 4];
        read_all(reader, &mut u32_buf)?;
        let n_ref = LittleEndian::read_u32(&u32_buf) as usize;

        let mut references = Vec::with_capacity(n_ref);
        let mut name_buf = Vec::new();
        for _ in 0..n_ref {
            read_all(reader, &mut u32_buf)?;
            let l_name = LittleEndian::read_u32(&u32_buf) as usize;

            name_buf.resize(l_name, 0);
            read_all(reader, &mut name_buf)?;
            // l_name includes the trailing NUL
            let name_end = l_name.saturating_sub(1);
            let name = std::str::from_utf8(&name_buf[..name_end])?.to_string();

            read_all(reader, &mut u32_buf)?;
            references.push(Reference {
                name,
                length: LittleEndian::read_u32(&u32_buf),
            });
        }

        Ok(Self { text, references })
    }
}

/// A source of decompressed header bytes; implemented by the reader, which
/// decompresses more blocks on demand when the request outruns the buffer.
pub(crate) trait DecodedRead {
    fn read_decoded(&mut self, dst: &mut [u8]) -> Result<usize>;
}

fn read_all<R: DecodedRead>(reader: &mut R, dst: &mut [u8]) -> Result<()> {
    let n = reader.read_decoded(dst)?;
    if n < dst.len() {
        return Err(FormatError::TruncatedHeader(dst.len(), n).into());
    }
    Ok(())
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::testutil::bam_header_bytes;
    use crate::Error;

    struct SliceReader<'a>(&'a [u8]);
    impl DecodedRead for SliceReader<'_> {
        fn read_decoded(&mut self, dst: &mut [u8]) -> Result<usize> {
            let n = dst.len().min(self.0.len());
            dst[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_parse_header_round_trip() {
        let refs = [("chr1", 248_956_422u32), ("chr2", 242_193_529), ("chrM", 16_569)];
        let bytes = bam_header_bytes("@HD\tVN:1.6\n", &refs);
        let header = BamHeader::read_from(&mut SliceReader(&bytes)).unwrap();

        assert_eq!(header.text, "@HD\tVN:1.6\n");
        assert_eq!(header.n_references(), 3);
        for (reference, (name, len)) in header.references.iter().zip(refs) {
            assert_eq!(reference.name, name);
            assert_eq!(reference.length, len);
        }

        let (names, lens) = header.reference_table();
        assert_eq!(names[2], "chrM");
        assert_eq!(lens[0], 248_956_422);
    }

    #[test]
    fn test_parse_header_no_references() {
        let bytes = bam_header_bytes("", &[]);
        let header = BamHeader::read_from(&mut SliceReader(&bytes)).unwrap();
        assert!(header.text.is_empty());
        assert_eq!(header.n_references(), 0);
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let mut bytes = bam_header_bytes("@HD\n", &[("chr1", 1000)]);
        bytes[0] = b'X';
        let err = BamHeader::read_from(&mut SliceReader(&bytes)).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::InvalidMagic(_))));
    }

    #[test]
    fn test_truncated_header_is_format_error() {
        let bytes = bam_header_bytes("@HD\tVN:1.6\n", &[("chr1", 1000)]);
        let err = BamHeader::read_from(&mut SliceReader(&bytes[..bytes.len() - 6])).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::TruncatedHeader(_, _))
        ));
    }
}
