/// Custom Result type for pbam operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the pbam library, encompassing all possible error
/// cases that can occur while opening and reading a BAM file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The file is not a structurally valid BAM file; fatal at open time
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Compressed or decoded data failed an integrity check mid-stream
    #[error("Corruption error: {0}")]
    Corruption(#[from] CorruptionError),

    /// The caller violated an API sequencing contract
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// An auxiliary tag was accessed with the wrong type
    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    /// Invalid reader configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Conversion errors from anyhow errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Errors detected while validating the structure of a BAM file at open
/// time. All of these are fatal: the reader refuses to open the file.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// The decompressed stream does not begin with the `BAM\x01` magic
    #[error("Invalid BAM magic bytes: {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// The file does not end with the 28-byte BGZF EOF marker
    #[error("Missing BGZF EOF marker - file may be truncated")]
    MissingEofMarker,

    /// The file is shorter than the smallest valid BAM file
    ///
    /// # Arguments
    /// * `u64` - The actual file size in bytes
    #[error("File too short to be a BAM file ({0} bytes)")]
    FileTooShort(u64),

    /// The header declared more bytes than the stream could supply
    ///
    /// # Arguments
    /// * First `usize` - The number of bytes requested
    /// * Second `usize` - The number of bytes available
    #[error("Truncated BAM header: needed {0} bytes, stream supplied {1}")]
    TruncatedHeader(usize, usize),
}

/// Errors detected mid-stream while decompressing blocks or walking
/// decoded records. Fatal for the decompress/read cycle that found them;
/// the cycle reports zero progress and buffers are left at their last
/// committed state.
#[derive(thiserror::Error, Debug)]
pub enum CorruptionError {
    /// A BGZF block header failed its signature check
    ///
    /// # Arguments
    /// * `usize` - The block's offset within the primary file buffer
    #[error("BGZF block signature mismatch at buffer offset {0}")]
    BlockSignature(usize),

    /// The CRC-32 stored in a block trailer does not match the
    /// decompressed payload
    #[error("CRC mismatch in BGZF block: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    /// The deflate library rejected a block payload
    #[error("Inflate failure in BGZF block: {0}")]
    Inflate(String),

    /// A block inflated to a different size than its trailer declared
    #[error("BGZF block inflated to {got} bytes, trailer declared {declared}")]
    LengthMismatch { declared: usize, got: usize },

    /// A record failed validation before its lane's span was exhausted,
    /// meaning the length-prefix walk and the actual data disagree
    #[error(
        "Invalid record before end of lane {lane} (cursor {cursor}, lane end {end})"
    )]
    RecordOverrun { lane: usize, cursor: usize, end: usize },
}

/// Caller contract violations. These are programmer errors: they are
/// reported immediately and never corrupt reader state.
#[derive(thiserror::Error, Debug)]
pub enum SequenceError {
    /// `fill_reads` was called while a lane still held unconsumed records
    ///
    /// # Arguments
    /// * `usize` - The first lane found with records remaining
    #[error(
        "Lane {0} has records remaining - drain all lanes before filling more reads"
    )]
    LanesNotDrained(usize),

    /// A lane id outside `0..n_threads` was supplied
    #[error("Invalid lane id {lane} (reader has {lanes} lanes)")]
    InvalidLane { lane: usize, lanes: usize },

    /// The BAM header was requested a second time
    #[error("Header is already read")]
    HeaderAlreadyRead,

    /// An operation requiring the header ran before the header was read
    #[error("Header is not yet read")]
    HeaderNotRead,
}

/// Errors from typed auxiliary-tag accessors
#[derive(thiserror::Error, Debug)]
pub enum TagError {
    /// The stored tag type does not match the requested accessor
    #[error("Tag {tag} holds type '{found}', requested '{requested}'")]
    TypeMismatch {
        tag: String,
        found: char,
        requested: char,
    },

    /// A tag region byte did not decode to a known tag type
    #[error("Unknown tag type byte {0:#04x} in tag region")]
    UnknownType(u8),

    /// The tag region ended in the middle of an entry
    #[error("Tag region truncated inside tag {0}")]
    Truncated(String),
}

/// Errors from [`ReaderOptions`](crate::ReaderOptions) validation
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The per-chunk size must stay above 1 MiB so that block scanning has
    /// room to make progress
    #[error("File buffer chunk size must be at least 1 MiB (got {0} bytes)")]
    ChunkTooSmall(usize),

    /// The decompressed buffer must be able to hold a full file buffer
    #[error(
        "Data buffer capacity ({data}) must not be smaller than file buffer capacity ({file})"
    )]
    DataCapBelowFileCap { data: usize, file: usize },
}

impl Error {
    /// Whether this error reflects stream corruption (rather than a caller
    /// bug or an unreadable file), which a host program may choose to retry.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}
