use std::io;

#[derive(thiserror::Error, Debug)]
pub enum DisassemblerError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("CRC mismatch for chunk {chunk}: expected 0x{expected:08x}, calculated 0x{actual:08x}")]
    IntegrityCheckFailed { chunk: String, expected: u32, actual: u32 },

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Animation control present but no default image data found")]
    FirstFrameNotFound,

    #[error("Missing or misplaced fcTL chunk: {0}")]
    MissingFcTLChunk(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DisassemblerError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn decompression(msg: impl Into<String>) -> Self {
        Self::DecompressionFailed(msg.into())
    }

    pub fn missing_fctl(msg: impl Into<String>) -> Self {
        Self::MissingFcTLChunk(msg.into())
    }

    pub fn dimension(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }
}

// Result type alias for disassembler operations
pub type DisassemblerResult<T> = Result<T, DisassemblerError>;
