/// Errors produced by hash and object-id operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex digit at position {position}: 0x{byte:02x}")]
    InvalidHexDigit { position: usize, byte: u8 },

    #[error("invalid hex length: expected {expected}, got {actual}")]
    HexLength { expected: usize, actual: usize },

    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    DigestLength { expected: usize, actual: usize },

    #[error("SHA-1 collision detected while hashing")]
    Collision,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
