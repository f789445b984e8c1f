//! Packfile reading and writing.
//!
//! A pack stores objects zlib-compressed, optionally as deltas against
//! other objects; its `.idx` sidecar maps sorted object ids to pack
//! offsets. This crate reads both formats (memory-mapped), applies deltas,
//! and can write small packs with their indexes.

pub mod delta;
pub mod entry;
pub mod index;
pub mod pack;
pub mod write;

use grit_hash::ObjectId;

/// Errors produced by pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack file: {0}")]
    InvalidPack(String),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("unsupported pack version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("delta base {0} not present in pack")]
    MissingDeltaBase(ObjectId),

    #[error("delta chain deeper than {max} entries at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max: usize },

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

/// Pack file constants.
pub const PACK_MAGIC: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_LEN: usize = 12;

/// Pack index (v2) constants.
pub const IDX_MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
pub const IDX_VERSION: u32 = 2;

/// Bail-out depth for delta chains.
pub const MAX_DELTA_DEPTH: usize = 512;
