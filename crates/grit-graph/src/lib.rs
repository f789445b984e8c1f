//! Commit graph file writing.
//!
//! The graph file caches, for every commit reachable from the packs of an
//! objects directory, its tree id, its parents (as indices into the file's
//! own sorted commit table), and its commit date — so ancestry walks never
//! have to inflate the commit objects themselves. Format:
//!
//! ```text
//! header      8 B    "CGPH" | version 1 | oid version 1 | num_chunks | 0
//! lookup      (num_chunks + 1) × 12 B   be32 chunk id | be64 offset;
//!                                       terminated by id 0 at end-of-chunks
//! OIDF        1024 B   256 cumulative big-endian counts by first id byte
//! OIDL        N × 20 B sorted commit ids
//! CDAT        N × 36 B tree id | parent0 | parent1 | 2-bit epoch word | date
//! EDGE        4 B each parents 2.. of octopus merges, high bit ends a run
//! trailer     20 B     SHA-1 of everything above
//! ```
//!
//! The file is published atomically under `info/graph-<trailer-hex>.graph`;
//! the trailer hash doubles as the content-addressed name.

mod write;

pub use write::write_commit_graph;
pub use write::write_commit_graph_for_store;

use std::path::PathBuf;

use grit_hash::ObjectId;
use grit_odb::OdbError;

/// File magic: `"CGPH"`.
pub const GRAPH_MAGIC: u32 = 0x4347_5048;
/// Graph format version.
pub const GRAPH_VERSION: u8 = 1;
/// Id format version (20-byte SHA-1).
pub const GRAPH_OID_VERSION: u8 = 1;

/// Chunk id `"OIDF"`: the fan-out table.
pub const CHUNK_FANOUT: u32 = 0x4f49_4446;
/// Chunk id `"OIDL"`: the sorted id list.
pub const CHUNK_OID_LOOKUP: u32 = 0x4f49_444c;
/// Chunk id `"CDAT"`: per-commit data records.
pub const CHUNK_DATA: u32 = 0x4344_4154;
/// Chunk id `"EDGE"`: overflow parent indices for octopus merges.
pub const CHUNK_OVERFLOW_EDGES: u32 = 0x4544_4745;

/// Parent slot value for "no parent in this slot".
pub const PARENT_NONE: u32 = 0x7000_0000;
/// Parent slot value for "parent exists but is not in the table".
pub const PARENT_MISSING: u32 = 0x7fff_ffff;
/// High bit: parent-1 slot redirects into the EDGE chunk / EDGE entry ends
/// its commit's run.
pub const OVERFLOW_FLAG: u32 = 0x8000_0000;
/// Mask selecting the index half of an EDGE entry.
pub const EDGE_VALUE_MASK: u32 = 0x7fff_ffff;

/// Largest commit count the format can encode without a table index
/// colliding with [`PARENT_NONE`].
pub const MAX_COMMITS: u32 = PARENT_NONE - 1;

/// Fixed header size.
pub const HEADER_LEN: usize = 8;
/// One chunk lookup entry: be32 id + be64 offset.
pub const CHUNK_LOOKUP_ENTRY_LEN: usize = 12;
/// One CDAT record: tree id + two parent slots + packed date.
pub const DATA_RECORD_LEN: usize = ObjectId::RAW_LEN + 16;

/// Errors produced while writing a graph file. Everything here aborts the
/// write; the only tolerated irregularity — a parent id missing from the
/// table — is encoded into the file instead.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot create graph directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create temporary graph file in {dir}: {source}")]
    TempFile {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot publish graph file as {target}: {source}")]
    Persist {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{count} commits exceed the format limit of {max}", max = MAX_COMMITS)]
    TooManyCommits { count: usize },

    #[error(transparent)]
    Store(#[from] OdbError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
