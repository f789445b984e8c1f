//! Object identity and hash streaming for the grit object store.
//!
//! Provides the 20-byte [`ObjectId`], hex encoding/decoding, the streaming
//! [`Hasher`], the checksummed [`HashFile`] writer used by file emitters,
//! and the [`FanoutTable`] shared by the pack index and graph formats.

mod error;
mod fanout;
mod hasher;
mod hashfile;
pub mod hex;
mod oid;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use hasher::Hasher;
pub use hashfile::HashFile;
pub use oid::ObjectId;
