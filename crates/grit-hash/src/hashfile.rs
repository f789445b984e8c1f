use std::fs::File;
use std::io::Write;

use crate::{HashError, Hasher, ObjectId};

/// A write sink that mirrors every byte into a rolling SHA-1.
///
/// Chunked file formats (pack index, commit graph) end in a trailer hash
/// over everything written before it. `HashFile` keeps the writer and the
/// hasher in lock-step so the emitter never sees them separately, and
/// tracks the byte count so precomputed chunk offsets can be checked
/// against reality.
pub struct HashFile<W> {
    inner: W,
    hasher: Hasher,
    len: u64,
}

impl<W: Write> HashFile<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            len: 0,
        }
    }

    /// Append raw bytes.
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(data)?;
        self.hasher.update(data);
        self.len += data.len() as u64;
        Ok(())
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, v: u8) -> std::io::Result<()> {
        self.write(&[v])
    }

    /// Append a big-endian u32.
    pub fn write_be32(&mut self, v: u32) -> std::io::Result<()> {
        self.write(&v.to_be_bytes())
    }

    /// Append a big-endian u64.
    pub fn write_be64(&mut self, v: u64) -> std::io::Result<()> {
        self.write(&v.to_be_bytes())
    }

    /// Bytes appended so far (the trailer hash is not counted).
    pub fn bytes_written(&self) -> u64 {
        self.len
    }

    /// Finish hashing and hand back the sink together with the digest of
    /// everything written. The trailer is **not** appended; callers that
    /// want the on-disk trailer use [`HashFile::finalize_to_disk`].
    pub fn finalize(self) -> Result<(W, ObjectId), HashError> {
        let hash = self.hasher.finalize()?;
        Ok((self.inner, hash))
    }
}

impl HashFile<File> {
    /// Append the trailer hash to the file, flush, and optionally fsync.
    ///
    /// Returns the file handle (still open, cursor after the trailer) and
    /// the trailer digest.
    pub fn finalize_to_disk(self, fsync: bool) -> Result<(File, ObjectId), HashError> {
        let (mut file, hash) = self.finalize()?;
        file.write_all(hash.as_bytes())?;
        file.flush()?;
        if fsync {
            file.sync_all()?;
        }
        Ok((file, hash))
    }
}
