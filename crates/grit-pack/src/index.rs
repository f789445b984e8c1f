//! Pack index (v2) reading.
//!
//! ```text
//! magic    4 B   \xff t O c
//! version  4 B   = 2
//! fanout   1024 B  256 cumulative big-endian counts
//! oids     N × 20 B  sorted ascending
//! crc32    N × 4 B
//! offsets  N × 4 B   high bit set → index into 64-bit table
//! large    M × 8 B
//! trailer  20 B pack checksum, 20 B index checksum
//! ```

use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use memmap2::Mmap;

use crate::{PackError, IDX_MAGIC, IDX_VERSION};

const FANOUT_LEN: usize = 256 * 4;
const HEADER_LEN: usize = 8;

/// A memory-mapped pack index.
#[derive(Debug)]
pub struct PackIndex {
    data: Mmap,
    num_objects: u32,
    oids_start: usize,
    offsets_start: usize,
    large_offsets_start: usize,
    path: PathBuf,
}

impl PackIndex {
    /// Open and validate an index file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < HEADER_LEN + FANOUT_LEN + 2 * ObjectId::RAW_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[..4] != IDX_MAGIC {
            return Err(PackError::InvalidIndex("bad magic".into()));
        }
        let version = be32(&data, 4);
        if version != IDX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let num_objects = be32(&data, HEADER_LEN + 255 * 4);
        let n = num_objects as usize;
        let oids_start = HEADER_LEN + FANOUT_LEN;
        let crcs_start = oids_start + n * ObjectId::RAW_LEN;
        let offsets_start = crcs_start + n * 4;
        let large_offsets_start = offsets_start + n * 4;

        if data.len() < large_offsets_start + 2 * ObjectId::RAW_LEN {
            return Err(PackError::InvalidIndex(format!(
                "truncated: {} bytes for {} objects",
                data.len(),
                num_objects
            )));
        }

        Ok(Self {
            data,
            num_objects,
            oids_start,
            offsets_start,
            large_offsets_start,
            path,
        })
    }

    /// Number of objects in the index.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Path to the `.idx` file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find the pack offset of an id, narrowing by fan-out then binary
    /// searching within the bucket.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let mut lo = match oid.first_byte().checked_sub(1) {
            Some(prev) => self.fanout(prev) as usize,
            None => 0,
        };
        let mut hi = self.fanout(oid.first_byte()) as usize;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.oid_bytes(mid).cmp(oid.as_bytes().as_slice()) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid as u32)),
            }
        }
        None
    }

    /// The id at a sorted position.
    pub fn oid_at(&self, index: u32) -> ObjectId {
        ObjectId::from_bytes(self.oid_bytes(index as usize))
            .expect("index validated on open")
    }

    /// The pack offset at a sorted position.
    pub fn offset_at(&self, index: u32) -> u64 {
        let raw = be32(&self.data, self.offsets_start + index as usize * 4);
        if raw & 0x8000_0000 == 0 {
            return raw as u64;
        }
        let large_index = (raw & 0x7fff_ffff) as usize;
        let pos = self.large_offsets_start + large_index * 8;
        u64::from_be_bytes(self.data[pos..pos + 8].try_into().expect("8-byte slice"))
    }

    /// Iterate `(oid, offset)` in sorted id order.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = (ObjectId, u64)> + '_ {
        (0..self.num_objects).map(|i| (self.oid_at(i), self.offset_at(i)))
    }

    fn fanout(&self, first_byte: u8) -> u32 {
        be32(&self.data, HEADER_LEN + first_byte as usize * 4)
    }

    fn oid_bytes(&self, index: usize) -> &[u8] {
        let start = self.oids_start + index * ObjectId::RAW_LEN;
        &self.data[start..start + ObjectId::RAW_LEN]
    }
}

fn be32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes(data[pos..pos + 4].try_into().expect("4-byte slice"))
}
