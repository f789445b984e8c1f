//! Reading objects out of a packfile.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use grit_hash::ObjectId;
use grit_object::ObjectType;
use memmap2::Mmap;

use crate::entry::{decode_entry, EntryInfo, EntryKind};
use crate::index::PackIndex;
use crate::{delta, PackError, MAX_DELTA_DEPTH, PACK_HEADER_LEN, PACK_MAGIC, PACK_VERSION};

/// A fully inflated, delta-resolved object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedObject {
    pub kind: ObjectType,
    pub data: Vec<u8>,
}

/// A memory-mapped packfile paired with its index.
#[derive(Debug)]
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    num_objects: u32,
    path: PathBuf,
}

impl PackFile {
    /// Open `<name>.pack` together with its `<name>.idx` sibling.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = pack_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_LEN + ObjectId::RAW_LEN {
            return Err(PackError::InvalidPack("file too small".into()));
        }
        if &data[..4] != PACK_MAGIC {
            return Err(PackError::InvalidPack("bad magic".into()));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().expect("4-byte slice"));
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes(data[8..12].try_into().expect("4-byte slice"));

        let index = PackIndex::open(path.with_extension("idx"))?;
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidPack(format!(
                "pack holds {} objects but index holds {}",
                num_objects,
                index.num_objects()
            )));
        }

        Ok(Self { data, index, num_objects, path })
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    /// Decode the entry header at `offset` without inflating anything.
    ///
    /// This is the cheap probe the commit collector uses to classify every
    /// packed object: delta entries report their base reference, base
    /// entries their type.
    pub fn entry_at(&self, offset: u64) -> Result<EntryInfo, PackError> {
        decode_entry(&self.data, offset)
    }

    /// Read and fully resolve the object at `offset`.
    ///
    /// Delta chains are walked iteratively; a REF_DELTA whose base is not
    /// in this pack surfaces as [`PackError::MissingDeltaBase`] for the
    /// caller to resolve at a higher level.
    pub fn read_at_offset(&self, offset: u64) -> Result<PackedObject, PackError> {
        let mut deltas: Vec<Vec<u8>> = Vec::new();
        let mut current = offset;

        for _ in 0..MAX_DELTA_DEPTH {
            let info = self.entry_at(current)?;
            let payload = self.inflate(&info, current)?;

            match info.kind {
                EntryKind::Base(kind) => {
                    let mut data = payload;
                    for d in deltas.iter().rev() {
                        data = delta::apply(&data, d)?;
                    }
                    return Ok(PackedObject { kind, data });
                }
                EntryKind::OfsDelta { base_offset } => {
                    deltas.push(payload);
                    current = base_offset;
                }
                EntryKind::RefDelta { base } => {
                    deltas.push(payload);
                    current = self
                        .index
                        .lookup(&base)
                        .ok_or(PackError::MissingDeltaBase(base))?;
                }
            }
        }

        Err(PackError::DeltaChainTooDeep { offset, max: MAX_DELTA_DEPTH })
    }

    /// Read an object by id; `None` if this pack does not contain it.
    pub fn read_object(&self, oid: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid) {
            Some(offset) => self.read_at_offset(offset).map(Some),
            None => Ok(None),
        }
    }

    fn inflate(&self, info: &EntryInfo, offset: u64) -> Result<Vec<u8>, PackError> {
        let compressed = &self.data[info.data_offset as usize..];
        let mut out = Vec::with_capacity(info.inflated_size as usize);
        ZlibDecoder::new(compressed)
            .read_to_end(&mut out)
            .map_err(|_| PackError::CorruptEntry(offset))?;
        if out.len() as u64 != info.inflated_size {
            return Err(PackError::CorruptEntry(offset));
        }
        Ok(out)
    }
}
