//! The packed object store.
//!
//! An [`ObjectStore`] spans every `pack/*.pack` under an objects directory
//! and offers the read surface the commit graph writer needs: a pull-based
//! walk of every packed object, a cheap type probe, and full reads that
//! resolve delta chains.

use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_object::{Commit, ObjectType};
use grit_pack::entry::EntryKind;
use grit_pack::pack::{PackFile, PackedObject};
use grit_pack::{PackError, MAX_DELTA_DEPTH};

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("object {oid} is a {actual}, expected a commit")]
    NotACommit { oid: ObjectId, actual: ObjectType },

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where a packed object lives: which pack, and at what offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedLocation {
    pub oid: ObjectId,
    /// Index into the store's pack list.
    pub pack: usize,
    /// Entry offset within that pack.
    pub offset: u64,
}

/// Read-only handle over the packs of one objects directory.
pub struct ObjectStore {
    packs: Vec<PackFile>,
    objects_dir: PathBuf,
}

impl ObjectStore {
    /// Open the store rooted at `objects_dir`, discovering every pack
    /// under `pack/` (newest first, matching the usual read preference).
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let packs = Self::discover_packs(&objects_dir)?;
        Ok(Self { packs, objects_dir })
    }

    /// The objects directory this store was opened on.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Number of packs discovered.
    pub fn num_packs(&self) -> usize {
        self.packs.len()
    }

    /// Total object count across all packs. Duplicates between packs are
    /// counted once per pack, which is exactly what a preallocation
    /// heuristic wants.
    pub fn approximate_object_count(&self) -> u64 {
        self.packs.iter().map(|p| p.num_objects() as u64).sum()
    }

    /// Walk every packed object in every pack.
    pub fn packed_objects(&self) -> impl Iterator<Item = PackedLocation> + '_ {
        self.packs.iter().enumerate().flat_map(|(pack, p)| {
            p.index()
                .entries()
                .map(move |(oid, offset)| PackedLocation { oid, pack, offset })
        })
    }

    /// Determine the type of the entry at a location by walking entry
    /// headers only — delta bodies are never inflated. REF_DELTA bases are
    /// resolved through the whole store.
    pub fn object_kind_at(&self, pack: usize, offset: u64) -> Result<ObjectType, OdbError> {
        let mut pack_index = pack;
        let mut offset = offset;

        for _ in 0..MAX_DELTA_DEPTH {
            let pack = self.packs.get(pack_index).ok_or_else(|| {
                OdbError::Pack(PackError::InvalidPack(format!(
                    "pack {pack_index} out of range"
                )))
            })?;
            match pack.entry_at(offset)?.kind {
                EntryKind::Base(kind) => return Ok(kind),
                EntryKind::OfsDelta { base_offset } => offset = base_offset,
                EntryKind::RefDelta { base } => {
                    let loc = self.locate(&base).ok_or(OdbError::NotFound(base))?;
                    pack_index = loc.0;
                    offset = loc.1;
                }
            }
        }

        Err(OdbError::Pack(PackError::DeltaChainTooDeep {
            offset,
            max: MAX_DELTA_DEPTH,
        }))
    }

    /// Find which pack contains an id.
    pub fn locate(&self, oid: &ObjectId) -> Option<(usize, u64)> {
        self.packs
            .iter()
            .enumerate()
            .find_map(|(i, p)| p.index().lookup(oid).map(|offset| (i, offset)))
    }

    /// Whether any pack contains the id.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.locate(oid).is_some()
    }

    /// Read and fully resolve an object, searching packs newest-first.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<PackedObject>, OdbError> {
        match self.locate(oid) {
            Some((pack, offset)) => Ok(Some(self.packs[pack].read_at_offset(offset)?)),
            None => Ok(None),
        }
    }

    /// Read an object that must be a commit, and parse it.
    pub fn read_commit(&self, oid: &ObjectId) -> Result<Commit, OdbError> {
        let obj = self.read(oid)?.ok_or(OdbError::NotFound(*oid))?;
        if obj.kind != ObjectType::Commit {
            return Err(OdbError::NotACommit {
                oid: *oid,
                actual: obj.kind,
            });
        }
        Ok(Commit::parse(&obj.data)?)
    }

    fn discover_packs(objects_dir: &Path) -> Result<Vec<PackFile>, OdbError> {
        let pack_dir = objects_dir.join("pack");
        if !pack_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<(PathBuf, Option<std::time::SystemTime>)> = Vec::new();
        for entry in std::fs::read_dir(&pack_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                let mtime = entry.metadata().and_then(|m| m.modified()).ok();
                paths.push((path, mtime));
            }
        }
        // Newest first.
        paths.sort_by(|a, b| b.1.cmp(&a.1));

        paths
            .into_iter()
            .map(|(path, _)| PackFile::open(path).map_err(OdbError::from))
            .collect()
    }
}
