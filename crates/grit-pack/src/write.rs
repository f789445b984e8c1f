//! Writing packs and their indexes.
//!
//! This is the fixture/repack side of the crate: entries are queued in
//! memory and streamed out in one pass through a [`HashFile`], so the
//! object count is known before the header is written and the trailing
//! checksum falls out of the same stream.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use grit_hash::{FanoutTable, HashFile, Hasher, ObjectId};
use grit_object::ObjectType;

use crate::entry::{encode_entry_header, REF_DELTA};
use crate::{PackError, IDX_MAGIC, IDX_VERSION, PACK_MAGIC, PACK_VERSION};

/// `(oid, pack_offset, crc32)` for one written entry, as the index wants it.
pub type IndexEntry = (ObjectId, u64, u32);

enum Pending {
    Full { oid: ObjectId, kind: ObjectType, content: Vec<u8> },
    RefDelta { oid: ObjectId, base: ObjectId, delta: Vec<u8> },
}

/// Accumulates objects and writes them as a pack.
#[derive(Default)]
pub struct PackWriter {
    pending: Vec<Pending>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain object; returns its computed id.
    pub fn add_object(&mut self, kind: ObjectType, content: &[u8]) -> Result<ObjectId, PackError> {
        let oid = Hasher::hash_object(kind.name(), content)?;
        self.pending.push(Pending::Full {
            oid,
            kind,
            content: content.to_vec(),
        });
        Ok(oid)
    }

    /// Queue a REF_DELTA entry. The caller supplies the target's id (the
    /// pack stores only the delta, which does not determine it).
    pub fn add_ref_delta(&mut self, base: ObjectId, oid: ObjectId, delta: &[u8]) {
        self.pending.push(Pending::RefDelta {
            oid,
            base,
            delta: delta.to_vec(),
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Stream the pack to `pack_path`.
    ///
    /// Returns the per-entry index records and the pack checksum written
    /// as the trailer.
    pub fn write_to(&self, pack_path: &Path) -> Result<(Vec<IndexEntry>, ObjectId), PackError> {
        let mut f = HashFile::new(File::create(pack_path)?);
        f.write(PACK_MAGIC)?;
        f.write_be32(PACK_VERSION)?;
        f.write_be32(self.pending.len() as u32)?;

        let mut entries = Vec::with_capacity(self.pending.len());
        for pending in &self.pending {
            let offset = f.bytes_written();
            let mut crc = crc32fast::Hasher::new();
            let mut emit = |f: &mut HashFile<File>, bytes: &[u8]| -> std::io::Result<()> {
                crc.update(bytes);
                f.write(bytes)
            };

            let oid = match pending {
                Pending::Full { oid, kind, content } => {
                    emit(&mut f, &encode_entry_header(kind.pack_type_number(), content.len() as u64))?;
                    emit(&mut f, &compress(content)?)?;
                    *oid
                }
                Pending::RefDelta { oid, base, delta } => {
                    emit(&mut f, &encode_entry_header(REF_DELTA, delta.len() as u64))?;
                    emit(&mut f, base.as_bytes())?;
                    emit(&mut f, &compress(delta)?)?;
                    *oid
                }
            };

            entries.push((oid, offset, crc.finalize()));
        }

        let (_file, checksum) = f.finalize_to_disk(false)?;
        Ok((entries, checksum))
    }
}

/// Write a v2 pack index for `entries` (sorted in place by id).
pub fn build_pack_index(
    idx_path: &Path,
    entries: &mut [IndexEntry],
    pack_checksum: &ObjectId,
) -> Result<(), PackError> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut f = HashFile::new(File::create(idx_path)?);
    f.write(&IDX_MAGIC)?;
    f.write_be32(IDX_VERSION)?;

    let oids: Vec<ObjectId> = entries.iter().map(|(oid, _, _)| *oid).collect();
    f.write(&FanoutTable::build(&oids).to_bytes())?;
    for oid in &oids {
        f.write(oid.as_bytes())?;
    }
    for (_, _, crc) in entries.iter() {
        f.write_be32(*crc)?;
    }

    let mut large_offsets: Vec<u64> = Vec::new();
    for (_, offset, _) in entries.iter() {
        if *offset < 0x8000_0000 {
            f.write_be32(*offset as u32)?;
        } else {
            f.write_be32(0x8000_0000 | large_offsets.len() as u32)?;
            large_offsets.push(*offset);
        }
    }
    for offset in large_offsets {
        f.write_be64(offset)?;
    }

    f.write(pack_checksum.as_bytes())?;
    f.finalize_to_disk(false)?;
    Ok(())
}

/// Write a pack plus index under `dir` in one call.
///
/// Returns `(pack_path, idx_path, pack_checksum)`.
pub fn create_pack(
    dir: &Path,
    name: &str,
    objects: &[(ObjectType, Vec<u8>)],
) -> Result<(PathBuf, PathBuf, ObjectId), PackError> {
    let pack_path = dir.join(format!("{name}.pack"));
    let idx_path = dir.join(format!("{name}.idx"));

    let mut writer = PackWriter::new();
    for (kind, content) in objects {
        writer.add_object(*kind, content)?;
    }
    let (mut entries, checksum) = writer.write_to(&pack_path)?;
    build_pack_index(&idx_path, &mut entries, &checksum)?;

    Ok((pack_path, idx_path, checksum))
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
