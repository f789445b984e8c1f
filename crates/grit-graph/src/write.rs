//! The write pipeline: collect → sort/parse → plan → encode → publish.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use grit_hash::{FanoutTable, HashFile, ObjectId};
use grit_object::ObjectType;
use grit_odb::ObjectStore;
use tempfile::NamedTempFile;

use crate::{
    GraphError, CHUNK_DATA, CHUNK_FANOUT, CHUNK_LOOKUP_ENTRY_LEN, CHUNK_OID_LOOKUP,
    CHUNK_OVERFLOW_EDGES, DATA_RECORD_LEN, GRAPH_MAGIC, GRAPH_OID_VERSION, GRAPH_VERSION,
    HEADER_LEN, MAX_COMMITS, OVERFLOW_FLAG, PARENT_MISSING, PARENT_NONE,
};

/// One row of the commit table.
struct GraphCommit {
    oid: ObjectId,
    tree: ObjectId,
    parents: Vec<ObjectId>,
    date: u64,
}

/// The sorted, de-duplicated commits to be written, plus the number of
/// entries the EDGE chunk will hold.
struct CommitTable {
    commits: Vec<GraphCommit>,
    overflow_edges: u32,
}

impl CommitTable {
    /// Wrap commits that are already sorted ascending by id.
    fn new(commits: Vec<GraphCommit>) -> Self {
        debug_assert!(commits.windows(2).all(|w| w[0].oid < w[1].oid));
        let overflow_edges = commits
            .iter()
            .filter(|c| c.parents.len() > 2)
            .map(|c| c.parents.len() as u32 - 1)
            .sum();
        Self { commits, overflow_edges }
    }

    fn len(&self) -> usize {
        self.commits.len()
    }

    /// Table index of an id, if present.
    fn position(&self, oid: &ObjectId) -> Option<u32> {
        self.commits
            .binary_search_by(|c| c.oid.cmp(oid))
            .ok()
            .map(|i| i as u32)
    }

    /// The parent-slot encoding for an id: its index, or the missing
    /// sentinel.
    fn parent_slot(&self, oid: &ObjectId) -> u32 {
        self.position(oid).unwrap_or(PARENT_MISSING)
    }
}

/// Walk every packed object and keep the ids of those that are commits.
///
/// Only entry headers are examined; bodies stay compressed. Any unreadable
/// entry fails the walk.
fn collect_commit_oids(store: &ObjectStore) -> Result<Vec<ObjectId>, GraphError> {
    let approx = store.approximate_object_count() as usize;
    let mut oids = Vec::with_capacity((approx * 15 / 100).max(1024));

    for location in store.packed_objects() {
        if store.object_kind_at(location.pack, location.offset)? == ObjectType::Commit {
            oids.push(location.oid);
        }
    }
    Ok(oids)
}

fn check_commit_count(count: usize) -> Result<(), GraphError> {
    if count > MAX_COMMITS as usize {
        return Err(GraphError::TooManyCommits { count });
    }
    Ok(())
}

/// Sort and de-duplicate the collected ids, then read and parse each
/// distinct commit into the table.
fn build_commit_table(
    store: &ObjectStore,
    mut oids: Vec<ObjectId>,
) -> Result<CommitTable, GraphError> {
    oids.sort_unstable();
    oids.dedup();
    check_commit_count(oids.len())?;

    let mut commits = Vec::with_capacity(oids.len());
    for oid in oids {
        let commit = store.read_commit(&oid)?;
        commits.push(GraphCommit {
            oid,
            tree: commit.tree,
            parents: commit.parents,
            // Pre-epoch dates clamp to zero rather than sign-extending
            // into the 34-bit field.
            date: commit.committer.time.seconds.max(0) as u64,
        });
    }
    Ok(CommitTable::new(commits))
}

/// Precomputed chunk ids, offsets, and the end-of-chunks position.
struct ChunkLayout {
    chunks: Vec<(u32, u64)>,
    end: u64,
}

impl ChunkLayout {
    fn plan(table: &CommitTable) -> Self {
        let n = table.len() as u64;
        let mut parts: Vec<(u32, u64)> = vec![
            (CHUNK_FANOUT, FanoutTable::ENCODED_LEN as u64),
            (CHUNK_OID_LOOKUP, n * ObjectId::RAW_LEN as u64),
            (CHUNK_DATA, n * DATA_RECORD_LEN as u64),
        ];
        if table.overflow_edges > 0 {
            parts.push((CHUNK_OVERFLOW_EDGES, table.overflow_edges as u64 * 4));
        }

        // The lookup table itself is part of the preamble, so offsets are
        // absolute only once its size is known.
        let mut offset = (HEADER_LEN + (parts.len() + 1) * CHUNK_LOOKUP_ENTRY_LEN) as u64;
        let chunks = parts
            .into_iter()
            .map(|(id, size)| {
                let at = offset;
                offset += size;
                (id, at)
            })
            .collect();

        Self { chunks, end: offset }
    }
}

fn write_fanout<W: Write>(f: &mut HashFile<W>, table: &CommitTable) -> Result<(), GraphError> {
    let fanout = FanoutTable::from_first_bytes(table.commits.iter().map(|c| c.oid.first_byte()));
    f.write(&fanout.to_bytes())?;
    Ok(())
}

fn write_oid_lookup<W: Write>(f: &mut HashFile<W>, table: &CommitTable) -> Result<(), GraphError> {
    for commit in &table.commits {
        f.write(commit.oid.as_bytes())?;
    }
    Ok(())
}

/// Emit the 36-byte records. `num_overflow` runs ahead of the EDGE chunk:
/// for an octopus merge the parent-1 slot stores the chunk position at
/// which that commit's overflow run will begin, which only works because
/// [`write_overflow_edges`] walks the table in the same order.
fn write_data<W: Write>(f: &mut HashFile<W>, table: &CommitTable) -> Result<(), GraphError> {
    let mut num_overflow: u32 = 0;

    for commit in &table.commits {
        f.write(commit.tree.as_bytes())?;

        let parent0 = match commit.parents.first() {
            None => PARENT_NONE,
            Some(p) => table.parent_slot(p),
        };
        f.write_be32(parent0)?;

        let parent1 = match commit.parents.len() {
            0 | 1 => PARENT_NONE,
            2 => table.parent_slot(&commit.parents[1]),
            _ => OVERFLOW_FLAG | num_overflow,
        };
        f.write_be32(parent1)?;

        if commit.parents.len() > 2 {
            num_overflow += commit.parents.len() as u32 - 1;
        }

        // 34-bit date: the two bits above u32 ride in the first word.
        // Anything higher wraps silently; that is the format's contract.
        f.write_be32(((commit.date >> 32) & 0x3) as u32)?;
        f.write_be32(commit.date as u32)?;
    }
    Ok(())
}

/// Emit parents 2.. of every octopus merge, in table order, terminating
/// each commit's run with the high bit.
fn write_overflow_edges<W: Write>(
    f: &mut HashFile<W>,
    table: &CommitTable,
) -> Result<(), GraphError> {
    for commit in &table.commits {
        if commit.parents.len() <= 2 {
            continue;
        }
        let run = &commit.parents[1..];
        for (i, parent) in run.iter().enumerate() {
            let mut value = table.parent_slot(parent);
            if i + 1 == run.len() {
                value |= OVERFLOW_FLAG;
            }
            f.write_be32(value)?;
        }
    }
    Ok(())
}

/// Emit the whole file body (everything the trailer hash covers).
fn emit_graph<W: Write>(f: &mut HashFile<W>, table: &CommitTable) -> Result<(), GraphError> {
    let layout = ChunkLayout::plan(table);

    f.write_be32(GRAPH_MAGIC)?;
    f.write_u8(GRAPH_VERSION)?;
    f.write_u8(GRAPH_OID_VERSION)?;
    f.write_u8(layout.chunks.len() as u8)?;
    f.write_u8(0)?; // reserved

    for &(id, offset) in &layout.chunks {
        f.write_be32(id)?;
        f.write_be64(offset)?;
    }
    // Terminator: id zero, offset at end-of-chunks, so a reader can size
    // every chunk by subtraction.
    f.write_be32(0)?;
    f.write_be64(layout.end)?;

    write_fanout(f, table)?;
    write_oid_lookup(f, table)?;
    write_data(f, table)?;
    if table.overflow_edges > 0 {
        write_overflow_edges(f, table)?;
    }

    debug_assert_eq!(f.bytes_written(), layout.end);
    Ok(())
}

/// Write the commit graph for every packed commit under `obj_dir`.
///
/// Opens the store, emits the file into `<obj_dir>/info/` through a
/// checksummed temp file, and publishes it atomically as
/// `graph-<hash>.graph`. Returns the published basename.
pub fn write_commit_graph(obj_dir: impl AsRef<Path>) -> Result<String, GraphError> {
    let store = ObjectStore::open(obj_dir.as_ref())?;
    write_commit_graph_for_store(&store)
}

/// As [`write_commit_graph`], over an already-open store.
pub fn write_commit_graph_for_store(store: &ObjectStore) -> Result<String, GraphError> {
    let table = build_commit_table(store, collect_commit_oids(store)?)?;

    let info_dir = store.objects_dir().join("info");
    std::fs::create_dir_all(&info_dir).map_err(|source| GraphError::DirectoryCreation {
        path: info_dir.clone(),
        source,
    })?;

    let temp = tempfile::Builder::new()
        .prefix("tmp_graph_")
        .tempfile_in(&info_dir)
        .map_err(|source| GraphError::TempFile {
            dir: info_dir.clone(),
            source,
        })?;
    let (file, temp_path) = temp.into_parts();
    set_graph_permissions(&file)?;

    let mut out = HashFile::new(file);
    emit_graph(&mut out, &table)?;
    let (file, hash) = out.finalize_to_disk(true)?;

    // Both working sets go before the publish.
    drop(table);

    let name = format!("graph-{}.graph", hash.to_hex());
    let target = info_dir.join(&name);
    NamedTempFile::from_parts(file, temp_path)
        .persist(&target)
        .map_err(|e| {
            // Only the rename failed; the finished temp file stays on disk
            // for the caller to inspect or retry.
            let source = e.error;
            let _ = e.file.into_temp_path().keep();
            GraphError::Persist { target, source }
        })?;

    Ok(name)
}

/// Graph files are immutable once published: 0444, like the packs.
fn set_graph_permissions(file: &File) -> Result<(), GraphError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o444))?;
    }
    #[cfg(not(unix))]
    {
        let _ = file;
    }
    Ok(())
}
