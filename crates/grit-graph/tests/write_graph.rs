//! End-to-end tests: pack real commits, write the graph, decode it back,
//! and check every format guarantee.

use std::path::{Path, PathBuf};

use grit_graph::{
    write_commit_graph, GraphError, CHUNK_DATA, CHUNK_FANOUT, CHUNK_OID_LOOKUP,
    CHUNK_OVERFLOW_EDGES, EDGE_VALUE_MASK, GRAPH_MAGIC, OVERFLOW_FLAG, PARENT_MISSING,
    PARENT_NONE,
};
use grit_hash::{Hasher, ObjectId};
use grit_object::ObjectType;
use grit_pack::write::create_pack;

// ---------------------------------------------------------------------------
// Store fixtures

fn tree_hex(n: u8) -> String {
    format!("{:02x}{}", n, "00".repeat(19))
}

fn commit_body(tree: &str, parents: &[ObjectId], date: u64, marker: &str) -> Vec<u8> {
    let mut s = format!("tree {tree}\n");
    for p in parents {
        s.push_str(&format!("parent {p}\n"));
    }
    s.push_str(&format!("author A U Thor <author@example.com> {date} +0000\n"));
    s.push_str(&format!("committer C O Mitter <committer@example.com> {date} +0000\n"));
    s.push_str(&format!("\n{marker}\n"));
    s.into_bytes()
}

fn commit_oid(body: &[u8]) -> ObjectId {
    Hasher::hash_object("commit", body).unwrap()
}

fn write_pack(objects_dir: &Path, name: &str, bodies: &[Vec<u8>]) {
    let pack_dir = objects_dir.join("pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    let objects: Vec<(ObjectType, Vec<u8>)> = bodies
        .iter()
        .map(|b| (ObjectType::Commit, b.clone()))
        .collect();
    create_pack(&pack_dir, name, &objects).unwrap();
}

fn graph_path(objects_dir: &Path, basename: &str) -> PathBuf {
    objects_dir.join("info").join(basename)
}

// ---------------------------------------------------------------------------
// A minimal test-local decoder (production code never reads graph files)

struct Graph {
    bytes: Vec<u8>,
    chunks: Vec<(u32, u64)>,
}

impl Graph {
    fn load(path: &Path) -> Self {
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(be32(&bytes, 0), GRAPH_MAGIC);
        assert_eq!(bytes[4], 1, "format version");
        assert_eq!(bytes[5], 1, "id version");
        let num_chunks = bytes[6] as usize;
        assert_eq!(bytes[7], 0, "reserved byte");

        let chunks = (0..=num_chunks)
            .map(|i| {
                let pos = 8 + i * 12;
                let id = be32(&bytes, pos);
                let offset = u64::from_be_bytes(bytes[pos + 4..pos + 12].try_into().unwrap());
                (id, offset)
            })
            .collect();
        Self { bytes, chunks }
    }

    /// Chunk extent `(start, end)`, sized by subtraction from the next
    /// lookup entry.
    fn chunk(&self, id: u32) -> Option<(usize, usize)> {
        self.chunks
            .iter()
            .position(|&(cid, _)| cid == id)
            .map(|i| (self.chunks[i].1 as usize, self.chunks[i + 1].1 as usize))
    }

    fn end_of_chunks(&self) -> u64 {
        self.chunks.last().unwrap().1
    }

    fn fanout(&self, b: u8) -> u32 {
        let (start, _) = self.chunk(CHUNK_FANOUT).unwrap();
        be32(&self.bytes, start + b as usize * 4)
    }

    fn n(&self) -> u32 {
        self.fanout(255)
    }

    fn oid_at(&self, i: u32) -> ObjectId {
        let (start, _) = self.chunk(CHUNK_OID_LOOKUP).unwrap();
        let at = start + i as usize * 20;
        ObjectId::from_bytes(&self.bytes[at..at + 20]).unwrap()
    }

    fn lookup(&self, oid: &ObjectId) -> Option<u32> {
        (0..self.n()).find(|&i| self.oid_at(i) == *oid)
    }

    fn record(&self, i: u32) -> (ObjectId, u32, u32, u64) {
        let (start, _) = self.chunk(CHUNK_DATA).unwrap();
        let at = start + i as usize * 36;
        let tree = ObjectId::from_bytes(&self.bytes[at..at + 20]).unwrap();
        let p0 = be32(&self.bytes, at + 20);
        let p1 = be32(&self.bytes, at + 24);
        let date =
            ((be32(&self.bytes, at + 28) as u64) << 32) | be32(&self.bytes, at + 32) as u64;
        (tree, p0, p1, date)
    }

    fn edge(&self, k: u32) -> u32 {
        let (start, _) = self.chunk(CHUNK_OVERFLOW_EDGES).unwrap();
        be32(&self.bytes, start + k as usize * 4)
    }

    /// Decode a commit's parent list back into ids (`None` per slot that
    /// says "missing").
    fn parents_of(&self, i: u32) -> Vec<Option<ObjectId>> {
        let decode = |slot: u32| -> Option<ObjectId> {
            assert_ne!(slot, PARENT_NONE);
            (slot != PARENT_MISSING).then(|| self.oid_at(slot))
        };

        let (_, p0, p1, _) = self.record(i);
        let mut parents = Vec::new();
        if p0 == PARENT_NONE {
            return parents;
        }
        parents.push(decode(p0));
        if p1 == PARENT_NONE {
            return parents;
        }
        if p1 & OVERFLOW_FLAG == 0 {
            parents.push(decode(p1));
            return parents;
        }

        let mut k = p1 & EDGE_VALUE_MASK;
        loop {
            let entry = self.edge(k);
            parents.push(decode(entry & EDGE_VALUE_MASK));
            if entry & OVERFLOW_FLAG != 0 {
                return parents;
            }
            k += 1;
        }
    }

    fn trailer(&self) -> &[u8] {
        &self.bytes[self.bytes.len() - 20..]
    }
}

fn be32(bytes: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap())
}

fn check_universal_invariants(g: &Graph) {
    // Strictly increasing id list.
    for i in 1..g.n() {
        assert!(g.oid_at(i - 1) < g.oid_at(i), "id list out of order at {i}");
    }

    // Fan-out counts every bucket cumulatively.
    for b in 0..=255u8 {
        let expected = (0..g.n()).filter(|&i| g.oid_at(i).first_byte() <= b).count() as u32;
        assert_eq!(g.fanout(b), expected, "fan-out bucket {b:#04x}");
    }

    // The terminator offset is the trailer start.
    assert_eq!(g.end_of_chunks() as usize, g.bytes.len() - 20);

    // The trailer hashes everything before it.
    let hash = Hasher::digest(&g.bytes[..g.bytes.len() - 20]).unwrap();
    assert_eq!(g.trailer(), hash.as_bytes());
}

// ---------------------------------------------------------------------------
// Scenarios

#[test]
fn empty_store_writes_minimal_graph() {
    let tmp = tempfile::tempdir().unwrap();
    let name = write_commit_graph(tmp.path()).unwrap();

    let g = Graph::load(&graph_path(tmp.path(), &name));
    assert_eq!(g.bytes.len(), 8 + 4 * 12 + 1024 + 20);
    assert_eq!(g.n(), 0);
    assert_eq!(g.chunks.len(), 4); // three chunks + terminator
    assert!(g.chunk(CHUNK_OVERFLOW_EDGES).is_none());
    check_universal_invariants(&g);
}

#[test]
fn single_root_commit() {
    let tmp = tempfile::tempdir().unwrap();
    let body = commit_body(&tree_hex(0xaa), &[], 1000, "root");
    write_pack(tmp.path(), "pack-1", &[body.clone()]);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    check_universal_invariants(&g);

    assert_eq!(g.n(), 1);
    assert_eq!(g.oid_at(0), commit_oid(&body));

    let (tree, p0, p1, date) = g.record(0);
    assert_eq!(tree.to_hex(), tree_hex(0xaa));
    assert_eq!(p0, PARENT_NONE);
    assert_eq!(p1, PARENT_NONE);
    assert_eq!(date, 1000);
}

#[test]
fn linear_chain_resolves_parent_indices() {
    let tmp = tempfile::tempdir().unwrap();
    let a = commit_body(&tree_hex(1), &[], 100, "a");
    let b = commit_body(&tree_hex(2), &[commit_oid(&a)], 200, "b");
    let c = commit_body(&tree_hex(3), &[commit_oid(&b)], 300, "c");
    write_pack(tmp.path(), "pack-1", &[a.clone(), b.clone(), c.clone()]);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    check_universal_invariants(&g);
    assert_eq!(g.n(), 3);

    for (child, parent) in [(&b, &a), (&c, &b)] {
        let child_index = g.lookup(&commit_oid(child)).unwrap();
        let (_, p0, p1, _) = g.record(child_index);
        assert_eq!(g.oid_at(p0), commit_oid(parent));
        assert_eq!(p1, PARENT_NONE);
    }
    let root_index = g.lookup(&commit_oid(&a)).unwrap();
    assert_eq!(g.record(root_index).1, PARENT_NONE);
}

#[test]
fn two_parent_merge_stays_inline() {
    let tmp = tempfile::tempdir().unwrap();
    let p1 = commit_body(&tree_hex(1), &[], 10, "p1");
    let p2 = commit_body(&tree_hex(2), &[], 20, "p2");
    let merge = commit_body(
        &tree_hex(3),
        &[commit_oid(&p1), commit_oid(&p2)],
        30,
        "merge",
    );
    write_pack(tmp.path(), "pack-1", &[p1.clone(), p2.clone(), merge.clone()]);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    check_universal_invariants(&g);

    // No overflow chunk for a plain two-parent merge.
    assert!(g.chunk(CHUNK_OVERFLOW_EDGES).is_none());

    let i = g.lookup(&commit_oid(&merge)).unwrap();
    let (_, p0, p1_slot, _) = g.record(i);
    assert_eq!(g.oid_at(p0), commit_oid(&p1));
    assert_eq!(g.oid_at(p1_slot), commit_oid(&p2));
}

#[test]
fn octopus_merge_spills_into_edge_chunk() {
    let tmp = tempfile::tempdir().unwrap();
    let parents: Vec<Vec<u8>> = (0u8..4)
        .map(|i| commit_body(&tree_hex(i), &[], 100 + i as u64, &format!("p{i}")))
        .collect();
    let parent_oids: Vec<ObjectId> = parents.iter().map(|b| commit_oid(b)).collect();
    let octopus = commit_body(&tree_hex(9), &parent_oids, 999, "octopus");

    let mut bodies = parents.clone();
    bodies.push(octopus.clone());
    write_pack(tmp.path(), "pack-1", &bodies);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    check_universal_invariants(&g);

    let i = g.lookup(&commit_oid(&octopus)).unwrap();
    let (_, p0, p1_slot, _) = g.record(i);
    assert_eq!(g.oid_at(p0), parent_oids[0]);
    assert_eq!(p1_slot, OVERFLOW_FLAG); // first (and only) run starts at 0

    let (edge_start, edge_end) = g.chunk(CHUNK_OVERFLOW_EDGES).unwrap();
    assert_eq!(edge_end - edge_start, 3 * 4);
    assert_eq!(g.edge(0), g.lookup(&parent_oids[1]).unwrap());
    assert_eq!(g.edge(1), g.lookup(&parent_oids[2]).unwrap());
    assert_eq!(g.edge(2), g.lookup(&parent_oids[3]).unwrap() | OVERFLOW_FLAG);

    // Full decode round-trips the parent list in order.
    let decoded: Vec<ObjectId> = g.parents_of(i).into_iter().map(Option::unwrap).collect();
    assert_eq!(decoded, parent_oids);
}

#[test]
fn missing_parent_is_encoded_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let ghost = ObjectId::from_hex("00000000000000000000000000000000000000be").unwrap();
    let orphan = commit_body(&tree_hex(5), &[ghost], 50, "orphan");
    write_pack(tmp.path(), "pack-1", &[orphan.clone()]);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    check_universal_invariants(&g);

    let (_, p0, p1, _) = g.record(0);
    assert_eq!(p0, PARENT_MISSING);
    assert_eq!(p1, PARENT_NONE);
    assert_eq!(g.parents_of(0), vec![None]);
}

#[test]
fn duplicate_commits_across_packs_are_written_once() {
    let tmp = tempfile::tempdir().unwrap();
    let a = commit_body(&tree_hex(1), &[], 10, "a");
    let b = commit_body(&tree_hex(2), &[commit_oid(&a)], 20, "b");
    write_pack(tmp.path(), "pack-1", &[a.clone(), b.clone()]);
    write_pack(tmp.path(), "pack-2", &[a.clone()]);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    check_universal_invariants(&g);
    assert_eq!(g.n(), 2);
}

#[test]
fn non_commit_objects_are_filtered_out() {
    let tmp = tempfile::tempdir().unwrap();
    let commit = commit_body(&tree_hex(1), &[], 10, "only");
    let pack_dir = tmp.path().join("pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    create_pack(
        &pack_dir,
        "pack-mixed",
        &[
            (ObjectType::Blob, b"some file".to_vec()),
            (ObjectType::Commit, commit.clone()),
            (ObjectType::Tree, Vec::new()),
            (ObjectType::Tag, b"object 0000000000000000000000000000000000000000\n".to_vec()),
        ],
    )
    .unwrap();

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    assert_eq!(g.n(), 1);
    assert_eq!(g.oid_at(0), commit_oid(&commit));
}

#[test]
fn parent_round_trip_over_a_dag() {
    let tmp = tempfile::tempdir().unwrap();

    // A deterministic little DAG: three roots, then each commit picks
    // parents among its predecessors (including one octopus layer).
    let mut bodies: Vec<Vec<u8>> = (0u8..3)
        .map(|i| commit_body(&tree_hex(i), &[], i as u64, &format!("root{i}")))
        .collect();
    for i in 3..20u8 {
        let prior: Vec<ObjectId> = bodies.iter().map(|b| commit_oid(b)).collect();
        let k = match i % 4 {
            0 => 1,
            1 => 2,
            2 => 3,
            _ => 4,
        }
        .min(prior.len());
        let parents: Vec<ObjectId> = (0..k)
            .map(|j| prior[(i as usize * 7 + j * 5) % prior.len()])
            .collect();
        // Parent lists must not repeat an id for the round-trip to be
        // meaningful; skew the picks until distinct.
        let mut distinct = Vec::new();
        for (j, p) in parents.iter().enumerate() {
            let mut candidate = *p;
            let mut step = 1;
            while distinct.contains(&candidate) {
                candidate = prior[(i as usize * 7 + j * 5 + step) % prior.len()];
                step += 1;
            }
            distinct.push(candidate);
        }
        bodies.push(commit_body(&tree_hex(i), &distinct, 1000 + i as u64, &format!("c{i}")));
    }
    write_pack(tmp.path(), "pack-dag", &bodies);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    check_universal_invariants(&g);
    assert_eq!(g.n(), bodies.len() as u32);

    for body in &bodies {
        let oid = commit_oid(body);
        let i = g.lookup(&oid).unwrap();
        let decoded: Vec<ObjectId> = g.parents_of(i).into_iter().map(Option::unwrap).collect();

        // Reparse the source body for the expected parent list.
        let text = String::from_utf8(body.clone()).unwrap();
        let expected: Vec<ObjectId> = text
            .lines()
            .filter_map(|l| l.strip_prefix("parent "))
            .map(|h| ObjectId::from_hex(h).unwrap())
            .collect();
        assert_eq!(decoded, expected, "parents of {oid}");
    }
}

#[test]
fn wide_dates_pack_two_extra_bits() {
    let tmp = tempfile::tempdir().unwrap();
    let date = (0b10u64 << 32) | 12345; // needs bit 33
    let body = commit_body(&tree_hex(1), &[], date, "future");
    write_pack(tmp.path(), "pack-1", &[body.clone()]);

    let name = write_commit_graph(tmp.path()).unwrap();
    let g = Graph::load(&graph_path(tmp.path(), &name));
    assert_eq!(g.record(0).3, date);
}

// ---------------------------------------------------------------------------
// Publish behavior

#[test]
fn name_is_content_addressed_and_deterministic() {
    let build = || {
        let tmp = tempfile::tempdir().unwrap();
        let a = commit_body(&tree_hex(1), &[], 10, "a");
        let b = commit_body(&tree_hex(2), &[commit_oid(&a)], 20, "b");
        write_pack(tmp.path(), "pack-1", &[a, b]);
        let name = write_commit_graph(tmp.path()).unwrap();
        let bytes = std::fs::read(graph_path(tmp.path(), &name)).unwrap();
        (tmp, name, bytes)
    };

    let (_t1, name1, bytes1) = build();
    let (_t2, name2, bytes2) = build();
    assert_eq!(name1, name2);
    assert_eq!(bytes1, bytes2);

    // graph-<40 hex>.graph, where the hex is the trailer hash.
    let hex = name1
        .strip_prefix("graph-")
        .and_then(|s| s.strip_suffix(".graph"))
        .unwrap();
    assert_eq!(hex.len(), 40);
    assert_eq!(ObjectId::from_hex(hex).unwrap().as_bytes(), &bytes1[bytes1.len() - 20..]);
}

#[test]
fn publish_leaves_no_temp_files() {
    let tmp = tempfile::tempdir().unwrap();
    write_pack(tmp.path(), "pack-1", &[commit_body(&tree_hex(1), &[], 1, "x")]);

    let name = write_commit_graph(tmp.path()).unwrap();

    let entries: Vec<String> = std::fs::read_dir(tmp.path().join("info"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, vec![name]);
}

#[cfg(unix)]
#[test]
fn published_file_is_read_only() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    write_pack(tmp.path(), "pack-1", &[commit_body(&tree_hex(1), &[], 1, "x")]);

    let name = write_commit_graph(tmp.path()).unwrap();
    let meta = std::fs::metadata(graph_path(tmp.path(), &name)).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, 0o444);
}

#[test]
fn unreadable_info_dir_is_a_directory_creation_error() {
    let tmp = tempfile::tempdir().unwrap();
    write_pack(tmp.path(), "pack-1", &[commit_body(&tree_hex(1), &[], 1, "x")]);

    // A plain file where the info directory must go.
    std::fs::write(tmp.path().join("info"), b"in the way").unwrap();

    assert!(matches!(
        write_commit_graph(tmp.path()).unwrap_err(),
        GraphError::DirectoryCreation { .. }
    ));
}

#[test]
fn rewriting_over_an_existing_graph_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    write_pack(tmp.path(), "pack-1", &[commit_body(&tree_hex(1), &[], 1, "x")]);

    let first = write_commit_graph(tmp.path()).unwrap();
    // Same content, same name: the rename lands on the published (0444)
    // file and must still succeed.
    let second = write_commit_graph(tmp.path()).unwrap();
    assert_eq!(first, second);
    assert!(graph_path(tmp.path(), &second).exists());
}