use bstr::{BString, ByteSlice};
use grit_hash::ObjectId;

use crate::{ObjectError, Signature};

/// A parsed commit object.
///
/// Headers the graph pipeline has no use for (gpg signatures, mergetags,
/// encodings) are tolerated and skipped rather than preserved; this parser
/// does not round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Id of the root tree.
    pub tree: ObjectId,
    /// Parent ids in recorded order (empty for a root commit).
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Message text after the header block.
    pub message: BString,
}

impl Commit {
    /// Parse commit content (storage header already stripped).
    pub fn parse(data: &[u8]) -> Result<Self, ObjectError> {
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        let mut pos = 0;
        while pos < data.len() && data[pos] != b'\n' {
            let line_end = data[pos..]
                .find_byte(b'\n')
                .map(|p| pos + p)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];
            pos = line_end + 1;

            // Multi-line header values continue on lines starting with a
            // space; nothing we keep uses them, so fold them into the
            // current header and move on.
            while pos < data.len() && data[pos] == b' ' {
                pos = data[pos..]
                    .find_byte(b'\n')
                    .map(|p| pos + p + 1)
                    .unwrap_or(data.len());
            }

            let Some(space) = line.find_byte(b' ') else {
                continue;
            };
            let (key, value) = (&line[..space], &line[space + 1..]);
            match key {
                b"tree" => tree = Some(parse_oid_value(value, "tree")?),
                b"parent" => parents.push(parse_oid_value(value, "parent")?),
                b"author" => author = Some(Signature::parse(value.as_bstr())?),
                b"committer" => committer = Some(Signature::parse(value.as_bstr())?),
                _ => {}
            }
        }

        // Whatever follows the blank separator line is the message.
        let message = if pos < data.len() {
            BString::from(&data[pos + 1..])
        } else {
            BString::new(Vec::new())
        };

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField { field: "author" })?,
            committer: committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?,
            message,
        })
    }

    /// First parent, if any.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// Whether this commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Whether this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

fn parse_oid_value(value: &[u8], field: &'static str) -> Result<ObjectId, ObjectError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|hex| ObjectId::from_hex(hex).ok())
        .ok_or_else(|| ObjectError::InvalidHeader(format!("unparsable {field} id")))
}
