use crate::ObjectId;

/// 256-entry fan-out table: cumulative object counts keyed by first digest
/// byte.
///
/// Sorted id tables (pack index, commit graph) prefix themselves with this
/// table so a reader can narrow a binary search to one bucket in constant
/// time. Entry `b` holds the number of ids whose first byte is `<= b`;
/// entry 255 is the total.
#[derive(Debug, Clone)]
pub struct FanoutTable {
    counts: [u32; 256],
}

impl FanoutTable {
    /// Encoded size: 256 big-endian u32 values.
    pub const ENCODED_LEN: usize = 256 * 4;

    /// Build from a slice of ids that is already sorted ascending.
    ///
    /// Order is not verified here; an unsorted input produces a table that
    /// is inconsistent with the id list it describes.
    pub fn build(oids: &[ObjectId]) -> Self {
        Self::from_first_bytes(oids.iter().map(ObjectId::first_byte))
    }

    /// As [`build`](Self::build), from the first bytes alone. Useful when
    /// the sorted ids live inside larger records.
    pub fn from_first_bytes(first_bytes: impl IntoIterator<Item = u8>) -> Self {
        let mut counts = [0u32; 256];
        for b in first_bytes {
            counts[b as usize] += 1;
        }
        for b in 1..256 {
            counts[b] += counts[b - 1];
        }
        Self { counts }
    }

    /// The cumulative count for a first byte.
    pub fn get(&self, first_byte: u8) -> u32 {
        self.counts[first_byte as usize]
    }

    /// Index range of ids whose first byte equals `first_byte`.
    pub fn range(&self, first_byte: u8) -> std::ops::Range<usize> {
        let end = self.counts[first_byte as usize] as usize;
        let start = match first_byte.checked_sub(1) {
            Some(prev) => self.counts[prev as usize] as usize,
            None => 0,
        };
        start..end
    }

    /// Total number of ids described by the table.
    pub fn total(&self) -> u32 {
        self.counts[255]
    }

    /// Serialize as 256 big-endian u32 values.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        for (b, count) in self.counts.iter().enumerate() {
            buf[b * 4..b * 4 + 4].copy_from_slice(&count.to_be_bytes());
        }
        buf
    }
}
