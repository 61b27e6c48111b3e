use crate::btree::BTreeSpec;
use crate::utils::{read_u32_aligned, write_u32_aligned};

use super::varint::{read_uvarint, write_uvarint};

/// Specializes the tree for a fully-aggregated-facts projection:
/// entries are `(v1, count)`, unique on `v1` — the number of facts
/// that start with that leading column, used to answer `COUNT(*)`
/// style queries and as a cardinality estimate for join ordering.
pub struct FullyAggregatedSpec;

type FaEntry = (u32, u32);

impl BTreeSpec for FullyAggregatedSpec {
    type Key = u32;
    type LeafEntry = FaEntry;

    fn inner_key_size() -> usize {
        4
    }

    fn read_inner_key(buf: &[u8], offset: usize) -> Self::Key {
        read_u32_aligned(buf, offset)
    }

    fn write_inner_key(buf: &mut [u8], offset: usize, key: Self::Key) {
        write_u32_aligned(buf, offset, key);
    }

    fn derive_inner_key(entry: &Self::LeafEntry) -> Self::Key {
        entry.0
    }

    fn pack_leaf_entries(entries: &[Self::LeafEntry]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut prev = 0u32;
        for &(v1, count) in entries {
            write_uvarint(&mut out, (v1 - prev) as u64);
            write_uvarint(&mut out, count as u64);
            prev = v1;
        }
        out
    }

    fn unpack_leaf_entries(buf: &[u8]) -> Vec<Self::LeafEntry> {
        let mut out = Vec::new();
        let mut prev = 0u32;
        let mut pos = 0;
        while pos < buf.len() {
            let (d, n) = read_uvarint(&buf[pos..]);
            pos += n;
            let v1 = prev + d as u32;
            let (count, n2) = read_uvarint(&buf[pos..]);
            pos += n2;
            out.push((v1, count as u32));
            prev = v1;
        }
        out
    }

    fn merge_conflict_with(existing: &Self::LeafEntry, incoming: &Self::LeafEntry) -> Self::LeafEntry {
        (existing.0, existing.1 + incoming.1)
    }
}
