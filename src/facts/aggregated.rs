use crate::btree::BTreeSpec;
use crate::utils::{read_u32_aligned, write_u32_aligned};

use super::varint::{read_uvarint, write_uvarint};

/// Specializes the tree for an aggregated-facts projection: entries
/// are `(v1, v2, count)`, unique on `(v1, v2)`, where `count` is how
/// many distinct `v3` values complete that pair.
pub struct AggregatedSpec;

type AggEntry = (u32, u32, u32);

impl BTreeSpec for AggregatedSpec {
    type Key = (u32, u32);
    type LeafEntry = AggEntry;

    fn inner_key_size() -> usize {
        8
    }

    fn read_inner_key(buf: &[u8], offset: usize) -> Self::Key {
        (read_u32_aligned(buf, offset), read_u32_aligned(buf, offset + 4))
    }

    fn write_inner_key(buf: &mut [u8], offset: usize, key: Self::Key) {
        write_u32_aligned(buf, offset, key.0);
        write_u32_aligned(buf, offset + 4, key.1);
    }

    fn derive_inner_key(entry: &Self::LeafEntry) -> Self::Key {
        (entry.0, entry.1)
    }

    fn pack_leaf_entries(entries: &[Self::LeafEntry]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut prev = (0u32, 0u32);
        for &(v1, v2, count) in entries {
            let d1 = v1 - prev.0;
            write_uvarint(&mut out, d1 as u64);
            if d1 > 0 {
                write_uvarint(&mut out, v2 as u64);
            } else {
                write_uvarint(&mut out, (v2 - prev.1) as u64);
            }
            write_uvarint(&mut out, count as u64);
            prev = (v1, v2);
        }
        out
    }

    fn unpack_leaf_entries(buf: &[u8]) -> Vec<Self::LeafEntry> {
        let mut out = Vec::new();
        let mut prev = (0u32, 0u32);
        let mut pos = 0;
        while pos < buf.len() {
            let (d1, n) = read_uvarint(&buf[pos..]);
            pos += n;
            let v1 = prev.0 + d1 as u32;
            let (v2v, n2) = read_uvarint(&buf[pos..]);
            pos += n2;
            let v2 = if d1 > 0 { v2v as u32 } else { prev.1 + v2v as u32 };
            let (count, n3) = read_uvarint(&buf[pos..]);
            pos += n3;
            out.push((v1, v2, count as u32));
            prev = (v1, v2);
        }
        out
    }

    fn merge_conflict_with(existing: &Self::LeafEntry, incoming: &Self::LeafEntry) -> Self::LeafEntry {
        (existing.0, existing.1, existing.2 + incoming.2)
    }
}
