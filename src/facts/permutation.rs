use crate::btree::BTreeSpec;
use crate::utils::{read_u32_aligned, write_u32_aligned};

use super::varint::{read_uvarint, write_uvarint};

/// Specializes the generic B+-tree for one of the six triple
/// permutations. A leaf entry is a full `(v1, v2, v3)` triple already
/// rotated into that permutation's column order; the full triple also
/// serves as the routing key, so there is no separate notion of
/// "duplicate key, different payload" the way the aggregated segments
/// have.
pub struct PermutationSpec;

type Triple3 = (u32, u32, u32);

impl BTreeSpec for PermutationSpec {
    type Key = Triple3;
    type LeafEntry = Triple3;

    fn inner_key_size() -> usize {
        12
    }

    fn read_inner_key(buf: &[u8], offset: usize) -> Self::Key {
        (
            read_u32_aligned(buf, offset),
            read_u32_aligned(buf, offset + 4),
            read_u32_aligned(buf, offset + 8),
        )
    }

    fn write_inner_key(buf: &mut [u8], offset: usize, key: Self::Key) {
        write_u32_aligned(buf, offset, key.0);
        write_u32_aligned(buf, offset + 4, key.1);
        write_u32_aligned(buf, offset + 8, key.2);
    }

    fn derive_inner_key(entry: &Self::LeafEntry) -> Self::Key {
        *entry
    }

    fn pack_leaf_entries(entries: &[Self::LeafEntry]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut prev: Triple3 = (0, 0, 0);
        for &(v1, v2, v3) in entries {
            let d1 = v1 - prev.0;
            write_uvarint(&mut out, d1 as u64);
            if d1 > 0 {
                write_uvarint(&mut out, v2 as u64);
                write_uvarint(&mut out, v3 as u64);
            } else {
                let d2 = v2 - prev.1;
                write_uvarint(&mut out, d2 as u64);
                if d2 > 0 {
                    write_uvarint(&mut out, v3 as u64);
                } else {
                    let d3 = v3 - prev.2;
                    write_uvarint(&mut out, d3 as u64);
                }
            }
            prev = (v1, v2, v3);
        }
        out
    }

    fn unpack_leaf_entries(buf: &[u8]) -> Vec<Self::LeafEntry> {
        let mut out = Vec::new();
        let mut prev: Triple3 = (0, 0, 0);
        let mut pos = 0;
        while pos < buf.len() {
            let (d1, n) = read_uvarint(&buf[pos..]);
            pos += n;
            let v1 = prev.0 + d1 as u32;

            let (v2, v3) = if d1 > 0 {
                let (a, n2) = read_uvarint(&buf[pos..]);
                pos += n2;
                let (b, n3) = read_uvarint(&buf[pos..]);
                pos += n3;
                (a as u32, b as u32)
            } else {
                let (d2, n2) = read_uvarint(&buf[pos..]);
                pos += n2;
                let v2 = prev.1 + d2 as u32;
                if d2 > 0 {
                    let (b, n3) = read_uvarint(&buf[pos..]);
                    pos += n3;
                    (v2, b as u32)
                } else {
                    let (d3, n3) = read_uvarint(&buf[pos..]);
                    pos += n3;
                    (v2, prev.2 + d3 as u32)
                }
            };

            out.push((v1, v2, v3));
            prev = (v1, v2, v3);
        }
        out
    }

    fn merge_conflict_with(_existing: &Self::LeafEntry, incoming: &Self::LeafEntry) -> Self::LeafEntry {
        *incoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_roundtrip_preserves_order() {
        let entries: Vec<Triple3> = vec![
            (1, 1, 1),
            (1, 1, 5),
            (1, 2, 1),
            (2, 1, 1),
            (2, 1, 2),
            (9, 9, 9),
        ];
        let packed = PermutationSpec::pack_leaf_entries(&entries);
        let unpacked = PermutationSpec::unpack_leaf_entries(&packed);
        assert_eq!(unpacked, entries);
    }
}
