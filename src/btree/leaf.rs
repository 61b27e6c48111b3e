use std::marker::PhantomData;

use crate::page::{Page, PAGE_SIZE};
use crate::utils::{read_u32_be, write_u32_be};

use super::page_id::EMPTY_PAGE_ID;
use super::spec::BTreeSpec;

/// Page LSN (8 B, always written zero — write-ahead logging itself is
/// untracked) followed by the next-leaf pointer (4 B).
const HEADER_SIZE: usize = 12;
/// Entry count isn't carried in the fixed header; `unpack_leaf_entries`
/// already knows where its own run ends from a byte length alone, so
/// that length is written as a `u32` immediately after the header
/// rather than growing the header itself.
const LENGTH_PREFIX: usize = 4;
const BODY_OFFSET: usize = HEADER_SIZE + LENGTH_PREFIX;

/// A leaf page: a run of entries sorted by `S::derive_inner_key`, plus
/// a forward sibling link so a range scan can walk across pages
/// without touching the tree above it. The chain is singly linked;
/// nothing in this engine ever walks a leaf chain backward.
pub struct LeafPage<S: BTreeSpec> {
    pub entries: Vec<S::LeafEntry>,
    pub next: Option<u32>,
    _marker: PhantomData<S>,
}

impl<S: BTreeSpec> LeafPage<S> {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            next: None,
            _marker: PhantomData,
        }
    }

    pub fn from_page(page: &Page) -> Self {
        let bytes = page.bytes.as_ref();
        // bytes[0..8] is the page LSN; nothing in this engine reads it.
        let next = read_u32_be(bytes, 8);
        let payload_len = read_u32_be(bytes, HEADER_SIZE) as usize;

        let entries = if payload_len == 0 {
            Vec::new()
        } else {
            S::unpack_leaf_entries(&bytes[BODY_OFFSET..BODY_OFFSET + payload_len])
        };

        Self {
            entries,
            next: if next == EMPTY_PAGE_ID { None } else { Some(next) },
            _marker: PhantomData,
        }
    }

    pub fn to_page(&self) -> Page {
        let mut page = Page::zeroed();
        let bytes = page.bytes.as_mut();
        write_u32_be(bytes, 0, 0);
        write_u32_be(bytes, 4, 0);
        write_u32_be(bytes, 8, self.next.unwrap_or(EMPTY_PAGE_ID));
        let payload = S::pack_leaf_entries(&self.entries);
        assert!(
            BODY_OFFSET + payload.len() <= PAGE_SIZE,
            "leaf page payload overflowed the page"
        );
        write_u32_be(bytes, HEADER_SIZE, payload.len() as u32);
        bytes[BODY_OFFSET..BODY_OFFSET + payload.len()].copy_from_slice(&payload);
        page
    }

    /// Real encoded size of this page's current contents. Used as the
    /// split trigger; computed by actually packing rather than
    /// estimating, since delta compression makes entry size uneven.
    pub fn encoded_len(&self) -> usize {
        BODY_OFFSET + S::pack_leaf_entries(&self.entries).len()
    }

    /// Insert or merge `entry` in sorted position by its derived key.
    pub fn upsert(&mut self, entry: S::LeafEntry) {
        let key = S::derive_inner_key(&entry);
        match self
            .entries
            .binary_search_by_key(&key, |e| S::derive_inner_key(e))
        {
            Ok(idx) => {
                self.entries[idx] = S::merge_conflict_with(&self.entries[idx], &entry);
            }
            Err(idx) => self.entries.insert(idx, entry),
        }
    }

    /// Split in half by entry count; `self` keeps the lower half and
    /// the upper half is returned as a fresh page with no siblings
    /// wired up yet — the caller (the tree) links it in.
    pub fn split(&mut self) -> LeafPage<S> {
        let mid = self.entries.len() / 2;
        let upper = self.entries.split_off(mid);
        LeafPage {
            entries: upper,
            next: None,
            _marker: PhantomData,
        }
    }
}
