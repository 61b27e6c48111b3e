use std::marker::PhantomData;

use crate::page::{Page, PAGE_SIZE};
use crate::utils::{read_u32_be, write_u32_be};

use super::page_id::EMPTY_PAGE_ID;
use super::spec::BTreeSpec;

/// `LSN(8) | marker=0xFFFFFFFF(4) | next(4) | count(4) | pad(4)`. The
/// marker distinguishes an inner page from a leaf page sharing the same
/// segment; `next` is reserved for a future inter-level chain and is
/// always written empty. `count` is the number of separators.
const MARKER: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 24;
/// Immediately after the header: the child reached before any
/// separator is crossed. Not itself part of a `key || child` entry, so
/// it lives just outside the header rather than forcing every entry to
/// carry a key for it.
const FIRST_CHILD_OFFSET: usize = HEADER_SIZE;
const ENTRIES_OFFSET: usize = HEADER_SIZE + 4;

/// An inner page: `children.len() == separators.len() + 1`. The i-th
/// separator key is the smallest key reachable through
/// `children[i + 1]`; everything strictly below `separators[0]` lives
/// under `children[0]`.
pub struct InnerPage<S: BTreeSpec> {
    pub separators: Vec<S::Key>,
    pub children: Vec<u32>,
    _marker: PhantomData<S>,
}

impl<S: BTreeSpec> InnerPage<S> {
    pub fn new(first_child: u32) -> Self {
        Self {
            separators: Vec::new(),
            children: vec![first_child],
            _marker: PhantomData,
        }
    }

    pub fn from_page(page: &Page) -> Self {
        let bytes = page.bytes.as_ref();
        // bytes[0..8] page LSN, bytes[8..12] marker, bytes[12..16]
        // reserved next — none read by this engine.
        let count = read_u32_be(bytes, 16) as usize;
        let first_child = read_u32_be(bytes, FIRST_CHILD_OFFSET);

        let key_size = S::inner_key_size();
        let mut separators = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(count + 1);
        children.push(first_child);

        let mut offset = ENTRIES_OFFSET;
        for _ in 0..count {
            separators.push(S::read_inner_key(bytes, offset));
            offset += key_size;
            children.push(read_u32_be(bytes, offset));
            offset += 4;
        }

        Self {
            separators,
            children,
            _marker: PhantomData,
        }
    }

    pub fn to_page(&self) -> Page {
        let mut page = Page::zeroed();
        let bytes = page.bytes.as_mut();
        write_u32_be(bytes, 0, 0);
        write_u32_be(bytes, 4, 0);
        write_u32_be(bytes, 8, MARKER);
        write_u32_be(bytes, 12, EMPTY_PAGE_ID);
        write_u32_be(bytes, 16, self.separators.len() as u32);
        write_u32_be(bytes, 20, 0);
        write_u32_be(bytes, FIRST_CHILD_OFFSET, self.children[0]);

        let key_size = S::inner_key_size();
        let mut offset = ENTRIES_OFFSET;
        for (i, key) in self.separators.iter().enumerate() {
            S::write_inner_key(bytes, offset, *key);
            offset += key_size;
            write_u32_be(bytes, offset, self.children[i + 1]);
            offset += 4;
        }
        assert!(offset <= PAGE_SIZE, "inner page entries overflowed the page");
        page
    }

    pub fn encoded_len(&self) -> usize {
        ENTRIES_OFFSET + self.separators.len() * (S::inner_key_size() + 4)
    }

    /// Index of the child to descend into to find `key`.
    pub fn child_for(&self, key: S::Key) -> usize {
        match self.separators.binary_search(&key) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    pub fn insert_separator(&mut self, key: S::Key, right_child: u32) {
        let idx = self.child_for(key);
        self.separators.insert(idx, key);
        self.children.insert(idx + 1, right_child);
    }

    /// Split in half; the returned page becomes the right sibling and
    /// the key promoted to the parent is returned alongside it.
    pub fn split(&mut self) -> (S::Key, InnerPage<S>) {
        let mid = self.separators.len() / 2;
        let promoted = self.separators[mid];
        let right_separators = self.separators.split_off(mid + 1);
        self.separators.truncate(mid);
        let right_children = self.children.split_off(mid + 1);

        (
            promoted,
            InnerPage {
                separators: right_separators,
                children: right_children,
                _marker: PhantomData,
            },
        )
    }
}
