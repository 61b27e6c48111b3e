use std::fmt;

pub const EMPTY_PAGE_ID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageCategory {
    Inner,
    Leaf,
}

/// Identifies a page within one tree. The owning segment (which
/// permutation, which projection) is carried by the buffer pool's
/// `SegmentId`, not by this type — a tree has no notion of which
/// segment it belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BTreePageId {
    pub category: PageCategory,
    pub page_index: u32,
}

impl BTreePageId {
    pub fn new(category: PageCategory, page_index: u32) -> Self {
        Self {
            category,
            page_index,
        }
    }
}

impl fmt::Debug for BTreePageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}_{}", self.category, self.page_index)
    }
}
