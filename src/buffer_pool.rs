//! C2: the buffer manager. Caches pages read off disk behind
//! shared/exclusive latches; callers hold a page only for the lifetime
//! of the `RwLock` guard they acquired, so the latch releases itself
//! on drop — there is no explicit unlatch call anywhere in this crate.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::SmallError;
use crate::page::{Page, PageId, PagedFile};
use crate::types::ConcurrentHashMap;
use crate::utils::HandyRwLock;

/// Identifies which on-disk segment a page belongs to. The six triple
/// permutations, their aggregated/fully-aggregated projections, and the
/// dictionary each get their own id space; `page_id` is only unique
/// within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentId {
    Permutation(crate::ids::Order),
    Aggregated(crate::ids::Order),
    FullyAggregated(crate::ids::Order),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PageKey {
    segment: SegmentId,
    page_id: PageId,
}

/// Caches resident pages and hands out latched references to them.
/// One `BufferPool` is shared by every segment of an open database.
pub struct BufferPool {
    frames: ConcurrentHashMap<PageKey, Arc<RwLock<Page>>>,
    files: RwLock<HashMap<SegmentId, Arc<PagedFile>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            frames: ConcurrentHashMap::new(),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_segment(&self, segment: SegmentId, file: Arc<PagedFile>) {
        self.files.wl().insert(segment, file);
    }

    fn file_for(&self, segment: SegmentId) -> Arc<PagedFile> {
        self.files
            .rl()
            .get(&segment)
            .cloned()
            .unwrap_or_else(|| panic!("segment {:?} not registered", segment))
    }

    /// How many pages `segment`'s backing file currently holds, for
    /// callers that need to flush every page without tracking dirty
    /// sets themselves.
    pub fn file_page_count(&self, segment: SegmentId) -> u32 {
        self.file_for(segment).page_count()
    }

    fn frame(&self, segment: SegmentId, page_id: PageId) -> Result<Arc<RwLock<Page>>, SmallError> {
        let key = PageKey { segment, page_id };
        self.frames.get_or_insert(&key, |key| {
            let file = self.file_for(key.segment);
            let page = file.read_page(key.page_id)?;
            Ok(Arc::new(RwLock::new(page)))
        })
    }

    /// Acquire a page under a shared latch. The latch is released when
    /// the returned guard is dropped.
    pub fn read_shared(
        &self,
        segment: SegmentId,
        page_id: PageId,
    ) -> Result<PageGuard, SmallError> {
        let frame = self.frame(segment, page_id)?;
        Ok(PageGuard::Shared(frame))
    }

    /// Acquire a page under an exclusive latch.
    pub fn read_exclusive(
        &self,
        segment: SegmentId,
        page_id: PageId,
    ) -> Result<PageGuard, SmallError> {
        let frame = self.frame(segment, page_id)?;
        Ok(PageGuard::Exclusive(frame))
    }

    /// Allocate a fresh page in `segment`, latch it exclusively, and
    /// return both the guard and its id.
    pub fn alloc_page(&self, segment: SegmentId) -> Result<(PageId, PageGuard), SmallError> {
        let file = self.file_for(segment);
        let page_id = file.allocate_page()?;
        let key = PageKey { segment, page_id };
        let frame = Arc::new(RwLock::new(Page::zeroed()));
        self.frames.get_inner().wl().insert(key, frame.clone());
        Ok((page_id, PageGuard::Exclusive(frame)))
    }

    /// Flush a page's current in-memory contents back to disk. Callers
    /// are expected to hold (or have just released) an exclusive latch
    /// on it.
    pub fn flush(&self, segment: SegmentId, page_id: PageId) -> Result<(), SmallError> {
        let frame = self.frame(segment, page_id)?;
        let page = frame.rl();
        self.file_for(segment).write_page(page_id, &page)
    }

    pub fn clear(&self) {
        self.frames.clear();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A page held under either a shared or an exclusive latch. Dropping
/// the guard drops the inner `RwLock` guard and so releases the latch;
/// there is deliberately no explicit `release()` method.
pub enum PageGuard {
    Shared(Arc<RwLock<Page>>),
    Exclusive(Arc<RwLock<Page>>),
}

impl PageGuard {
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        match self {
            PageGuard::Shared(frame) => frame.rl(),
            PageGuard::Exclusive(frame) => frame.rl(),
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Page> {
        match self {
            PageGuard::Shared(_) => {
                panic!("attempted to write through a shared page latch")
            }
            PageGuard::Exclusive(frame) => frame.wl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Order;
    use tempfile::tempdir;

    #[test]
    fn alloc_write_read_through_pool() {
        let dir = tempdir().unwrap();
        let pool = BufferPool::new();
        let file = Arc::new(PagedFile::open(dir.path().join("spo.dat")).unwrap());
        let segment = SegmentId::Permutation(Order::Spo);
        pool.register_segment(segment, file);

        let (page_id, guard) = pool.alloc_page(segment).unwrap();
        guard.write().bytes[10] = 7;
        pool.flush(segment, page_id).unwrap();

        pool.clear();
        let guard = pool.read_shared(segment, page_id).unwrap();
        assert_eq!(guard.read().bytes[10], 7);
    }
}
