//! C1: the paged file. A flat file of fixed-size pages, grown by
//! appending. Nothing above this layer is allowed to assume pages stay
//! resident in memory between calls — that is the buffer pool's job.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::error::SmallError;

pub const PAGE_SIZE: usize = 16384;

pub type PageId = u32;

/// One fixed-size page's raw bytes. Owned, not a view into a buffer
/// frame — callers copy in and out through [`PagedFile::read_page`] and
/// [`PagedFile::write_page`].
#[derive(Clone)]
pub struct Page {
    pub bytes: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    pub fn zeroed() -> Self {
        Page {
            bytes: Box::new([0u8; PAGE_SIZE]),
        }
    }
}

/// A single file backing one segment (one permutation, the dictionary,
/// ...), addressed by page number. Internally serialized behind a
/// `Mutex<File>`; concurrent page-level access safety above this layer
/// comes from the buffer pool's latches, not from this type.
pub struct PagedFile {
    file: Mutex<File>,
    page_count: Mutex<u32>,
}

impl PagedFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SmallError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let page_count = (len / PAGE_SIZE as u64) as u32;
        Ok(PagedFile {
            file: Mutex::new(file),
            page_count: Mutex::new(page_count),
        })
    }

    pub fn page_count(&self) -> u32 {
        *self.page_count.lock().unwrap()
    }

    pub fn read_page(&self, id: PageId) -> Result<Page, SmallError> {
        let mut page = Page::zeroed();
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(id as u64 * PAGE_SIZE as u64))?;
        file.read_exact(page.bytes.as_mut())?;
        Ok(page)
    }

    pub fn write_page(&self, id: PageId, page: &Page) -> Result<(), SmallError> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(id as u64 * PAGE_SIZE as u64))?;
        file.write_all(page.bytes.as_ref())?;
        Ok(())
    }

    /// Append a zeroed page at the end of the file and return its id.
    pub fn allocate_page(&self) -> Result<PageId, SmallError> {
        let mut count = self.page_count.lock().unwrap();
        let id = *count;
        let page = Page::zeroed();
        {
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start(id as u64 * PAGE_SIZE as u64))?;
            file.write_all(page.bytes.as_ref())?;
        }
        *count += 1;
        Ok(id)
    }

    pub fn sync(&self) -> Result<(), SmallError> {
        self.file.lock().unwrap().sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allocate_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let pf = PagedFile::open(dir.path().join("t.db")).unwrap();
        let id = pf.allocate_page().unwrap();
        assert_eq!(id, 0);
        let mut page = Page::zeroed();
        page.bytes[0] = 0xab;
        pf.write_page(id, &page).unwrap();
        let read_back = pf.read_page(id).unwrap();
        assert_eq!(read_back.bytes[0], 0xab);
    }

    #[test]
    fn page_count_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let pf = PagedFile::open(&path).unwrap();
            pf.allocate_page().unwrap();
            pf.allocate_page().unwrap();
        }
        let pf = PagedFile::open(&path).unwrap();
        assert_eq!(pf.page_count(), 2);
    }
}
