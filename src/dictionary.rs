//! C5: the dictionary. Maps RDF terms (IRIs, literals) to dense
//! `u32` ids and back. The forward (id -> string) and reverse
//! (string -> id) directions are both kept fully in memory — this
//! store targets datasets dictionary-sized for one machine's RAM, not
//! web-scale corpora — and are replayed from an append-only log on
//! disk so a reopen doesn't need to re-parse any fact segment.

use std::convert::TryInto;
use std::sync::Arc;
use std::sync::RwLock;

use crate::error::SmallError;
use crate::ids::UNBOUND;
use crate::page::{PagedFile, PAGE_SIZE};
use crate::types::{ConcurrentHashMap, SmallResult};
use crate::utils::HandyRwLock;

/// Page 0 reserves its first four bytes for the total entry count, so
/// replay never has to guess where real data ends and zero padding
/// begins.
const HEADER_RESERVED: usize = 4;

/// One entry in the append log is a length-prefixed UTF-8 string. The
/// entry's id is implied by its position (the n-th entry is id `n`).
pub struct Dictionary {
    log: Arc<PagedFile>,
    forward: RwLock<Vec<String>>,
    reverse: ConcurrentHashMap<String, u32>,
    cursor: RwLock<(u32, usize)>,
}

impl Dictionary {
    pub fn create(log: Arc<PagedFile>) -> Result<Self, SmallError> {
        if log.page_count() == 0 {
            let page = log.allocate_page()?;
            debug_assert_eq!(page, 0);
        }
        Ok(Self {
            log,
            forward: RwLock::new(Vec::new()),
            reverse: ConcurrentHashMap::new(),
            cursor: RwLock::new((0, HEADER_RESERVED)),
        })
    }

    /// Rebuild the in-memory directions by replaying the append log.
    pub fn open(log: Arc<PagedFile>) -> Result<Self, SmallError> {
        let dict = Self::create(log)?;

        let header = dict.log.read_page(0)?;
        let entry_count =
            u32::from_be_bytes(header.bytes[0..4].try_into().unwrap()) as usize;

        let mut forward = Vec::with_capacity(entry_count);
        let mut page_id = 0u32;
        let mut offset = HEADER_RESERVED;
        let mut page = dict.log.read_page(page_id)?;

        while forward.len() < entry_count {
            if offset + 4 > PAGE_SIZE {
                page_id += 1;
                offset = 0;
                page = dict.log.read_page(page_id)?;
            }
            let len = u32::from_be_bytes(
                page.bytes[offset..offset + 4].try_into().unwrap(),
            ) as usize;
            if offset + 4 + len > PAGE_SIZE {
                page_id += 1;
                offset = 0;
                page = dict.log.read_page(page_id)?;
                continue;
            }
            let s = String::from_utf8_lossy(&page.bytes[offset + 4..offset + 4 + len])
                .into_owned();
            offset += 4 + len;
            forward.push(s);
        }

        for (id, s) in forward.iter().enumerate() {
            dict.reverse.insert(s.clone(), id as u32);
        }
        *dict.forward.wl() = forward;
        *dict.cursor.write().unwrap() = (page_id, offset);
        Ok(dict)
    }

    pub fn len(&self) -> usize {
        self.forward.rl().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup_string(&self, id: u32) -> Option<String> {
        if id == UNBOUND {
            return None;
        }
        self.forward.rl().get(id as usize).cloned()
    }

    pub fn lookup_id(&self, s: &str) -> Option<u32> {
        self.reverse.get(&s.to_string())
    }

    /// Return `s`'s id, allocating and appending a new one if it is
    /// not already present. Idempotent: calling this twice with the
    /// same string returns the same id without writing twice.
    pub fn intern(&self, s: &str) -> Result<u32, SmallError> {
        if let Some(id) = self.lookup_id(s) {
            return Ok(id);
        }

        let mut forward = self.forward.wl();
        if let Some(id) = self.reverse.get(&s.to_string()) {
            return Ok(id);
        }

        let id = forward.len() as u32;
        self.append(s, id + 1)?;
        forward.push(s.to_string());
        self.reverse.insert(s.to_string(), id);
        Ok(id)
    }

    fn append(&self, s: &str, new_count: u32) -> SmallResult {
        let bytes = s.as_bytes();
        let entry_len = 4 + bytes.len();
        assert!(
            HEADER_RESERVED + entry_len <= PAGE_SIZE,
            "dictionary entry larger than one page is not supported"
        );

        let mut cursor = self.cursor.write().unwrap();
        let (mut page_id, mut offset) = *cursor;

        if offset + entry_len > PAGE_SIZE {
            page_id = self.log.allocate_page()?;
            offset = 0;
        }

        let mut page = self.log.read_page(page_id)?;
        page.bytes[offset..offset + 4].copy_from_slice(&(bytes.len() as u32).to_be_bytes());
        page.bytes[offset + 4..offset + 4 + bytes.len()].copy_from_slice(bytes);
        self.log.write_page(page_id, &page)?;

        let mut header = self.log.read_page(0)?;
        header.bytes[0..4].copy_from_slice(&new_count.to_be_bytes());
        self.log.write_page(0, &header)?;

        *cursor = (page_id, offset + entry_len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn intern_is_idempotent_and_bidirectional() {
        let dir = tempdir().unwrap();
        let log = Arc::new(PagedFile::open(dir.path().join("dict.dat")).unwrap());
        let dict = Dictionary::create(log).unwrap();

        let id1 = dict.intern("http://example.org/alice").unwrap();
        let id2 = dict.intern("http://example.org/alice").unwrap();
        assert_eq!(id1, id2);

        assert_eq!(dict.lookup_string(id1).unwrap(), "http://example.org/alice");
        assert_eq!(dict.lookup_id("http://example.org/alice"), Some(id1));
    }

    #[test]
    fn reopen_replays_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dict.dat");
        let id;
        {
            let log = Arc::new(PagedFile::open(&path).unwrap());
            let dict = Dictionary::create(log).unwrap();
            id = dict.intern("http://example.org/bob").unwrap();
            dict.intern("http://example.org/carol").unwrap();
        }
        {
            let log = Arc::new(PagedFile::open(&path).unwrap());
            let dict = Dictionary::open(log).unwrap();
            assert_eq!(dict.lookup_id("http://example.org/bob"), Some(id));
            assert_eq!(dict.len(), 2);
        }
    }
}
