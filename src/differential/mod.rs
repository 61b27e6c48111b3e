//! C8: the differential index. An in-memory overlay of everything
//! inserted or deleted since the last `sync()`, kept in the same six
//! permutations as the base fact segments so a scan operator can merge
//! the two without knowing which one a given triple actually lives in.
//!
//! Deletes are tombstones, not removals: the generic B+-tree engine
//! (C3) has no delete operation, so a triple that was already present
//! in the base segments when it gets deleted can only be *suppressed*
//! by a standing tombstone, never physically erased. `sync()` merges
//! newly-created triples into the base segments and discards their
//! overlay entries; tombstones survive `sync()` indefinitely.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::SmallError;
use crate::facts::FactsStore;
use crate::ids::{Order, Triple, ALL_ORDERS};
use crate::types::SmallResult;

/// One overlay entry: a permuted triple plus the transaction that
/// created it and, if it has since been deleted, the transaction that
/// deleted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedTriple {
    pub v1: u32,
    pub v2: u32,
    pub v3: u32,
    pub created: u64,
    pub deleted: Option<u64>,
}

impl VersionedTriple {
    fn key(&self) -> (u32, u32, u32) {
        (self.v1, self.v2, self.v3)
    }
}

struct Overlay {
    entries: RwLock<BTreeMap<(u32, u32, u32), VersionedTriple>>,
}

impl Overlay {
    fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

pub struct DifferentialIndex {
    overlays: [Overlay; 6],
}

impl DifferentialIndex {
    pub fn new() -> Self {
        Self {
            overlays: [
                Overlay::new(),
                Overlay::new(),
                Overlay::new(),
                Overlay::new(),
                Overlay::new(),
                Overlay::new(),
            ],
        }
    }

    fn overlay(&self, order: Order) -> &Overlay {
        &self.overlays[order.index()]
    }

    /// Record a freshly-dictionary-mapped triple as inserted under
    /// transaction `tx` in every permutation.
    pub fn load(&self, tx: u64, triple: Triple) {
        for &order in &ALL_ORDERS {
            let (v1, v2, v3) = triple.permuted(order);
            let overlay = self.overlay(order);
            let mut entries = overlay.entries.write().unwrap();
            entries
                .entry((v1, v2, v3))
                .and_modify(|e| e.deleted = None)
                .or_insert(VersionedTriple {
                    v1,
                    v2,
                    v3,
                    created: tx,
                    deleted: None,
                });
        }
    }

    /// Record `triple` as deleted as of transaction `tx`. Works
    /// whether or not the triple already has a live overlay entry —
    /// a triple living only in the base segments still needs a
    /// tombstone so merged scans suppress it.
    pub fn delete(&self, tx: u64, triple: Triple) {
        for &order in &ALL_ORDERS {
            let (v1, v2, v3) = triple.permuted(order);
            let overlay = self.overlay(order);
            let mut entries = overlay.entries.write().unwrap();
            entries
                .entry((v1, v2, v3))
                .and_modify(|e| e.deleted = Some(tx))
                .or_insert(VersionedTriple {
                    v1,
                    v2,
                    v3,
                    created: 0,
                    deleted: Some(tx),
                });
        }
    }

    /// A sorted snapshot of one permutation's overlay, for merging
    /// against that permutation's base scan.
    pub fn snapshot(&self, order: Order, from: Option<(u32, u32, u32)>) -> Vec<VersionedTriple> {
        let entries = self.overlay(order).entries.read().unwrap();
        match from {
            Some(start) => entries.range(start..).map(|(_, v)| *v).collect(),
            None => entries.values().copied().collect(),
        }
    }

    /// Merge every live (non-tombstoned) overlay entry into `facts`
    /// and drop it from the overlay. Tombstones are left untouched.
    /// Takes every permutation's overlay lock exclusively, one after
    /// another, for the duration of the merge — the closest this crate
    /// comes to a "stop the world" operation.
    pub fn sync(&self, facts: &FactsStore) -> SmallResult {
        let mut guards: Vec<_> = self
            .overlays
            .iter()
            .map(|o| o.entries.write().unwrap())
            .collect();

        // The SPO overlay is canonical: every live triple appears in
        // it exactly once, in (s, p, o) order already.
        let spo_index = Order::Spo.index();
        let live: Vec<Triple> = guards[spo_index]
            .values()
            .filter(|v| v.deleted.is_none())
            .map(|v| Triple::new(v.v1, v.v2, v.v3))
            .collect();

        for triple in &live {
            facts.insert(*triple)?;
        }

        for guard in guards.iter_mut() {
            guard.retain(|_, v| v.deleted.is_some());
        }

        Ok(())
    }

    pub fn len(&self, order: Order) -> usize {
        self.overlay(order).entries.read().unwrap().len()
    }
}

impl Default for DifferentialIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward Volcano-style cursor over the merge of a base permutation
/// scan and that permutation's overlay snapshot. Mirrors the
/// three-way comparison the original engine's differential scan
/// performs: base-only, overlay-only, or both-agree (in which case
/// the overlay's tombstone bit wins).
pub struct MergedScan {
    base: Box<dyn FnMut() -> Result<Option<(u32, u32, u32)>, SmallError>>,
    base_peek: Option<(u32, u32, u32)>,
    overlay: std::vec::IntoIter<VersionedTriple>,
    overlay_peek: Option<VersionedTriple>,
}

impl MergedScan {
    pub fn new(
        mut base: Box<dyn FnMut() -> Result<Option<(u32, u32, u32)>, SmallError>>,
        overlay: Vec<VersionedTriple>,
    ) -> Result<Self, SmallError> {
        let base_peek = base()?;
        let mut overlay = overlay.into_iter();
        let overlay_peek = overlay.next();
        Ok(Self {
            base,
            base_peek,
            overlay,
            overlay_peek,
        })
    }

    pub fn next(&mut self) -> Result<Option<(u32, u32, u32)>, SmallError> {
        loop {
            return match (self.base_peek, self.overlay_peek) {
                (None, None) => Ok(None),
                (Some(b), None) => {
                    self.base_peek = (self.base)()?;
                    Ok(Some(b))
                }
                (None, Some(o)) => {
                    self.overlay_peek = self.overlay.next();
                    if o.deleted.is_some() {
                        continue;
                    }
                    Ok(Some(o.key()))
                }
                (Some(b), Some(o)) => match b.cmp(&o.key()) {
                    std::cmp::Ordering::Less => {
                        self.base_peek = (self.base)()?;
                        Ok(Some(b))
                    }
                    std::cmp::Ordering::Greater => {
                        self.overlay_peek = self.overlay.next();
                        if o.deleted.is_some() {
                            continue;
                        }
                        Ok(Some(o.key()))
                    }
                    std::cmp::Ordering::Equal => {
                        self.base_peek = (self.base)()?;
                        self.overlay_peek = self.overlay.next();
                        if o.deleted.is_some() {
                            continue;
                        }
                        Ok(Some(o.key()))
                    }
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_suppresses_base_entry() {
        let base = vec![(1u32, 2u32, 3u32), (4, 5, 6)];
        let mut base_iter = base.into_iter();
        let overlay = vec![VersionedTriple {
            v1: 1,
            v2: 2,
            v3: 3,
            created: 0,
            deleted: Some(1),
        }];

        let mut scan = MergedScan::new(Box::new(move || Ok(base_iter.next())), overlay).unwrap();
        let mut out = Vec::new();
        while let Some(t) = scan.next().unwrap() {
            out.push(t);
        }
        assert_eq!(out, vec![(4, 5, 6)]);
    }

    #[test]
    fn overlay_only_insert_is_merged_in_order() {
        let base = vec![(1u32, 2u32, 3u32), (9, 9, 9)];
        let mut base_iter = base.into_iter();
        let overlay = vec![VersionedTriple {
            v1: 5,
            v2: 5,
            v3: 5,
            created: 1,
            deleted: None,
        }];

        let mut scan = MergedScan::new(Box::new(move || Ok(base_iter.next())), overlay).unwrap();
        let mut out = Vec::new();
        while let Some(t) = scan.next().unwrap() {
            out.push(t);
        }
        assert_eq!(out, vec![(1, 2, 3), (5, 5, 5), (9, 9, 9)]);
    }
}
