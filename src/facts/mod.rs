//! C4: the fact segments. Six permutations of the raw triples, plus
//! three aggregated and three fully-aggregated projections (one per
//! leading role: subject, predicate, object) used to answer star
//! joins and `COUNT(*)` without falling back to a full scan.

mod aggregated;
mod fully_aggregated;
mod permutation;
mod varint;

pub use aggregated::AggregatedSpec;
pub use fully_aggregated::FullyAggregatedSpec;
pub use permutation::PermutationSpec;

use std::collections::HashMap;
use std::sync::Arc;

use crate::btree::BTree;
use crate::buffer_pool::{BufferPool, SegmentId};
use crate::error::SmallError;
use crate::ids::{Order, Triple, ALL_ORDERS};
use crate::types::SmallResult;

/// The three leading roles that get an aggregated / fully-aggregated
/// projection. Each corresponds to the permutation whose first column
/// is that role.
pub const AGGREGATE_ORDERS: [Order; 3] = [Order::Spo, Order::Pso, Order::Osp];

pub struct FactsStore {
    permutations: HashMap<Order, BTree<PermutationSpec>>,
    aggregated: HashMap<Order, BTree<AggregatedSpec>>,
    fully_aggregated: HashMap<Order, BTree<FullyAggregatedSpec>>,
}

impl FactsStore {
    pub fn create(pool: Arc<BufferPool>) -> Result<Self, SmallError> {
        let mut permutations = HashMap::new();
        for &order in &ALL_ORDERS {
            permutations.insert(
                order,
                BTree::<PermutationSpec>::create(pool.clone(), SegmentId::Permutation(order))?,
            );
        }

        let mut aggregated = HashMap::new();
        let mut fully_aggregated = HashMap::new();
        for &order in &AGGREGATE_ORDERS {
            aggregated.insert(
                order,
                BTree::<AggregatedSpec>::create(pool.clone(), SegmentId::Aggregated(order))?,
            );
            fully_aggregated.insert(
                order,
                BTree::<FullyAggregatedSpec>::create(
                    pool.clone(),
                    SegmentId::FullyAggregated(order),
                )?,
            );
        }

        Ok(Self {
            permutations,
            aggregated,
            fully_aggregated,
        })
    }

    pub fn open(
        pool: Arc<BufferPool>,
        roots: &HashMap<SegmentId, (u32, u32)>,
    ) -> Result<Self, SmallError> {
        let mut permutations = HashMap::new();
        for &order in &ALL_ORDERS {
            let (root, height) = roots
                .get(&SegmentId::Permutation(order))
                .copied()
                .unwrap_or((0, 0));
            permutations.insert(
                order,
                BTree::<PermutationSpec>::open(pool.clone(), SegmentId::Permutation(order), root, height),
            );
        }

        let mut aggregated = HashMap::new();
        let mut fully_aggregated = HashMap::new();
        for &order in &AGGREGATE_ORDERS {
            let (a_root, a_height) = roots
                .get(&SegmentId::Aggregated(order))
                .copied()
                .unwrap_or((0, 0));
            aggregated.insert(
                order,
                BTree::<AggregatedSpec>::open(pool.clone(), SegmentId::Aggregated(order), a_root, a_height),
            );

            let (f_root, f_height) = roots
                .get(&SegmentId::FullyAggregated(order))
                .copied()
                .unwrap_or((0, 0));
            fully_aggregated.insert(
                order,
                BTree::<FullyAggregatedSpec>::open(
                    pool.clone(),
                    SegmentId::FullyAggregated(order),
                    f_root,
                    f_height,
                ),
            );
        }

        Ok(Self {
            permutations,
            aggregated,
            fully_aggregated,
        })
    }

    pub fn permutation(&self, order: Order) -> &BTree<PermutationSpec> {
        self.permutations.get(&order).expect("all six orders are always present")
    }

    pub fn aggregated(&self, order: Order) -> Option<&BTree<AggregatedSpec>> {
        self.aggregated.get(&order)
    }

    pub fn fully_aggregated(&self, order: Order) -> Option<&BTree<FullyAggregatedSpec>> {
        self.fully_aggregated.get(&order)
    }

    /// Insert one triple into all six permutations and refresh the
    /// three aggregated/fully-aggregated projections it participates
    /// in. Used by bulk load; the differential index is the path for
    /// online inserts.
    pub fn insert(&self, triple: Triple) -> SmallResult {
        for &order in &ALL_ORDERS {
            let (v1, v2, v3) = triple.permuted(order);
            self.permutations.get(&order).unwrap().insert((v1, v2, v3))?;
        }
        for &order in &AGGREGATE_ORDERS {
            let (v1, v2, _v3) = triple.permuted(order);
            self.aggregated
                .get(&order)
                .unwrap()
                .insert((v1, v2, 1))?;
            self.fully_aggregated
                .get(&order)
                .unwrap()
                .insert((v1, 1))?;
        }
        Ok(())
    }

    /// `(root_page_id, height)` for every segment, for the directory
    /// header this store should be persisted under.
    pub fn roots(&self) -> HashMap<SegmentId, (u32, u32)> {
        let mut out = HashMap::new();
        for (&order, tree) in &self.permutations {
            out.insert(SegmentId::Permutation(order), (tree.root_page_id(), tree.height()));
        }
        for (&order, tree) in &self.aggregated {
            out.insert(SegmentId::Aggregated(order), (tree.root_page_id(), tree.height()));
        }
        for (&order, tree) in &self.fully_aggregated {
            out.insert(
                SegmentId::FullyAggregated(order),
                (tree.root_page_id(), tree.height()),
            );
        }
        out
    }
}
