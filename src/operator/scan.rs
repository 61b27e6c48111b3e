use std::sync::Arc;

use crate::differential::{DifferentialIndex, MergedScan};
use crate::error::SmallError;
use crate::facts::FactsStore;
use crate::ids::Order;
use crate::runtime::{Register, Runtime};

use super::{Multiplicity, Operator};

/// Scans one permutation of the base fact segments merged with the
/// differential overlay, binding up to three registers. A column
/// whose query-time value is already known (a constant in the triple
/// pattern, or a variable bound by an outer join) is passed in
/// `bound[i]` and used as an equality filter instead of being written
/// out.
pub struct IndexScan {
    order: Order,
    registers: [Option<usize>; 3],
    bound: [Option<u32>; 3],
    facts: Arc<FactsStore>,
    diff: Arc<DifferentialIndex>,
    cursor: Option<MergedScan>,
}

impl IndexScan {
    pub fn new(
        order: Order,
        registers: [Option<usize>; 3],
        bound: [Option<u32>; 3],
        facts: Arc<FactsStore>,
        diff: Arc<DifferentialIndex>,
    ) -> Self {
        Self {
            order,
            registers,
            bound,
            facts,
            diff,
            cursor: None,
        }
    }

    /// Seed the tree-seek key from every leading bound column, stopping
    /// at the first unbound one: a single bound column seeks `(v1, 0,
    /// 0)`, two seek `(v1, v2, 0)`, and so on. Columns at or past the
    /// first gap are still checked per-row in `matches` — a bound
    /// column after an unbound one (a non-prefix equality) can't move
    /// the seek key at all.
    fn open_cursor(&self) -> Result<MergedScan, SmallError> {
        let start = match (self.bound[0], self.bound[1], self.bound[2]) {
            (Some(v1), Some(v2), Some(v3)) => Some((v1, v2, v3)),
            (Some(v1), Some(v2), None) => Some((v1, v2, 0)),
            (Some(v1), None, _) => Some((v1, 0, 0)),
            (None, _, _) => None,
        };
        let mut base = self.facts.permutation(self.order).scan(start)?;
        let base_fn: Box<dyn FnMut() -> Result<Option<(u32, u32, u32)>, SmallError>> =
            Box::new(move || base.next());
        let overlay = self.diff.snapshot(self.order, start);
        MergedScan::new(base_fn, overlay)
    }

    fn matches(&self, v1: u32, v2: u32, v3: u32) -> bool {
        let triple = [v1, v2, v3];
        for i in 0..3 {
            if let Some(expected) = self.bound[i] {
                if triple[i] != expected {
                    return false;
                }
            }
        }
        true
    }

    fn advance(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let cursor = self.cursor.as_mut().expect("first() must run before next()");
        loop {
            match cursor.next()? {
                None => return Ok(0),
                Some((v1, v2, v3)) => {
                    if !self.matches(v1, v2, v3) {
                        // Leading-column bound values are satisfied by
                        // construction (the cursor started there), but
                        // the other two columns still need checking.
                        continue;
                    }
                    let values = [v1, v2, v3];
                    for i in 0..3 {
                        if let Some(reg) = self.registers[i] {
                            rt.set(reg, Register::Id(values[i]));
                        }
                    }
                    return Ok(1);
                }
            }
        }
    }
}

impl Operator for IndexScan {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.cursor = Some(self.open_cursor()?);
        self.advance(rt)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.advance(rt)
    }
}
