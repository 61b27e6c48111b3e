//! Nested-loop filter: wraps a child operator and re-drives it until
//! a row satisfies a selection predicate. Every join in this engine
//! already produces only matching rows, so `Filter` only ever sits
//! above a scan or a join to apply a `FILTER(...)` clause that isn't
//! expressible as an equi-join key.

use crate::dictionary::Dictionary;
use crate::error::SmallError;
use crate::runtime::Runtime;
use std::sync::Arc;

use super::selection::Predicate;
use super::{Multiplicity, Operator};

pub struct Filter {
    child: Box<dyn Operator>,
    predicate: Predicate,
    dict: Arc<Dictionary>,
}

impl Filter {
    pub fn new(child: Box<dyn Operator>, predicate: Predicate, dict: Arc<Dictionary>) -> Self {
        Self { child, predicate, dict }
    }

    fn skip_to_match(&mut self, rt: &mut Runtime, mut mult: Multiplicity) -> Result<Multiplicity, SmallError> {
        while mult != 0 {
            if self.predicate.eval(rt, &self.dict)?.truthy() {
                return Ok(mult);
            }
            mult = self.child.next(rt)?;
        }
        Ok(0)
    }
}

impl Operator for Filter {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let mult = self.child.first(rt)?;
        self.skip_to_match(rt, mult)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let mult = self.child.next(rt)?;
        self.skip_to_match(rt, mult)
    }
}
