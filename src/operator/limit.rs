//! `OFFSET`/`LIMIT` aren't named operators in the original engine
//! either — like [`super::optional::LeftOuterJoin`], this is a small
//! dedicated operator the code generator splices in only when a query
//! actually asks for a row window, rather than threading skip/take
//! bookkeeping through every other operator.

use crate::error::SmallError;
use crate::runtime::Runtime;

use super::{Multiplicity, Operator};

pub struct Limit {
    child: Box<dyn Operator>,
    skip: u64,
    take: Option<u64>,
    skipped: u64,
    taken: u64,
}

impl Limit {
    pub fn new(child: Box<dyn Operator>, skip: u64, take: Option<u64>) -> Self {
        Self {
            child,
            skip,
            take,
            skipped: 0,
            taken: 0,
        }
    }

    fn exhausted(&self) -> bool {
        matches!(self.take, Some(take) if self.taken >= take)
    }

    fn emit(&mut self, mult: Multiplicity) -> Multiplicity {
        if mult == 0 || self.exhausted() {
            return 0;
        }
        self.taken += 1;
        mult
    }
}

impl Operator for Limit {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.skipped = 0;
        self.taken = 0;
        let mut mult = self.child.first(rt)?;
        while mult != 0 && self.skipped < self.skip {
            self.skipped += 1;
            mult = self.child.next(rt)?;
        }
        Ok(self.emit(mult))
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        if self.exhausted() {
            return Ok(0);
        }
        let mult = self.child.next(rt)?;
        Ok(self.emit(mult))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Register;

    struct Counter {
        next: u32,
        max: u32,
        reg: usize,
    }

    impl Operator for Counter {
        fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
            self.next = 0;
            self.next(rt)
        }
        fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
            if self.next >= self.max {
                return Ok(0);
            }
            rt.set(self.reg, Register::Id(self.next));
            self.next += 1;
            Ok(1)
        }
    }

    #[test]
    fn skips_then_caps_rows() {
        let mut rt = Runtime::new(1);
        let child = Counter { next: 0, max: 10, reg: 0 };
        let mut limit = Limit::new(Box::new(child), 2, Some(3));

        let mut out = Vec::new();
        let mut mult = limit.first(&mut rt).unwrap();
        while mult != 0 {
            out.push(rt.get(0).as_id().unwrap());
            mult = limit.next(&mut rt).unwrap();
        }
        assert_eq!(out, vec![2, 3, 4]);
    }
}
