//! `OPTIONAL` isn't one of the original engine's named operators — it
//! splices a left outer join into whatever path/merge-join machinery
//! the original planner had on hand. This crate has no path operator
//! (explicitly out of scope), so `OPTIONAL` gets its own small
//! dedicated operator instead of being spliced into `MergeJoin`: a
//! nested-loop left outer join that materializes the optional side
//! once, keyed on the shared variable, and falls back to unbound
//! columns when a left row has no match.

use std::collections::HashMap;

use crate::error::SmallError;
use crate::runtime::{Register, Runtime};

use super::{Multiplicity, Operator};

type BufferedRow = (Vec<Register>, Multiplicity);

pub struct LeftOuterJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    left_key: usize,
    right_key: usize,
    right_columns: Vec<usize>,
    table: HashMap<u32, Vec<BufferedRow>>,
    left_mult: Multiplicity,
    matches: std::vec::IntoIter<BufferedRow>,
    matched_any: bool,
}

impl LeftOuterJoin {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        left_key: usize,
        right_key: usize,
        right_columns: Vec<usize>,
    ) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            right_columns,
            table: HashMap::new(),
            left_mult: 0,
            matches: Vec::new().into_iter(),
            matched_any: false,
        }
    }

    fn build(&mut self, rt: &mut Runtime) -> Result<(), SmallError> {
        self.table.clear();
        let mut mult = self.right.first(rt)?;
        while mult != 0 {
            let key = rt.get(self.right_key).as_id();
            if let Some(key) = key {
                let vals: Vec<Register> = self.right_columns.iter().map(|&r| rt.get(r).clone()).collect();
                self.table.entry(key).or_default().push((vals, mult));
            }
            mult = self.right.next(rt)?;
        }
        Ok(())
    }

    fn probe(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        loop {
            if self.left_mult == 0 {
                return Ok(0);
            }

            if let Some((vals, right_mult)) = self.matches.next() {
                for (&reg, val) in self.right_columns.iter().zip(vals.iter()) {
                    rt.set(reg, val.clone());
                }
                self.matched_any = true;
                return Ok(self.left_mult * right_mult);
            }

            if !self.matched_any {
                for &reg in &self.right_columns {
                    rt.set(reg, Register::Unbound);
                }
                self.matched_any = true;
                return Ok(self.left_mult);
            }

            self.left_mult = self.left.next(rt)?;
            if self.left_mult == 0 {
                return Ok(0);
            }
            let key = rt.get(self.left_key).as_id();
            let rows = key.and_then(|k| self.table.get(&k)).cloned().unwrap_or_default();
            self.matches = rows.into_iter();
            self.matched_any = false;
        }
    }
}

impl Operator for LeftOuterJoin {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.build(rt)?;
        self.left_mult = self.left.first(rt)?;
        self.matches = Vec::new().into_iter();
        self.matched_any = false;
        self.probe(rt)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.probe(rt)
    }
}
