use std::collections::HashMap;

use crate::error::SmallError;
use crate::runtime::{Register, Runtime};

use super::{Multiplicity, Operator};

/// One buffered row from a join's right side: the values of its
/// output columns (in the same order as the join's `right_columns`)
/// plus the multiplicity it was produced with.
type BufferedRow = (Vec<Register>, Multiplicity);

/// Sort-merge equi-join on a single register from each side. Both
/// children must already produce rows in ascending order of their
/// join key — the code generator is responsible for only wiring a
/// `MergeJoin` under inputs it knows are sorted that way, typically two
/// index scans on a shared leading column.
///
/// Handles duplicate keys on either side by buffering the run of right
/// rows that share the current key and replaying it once per matching
/// left row, which is what makes this a correct equi-join rather than
/// a simple zip.
pub struct MergeJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    left_key: usize,
    right_key: usize,
    right_columns: Vec<usize>,
    left_mult: Multiplicity,
    right_mult: Multiplicity,
    right_buffer: Vec<BufferedRow>,
    buffer_pos: usize,
    buffered_key: Option<u32>,
}

impl MergeJoin {
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
            left_mult: 0,
            right_mult: 0,
            right_buffer: Vec::new(),
            buffer_pos: 0,
            buffered_key: None,
        }
    }

    fn apply_row(&self, rt: &mut Runtime, row: &BufferedRow) -> Multiplicity {
        let (vals, right_mult) = row;
        for (&reg, val) in self.right_columns.iter().zip(vals.iter()) {
            rt.set(reg, val.clone());
        }
        self.left_mult * right_mult
    }

    fn build_run(&mut self, rt: &mut Runtime, key: u32) -> Result<(), SmallError> {
        self.right_buffer.clear();
        self.buffer_pos = 0;
        loop {
            if self.right_mult == 0 {
                break;
            }
            let rk = rt
                .get(self.right_key)
                .as_id()
                .expect("merge join key register must be bound");
            if rk != key {
                break;
            }
            let vals: Vec<Register> = self.right_columns.iter().map(|&r| rt.get(r).clone()).collect();
            self.right_buffer.push((vals, self.right_mult));
            self.right_mult = self.right.next(rt)?;
        }
        self.buffered_key = Some(key);
        Ok(())
    }

    fn advance(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        loop {
            if self.buffer_pos < self.right_buffer.len() {
                let row = self.right_buffer[self.buffer_pos].clone();
                self.buffer_pos += 1;
                return Ok(self.apply_row(rt, &row));
            }

            if self.left_mult == 0 {
                return Ok(0);
            }

            let mut left_key = rt
                .get(self.left_key)
                .as_id()
                .expect("merge join key register must be bound");

            if self.buffered_key == Some(left_key) {
                self.buffer_pos = 0;
                continue;
            }

            loop {
                if self.right_mult == 0 {
                    self.buffered_key = None;
                    return Ok(0);
                }
                let right_key = rt
                    .get(self.right_key)
                    .as_id()
                    .expect("merge join key register must be bound");

                if right_key < left_key {
                    self.right_mult = self.right.next(rt)?;
                    continue;
                }
                if right_key > left_key {
                    self.left_mult = self.left.next(rt)?;
                    if self.left_mult == 0 {
                        return Ok(0);
                    }
                    let new_left_key = rt
                        .get(self.left_key)
                        .as_id()
                        .expect("merge join key register must be bound");
                    if new_left_key == left_key {
                        continue;
                    }
                    left_key = new_left_key;
                    break;
                }
                self.build_run(rt, left_key)?;
                break;
            }
        }
    }
}

impl Operator for MergeJoin {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.left_mult = self.left.first(rt)?;
        self.right_mult = self.right.first(rt)?;
        self.right_buffer.clear();
        self.buffer_pos = 0;
        self.buffered_key = None;
        self.advance(rt)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.advance(rt)
    }
}

/// Hash equi-join: materializes the entire right side into an
/// in-memory hash table keyed on `right_key` during `first()`, then
/// probes it once per left row. Used where the code generator can't
/// guarantee both inputs arrive sorted on the join key — typically the
/// build side is the smaller of the two per whatever cardinality
/// estimate the planner had available.
pub struct HashJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    left_key: usize,
    right_key: usize,
    right_columns: Vec<usize>,
    table: HashMap<u32, Vec<BufferedRow>>,
    left_mult: Multiplicity,
    matches: std::vec::IntoIter<BufferedRow>,
}

impl HashJoin {
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
        }
    }

    fn build(&mut self, rt: &mut Runtime) -> Result<(), SmallError> {
        self.table.clear();
        let mut mult = self.right.first(rt)?;
        while mult != 0 {
            let key = rt
                .get(self.right_key)
                .as_id()
                .expect("hash join key register must be bound");
            let vals: Vec<Register> = self.right_columns.iter().map(|&r| rt.get(r).clone()).collect();
            self.table.entry(key).or_default().push((vals, mult));
            mult = self.right.next(rt)?;
        }
        Ok(())
    }

    fn probe(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        loop {
            if let Some((vals, right_mult)) = self.matches.next() {
                for (&reg, val) in self.right_columns.iter().zip(vals.iter()) {
                    rt.set(reg, val.clone());
                }
                return Ok(self.left_mult * right_mult);
            }

            if self.left_mult == 0 {
                return Ok(0);
            }

            let key = rt.get(self.left_key).as_id();
            let rows = key.and_then(|k| self.table.get(&k)).cloned().unwrap_or_default();
            self.matches = rows.into_iter();

            if self.matches.len() == 0 {
                self.left_mult = self.left.next(rt)?;
                continue;
            }
        }
    }
}

impl Operator for HashJoin {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.build(rt)?;
        self.left_mult = self.left.first(rt)?;
        self.matches = Vec::new().into_iter();
        self.probe(rt)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.probe(rt)
    }
}
