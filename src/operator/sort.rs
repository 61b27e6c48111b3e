//! Sort: the one operator in this tree that must materialize its
//! entire input before producing a row, used wherever the code
//! generator couldn't route a query through an index order that
//! already matches an `ORDER BY` clause.

use std::cmp::Ordering;

use crate::error::SmallError;
use crate::runtime::{Register, Runtime};

use super::{Multiplicity, Operator};

fn compare_registers(a: &Register, b: &Register) -> Ordering {
    fn rank(r: &Register) -> u8 {
        match r {
            Register::Unbound => 0,
            Register::Id(_) => 1,
            Register::Number(_) => 2,
            Register::Bool(_) => 3,
        }
    }
    match (a, b) {
        (Register::Id(x), Register::Id(y)) => x.cmp(y),
        (Register::Number(x), Register::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Register::Bool(x), Register::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

pub struct Sort {
    child: Box<dyn Operator>,
    /// Each key is a register plus whether it sorts descending —
    /// `ORDER BY ... DESC` only negates its own key, not the whole row.
    sort_registers: Vec<(usize, bool)>,
    project_registers: Vec<usize>,
    rows: Vec<(Vec<Register>, Multiplicity)>,
    pos: usize,
}

impl Sort {
    pub fn new(child: Box<dyn Operator>, sort_registers: Vec<(usize, bool)>, project_registers: Vec<usize>) -> Self {
        Self {
            child,
            sort_registers,
            project_registers,
            rows: Vec::new(),
            pos: 0,
        }
    }

    fn materialize(&mut self, rt: &mut Runtime) -> Result<(), SmallError> {
        self.rows.clear();
        let mut mult = self.child.first(rt)?;
        while mult != 0 {
            let vals: Vec<Register> = self.project_registers.iter().map(|&r| rt.get(r).clone()).collect();
            self.rows.push((vals, mult));
            mult = self.child.next(rt)?;
        }

        let key_positions: Vec<(usize, bool)> = self
            .sort_registers
            .iter()
            .map(|&(sr, desc)| {
                let pos = self
                    .project_registers
                    .iter()
                    .position(|r| *r == sr)
                    .expect("sort register must be one of the projected columns");
                (pos, desc)
            })
            .collect();

        self.rows.sort_by(|a, b| {
            for &(pos, desc) in &key_positions {
                let ord = compare_registers(&a.0[pos], &b.0[pos]);
                let ord = if desc { ord.reverse() } else { ord };
                match ord {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        });
        self.pos = 0;
        Ok(())
    }

    fn emit(&mut self, rt: &mut Runtime) -> Multiplicity {
        if self.pos >= self.rows.len() {
            return 0;
        }
        let (vals, mult) = self.rows[self.pos].clone();
        self.pos += 1;
        for (&reg, val) in self.project_registers.iter().zip(vals) {
            rt.set(reg, val);
        }
        mult
    }
}

impl Operator for Sort {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.materialize(rt)?;
        Ok(self.emit(rt))
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        Ok(self.emit(rt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixtureScan {
        rows: Vec<(u32, u32)>,
        pos: usize,
        reg_a: usize,
        reg_b: usize,
    }

    impl Operator for FixtureScan {
        fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
            self.pos = 0;
            self.emit(rt)
        }

        fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
            self.emit(rt)
        }
    }

    impl FixtureScan {
        fn emit(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
            if self.pos >= self.rows.len() {
                return Ok(0);
            }
            let (a, b) = self.rows[self.pos];
            self.pos += 1;
            rt.set(self.reg_a, Register::Id(a));
            rt.set(self.reg_b, Register::Id(b));
            Ok(1)
        }
    }

    #[test]
    fn sorts_rows_ascending_on_key_register() {
        let mut rt = Runtime::new(2);
        let child = FixtureScan {
            rows: vec![(3, 30), (1, 10), (2, 20)],
            pos: 0,
            reg_a: 0,
            reg_b: 1,
        };
        let mut sort = Sort::new(Box::new(child), vec![(0, false)], vec![0, 1]);

        let mut out = Vec::new();
        let mut mult = sort.first(&mut rt).unwrap();
        while mult != 0 {
            out.push(rt.get(0).as_id().unwrap());
            mult = sort.next(&mut rt).unwrap();
        }
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn descending_key_reverses_order() {
        let mut rt = Runtime::new(2);
        let child = FixtureScan {
            rows: vec![(3, 30), (1, 10), (2, 20)],
            pos: 0,
            reg_a: 0,
            reg_b: 1,
        };
        let mut sort = Sort::new(Box::new(child), vec![(0, true)], vec![0, 1]);

        let mut out = Vec::new();
        let mut mult = sort.first(&mut rt).unwrap();
        while mult != 0 {
            out.push(rt.get(0).as_id().unwrap());
            mult = sort.next(&mut rt).unwrap();
        }
        assert_eq!(out, vec![3, 2, 1]);
    }
}
