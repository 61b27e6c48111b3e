//! Group-by: collapses consecutive rows that share a key into one
//! output row per group, the way the aggregated (`v1,v2,count`) and
//! fully-aggregated (`v1,count`) projections collapse duplicate
//! leading columns on disk. Assumes its child already produces rows
//! sorted on `key_registers` — true of any scan or merge join in this
//! engine — so a group is exactly a run of consecutive matching rows,
//! never a full materialize-and-sort.

use crate::error::SmallError;
use crate::runtime::{Register, Runtime};

use super::{Multiplicity, Operator};

#[derive(Debug, Clone, Copy)]
pub enum Aggregate {
    Count,
    Sum(usize),
    Min(usize),
    Max(usize),
}

#[derive(Debug, Clone, Copy)]
enum AccState {
    Count(f64),
    Sum(f64),
    Min(Option<f64>),
    Max(Option<f64>),
}

impl Aggregate {
    fn init(&self) -> AccState {
        match self {
            Aggregate::Count => AccState::Count(0.0),
            Aggregate::Sum(_) => AccState::Sum(0.0),
            Aggregate::Min(_) => AccState::Min(None),
            Aggregate::Max(_) => AccState::Max(None),
        }
    }

    fn accumulate(&self, state: &mut AccState, rt: &Runtime, mult: Multiplicity) {
        match (self, state) {
            (Aggregate::Count, AccState::Count(n)) => *n += mult as f64,
            (Aggregate::Sum(reg), AccState::Sum(n)) => {
                if let Some(v) = rt.get(*reg).as_number() {
                    *n += v * mult as f64;
                }
            }
            (Aggregate::Min(reg), AccState::Min(cur)) => {
                if let Some(v) = rt.get(*reg).as_number() {
                    *cur = Some(cur.map_or(v, |c| c.min(v)));
                }
            }
            (Aggregate::Max(reg), AccState::Max(cur)) => {
                if let Some(v) = rt.get(*reg).as_number() {
                    *cur = Some(cur.map_or(v, |c| c.max(v)));
                }
            }
            _ => unreachable!("aggregate/state kind mismatch"),
        }
    }

    fn finish(&self, state: AccState) -> Register {
        match state {
            AccState::Count(n) => Register::Number(n),
            AccState::Sum(n) => Register::Number(n),
            AccState::Min(v) => v.map(Register::Number).unwrap_or(Register::Unbound),
            AccState::Max(v) => v.map(Register::Number).unwrap_or(Register::Unbound),
        }
    }
}

pub struct GroupBy {
    child: Box<dyn Operator>,
    key_registers: Vec<usize>,
    aggregates: Vec<(Aggregate, usize)>,
    carry: Option<Multiplicity>,
}

impl GroupBy {
    pub fn new(child: Box<dyn Operator>, key_registers: Vec<usize>, aggregates: Vec<(Aggregate, usize)>) -> Self {
        Self {
            child,
            key_registers,
            aggregates,
            carry: None,
        }
    }

    fn snapshot_key(&self, rt: &Runtime) -> Vec<Register> {
        self.key_registers.iter().map(|&r| rt.get(r).clone()).collect()
    }

    fn produce_group(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let mut mult = match self.carry.take() {
            Some(m) => m,
            None => return Ok(0),
        };
        if mult == 0 {
            return Ok(0);
        }

        let key = self.snapshot_key(rt);
        let mut states: Vec<AccState> = self.aggregates.iter().map(|(a, _)| a.init()).collect();

        loop {
            for (state, (agg, _)) in states.iter_mut().zip(&self.aggregates) {
                agg.accumulate(state, rt, mult);
            }
            mult = self.child.next(rt)?;
            if mult == 0 {
                self.carry = Some(0);
                break;
            }
            if self.snapshot_key(rt) != key {
                self.carry = Some(mult);
                break;
            }
        }

        for (&reg, val) in self.key_registers.iter().zip(key) {
            rt.set(reg, val);
        }
        for (state, (agg, out_reg)) in states.into_iter().zip(&self.aggregates) {
            rt.set(*out_reg, agg.finish(state));
        }

        Ok(1)
    }
}

impl Operator for GroupBy {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.carry = Some(self.child.first(rt)?);
        self.produce_group(rt)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.produce_group(rt)
    }
}
