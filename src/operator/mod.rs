//! C7: the operator tree. Every operator follows the Volcano
//! protocol — `first()` positions the operator on its first result row
//! (writing into shared registers through the [`Runtime`]) and returns
//! a multiplicity; `next()` advances to the following row. A
//! multiplicity of `0` means "no more rows" everywhere in this module;
//! above `0` it carries the number of times the differential-adjusted
//! base data repeats the current binding (used by the aggregated
//! projections and by `GroupBy` to skip re-deriving a count).

pub mod filter;
pub mod groupify;
pub mod join;
pub mod limit;
pub mod optional;
pub mod results_printer;
pub mod scan;
pub mod selection;
pub mod sort;
pub mod table_function;
pub mod union;

use crate::error::SmallError;
use crate::runtime::Runtime;

pub type Multiplicity = u32;

/// A scheduling hint a parent passes down before the first `first()`
/// call — e.g. "you are the inner side of a merge join keyed on
/// register 3", letting a scan skip ahead instead of re-scanning from
/// the start for every outer row.
#[derive(Debug, Clone)]
pub enum MergeHint {
    SeekKeyRegister(usize),
}

pub trait Operator {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError>;
    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError>;

    fn add_merge_hint(&mut self, _hint: MergeHint) {}

    /// Child operator indices (positions in some caller-owned arena)
    /// that could be driven concurrently with this one. Only
    /// meaningful for operators with more than one input (joins,
    /// unions); leaf scans return nothing.
    fn get_async_input_candidates(&self) -> Vec<usize> {
        Vec::new()
    }

    #[cfg(debug_assertions)]
    fn print(&self, _rt: &Runtime, _indent: usize) {}
}
