//! Table functions: operators that expand each input row into zero or
//! more output rows by calling a plain Rust function on one of the
//! row's bound values. `splitIRI` is the one this engine ships —
//! breaking an IRI into its namespace and local name is common enough
//! in query workloads that doing it once per row beats a `FILTER` plus
//! string-function gymnastics.

use std::sync::Arc;

use crate::dictionary::Dictionary;
use crate::error::SmallError;
use crate::runtime::{Register, Runtime};

use super::{Multiplicity, Operator};

/// Splits `iri` at its last `#` or `/`, the boundary most vocabularies
/// use between namespace and local name. An IRI with neither separator
/// is returned whole as the local name with an empty namespace.
pub fn split_iri(iri: &str) -> (String, String) {
    match iri.rfind(|c| c == '#' || c == '/') {
        Some(i) => (iri[..=i].to_string(), iri[i + 1..].to_string()),
        None => (String::new(), iri.to_string()),
    }
}

pub struct SplitIriFunction {
    child: Box<dyn Operator>,
    input_register: usize,
    namespace_register: usize,
    local_register: usize,
    dict: Arc<Dictionary>,
    child_mult: Multiplicity,
    produced: bool,
}

impl SplitIriFunction {
    pub fn new(
        child: Box<dyn Operator>,
        input_register: usize,
        namespace_register: usize,
        local_register: usize,
        dict: Arc<Dictionary>,
    ) -> Self {
        Self {
            child,
            input_register,
            namespace_register,
            local_register,
            dict,
            child_mult: 0,
            produced: true,
        }
    }

    /// Emit the (single) output row for the current child row, skipping
    /// ahead to the next child row whenever the current one's input
    /// register doesn't resolve to an interned string.
    fn advance(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        loop {
            if self.child_mult == 0 {
                return Ok(0);
            }
            if self.produced {
                self.child_mult = self.child.next(rt)?;
                if self.child_mult == 0 {
                    return Ok(0);
                }
            }
            self.produced = true;

            let id = rt.get(self.input_register).as_id();
            let iri = id.and_then(|id| self.dict.lookup_string(id));
            match iri {
                Some(iri) => {
                    let (ns, local) = split_iri(&iri);
                    let ns_id = self.dict.intern(&ns)?;
                    let local_id = self.dict.intern(&local)?;
                    rt.set(self.namespace_register, Register::Id(ns_id));
                    rt.set(self.local_register, Register::Id(local_id));
                    return Ok(self.child_mult);
                }
                None => continue,
            }
        }
    }
}

impl Operator for SplitIriFunction {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.child_mult = self.child.first(rt)?;
        if self.child_mult == 0 {
            return Ok(0);
        }
        self.produced = false;
        self.advance(rt)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        self.advance(rt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_last_hash_or_slash() {
        assert_eq!(
            split_iri("http://example.org/ns#Person"),
            ("http://example.org/ns#".to_string(), "Person".to_string())
        );
        assert_eq!(
            split_iri("http://example.org/path/leaf"),
            ("http://example.org/path/".to_string(), "leaf".to_string())
        );
        assert_eq!(split_iri("nowhere"), (String::new(), "nowhere".to_string()));
    }
}
