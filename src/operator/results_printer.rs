//! The root of every executed query: pulls rows through the tree below
//! it and renders each one's output registers as dictionary-decoded
//! text, tab-separated. How a row's multiplicity turns into printed
//! lines depends on the query's [`DuplicatePolicy`] — everything else
//! about the driving loop (`first()` then `next()` until multiplicity
//! `0`) is the same as every other operator.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use crate::dictionary::Dictionary;
use crate::error::SmallError;
use crate::query::plan::DuplicatePolicy;
use crate::runtime::{Register, Runtime};

use super::{Multiplicity, Operator};

pub struct ResultsPrinter<W: Write> {
    child: Box<dyn Operator>,
    registers: Vec<usize>,
    dict: Arc<Dictionary>,
    duplicates: DuplicatePolicy,
    /// Decoded-string cache keyed by dictionary id, so a value repeated
    /// across many rows isn't looked up in the dictionary every time.
    cache: HashMap<u32, String>,
    out: W,
}

impl<W: Write> ResultsPrinter<W> {
    pub fn new(
        child: Box<dyn Operator>,
        registers: Vec<usize>,
        dict: Arc<Dictionary>,
        duplicates: DuplicatePolicy,
        out: W,
    ) -> Self {
        Self {
            child,
            registers,
            dict,
            duplicates,
            cache: HashMap::new(),
            out,
        }
    }

    fn render(&mut self, reg: &Register) -> String {
        match reg {
            Register::Unbound => String::new(),
            Register::Id(id) => self
                .cache
                .entry(*id)
                .or_insert_with(|| self.dict.lookup_string(*id).unwrap_or_default())
                .clone(),
            Register::Number(n) => n.to_string(),
            Register::Bool(b) => b.to_string(),
        }
    }

    fn row_fields(&mut self, rt: &Runtime) -> Vec<String> {
        let registers = self.registers.clone();
        registers.iter().map(|&r| self.render(rt.get(r))).collect()
    }

    /// Render and print one row according to the policy in force.
    /// `mult` is the multiplicity the child operator just reported for
    /// this row.
    fn print_row(&mut self, rt: &Runtime, mult: Multiplicity) -> Result<(), SmallError> {
        let fields = self.row_fields(rt);
        let line = fields.join("\t");
        match self.duplicates {
            DuplicatePolicy::ExpandDuplicates => {
                for _ in 0..mult {
                    writeln!(self.out, "{}", line)?;
                }
            }
            DuplicatePolicy::CountDuplicates => {
                writeln!(self.out, "{}\tx{}", line, mult)?;
            }
            DuplicatePolicy::ShowDuplicates => {
                writeln!(self.out, "{}\t{}", mult, line)?;
            }
            DuplicatePolicy::ReduceDuplicates | DuplicatePolicy::NoDuplicates => {
                writeln!(self.out, "{}", line)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> Operator for ResultsPrinter<W> {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let mult = self.child.first(rt)?;
        if mult != 0 {
            self.print_row(rt, mult)?;
        }
        Ok(mult)
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let mult = self.child.next(rt)?;
        if mult != 0 {
            self.print_row(rt, mult)?;
        }
        Ok(mult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct OneRow {
        reg: usize,
        value: u32,
        done: bool,
    }

    impl Operator for OneRow {
        fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
            self.done = false;
            self.next(rt)
        }
        fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
            if self.done {
                return Ok(0);
            }
            rt.set(self.reg, Register::Id(self.value));
            self.done = true;
            Ok(1)
        }
    }

    #[test]
    fn prints_decoded_value_tab_separated() {
        let dir = tempdir().unwrap();
        let log = Arc::new(crate::page::PagedFile::open(dir.path().join("d.log")).unwrap());
        let dict = Arc::new(Dictionary::create(log).unwrap());
        let id = dict.intern("http://example.org/alice").unwrap();

        let mut rt = Runtime::new(1);
        let child = OneRow { reg: 0, value: id, done: false };
        let mut out = Vec::new();
        let mut printer = ResultsPrinter::new(
            Box::new(child),
            vec![0],
            dict,
            DuplicatePolicy::ExpandDuplicates,
            &mut out,
        );

        let mult = printer.first(&mut rt).unwrap();
        assert_eq!(mult, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "http://example.org/alice\n");
    }
}
