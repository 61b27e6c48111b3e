//! Selection predicates: the scalar expression tree a `Filter` operator
//! evaluates against the current row to decide whether it survives.
//! Every node is either a constant, a register read, or a function of
//! its children — there is no separate "statement" form, a predicate
//! is always evaluated for its [`Value`].

use regex::Regex;

use crate::dictionary::Dictionary;
use crate::error::SmallError;
use crate::ids::UNBOUND;
use crate::runtime::Runtime;

/// The result of evaluating a predicate. Mirrors the handful of RDF
/// term kinds a filter expression can actually produce: an interned
/// IRI, a literal with its lexical string materialized (so string
/// functions don't need to round-trip through the dictionary), a
/// boolean, a number, or `Null` when the expression is not well formed
/// for its inputs (comparing an unbound variable, dividing by zero,
/// and so on all produce `Null` rather than an error).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    IRI(u32),
    Literal(String),
    Bool(bool),
    Number(f64),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Literal(s) => !s.is_empty(),
            Value::IRI(id) => *id != UNBOUND,
            Value::Null => false,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Literal(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),

    Equal(Box<Predicate>, Box<Predicate>),
    NotEqual(Box<Predicate>, Box<Predicate>),
    Less(Box<Predicate>, Box<Predicate>),
    LessOrEqual(Box<Predicate>, Box<Predicate>),

    Plus(Box<Predicate>, Box<Predicate>),
    Minus(Box<Predicate>, Box<Predicate>),
    Mul(Box<Predicate>, Box<Predicate>),
    Div(Box<Predicate>, Box<Predicate>),
    Neg(Box<Predicate>),
    UnaryPlus(Box<Predicate>),

    ConstantIRI(u32),
    ConstantLiteral(String),
    /// A constant materialized once during planning (e.g. a bound
    /// query parameter) rather than interned ahead of time. Evaluates
    /// identically to the corresponding `Constant*` variant; kept
    /// distinct only so the code generator can tell the two apart when
    /// deciding whether a register can be reused across executions.
    TemporaryConstantIRI(u32),
    TemporaryConstantLiteral(String),

    VariableRef(usize),

    Str(Box<Predicate>),
    Lang(Box<Predicate>),
    LangMatches(Box<Predicate>, Box<Predicate>),
    Datatype(Box<Predicate>),
    Bound(usize),
    SameTerm(Box<Predicate>, Box<Predicate>),
    IsIRI(Box<Predicate>),
    IsBlank(Box<Predicate>),
    IsLiteral(Box<Predicate>),
    RegEx(Box<Predicate>, Box<Predicate>),
    In(Box<Predicate>, Vec<Predicate>),
    FunctionCall(String, Vec<Predicate>),
}

impl Predicate {
    pub fn eval(&self, rt: &Runtime, dict: &Dictionary) -> Result<Value, SmallError> {
        use Predicate::*;
        Ok(match self {
            And(l, r) => Value::Bool(l.eval(rt, dict)?.truthy() && r.eval(rt, dict)?.truthy()),
            Or(l, r) => Value::Bool(l.eval(rt, dict)?.truthy() || r.eval(rt, dict)?.truthy()),
            Not(p) => Value::Bool(!p.eval(rt, dict)?.truthy()),

            Equal(l, r) => Value::Bool(l.eval(rt, dict)? == r.eval(rt, dict)?),
            NotEqual(l, r) => Value::Bool(l.eval(rt, dict)? != r.eval(rt, dict)?),
            Less(l, r) => match (l.eval(rt, dict)?.as_number(), r.eval(rt, dict)?.as_number()) {
                (Some(a), Some(b)) => Value::Bool(a < b),
                _ => Value::Null,
            },
            LessOrEqual(l, r) => match (l.eval(rt, dict)?.as_number(), r.eval(rt, dict)?.as_number()) {
                (Some(a), Some(b)) => Value::Bool(a <= b),
                _ => Value::Null,
            },

            Plus(l, r) => numeric_op(l, r, rt, dict, |a, b| a + b)?,
            Minus(l, r) => numeric_op(l, r, rt, dict, |a, b| a - b)?,
            Mul(l, r) => numeric_op(l, r, rt, dict, |a, b| a * b)?,
            Div(l, r) => match (l.eval(rt, dict)?.as_number(), r.eval(rt, dict)?.as_number()) {
                (Some(_), Some(b)) if b == 0.0 => Value::Null,
                (Some(a), Some(b)) => Value::Number(a / b),
                _ => Value::Null,
            },
            Neg(p) => match p.eval(rt, dict)?.as_number() {
                Some(n) => Value::Number(-n),
                None => Value::Null,
            },
            UnaryPlus(p) => match p.eval(rt, dict)?.as_number() {
                Some(n) => Value::Number(n),
                None => Value::Null,
            },

            ConstantIRI(id) | TemporaryConstantIRI(id) => Value::IRI(*id),
            ConstantLiteral(s) | TemporaryConstantLiteral(s) => Value::Literal(s.clone()),

            VariableRef(reg) => register_to_value(rt, dict, *reg),

            Str(p) => Value::Literal(lexical_form(&p.eval(rt, dict)?, dict)),
            Lang(p) => {
                let _ = p.eval(rt, dict)?;
                // No language tags are tracked by this dictionary; every
                // literal behaves as if untagged.
                Value::Literal(String::new())
            }
            LangMatches(tag, range) => {
                let tag = lexical_form(&tag.eval(rt, dict)?, dict);
                let range = lexical_form(&range.eval(rt, dict)?, dict);
                Value::Bool(range == "*" || tag.eq_ignore_ascii_case(&range))
            }
            Datatype(p) => Value::Literal(datatype_iri(&p.eval(rt, dict)?).to_string()),
            Bound(reg) => Value::Bool(rt.get(*reg).is_bound()),
            SameTerm(l, r) => Value::Bool(l.eval(rt, dict)? == r.eval(rt, dict)?),
            IsIRI(p) => Value::Bool(matches!(p.eval(rt, dict)?, Value::IRI(id) if !crate::ids::is_blank_node(id))),
            IsBlank(p) => Value::Bool(matches!(p.eval(rt, dict)?, Value::IRI(id) if crate::ids::is_blank_node(id))),
            IsLiteral(p) => Value::Bool(matches!(p.eval(rt, dict)?, Value::Literal(_) | Value::Number(_) | Value::Bool(_))),
            RegEx(text, pattern) => {
                let text = lexical_form(&text.eval(rt, dict)?, dict);
                let pattern = lexical_form(&pattern.eval(rt, dict)?, dict);
                match Regex::new(&pattern) {
                    Ok(re) => Value::Bool(re.is_match(&text)),
                    Err(_) => Value::Null,
                }
            }
            In(needle, haystack) => {
                let needle = needle.eval(rt, dict)?;
                let mut found = false;
                for candidate in haystack {
                    if candidate.eval(rt, dict)? == needle {
                        found = true;
                        break;
                    }
                }
                Value::Bool(found)
            }
            FunctionCall(name, args) => eval_function(name, args, rt, dict)?,
        })
    }
}

fn numeric_op(
    l: &Predicate,
    r: &Predicate,
    rt: &Runtime,
    dict: &Dictionary,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value, SmallError> {
    Ok(match (l.eval(rt, dict)?.as_number(), r.eval(rt, dict)?.as_number()) {
        (Some(a), Some(b)) => Value::Number(op(a, b)),
        _ => Value::Null,
    })
}

fn register_to_value(rt: &Runtime, _dict: &Dictionary, reg: usize) -> Value {
    use crate::runtime::Register;
    match rt.get(reg) {
        Register::Unbound => Value::Null,
        Register::Id(id) => Value::IRI(*id),
        Register::Number(n) => Value::Number(*n),
        Register::Bool(b) => Value::Bool(*b),
    }
}

fn lexical_form(value: &Value, dict: &Dictionary) -> String {
    match value {
        Value::IRI(id) => dict.lookup_string(*id).unwrap_or_default(),
        Value::Literal(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
    }
}

fn datatype_iri(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "http://www.w3.org/2001/XMLSchema#double",
        Value::Bool(_) => "http://www.w3.org/2001/XMLSchema#boolean",
        _ => "http://www.w3.org/2001/XMLSchema#string",
    }
}

fn eval_function(name: &str, args: &[Predicate], rt: &Runtime, dict: &Dictionary) -> Result<Value, SmallError> {
    Ok(match name {
        "STRLEN" => match args.first() {
            Some(p) => Value::Number(lexical_form(&p.eval(rt, dict)?, dict).chars().count() as f64),
            None => Value::Null,
        },
        "UCASE" => match args.first() {
            Some(p) => Value::Literal(lexical_form(&p.eval(rt, dict)?, dict).to_uppercase()),
            None => Value::Null,
        },
        "LCASE" => match args.first() {
            Some(p) => Value::Literal(lexical_form(&p.eval(rt, dict)?, dict).to_lowercase()),
            None => Value::Null,
        },
        "CONTAINS" => match (args.first(), args.get(1)) {
            (Some(h), Some(n)) => Value::Bool(
                lexical_form(&h.eval(rt, dict)?, dict).contains(&lexical_form(&n.eval(rt, dict)?, dict)),
            ),
            _ => Value::Null,
        },
        _ => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Register, Runtime};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fresh_dict() -> (tempfile::TempDir, Dictionary) {
        let dir = tempdir().unwrap();
        let log = Arc::new(crate::page::PagedFile::open(dir.path().join("dict.log")).unwrap());
        let dict = Dictionary::create(log).unwrap();
        (dir, dict)
    }

    #[test]
    fn bound_reflects_register_state() {
        let mut rt = Runtime::new(1);
        let (_dir, dict) = fresh_dict();
        assert_eq!(Predicate::Bound(0).eval(&rt, &dict).unwrap(), Value::Bool(false));
        rt.set(0, Register::Id(5));
        assert_eq!(Predicate::Bound(0).eval(&rt, &dict).unwrap(), Value::Bool(true));
    }

    #[test]
    fn arithmetic_short_circuits_to_null_on_non_numeric() {
        let rt = Runtime::new(1);
        let (_dir, dict) = fresh_dict();
        let pred = Predicate::Plus(
            Box::new(Predicate::ConstantLiteral("abc".into())),
            Box::new(Predicate::ConstantLiteral("3".into())),
        );
        assert_eq!(pred.eval(&rt, &dict).unwrap(), Value::Null);
    }

    #[test]
    fn in_predicate_matches_any_branch() {
        let rt = Runtime::new(1);
        let (_dir, dict) = fresh_dict();
        let pred = Predicate::In(
            Box::new(Predicate::ConstantIRI(7)),
            vec![Predicate::ConstantIRI(1), Predicate::ConstantIRI(7)],
        );
        assert_eq!(pred.eval(&rt, &dict).unwrap(), Value::Bool(true));
    }
}
