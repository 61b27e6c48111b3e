//! C9: the code generator. Lowers a [`crate::query::plan::Plan`] (still
//! addressed by variable name) into a runnable operator tree addressed
//! by register index, allocating a fresh register for every new
//! variable binding it meets.
//!
//! Each [`translate`](Codegen::translate) call returns bindings LOCAL
//! to the subtree it just built rather than mutating one global map:
//! two sibling scans of the same variable name must not be forced to
//! share a register (`IndexScan`'s `bound` array only encodes
//! compile-time constants, not "equal to whatever some other scan
//! wrote"), so cross-branch equality is always enforced by a join
//! operator comparing two independently-allocated registers, or — for
//! a variable repeated within one triple pattern — a `Filter` wrapped
//! directly around the scan that produced both occurrences.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dictionary::Dictionary;
use crate::differential::DifferentialIndex;
use crate::error::SmallError;
use crate::facts::FactsStore;
use crate::ids::{Order, ALL_ORDERS};
use crate::operator::selection::Predicate;
use crate::operator::{filter, join, limit, optional, scan, sort, union};
use crate::operator::{Multiplicity, Operator};
use crate::query::expr::Expr;
use crate::query::graph::{Term, TriplePattern};
use crate::query::plan::{DuplicatePolicy, Plan, PlanNode};
use crate::runtime::{Register, Runtime};

pub struct CompiledQuery {
    pub operator: Box<dyn Operator>,
    pub register_count: usize,
    pub output_registers: Vec<usize>,
    pub output_names: Vec<String>,
    pub duplicates: DuplicatePolicy,
}

pub fn compile(
    plan: &Plan,
    facts: Arc<FactsStore>,
    diff: Arc<DifferentialIndex>,
    dict: Arc<Dictionary>,
) -> Result<CompiledQuery, SmallError> {
    let mut cg = Codegen {
        facts,
        diff,
        dict,
        next_register: 0,
        void: None,
    };
    let (mut op, bindings) = cg.translate(&plan.root)?;

    let output_names: Vec<String> = match &plan.projection {
        crate::query::graph::Projection::All => {
            let mut vars: Vec<String> = bindings.keys().cloned().collect();
            vars.sort();
            vars
        }
        crate::query::graph::Projection::Vars(vars) => vars.clone(),
    };
    let mut output_registers = Vec::with_capacity(output_names.len());
    for name in &output_names {
        let reg = *bindings
            .get(name)
            .ok_or_else(|| SmallError::semantic(format!("SELECT references unbound variable '{}'", name)))?;
        output_registers.push(reg);
    }

    if !plan.order_by.is_empty() {
        let mut project_registers = output_registers.clone();
        let mut sort_keys = Vec::with_capacity(plan.order_by.len());
        for key in &plan.order_by {
            let reg = *bindings
                .get(&key.variable)
                .ok_or_else(|| SmallError::semantic(format!("ORDER BY references unbound variable '{}'", key.variable)))?;
            if !project_registers.contains(&reg) {
                project_registers.push(reg);
            }
            sort_keys.push((reg, key.descending));
        }
        op = Box::new(sort::Sort::new(op, sort_keys, project_registers));
    }

    if plan.offset.is_some() || plan.limit.is_some() {
        op = Box::new(limit::Limit::new(op, plan.offset.unwrap_or(0), plan.limit));
    }

    Ok(CompiledQuery {
        operator: op,
        register_count: cg.next_register,
        output_registers,
        output_names,
        duplicates: plan.duplicates,
    })
}

struct Codegen {
    facts: Arc<FactsStore>,
    diff: Arc<DifferentialIndex>,
    dict: Arc<Dictionary>,
    next_register: usize,
    void: Option<usize>,
}

type Bindings = HashMap<String, usize>;

impl Codegen {
    fn alloc(&mut self) -> usize {
        let r = self.next_register;
        self.next_register += 1;
        r
    }

    /// A register nothing ever writes to — stands in for "this
    /// variable doesn't exist on this branch" in a `UNION`'s column
    /// list, always reading back as `Register::Unbound`.
    fn void_register(&mut self) -> usize {
        if let Some(r) = self.void {
            return r;
        }
        let r = self.alloc();
        self.void = Some(r);
        r
    }

    fn translate(&mut self, node: &PlanNode) -> Result<(Box<dyn Operator>, Bindings), SmallError> {
        match node {
            PlanNode::Scan(pattern) => self.translate_scan(pattern),
            PlanNode::MergeJoin(left, right, key_var) => self.translate_join(left, right, key_var, true),
            PlanNode::HashJoin(left, right, key_var) => self.translate_join(left, right, key_var, false),
            PlanNode::Union(left, right) => self.translate_union(left, right),
            PlanNode::Optional(required, optional_branch) => self.translate_optional(required, optional_branch),
            PlanNode::Filter(inner, expr) => {
                let (inner_op, bindings) = self.translate(inner)?;
                let predicate = lower_expr(expr, &bindings, &self.dict)?;
                Ok((Box::new(filter::Filter::new(inner_op, predicate, self.dict.clone())), bindings))
            }
        }
    }

    fn translate_scan(&mut self, pattern: &TriplePattern) -> Result<(Box<dyn Operator>, Bindings), SmallError> {
        let order = choose_order(pattern);
        let roles = roles_for(order);

        let mut registers: [Option<usize>; 3] = [None, None, None];
        let mut bound: [Option<u32>; 3] = [None, None, None];
        let mut bindings = Bindings::new();
        let mut equalities: Vec<(usize, usize)> = Vec::new();

        for (i, &role) in roles.iter().enumerate() {
            match term_for_role(pattern, role) {
                Term::IRI(iri) => bound[i] = Some(self.dict.intern(iri)?),
                Term::Literal(lit) => bound[i] = Some(self.dict.intern(lit)?),
                Term::Wildcard => {}
                Term::Variable(name) => {
                    if let Some(&existing) = bindings.get(name) {
                        let fresh = self.alloc();
                        registers[i] = Some(fresh);
                        equalities.push((existing, fresh));
                    } else {
                        let fresh = self.alloc();
                        registers[i] = Some(fresh);
                        bindings.insert(name.clone(), fresh);
                    }
                }
            }
        }

        let mut op: Box<dyn Operator> =
            Box::new(scan::IndexScan::new(order, registers, bound, self.facts.clone(), self.diff.clone()));
        for (a, b) in equalities {
            let predicate = Predicate::Equal(
                Box::new(Predicate::VariableRef(a)),
                Box::new(Predicate::VariableRef(b)),
            );
            op = Box::new(filter::Filter::new(op, predicate, self.dict.clone()));
        }
        Ok((op, bindings))
    }

    fn translate_join(
        &mut self,
        left: &PlanNode,
        right: &PlanNode,
        key_var: &str,
        merge: bool,
    ) -> Result<(Box<dyn Operator>, Bindings), SmallError> {
        let (mut left_op, left_bindings) = self.translate(left)?;
        let (mut right_op, right_bindings) = self.translate(right)?;

        let (left_key, right_key) = if key_var.is_empty() {
            // No shared variable: tag both sides with the same constant
            // in a dedicated register so the join degenerates into a
            // Cartesian product instead of an equi-join.
            let tag = self.alloc();
            left_op = Box::new(TagConstant::new(left_op, tag));
            right_op = Box::new(TagConstant::new(right_op, tag));
            (tag, tag)
        } else {
            let lk = *left_bindings
                .get(key_var)
                .ok_or_else(|| SmallError::plan(format!("join key '{}' not bound on left side", key_var)))?;
            let rk = *right_bindings
                .get(key_var)
                .ok_or_else(|| SmallError::plan(format!("join key '{}' not bound on right side", key_var)))?;
            (lk, rk)
        };

        let right_columns: Vec<usize> = right_bindings.values().copied().collect();

        let mut merged = left_bindings;
        let mut extra_filters = Vec::new();
        for (name, &rreg) in &right_bindings {
            if name == key_var {
                continue;
            }
            match merged.get(name) {
                Some(&lreg) if lreg != rreg => extra_filters.push(Predicate::Equal(
                    Box::new(Predicate::VariableRef(lreg)),
                    Box::new(Predicate::VariableRef(rreg)),
                )),
                Some(_) => {}
                None => {
                    merged.insert(name.clone(), rreg);
                }
            }
        }

        let mut joined: Box<dyn Operator> = if merge && !key_var.is_empty() {
            Box::new(join::MergeJoin::new(left_op, right_op, left_key, right_key, right_columns))
        } else {
            Box::new(join::HashJoin::new(left_op, right_op, left_key, right_key, right_columns))
        };
        for predicate in extra_filters {
            joined = Box::new(filter::Filter::new(joined, predicate, self.dict.clone()));
        }
        Ok((joined, merged))
    }

    fn translate_union(&mut self, left: &PlanNode, right: &PlanNode) -> Result<(Box<dyn Operator>, Bindings), SmallError> {
        let (left_op, left_bindings) = self.translate(left)?;
        let (right_op, right_bindings) = self.translate(right)?;

        let mut names: Vec<String> = left_bindings.keys().cloned().collect();
        for name in right_bindings.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();

        let void = self.void_register();
        let mut columns = Vec::with_capacity(names.len());
        let mut merged = Bindings::new();
        for name in &names {
            let left_register = left_bindings.get(name).copied().unwrap_or(void);
            let right_register = right_bindings.get(name).copied().unwrap_or(void);
            let output_register = self.alloc();
            columns.push(union::UnionColumn {
                left_register,
                right_register,
                output_register,
            });
            merged.insert(name.clone(), output_register);
        }

        Ok((Box::new(union::MergeUnion::new(left_op, right_op, columns)), merged))
    }

    fn translate_optional(
        &mut self,
        required: &PlanNode,
        optional_branch: &PlanNode,
    ) -> Result<(Box<dyn Operator>, Bindings), SmallError> {
        let (required_op, required_bindings) = self.translate(required)?;
        let (optional_op, optional_bindings) = self.translate(optional_branch)?;

        let shared = required_bindings.keys().find(|k| optional_bindings.contains_key(*k)).cloned();
        match shared {
            // Nothing to correlate the optional branch on — it can
            // never contribute a binding back, so it's dropped rather
            // than run as an unconstrained Cartesian probe.
            None => Ok((required_op, required_bindings)),
            Some(key_var) => {
                let left_key = required_bindings[&key_var];
                let right_key = optional_bindings[&key_var];
                let right_columns: Vec<usize> = optional_bindings.values().copied().collect();

                let mut merged = required_bindings;
                for (name, &reg) in &optional_bindings {
                    merged.entry(name.clone()).or_insert(reg);
                }

                Ok((
                    Box::new(optional::LeftOuterJoin::new(required_op, optional_op, left_key, right_key, right_columns)),
                    merged,
                ))
            }
        }
    }
}

/// Splices a constant into a dedicated register after every row a
/// child produces — the plumbing behind an equi-join wired as a
/// Cartesian product (see [`Codegen::translate_join`]'s empty-key-var
/// branch). Not a relational operator in its own right, so it lives
/// here rather than under `operator/`.
struct TagConstant {
    child: Box<dyn Operator>,
    register: usize,
}

impl TagConstant {
    fn new(child: Box<dyn Operator>, register: usize) -> Self {
        Self { child, register }
    }

    fn tag(&mut self, rt: &mut Runtime, mult: Multiplicity) -> Multiplicity {
        if mult != 0 {
            rt.set(self.register, Register::Id(0));
        }
        mult
    }
}

impl Operator for TagConstant {
    fn first(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let mult = self.child.first(rt)?;
        Ok(self.tag(rt, mult))
    }

    fn next(&mut self, rt: &mut Runtime) -> Result<Multiplicity, SmallError> {
        let mult = self.child.next(rt)?;
        Ok(self.tag(rt, mult))
    }
}

fn roles_for(order: Order) -> [char; 3] {
    match order {
        Order::Spo => ['s', 'p', 'o'],
        Order::Sop => ['s', 'o', 'p'],
        Order::Pso => ['p', 's', 'o'],
        Order::Pos => ['p', 'o', 's'],
        Order::Osp => ['o', 's', 'p'],
        Order::Ops => ['o', 'p', 's'],
    }
}

fn term_for_role(pattern: &TriplePattern, role: char) -> &Term {
    match role {
        's' => &pattern.s,
        'p' => &pattern.p,
        'o' => &pattern.o,
        _ => unreachable!("role is always one of s/p/o"),
    }
}

fn is_constant(term: &Term) -> bool {
    matches!(term, Term::IRI(_) | Term::Literal(_))
}

/// Pick the permutation whose natural column order has the longest
/// prefix of constant (already-known) values for this pattern, so the
/// scan can seek straight to its first matching row instead of
/// filtering every row in the segment.
fn choose_order(pattern: &TriplePattern) -> Order {
    let mut best = ALL_ORDERS[0];
    let mut best_score = -1i32;
    for &order in &ALL_ORDERS {
        let mut score = 0;
        for role in roles_for(order) {
            if is_constant(term_for_role(pattern, role)) {
                score += 1;
            } else {
                break;
            }
        }
        if score > best_score {
            best_score = score;
            best = order;
        }
    }
    best
}

fn lower_expr(expr: &Expr, bindings: &Bindings, dict: &Dictionary) -> Result<Predicate, SmallError> {
    let lookup = |name: &str| -> Result<usize, SmallError> {
        bindings
            .get(name)
            .copied()
            .ok_or_else(|| SmallError::semantic(format!("FILTER references unbound variable '{}'", name)))
    };

    Ok(match expr {
        Expr::And(l, r) => Predicate::And(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::Or(l, r) => Predicate::Or(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::Not(p) => Predicate::Not(Box::new(lower_expr(p, bindings, dict)?)),

        Expr::Equal(l, r) => Predicate::Equal(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::NotEqual(l, r) => Predicate::NotEqual(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::Less(l, r) => Predicate::Less(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::LessOrEqual(l, r) => {
            Predicate::LessOrEqual(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?))
        }

        Expr::Plus(l, r) => Predicate::Plus(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::Minus(l, r) => Predicate::Minus(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::Mul(l, r) => Predicate::Mul(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::Div(l, r) => Predicate::Div(Box::new(lower_expr(l, bindings, dict)?), Box::new(lower_expr(r, bindings, dict)?)),
        Expr::Neg(p) => Predicate::Neg(Box::new(lower_expr(p, bindings, dict)?)),

        Expr::Bound(name) => Predicate::Bound(lookup(name)?),
        Expr::IsIRI(p) => Predicate::IsIRI(Box::new(lower_expr(p, bindings, dict)?)),
        Expr::Str(p) => Predicate::Str(Box::new(lower_expr(p, bindings, dict)?)),

        Expr::Variable(name) => Predicate::VariableRef(lookup(name)?),
        Expr::NumberLiteral(n) => Predicate::ConstantLiteral(n.to_string()),
        Expr::IRILiteral(iri) => Predicate::ConstantIRI(dict.intern(iri)?),
        Expr::StringLiteral(s) => Predicate::ConstantLiteral(s.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::graph::{GraphNode, OrderKey, Projection, QueryGraph, Term as GraphTerm};
    use crate::query::planner::build_plan;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn empty_store() -> (Arc<FactsStore>, Arc<DifferentialIndex>, Arc<Dictionary>, tempfile::TempDir) {
        use crate::buffer_pool::{BufferPool, SegmentId};
        use crate::facts::AGGREGATE_ORDERS;
        use crate::page::PagedFile;

        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPool::new());
        for &order in &ALL_ORDERS {
            let file = Arc::new(PagedFile::open(dir.path().join(format!("perm_{}.dat", order))).unwrap());
            pool.register_segment(SegmentId::Permutation(order), file);
        }
        for &order in &AGGREGATE_ORDERS {
            let afile = Arc::new(PagedFile::open(dir.path().join(format!("agg_{}.dat", order))).unwrap());
            pool.register_segment(SegmentId::Aggregated(order), afile);
            let ffile = Arc::new(PagedFile::open(dir.path().join(format!("fagg_{}.dat", order))).unwrap());
            pool.register_segment(SegmentId::FullyAggregated(order), ffile);
        }
        let facts = Arc::new(FactsStore::create(pool).unwrap());
        let diff = Arc::new(DifferentialIndex::new());
        let log = Arc::new(PagedFile::open(dir.path().join("dict.log")).unwrap());
        let dict = Arc::new(Dictionary::create(log).unwrap());
        (facts, diff, dict, dir)
    }

    fn query_graph(where_clause: GraphNode, projection: Projection) -> QueryGraph {
        QueryGraph {
            prefixes: StdHashMap::new(),
            projection,
            where_clause,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    #[test]
    fn compiles_single_pattern_scan() {
        let (facts, diff, dict, _dir) = empty_store();
        let pattern = TriplePattern {
            s: GraphTerm::Variable("x".into()),
            p: GraphTerm::IRI("http://ex/knows".into()),
            o: GraphTerm::Variable("y".into()),
        };
        let graph = query_graph(GraphNode::Triples(vec![pattern]), Projection::Vars(vec!["x".into(), "y".into()]));
        let plan = build_plan(&graph).unwrap();
        let compiled = compile(&plan, facts, diff, dict).unwrap();
        assert_eq!(compiled.output_names, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(compiled.output_registers.len(), 2);
        assert!(compiled.register_count >= 2);
    }

    #[test]
    fn runs_three_triple_conjunction_end_to_end() {
        let (facts, diff, dict, _dir) = empty_store();
        let alice = dict.intern("http://ex/alice").unwrap();
        let knows = dict.intern("http://ex/knows").unwrap();
        let bob = dict.intern("http://ex/bob").unwrap();
        let age = dict.intern("http://ex/age").unwrap();
        let thirty = dict.intern("30").unwrap();
        facts.insert(crate::ids::Triple::new(alice, knows, bob)).unwrap();
        facts.insert(crate::ids::Triple::new(bob, age, thirty)).unwrap();

        let p1 = TriplePattern {
            s: GraphTerm::IRI("http://ex/alice".into()),
            p: GraphTerm::IRI("http://ex/knows".into()),
            o: GraphTerm::Variable("friend".into()),
        };
        let p2 = TriplePattern {
            s: GraphTerm::Variable("friend".into()),
            p: GraphTerm::IRI("http://ex/age".into()),
            o: GraphTerm::Variable("age".into()),
        };
        let graph = query_graph(
            GraphNode::Triples(vec![p1, p2]),
            Projection::Vars(vec!["friend".into(), "age".into()]),
        );
        let plan = build_plan(&graph).unwrap();
        let compiled = compile(&plan, facts, diff, dict.clone()).unwrap();

        let mut rt = Runtime::new(compiled.register_count);
        let mut op = compiled.operator;
        let mult = op.first(&mut rt).unwrap();
        assert_eq!(mult, 1);
        let friend_id = rt.get(compiled.output_registers[0]).as_id().unwrap();
        assert_eq!(dict.lookup_string(friend_id).unwrap(), "http://ex/bob");
        let age_id = rt.get(compiled.output_registers[1]).as_id().unwrap();
        assert_eq!(dict.lookup_string(age_id).unwrap(), "30");
        assert_eq!(op.next(&mut rt).unwrap(), 0);
    }

    #[test]
    fn order_by_and_limit_are_wired() {
        let graph = query_graph(
            GraphNode::Triples(vec![TriplePattern {
                s: GraphTerm::Variable("x".into()),
                p: GraphTerm::IRI("http://ex/p".into()),
                o: GraphTerm::Variable("y".into()),
            }]),
            Projection::Vars(vec!["x".into()]),
        );
        let mut graph = graph;
        graph.order_by.push(OrderKey { variable: "x".into(), descending: true });
        graph.limit = Some(5);
        let plan = build_plan(&graph).unwrap();
        let (facts, diff, dict, _dir) = empty_store();
        let compiled = compile(&plan, facts, diff, dict).unwrap();
        assert_eq!(compiled.output_names, vec!["x".to_string()]);
    }
}
