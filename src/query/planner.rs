//! A2: the naive planner. Builds a `Plan` directly from a `QueryGraph`
//! with no cost-based reordering — triple patterns become scans in
//! the order they were written, and a join strategy is picked from a
//! purely local, adjacency-based rule. Full plan enumeration is
//! explicitly out of scope; this is the "always produce *a* correct
//! plan, never the best one" tier the rest of the system builds on.

use crate::error::SmallError;

use super::graph::{GraphNode, QueryGraph, Term, TriplePattern};
use super::plan::{DuplicatePolicy, Plan, PlanNode};

pub fn build_plan(graph: &QueryGraph) -> Result<Plan, SmallError> {
    let root = build_node(&graph.where_clause)?;
    Ok(Plan {
        root,
        projection: graph.projection.clone(),
        order_by: graph.order_by.clone(),
        limit: graph.limit,
        offset: graph.offset,
        duplicates: DuplicatePolicy::ExpandDuplicates,
    })
}

fn build_node(node: &GraphNode) -> Result<PlanNode, SmallError> {
    match node {
        GraphNode::Triples(patterns) => build_conjunction(patterns),
        GraphNode::Union(left, right) => {
            Ok(PlanNode::Union(Box::new(build_node(left)?), Box::new(build_node(right)?)))
        }
        GraphNode::Optional(required, optional) => Ok(PlanNode::Optional(
            Box::new(build_node(required)?),
            Box::new(build_node(optional)?),
        )),
        GraphNode::Filter(inner, expr) => Ok(PlanNode::Filter(Box::new(build_node(inner)?), expr.clone())),
    }
}

fn pattern_variables(pattern: &TriplePattern) -> Vec<String> {
    let mut out = Vec::new();
    for term in [&pattern.s, &pattern.p, &pattern.o] {
        if let Term::Variable(name) = term {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
    out
}

fn pattern_role(pattern: &TriplePattern, var: &str) -> Option<char> {
    if pattern.s == Term::Variable(var.to_string()) {
        Some('s')
    } else if pattern.p == Term::Variable(var.to_string()) {
        Some('p')
    } else if pattern.o == Term::Variable(var.to_string()) {
        Some('o')
    } else {
        None
    }
}

/// Fold a basic graph pattern (a flat list of triples joined by
/// conjunction) into a left-deep join tree. Only the very first pair
/// is eligible for a merge join: once the accumulator is itself a join
/// result, this planner can't cheaply prove its output is still sorted
/// on a later pattern's shared variable, so later joins fall back to
/// hashing. Cost-based reordering that would avoid this is explicitly
/// out of scope.
fn build_conjunction(patterns: &[TriplePattern]) -> Result<PlanNode, SmallError> {
    if patterns.is_empty() {
        return Err(SmallError::plan("empty basic graph pattern"));
    }

    let mut acc = PlanNode::Scan(patterns[0].clone());
    for i in 1..patterns.len() {
        let prev = &patterns[i - 1];
        let cur = &patterns[i];
        let prev_vars = pattern_variables(prev);
        let cur_vars = pattern_variables(cur);
        let shared = prev_vars.into_iter().find(|v| cur_vars.contains(v));
        let right = PlanNode::Scan(cur.clone());

        acc = match shared {
            Some(var) => {
                let prev_role = pattern_role(prev, &var);
                let cur_role = pattern_role(cur, &var);
                let can_merge = i == 1 && prev_role.is_some() && prev_role == cur_role;
                if can_merge {
                    PlanNode::MergeJoin(Box::new(acc), Box::new(right), var)
                } else {
                    PlanNode::HashJoin(Box::new(acc), Box::new(right), var)
                }
            }
            None => PlanNode::HashJoin(Box::new(acc), Box::new(right), String::new()),
        };
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::graph::{Projection, QueryGraph};
    use std::collections::HashMap;

    fn graph(where_clause: GraphNode) -> QueryGraph {
        QueryGraph {
            prefixes: HashMap::new(),
            projection: Projection::All,
            where_clause,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    #[test]
    fn shared_leading_subject_becomes_merge_join() {
        let a = TriplePattern { s: Term::Variable("x".into()), p: Term::IRI("p1".into()), o: Term::Variable("y".into()) };
        let b = TriplePattern { s: Term::Variable("x".into()), p: Term::IRI("p2".into()), o: Term::Variable("z".into()) };
        let plan = build_plan(&graph(GraphNode::Triples(vec![a, b]))).unwrap();
        assert!(matches!(plan.root, PlanNode::MergeJoin(_, _, ref v) if v == "x"));
    }

    #[test]
    fn mismatched_roles_become_hash_join() {
        let a = TriplePattern { s: Term::Variable("x".into()), p: Term::IRI("p1".into()), o: Term::Variable("y".into()) };
        let b = TriplePattern { s: Term::Variable("w".into()), p: Term::Variable("y".into()), o: Term::IRI("p2".into()) };
        let plan = build_plan(&graph(GraphNode::Triples(vec![a, b]))).unwrap();
        assert!(matches!(plan.root, PlanNode::HashJoin(_, _, ref v) if v == "y"));
    }

    #[test]
    fn empty_pattern_list_is_rejected() {
        let err = build_plan(&graph(GraphNode::Triples(vec![]))).unwrap_err();
        assert_eq!(*err.kind(), crate::error::ErrorKind::Plan);
    }
}
