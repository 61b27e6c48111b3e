//! The parsed, still-variable-named form of a query. [`crate::query::planner`]
//! turns a `QueryGraph` into a [`crate::query::plan::Plan`]; [`crate::codegen`]
//! turns the pair of them into an operator tree.

use std::collections::HashMap;

use super::expr::Expr;

/// One slot of a triple pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Variable(String),
    IRI(String),
    Literal(String),
    /// `_`: matches anything, binds nothing.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriplePattern {
    pub s: Term,
    pub p: Term,
    pub o: Term,
}

/// A `WHERE` block. Basic graph patterns (conjunctions of triples) are
/// the leaves; `UNION`, `OPTIONAL`, and `FILTER` each wrap a subgraph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Triples(Vec<TriplePattern>),
    Union(Box<GraphNode>, Box<GraphNode>),
    /// Left outer join: `required` rows always survive; `optional`'s
    /// bindings are attached when it matches and left unbound when it
    /// doesn't.
    Optional(Box<GraphNode>, Box<GraphNode>),
    Filter(Box<GraphNode>, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Vars(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderKey {
    pub variable: String,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct QueryGraph {
    pub prefixes: HashMap<String, String>,
    pub projection: Projection,
    pub where_clause: GraphNode,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl GraphNode {
    /// Every variable that occurs anywhere in this subgraph — used by
    /// the planner to decide which filters attach where and which
    /// variables a `SELECT *` should project.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            GraphNode::Triples(patterns) => {
                for pattern in patterns {
                    for term in [&pattern.s, &pattern.p, &pattern.o] {
                        if let Term::Variable(name) = term {
                            if !out.contains(name) {
                                out.push(name.clone());
                            }
                        }
                    }
                }
            }
            GraphNode::Union(l, r) | GraphNode::Optional(l, r) => {
                l.collect_variables(out);
                for v in r.variables() {
                    if !out.contains(&v) {
                        out.push(v);
                    }
                }
            }
            GraphNode::Filter(inner, _) => inner.collect_variables(out),
        }
    }
}
