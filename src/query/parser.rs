//! A1: the minimal query parser. A hand-written recursive-descent
//! reader over the reduced triple-pattern grammar described in
//! SPEC_FULL.md §4.10/§6 — not the full SPARQL grammar (explicitly out
//! of scope), just enough of it to exercise every operator this crate
//! ships. Never panics: any grammar violation comes back as a
//! `ParseError`-kinded `SmallError` carrying a one-line diagnostic and
//! the byte offset it was detected at.

use std::collections::HashMap;

use crate::error::SmallError;

use super::expr::Expr;
use super::graph::{GraphNode, OrderKey, Projection, QueryGraph, Term, TriplePattern};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Variable(String),
    IRI(String),
    StringLit(String),
    Number(f64),
    Punct(char),
    Op(String),
}

struct Lexer {
    chars: Vec<(usize, char)>,
    pos: usize,
    len_bytes: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.char_indices().collect(),
            pos: 0,
            len_bytes: src.len(),
        }
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|&(b, _)| b).unwrap_or(self.len_bytes)
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>, SmallError> {
        self.skip_trivia();
        let start = self.offset();
        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(None),
        };

        if "{}().,*".contains(c) {
            self.bump();
            return Ok(Some((start, Token::Punct(c))));
        }

        if c == '?' {
            self.bump();
            let name = self.read_ident();
            if name.is_empty() {
                return Err(SmallError::parse(format!("empty variable name at byte {}", start)));
            }
            return Ok(Some((start, Token::Variable(name))));
        }

        if c == '<' {
            self.bump();
            let mut iri = String::new();
            loop {
                match self.bump() {
                    Some('>') => break,
                    Some(c) => iri.push(c),
                    None => return Err(SmallError::parse(format!("unterminated IRI starting at byte {}", start))),
                }
            }
            return Ok(Some((start, Token::IRI(iri))));
        }

        if c == '"' {
            self.bump();
            let mut s = String::new();
            loop {
                match self.bump() {
                    Some('"') => break,
                    Some('\\') => {
                        if let Some(escaped) = self.bump() {
                            s.push(escaped);
                        }
                    }
                    Some(c) => s.push(c),
                    None => return Err(SmallError::parse(format!("unterminated string starting at byte {}", start))),
                }
            }
            return Ok(Some((start, Token::StringLit(s))));
        }

        if c.is_ascii_digit() || (c == '-' && self.peek_is_digit_after_minus()) {
            let mut text = String::new();
            if c == '-' {
                text.push(c);
                self.bump();
            }
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() || c == '.' {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let n: f64 = text
                .parse()
                .map_err(|_| SmallError::parse(format!("invalid number at byte {}", start)))?;
            return Ok(Some((start, Token::Number(n))));
        }

        for op in ["&&", "||", "!=", "<=", ">="] {
            if self.starts_with(op) {
                for _ in 0..op.len() {
                    self.bump();
                }
                return Ok(Some((start, Token::Op(op.to_string()))));
            }
        }
        if "=<>!+-*/".contains(c) {
            self.bump();
            return Ok(Some((start, Token::Op(c.to_string()))));
        }

        if c.is_alphanumeric() || c == '_' || c == ':' {
            let word = self.read_prefixed_word();
            return Ok(Some((start, Token::Word(word))));
        }

        Err(SmallError::parse(format!("unexpected character '{}' at byte {}", c, start)))
    }

    fn peek_is_digit_after_minus(&self) -> bool {
        self.chars
            .get(self.pos + 1)
            .map(|&(_, c)| c.is_ascii_digit())
            .unwrap_or(false)
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut iter = s.chars();
        for i in 0.. {
            match (self.chars.get(self.pos + i), iter.next()) {
                (_, None) => return true,
                (Some(&(_, a)), Some(b)) if a == b => continue,
                _ => return false,
            }
        }
        unreachable!()
    }

    fn read_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    /// A bare word, possibly `prefix:local` (a colon is allowed inside
    /// since this isn't full IRI reference syntax).
    fn read_prefixed_word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == ':' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }
}

pub struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    pub fn parse(src: &str) -> Result<QueryGraph, SmallError> {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        while let Some(tok) = lexer.next_token()? {
            tokens.push(tok);
        }
        let mut parser = Parser { tokens, pos: 0 };
        parser.parse_query()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|&(o, _)| o).unwrap_or(usize::MAX)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect_word(&mut self, word: &str) -> Result<(), SmallError> {
        match self.bump() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(word) => Ok(()),
            other => Err(SmallError::parse(format!(
                "expected '{}' at byte {}, found {:?}",
                word,
                self.offset(),
                other
            ))),
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), SmallError> {
        match self.bump() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            other => Err(SmallError::parse(format!(
                "expected '{}' at byte {}, found {:?}",
                c,
                self.offset(),
                other
            ))),
        }
    }

    fn peek_word_is(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(word))
    }

    fn peek_punct_is(&self, c: char) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == c)
    }

    fn parse_query(&mut self) -> Result<QueryGraph, SmallError> {
        let mut prefixes = HashMap::new();
        while self.peek_word_is("PREFIX") {
            self.bump();
            let name = match self.bump() {
                Some(Token::Word(w)) => w.trim_end_matches(':').to_string(),
                other => return Err(SmallError::parse(format!("expected prefix name, found {:?}", other))),
            };
            let iri = match self.bump() {
                Some(Token::IRI(iri)) => iri,
                other => return Err(SmallError::parse(format!("expected IRI after PREFIX, found {:?}", other))),
            };
            prefixes.insert(name, iri);
        }

        let projection = if self.peek_word_is("SELECT") {
            self.bump();
            self.parse_projection()?
        } else if self.peek_word_is("DESCRIBE") {
            self.bump();
            self.parse_projection()?
        } else {
            return Err(SmallError::parse(format!(
                "expected SELECT or DESCRIBE at byte {}",
                self.offset()
            )));
        };

        self.expect_word("WHERE")?;
        let where_clause = self.parse_group(&prefixes)?;

        let mut order_by = Vec::new();
        if self.peek_word_is("ORDER") {
            self.bump();
            self.expect_word("BY")?;
            loop {
                let descending = if self.peek_word_is("DESC") {
                    self.bump();
                    true
                } else {
                    if self.peek_word_is("ASC") {
                        self.bump();
                    }
                    false
                };
                let variable = match self.bump() {
                    Some(Token::Variable(name)) => name,
                    other => return Err(SmallError::parse(format!("expected variable in ORDER BY, found {:?}", other))),
                };
                order_by.push(OrderKey { variable, descending });
                if !matches!(self.peek(), Some(Token::Variable(_))) && !self.peek_word_is("DESC") && !self.peek_word_is("ASC") {
                    break;
                }
            }
        }

        let limit = if self.peek_word_is("LIMIT") {
            self.bump();
            Some(self.parse_uint()?)
        } else {
            None
        };
        let offset = if self.peek_word_is("OFFSET") {
            self.bump();
            Some(self.parse_uint()?)
        } else {
            None
        };

        Ok(QueryGraph {
            prefixes,
            projection,
            where_clause,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_uint(&mut self) -> Result<u64, SmallError> {
        match self.bump() {
            Some(Token::Number(n)) if n >= 0.0 => Ok(n as u64),
            other => Err(SmallError::parse(format!("expected non-negative integer, found {:?}", other))),
        }
    }

    fn parse_projection(&mut self) -> Result<Projection, SmallError> {
        if self.peek_punct_is('*') {
            self.bump();
            return Ok(Projection::All);
        }
        let mut vars = Vec::new();
        while let Some(Token::Variable(_)) = self.peek() {
            if let Some(Token::Variable(name)) = self.bump() {
                vars.push(name);
            }
        }
        if vars.is_empty() {
            return Err(SmallError::parse(format!(
                "expected '*' or a variable list in projection at byte {}",
                self.offset()
            )));
        }
        Ok(Projection::Vars(vars))
    }

    fn parse_group(&mut self, prefixes: &HashMap<String, String>) -> Result<GraphNode, SmallError> {
        self.expect_punct('{')?;
        let mut patterns = Vec::new();
        let mut node: Option<GraphNode> = None;

        loop {
            if self.peek_punct_is('}') {
                break;
            }
            if self.peek_word_is("FILTER") {
                self.bump();
                self.expect_punct('(')?;
                let expr = self.parse_expr(prefixes)?;
                self.expect_punct(')')?;
                let base = Self::flush(&mut patterns, node.take());
                node = Some(GraphNode::Filter(Box::new(base), expr));
                continue;
            }
            if self.peek_word_is("OPTIONAL") {
                self.bump();
                let optional = self.parse_group(prefixes)?;
                let base = Self::flush(&mut patterns, node.take());
                node = Some(GraphNode::Optional(Box::new(base), Box::new(optional)));
                continue;
            }
            if self.peek_punct_is('{') {
                let left = self.parse_group(prefixes)?;
                self.expect_word("UNION")?;
                let right = self.parse_group(prefixes)?;
                let base = Self::flush(&mut patterns, node.take());
                let combined = GraphNode::Union(Box::new(left), Box::new(right));
                node = Some(Self::merge(base, combined));
                continue;
            }

            let s = self.parse_term(prefixes)?;
            let p = self.parse_term(prefixes)?;
            let o = self.parse_term(prefixes)?;
            self.expect_punct('.')?;
            patterns.push(TriplePattern { s, p, o });
        }

        self.expect_punct('}')?;
        Ok(Self::flush(&mut patterns, node.take()))
    }

    fn flush(patterns: &mut Vec<TriplePattern>, node: Option<GraphNode>) -> GraphNode {
        let collected = GraphNode::Triples(std::mem::take(patterns));
        match node {
            Some(n) => Self::merge(collected, n),
            None => collected,
        }
    }

    /// Combine two sibling graph-pattern fragments that accumulated in
    /// the same `{ }` block into one conjunction-shaped node. An empty
    /// `Triples([])` fragment is dropped rather than wrapped.
    fn merge(base: GraphNode, next: GraphNode) -> GraphNode {
        match base {
            GraphNode::Triples(ref patterns) if patterns.is_empty() => next,
            _ => GraphNode::Optional(Box::new(base), Box::new(next)).collapse_trivial_optional(),
        }
    }

    fn parse_term(&mut self, prefixes: &HashMap<String, String>) -> Result<Term, SmallError> {
        match self.bump() {
            Some(Token::Variable(name)) => Ok(Term::Variable(name)),
            Some(Token::IRI(iri)) => Ok(Term::IRI(iri)),
            Some(Token::StringLit(s)) => Ok(Term::Literal(s)),
            Some(Token::Word(w)) if w == "_" => Ok(Term::Wildcard),
            Some(Token::Word(w)) => Ok(Term::IRI(expand_prefixed(&w, prefixes))),
            other => Err(SmallError::parse(format!(
                "expected a triple pattern term at byte {}, found {:?}",
                self.offset(),
                other
            ))),
        }
    }

    // A small precedence-climbing expression parser over the reduced
    // operator set: `||` binds loosest, then `&&`, then the
    // comparisons, then additive, then multiplicative, then unary `!`/`-`.
    fn parse_expr(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        self.parse_or(prefixes)
    }

    fn parse_or(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        let mut left = self.parse_and(prefixes)?;
        while matches!(self.peek(), Some(Token::Op(op)) if op == "||") {
            self.bump();
            let right = self.parse_and(prefixes)?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        let mut left = self.parse_comparison(prefixes)?;
        while matches!(self.peek(), Some(Token::Op(op)) if op == "&&") {
            self.bump();
            let right = self.parse_comparison(prefixes)?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        let left = self.parse_additive(prefixes)?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            let ctor: Option<fn(Box<Expr>, Box<Expr>) -> Expr> = match op.as_str() {
                "=" => Some(Expr::Equal),
                "!=" => Some(Expr::NotEqual),
                "<" => Some(Expr::Less),
                "<=" => Some(Expr::LessOrEqual),
                _ => None,
            };
            if let Some(ctor) = ctor {
                self.bump();
                let right = self.parse_additive(prefixes)?;
                return Ok(ctor(Box::new(left), Box::new(right)));
            }
        }
        Ok(left)
    }

    fn parse_additive(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        let mut left = self.parse_multiplicative(prefixes)?;
        loop {
            match self.peek().cloned() {
                Some(Token::Op(op)) if op == "+" => {
                    self.bump();
                    let right = self.parse_multiplicative(prefixes)?;
                    left = Expr::Plus(Box::new(left), Box::new(right));
                }
                Some(Token::Op(op)) if op == "-" => {
                    self.bump();
                    let right = self.parse_multiplicative(prefixes)?;
                    left = Expr::Minus(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        let mut left = self.parse_unary(prefixes)?;
        loop {
            match self.peek().cloned() {
                Some(Token::Op(op)) if op == "*" => {
                    self.bump();
                    let right = self.parse_unary(prefixes)?;
                    left = Expr::Mul(Box::new(left), Box::new(right));
                }
                Some(Token::Op(op)) if op == "/" => {
                    self.bump();
                    let right = self.parse_unary(prefixes)?;
                    left = Expr::Div(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        if matches!(self.peek(), Some(Token::Op(op)) if op == "!") {
            self.bump();
            return Ok(Expr::Not(Box::new(self.parse_unary(prefixes)?)));
        }
        if matches!(self.peek(), Some(Token::Op(op)) if op == "-") {
            self.bump();
            return Ok(Expr::Neg(Box::new(self.parse_unary(prefixes)?)));
        }
        self.parse_primary(prefixes)
    }

    fn parse_primary(&mut self, prefixes: &HashMap<String, String>) -> Result<Expr, SmallError> {
        match self.bump() {
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Number(n)) => Ok(Expr::NumberLiteral(n)),
            Some(Token::StringLit(s)) => Ok(Expr::StringLiteral(s)),
            Some(Token::IRI(iri)) => Ok(Expr::IRILiteral(iri)),
            Some(Token::Punct('(')) => {
                let inner = self.parse_expr(prefixes)?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("BOUND") => {
                self.expect_punct('(')?;
                let var = match self.bump() {
                    Some(Token::Variable(name)) => name,
                    other => return Err(SmallError::parse(format!("expected variable in BOUND(...), found {:?}", other))),
                };
                self.expect_punct(')')?;
                Ok(Expr::Bound(var))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("isIRI") => {
                self.expect_punct('(')?;
                let inner = self.parse_expr(prefixes)?;
                self.expect_punct(')')?;
                Ok(Expr::IsIRI(Box::new(inner)))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("STR") => {
                self.expect_punct('(')?;
                let inner = self.parse_expr(prefixes)?;
                self.expect_punct(')')?;
                Ok(Expr::Str(Box::new(inner)))
            }
            Some(Token::Word(w)) => Ok(Expr::IRILiteral(expand_prefixed(&w, prefixes))),
            other => Err(SmallError::parse(format!(
                "expected an expression at byte {}, found {:?}",
                self.offset(),
                other
            ))),
        }
    }
}

fn expand_prefixed(word: &str, prefixes: &HashMap<String, String>) -> String {
    if let Some(idx) = word.find(':') {
        let (prefix, local) = word.split_at(idx);
        let local = &local[1..];
        if let Some(base) = prefixes.get(prefix) {
            return format!("{}{}", base, local);
        }
    }
    word.to_string()
}

trait CollapseTrivialOptional {
    fn collapse_trivial_optional(self) -> GraphNode;
}

impl CollapseTrivialOptional for GraphNode {
    /// `merge` reuses `Optional` as a generic "these two fragments
    /// live in the same block" combinator when the second fragment is
    /// itself already a `Union`/`Filter`/`Optional` node produced by a
    /// nested clause; an actual `UNION` fragment should stay a
    /// `Union`, not get double-wrapped in an `Optional` it didn't ask
    /// for.
    fn collapse_trivial_optional(self) -> GraphNode {
        if let GraphNode::Optional(base, next) = &self {
            if let GraphNode::Triples(p) = base.as_ref() {
                if p.is_empty() {
                    return (**next).clone();
                }
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select_with_one_pattern() {
        let graph = Parser::parse("SELECT ?x WHERE { ?x <http://ex/knows> <http://ex/bob> . }").unwrap();
        match graph.where_clause {
            GraphNode::Triples(ref patterns) => {
                assert_eq!(patterns.len(), 1);
                assert_eq!(patterns[0].s, Term::Variable("x".to_string()));
            }
            other => panic!("expected a flat pattern list, got {:?}", other),
        }
        assert_eq!(graph.projection, Projection::Vars(vec!["x".to_string()]));
    }

    #[test]
    fn parses_prefix_and_order_by_and_limit() {
        let src = "PREFIX ex: <http://example.org/> SELECT * WHERE { ?x ex:p ?y . } ORDER BY DESC ?y LIMIT 10";
        let graph = Parser::parse(src).unwrap();
        assert_eq!(graph.projection, Projection::All);
        assert_eq!(graph.order_by.len(), 1);
        assert!(graph.order_by[0].descending);
        assert_eq!(graph.limit, Some(10));
        match graph.where_clause {
            GraphNode::Triples(ref patterns) => {
                assert_eq!(patterns[0].p, Term::IRI("http://example.org/p".to_string()));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn rejects_unterminated_iri() {
        let err = Parser::parse("SELECT * WHERE { ?x <http://ex/p ?y . }").unwrap_err();
        assert_eq!(*err.kind(), crate::error::ErrorKind::Parse);
    }

    #[test]
    fn parses_filter_expression() {
        let src = "SELECT ?x WHERE { ?x <http://ex/p> ?y . FILTER(BOUND(?y) && ?y != <http://ex/q>) }";
        let graph = Parser::parse(src).unwrap();
        match graph.where_clause {
            GraphNode::Filter(_, Expr::And(_, _)) => {}
            other => panic!("expected a FILTER(And(...)), got {:?}", other),
        }
    }
}
