//! Edge Evaluator (C5, spec.md §4.5): picks the next node once the current
//! one has finished, including the tiny guard expression language for
//! `conditional` edges.

use crate::graph::{EdgeCondition, EdgeSpec, GraphSpec};
use crate::memory::MemorySnapshot;
use serde_json::Value;

/// Outcome of the node attempt that just finished, as seen by edge
/// selection. Retries are invisible here: only the final status of the
/// node (after any retries) matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    FailedRetriesExhausted,
}

pub struct EdgeEvaluator;

impl EdgeEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Select the next edge to traverse from `current`, or `None` if the
    /// node has no eligible successor (spec.md §4.5 step 4).
    pub fn select_next<'a>(
        &self,
        graph: &'a GraphSpec,
        current: &str,
        outcome: AttemptOutcome,
        memory: &MemorySnapshot,
    ) -> Option<&'a EdgeSpec> {
        let mut eligible: Vec<&EdgeSpec> = graph
            .edges_from(current)
            .filter(|edge| self.is_eligible(edge, outcome, memory))
            .collect();

        // Lower priority number first; ties broken by edge id lexicographically
        // for determinism (spec.md §4.5 step 3, §9 Open Question 3).
        eligible.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        eligible.into_iter().next()
    }

    fn is_eligible(&self, edge: &EdgeSpec, outcome: AttemptOutcome, memory: &MemorySnapshot) -> bool {
        match edge.condition {
            EdgeCondition::Always => true,
            EdgeCondition::OnSuccess => outcome == AttemptOutcome::Success,
            EdgeCondition::OnFailure => outcome == AttemptOutcome::FailedRetriesExhausted,
            EdgeCondition::Conditional => match &edge.guard {
                Some(expr) => evaluate_guard(expr, memory).unwrap_or(false),
                None => false,
            },
        }
    }
}

impl Default for EdgeEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// --- Guard expression language -------------------------------------------
//
// Grammar (spec.md §4.5):
//   expr       := or_expr
//   or_expr    := and_expr ( "or" and_expr )*
//   and_expr   := unary ( "and" unary )*
//   unary      := "not" unary | atom
//   atom       := "(" expr ")" | comparison
//   comparison := IDENT "==" literal | IDENT "!=" literal | IDENT "in" set
//   set        := "{" literal ("," literal)* "}"
//   literal    := string | number | bool | ident (bareword treated as string)
//
// Unknown keys yield false rather than erroring (spec.md §4.5 step 2).

fn evaluate_guard(expr: &str, memory: &MemorySnapshot) -> Option<bool> {
    let tokens = tokenize(expr);
    let mut parser = GuardParser { tokens: &tokens, pos: 0 };
    let result = parser.parse_or(memory)?;
    if parser.pos != parser.tokens.len() {
        return None;
    }
    Some(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    StringLit(String),
    NumberLit(f64),
    BoolLit(bool),
    Eq,
    Ne,
    In,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                i += 1; // closing quote
                tokens.push(Token::StringLit(s));
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let s: String = chars[start..i].iter().collect();
                if let Ok(n) = s.parse::<f64>() {
                    tokens.push(Token::NumberLit(n));
                }
            }
            _ if c.is_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::BoolLit(true),
                    "false" => Token::BoolLit(false),
                    _ => Token::Ident(word),
                });
            }
            _ => {
                i += 1;
            }
        }
    }
    tokens
}

struct GuardParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> GuardParser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_or(&mut self, memory: &MemorySnapshot) -> Option<bool> {
        let mut value = self.parse_and(memory)?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and(memory)?;
            value = value || rhs;
        }
        Some(value)
    }

    fn parse_and(&mut self, memory: &MemorySnapshot) -> Option<bool> {
        let mut value = self.parse_unary(memory)?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_unary(memory)?;
            value = value && rhs;
        }
        Some(value)
    }

    fn parse_unary(&mut self, memory: &MemorySnapshot) -> Option<bool> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let value = self.parse_unary(memory)?;
            return Some(!value);
        }
        self.parse_atom(memory)
    }

    fn parse_atom(&mut self, memory: &MemorySnapshot) -> Option<bool> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let value = self.parse_or(memory)?;
            if !matches!(self.advance(), Some(Token::RParen)) {
                return None;
            }
            return Some(value);
        }
        self.parse_comparison(memory)
    }

    fn parse_comparison(&mut self, memory: &MemorySnapshot) -> Option<bool> {
        let key = match self.advance()? {
            Token::Ident(name) => name.clone(),
            _ => return None,
        };
        let actual = memory.get(&key);

        match self.advance()? {
            Token::Eq => {
                let expected = self.parse_literal()?;
                Some(values_equal(actual, &expected))
            }
            Token::Ne => {
                let expected = self.parse_literal()?;
                Some(!values_equal(actual, &expected))
            }
            Token::In => {
                if !matches!(self.advance(), Some(Token::LBrace)) {
                    return None;
                }
                let mut members = Vec::new();
                loop {
                    members.push(self.parse_literal()?);
                    match self.peek() {
                        Some(Token::Comma) => {
                            self.advance();
                        }
                        Some(Token::RBrace) => {
                            self.advance();
                            break;
                        }
                        _ => return None,
                    }
                }
                Some(members.iter().any(|m| values_equal(actual, m)))
            }
            _ => None,
        }
    }

    fn parse_literal(&mut self) -> Option<Value> {
        match self.advance()? {
            Token::StringLit(s) => Some(Value::String(s.clone())),
            Token::Ident(s) => Some(Value::String(s.clone())),
            Token::NumberLit(n) => serde_json::Number::from_f64(*n).map(Value::Number),
            Token::BoolLit(b) => Some(Value::Bool(*b)),
            _ => None,
        }
    }
}

fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(v) => v == expected,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SharedMemory;
    use indexmap::IndexMap;
    use proptest::prelude::*;
    use serde_json::json;

    fn memory_with(key: &str, value: Value) -> MemorySnapshot {
        let mut mem = SharedMemory::new();
        mem.write(IndexMap::from([(key.to_string(), value)]));
        mem.snapshot()
    }

    #[test]
    fn equality_guard() {
        let mem = memory_with("urgency", json!("high"));
        assert_eq!(evaluate_guard("urgency == \"high\"", &mem), Some(true));
        assert_eq!(evaluate_guard("urgency == \"low\"", &mem), Some(false));
    }

    #[test]
    fn not_equal_guard() {
        let mem = memory_with("urgency", json!("high"));
        assert_eq!(evaluate_guard("urgency != \"low\"", &mem), Some(true));
    }

    #[test]
    fn in_set_guard() {
        let mem = memory_with("urgency", json!("medium"));
        assert_eq!(
            evaluate_guard("urgency in {\"high\", \"medium\"}", &mem),
            Some(true)
        );
        assert_eq!(evaluate_guard("urgency in {\"high\"}", &mem), Some(false));
    }

    #[test]
    fn boolean_composition() {
        let mem = memory_with("urgency", json!("high"));
        assert_eq!(
            evaluate_guard("urgency == \"high\" and not urgency == \"low\"", &mem),
            Some(true)
        );
        assert_eq!(
            evaluate_guard("urgency == \"low\" or urgency == \"high\"", &mem),
            Some(true)
        );
    }

    #[test]
    fn unknown_key_yields_false() {
        let mem = memory_with("present", json!(true));
        assert_eq!(evaluate_guard("missing == \"x\"", &mem), Some(false));
    }

    #[test]
    fn select_next_respects_priority_and_lexicographic_tiebreak() {
        let graph_json = serde_json::json!({
            "id": "g", "goal_id": "goal", "version": "1", "entry_node": "a",
            "entry_points": {}, "terminal_nodes": [], "pause_nodes": [],
            "nodes": [
                {"id": "a", "name": "a", "kind": "function", "function": "noop"}
            ],
            "edges": [
                {"id": "z_edge", "source": "a", "target": "a", "condition": "always", "priority": 0},
                {"id": "a_edge", "source": "a", "target": "a", "condition": "always", "priority": 0}
            ],
            "max_retries_per_node": 3
        });
        let graph: GraphSpec = serde_json::from_value(graph_json).unwrap();
        let mem = SharedMemory::new().snapshot();
        let evaluator = EdgeEvaluator::new();
        let edge = evaluator
            .select_next(&graph, "a", AttemptOutcome::Success, &mem)
            .unwrap();
        assert_eq!(edge.id, "a_edge");
    }

    #[test]
    fn on_failure_edge_only_eligible_when_retries_exhausted() {
        let graph_json = serde_json::json!({
            "id": "g", "goal_id": "goal", "version": "1", "entry_node": "a",
            "entry_points": {}, "terminal_nodes": [], "pause_nodes": [],
            "nodes": [{"id": "a", "name": "a", "kind": "function", "function": "noop"}],
            "edges": [
                {"id": "e1", "source": "a", "target": "a", "condition": "on_failure", "priority": 0}
            ],
            "max_retries_per_node": 3
        });
        let graph: GraphSpec = serde_json::from_value(graph_json).unwrap();
        let mem = SharedMemory::new().snapshot();
        let evaluator = EdgeEvaluator::new();
        assert!(evaluator
            .select_next(&graph, "a", AttemptOutcome::Success, &mem)
            .is_none());
        assert!(evaluator
            .select_next(&graph, "a", AttemptOutcome::FailedRetriesExhausted, &mem)
            .is_some());
    }

    fn unconditional_graph(edges: Vec<EdgeSpec>) -> GraphSpec {
        GraphSpec {
            id: "g".into(),
            goal_id: "goal".into(),
            version: "1".into(),
            entry_node: "a".into(),
            entry_points: Default::default(),
            terminal_nodes: Default::default(),
            pause_nodes: Default::default(),
            nodes: vec![],
            edges,
            default_model: None,
            max_tokens: None,
            max_retries_per_node: 3,
            default_tool_timeout_seconds: None,
        }
    }

    proptest! {
        /// Edge selection picks the lowest (priority, id) pair regardless of
        /// the order edges appear in the graph (spec.md §4.5 step 3,
        /// §9 Open Question 3 — determinism must not depend on declaration
        /// order).
        #[test]
        fn tie_break_is_independent_of_declaration_order(
            mut pairs in prop::collection::vec((0i32..5, "[a-z]{3,6}"), 2..8),
        ) {
            pairs.dedup_by(|a, b| a.1 == b.1);
            prop_assume!(pairs.len() >= 2);

            let edges: Vec<EdgeSpec> = pairs
                .iter()
                .map(|(priority, id)| EdgeSpec {
                    id: id.clone(),
                    source: "a".into(),
                    target: "a".into(),
                    condition: EdgeCondition::Always,
                    priority: *priority,
                    guard: None,
                })
                .collect();

            let expected = pairs.iter().min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1))).unwrap().1.clone();

            let mem = SharedMemory::new().snapshot();
            let evaluator = EdgeEvaluator::new();

            let forward = unconditional_graph(edges.clone());
            let picked_forward = evaluator.select_next(&forward, "a", AttemptOutcome::Success, &mem).unwrap();
            prop_assert_eq!(&picked_forward.id, &expected);

            let mut reversed = edges;
            reversed.reverse();
            let backward = unconditional_graph(reversed);
            let picked_backward = evaluator.select_next(&backward, "a", AttemptOutcome::Success, &mem).unwrap();
            prop_assert_eq!(&picked_backward.id, &expected);
        }

        /// `key == "value"` is true exactly when shared memory holds that
        /// exact string, for any value free of quote/escape characters
        /// (spec.md §4.5 comparison semantics).
        #[test]
        fn equality_guard_matches_only_the_exact_stored_string(
            stored in "[a-zA-Z0-9_]{1,12}",
            probed in "[a-zA-Z0-9_]{1,12}",
        ) {
            let mem = memory_with("k", json!(stored.clone()));
            let guard = format!("k == \"{probed}\"");
            prop_assert_eq!(evaluate_guard(&guard, &mem), Some(stored == probed));
        }
    }
}
