//! Declarative graph data model (spec.md §3 `NodeSpec`/`EdgeSpec`/`GraphSpec`).
//!
//! Nodes and edges are stored in flat vectors keyed by id and referred to by
//! id everywhere else, rather than holding cyclic references between them
//! (spec.md §9, "cyclic references between graph/edges/nodes").

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    LlmGenerate,
    LlmToolUse,
    Router,
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub input_keys: Vec<String>,
    #[serde(default)]
    pub output_keys: Vec<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: HashSet<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub streaming_enabled: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub model: Option<String>,
    /// Per-tool-call deadline override (spec.md §4.4.3: node > graph default > 30s).
    #[serde(default)]
    pub tool_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    pub is_terminal: bool,
    #[serde(default)]
    pub is_pause: bool,
    /// Tokens that must never appear anywhere in an LLM node's output
    /// (spec.md §4.4.2 hallucination guard).
    #[serde(default)]
    pub forbidden_tokens: Vec<String>,
}

impl NodeSpec {
    /// `node.max_retries ?? graph.max_retries_per_node ?? 3` (spec.md §3, §4.4.6).
    pub fn effective_max_retries(&self, graph_default: u32) -> u32 {
        self.max_retries.unwrap_or(graph_default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    OnSuccess,
    OnFailure,
    Always,
    Conditional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub id: String,
    pub source: String,
    pub target: String,
    pub condition: EdgeCondition,
    #[serde(default)]
    pub priority: i32,
    /// Only meaningful when `condition == Conditional`; see `crate::edge`.
    #[serde(default)]
    pub guard: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    pub id: String,
    pub goal_id: String,
    pub version: String,
    pub entry_node: String,
    #[serde(default)]
    pub entry_points: HashMap<String, String>,
    #[serde(default)]
    pub terminal_nodes: HashSet<String>,
    #[serde(default)]
    pub pause_nodes: HashSet<String>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_retries_per_node")]
    pub max_retries_per_node: u32,
    /// Graph-level fallback for per-tool-call timeouts (spec.md §4.4.3).
    #[serde(default)]
    pub default_tool_timeout_seconds: Option<u64>,
}

fn default_max_retries_per_node() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    DanglingEdgeEndpoint { edge_id: String, endpoint: String },
    MissingEntryNode { entry_node: String },
    UnknownTerminalNode { node_id: String },
    UnknownPauseNode { node_id: String },
    NodeBothTerminalAndPause { node_id: String },
    UnknownEntryPointTarget { entry_point: String, node_id: String },
    DuplicateNodeId { node_id: String },
    DuplicateEdgeId { edge_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarning {
    UnreachableNode { node_id: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphValidation {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl GraphValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl GraphSpec {
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edges_from(&self, node_id: &str) -> impl Iterator<Item = &EdgeSpec> {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    pub fn entry_for(&self, entry_point: Option<&str>) -> Option<&str> {
        match entry_point {
            Some(ep) => self.entry_points.get(ep).map(|s| s.as_str()),
            None => Some(self.entry_node.as_str()),
        }
    }

    /// Checks the invariants of spec.md §3. Unreachable nodes are reported
    /// as a warning, never an error.
    pub fn validate(&self) -> GraphValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();

        let mut seen_nodes = HashSet::new();
        for n in &self.nodes {
            if !seen_nodes.insert(n.id.as_str()) {
                errors.push(ValidationError::DuplicateNodeId { node_id: n.id.clone() });
            }
        }
        let mut seen_edges = HashSet::new();
        for e in &self.edges {
            if !seen_edges.insert(e.id.as_str()) {
                errors.push(ValidationError::DuplicateEdgeId { edge_id: e.id.clone() });
            }
        }

        for e in &self.edges {
            if !node_ids.contains(e.source.as_str()) {
                errors.push(ValidationError::DanglingEdgeEndpoint {
                    edge_id: e.id.clone(),
                    endpoint: e.source.clone(),
                });
            }
            if !node_ids.contains(e.target.as_str()) {
                errors.push(ValidationError::DanglingEdgeEndpoint {
                    edge_id: e.id.clone(),
                    endpoint: e.target.clone(),
                });
            }
        }

        if !node_ids.contains(self.entry_node.as_str()) {
            errors.push(ValidationError::MissingEntryNode {
                entry_node: self.entry_node.clone(),
            });
        }

        for node_id in &self.terminal_nodes {
            if !node_ids.contains(node_id.as_str()) {
                errors.push(ValidationError::UnknownTerminalNode { node_id: node_id.clone() });
            }
        }
        for node_id in &self.pause_nodes {
            if !node_ids.contains(node_id.as_str()) {
                errors.push(ValidationError::UnknownPauseNode { node_id: node_id.clone() });
            }
        }
        for node_id in self.terminal_nodes.intersection(&self.pause_nodes) {
            errors.push(ValidationError::NodeBothTerminalAndPause {
                node_id: node_id.clone(),
            });
        }
        for (entry_point, node_id) in &self.entry_points {
            if !node_ids.contains(node_id.as_str()) {
                errors.push(ValidationError::UnknownEntryPointTarget {
                    entry_point: entry_point.clone(),
                    node_id: node_id.clone(),
                });
            }
        }

        if errors.is_empty() {
            warnings.extend(self.unreachable_nodes().into_iter().map(|node_id| {
                ValidationWarning::UnreachableNode { node_id }
            }));
        }

        GraphValidation { errors, warnings }
    }

    fn unreachable_nodes(&self) -> Vec<String> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(self.entry_node.as_str());
        reachable.insert(self.entry_node.as_str());
        for target in self.entry_points.values() {
            if reachable.insert(target.as_str()) {
                queue.push_back(target.as_str());
            }
        }

        while let Some(current) = queue.pop_front() {
            for edge in self.edges_from(current) {
                if reachable.insert(edge.target.as_str()) {
                    queue.push_back(edge.target.as_str());
                }
            }
        }

        self.nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| !reachable.contains(id))
            .map(|id| id.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_node(id: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            kind: NodeKind::Function,
            input_keys: vec![],
            output_keys: vec![],
            system_prompt: None,
            tools: HashSet::new(),
            function: Some(id.to_string()),
            max_retries: None,
            streaming_enabled: false,
            max_tokens: None,
            temperature: None,
            model: None,
            tool_timeout_seconds: None,
            is_entry: false,
            is_terminal: false,
            is_pause: false,
            forbidden_tokens: vec![],
        }
    }

    fn two_node_graph() -> GraphSpec {
        GraphSpec {
            id: "g1".into(),
            goal_id: "goal1".into(),
            version: "1".into(),
            entry_node: "a".into(),
            entry_points: HashMap::new(),
            terminal_nodes: ["b".to_string()].into_iter().collect(),
            pause_nodes: HashSet::new(),
            nodes: vec![function_node("a"), function_node("b")],
            edges: vec![EdgeSpec {
                id: "e1".into(),
                source: "a".into(),
                target: "b".into(),
                condition: EdgeCondition::Always,
                priority: 0,
                guard: None,
            }],
            default_model: None,
            max_tokens: None,
            max_retries_per_node: 3,
            default_tool_timeout_seconds: None,
        }
    }

    #[test]
    fn valid_graph_has_no_errors() {
        let g = two_node_graph();
        let v = g.validate();
        assert!(v.is_valid());
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn dangling_edge_is_an_error() {
        let mut g = two_node_graph();
        g.edges[0].target = "missing".into();
        let v = g.validate();
        assert!(!v.is_valid());
        assert!(v.errors.iter().any(|e| matches!(e, ValidationError::DanglingEdgeEndpoint { .. })));
    }

    #[test]
    fn unreachable_node_is_a_warning_not_an_error() {
        let mut g = two_node_graph();
        g.nodes.push(function_node("orphan"));
        let v = g.validate();
        assert!(v.is_valid());
        assert_eq!(v.warnings.len(), 1);
        assert!(matches!(
            &v.warnings[0],
            ValidationWarning::UnreachableNode { node_id } if node_id == "orphan"
        ));
    }

    #[test]
    fn node_cannot_be_both_terminal_and_pause() {
        let mut g = two_node_graph();
        g.pause_nodes.insert("b".into());
        let v = g.validate();
        assert!(!v.is_valid());
        assert!(v
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::NodeBothTerminalAndPause { .. })));
    }

    #[test]
    fn effective_max_retries_inherits_graph_default() {
        let mut node = function_node("a");
        assert_eq!(node.effective_max_retries(5), 5);
        node.max_retries = Some(0);
        assert_eq!(node.effective_max_retries(5), 0);
    }
}
