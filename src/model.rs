//! Decision tree data model
//!
//! A tree is a root ID plus an insertion-ordered map of nodes. Each node is
//! either a question with ordered options or a terminal solution. Options
//! point at other nodes by ID, so the structure is a rooted graph: several
//! options may share a target, and a buggy tree may even contain cycles.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// =============================================================================
// Core Types
// =============================================================================

/// One choice offered by a decision node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOption {
    /// Text shown to the user
    pub text: String,
    /// ID of the node this choice leads to
    pub next_node: String,
}

impl DecisionOption {
    pub fn new(text: impl Into<String>, next_node: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next_node: next_node.into(),
        }
    }
}

/// A node in the tree
///
/// Serialized without a tag: decision nodes carry `question` + `options`,
/// solution nodes carry `solution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// A question with ordered choices
    Decision {
        question: String,
        #[serde(default)]
        options: Vec<DecisionOption>,
    },
    /// Terminal remediation text
    Solution { solution: String },
}

impl Node {
    pub fn decision(question: impl Into<String>, options: Vec<DecisionOption>) -> Self {
        Node::Decision {
            question: question.into(),
            options,
        }
    }

    pub fn solution(text: impl Into<String>) -> Self {
        Node::Solution {
            solution: text.into(),
        }
    }

    /// Question text, or `None` for solution nodes
    pub fn question(&self) -> Option<&str> {
        match self {
            Node::Decision { question, .. } => Some(question),
            Node::Solution { .. } => None,
        }
    }

    /// Options in display order (empty for solution nodes)
    pub fn options(&self) -> &[DecisionOption] {
        match self {
            Node::Decision { options, .. } => options,
            Node::Solution { .. } => &[],
        }
    }

    /// The text a renderer shows for this node
    pub fn label(&self) -> &str {
        match self {
            Node::Decision { question, .. } => question,
            Node::Solution { solution } => solution,
        }
    }

    pub fn is_solution(&self) -> bool {
        matches!(self, Node::Solution { .. })
    }

    /// Kind name used in reports and exports
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Decision { .. } => "decision",
            Node::Solution { .. } => "solution",
        }
    }
}

/// A decision tree: root ID plus every node keyed by ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub root_node: String,
    #[serde(default)]
    pub nodes: IndexMap<String, Node>,
}

impl Tree {
    /// Create an empty tree whose root is `root_node`
    pub fn new(root_node: impl Into<String>) -> Self {
        Self {
            root_node: root_node.into(),
            nodes: IndexMap::new(),
        }
    }

    /// Builder-style node insertion
    pub fn with_node(mut self, id: impl Into<String>, node: Node) -> Self {
        self.nodes.insert(id.into(), node);
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(&self.root_node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Targets of `id`'s options that exist in the tree, in option order
    pub fn children<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .get(id)
            .map(Node::options)
            .unwrap_or_default()
            .iter()
            .map(|opt| opt.next_node.as_str())
            .filter(move |target| self.nodes.contains_key(*target))
    }

    /// Every (from, to, label) edge, including dangling ones
    pub fn relations(&self) -> Vec<(&str, &str, &str)> {
        self.nodes
            .iter()
            .flat_map(|(id, node)| {
                node.options()
                    .iter()
                    .map(move |opt| (id.as_str(), opt.next_node.as_str(), opt.text.as_str()))
            })
            .collect()
    }
}

// =============================================================================
// Editing
// =============================================================================

impl Tree {
    /// Copy with `node` added under a fresh `id`
    pub fn add_node(&self, id: &str, node: Node) -> crate::error::Result<Tree> {
        if self.contains(id) {
            return Err(EngineError::DuplicateId(id.to_string()));
        }
        let mut tree = self.clone();
        tree.nodes.insert(id.to_string(), node);
        Ok(tree)
    }

    /// Copy with `node` added as `id` and linked from `parent` by an option
    /// reading `text`
    pub fn add_child(
        &self,
        parent: &str,
        text: &str,
        id: &str,
        node: Node,
    ) -> crate::error::Result<Tree> {
        match self.node(parent) {
            None => return Err(EngineError::NodeNotFound(parent.to_string())),
            Some(Node::Solution { .. }) => {
                return Err(EngineError::MalformedNode {
                    id: parent.to_string(),
                    reason: "a solution node has no options to extend".to_string(),
                })
            }
            Some(Node::Decision { .. }) => {}
        }

        let mut tree = self.add_node(id, node)?;
        if let Some(Node::Decision { options, .. }) = tree.nodes.get_mut(parent) {
            options.push(DecisionOption::new(text, id));
        }
        Ok(tree)
    }

    /// Copy with `old` renamed to `new`, keeping its position in the map and
    /// rewriting the root and every option that pointed at it
    pub fn rename_node(&self, old: &str, new: &str) -> crate::error::Result<Tree> {
        if !self.contains(old) {
            return Err(EngineError::NodeNotFound(old.to_string()));
        }
        if old == new {
            return Ok(self.clone());
        }
        if self.contains(new) {
            return Err(EngineError::DuplicateId(new.to_string()));
        }

        let nodes = self
            .nodes
            .iter()
            .map(|(id, node)| {
                let id = if id == old { new.to_string() } else { id.clone() };
                let mut node = node.clone();
                if let Node::Decision { options, .. } = &mut node {
                    for opt in options.iter_mut().filter(|opt| opt.next_node == old) {
                        opt.next_node = new.to_string();
                    }
                }
                (id, node)
            })
            .collect();
        let root_node = if self.root_node == old {
            new.to_string()
        } else {
            self.root_node.clone()
        };

        Ok(Tree { root_node, nodes })
    }

    /// Copy without `id` and without every option that pointed at it
    ///
    /// The root cannot be removed; a tree without its root is invalid.
    pub fn remove_node(&self, id: &str) -> crate::error::Result<Tree> {
        if !self.contains(id) {
            return Err(EngineError::NodeNotFound(id.to_string()));
        }
        if self.root_node == id {
            return Err(EngineError::MalformedNode {
                id: id.to_string(),
                reason: "the root node cannot be removed".to_string(),
            });
        }

        let mut tree = self.clone();
        tree.nodes.shift_remove(id);
        for node in tree.nodes.values_mut() {
            if let Node::Decision { options, .. } = node {
                options.retain(|opt| opt.next_node != id);
            }
        }
        Ok(tree)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// A single problem found while validating a tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("root node '{root}' does not exist")]
    MissingRoot { root: String },

    #[error("node '{node}' option {} links to missing node '{target}'", .option_index + 1)]
    DanglingReference {
        node: String,
        option_index: usize,
        target: String,
    },

    #[error("node '{node}' has an empty question")]
    EmptyQuestion { node: String },

    #[error("node '{node}' has an empty solution")]
    EmptySolution { node: String },

    #[error("node '{node}' option {} has empty text", .option_index + 1)]
    EmptyOptionText { node: String, option_index: usize },
}

/// Check the tree's referential invariants
///
/// A missing root short-circuits. Otherwise every dangling option is
/// reported, not just the first.
pub fn validate(tree: &Tree) -> Vec<ValidationError> {
    if !tree.contains(&tree.root_node) {
        return vec![ValidationError::MissingRoot {
            root: tree.root_node.clone(),
        }];
    }

    let mut errors = Vec::new();
    for (id, node) in &tree.nodes {
        for (index, opt) in node.options().iter().enumerate() {
            if !tree.contains(&opt.next_node) {
                errors.push(ValidationError::DanglingReference {
                    node: id.clone(),
                    option_index: index,
                    target: opt.next_node.clone(),
                });
            }
        }
    }
    errors
}

/// Content checks that don't involve references: empty questions,
/// solutions, and option texts
pub fn check_structure(nodes: &IndexMap<String, Node>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (id, node) in nodes {
        match node {
            Node::Decision { question, options } => {
                if question.trim().is_empty() {
                    errors.push(ValidationError::EmptyQuestion { node: id.clone() });
                }
                for (index, opt) in options.iter().enumerate() {
                    if opt.text.trim().is_empty() {
                        errors.push(ValidationError::EmptyOptionText {
                            node: id.clone(),
                            option_index: index,
                        });
                    }
                }
            }
            Node::Solution { solution } => {
                if solution.trim().is_empty() {
                    errors.push(ValidationError::EmptySolution { node: id.clone() });
                }
            }
        }
    }
    errors
}

// =============================================================================
// Lenient loading
// =============================================================================

/// Option as it appears on disk, before shape checks
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOption {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub next_node: Option<String>,
}

/// Node as it appears on disk; may carry neither a question nor a solution
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<RawOption>>,
    #[serde(default)]
    pub solution: Option<String>,
}

/// Tree as it appears on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTree {
    #[serde(default)]
    pub root_node: String,
    #[serde(default)]
    pub nodes: IndexMap<String, RawNode>,
}

impl RawNode {
    /// Resolve the node's shape, reporting `MalformedNode` when it has none
    pub fn into_node(self, id: &str) -> Result<Node, EngineError> {
        let malformed = |reason: &str| EngineError::MalformedNode {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if let Some(question) = self.question {
            let mut options = Vec::new();
            for (index, raw) in self.options.unwrap_or_default().into_iter().enumerate() {
                let next_node = raw.next_node.ok_or_else(|| {
                    malformed(&format!("option {} has no next_node", index + 1))
                })?;
                options.push(DecisionOption {
                    text: raw.text.unwrap_or_default(),
                    next_node,
                });
            }
            return Ok(Node::Decision { question, options });
        }

        match self.solution {
            Some(solution) => Ok(Node::Solution { solution }),
            None => Err(malformed("neither a question nor a solution")),
        }
    }
}

/// Result of converting a raw tree: the usable tree plus skipped nodes
#[derive(Debug, Clone)]
pub struct LoadedTree {
    pub tree: Tree,
    pub malformed: Vec<EngineError>,
}

impl Tree {
    /// Build a tree from raw nodes, skipping (and reporting) malformed ones
    pub fn from_raw(raw: RawTree) -> LoadedTree {
        let mut tree = Tree::new(raw.root_node);
        let mut malformed = Vec::new();

        for (id, raw_node) in raw.nodes {
            match raw_node.into_node(&id) {
                Ok(node) => {
                    tree.nodes.insert(id, node);
                }
                Err(e) => {
                    tracing::warn!(node = %id, "skipping malformed node: {}", e);
                    malformed.push(e);
                }
            }
        }

        LoadedTree { tree, malformed }
    }
}

// =============================================================================
// Tests
// =============================================================================
