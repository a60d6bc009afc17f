//! Export utilities for decision trees
//!
//! Provides DOT graph export and a JSON visualization payload. Both can
//! highlight nodes added or changed by a merge.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Write;

use crate::layout::{Layout, LayoutConfig};
use crate::merge::NodeStatus;
use crate::model::{Node, Tree};

/// Configuration for DOT export
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Title for the graph
    pub title: Option<String>,
    /// Include option text on edges
    pub show_options: bool,
    /// Include node IDs in labels
    pub show_ids: bool,
    /// Orientation: "TB" (top-bottom), "LR" (left-right)
    pub rankdir: String,
    /// Longest label before truncation
    pub max_label: usize,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            title: None,
            show_options: true,
            show_ids: false,
            rankdir: "TB".to_string(),
            max_label: 40,
        }
    }
}

/// Get the shape for a node
fn node_shape(node: &Node) -> &'static str {
    match node {
        Node::Decision { .. } => "diamond",
        Node::Solution { .. } => "box",
    }
}

/// Get the fill color for a node; merge status wins over kind
fn node_color(node: &Node, status: NodeStatus) -> &'static str {
    match (status, node) {
        (NodeStatus::New, _) => "#90EE90",                 // Light green
        (NodeStatus::Modified, _) => "#FFD580",            // Light orange
        (NodeStatus::Original, Node::Decision { .. }) => "#E6E6FA", // Lavender
        (NodeStatus::Original, Node::Solution { .. }) => "#87CEEB", // Sky blue
    }
}

/// Get the border style for a node
fn node_style(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Original => "filled",
        NodeStatus::New => "filled,bold",
        NodeStatus::Modified => "filled,dashed",
    }
}

/// Escape a string for DOT labels
fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Truncate a string to max length in characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Convert a tree to DOT format
///
/// `statuses` marks nodes from a merge; missing entries are `Original`.
/// With a `layout`, nodes get pinned `pos` attributes for `neato -n`.
pub fn tree_to_dot(
    tree: &Tree,
    config: &DotConfig,
    statuses: Option<&IndexMap<String, NodeStatus>>,
    layout: Option<(&Layout, &LayoutConfig)>,
) -> String {
    let mut dot = String::new();

    // Graph header
    writeln!(dot, "digraph DecisionTree {{").unwrap();
    writeln!(dot, "  rankdir={};", config.rankdir).unwrap();
    writeln!(dot, "  node [fontname=\"Arial\" fontsize=10];").unwrap();
    writeln!(dot, "  edge [fontname=\"Arial\" fontsize=9];").unwrap();

    if let Some(title) = &config.title {
        writeln!(dot, "  label=\"{}\";", escape_dot(title)).unwrap();
        writeln!(dot, "  labelloc=t;").unwrap();
        writeln!(dot, "  fontsize=14;").unwrap();
    }
    writeln!(dot).unwrap();

    // Nodes
    for (id, node) in &tree.nodes {
        let status = statuses
            .and_then(|s| s.get(id).copied())
            .unwrap_or(NodeStatus::Original);

        let mut label = String::new();
        if config.show_ids {
            write!(label, "[{}] ", id).unwrap();
        }
        label.push_str(&truncate(node.label(), config.max_label));

        let mut attrs = format!(
            "label=\"{}\" shape=\"{}\" fillcolor=\"{}\" style=\"{}\"",
            escape_dot(&label),
            node_shape(node),
            node_color(node, status),
            node_style(status)
        );
        if id == &tree.root_node {
            attrs.push_str(" penwidth=2");
        }
        if let Some((positions, layout_config)) = layout {
            if let Some(position) = positions.get(id) {
                // Graphviz y grows upward
                let y = 0.0 - layout_config.y(position.level);
                write!(attrs, " pos=\"{:.0},{:.0}!\"", position.x, y).unwrap();
            }
        }

        writeln!(dot, "  \"{}\" [{}];", escape_dot(id), attrs).unwrap();
    }

    writeln!(dot).unwrap();

    // Edges; dangling targets are left out
    for (from, to, text) in tree.relations() {
        if !tree.contains(to) {
            continue;
        }
        let mut attrs = Vec::new();
        if config.show_options && !text.is_empty() {
            let truncated = truncate(text, 30);
            attrs.push(format!("label=\"{}\"", escape_dot(&truncated)));
        }

        writeln!(
            dot,
            "  \"{}\" -> \"{}\" [{}];",
            escape_dot(from),
            escape_dot(to),
            attrs.join(" ")
        )
        .unwrap();
    }

    writeln!(dot, "}}").unwrap();

    dot
}

// =============================================================================
// Visualization JSON
// =============================================================================

/// One node as a front end draws it
#[derive(Debug, Clone, Serialize)]
pub struct VisualNode {
    pub id: String,
    pub kind: &'static str,
    pub label: String,
    pub status: NodeStatus,
    pub is_root: bool,
    pub level: usize,
    pub x: f64,
    pub y: f64,
}

/// One option edge
#[derive(Debug, Clone, Serialize)]
pub struct VisualRelation {
    pub from: String,
    pub to: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualMetadata {
    pub root_node: String,
    pub node_count: usize,
    pub relation_count: usize,
    pub new_count: usize,
    pub modified_count: usize,
    pub generated_at: String,
}

/// Everything a renderer needs: positioned nodes, edges, counts
#[derive(Debug, Clone, Serialize)]
pub struct VisualizationData {
    pub nodes: Vec<VisualNode>,
    pub relations: Vec<VisualRelation>,
    pub metadata: VisualMetadata,
}

/// Build the visualization payload for `tree`
pub fn visualization_data(
    tree: &Tree,
    layout: &Layout,
    layout_config: &LayoutConfig,
    statuses: Option<&IndexMap<String, NodeStatus>>,
) -> VisualizationData {
    let status_of = |id: &str| {
        statuses
            .and_then(|s| s.get(id).copied())
            .unwrap_or(NodeStatus::Original)
    };

    let nodes: Vec<VisualNode> = tree
        .nodes
        .iter()
        .map(|(id, node)| {
            let (level, x) = layout
                .get(id)
                .map(|p| (p.level, p.x))
                .unwrap_or((0, layout_config.origin_x));
            VisualNode {
                id: id.clone(),
                kind: node.kind(),
                label: node.label().to_string(),
                status: status_of(id),
                is_root: id == &tree.root_node,
                level,
                x,
                y: layout_config.y(level),
            }
        })
        .collect();

    let relations: Vec<VisualRelation> = tree
        .relations()
        .into_iter()
        .filter(|(_, to, _)| tree.contains(to))
        .map(|(from, to, text)| VisualRelation {
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
        })
        .collect();

    let count = |wanted: NodeStatus| nodes.iter().filter(|n| n.status == wanted).count();
    let metadata = VisualMetadata {
        root_node: tree.root_node.clone(),
        node_count: nodes.len(),
        relation_count: relations.len(),
        new_count: count(NodeStatus::New),
        modified_count: count(NodeStatus::Modified),
        generated_at: chrono::Local::now().to_rfc3339(),
    };

    VisualizationData {
        nodes,
        relations,
        metadata,
    }
}
