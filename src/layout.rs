//! Level/x layout for rendering a decision tree
//!
//! Levels come from a breadth-first walk from every root. Horizontal
//! positions come from leaves: leaves are spread evenly left to right, and
//! every other node sits at the mean x of *all* leaves below it, not just
//! its direct children. No per-level redistribution runs afterwards.
//!
//! Every walk keeps a visited set, so cyclic input terminates.

use std::collections::{BTreeMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::model::Tree;

pub const DEFAULT_MIN_SPACING: f64 = 180.0;
pub const DEFAULT_ORIGIN_X: f64 = 600.0;
pub const DEFAULT_LEVEL_SPACING: f64 = 120.0;

/// Spacing parameters for `layout_with`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Horizontal gap between adjacent leaves
    pub min_spacing: f64,
    /// Centre of the leaf row
    pub origin_x: f64,
    /// Vertical gap between levels, for renderers that want a y
    pub level_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_spacing: DEFAULT_MIN_SPACING,
            origin_x: DEFAULT_ORIGIN_X,
            level_spacing: DEFAULT_LEVEL_SPACING,
        }
    }
}

impl LayoutConfig {
    pub fn y(&self, level: usize) -> f64 {
        level as f64 * self.level_spacing
    }
}

/// Where one node goes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub level: usize,
    pub x: f64,
}

/// Positions for every node in a tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    /// Nodes nothing else points at, in tree order
    pub roots: Vec<String>,
    /// One entry per node, in tree order
    pub positions: IndexMap<String, Position>,
}

impl Layout {
    pub fn get(&self, id: &str) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn max_level(&self) -> usize {
        self.positions.values().map(|p| p.level).max().unwrap_or(0)
    }

    /// Node IDs grouped by level, each group in tree order
    pub fn by_level(&self) -> BTreeMap<usize, Vec<&str>> {
        let mut groups: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for (id, pos) in &self.positions {
            groups.entry(pos.level).or_default().push(id);
        }
        groups
    }
}

// =============================================================================
// Graph helpers
// =============================================================================

/// Nodes that no option of any *other* node points to
pub fn find_roots(tree: &Tree) -> Vec<String> {
    let pointed_at: HashSet<&str> = tree
        .nodes
        .iter()
        .flat_map(|(id, node)| {
            node.options()
                .iter()
                .map(|opt| opt.next_node.as_str())
                .filter(move |target| *target != id.as_str())
        })
        .collect();

    tree.nodes
        .keys()
        .filter(|id| !pointed_at.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Every node reachable from `id` through options, excluding `id` itself,
/// in breadth-first order
pub fn descendants(tree: &Tree, id: &str) -> IndexSet<String> {
    let mut found: IndexSet<String> = IndexSet::new();
    let mut queue: VecDeque<&str> = tree.children(id).collect();

    while let Some(current) = queue.pop_front() {
        if current == id || !found.insert(current.to_string()) {
            continue;
        }
        queue.extend(tree.children(current));
    }

    found
}

/// Solution nodes, and decision nodes with no option leading anywhere real
pub fn is_leaf(tree: &Tree, id: &str) -> bool {
    match tree.node(id) {
        Some(node) => node.is_solution() || tree.children(id).next().is_none(),
        None => false,
    }
}

/// Start points for whole-graph walks: discovered roots, then the tree's
/// declared root, then every node in order. Walks skip seeds they already
/// visited, so the tail only matters for nodes no root reaches.
fn seeds<'a>(tree: &'a Tree, roots: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
    roots
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(tree.root_node.as_str()).filter(move |r| tree.contains(r)))
        .chain(tree.nodes.keys().map(String::as_str))
}

/// First-seen breadth-first depth of every node
pub fn assign_levels(tree: &Tree, roots: &[String]) -> IndexMap<String, usize> {
    let mut levels: IndexMap<String, usize> = IndexMap::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

    for seed in seeds(tree, roots) {
        if levels.contains_key(seed) {
            continue;
        }
        if !roots.iter().any(|r| r == seed) {
            tracing::debug!(node = %seed, "seeding layout at level 0; no root reaches it");
        }
        levels.insert(seed.to_string(), 0);
        queue.push_back((seed, 0));

        while let Some((id, level)) = queue.pop_front() {
            for child in tree.children(id) {
                if !levels.contains_key(child) {
                    levels.insert(child.to_string(), level + 1);
                    queue.push_back((child, level + 1));
                }
            }
        }
    }

    levels
}

/// Leaves in depth-first preorder from the seeds, following option order
fn leaf_order(tree: &Tree, roots: &[String]) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut leaves = Vec::new();

    for seed in seeds(tree, roots) {
        let mut stack = vec![seed];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if is_leaf(tree, id) {
                leaves.push(id.to_string());
            }
            let children: Vec<&str> = tree.children(id).collect();
            stack.extend(children.into_iter().rev());
        }
    }

    leaves
}

// =============================================================================
// Layout
// =============================================================================

/// Lay out `tree` with default spacing
pub fn layout(tree: &Tree) -> Layout {
    layout_with(tree, &LayoutConfig::default())
}

/// Lay out `tree`: levels by BFS depth, x by descendant-leaf mean
pub fn layout_with(tree: &Tree, config: &LayoutConfig) -> Layout {
    let roots = find_roots(tree);
    let levels = assign_levels(tree, &roots);

    let leaves = leaf_order(tree, &roots);
    let span = leaves.len().saturating_sub(1) as f64 * config.min_spacing;
    let start_x = config.origin_x - span / 2.0;
    let leaf_x: IndexMap<&str, f64> = leaves
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), start_x + i as f64 * config.min_spacing))
        .collect();

    let mut positions = IndexMap::with_capacity(tree.len());
    for id in tree.nodes.keys() {
        let x = match leaf_x.get(id.as_str()) {
            Some(x) => *x,
            None => {
                let below: Vec<f64> = descendants(tree, id)
                    .iter()
                    .filter_map(|d| leaf_x.get(d.as_str()).copied())
                    .collect();
                if below.is_empty() {
                    config.origin_x
                } else {
                    below.iter().sum::<f64>() / below.len() as f64
                }
            }
        };
        let level = levels.get(id).copied().unwrap_or(0);
        positions.insert(id.clone(), Position { level, x });
    }

    Layout { roots, positions }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecisionOption, Node};
    use proptest::prelude::*;

    fn q(question: &str, targets: &[&str]) -> Node {
        Node::decision(
            question,
            targets
                .iter()
                .map(|t| DecisionOption::new(format!("to {}", t), *t))
                .collect(),
        )
    }

    /// start -> {net -> {wired, wireless}, hw -> {ram}}
    fn lopsided_tree() -> Tree {
        Tree::new("start")
            .with_node("start", q("Type?", &["net", "hw"]))
            .with_node("net", q("Which link?", &["wired", "wireless"]))
            .with_node("hw", q("Which part?", &["ram"]))
            .with_node("wired", Node::solution("Check cable"))
            .with_node("wireless", Node::solution("Restart router"))
            .with_node("ram", Node::solution("Reseat RAM"))
    }

    #[test]
    fn test_find_roots() {
        let tree = lopsided_tree().with_node("orphan", Node::solution("Alone"));
        assert_eq!(find_roots(&tree), vec!["start", "orphan"]);
    }

    #[test]
    fn test_self_loop_does_not_hide_root() {
        let tree = Tree::new("a").with_node("a", q("Again?", &["a"]));
        assert_eq!(find_roots(&tree), vec!["a"]);
    }

    #[test]
    fn test_levels() {
        let layout = layout(&lopsided_tree());
        assert_eq!(layout.get("start").unwrap().level, 0);
        assert_eq!(layout.get("hw").unwrap().level, 1);
        assert_eq!(layout.get("wireless").unwrap().level, 2);
        assert_eq!(layout.max_level(), 2);
        assert_eq!(layout.by_level()[&1], vec!["net", "hw"]);
    }

    #[test]
    fn test_leaves_spread_around_origin() {
        let layout = layout(&lopsided_tree());
        // Three leaves, 180 apart, centred on 600
        assert_eq!(layout.get("wired").unwrap().x, 420.0);
        assert_eq!(layout.get("wireless").unwrap().x, 600.0);
        assert_eq!(layout.get("ram").unwrap().x, 780.0);
    }

    #[test]
    fn test_parent_uses_all_descendant_leaves() {
        let layout = layout(&lopsided_tree());
        assert_eq!(layout.get("net").unwrap().x, 510.0);
        assert_eq!(layout.get("hw").unwrap().x, 780.0);
        // Mean of all three leaves, not of its two children (645)
        assert_eq!(layout.get("start").unwrap().x, 600.0);
    }

    #[test]
    fn test_single_leaf_sits_on_origin() {
        let tree = Tree::new("fix").with_node("fix", Node::solution("Reboot"));
        let layout = layout(&tree);
        assert_eq!(layout.get("fix"), Some(&Position { level: 0, x: 600.0 }));
        assert_eq!(layout.roots, vec!["fix"]);
    }

    #[test]
    fn test_custom_spacing() {
        let config = LayoutConfig {
            min_spacing: 100.0,
            origin_x: 0.0,
            level_spacing: 50.0,
        };
        let layout = layout_with(&lopsided_tree(), &config);
        assert_eq!(layout.get("wired").unwrap().x, -100.0);
        assert_eq!(layout.get("ram").unwrap().x, 100.0);
        assert_eq!(config.y(2), 100.0);
    }

    #[test]
    fn test_cycle_terminates_with_one_level_each() {
        // start -> a -> b -> a
        let tree = Tree::new("start")
            .with_node("start", q("Begin", &["a"]))
            .with_node("a", q("A", &["b"]))
            .with_node("b", q("B", &["a"]));
        let layout = layout(&tree);

        assert_eq!(layout.positions.len(), 3);
        assert_eq!(layout.get("a").unwrap().level, 1);
        assert_eq!(layout.get("b").unwrap().level, 2);
        // No leaves anywhere: everything sits on the origin
        assert!(layout.positions.values().all(|p| p.x == DEFAULT_ORIGIN_X));
    }

    #[test]
    fn test_rootless_cycle_is_still_leveled() {
        let tree = Tree::new("a")
            .with_node("a", q("A", &["b"]))
            .with_node("b", q("B", &["a"]));
        let layout = layout(&tree);

        assert!(layout.roots.is_empty());
        assert_eq!(layout.get("a").unwrap().level, 0);
        assert_eq!(layout.get("b").unwrap().level, 1);
    }

    #[test]
    fn test_shared_target_leveled_once() {
        let tree = Tree::new("start")
            .with_node("start", q("Type?", &["a", "shared"]))
            .with_node("a", q("A?", &["shared"]))
            .with_node("shared", Node::solution("Common fix"));
        let layout = layout(&tree);
        assert_eq!(layout.get("shared").unwrap().level, 1);
        assert_eq!(descendants(&tree, "start").len(), 2);
    }

    #[test]
    fn test_dangling_targets_ignored() {
        let tree = Tree::new("start")
            .with_node("start", q("Type?", &["ghost", "fix"]))
            .with_node("lonely", q("Nowhere", &["ghost"]))
            .with_node("fix", Node::solution("Fix"));

        assert!(is_leaf(&tree, "lonely"));
        assert!(!is_leaf(&tree, "start"));
        let layout = layout(&tree);
        assert_eq!(layout.positions.len(), 3);
        assert_eq!(layout.get("start").unwrap().x, layout.get("fix").unwrap().x);
    }

    #[test]
    fn test_disconnected_fragments_each_seed() {
        let tree = lopsided_tree()
            .with_node("island", q("Other?", &["island_fix"]))
            .with_node("island_fix", Node::solution("Elsewhere"));
        let layout = layout(&tree);

        assert_eq!(layout.roots, vec!["start", "island"]);
        assert_eq!(layout.get("island").unwrap().level, 0);
        assert_eq!(layout.get("island_fix").unwrap().level, 1);
        // Four leaves now; the island's leaf is last
        assert_eq!(layout.get("island_fix").unwrap().x, 870.0);
    }

    proptest! {
        #[test]
        fn prop_layout_covers_every_node(
            edges in proptest::collection::vec((0..8usize, 0..8usize), 0..24)
        ) {
            let mut tree = Tree::new("n0");
            for i in 0..8 {
                let targets: Vec<String> = edges
                    .iter()
                    .filter(|(from, _)| *from == i)
                    .map(|(_, to)| format!("n{}", to))
                    .collect();
                let node = if targets.is_empty() {
                    Node::solution(format!("fix {}", i))
                } else {
                    Node::decision(
                        format!("q{}", i),
                        targets.iter().map(|t| DecisionOption::new(t.clone(), t.clone())).collect(),
                    )
                };
                tree.nodes.insert(format!("n{}", i), node);
            }

            let result = layout(&tree);
            prop_assert_eq!(result.positions.len(), tree.len());
            for pos in result.positions.values() {
                prop_assert!(pos.level < tree.len());
                prop_assert!(pos.x.is_finite());
            }
        }
    }
}
