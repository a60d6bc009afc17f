//! Merge fragments into trees and diff them against trees
//!
//! One merge routine serves every caller; `DedupStrategy` picks how an
//! existing link to the fragment is recognised.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::convert::Fragment;
use crate::error::{EngineError, Result};
use crate::model::{DecisionOption, Node, Tree};

/// Link text used when the fragment's entry node has no question
pub const FALLBACK_LINK_TEXT: &str = "New issue";

/// How an existing link to the fragment is recognised under the root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// A root option with the same text leading to the entry node. Same
    /// text leading elsewhere gets a numbered link text instead.
    #[default]
    ByText,
    /// A root option already pointing at the entry node
    ById,
}

/// What happened at the target root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LinkOutcome {
    /// A new option was appended to the root
    Linked { text: String, entry_node: String },
    /// The root already links to this fragment; nothing appended
    Duplicate { text: String, entry_node: String },
    /// The fragment named its own root, which replaced the target's
    RootReplaced { root: String },
}

/// Result of a merge: the new tree plus what changed
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub tree: Tree,
    pub link: LinkOutcome,
    /// Fragment node IDs written into the tree, in fragment order
    pub upserted: Vec<String>,
    /// Subset of `upserted` that replaced a node with different content
    pub overwritten: Vec<String>,
}

impl MergeOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self.link, LinkOutcome::Duplicate { .. })
    }
}

/// Splice `fragment` into a copy of `target`
///
/// Links the fragment's entry node from the root (unless `strategy` finds an
/// existing link), then upserts every fragment node. Fragment nodes win on
/// ID collisions. `target` itself is never modified.
///
/// A fragment whose entry node is missing from its own node map is rejected
/// with `NodeNotFound`; a link to it would dangle.
pub fn merge(target: &Tree, fragment: &Fragment, strategy: DedupStrategy) -> Result<MergeOutcome> {
    if let Some(root) = &fragment.root_node {
        let mut tree = target.clone();
        let (upserted, overwritten) = upsert(&mut tree, fragment);
        tree.root_node = root.clone();
        tracing::info!(root = %root, nodes = upserted.len(), "fragment replaced tree root");
        return Ok(MergeOutcome {
            tree,
            link: LinkOutcome::RootReplaced { root: root.clone() },
            upserted,
            overwritten,
        });
    }

    if target.is_empty() {
        return Err(EngineError::EmptyTree);
    }
    let root_id = target.root_node.as_str();
    let root = target
        .node(root_id)
        .ok_or_else(|| EngineError::NodeNotFound(root_id.to_string()))?;
    if root.is_solution() {
        return Err(EngineError::MalformedNode {
            id: root_id.to_string(),
            reason: "root is a solution node and cannot link a fragment".to_string(),
        });
    }
    if !fragment.nodes.contains_key(&fragment.entry_node) {
        return Err(EngineError::NodeNotFound(fragment.entry_node.clone()));
    }

    let text = fragment
        .entry_question()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(FALLBACK_LINK_TEXT)
        .to_string();
    let entry_node = fragment.entry_node.clone();
    let options = root.options();

    let existing = match strategy {
        DedupStrategy::ByText => options
            .iter()
            .find(|opt| opt.next_node == entry_node && is_text_variant(&opt.text, &text)),
        DedupStrategy::ById => options.iter().find(|opt| opt.next_node == entry_node),
    };

    let mut tree = target.clone();
    let link = if let Some(opt) = existing {
        tracing::info!(text = %opt.text, entry = %entry_node, "root already links this entry; skipping");
        LinkOutcome::Duplicate {
            text: opt.text.clone(),
            entry_node,
        }
    } else {
        let text = if options.iter().any(|opt| opt.text == text) {
            let unique = disambiguate(options, &text);
            tracing::warn!(text = %text, link = %unique, entry = %entry_node, "root option text already leads elsewhere");
            unique
        } else {
            text
        };
        if let Some(Node::Decision { options, .. }) = tree.nodes.get_mut(root_id) {
            options.push(DecisionOption::new(text.clone(), entry_node.clone()));
        }
        tracing::info!(text = %text, entry = %entry_node, "linked fragment under root");
        LinkOutcome::Linked { text, entry_node }
    };

    let (upserted, overwritten) = upsert(&mut tree, fragment);
    Ok(MergeOutcome {
        tree,
        link,
        upserted,
        overwritten,
    })
}

/// `candidate` is `base` or `base` with a ` (n)` suffix from `disambiguate`
fn is_text_variant(candidate: &str, base: &str) -> bool {
    candidate == base
        || candidate
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix(" ("))
            .and_then(|rest| rest.strip_suffix(')'))
            .is_some_and(|n| n.parse::<u32>().is_ok())
}

/// First `"{text} (n)"`, n >= 2, not already used by a root option
fn disambiguate(options: &[DecisionOption], text: &str) -> String {
    (2u32..)
        .map(|n| format!("{} ({})", text, n))
        .find(|candidate| options.iter().all(|opt| &opt.text != candidate))
        .unwrap_or_else(|| text.to_string())
}

fn upsert(tree: &mut Tree, fragment: &Fragment) -> (Vec<String>, Vec<String>) {
    let mut upserted = Vec::with_capacity(fragment.nodes.len());
    let mut overwritten = Vec::new();

    for (id, node) in &fragment.nodes {
        if let Some(previous) = tree.nodes.insert(id.clone(), node.clone()) {
            if &previous != node {
                tracing::warn!(node = %id, "merge overwrote an existing node with different content");
                overwritten.push(id.clone());
            }
        }
        upserted.push(id.clone());
    }

    (upserted, overwritten)
}

// =============================================================================
// Diff
// =============================================================================

/// Fragment node IDs classified against a tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// In the fragment, not in the tree (fragment order)
    pub added: Vec<String>,
    /// In both (fragment order)
    pub modified: Vec<String>,
    /// In the tree, not in the fragment (tree order); merge never deletes
    pub deleted: Vec<String>,
}

impl DiffResult {
    pub fn total_changes(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn status(&self, id: &str) -> NodeStatus {
        if self.added.iter().any(|a| a == id) {
            NodeStatus::New
        } else if self.modified.iter().any(|m| m == id) {
            NodeStatus::Modified
        } else {
            NodeStatus::Original
        }
    }
}

/// Set algebra over node IDs: added = F - T, modified = F ∩ T, deleted = T - F
pub fn diff(target: &Tree, fragment: &Fragment) -> DiffResult {
    let (modified, added): (Vec<String>, Vec<String>) = fragment
        .nodes
        .keys()
        .cloned()
        .partition(|id| target.contains(id));

    let deleted = target
        .nodes
        .keys()
        .filter(|id| !fragment.nodes.contains_key(*id))
        .cloned()
        .collect();

    DiffResult {
        added,
        modified,
        deleted,
    }
}

/// Counts for a diff, in the shape reports print
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub total_changes: usize,
}

/// A diff plus summary and generation time, for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub summary: DiffSummary,
    pub details: DiffResult,
    pub generated_at: String,
}

impl DiffReport {
    pub fn new(details: DiffResult) -> Self {
        Self {
            summary: DiffSummary {
                added: details.added.len(),
                modified: details.modified.len(),
                deleted: details.deleted.len(),
                total_changes: details.total_changes(),
            },
            details,
            generated_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Render status of a node after a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Original,
    New,
    Modified,
}

/// Status of every node in `merged`, in tree order
pub fn classify(merged: &Tree, diff: &DiffResult) -> IndexMap<String, NodeStatus> {
    merged
        .nodes
        .keys()
        .map(|id| (id.clone(), diff.status(id)))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{convert, DiagnosticPath, PathStep};
    use proptest::prelude::*;

    fn start_tree() -> Tree {
        Tree::new("start")
            .with_node(
                "start",
                Node::decision("Type?", vec![DecisionOption::new("Network", "net")]),
            )
            .with_node("net", Node::solution("Check cable"))
    }

    fn wifi_fragment() -> Fragment {
        convert(&DiagnosticPath {
            problem: "wifi".to_string(),
            steps: vec![PathStep {
                step: Some(1),
                question: "Wifi on?".to_string(),
                answer: "yes".to_string(),
            }],
            solution: "Restart router".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_merge_links_under_root() {
        let target = start_tree();
        let outcome = merge(&target, &wifi_fragment(), DedupStrategy::ByText).unwrap();

        assert_eq!(
            outcome.link,
            LinkOutcome::Linked {
                text: "Wifi on?".to_string(),
                entry_node: "wifi_issue".to_string()
            }
        );
        let root_options = outcome.tree.node("start").unwrap().options();
        assert_eq!(root_options.len(), 2);
        assert_eq!(root_options[1], DecisionOption::new("Wifi on?", "wifi_issue"));
        assert_eq!(outcome.tree.len(), target.len() + 3);
        assert_eq!(outcome.tree.root_node, "start");
        assert!(crate::model::validate(&outcome.tree).is_empty());

        // Target untouched
        assert_eq!(target, start_tree());
    }

    #[test]
    fn test_merge_existing_solution_id_counts_once() {
        let target = start_tree().with_node("solution", Node::solution("Old fix"));
        let outcome = merge(&target, &wifi_fragment(), DedupStrategy::ByText).unwrap();

        assert_eq!(outcome.tree.len(), target.len() + 2);
        assert_eq!(outcome.overwritten, vec!["solution".to_string()]);
        assert_eq!(
            outcome.tree.node("solution"),
            Some(&Node::solution("Restart router"))
        );
    }

    #[test]
    fn test_merge_twice_is_idempotent_on_link() {
        let fragment = wifi_fragment();
        let once = merge(&start_tree(), &fragment, DedupStrategy::ByText).unwrap();
        let twice = merge(&once.tree, &fragment, DedupStrategy::ByText).unwrap();

        assert!(twice.is_duplicate());
        assert_eq!(twice.tree.node("start").unwrap().options().len(), 2);
        assert_eq!(twice.upserted.len(), 3);
        assert!(twice.overwritten.is_empty());
        assert_eq!(twice.tree, once.tree);
    }

    #[test]
    fn test_dedup_by_id() {
        let target = start_tree();
        let mut tree = target.clone();
        if let Some(Node::Decision { options, .. }) = tree.nodes.get_mut("start") {
            options.push(DecisionOption::new("Wireless trouble", "wifi_issue"));
        }

        // Same entry ID, different text: ById sees a duplicate, ByText doesn't
        let by_id = merge(&tree, &wifi_fragment(), DedupStrategy::ById).unwrap();
        assert!(by_id.is_duplicate());
        let by_text = merge(&tree, &wifi_fragment(), DedupStrategy::ByText).unwrap();
        assert!(!by_text.is_duplicate());
        assert_eq!(by_text.tree.node("start").unwrap().options().len(), 3);
    }

    fn hashed_fragment(solution: &str) -> Fragment {
        crate::convert::convert_with(
            &DiagnosticPath {
                problem: "wifi".to_string(),
                steps: vec![PathStep {
                    step: Some(1),
                    question: "Wifi on?".to_string(),
                    answer: "yes".to_string(),
                }],
                solution: solution.to_string(),
            },
            crate::convert::IdScheme::ContentHash,
        )
        .unwrap()
    }

    #[test]
    fn test_same_question_different_entry_gets_numbered_link() {
        let first = hashed_fragment("Restart router");
        let second = hashed_fragment("Move closer to the access point");
        assert_ne!(first.entry_node, second.entry_node);

        let once = merge(&start_tree(), &first, DedupStrategy::ByText).unwrap();
        let twice = merge(&once.tree, &second, DedupStrategy::ByText).unwrap();

        assert_eq!(
            twice.link,
            LinkOutcome::Linked {
                text: "Wifi on? (2)".to_string(),
                entry_node: second.entry_node.clone()
            }
        );
        let root_options = twice.tree.node("start").unwrap().options();
        assert_eq!(root_options.len(), 3);
        assert_eq!(root_options[1].next_node, first.entry_node);
        assert_eq!(root_options[2].next_node, second.entry_node);

        // Both fragments stay reachable from the root
        let reachable = crate::layout::descendants(&twice.tree, "start");
        assert!(reachable.contains(&first.entry_node));
        assert!(reachable.contains(&second.entry_node));
        assert!(crate::model::validate(&twice.tree).is_empty());

        // Re-merging either fragment finds its own link
        let again = merge(&twice.tree, &second, DedupStrategy::ByText).unwrap();
        assert_eq!(
            again.link,
            LinkOutcome::Duplicate {
                text: "Wifi on? (2)".to_string(),
                entry_node: second.entry_node.clone()
            }
        );
        assert_eq!(again.tree, twice.tree);
        assert!(merge(&twice.tree, &first, DedupStrategy::ByText)
            .unwrap()
            .is_duplicate());
    }

    #[test]
    fn test_numbered_link_skips_taken_suffix() {
        let mut target = start_tree();
        if let Some(Node::Decision { options, .. }) = target.nodes.get_mut("start") {
            options.push(DecisionOption::new("Wifi on?", "net"));
            options.push(DecisionOption::new("Wifi on? (2)", "net"));
        }
        let outcome = merge(&target, &wifi_fragment(), DedupStrategy::ByText).unwrap();
        assert_eq!(
            outcome.link,
            LinkOutcome::Linked {
                text: "Wifi on? (3)".to_string(),
                entry_node: "wifi_issue".to_string()
            }
        );
    }

    #[test]
    fn test_merge_rejects_fragment_without_entry_node() {
        let mut fragment = wifi_fragment();
        fragment.entry_node = "elsewhere".to_string();
        let target = start_tree();

        assert_eq!(
            merge(&target, &fragment, DedupStrategy::ByText).unwrap_err(),
            EngineError::NodeNotFound("elsewhere".to_string())
        );
        assert_eq!(target, start_tree());
    }

    #[test]
    fn test_text_variant() {
        assert!(is_text_variant("Wifi on?", "Wifi on?"));
        assert!(is_text_variant("Wifi on? (12)", "Wifi on?"));
        assert!(!is_text_variant("Wifi on? (x)", "Wifi on?"));
        assert!(!is_text_variant("Wifi on", "Wifi on?"));
    }

    #[test]
    fn test_merge_fallback_link_text() {
        let mut fragment = wifi_fragment();
        fragment
            .nodes
            .insert("wifi_issue".to_string(), Node::solution("Just reboot"));
        let outcome = merge(&start_tree(), &fragment, DedupStrategy::ByText).unwrap();
        assert_eq!(
            outcome.tree.node("start").unwrap().options()[1].text,
            FALLBACK_LINK_TEXT
        );
    }

    #[test]
    fn test_merge_explicit_root_replaces() {
        let mut fragment = wifi_fragment();
        fragment.root_node = Some("wifi_issue".to_string());
        let outcome = merge(&Tree::new("start"), &fragment, DedupStrategy::ByText).unwrap();

        assert_eq!(outcome.tree.root_node, "wifi_issue");
        assert_eq!(
            outcome.link,
            LinkOutcome::RootReplaced {
                root: "wifi_issue".to_string()
            }
        );
        assert_eq!(outcome.tree.len(), 3);
    }

    #[test]
    fn test_merge_errors() {
        assert_eq!(
            merge(&Tree::new("start"), &wifi_fragment(), DedupStrategy::ByText).unwrap_err(),
            EngineError::EmptyTree
        );

        let mut missing_root = start_tree();
        missing_root.root_node = "gone".to_string();
        assert_eq!(
            merge(&missing_root, &wifi_fragment(), DedupStrategy::ByText).unwrap_err(),
            EngineError::NodeNotFound("gone".to_string())
        );

        let solution_root = Tree::new("fix").with_node("fix", Node::solution("Reboot"));
        assert!(matches!(
            merge(&solution_root, &wifi_fragment(), DedupStrategy::ByText),
            Err(EngineError::MalformedNode { id, .. }) if id == "fix"
        ));
    }

    #[test]
    fn test_diff() {
        let target = start_tree().with_node("solution", Node::solution("Old fix"));
        let result = diff(&target, &wifi_fragment());

        assert_eq!(result.added, vec!["wifi_issue", "step_1"]);
        assert_eq!(result.modified, vec!["solution"]);
        assert_eq!(result.deleted, vec!["start", "net"]);
        assert_eq!(result.total_changes(), 5);
        assert_eq!(result.status("step_1"), NodeStatus::New);
        assert_eq!(result.status("solution"), NodeStatus::Modified);
        assert_eq!(result.status("start"), NodeStatus::Original);
    }

    #[test]
    fn test_diff_report_and_classify() {
        let target = start_tree();
        let fragment = wifi_fragment();
        let result = diff(&target, &fragment);
        let merged = merge(&target, &fragment, DedupStrategy::ByText).unwrap().tree;

        let statuses = classify(&merged, &result);
        assert_eq!(statuses["start"], NodeStatus::Original);
        assert_eq!(statuses["wifi_issue"], NodeStatus::New);

        let report = DiffReport::new(result);
        assert_eq!(report.summary.added, 3);
        assert_eq!(report.summary.total_changes, 5);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["details"]["added"][0], "wifi_issue");
    }

    fn arb_ids() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-d][0-3]", 0..8)
    }

    proptest! {
        #[test]
        fn prop_diff_partitions_fragment(tree_ids in arb_ids(), frag_ids in arb_ids()) {
            let mut tree = Tree::new("root");
            for id in &tree_ids {
                tree.nodes.insert(id.clone(), Node::solution("t"));
            }
            let mut nodes = IndexMap::new();
            for id in &frag_ids {
                nodes.insert(id.clone(), Node::solution("f"));
            }
            let fragment = Fragment { entry_node: "x".to_string(), nodes, root_node: None };

            let result = diff(&tree, &fragment);
            prop_assert!(result.added.iter().all(|a| !result.modified.contains(a)));

            let mut union: Vec<&String> = result.added.iter().chain(&result.modified).collect();
            union.sort();
            let mut expected: Vec<&String> = fragment.nodes.keys().collect();
            expected.sort();
            prop_assert_eq!(union, expected);
        }
    }
}
