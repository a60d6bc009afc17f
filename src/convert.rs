//! Convert a linear diagnostic path into a tree fragment
//!
//! A path is what an external transcript analyser hands back: a problem
//! label, the question/answer steps that were taken, and the fix that worked.
//! The fragment is a chain `entry -> step_1 -> ... -> step_n -> solution`
//! that `merge` can splice under an existing root.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};
use crate::model::{DecisionOption, Node};

/// Fixed ID of the terminal node in label-scheme fragments
pub const SOLUTION_ID: &str = "solution";

/// One question/answer exchange in a diagnostic path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// Ordinal as reported by the analyser; position is used when absent
    #[serde(default)]
    pub step: Option<u32>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

/// A linear diagnosis: problem, steps taken, final fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticPath {
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub steps: Vec<PathStep>,
    #[serde(default)]
    pub solution: String,
}

/// A small tree produced from one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Node to link from the target tree's root
    pub entry_node: String,
    pub nodes: IndexMap<String, Node>,
    /// When set, merging replaces the target's root instead of linking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_node: Option<String>,
}

impl Fragment {
    /// Entry node's question, used as the link text under the target root
    pub fn entry_question(&self) -> Option<&str> {
        self.nodes.get(&self.entry_node).and_then(Node::question)
    }
}

/// How fragment node IDs are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    /// `wifi_issue`, `step_1`, `solution`
    #[default]
    Label,
    /// Every ID prefixed by the label and a hash of the whole path, so
    /// fragments from different transcripts never share IDs
    ContentHash,
}

/// Entry node ID for a problem label: lower-cased, spaces to `_`, `_issue`
pub fn entry_id(problem: &str) -> String {
    let label = problem.trim();
    let label = if label.is_empty() { "problem" } else { label };
    format!("{}_issue", label.replace(' ', "_").to_lowercase())
}

/// First 8 hex digits of SHA-256 over the path's JSON form
pub fn content_hash(path: &DiagnosticPath) -> String {
    let content = serde_json::to_string(path).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// Convert `path` with plain label-derived IDs
pub fn convert(path: &DiagnosticPath) -> Result<Fragment> {
    convert_with(path, IdScheme::Label)
}

/// Convert `path`, naming nodes per `scheme`
pub fn convert_with(path: &DiagnosticPath, scheme: IdScheme) -> Result<Fragment> {
    let (first, last_index) = match path.steps.first() {
        Some(first) => (first, path.steps.len() - 1),
        None => return Err(EngineError::EmptyPath),
    };

    let base = entry_id(&path.problem);
    let (entry_node, prefix) = match scheme {
        IdScheme::Label => (base, String::new()),
        IdScheme::ContentHash => {
            let entry = format!("{}_{}", base, content_hash(path));
            let prefix = format!("{}_", entry);
            (entry, prefix)
        }
    };
    let step_id = |index: usize| {
        let n = path.steps[index].step.unwrap_or(index as u32 + 1);
        format!("{}step_{}", prefix, n)
    };
    let solution_id = format!("{}{}", prefix, SOLUTION_ID);
    let fallback_question = |question: &str| {
        if question.trim().is_empty() {
            path.problem.clone()
        } else {
            question.to_string()
        }
    };

    let mut nodes = IndexMap::new();
    nodes.insert(
        entry_node.clone(),
        Node::decision(
            fallback_question(&first.question),
            vec![DecisionOption::new(first.answer.clone(), step_id(0))],
        ),
    );

    for (index, step) in path.steps.iter().enumerate() {
        let id = step_id(index);
        let node = if index < last_index {
            let next = &path.steps[index + 1];
            Node::decision(
                next.question.clone(),
                vec![DecisionOption::new(next.answer.clone(), step_id(index + 1))],
            )
        } else {
            Node::decision(
                fallback_question(&step.question),
                vec![DecisionOption::new("", solution_id.clone())],
            )
        };

        if nodes.insert(id.clone(), node).is_some() {
            tracing::warn!(node = %id, "duplicate step number in path; later step wins");
        }
    }

    if !path.solution.trim().is_empty() {
        nodes.insert(solution_id, Node::solution(path.solution.clone()));
    }

    tracing::debug!(entry = %entry_node, nodes = nodes.len(), "converted path to fragment");

    Ok(Fragment {
        entry_node,
        nodes,
        root_node: None,
    })
}
