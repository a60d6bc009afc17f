//! diagtree - Troubleshooting decision trees that grow from real diagnoses
//!
//! Walk a support tree interactively, turn the path a transcript analyser
//! extracted from a solved case into a subtree, and splice it back in.
//!
//! # Overview
//!
//! A tree is a map of node IDs to nodes. Each node either asks a question
//! with options leading to other nodes, or states a solution. The tree is
//! plain data; every engine operation is a pure function over it.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `model` | Tree, nodes, structural validation, lenient loading |
//! | `matching` | Fuzzy scoring of free-text answers |
//! | `traversal` | Sessions and the interactive reducer |
//! | `convert` | Diagnostic path to tree fragment |
//! | `merge` | Splice fragments in, diff them against a tree |
//! | `layout` | Level/x positions for renderers |
//! | `store`, `ingest`, `export`, `config` | Files, analyser output, DOT/JSON, settings |
//!
//! # Quick Start
//!
//! ```
//! use diagtree::{convert, merge, DedupStrategy, DecisionOption, DiagnosticPath, Node, PathStep, Tree};
//!
//! let tree = Tree::new("start").with_node(
//!     "start",
//!     Node::decision("What kind of problem?", vec![DecisionOption::new("Network", "net")]),
//! ).with_node("net", Node::solution("Restart the router"));
//!
//! let path = DiagnosticPath {
//!     problem: "wifi".to_string(),
//!     steps: vec![PathStep { step: Some(1), question: "Wifi on?".to_string(), answer: "yes".to_string() }],
//!     solution: "Restart router".to_string(),
//! };
//!
//! let fragment = convert(&path).unwrap();
//! let merged = merge(&tree, &fragment, DedupStrategy::ByText).unwrap();
//! assert_eq!(merged.tree.root().unwrap().options().len(), 2);
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod ingest;
pub mod layout;
pub mod logging;
pub mod matching;
pub mod merge;
pub mod model;
pub mod store;
pub mod traversal;

pub use config::Config;
pub use convert::{convert, convert_with, DiagnosticPath, Fragment, IdScheme, PathStep};
pub use error::EngineError;
pub use export::{tree_to_dot, visualization_data, DotConfig, VisualizationData};
pub use ingest::path_from_response;
pub use layout::{layout, layout_with, Layout, LayoutConfig, Position};
pub use matching::Matcher;
pub use merge::{classify, diff, merge, DedupStrategy, DiffReport, DiffResult, MergeOutcome, NodeStatus};
pub use model::{validate, DecisionOption, Node, Tree, ValidationError};
pub use store::{load_path, load_tree, save_tree, StoreError};
pub use traversal::{
    advance, current_prompt, reset, resolve_choice, step_back, Command, Outcome, PathEntry,
    PromptView, Session,
};
