//! Interactive traversal of a decision tree
//!
//! Traversal state is a plain value (`Session`). Every transition takes the
//! current session by reference and returns a new one, so undo is a pop and
//! any number of sessions can walk one shared tree snapshot.
//!
//! The interactive loop follows the same shape as an Elm update function:
//!
//! ```text
//! update : Command -> Session -> Result<(Session, Outcome)>
//! ```
//!
//! The caller owns the loop, prints the `Outcome`, and re-prompts on
//! `NoMatch`.

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::matching::{MatchedOption, Matcher};
use crate::model::{DecisionOption, Node, Tree};

/// One step taken through the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    pub from_node: String,
    pub chosen_option_text: String,
    pub to_node: String,
}

/// Where a traversal currently is and how it got there
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub current_node: String,
    pub path: Vec<PathEntry>,
}

/// What the user should see at a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptView<'a> {
    Question {
        text: &'a str,
        options: &'a [DecisionOption],
    },
    Solution {
        text: &'a str,
    },
}

impl PromptView<'_> {
    pub fn is_solution(&self) -> bool {
        matches!(self, PromptView::Solution { .. })
    }
}

// =============================================================================
// Pure transitions
// =============================================================================

/// Prompt for `node_id`
pub fn current_prompt<'a>(tree: &'a Tree, node_id: &str) -> Result<PromptView<'a>> {
    match tree.node(node_id) {
        Some(Node::Decision { question, options }) => Ok(PromptView::Question {
            text: question,
            options,
        }),
        Some(Node::Solution { solution }) => Ok(PromptView::Solution { text: solution }),
        None => Err(EngineError::NodeNotFound(node_id.to_string())),
    }
}

/// Map `user_text` to one of `node`'s options using the default threshold
///
/// A node without options (including solution nodes) never matches.
pub fn resolve_choice<'a>(node: &'a Node, user_text: &str) -> Result<MatchedOption<'a>> {
    resolve_choice_with(&Matcher::default(), node, user_text)
}

pub fn resolve_choice_with<'a>(
    matcher: &Matcher,
    node: &'a Node,
    user_text: &str,
) -> Result<MatchedOption<'a>> {
    matcher
        .pick(user_text, node.options())
        .ok_or_else(|| EngineError::NoMatch {
            input: user_text.to_string(),
        })
}

/// Follow `option` from the session's current node
pub fn advance(tree: &Tree, session: &Session, option: &DecisionOption) -> Result<Session> {
    if !tree.contains(&option.next_node) {
        return Err(EngineError::DanglingReference {
            from: session.current_node.clone(),
            target: option.next_node.clone(),
        });
    }

    let mut path = session.path.clone();
    path.push(PathEntry {
        from_node: session.current_node.clone(),
        chosen_option_text: option.text.clone(),
        to_node: option.next_node.clone(),
    });

    Ok(Session {
        current_node: option.next_node.clone(),
        path,
    })
}

/// Undo the most recent step
pub fn step_back(session: &Session) -> Result<Session> {
    let mut path = session.path.clone();
    let last = path.pop().ok_or(EngineError::EmptyPath)?;
    Ok(Session {
        current_node: last.from_node,
        path,
    })
}

/// Fresh session at the tree's root
pub fn reset(tree: &Tree) -> Session {
    Session {
        current_node: tree.root_node.clone(),
        path: Vec::new(),
    }
}

impl Session {
    pub fn start(tree: &Tree) -> Self {
        reset(tree)
    }

    /// True once the current node is a solution
    pub fn is_finished(&self, tree: &Tree) -> bool {
        tree.node(&self.current_node)
            .map(Node::is_solution)
            .unwrap_or(false)
    }

    /// Resolve `user_text` at the current node and advance
    ///
    /// Unlike `resolve_choice`, this knows which node it is at, so asking a
    /// solution node for a choice reports `MalformedNode` with its ID.
    pub fn choose(&self, tree: &Tree, matcher: &Matcher, user_text: &str) -> Result<(Session, f64)> {
        let node = tree
            .node(&self.current_node)
            .ok_or_else(|| EngineError::NodeNotFound(self.current_node.clone()))?;
        if node.is_solution() {
            return Err(EngineError::MalformedNode {
                id: self.current_node.clone(),
                reason: "solution nodes have no options".to_string(),
            });
        }

        let matched = resolve_choice_with(matcher, node, user_text)?;
        let next = advance(tree, self, matched.option)?;
        Ok((next, matched.score))
    }
}

// =============================================================================
// Interactive reducer
// =============================================================================

/// A line of user input, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Restart,
    ShowPath,
    Back,
    /// Anything else: a number or free text to match against the options
    Answer(String),
}

impl Command {
    pub fn parse(input: &str) -> Command {
        let trimmed = input.trim();
        match trimmed.to_lowercase().as_str() {
            "quit" | "exit" | "q" => Command::Quit,
            "restart" | "r" => Command::Restart,
            "path" | "p" => Command::ShowPath,
            "back" | "b" => Command::Back,
            _ => Command::Answer(trimmed.to_string()),
        }
    }
}

/// What happened, for the shell to report
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// An option was chosen
    Moved { option_text: String, score: f64 },
    /// The last step was undone
    SteppedBack { option_text: String },
    Restarted,
    ShowPath,
    Quit,
}

impl Outcome {
    pub fn is_quit(&self) -> bool {
        matches!(self, Outcome::Quit)
    }
}

/// Apply one command to a session
pub fn update(
    tree: &Tree,
    matcher: &Matcher,
    command: Command,
    session: &Session,
) -> Result<(Session, Outcome)> {
    match command {
        Command::Quit => Ok((session.clone(), Outcome::Quit)),
        Command::ShowPath => Ok((session.clone(), Outcome::ShowPath)),
        Command::Restart => Ok((reset(tree), Outcome::Restarted)),
        Command::Back => {
            let option_text = session
                .path
                .last()
                .map(|entry| entry.chosen_option_text.clone())
                .unwrap_or_default();
            let previous = step_back(session)?;
            Ok((previous, Outcome::SteppedBack { option_text }))
        }
        Command::Answer(text) => {
            let (next, score) = session.choose(tree, matcher, &text)?;
            let option_text = next
                .path
                .last()
                .map(|entry| entry.chosen_option_text.clone())
                .unwrap_or_default();
            Ok((next, Outcome::Moved { option_text, score }))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
