//! Tree and path files on disk
//!
//! Trees are stored as YAML (or JSON, by extension) under a top-level
//! `decision_tree` key. Files without the wrapper load too. Loading is
//! lenient: malformed nodes are skipped and reported, not fatal.
//!
//! The default tree location is found like git finds `.git`: walk up from
//! the current directory looking for `.diagtree/`.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::convert::DiagnosticPath;
use crate::ingest;
use crate::model::{LoadedTree, RawTree, Tree};

pub const TREE_PATH_ENV: &str = "DIAGTREE_TREE_PATH";
pub const DATA_DIR: &str = ".diagtree";
pub const TREE_FILE: &str = "tree.yaml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("cannot serialize tree: {0}")]
    Serialize(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// On-disk encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Top-level key wrapping the tree in saved documents
pub const WRAPPER_KEY: &str = "decision_tree";

#[derive(Serialize)]
struct Document<'a> {
    decision_tree: &'a Tree,
}

/// Where the tree lives when nothing else says: `DIAGTREE_TREE_PATH`, else
/// the nearest `.diagtree/tree.yaml` above the current directory, else
/// `.diagtree/tree.yaml` here
pub fn default_tree_path() -> PathBuf {
    if let Ok(path) = std::env::var(TREE_PATH_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let data_dir = dir.join(DATA_DIR);
            if data_dir.is_dir() {
                return data_dir.join(TREE_FILE);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    PathBuf::from(DATA_DIR).join(TREE_FILE)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_error(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Parse tree text in the given format
pub fn parse_tree(contents: &str, format: Format, origin: &Path) -> Result<LoadedTree> {
    // A present wrapper key commits to the wrapped shape, so a broken body
    // is a parse error rather than an empty bare tree.
    let raw: RawTree = match format {
        Format::Yaml => {
            let mut value: serde_yaml::Value =
                serde_yaml::from_str(contents).map_err(|e| parse_error(origin, e))?;
            let wrapped = value.as_mapping_mut().and_then(|m| m.remove(WRAPPER_KEY));
            serde_yaml::from_value(wrapped.unwrap_or(value)).map_err(|e| parse_error(origin, e))?
        }
        Format::Json => {
            let mut value: serde_json::Value =
                serde_json::from_str(contents).map_err(|e| parse_error(origin, e))?;
            let wrapped = value.as_object_mut().and_then(|m| m.remove(WRAPPER_KEY));
            serde_json::from_value(wrapped.unwrap_or(value)).map_err(|e| parse_error(origin, e))?
        }
    };
    Ok(Tree::from_raw(raw))
}

/// Load a tree, skipping malformed nodes
pub fn load_tree(path: &Path) -> Result<LoadedTree> {
    let contents = read(path)?;
    let loaded = parse_tree(&contents, Format::from_path(path), path)?;
    tracing::debug!(
        path = %path.display(),
        nodes = loaded.tree.len(),
        skipped = loaded.malformed.len(),
        "loaded tree"
    );
    Ok(loaded)
}

/// Render a tree in the given format, wrapped under `decision_tree`
pub fn render_tree(tree: &Tree, format: Format) -> Result<String> {
    let document = Document {
        decision_tree: tree,
    };
    match format {
        Format::Yaml => {
            serde_yaml::to_string(&document).map_err(|e| StoreError::Serialize(e.to_string()))
        }
        Format::Json => serde_json::to_string_pretty(&document)
            .map(|s| s + "\n")
            .map_err(|e| StoreError::Serialize(e.to_string())),
    }
}

/// Write a tree atomically: a temp file in the same directory, then rename
pub fn save_tree(tree: &Tree, path: &Path) -> Result<()> {
    let contents = render_tree(tree, Format::from_path(path))?;
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_error)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_error)?;
    tmp.write_all(contents.as_bytes()).map_err(io_error)?;
    tmp.persist(path).map_err(|e| io_error(e.error))?;

    tracing::info!(path = %path.display(), nodes = tree.len(), "saved tree");
    Ok(())
}

/// Load a diagnostic path. `.yaml`/`.yml` files are parsed as YAML; anything
/// else is treated as an analyser response and the JSON is extracted from it.
pub fn load_path(path: &Path) -> Result<DiagnosticPath> {
    let contents = read(path)?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&contents).map_err(|e| parse_error(path, e))
    } else {
        ingest::path_from_response(&contents).map_err(|e| parse_error(path, e))
    }
}
