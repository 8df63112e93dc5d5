//! Syntax trees arrive as JSON produced by the parser

use crate::DriverError;
use backlang_syntax::Tree;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parses one tree. `path` is only used for error messages.
pub fn parse_tree(json: &str, path: &Path) -> Result<Tree, DriverError> {
    serde_json::from_str(json).map_err(|source| DriverError::InvalidTree {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads one tree file. A tree without a file name takes the path.
pub fn load_tree(path: &Path) -> Result<Tree, DriverError> {
    let json = fs::read_to_string(path).map_err(|source| DriverError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tree = parse_tree(&json, path)?;
    if tree.file.is_none() {
        tree.file = Some(path.display().to_string());
    }
    debug!(path = %path.display(), module = %tree.module, decls = tree.body.len(), "loaded tree");
    Ok(tree)
}

/// Reads every tree, in order
pub fn load_trees<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Tree>, DriverError> {
    paths.iter().map(|p| load_tree(p.as_ref())).collect()
}
