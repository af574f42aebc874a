use crate::models::{DirectoryNode, FileDescriptor};
use log::debug;
use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};

/// Walks the tree depth-first, parents before children, and returns one
/// descriptor per file. Paths are the `/`-joined chain of ancestor names,
/// root included.
pub fn flatten(tree: &DirectoryNode) -> Vec<FileDescriptor> {
    let mut files = Vec::new();
    collect_files(tree, "", &mut files);
    debug!("Flattened project tree into {} files", files.len());
    files
}

fn collect_files(node: &DirectoryNode, parent: &str, files: &mut Vec<FileDescriptor>) {
    let current = if parent.is_empty() {
        node.name().to_string()
    } else {
        format!("{}/{}", parent, node.name())
    };

    match node {
        DirectoryNode::File { purpose, .. } => files.push(FileDescriptor {
            path: collapse_separators(&current),
            purpose: purpose.clone(),
        }),
        DirectoryNode::Directory { children, .. } => {
            for child in children {
                collect_files(child, &current, files);
            }
        }
    }
}

fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}

/// The path below the synthetic root segment, e.g. `root/src/a.js` -> `src/a.js`.
pub fn relative_path(path: &str) -> &str {
    path.split_once('/').map_or(path, |(_, rest)| rest)
}

/// The top-level grouping folder of a flattened path (its second segment).
pub fn group_of(path: &str) -> Option<&str> {
    path.split('/').nth(1)
}

/// Resolves a client-supplied relative path inside `base`, refusing anything
/// that would land outside of it.
pub fn resolve_within(base: &Path, requested: &str) -> Result<PathBuf, String> {
    let relative = Path::new(requested.trim_start_matches(['/', '\\'])).clean();
    if relative.as_os_str().is_empty() || relative == Path::new(".") {
        return Err(format!("Empty file path: {:?}", requested));
    }
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(format!("Path escapes workspace: {}", requested));
    }
    Ok(base.join(relative))
}
