//! File discovery: walk the project tree and collect `.py` files for the
//! initial index.
//!
//! The walker:
//!  - Respects `.gitignore` (and `.ignore`) files at every level.
//!  - Skips hidden entries (names starting with `.`).
//!  - Always skips the well-known dependency/cache directories in
//!    [`crate::watch::ALWAYS_IGNORE_DIRS`] even when they are neither
//!    hidden nor gitignored (e.g. a `venv/` at the project root).
//!
//! Paths come back project-relative with `/` separators — the same
//! canonical form the watcher, graph, and cache use.

use crate::watch::{ALWAYS_IGNORE_DIRS, canonical_rel_path};
use anyhow::Result;
use ignore::WalkBuilder;
use std::path::Path;

/// Discover all `.py` files reachable from `root`.  The result is sorted
/// so index passes are deterministic.
pub fn discover_python_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .build();

    'entries: for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        let Some(rel) = canonical_rel_path(root, entry.path()) else {
            continue;
        };
        for segment in rel.split('/') {
            if ALWAYS_IGNORE_DIRS.contains(&segment) {
                continue 'entries;
            }
        }
        files.push(rel);
    }

    files.sort();
    Ok(files)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
