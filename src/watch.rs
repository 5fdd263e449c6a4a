//! File watcher and event router.
//!
//! The watcher's single visible effect is the event clock: every
//! create/modify/delete/move under the project root that survives the
//! ignore rules stamps `file_event_timestamps[path] = now`.  No analysis,
//! no cache invalidation, no graph mutation, no debouncing — timestamp
//! writes are idempotent and the cache compares clocks on its next read.
//!
//! When the platform watcher cannot be started the router degrades, once
//! and loudly, to a periodic mtime scan.

use crate::logs::unix_now;
use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Interval of the fallback mtime scan.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

// ── Event clock ───────────────────────────────────────────────────────────────

/// `file_event_timestamps`: project-relative path → Unix seconds of the
/// last observed filesystem event.  Written by the watcher thread, read by
/// the cache under its own lock; entries are independent keys behind one
/// fine-grained mutex.
#[derive(Default)]
pub struct FileEventClock {
    map: Mutex<HashMap<String, f64>>,
}

impl FileEventClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, rel_path: &str) {
        self.touch_at(rel_path, unix_now());
    }

    pub fn touch_at(&self, rel_path: &str, timestamp: f64) {
        self.map
            .lock()
            .expect("event clock lock poisoned")
            .insert(rel_path.to_string(), timestamp);
    }

    pub fn last_event(&self, rel_path: &str) -> Option<f64> {
        self.map
            .lock()
            .expect("event clock lock poisoned")
            .get(rel_path)
            .copied()
    }
}

// ── Ignore rules ──────────────────────────────────────────────────────────────

/// Directory names that are always ignored, before `.gitignore` is even
/// consulted: dependency trees, caches, and VCS metadata.
pub const ALWAYS_IGNORE_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    "node_modules",
    ".tox",
    ".pytest_cache",
    ".mypy_cache",
    crate::logs::OUTPUT_DIR,
];

const ALWAYS_IGNORE_EXTENSIONS: &[&str] = &["pyc", "pyo"];

/// Hard-coded exclusions plus patterns parsed from the project's
/// `.gitignore`.
pub struct IgnoreRules {
    gitignore: Option<Gitignore>,
}

impl IgnoreRules {
    pub fn for_project(root: &Path) -> Self {
        let gitignore_path = root.join(".gitignore");
        let gitignore = if gitignore_path.is_file() {
            let mut builder = GitignoreBuilder::new(root);
            builder.add(&gitignore_path);
            builder.build().ok()
        } else {
            None
        };
        Self { gitignore }
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        for segment in rel_path.split('/') {
            if ALWAYS_IGNORE_DIRS.contains(&segment) {
                return true;
            }
        }
        if let Some(ext) = Path::new(rel_path).extension().and_then(|e| e.to_str())
            && ALWAYS_IGNORE_EXTENSIONS.contains(&ext)
        {
            return true;
        }
        if let Some(gi) = &self.gitignore {
            return gi
                .matched_path_or_any_parents(Path::new(rel_path), false)
                .is_ignore();
        }
        false
    }
}

// ── Canonicalization ──────────────────────────────────────────────────────────

/// Canonicalize an event path to the project-relative `/`-separated form.
/// Symlinks are resolved; a resolved target outside the project root is
/// rejected.  Paths that no longer exist (deletions) are normalized
/// lexically against the root.
pub fn canonical_rel_path(root: &Path, path: &Path) -> Option<String> {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let rel = resolved.strip_prefix(root).ok()?;
    let s = rel.to_string_lossy();
    Some(if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    })
}

// ── Watcher ───────────────────────────────────────────────────────────────────

pub struct ProjectWatcher {
    /// Kept alive for the platform-watcher case; dropping it stops events.
    _watcher: Option<RecommendedWatcher>,
    stop: Arc<AtomicBool>,
    _poll_handle: Option<JoinHandle<()>>,
}

impl ProjectWatcher {
    /// Start watching `root` recursively, stamping `clock` on every
    /// relevant event.  Falls back to polling when the platform watcher
    /// is unavailable.
    pub fn start(root: &Path, clock: Arc<FileEventClock>) -> Result<Self> {
        let root = root.canonicalize()?;
        let rules = Arc::new(IgnoreRules::for_project(&root));
        let stop = Arc::new(AtomicBool::new(false));

        match Self::start_platform(&root, clock.clone(), rules.clone()) {
            Ok(watcher) => Ok(Self {
                _watcher: Some(watcher),
                stop,
                _poll_handle: None,
            }),
            Err(err) => {
                warn!(
                    error = %err,
                    "platform file watcher unavailable; degrading to mtime polling"
                );
                let handle = Self::start_polling(root, clock, rules, stop.clone());
                Ok(Self {
                    _watcher: None,
                    stop,
                    _poll_handle: Some(handle),
                })
            }
        }
    }

    fn start_platform(
        root: &Path,
        clock: Arc<FileEventClock>,
        rules: Arc<IgnoreRules>,
    ) -> Result<RecommendedWatcher> {
        let event_root = root.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            // A move arrives as its two halves (or a rename pair); every
            // involved path gets its own timestamp, which models
            // `delete(old); create(new)` exactly.
            for path in &event.paths {
                route_event(&event_root, &clock, &rules, path);
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }

    fn start_polling(
        root: PathBuf,
        clock: Arc<FileEventClock>,
        rules: Arc<IgnoreRules>,
        stop: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut mtimes: HashMap<String, SystemTime> = HashMap::new();
            // Seed without stamping: pre-existing files are not events.
            scan_mtimes(&root, &rules, &mut mtimes);
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(POLL_INTERVAL);
                let mut next: HashMap<String, SystemTime> = HashMap::new();
                scan_mtimes(&root, &rules, &mut next);
                for (rel, mtime) in &next {
                    if mtimes.get(rel) != Some(mtime) {
                        clock.touch(rel);
                    }
                }
                // Deletions: present before, gone now.
                for rel in mtimes.keys() {
                    if !next.contains_key(rel) {
                        clock.touch(rel);
                    }
                }
                mtimes = next;
            }
        })
    }
}

impl Drop for ProjectWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// The router: canonicalize, filter, stamp.  Target latency is
/// microseconds; nothing heavier belongs here.
fn route_event(root: &Path, clock: &FileEventClock, rules: &IgnoreRules, path: &Path) {
    let Some(rel) = canonical_rel_path(root, path) else {
        debug!(path = %path.display(), "event outside project root dropped");
        return;
    };
    if rel.is_empty() || rules.is_ignored(&rel) {
        return;
    }
    clock.touch(&rel);
}

fn scan_mtimes(root: &Path, rules: &IgnoreRules, out: &mut HashMap<String, SystemTime>) {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .build();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(rel) = canonical_rel_path(root, entry.path()) else {
            continue;
        };
        if rules.is_ignored(&rel) {
            continue;
        }
        if let Ok(meta) = entry.metadata()
            && let Ok(mtime) = meta.modified()
        {
            out.insert(rel, mtime);
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_event_clock_point_updates() {
        let clock = FileEventClock::new();
        assert_eq!(clock.last_event("a.py"), None);
        clock.touch_at("a.py", 10.0);
        clock.touch_at("a.py", 20.0);
        assert_eq!(clock.last_event("a.py"), Some(20.0));
    }

    #[test]
    fn test_ignore_rules_hardcoded_dirs() {
        let dir = TempDir::new().unwrap();
        let rules = IgnoreRules::for_project(dir.path());
        assert!(rules.is_ignored(".git/config"));
        assert!(rules.is_ignored("pkg/__pycache__/m.cpython-312.pyc"));
        assert!(rules.is_ignored("venv/lib/site.py"));
        assert!(rules.is_ignored("app/cache.pyc"));
        assert!(!rules.is_ignored("src/app.py"));
    }

    #[test]
    fn test_ignore_rules_gitignore_patterns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated/\n*.tmp.py\n").unwrap();
        let rules = IgnoreRules::for_project(dir.path());
        assert!(rules.is_ignored("generated/models.py"));
        assert!(rules.is_ignored("src/scratch.tmp.py"));
        assert!(!rules.is_ignored("src/app.py"));
    }

    #[test]
    fn test_route_event_stamps_clock() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("app.py"), "x = 1\n").unwrap();
        let clock = FileEventClock::new();
        let rules = IgnoreRules::for_project(&root);
        route_event(&root, &clock, &rules, &root.join("app.py"));
        assert!(clock.last_event("app.py").is_some());
    }

    #[test]
    fn test_route_event_drops_ignored_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::write(root.join("__pycache__/m.pyc"), "").unwrap();
        let clock = FileEventClock::new();
        let rules = IgnoreRules::for_project(&root);
        route_event(&root, &clock, &rules, &root.join("__pycache__/m.pyc"));
        assert_eq!(clock.last_event("__pycache__/m.pyc"), None);
    }

    #[test]
    fn test_route_event_drops_outside_root() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(other.path().join("ext.py"), "").unwrap();
        let clock = FileEventClock::new();
        let rules = IgnoreRules::for_project(&root);
        route_event(&root, &clock, &rules, &other.path().join("ext.py"));
        assert_eq!(clock.last_event("ext.py"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_rejected() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(outside.path().join("real.py"), "x = 1\n").unwrap();
        let link = root.join("link.py");
        std::os::unix::fs::symlink(outside.path().join("real.py"), &link).unwrap();
        assert_eq!(canonical_rel_path(&root, &link), None);
    }

    #[test]
    fn test_deleted_path_still_canonicalizes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let gone = root.join("pkg/gone.py");
        assert_eq!(canonical_rel_path(&root, &gone).as_deref(), Some("pkg/gone.py"));
    }

    #[test]
    fn test_platform_watcher_observes_writes() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FileEventClock::new());
        let watcher = ProjectWatcher::start(dir.path(), clock.clone()).unwrap();
        fs::write(dir.path().join("seen.py"), "x = 1\n").unwrap();
        // Platform watchers deliver asynchronously.
        for _ in 0..50 {
            if clock.last_event("seen.py").is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }
        drop(watcher);
        assert!(clock.last_event("seen.py").is_some());
    }
}
