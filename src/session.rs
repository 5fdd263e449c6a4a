//! Session: the one object that owns everything mutable.
//!
//! Construction starts the watcher, runs the initial index, and opens the
//! JSONL sinks; the methods below are the tool surface a host protocol
//! adapter calls.  All cache and graph state lives behind a single core
//! lock — cache refreshes, the accompanying graph edge swaps, and
//! timestamp synchronization happen inside one critical section.

use crate::analyzer::AnalyzerRegistry;
use crate::cache::{CacheEnv, CacheStats, WorkingMemory};
use crate::config::Config;
use crate::discovery::discover_python_files;
use crate::graph::{GraphExport, RelationshipGraph};
use crate::inject::{self, InjectionEvent};
use crate::logs::{JsonlWriter, OUTPUT_DIR};
use crate::metrics::Metrics;
use crate::warn::{TestClassifier, Warning};
use crate::watch::{FileEventClock, ProjectWatcher};
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info};

/// How many injection events the in-memory ring retains for
/// `get_recent_injections`.
const RECENT_INJECTION_CAP: usize = 128;

/// What `read_with_context` hands to the protocol adapter.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolReadResponse {
    pub file_path: String,
    /// File content with the injected section prepended, when any.
    pub content: String,
    pub warnings: Vec<Warning>,
}

struct CoreState {
    cache: WorkingMemory,
    graph: RelationshipGraph,
}

pub struct Session {
    root: PathBuf,
    config: Config,
    events: Arc<FileEventClock>,
    registry: AnalyzerRegistry,
    core: Mutex<CoreState>,
    metrics: Mutex<Metrics>,
    recent_injections: Mutex<VecDeque<InjectionEvent>>,
    injection_log: JsonlWriter,
    warning_log: JsonlWriter,
    metrics_log: JsonlWriter,
    rebuild_notified: AtomicBool,
    _watcher: Option<ProjectWatcher>,
}

impl Session {
    /// Open a session over `root`: start the watcher, index the tree,
    /// prepare the output sinks.
    pub fn start(root: &Path, config: Config) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("project root {}", root.display()))?;
        let classifier = Arc::new(TestClassifier::from_project(&root));
        let registry = AnalyzerRegistry::standard(&root, config.clone(), classifier);
        let events = Arc::new(FileEventClock::new());
        let watcher = ProjectWatcher::start(&root, events.clone())?;

        let out_dir = root.join(OUTPUT_DIR);
        let session = Self {
            core: Mutex::new(CoreState {
                cache: WorkingMemory::new(config.cache_size_limit_bytes()),
                graph: RelationshipGraph::new(),
            }),
            metrics: Mutex::new(Metrics::new()),
            recent_injections: Mutex::new(VecDeque::new()),
            injection_log: JsonlWriter::new(&out_dir, "injection_log.jsonl"),
            warning_log: JsonlWriter::new(&out_dir, "warning_log.jsonl"),
            metrics_log: JsonlWriter::new(&out_dir, "session_metrics.jsonl"),
            rebuild_notified: AtomicBool::new(false),
            _watcher: Some(watcher),
            root,
            config,
            events,
            registry,
        };
        session.index_project()?;
        Ok(session)
    }

    /// Rayon-parallel analysis of every discovered file, applied to the
    /// graph sequentially.
    fn index_project(&self) -> Result<()> {
        let files = discover_python_files(&self.root)?;
        info!(files = files.len(), root = %self.root.display(), "indexing project");

        let outcomes: Vec<_> = files
            .par_iter()
            .filter_map(|rel| {
                let bytes = fs::read(self.root.join(rel)).ok()?;
                let analyzer = self.registry.for_path(rel)?;
                let started = Instant::now();
                let outcome = analyzer.analyze(rel, &bytes);
                Some((rel.clone(), outcome, started.elapsed().as_secs_f64() * 1000.0))
            })
            .collect();

        let mut core = self.core.lock().expect("core lock poisoned");
        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        for (rel, outcome, parse_ms) in outcomes {
            metrics.record_parse_latency(parse_ms);
            self.log_warnings(&mut metrics, &outcome.warnings);
            core.graph.replace_file_analysis(
                &rel,
                outcome.relationships,
                outcome.metadata,
                outcome.definitions,
            );
        }
        Ok(())
    }

    fn log_warnings(&self, metrics: &mut Metrics, warnings: &[Warning]) {
        for w in warnings {
            metrics.record_warning(&w.warning_type.to_string());
            if let Err(e) = self.warning_log.append(w) {
                error!(error = %e, "failed to append warning log");
            }
        }
    }

    /// Normalize and validate a tool-surface path argument.  Empty paths
    /// and paths escaping the project root are rejected before any state
    /// is touched.
    fn validate_path(&self, path: &str) -> Result<String> {
        if path.trim().is_empty() {
            bail!("file_path must not be empty");
        }
        let p = Path::new(path);
        let rel = if p.is_absolute() {
            match crate::watch::canonical_rel_path(&self.root, p) {
                Some(rel) => rel,
                None => bail!("path {} is outside the project root", path),
            }
        } else {
            path.replace('\\', "/")
        };
        if rel.split('/').any(|seg| seg == "..") {
            bail!("path {} is outside the project root", path);
        }
        Ok(rel)
    }

    // ── tool surface ─────────────────────────────────────────────────────────

    /// Read a file with cross-file context injected.
    pub fn read_with_context(&self, path: &str) -> Result<ToolReadResponse> {
        let rel = self.validate_path(path)?;
        let started = Instant::now();

        let mut core = self.core.lock().expect("core lock poisoned");
        let CoreState { cache, graph } = &mut *core;
        let env = CacheEnv {
            root: &self.root,
            events: &self.events,
            registry: &self.registry,
        };
        let outcome = inject::read_with_context(cache, graph, &env, &self.config, &rel)?;
        drop(core);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        metrics.record_file_read(&rel);
        self.log_warnings(&mut metrics, &outcome.warnings);
        if let Some(event) = &outcome.event {
            metrics.record_injection(event.total_token_count, elapsed_ms);
            if let Err(e) = self.injection_log.append(event) {
                error!(error = %e, "failed to append injection log");
            }
            let mut ring = self
                .recent_injections
                .lock()
                .expect("injection ring lock poisoned");
            if ring.len() == RECENT_INJECTION_CAP {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }
        drop(metrics);

        Ok(ToolReadResponse {
            file_path: rel,
            content: inject::compose(&outcome.content, outcome.snippet_section.as_deref()),
            warnings: outcome.warnings,
        })
    }

    /// Export the relationship graph.  Validation runs first; an
    /// inconsistent graph is cleared and rebuilt from disk before export.
    pub fn get_relationship_graph(&self) -> Result<GraphExport> {
        let mut core = self.core.lock().expect("core lock poisoned");
        let problems = core.graph.validate();
        if !problems.is_empty() {
            if !self.rebuild_notified.swap(true, Ordering::Relaxed) {
                error!(
                    problems = problems.len(),
                    first = %problems[0],
                    "graph inconsistency detected; rebuilding from disk"
                );
            }
            self.rebuild_graph(&mut core.graph)?;
        }
        Ok(core.graph.export(self.config.metrics_anonymize_paths))
    }

    fn rebuild_graph(&self, graph: &mut RelationshipGraph) -> Result<()> {
        graph.clear();
        for rel in discover_python_files(&self.root)? {
            let Ok(bytes) = fs::read(self.root.join(&rel)) else {
                continue;
            };
            let Some(analyzer) = self.registry.for_path(&rel) else {
                continue;
            };
            let outcome = analyzer.analyze(&rel, &bytes);
            graph.replace_file_analysis(
                &rel,
                outcome.relationships,
                outcome.metadata,
                outcome.definitions,
            );
        }
        Ok(())
    }

    pub fn get_dependencies(&self, path: &str) -> Result<HashSet<String>> {
        let rel = self.validate_path(path)?;
        let core = self.core.lock().expect("core lock poisoned");
        Ok(core.graph.get_dependencies(&rel))
    }

    pub fn get_dependents(&self, path: &str) -> Result<HashSet<String>> {
        let rel = self.validate_path(path)?;
        let core = self.core.lock().expect("core lock poisoned");
        Ok(core.graph.get_dependents(&rel))
    }

    pub fn get_recent_injections(&self, path: &str, limit: usize) -> Result<Vec<InjectionEvent>> {
        let rel = self.validate_path(path)?;
        let ring = self
            .recent_injections
            .lock()
            .expect("injection ring lock poisoned");
        Ok(ring
            .iter()
            .rev()
            .filter(|e| e.trigger_file == rel)
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn get_cache_statistics(&self) -> CacheStats {
        let core = self.core.lock().expect("core lock poisoned");
        core.cache.statistics()
    }

    /// Flush the session metrics record.  Called once at session end.
    pub fn shutdown(&self) -> Result<()> {
        let core = self.core.lock().expect("core lock poisoned");
        let stats = core.cache.statistics();
        let graph_stats = core.graph.export(self.config.metrics_anonymize_paths).stats;
        drop(core);

        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        metrics.cache_hits = stats.hits;
        metrics.cache_misses = stats.misses;
        metrics.cache_evictions = stats.evictions;
        metrics.staleness_refreshes = stats.staleness_refreshes;
        metrics.note_cache_size(stats.peak_bytes);
        let record = metrics.session_record(graph_stats, &self.config);
        self.metrics_log.append(&record)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events(&self) -> &FileEventClock {
        &self.events
    }
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn session_over(files: &[(&str, &str)]) -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            let p = dir.path().join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        let session = Session::start(dir.path(), Config::default()).unwrap();
        (dir, session)
    }

    #[test]
    fn test_initial_index_builds_graph() {
        let (_dir, session) = session_over(&[
            ("retry.py", "def retry_with_backoff(func):\n    pass\n"),
            ("bot.py", "from retry import retry_with_backoff\n"),
        ]);
        let deps = session.get_dependencies("bot.py").unwrap();
        assert!(deps.contains("retry.py"));
        let dependents = session.get_dependents("retry.py").unwrap();
        assert!(dependents.contains("bot.py"));
    }

    #[test]
    fn test_empty_path_rejected_without_mutation() {
        let (_dir, session) = session_over(&[("a.py", "x = 1\n")]);
        assert!(session.read_with_context("").is_err());
        assert!(session.get_dependencies(" ").is_err());
        assert_eq!(session.get_cache_statistics().misses, 0);
    }

    #[test]
    fn test_escaping_path_rejected() {
        let (_dir, session) = session_over(&[("a.py", "x = 1\n")]);
        assert!(session.read_with_context("../outside.py").is_err());
        assert!(session.read_with_context("/etc/passwd").is_err());
    }

    #[test]
    fn test_read_with_context_injects_signature() {
        let (_dir, session) = session_over(&[
            (
                "retry.py",
                "def retry_with_backoff(func, max_attempts=3):\n    \"\"\"Retry with backoff.\"\"\"\n    return func\n",
            ),
            (
                "bot.py",
                "from retry import retry_with_backoff\n\nretry_with_backoff(fn)\n",
            ),
        ]);
        let resp = session.read_with_context("bot.py").unwrap();
        assert!(resp.content.contains("[Cross-File Context]"));
        assert!(resp.content.contains("From retry.py:1"));
        assert!(resp.content.contains("def retry_with_backoff(func, max_attempts=3):"));
        assert!(resp.content.contains("\"\"\"Retry with backoff.\"\"\""));
        assert!(resp.content.contains("\n---\n"));
        assert!(resp.content.ends_with("retry_with_backoff(fn)\n"));
    }

    #[test]
    fn test_injection_disabled_returns_raw() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("util.py"), "def h():\n    pass\n").unwrap();
        fs::write(dir.path().join("app.py"), "from util import h\n").unwrap();
        let session = Session::start(
            dir.path(),
            Config {
                enable_context_injection: false,
                ..Default::default()
            },
        )
        .unwrap();
        let resp = session.read_with_context("app.py").unwrap();
        assert_eq!(resp.content, "from util import h\n");
    }

    #[test]
    fn test_injection_log_and_recent_ring() {
        let (dir, session) = session_over(&[
            ("util.py", "def helper():\n    \"\"\"Help.\"\"\"\n    pass\n"),
            ("app.py", "from util import helper\nhelper()\n"),
        ]);
        session.read_with_context("app.py").unwrap();
        let recent = session.get_recent_injections("app.py", 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].trigger_file, "app.py");
        assert_eq!(recent[0].snippets.len(), 1);
        assert!(recent[0].total_token_count > 0);

        let log = dir.path().join(OUTPUT_DIR).join("injection_log.jsonl");
        let text = fs::read_to_string(log).unwrap();
        assert_eq!(text.lines().count(), 1);
        let parsed: InjectionEvent = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.snippets[0].source_file, "util.py");
    }

    #[test]
    fn test_graph_export_after_session_work() {
        let (_dir, session) = session_over(&[
            ("util.py", "def helper():\n    pass\n"),
            ("app.py", "from util import helper\n"),
        ]);
        let export = session.get_relationship_graph().unwrap();
        assert_eq!(export.schema_version, 1);
        assert!(export.stats.relationship_count >= 1);
        assert!(export.files.contains_key("app.py"));
    }

    #[test]
    fn test_shutdown_writes_session_metrics() {
        let (dir, session) = session_over(&[("a.py", "x = 1\n")]);
        session.read_with_context("a.py").unwrap();
        session.shutdown().unwrap();
        let path = dir.path().join(OUTPUT_DIR).join("session_metrics.jsonl");
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"cache\""));
        assert!(text.contains("\"config\""));
    }
}
