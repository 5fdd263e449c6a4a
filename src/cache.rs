//! Working-memory cache.
//!
//! The cache is where disk state, the event clock, and the relationship
//! graph meet.  `get` is the only primary operation: a staleness check
//! against the watcher's event clock decides between serving the stored
//! excerpt and re-reading the file — and a re-read always re-analyses the
//! content and swaps the file's outgoing edges, so the graph never refers
//! to content the cache has not seen.
//!
//! The whole structure lives inside the session's core lock; nothing here
//! locks again.

use crate::analyzer::AnalyzerRegistry;
use crate::graph::RelationshipGraph;
use crate::logs::unix_now;
use crate::warn::Warning;
use crate::watch::FileEventClock;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Retry delays for transient read failures.
const RETRY_DELAYS_MS: [u64; 3] = [100, 200, 400];

// ── Entries ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    filepath: String,
    line_range: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub filepath: String,
    pub line_range: Option<(usize, usize)>,
    pub content: String,
    pub size_bytes: usize,
    pub last_accessed: f64,
    pub access_count: u64,
    pub symbol_name: Option<String>,
}

/// Counters exposed through `get_cache_statistics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub staleness_refreshes: u64,
    pub entry_count: usize,
    pub current_bytes: usize,
    pub peak_bytes: usize,
}

/// What one `get` produced.
pub struct GetOutcome {
    pub content: String,
    /// Warnings surfaced by the re-analysis, when one happened.
    pub warnings: Vec<Warning>,
    /// True when the file was re-read and re-analysed.
    pub refreshed: bool,
}

/// The collaborators a refresh needs, borrowed from the session.
pub struct CacheEnv<'a> {
    pub root: &'a Path,
    pub events: &'a FileEventClock,
    pub registry: &'a AnalyzerRegistry,
}

// ── Working memory ────────────────────────────────────────────────────────────

pub struct WorkingMemory {
    entries: HashMap<EntryKey, CacheEntry>,
    /// `file_last_read_timestamps`: kept in lock-step with `entries` —
    /// a file has a timestamp here iff at least one of its excerpts is
    /// cached.
    last_read: HashMap<String, f64>,
    current_bytes: usize,
    limit_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    staleness_refreshes: u64,
    peak_bytes: usize,
}

impl WorkingMemory {
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            last_read: HashMap::new(),
            current_bytes: 0,
            limit_bytes,
            hits: 0,
            misses: 0,
            evictions: 0,
            staleness_refreshes: 0,
            peak_bytes: 0,
        }
    }

    /// The primary operation.  Caller holds the core lock for the whole
    /// call; file I/O and re-analysis intentionally happen inside it.
    pub fn get(
        &mut self,
        graph: &mut RelationshipGraph,
        env: &CacheEnv<'_>,
        rel_path: &str,
        line_range: Option<(usize, usize)>,
    ) -> Result<GetOutcome> {
        let key = EntryKey {
            filepath: rel_path.to_string(),
            line_range,
        };

        let stale = match self.last_read.get(rel_path) {
            None => true,
            Some(&read_at) => env
                .events
                .last_event(rel_path)
                .is_some_and(|event_at| event_at > read_at),
        };

        if stale {
            return self.refresh(graph, env, rel_path, line_range);
        }

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_accessed = unix_now();
            entry.access_count += 1;
            self.hits += 1;
            return Ok(GetOutcome {
                content: entry.content.clone(),
                warnings: Vec::new(),
                refreshed: false,
            });
        }

        // Fresh file, but this excerpt is not cached: plain miss, no
        // re-analysis needed — the graph already reflects this content.
        let bytes = read_with_retry(&env.root.join(rel_path))?;
        let (full, _) = crate::analyzer::decode_source(&bytes);
        let content = slice_range(&full, line_range);
        self.misses += 1;
        self.install(rel_path, line_range, content.clone());
        self.enforce_limit();
        Ok(GetOutcome {
            content,
            warnings: Vec::new(),
            refreshed: false,
        })
    }

    /// Stale-or-new path: read (time captured first), re-analyse, swap the
    /// graph's outgoing edges, replace the file's cached excerpts.
    fn refresh(
        &mut self,
        graph: &mut RelationshipGraph,
        env: &CacheEnv<'_>,
        rel_path: &str,
        line_range: Option<(usize, usize)>,
    ) -> Result<GetOutcome> {
        // Captured before the read so that a modification racing with the
        // I/O below invalidates the next get.
        let t = unix_now();

        let bytes = match read_with_retry(&env.root.join(rel_path)) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Hard failure: drop the stale excerpts, mark the file
                // deleted in the graph, surface the error.
                warn!(file = rel_path, error = %err, "dropping stale cache entry");
                self.drop_file(rel_path);
                if is_not_found(&err) {
                    graph.remove_relationships_for(rel_path, true);
                }
                return Err(err);
            }
        };

        let (full, _) = crate::analyzer::decode_source(&bytes);
        let mut warnings = Vec::new();
        if let Some(analyzer) = env.registry.for_path(rel_path) {
            let outcome = analyzer.analyze(rel_path, &bytes);
            graph.replace_file_analysis(
                rel_path,
                outcome.relationships,
                outcome.metadata,
                outcome.definitions,
            );
            warnings = outcome.warnings;
        }

        // Every excerpt of the file reflects the old content — drop them
        // all, then cache the requested one.
        self.drop_file(rel_path);
        let content = slice_range(&full, line_range);
        self.install(rel_path, line_range, content.clone());
        self.last_read.insert(rel_path.to_string(), t);
        self.misses += 1;
        self.staleness_refreshes += 1;
        self.enforce_limit();

        Ok(GetOutcome {
            content,
            warnings,
            refreshed: true,
        })
    }

    fn install(&mut self, rel_path: &str, line_range: Option<(usize, usize)>, content: String) {
        let size_bytes = content.len();
        let key = EntryKey {
            filepath: rel_path.to_string(),
            line_range,
        };
        self.current_bytes += size_bytes;
        self.entries.insert(
            key,
            CacheEntry {
                filepath: rel_path.to_string(),
                line_range,
                content,
                size_bytes,
                last_accessed: unix_now(),
                access_count: 1,
                symbol_name: None,
            },
        );
        self.last_read
            .entry(rel_path.to_string())
            .or_insert_with(unix_now);
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
    }

    /// LRU eviction until the configured limit holds.  The read-clock map
    /// shrinks in lock-step: a file loses its timestamp when its last
    /// excerpt goes.
    fn enforce_limit(&mut self) {
        while self.current_bytes > self.limit_bytes && !self.entries.is_empty() {
            let victim = self
                .entries
                .iter()
                .min_by(|a, b| {
                    a.1.last_accessed
                        .partial_cmp(&b.1.last_accessed)
                        .expect("timestamps are finite")
                })
                .map(|(k, _)| k.clone())
                .expect("entries is non-empty");
            if let Some(entry) = self.entries.remove(&victim) {
                self.current_bytes -= entry.size_bytes;
                self.evictions += 1;
            }
            if !self.entries.values().any(|e| e.filepath == victim.filepath) {
                self.last_read.remove(&victim.filepath);
            }
        }
    }

    fn drop_file(&mut self, rel_path: &str) {
        let keys: Vec<EntryKey> = self
            .entries
            .keys()
            .filter(|k| k.filepath == rel_path)
            .cloned()
            .collect();
        for k in keys {
            if let Some(entry) = self.entries.remove(&k) {
                self.current_bytes -= entry.size_bytes;
            }
        }
        self.last_read.remove(rel_path);
    }

    pub fn last_read(&self, rel_path: &str) -> Option<f64> {
        self.last_read.get(rel_path).copied()
    }

    pub fn statistics(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            staleness_refreshes: self.staleness_refreshes,
            entry_count: self.entries.len(),
            current_bytes: self.current_bytes,
            peak_bytes: self.peak_bytes,
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert!(self.current_bytes <= self.limit_bytes || self.entries.is_empty());
        for key in self.entries.keys() {
            assert!(
                self.last_read.contains_key(&key.filepath),
                "entry without read timestamp: {key:?}"
            );
        }
        let sum: usize = self.entries.values().map(|e| e.size_bytes).sum();
        assert_eq!(sum, self.current_bytes);
    }
}

// ── helpers ───────────────────────────────────────────────────────────────────

/// Read with the transient-error retry ladder.  Not-found and permission
/// errors are hard failures and skip the ladder.
fn read_with_retry(path: &Path) -> Result<Vec<u8>> {
    let mut last_err = None;
    for (attempt, delay_ms) in std::iter::once(0u64)
        .chain(RETRY_DELAYS_MS.iter().copied())
        .enumerate()
    {
        if delay_ms > 0 {
            thread::sleep(Duration::from_millis(delay_ms));
        }
        match std::fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if is_transient(&e) && attempt < RETRY_DELAYS_MS.len() => {
                last_err = Some(e);
            }
            Err(e) => {
                return Err(anyhow!(e).context(format!("reading {}", path.display())));
            }
        }
    }
    Err(anyhow!(last_err.expect("loop recorded an error")))
        .with_context(|| format!("reading {} after retries", path.display()))
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == ErrorKind::NotFound)
}

/// 1-based inclusive line slice; `None` returns the whole buffer.
fn slice_range(content: &str, range: Option<(usize, usize)>) -> String {
    match range {
        None => content.to_string(),
        Some((start, end)) => {
            let start = start.max(1);
            content
                .lines()
                .skip(start - 1)
                .take(end.saturating_sub(start) + 1)
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────────────
