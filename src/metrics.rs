//! Session metrics: counters and timing vectors observed by the cache, the
//! analyzer, and the injector, flushed as one JSONL record at session end.

use crate::config::Config;
use crate::graph::{GraphStats, hash_path};
use crate::logs::rfc3339_now;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference threshold that injection totals are counted against in the
/// metrics output.  Not enforced unless `context_token_limit` is set.
pub const REFERENCE_TOKEN_LIMIT: usize = 500;

// ── Live counters ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Metrics {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub staleness_refreshes: u64,
    pub peak_cache_bytes: usize,

    injection_token_totals: Vec<u64>,
    parse_latencies_ms: Vec<f64>,
    injection_latencies_ms: Vec<f64>,
    warning_counts: BTreeMap<String, u64>,
    file_read_counts: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_parse_latency(&mut self, ms: f64) {
        self.parse_latencies_ms.push(ms);
    }

    pub fn record_injection(&mut self, total_tokens: u64, latency_ms: f64) {
        self.injection_token_totals.push(total_tokens);
        self.injection_latencies_ms.push(latency_ms);
    }

    pub fn record_warning(&mut self, kind: &str) {
        *self.warning_counts.entry(kind.to_string()).or_default() += 1;
    }

    pub fn record_file_read(&mut self, rel_path: &str) {
        *self
            .file_read_counts
            .entry(rel_path.to_string())
            .or_default() += 1;
    }

    pub fn note_cache_size(&mut self, current_bytes: usize) {
        self.peak_cache_bytes = self.peak_cache_bytes.max(current_bytes);
    }

    /// Build the one record appended to `session_metrics.jsonl`.
    pub fn session_record(&self, graph: GraphStats, config: &Config) -> SessionMetricsRecord {
        let file_read_counts = if config.metrics_anonymize_paths {
            self.file_read_counts
                .iter()
                .map(|(p, c)| (hash_path(p), *c))
                .collect()
        } else {
            self.file_read_counts.clone()
        };
        let over_reference_limit = self
            .injection_token_totals
            .iter()
            .filter(|&&t| t > REFERENCE_TOKEN_LIMIT as u64)
            .count() as u64;
        SessionMetricsRecord {
            timestamp: rfc3339_now(),
            cache: CacheCounters {
                hits: self.cache_hits,
                misses: self.cache_misses,
                evictions: self.cache_evictions,
                staleness_refreshes: self.staleness_refreshes,
                peak_bytes: self.peak_cache_bytes,
            },
            injection_tokens: Distribution::of_u64(&self.injection_token_totals)
                .with_over_limit(over_reference_limit),
            parse_latency_ms: Distribution::of_f64(&self.parse_latencies_ms),
            injection_latency_ms: Distribution::of_f64(&self.injection_latencies_ms),
            warning_counts: self.warning_counts.clone(),
            file_read_counts,
            graph,
            config: config.clone(),
        }
    }
}

// ── Serialized record ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionMetricsRecord {
    pub timestamp: String,
    pub cache: CacheCounters,
    pub injection_tokens: Distribution,
    pub parse_latency_ms: Distribution,
    pub injection_latency_ms: Distribution,
    pub warning_counts: BTreeMap<String, u64>,
    pub file_read_counts: BTreeMap<String, u64>,
    pub graph: GraphStats,
    pub config: Config,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub staleness_refreshes: u64,
    pub peak_bytes: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub count: usize,
    pub min: f64,
    pub median: f64,
    pub p95: f64,
    pub max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_reference_limit: Option<u64>,
}

impl Distribution {
    fn of_f64(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values compare"));
        if sorted.is_empty() {
            return Self::default();
        }
        Self {
            count: sorted.len(),
            min: sorted[0],
            median: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            max: sorted[sorted.len() - 1],
            over_reference_limit: None,
        }
    }

    fn of_u64(values: &[u64]) -> Self {
        let as_f64: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        Self::of_f64(&as_f64)
    }

    fn with_over_limit(mut self, over: u64) -> Self {
        self.over_reference_limit = Some(over);
        self
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as f64) * p).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn empty_graph_stats() -> GraphStats {
        GraphStats {
            file_count: 0,
            relationship_count: 0,
            relationships_by_type: BTreeMap::new(),
            most_connected: vec![],
        }
    }

    #[test]
    fn test_distribution_of_known_values() {
        let d = Distribution::of_u64(&[10, 20, 30, 40, 100]);
        assert_eq!(d.count, 5);
        assert_eq!(d.min, 10.0);
        assert_eq!(d.median, 30.0);
        assert_eq!(d.max, 100.0);
        assert_eq!(d.p95, 100.0);
    }

    #[test]
    fn test_empty_distribution_is_zeroed() {
        let d = Distribution::of_f64(&[]);
        assert_eq!(d.count, 0);
        assert_eq!(d.max, 0.0);
    }

    #[test]
    fn test_over_reference_limit_counted() {
        let mut m = Metrics::new();
        m.record_injection(120, 1.0);
        m.record_injection(900, 1.0);
        let rec = m.session_record(empty_graph_stats(), &Config::default());
        assert_eq!(rec.injection_tokens.over_reference_limit, Some(1));
        assert_eq!(rec.injection_tokens.count, 2);
    }

    #[test]
    fn test_anonymized_read_counts() {
        let mut m = Metrics::new();
        m.record_file_read("src/app.py");
        let config = Config {
            metrics_anonymize_paths: true,
            ..Default::default()
        };
        let rec = m.session_record(empty_graph_stats(), &config);
        let key = rec.file_read_counts.keys().next().unwrap();
        assert!(key.starts_with("file-"));
    }

    #[test]
    fn test_peak_cache_bytes_monotonic() {
        let mut m = Metrics::new();
        m.note_cache_size(100);
        m.note_cache_size(40);
        assert_eq!(m.peak_cache_bytes, 100);
    }
}
