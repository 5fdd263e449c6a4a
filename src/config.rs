//! Session configuration.
//!
//! Values are read once at session start; loading them from a file is the
//! host adapter's concern — this struct is the contract, with every field
//! defaulting per the documented table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LRU eviction threshold for the working-memory cache.
    pub cache_size_limit_kb: usize,
    /// When set, low-priority snippets past this token total are dropped.
    /// Unset means no enforcement (the v0.1.0 default) — distributions are
    /// observed in metrics before tightening.
    pub context_token_limit: Option<usize>,
    /// When false, `read_with_context` returns raw content.
    pub enable_context_injection: bool,
    /// Emit a warning for `from m import *`.
    pub warn_on_wildcards: bool,
    /// Suppression entries, most-specific first: `path:kind`, exact paths,
    /// and directory globs (`src/generated/*`).
    pub suppress_warnings: Vec<String>,
    pub suppress_dynamic_dispatch_warnings: bool,
    pub suppress_monkey_patching_warnings: bool,
    pub suppress_exec_eval_warnings: bool,
    pub suppress_decorator_warnings: bool,
    pub suppress_metaclass_warnings: bool,
    /// Per-file parse cap, seconds.
    pub ast_parsing_timeout_seconds: f64,
    /// Suite-nesting cap for the parser.
    pub ast_max_recursion_depth: usize,
    /// A symbol referenced from at least this many files ranks as widely
    /// used during snippet prioritisation.
    pub function_usage_warning_threshold: usize,
    /// Hash file paths in the metrics output.
    pub metrics_anonymize_paths: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size_limit_kb: 50,
            context_token_limit: None,
            enable_context_injection: true,
            warn_on_wildcards: false,
            suppress_warnings: Vec::new(),
            suppress_dynamic_dispatch_warnings: false,
            suppress_monkey_patching_warnings: false,
            suppress_exec_eval_warnings: false,
            suppress_decorator_warnings: false,
            suppress_metaclass_warnings: false,
            ast_parsing_timeout_seconds: 5.0,
            ast_max_recursion_depth: 100,
            function_usage_warning_threshold: 3,
            metrics_anonymize_paths: false,
        }
    }
}

impl Config {
    pub fn cache_size_limit_bytes(&self) -> usize {
        self.cache_size_limit_kb * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_table() {
        let c = Config::default();
        assert_eq!(c.cache_size_limit_kb, 50);
        assert_eq!(c.context_token_limit, None);
        assert!(c.enable_context_injection);
        assert!(!c.warn_on_wildcards);
        assert_eq!(c.ast_parsing_timeout_seconds, 5.0);
        assert_eq!(c.ast_max_recursion_depth, 100);
        assert_eq!(c.function_usage_warning_threshold, 3);
        assert!(!c.metrics_anonymize_paths);
    }

    #[test]
    fn test_partial_json_uses_defaults_for_missing_keys() {
        let c: Config = serde_json::from_str(r#"{"cache_size_limit_kb": 8}"#).unwrap();
        assert_eq!(c.cache_size_limit_kb, 8);
        assert!(c.enable_context_injection);
        assert_eq!(c.ast_max_recursion_depth, 100);
    }
}
