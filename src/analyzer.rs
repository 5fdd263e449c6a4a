//! Analyzer registry and the Python analyzer.
//!
//! The registry maps file extensions to language analyzers; only `.py` is
//! populated in this version, and the trait seam is what a future language
//! plugs into.  The Python analyzer owns the full per-file pass: decode,
//! size guard, bounded parse, detector traversal, dynamic-pattern scan,
//! and deduplication.

use crate::ast::{Stmt, StmtKind};
use crate::config::Config;
use crate::detect::{AnalysisContext, AstNode, DetectorRegistry, stmt_exprs};
use crate::graph::{DefKind, DefRecord, FileMetadata, Relationship};
use crate::location::LineIndex;
use crate::logs::unix_now;
use crate::pyparse::{ParseError, ParseLimits, parse};
use crate::resolve::ModuleResolver;
use crate::warn::{
    Severity, TestClassifier, Warning, WarningKind, is_suppressed, scan_dynamic_patterns,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Files beyond this many lines are never parsed; generated sources are
/// the usual offenders and their parse cost dwarfs their value.
pub const MAX_PARSE_LINES: usize = 10_000;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Everything one analysis pass produces for a file.
pub struct AnalysisOutcome {
    pub relationships: Vec<Relationship>,
    pub warnings: Vec<Warning>,
    pub metadata: FileMetadata,
    pub definitions: Vec<DefRecord>,
}

// ── Registry ──────────────────────────────────────────────────────────────────

pub trait LanguageAnalyzer: Send + Sync {
    /// Analyse raw file bytes.  Never fails: every failure mode degrades
    /// to metadata flags and warnings.
    fn analyze(&self, rel_path: &str, bytes: &[u8]) -> AnalysisOutcome;
}

pub struct AnalyzerRegistry {
    by_extension: HashMap<&'static str, Arc<dyn LanguageAnalyzer>>,
}

impl AnalyzerRegistry {
    /// The v0.1.0 registry: Python only.
    pub fn standard(root: &Path, config: Config, classifier: Arc<TestClassifier>) -> Self {
        let mut by_extension: HashMap<&'static str, Arc<dyn LanguageAnalyzer>> = HashMap::new();
        by_extension.insert("py", Arc::new(PythonAnalyzer::new(root, config, classifier)));
        Self { by_extension }
    }

    pub fn for_path(&self, rel_path: &str) -> Option<Arc<dyn LanguageAnalyzer>> {
        let ext = Path::new(rel_path).extension()?.to_str()?;
        self.by_extension.get(ext).cloned()
    }
}

// ── Python analyzer ───────────────────────────────────────────────────────────

pub struct PythonAnalyzer {
    resolver: ModuleResolver,
    config: Config,
    classifier: Arc<TestClassifier>,
}

impl PythonAnalyzer {
    pub fn new(root: &Path, config: Config, classifier: Arc<TestClassifier>) -> Self {
        Self {
            resolver: ModuleResolver::new(root),
            config,
            classifier,
        }
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn analyze(&self, rel_path: &str, bytes: &[u8]) -> AnalysisOutcome {
        let now = unix_now();
        let mut metadata = FileMetadata {
            filepath: rel_path.to_string(),
            last_analyzed: now,
            ..Default::default()
        };
        let mut warnings = Vec::new();

        // 1. Decode: UTF-8, falling back to Latin-1.
        let (source, used_fallback) = decode_source(bytes);
        if used_fallback {
            debug!(file = rel_path, "decoded with Latin-1 fallback");
            warnings.push(make_warning(
                rel_path,
                1,
                WarningKind::EncodingFallback,
                Severity::Info,
                "file is not valid UTF-8; decoded as Latin-1".to_string(),
                "",
                now,
            ));
        }

        // 2. Size guard.
        let line_count = source.lines().count();
        if line_count > MAX_PARSE_LINES {
            warnings.push(make_warning(
                rel_path,
                1,
                WarningKind::FileTooLarge,
                Severity::Info,
                format!("{line_count} lines exceed the {MAX_PARSE_LINES}-line parse limit"),
                "",
                now,
            ));
            return AnalysisOutcome {
                relationships: Vec::new(),
                warnings: self.finish_warnings(rel_path, warnings, &mut metadata),
                metadata,
                definitions: Vec::new(),
            };
        }

        // 3–4. Bounded parse.
        let limits = ParseLimits {
            deadline: Some(
                Instant::now() + Duration::from_secs_f64(self.config.ast_parsing_timeout_seconds),
            ),
            max_depth: self.config.ast_max_recursion_depth,
        };
        let stmts = match parse(&source, limits) {
            Ok(stmts) => stmts,
            Err(err) => {
                metadata.is_unparseable = true;
                let message = match err {
                    ParseError::Timeout => "parsing exceeded the time limit".to_string(),
                    ParseError::DepthExceeded => {
                        "nesting exceeds the recursion depth limit".to_string()
                    }
                    ParseError::UnclosedBrackets => "syntax error: unclosed brackets".to_string(),
                };
                warnings.push(make_warning(
                    rel_path,
                    1,
                    WarningKind::ParseFailure,
                    Severity::Warning,
                    message,
                    "",
                    now,
                ));
                return AnalysisOutcome {
                    relationships: Vec::new(),
                    warnings: self.finish_warnings(rel_path, warnings, &mut metadata),
                    metadata,
                    definitions: Vec::new(),
                };
            }
        };

        // 5. Detector traversal over one pass of the tree.
        let line_index = LineIndex::new(&source);
        let definitions = collect_definitions(&stmts, &line_index);
        let local_defs: HashSet<String> = definitions.iter().map(|d| d.name.clone()).collect();
        let mut cx = AnalysisContext::new(rel_path, &self.resolver, &line_index, local_defs);
        let registry = DetectorRegistry::standard();
        let mut relationships = Vec::new();
        walk(&stmts, &registry, &mut cx, &mut relationships);

        // Dynamic-pattern scan, using the completed import map.
        warnings.extend(scan_dynamic_patterns(
            &stmts,
            &source,
            &line_index,
            rel_path,
            &cx.import_map,
            now,
        ));
        if self.config.warn_on_wildcards {
            warnings.extend(wildcard_warnings(&stmts, &source, &line_index, rel_path, now));
        }

        // 6. Deduplicate by full tuple, preserving extraction order.
        let mut seen = HashSet::new();
        relationships.retain(|r| seen.insert(r.clone()));

        AnalysisOutcome {
            relationships,
            warnings: self.finish_warnings(rel_path, warnings, &mut metadata),
            metadata,
            definitions,
        }
    }
}

impl PythonAnalyzer {
    /// Apply test-module classification and configured suppression, then
    /// mark the file's metadata from the warnings that survive.
    fn finish_warnings(
        &self,
        rel_path: &str,
        warnings: Vec<Warning>,
        metadata: &mut FileMetadata,
    ) -> Vec<Warning> {
        let is_test = self.classifier.is_test_module(rel_path);
        let kept: Vec<Warning> = warnings
            .into_iter()
            .filter(|w| {
                if is_test && w.warning_type.is_dynamic_pattern() {
                    return false;
                }
                !is_suppressed(&self.config, rel_path, w.warning_type)
            })
            .collect();
        for w in &kept {
            if w.warning_type.is_dynamic_pattern() {
                metadata.has_dynamic_patterns = true;
                let kind = w.warning_type.to_string();
                if !metadata.dynamic_pattern_types.contains(&kind) {
                    metadata.dynamic_pattern_types.push(kind);
                }
            }
        }
        kept
    }
}

// ── helpers ───────────────────────────────────────────────────────────────────

/// UTF-8 first; any invalid sequence falls back to Latin-1, which maps
/// every byte to its code point and therefore cannot fail.
pub fn decode_source(bytes: &[u8]) -> (String, bool) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), false),
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), true),
    }
}

fn make_warning(
    filepath: &str,
    line_number: usize,
    warning_type: WarningKind,
    severity: Severity,
    message: String,
    code_snippet: &str,
    timestamp: f64,
) -> Warning {
    Warning {
        filepath: filepath.to_string(),
        line_number,
        warning_type,
        severity,
        message,
        code_snippet: code_snippet.to_string(),
        timestamp,
        suppressed: false,
    }
}

/// Module-level function and class definitions, for signature lookup and
/// call shadowing.
fn collect_definitions(stmts: &[Stmt<'_>], line_index: &LineIndex) -> Vec<DefRecord> {
    let mut out = Vec::new();
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::FunctionDef(f) => out.push(DefRecord {
                name: f.name.to_string(),
                line: line_index.line(f.offset as usize),
                kind: DefKind::Function,
            }),
            StmtKind::ClassDef(c) => out.push(DefRecord {
                name: c.name.to_string(),
                line: line_index.line(c.offset as usize),
                kind: DefKind::Class,
            }),
            _ => {}
        }
    }
    out
}

/// Single traversal: every statement node first, then each call site found
/// in its expressions, then the nested bodies.  Guarded regions (type-check
/// blocks, version guards, import-error try blocks) set the conditional
/// flag for the imports inside them.
fn walk<'src>(
    stmts: &[Stmt<'src>],
    registry: &DetectorRegistry,
    cx: &mut AnalysisContext<'_>,
    out: &mut Vec<Relationship>,
) {
    for stmt in stmts {
        out.extend(registry.run(&AstNode::Stmt(stmt), cx));
        for info in stmt_exprs(stmt) {
            for call in &info.calls {
                out.extend(registry.run(&AstNode::Call(call), cx));
            }
        }
        match &stmt.kind {
            StmtKind::If { test, body, orelse } => {
                let type_checking = matches!(
                    test.kind,
                    crate::ast::ExprKind::Name("TYPE_CHECKING")
                        | crate::ast::ExprKind::Attr("typing", "TYPE_CHECKING")
                );
                let version_guard = test.names.iter().any(|(n, _)| *n == "version_info");
                let prev = cx.conditional;
                cx.conditional = prev || type_checking || version_guard;
                walk(body, registry, cx, out);
                cx.conditional = prev || version_guard;
                walk(orelse, registry, cx, out);
                cx.conditional = prev;
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let import_guard = handlers.iter().any(|h| {
                    h.type_names
                        .iter()
                        .any(|n| *n == "ImportError" || *n == "ModuleNotFoundError")
                });
                let prev = cx.conditional;
                cx.conditional = prev || import_guard;
                walk(body, registry, cx, out);
                for h in handlers {
                    walk(&h.body, registry, cx, out);
                }
                cx.conditional = prev;
                walk(orelse, registry, cx, out);
                walk(finalbody, registry, cx, out);
            }
            StmtKind::FunctionDef(f) => walk(&f.body, registry, cx, out),
            StmtKind::ClassDef(c) => walk(&c.body, registry, cx, out),
            StmtKind::For { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
                walk(body, registry, cx, out);
                walk(orelse, registry, cx, out);
            }
            StmtKind::With { body, .. } | StmtKind::Block { body, .. } => {
                walk(body, registry, cx, out)
            }
            _ => {}
        }
    }
}

fn wildcard_warnings(
    stmts: &[Stmt<'_>],
    source: &str,
    line_index: &LineIndex,
    rel_path: &str,
    timestamp: f64,
) -> Vec<Warning> {
    let mut out = Vec::new();
    for stmt in stmts {
        if let StmtKind::ImportFrom { module, star: true, .. } = &stmt.kind {
            let line = line_index.line(stmt.offset as usize);
            let snippet = source.lines().nth(line - 1).unwrap_or("").trim();
            out.push(make_warning(
                rel_path,
                line,
                WarningKind::WildcardImport,
                Severity::Info,
                format!(
                    "wildcard import from `{}` hides which names are used",
                    (*module).unwrap_or(".")
                ),
                snippet,
                timestamp,
            ));
        }
    }
    out
}

// ── tests ────────────────────────────────────────────────────────────────────
