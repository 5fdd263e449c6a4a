//! Warning subsystem for dynamic and unanalyzable constructs.
//!
//! Python code that dispatches through `getattr`, patches attributes on
//! imported modules, or runs `exec`/`eval` cannot be tracked statically.
//! Those sites are surfaced as warnings — never as relationships — and
//! only for source modules: the same constructs inside a test suite are
//! expected idiom (mocking, parametrisation) and stay quiet.

use crate::ast::{AssignTarget, Callee, ExprKind, Stmt, StmtKind};
use crate::config::Config;
use crate::location::LineIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

// ── Warning records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    DynamicDispatch,
    MonkeyPatching,
    ExecEval,
    Decorator,
    Metaclass,
    WildcardImport,
    FileTooLarge,
    ParseFailure,
    EncodingFallback,
}

impl WarningKind {
    /// Kinds that mark the file as dynamically patterned in its metadata.
    pub fn is_dynamic_pattern(self) -> bool {
        matches!(
            self,
            WarningKind::DynamicDispatch
                | WarningKind::MonkeyPatching
                | WarningKind::ExecEval
                | WarningKind::Decorator
                | WarningKind::Metaclass
        )
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::DynamicDispatch => "dynamic_dispatch",
            WarningKind::MonkeyPatching => "monkey_patching",
            WarningKind::ExecEval => "exec_eval",
            WarningKind::Decorator => "decorator",
            WarningKind::Metaclass => "metaclass",
            WarningKind::WildcardImport => "wildcard_import",
            WarningKind::FileTooLarge => "file_too_large",
            WarningKind::ParseFailure => "parse_failure",
            WarningKind::EncodingFallback => "encoding_fallback",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// Append-only event record; warnings never enter the relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub filepath: String,
    pub line_number: usize,
    pub warning_type: WarningKind,
    pub severity: Severity,
    pub message: String,
    pub code_snippet: String,
    pub timestamp: f64,
    pub suppressed: bool,
}

// ── Test-module classification ────────────────────────────────────────────────

/// Decides whether a file belongs to the test suite.  Built-in patterns
/// (`tests/**`, `test_*.py`, `*_test.py`, `conftest.py`) are augmented by
/// `python_files` globs read statically from the project's pytest
/// configuration — pytest itself is never executed.
pub struct TestClassifier {
    extra_patterns: Vec<String>,
}

impl TestClassifier {
    pub fn new(extra_patterns: Vec<String>) -> Self {
        Self { extra_patterns }
    }

    /// Read `python_files` patterns from `pytest.ini`, `pyproject.toml`,
    /// or `setup.cfg` at the project root.
    pub fn from_project(root: &Path) -> Self {
        let mut extra = Vec::new();
        for name in ["pytest.ini", "pyproject.toml", "setup.cfg"] {
            let Ok(text) = fs::read_to_string(root.join(name)) else {
                continue;
            };
            extra.extend(parse_python_files_patterns(&text));
        }
        Self::new(extra)
    }

    /// Consulted once per analysed file.
    pub fn is_test_module(&self, rel_path: &str) -> bool {
        let filename = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if rel_path.split('/').any(|seg| seg == "tests") {
            return true;
        }
        if filename == "conftest.py"
            || (filename.starts_with("test_") && filename.ends_with(".py"))
            || filename.ends_with("_test.py")
        {
            return true;
        }
        self.extra_patterns
            .iter()
            .any(|p| wildcard_match(p, filename))
    }
}

/// Pull glob patterns out of a `python_files = …` line.  Handles the ini
/// form (`python_files = check_*.py smoke_*.py`) and the TOML list form
/// (`python_files = ["check_*.py"]`).
fn parse_python_files_patterns(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("python_files") {
            continue;
        }
        let Some(rhs) = trimmed.split('=').nth(1) else {
            continue;
        };
        for piece in rhs.split([',', ' ', '\t']) {
            let cleaned = piece.trim().trim_matches(['[', ']', '"', '\'']);
            if !cleaned.is_empty() {
                out.push(cleaned.to_string());
            }
        }
    }
    out
}

/// Filename matching with `*` wildcards only — the subset pytest patterns
/// actually use.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    fn inner(p: &[u8], n: &[u8]) -> bool {
        match (p.first().copied(), n.first().copied()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..]))
            }
            (Some(pc), Some(nc)) if pc == nc => inner(&p[1..], &n[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}

// ── Suppression ───────────────────────────────────────────────────────────────

/// Ordered suppression checks, most-specific first: per-file+kind entries,
/// kind-wide toggles, exact file paths, directory globs.  Test-module
/// classification is applied by the caller before any of these.
pub fn is_suppressed(config: &Config, filepath: &str, kind: WarningKind) -> bool {
    let kind_str = kind.to_string();
    for entry in &config.suppress_warnings {
        if let Some((path_part, kind_part)) = entry.rsplit_once(':') {
            if kind_part == kind_str && path_matches(path_part, filepath) {
                return true;
            }
        }
    }
    let kind_toggled = match kind {
        WarningKind::DynamicDispatch => config.suppress_dynamic_dispatch_warnings,
        WarningKind::MonkeyPatching => config.suppress_monkey_patching_warnings,
        WarningKind::ExecEval => config.suppress_exec_eval_warnings,
        WarningKind::Decorator => config.suppress_decorator_warnings,
        WarningKind::Metaclass => config.suppress_metaclass_warnings,
        _ => false,
    };
    if kind_toggled {
        return true;
    }
    config
        .suppress_warnings
        .iter()
        .filter(|e| !e.contains(':'))
        .any(|e| path_matches(e, filepath))
}

fn path_matches(pattern: &str, filepath: &str) -> bool {
    if pattern.contains('*') {
        wildcard_match(pattern, filepath)
    } else {
        pattern == filepath
    }
}

// ── Dynamic-pattern scan ──────────────────────────────────────────────────────

/// Decorators that never merit a warning.
const WELL_KNOWN_DECORATORS: &[&str] = &[
    "property",
    "staticmethod",
    "classmethod",
    "abstractmethod",
    "cached_property",
    "lru_cache",
    "cache",
    "wraps",
    "dataclass",
    "overload",
    "override",
    "final",
    "singledispatch",
    "singledispatchmethod",
    "contextmanager",
    "asynccontextmanager",
    "total_ordering",
    "fixture",
    "patch",
];

/// Decorator modules whose attributes are all well-known (stdlib helpers
/// plus the usual test frameworks).
const WELL_KNOWN_DECORATOR_MODULES: &[&str] = &[
    "functools",
    "abc",
    "typing",
    "dataclasses",
    "contextlib",
    "pytest",
    "mock",
    "unittest",
    "parameterized",
];

/// Walk the statement tree and collect every dynamic-pattern warning for
/// this file.  `import_map` is the post-detection binding map (needed to
/// recognise patches on *imported* names).  Suppression and test-module
/// classification are the caller's job.
pub fn scan_dynamic_patterns(
    stmts: &[Stmt<'_>],
    source: &str,
    line_index: &LineIndex,
    filepath: &str,
    import_map: &HashMap<String, String>,
    timestamp: f64,
) -> Vec<Warning> {
    let mut out = Vec::new();
    let mut scan = Scan {
        source,
        line_index,
        filepath,
        import_map,
        timestamp,
        out: &mut out,
    };
    scan.stmts(stmts);
    out
}

struct Scan<'a> {
    source: &'a str,
    line_index: &'a LineIndex,
    filepath: &'a str,
    import_map: &'a HashMap<String, String>,
    timestamp: f64,
    out: &'a mut Vec<Warning>,
}

impl Scan<'_> {
    fn stmts(&mut self, stmts: &[Stmt<'_>]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt<'_>) {
        for info in crate::detect::stmt_exprs(stmt) {
            for call in &info.calls {
                match call.callee {
                    Callee::GetattrDynamic => self.push(
                        WarningKind::DynamicDispatch,
                        Severity::Warning,
                        call.offset,
                        "dynamic attribute call cannot be tracked statically".to_string(),
                    ),
                    Callee::Name("exec") => self.push(
                        WarningKind::ExecEval,
                        Severity::Warning,
                        call.offset,
                        "exec() prevents static analysis of this file".to_string(),
                    ),
                    Callee::Name("eval") => self.push(
                        WarningKind::ExecEval,
                        Severity::Warning,
                        call.offset,
                        "eval() prevents static analysis of this file".to_string(),
                    ),
                    _ => {}
                }
            }
        }

        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    if let AssignTarget::Attr { base, attr, offset } = target
                        && self.import_map.contains_key(*base)
                    {
                        self.push(
                            WarningKind::MonkeyPatching,
                            Severity::Warning,
                            *offset,
                            format!("assignment patches `{attr}` on imported name `{base}`"),
                        );
                    }
                }
            }
            StmtKind::FunctionDef(f) => {
                self.decorators(&f.decorators);
                self.stmts(&f.body);
            }
            StmtKind::ClassDef(c) => {
                self.decorators(&c.decorators);
                for (kw, value) in &c.keywords {
                    if *kw == "metaclass" {
                        let name = match value.kind {
                            ExprKind::Name(n) => n.to_string(),
                            ExprKind::Attr(a, b) => format!("{a}.{b}"),
                            ExprKind::Other => "<expression>".to_string(),
                        };
                        self.push(
                            WarningKind::Metaclass,
                            Severity::Info,
                            c.offset,
                            format!("class `{}` uses custom metaclass `{name}`", c.name),
                        );
                    }
                }
                self.stmts(&c.body);
            }
            StmtKind::If { body, orelse, .. }
            | StmtKind::For { body, orelse, .. }
            | StmtKind::While { body, orelse, .. } => {
                self.stmts(body);
                self.stmts(orelse);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.stmts(body);
                for h in handlers {
                    self.stmts(&h.body);
                }
                self.stmts(orelse);
                self.stmts(finalbody);
            }
            StmtKind::With { body, .. } | StmtKind::Block { body, .. } => self.stmts(body),
            _ => {}
        }
    }

    fn decorators(&mut self, decorators: &[crate::ast::ExprInfo<'_>]) {
        for dec in decorators {
            let (well_known, label) = match dec.kind {
                ExprKind::Name(n) => (WELL_KNOWN_DECORATORS.contains(&n), n.to_string()),
                ExprKind::Attr(module, attr) => (
                    WELL_KNOWN_DECORATOR_MODULES.contains(&module)
                        || WELL_KNOWN_DECORATORS.contains(&attr),
                    format!("{module}.{attr}"),
                ),
                ExprKind::Other => (true, String::new()),
            };
            if !well_known {
                let offset = dec.names.first().map(|(_, o)| *o).unwrap_or(0);
                self.push(
                    WarningKind::Decorator,
                    Severity::Info,
                    offset,
                    format!("decorator `@{label}` may alter tracked behavior"),
                );
            }
        }
    }

    fn push(&mut self, kind: WarningKind, severity: Severity, offset: u32, message: String) {
        let line_number = self.line_index.line(offset as usize);
        let code_snippet = self
            .source
            .lines()
            .nth(line_number.saturating_sub(1))
            .unwrap_or("")
            .trim()
            .to_string();
        self.out.push(Warning {
            filepath: self.filepath.to_string(),
            line_number,
            warning_type: kind,
            severity,
            message,
            code_snippet,
            timestamp: self.timestamp,
            suppressed: false,
        });
    }
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyparse::{ParseLimits, parse};

    fn scan(src: &str, imports: &[(&str, &str)]) -> Vec<Warning> {
        let stmts = parse(src, ParseLimits::default()).unwrap();
        let index = LineIndex::new(src);
        let map: HashMap<String, String> = imports
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        scan_dynamic_patterns(&stmts, src, &index, "src/handler.py", &map, 0.0)
    }

    #[test]
    fn test_getattr_dynamic_dispatch_detected() {
        let warnings = scan("getattr(obj, name)()\n", &[]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].warning_type, WarningKind::DynamicDispatch);
        assert_eq!(warnings[0].line_number, 1);
        assert_eq!(warnings[0].code_snippet, "getattr(obj, name)()");
    }

    #[test]
    fn test_plain_getattr_not_flagged() {
        let warnings = scan("x = getattr(obj, 'attr', None)\n", &[]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_monkey_patch_on_imported_name() {
        let warnings = scan(
            "requests.get = fake_get\n",
            &[("requests", "<third-party:requests>")],
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].warning_type, WarningKind::MonkeyPatching);
    }

    #[test]
    fn test_attribute_assign_on_local_object_not_flagged() {
        let warnings = scan("self.value = 3\n", &[]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_exec_and_eval_detected() {
        let warnings = scan("exec(code)\ny = eval(expr)\n", &[]);
        assert_eq!(warnings.len(), 2);
        assert!(warnings
            .iter()
            .all(|w| w.warning_type == WarningKind::ExecEval));
    }

    #[test]
    fn test_custom_decorator_info_warning() {
        let warnings = scan("@registry.register\ndef handler():\n    pass\n", &[]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].warning_type, WarningKind::Decorator);
        assert_eq!(warnings[0].severity, Severity::Info);
    }

    #[test]
    fn test_well_known_decorators_quiet() {
        let warnings = scan(
            "@property\ndef x(self):\n    pass\n\n@functools.lru_cache\ndef f():\n    pass\n\n@pytest.fixture\ndef app():\n    pass\n",
            &[],
        );
        assert!(warnings.is_empty(), "got {warnings:?}");
    }

    #[test]
    fn test_metaclass_info_warning() {
        let warnings = scan("class Model(Base, metaclass=ModelMeta):\n    pass\n", &[]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].warning_type, WarningKind::Metaclass);
        assert!(warnings[0].message.contains("ModelMeta"));
    }

    #[test]
    fn test_nested_bodies_scanned() {
        let warnings = scan("def f():\n    if cond:\n        getattr(o, n)()\n", &[]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line_number, 3);
    }

    // ── classifier ───────────────────────────────────────────────────────────

    #[test]
    fn test_builtin_test_patterns() {
        let c = TestClassifier::new(vec![]);
        assert!(c.is_test_module("tests/test_handler.py"));
        assert!(c.is_test_module("tests/helpers.py"));
        assert!(c.is_test_module("test_bot.py"));
        assert!(c.is_test_module("pkg/api_test.py"));
        assert!(c.is_test_module("pkg/conftest.py"));
        assert!(!c.is_test_module("src/handler.py"));
        assert!(!c.is_test_module("src/contest.py"));
    }

    #[test]
    fn test_pytest_ini_patterns_extend_classifier() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(
            dir.path().join("pytest.ini"),
            "[pytest]\npython_files = check_*.py\n",
        )
        .unwrap();
        let c = TestClassifier::from_project(dir.path());
        assert!(c.is_test_module("pkg/check_integration.py"));
        assert!(!c.is_test_module("pkg/checks.py"));
    }

    #[test]
    fn test_pyproject_toml_list_form() {
        let patterns = parse_python_files_patterns(
            "[tool.pytest.ini_options]\npython_files = [\"check_*.py\", \"verify_*.py\"]\n",
        );
        assert_eq!(patterns, vec!["check_*.py", "verify_*.py"]);
    }

    // ── suppression ──────────────────────────────────────────────────────────

    #[test]
    fn test_kind_toggle_suppression() {
        let config = Config {
            suppress_exec_eval_warnings: true,
            ..Default::default()
        };
        assert!(is_suppressed(&config, "src/a.py", WarningKind::ExecEval));
        assert!(!is_suppressed(
            &config,
            "src/a.py",
            WarningKind::DynamicDispatch
        ));
    }

    #[test]
    fn test_file_and_glob_suppression() {
        let config = Config {
            suppress_warnings: vec!["src/gen.py".into(), "vendored/*".into()],
            ..Default::default()
        };
        assert!(is_suppressed(&config, "src/gen.py", WarningKind::ExecEval));
        assert!(is_suppressed(
            &config,
            "vendored/lib.py",
            WarningKind::Decorator
        ));
        assert!(!is_suppressed(&config, "src/app.py", WarningKind::ExecEval));
    }

    #[test]
    fn test_per_file_kind_suppression() {
        let config = Config {
            suppress_warnings: vec!["src/gen.py:exec_eval".into()],
            ..Default::default()
        };
        assert!(is_suppressed(&config, "src/gen.py", WarningKind::ExecEval));
        assert!(!is_suppressed(
            &config,
            "src/gen.py",
            WarningKind::MonkeyPatching
        ));
    }
}
