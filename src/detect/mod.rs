//! Relationship detectors.
//!
//! Each detector recognises one relationship pattern in the AST.  They are
//! registered behind trait objects in a priority-sorted list: for every
//! visited node the first detector whose `can_handle` returns true produces
//! the relationships; later detectors do not fire on that node.  The import
//! detector carries the highest priority so the import map is complete
//! before anything consumes it.

pub mod calls;
pub mod imports;
pub mod inheritance;

use crate::ast::{CallInfo, ExprInfo, Stmt, StmtKind};
use crate::graph::Relationship;
use crate::location::LineIndex;
use crate::resolve::ModuleResolver;
use std::collections::{HashMap, HashSet};

pub use calls::FunctionCallDetector;
pub use imports::ImportDetector;
pub use inheritance::ClassInheritanceDetector;

// ── Analysis context ──────────────────────────────────────────────────────────

/// Per-file state shared by the detectors during one traversal.
pub struct AnalysisContext<'a> {
    /// Project-relative path of the file under analysis.
    pub filepath: &'a str,
    pub resolver: &'a ModuleResolver,
    pub line_index: &'a LineIndex,
    /// Locally bound import names → resolved target (path or `<…>` tag).
    /// Later imports overwrite earlier ones: last binding wins.
    pub import_map: HashMap<String, String>,
    /// Module-level `def`/`class` names; these shadow imported names when
    /// resolving calls.
    pub local_defs: HashSet<String>,
    /// True while walking a guarded region (`if TYPE_CHECKING:`, version
    /// guards, `try` blocks whose handlers catch import errors).
    pub conditional: bool,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        filepath: &'a str,
        resolver: &'a ModuleResolver,
        line_index: &'a LineIndex,
        local_defs: HashSet<String>,
    ) -> Self {
        Self {
            filepath,
            resolver,
            line_index,
            import_map: HashMap::new(),
            local_defs,
            conditional: false,
        }
    }

    /// Resolve a bare name per the shadowing policy: local definitions,
    /// then imported names, then builtins (None).
    pub fn lookup(&self, name: &str) -> Option<&str> {
        if self.local_defs.contains(name) {
            return None;
        }
        self.import_map.get(name).map(String::as_str)
    }
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

/// The units the detector registry dispatches on: whole statements, and
/// the individual call sites found inside their expressions.
pub enum AstNode<'a, 'src> {
    Stmt(&'a Stmt<'src>),
    Call(&'a CallInfo<'src>),
}

/// All expression facts attached to one statement (not its nested body).
pub fn stmt_exprs<'a, 'src>(stmt: &'a Stmt<'src>) -> Vec<&'a ExprInfo<'src>> {
    let mut out = Vec::new();
    match &stmt.kind {
        StmtKind::Assign { value, .. } => out.push(value),
        StmtKind::If { test, .. } | StmtKind::While { test, .. } => out.push(test),
        StmtKind::For { iter, .. } => out.push(iter),
        StmtKind::With { items, .. } => out.extend(items.iter()),
        StmtKind::Expr(info) => out.push(info),
        StmtKind::Block { header, .. } => out.push(header),
        StmtKind::FunctionDef(f) => out.extend(f.decorators.iter()),
        StmtKind::ClassDef(c) => {
            out.extend(c.decorators.iter());
            out.extend(c.bases.iter());
            out.extend(c.keywords.iter().map(|(_, v)| v));
        }
        StmtKind::Import(_) | StmtKind::ImportFrom { .. } | StmtKind::Try { .. } => {}
    }
    out
}

// ── Detector trait / registry ─────────────────────────────────────────────────

pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;
    /// Higher runs earlier.
    fn priority(&self) -> u8;
    fn can_handle(&self, node: &AstNode<'_, '_>) -> bool;
    fn detect(&self, node: &AstNode<'_, '_>, cx: &mut AnalysisContext<'_>) -> Vec<Relationship>;
}

pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    /// The v0.1.0 set, sorted by descending priority.
    pub fn standard() -> Self {
        Self::with_detectors(vec![
            Box::new(ImportDetector),
            Box::new(ClassInheritanceDetector),
            Box::new(FunctionCallDetector),
        ])
    }

    pub fn with_detectors(mut detectors: Vec<Box<dyn Detector>>) -> Self {
        detectors.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { detectors }
    }

    /// Dispatch one node: the first detector that can handle it wins.
    pub fn run(&self, node: &AstNode<'_, '_>, cx: &mut AnalysisContext<'_>) -> Vec<Relationship> {
        for d in &self.detectors {
            if d.can_handle(node) {
                return d.detect(node, cx);
            }
        }
        Vec::new()
    }
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_orders_by_descending_priority() {
        let reg = DetectorRegistry::standard();
        let priorities: Vec<u8> = reg.detectors.iter().map(|d| d.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
        assert_eq!(reg.detectors[0].name(), "imports");
    }
}
