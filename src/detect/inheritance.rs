//! Class-inheritance relationship detection.
//!
//! For `class C(B1, B2, …)` one `inheritance` relationship is emitted per
//! base whose name resolves through the import map (bare names and
//! single-hop `mod.Base` attributes).  Unresolvable bases — locally
//! defined classes, builtins, deeper attribute chains — yield nothing.

use crate::ast::{ExprKind, StmtKind};
use crate::detect::{AnalysisContext, AstNode, Detector};
use crate::graph::{Relationship, RelationshipType};

pub struct ClassInheritanceDetector;

impl Detector for ClassInheritanceDetector {
    fn name(&self) -> &'static str {
        "inheritance"
    }

    fn priority(&self) -> u8 {
        60
    }

    fn can_handle(&self, node: &AstNode<'_, '_>) -> bool {
        matches!(node, AstNode::Stmt(s) if matches!(s.kind, StmtKind::ClassDef(_)))
    }

    fn detect(&self, node: &AstNode<'_, '_>, cx: &mut AnalysisContext<'_>) -> Vec<Relationship> {
        let AstNode::Stmt(stmt) = node else {
            return Vec::new();
        };
        let StmtKind::ClassDef(class) = &stmt.kind else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for base in &class.bases {
            let (target, symbol) = match base.kind {
                ExprKind::Name(name) => match cx.lookup(name) {
                    Some(t) => (t.to_string(), name),
                    None => continue,
                },
                ExprKind::Attr(module, attr) => match cx.lookup(module) {
                    Some(t) => (t.to_string(), attr),
                    None => continue,
                },
                ExprKind::Other => continue,
            };
            if target.starts_with('<') {
                continue;
            }
            let mut r = Relationship::new(
                cx.filepath,
                target,
                RelationshipType::Inheritance,
                cx.line_index.line(class.offset as usize),
            );
            r.source_symbol = Some(class.name.to_string());
            r.target_symbol = Some(symbol.to_string());
            out.push(r);
        }
        out
    }
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectorRegistry;
    use crate::location::LineIndex;
    use crate::pyparse::{ParseLimits, parse};
    use crate::resolve::ModuleResolver;
    use tempfile::TempDir;

    fn detect_bases(src: &str, imports: &[(&str, &str)]) -> Vec<Relationship> {
        let dir = TempDir::new().unwrap();
        let resolver = ModuleResolver::new(dir.path());
        let index = LineIndex::new(src);
        let mut cx = AnalysisContext::new("main.py", &resolver, &index, Default::default());
        for (k, v) in imports {
            cx.import_map.insert(k.to_string(), v.to_string());
        }
        let registry = DetectorRegistry::standard();
        let stmts = parse(src, ParseLimits::default()).unwrap();
        let mut rels = Vec::new();
        for stmt in &stmts {
            rels.extend(registry.run(&AstNode::Stmt(stmt), &mut cx));
        }
        rels
    }

    #[test]
    fn test_imported_base_tracked() {
        let rels = detect_bases(
            "class Handler(BaseHandler):\n    pass\n",
            &[("BaseHandler", "base.py")],
        );
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].relationship_type, RelationshipType::Inheritance);
        assert_eq!(rels[0].target_file, "base.py");
        assert_eq!(rels[0].source_symbol.as_deref(), Some("Handler"));
        assert_eq!(rels[0].target_symbol.as_deref(), Some("BaseHandler"));
    }

    #[test]
    fn test_module_attr_base_tracked() {
        let rels = detect_bases(
            "class Handler(base.Handler):\n    pass\n",
            &[("base", "base.py")],
        );
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target_symbol.as_deref(), Some("Handler"));
    }

    #[test]
    fn test_one_relationship_per_resolvable_base() {
        let rels = detect_bases(
            "class C(A, object, B):\n    pass\n",
            &[("A", "a.py"), ("B", "b.py")],
        );
        assert_eq!(rels.len(), 2);
    }

    #[test]
    fn test_unknown_base_ignored() {
        let rels = detect_bases("class C(Exception):\n    pass\n", &[]);
        assert!(rels.is_empty());
    }
}
