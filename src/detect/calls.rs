//! Function-call relationship detection.
//!
//! Tracks exactly two shapes: `name(args)` where `name` resolves through
//! the import map, and `module.name(args)` where `module` is a bound name
//! in the current scope.  Chained attribute calls (`a.b.c()`, `a.b().c()`)
//! and dynamic shapes (`getattr(...)(…)`) never produce relationships.
//!
//! Shadowing policy: a module-level definition of the same name beats an
//! imported name, and a name bound by neither is a builtin — both cases
//! stay local and yield nothing.  Calls landing outside the project
//! (stdlib/third-party) are already covered by their import relationship.

use crate::ast::Callee;
use crate::detect::{AnalysisContext, AstNode, Detector};
use crate::graph::{Relationship, RelationshipType};

pub struct FunctionCallDetector;

impl Detector for FunctionCallDetector {
    fn name(&self) -> &'static str {
        "function_calls"
    }

    fn priority(&self) -> u8 {
        50
    }

    fn can_handle(&self, node: &AstNode<'_, '_>) -> bool {
        matches!(
            node,
            AstNode::Call(info)
                if matches!(info.callee, Callee::Name(_) | Callee::Attr(_, _))
        )
    }

    fn detect(&self, node: &AstNode<'_, '_>, cx: &mut AnalysisContext<'_>) -> Vec<Relationship> {
        let AstNode::Call(info) = node else {
            return Vec::new();
        };
        let (target, symbol) = match info.callee {
            Callee::Name(name) => match cx.lookup(name) {
                Some(target) => (target.to_string(), name),
                None => return Vec::new(),
            },
            Callee::Attr(base, attr) => match cx.lookup(base) {
                Some(target) => (target.to_string(), attr),
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        // External targets are covered by the import edge.
        if target.starts_with('<') {
            return Vec::new();
        }
        let mut r = Relationship::new(
            cx.filepath,
            target,
            RelationshipType::FunctionCall,
            cx.line_index.line(info.offset as usize),
        );
        r.target_symbol = Some(symbol.to_string());
        vec![r]
    }
}

// ── tests ────────────────────────────────────────────────────────────────────
