//! Import relationship detection.
//!
//! Handles every import form: `import m`, `import m as a`,
//! `from m import x [as y]`, `from . import x`, `from ..pkg import x`, and
//! `from m import *`.  Each imported symbol yields one relationship and one
//! import-map binding (later imports overwrite earlier bindings).  Imports
//! inside guarded regions are tagged `conditional_import`; star imports
//! become module-level `wildcard_import` dependencies because per-function
//! tracking is impossible for them.

use crate::ast::{ImportAlias, StmtKind};
use crate::detect::{AnalysisContext, AstNode, Detector};
use crate::graph::{Relationship, RelationshipType};

pub const WILDCARD_LIMITATION: &str = "function-level tracking unavailable";

pub struct ImportDetector;

impl Detector for ImportDetector {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn priority(&self) -> u8 {
        100
    }

    fn can_handle(&self, node: &AstNode<'_, '_>) -> bool {
        matches!(
            node,
            AstNode::Stmt(s) if matches!(s.kind, StmtKind::Import(_) | StmtKind::ImportFrom { .. })
        )
    }

    fn detect(&self, node: &AstNode<'_, '_>, cx: &mut AnalysisContext<'_>) -> Vec<Relationship> {
        let AstNode::Stmt(stmt) = node else {
            return Vec::new();
        };
        match &stmt.kind {
            StmtKind::Import(aliases) => self.detect_plain(aliases, cx),
            StmtKind::ImportFrom {
                module,
                names,
                level,
                star,
            } => {
                if *star {
                    self.detect_star((*module).unwrap_or(""), *level, stmt.offset, cx)
                } else {
                    self.detect_from(module.as_deref(), names, *level, cx)
                }
            }
            _ => Vec::new(),
        }
    }
}

impl ImportDetector {
    fn detect_plain(
        &self,
        aliases: &[ImportAlias<'_>],
        cx: &mut AnalysisContext<'_>,
    ) -> Vec<Relationship> {
        let mut out = Vec::new();
        for alias in aliases {
            let target = cx.resolver.resolve_module(cx.filepath, alias.name, 0);
            // `import a.b.c` binds `a`; `import a.b.c as x` binds `x`.
            let bound = alias
                .asname
                .unwrap_or_else(|| alias.name.split('.').next().unwrap_or(alias.name));
            cx.import_map.insert(bound.to_string(), target.clone());

            let mut r = Relationship::new(
                cx.filepath,
                target,
                self.import_type(cx),
                cx.line_index.line(alias.offset as usize),
            );
            if let Some(asname) = alias.asname {
                r.metadata.insert("alias".into(), asname.into());
            }
            if cx.conditional {
                r.metadata.insert("conditional".into(), "true".into());
            }
            out.push(r);
        }
        out
    }

    fn detect_from(
        &self,
        module: Option<&str>,
        names: &[ImportAlias<'_>],
        level: u32,
        cx: &mut AnalysisContext<'_>,
    ) -> Vec<Relationship> {
        // `from __future__ import …` are compiler directives, not
        // dependencies.
        if module == Some("__future__") {
            return Vec::new();
        }
        let mut out = Vec::new();
        for alias in names {
            let target = match module {
                Some(m) => cx
                    .resolver
                    .resolve_from_import(cx.filepath, m, level, alias.name),
                None => cx.resolver.resolve_relative_symbol(cx.filepath, level, alias.name),
            };
            let bound = alias.asname.unwrap_or(alias.name);
            cx.import_map.insert(bound.to_string(), target.clone());

            let mut r = Relationship::new(
                cx.filepath,
                target,
                self.import_type(cx),
                cx.line_index.line(alias.offset as usize),
            );
            r.target_symbol = Some(alias.name.to_string());
            if let Some(asname) = alias.asname {
                r.metadata.insert("alias".into(), asname.into());
            }
            if cx.conditional {
                r.metadata.insert("conditional".into(), "true".into());
            }
            out.push(r);
        }
        out
    }

    fn detect_star(
        &self,
        module: &str,
        level: u32,
        offset: u32,
        cx: &mut AnalysisContext<'_>,
    ) -> Vec<Relationship> {
        let target = cx.resolver.resolve_module(cx.filepath, module, level);
        let mut r = Relationship::new(
            cx.filepath,
            target,
            RelationshipType::WildcardImport,
            cx.line_index.line(offset as usize),
        );
        r.metadata
            .insert("limitation".into(), WILDCARD_LIMITATION.into());
        if cx.conditional {
            r.metadata.insert("conditional".into(), "true".into());
        }
        vec![r]
    }

    fn import_type(&self, cx: &AnalysisContext<'_>) -> RelationshipType {
        if cx.conditional {
            RelationshipType::ConditionalImport
        } else {
            RelationshipType::Import
        }
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
    use std::fs;
    use tempfile::TempDir;

    fn run(src: &str, files: &[&str]) -> (Vec<Relationship>, Vec<(String, String)>) {
        let dir = TempDir::new().unwrap();
        for f in files {
            let p = dir.path().join(f);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "").unwrap();
        }
        let resolver = ModuleResolver::new(dir.path());
        let index = LineIndex::new(src);
        let mut cx = AnalysisContext::new("main.py", &resolver, &index, Default::default());
        let registry = DetectorRegistry::standard();
        let stmts = parse(src, ParseLimits::default()).unwrap();
        let mut rels = Vec::new();
        for stmt in &stmts {
            rels.extend(registry.run(&AstNode::Stmt(stmt), &mut cx));
        }
        let mut map: Vec<(String, String)> = cx
            .import_map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        map.sort();
        (rels, map)
    }

    #[test]
    fn test_from_import_creates_relationship_and_binding() {
        let (rels, map) = run("from retry import retry_with_backoff\n", &["retry.py"]);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target_file, "retry.py");
        assert_eq!(rels[0].relationship_type, RelationshipType::Import);
        assert_eq!(rels[0].target_symbol.as_deref(), Some("retry_with_backoff"));
        assert_eq!(rels[0].line_number, 1);
        assert_eq!(
            map,
            vec![("retry_with_backoff".to_string(), "retry.py".to_string())]
        );
    }

    #[test]
    fn test_aliased_import_records_alias() {
        let (rels, map) = run("import helpers as h\n", &["helpers.py"]);
        assert_eq!(rels[0].metadata.get("alias").map(String::as_str), Some("h"));
        assert_eq!(map, vec![("h".to_string(), "helpers.py".to_string())]);
    }

    #[test]
    fn test_dotted_import_binds_root() {
        let (_, map) = run("import os.path\n", &[]);
        assert_eq!(map[0].0, "os");
        assert_eq!(map[0].1, "<stdlib:os.path>");
    }

    #[test]
    fn test_wildcard_import_metadata() {
        let (rels, _) = run("from utils import *\n", &["utils.py"]);
        assert_eq!(rels[0].relationship_type, RelationshipType::WildcardImport);
        assert_eq!(
            rels[0].metadata.get("limitation").map(String::as_str),
            Some(WILDCARD_LIMITATION)
        );
    }

    #[test]
    fn test_future_import_ignored() {
        let (rels, map) = run("from __future__ import annotations\n", &[]);
        assert!(rels.is_empty());
        assert!(map.is_empty());
    }

    #[test]
    fn test_last_import_wins_binding() {
        let (_, map) = run(
            "from first import helper\nfrom second import helper\n",
            &["first.py", "second.py"],
        );
        assert_eq!(map, vec![("helper".to_string(), "second.py".to_string())]);
    }
}
