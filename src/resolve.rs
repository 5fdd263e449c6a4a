//! Symbol/module resolution against the project tree.
//!
//! Mirrors the Python lookup order: sibling `m.py`, sibling package
//! `m/__init__.py`, then the same pair at each ancestor up to the project
//! root.  Within one directory a module file shadows a package of the same
//! name, matching the runtime.  Anything that never lands on a project file
//! is tagged `<stdlib:…>`, `<third-party:…>`, or — for failed relative
//! imports — `<unresolved:…>`.

use std::path::{Path, PathBuf};

/// Top-level standard-library module names (the ones that matter for
/// classification; exhaustiveness is not required — unknown absolute
/// imports degrade to `<third-party:…>`, which is equally untracked).
const STDLIB_MODULES: &[&str] = &[
    "abc", "argparse", "asyncio", "base64", "bisect", "builtins", "calendar", "collections",
    "concurrent", "configparser", "contextlib", "copy", "csv", "ctypes", "dataclasses", "datetime",
    "decimal", "difflib", "dis", "email", "enum", "errno", "fnmatch", "functools", "gc", "getpass",
    "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "importlib", "inspect", "io",
    "itertools", "json", "logging", "math", "mimetypes", "multiprocessing", "operator", "os",
    "pathlib", "pickle", "platform", "pprint", "queue", "random", "re", "secrets", "select",
    "shlex", "shutil", "signal", "site", "socket", "sqlite3", "ssl", "stat", "statistics",
    "string", "struct", "subprocess", "sys", "tempfile", "textwrap", "threading", "time",
    "timeit", "tokenize", "traceback", "types", "typing", "unicodedata", "unittest", "urllib",
    "uuid", "venv", "warnings", "weakref", "xml", "zipfile", "zlib",
];

pub struct ModuleResolver {
    root: PathBuf,
}

impl ModuleResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `import module` / `from module import …` as written in
    /// `importer` (project-relative path).  `level` is the relative-import
    /// dot count; `module` may be empty for `from . import x`.
    pub fn resolve_module(&self, importer: &str, module: &str, level: u32) -> String {
        if level > 0 {
            return self.resolve_relative(importer, module, level);
        }

        // Absolute import: the module path relative to the importer's
        // directory, then each ancestor up to the project root.
        let rel_module: PathBuf = module.split('.').collect();
        let mut dir = parent_of(importer);
        loop {
            if let Some(hit) = self.probe(&dir.join(&rel_module)) {
                return hit;
            }
            if dir.as_os_str().is_empty() {
                break;
            }
            dir = dir.parent().map(Path::to_path_buf).unwrap_or_default();
        }

        let head = module.split('.').next().unwrap_or(module);
        if STDLIB_MODULES.contains(&head) {
            format!("<stdlib:{module}>")
        } else {
            format!("<third-party:{module}>")
        }
    }

    /// Resolve `from module import symbol`: if `symbol` is itself a
    /// submodule of the resolved package, the dependency points at the
    /// submodule's file; otherwise at the module's own file.
    pub fn resolve_from_import(
        &self,
        importer: &str,
        module: &str,
        level: u32,
        symbol: &str,
    ) -> String {
        let module_target = self.resolve_module(importer, module, level);
        if module_target.starts_with('<') {
            return module_target;
        }
        // Package: `from pkg import name` may pick out pkg/name.py.
        if module_target.ends_with("__init__.py") {
            let pkg_dir = parent_of(&module_target);
            if let Some(hit) = self.probe(&pkg_dir.join(symbol)) {
                return hit;
            }
        }
        module_target
    }

    fn resolve_relative(&self, importer: &str, module: &str, level: u32) -> String {
        let mut dir = parent_of(importer);
        // Level 1 is the importer's own package; each further dot ascends.
        for _ in 1..level {
            if dir.as_os_str().is_empty() {
                return unresolved_tag(module, level);
            }
            dir = dir.parent().map(Path::to_path_buf).unwrap_or_default();
        }
        if module.is_empty() {
            // `from . import x` — the dependency target is the package
            // itself; the caller refines per-symbol via resolve_from_import.
            let init = dir.join("__init__.py");
            if self.root.join(&init).is_file() {
                return to_canonical(&init);
            }
            return unresolved_tag(module, level);
        }
        let rel_module: PathBuf = module.split('.').collect();
        match self.probe(&dir.join(rel_module)) {
            Some(hit) => hit,
            None => unresolved_tag(module, level),
        }
    }

    /// `from . import x` symbol refinement for bare relative imports.
    pub fn resolve_relative_symbol(&self, importer: &str, level: u32, symbol: &str) -> String {
        let mut dir = parent_of(importer);
        for _ in 1..level {
            if dir.as_os_str().is_empty() {
                return unresolved_tag(symbol, level);
            }
            dir = dir.parent().map(Path::to_path_buf).unwrap_or_default();
        }
        match self.probe(&dir.join(symbol)) {
            Some(hit) => hit,
            None => {
                let init = dir.join("__init__.py");
                if self.root.join(&init).is_file() {
                    to_canonical(&init)
                } else {
                    unresolved_tag(symbol, level)
                }
            }
        }
    }

    /// Check `base.py`, then `base/__init__.py`.  The module file wins the
    /// tie against a package of the same name, matching the runtime.
    fn probe(&self, base: &Path) -> Option<String> {
        let as_file = base.with_extension("py");
        if self.root.join(&as_file).is_file() {
            return Some(to_canonical(&as_file));
        }
        let as_pkg = base.join("__init__.py");
        if self.root.join(&as_pkg).is_file() {
            return Some(to_canonical(&as_pkg));
        }
        None
    }
}

fn parent_of(rel_path: &str) -> PathBuf {
    Path::new(rel_path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn to_canonical(p: &Path) -> String {
    let s = p.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn unresolved_tag(module: &str, level: u32) -> String {
    format!("<unresolved:{}{}>", ".".repeat(level as usize), module)
}

// ── tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "").unwrap();
    }

    #[test]
    fn test_sibling_module_resolution() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "retry.py");
        touch(dir.path(), "bot.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(r.resolve_module("bot.py", "retry", 0), "retry.py");
    }

    #[test]
    fn test_module_file_shadows_package() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "utils.py");
        touch(dir.path(), "utils/__init__.py");
        touch(dir.path(), "app.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(r.resolve_module("app.py", "utils", 0), "utils.py");
    }

    #[test]
    fn test_package_resolution_without_shadow() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "pkg/__init__.py");
        touch(dir.path(), "app.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(r.resolve_module("app.py", "pkg", 0), "pkg/__init__.py");
    }

    #[test]
    fn test_ancestor_walk() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "shared.py");
        touch(dir.path(), "pkg/sub/deep.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(r.resolve_module("pkg/sub/deep.py", "shared", 0), "shared.py");
    }

    #[test]
    fn test_stdlib_and_third_party_tags() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(r.resolve_module("app.py", "os.path", 0), "<stdlib:os.path>");
        assert_eq!(
            r.resolve_module("app.py", "requests", 0),
            "<third-party:requests>"
        );
    }

    #[test]
    fn test_relative_import_same_package() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "pkg/__init__.py");
        touch(dir.path(), "pkg/models.py");
        touch(dir.path(), "pkg/views.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(r.resolve_module("pkg/views.py", "models", 1), "pkg/models.py");
    }

    #[test]
    fn test_relative_import_parent_package() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "pkg/core.py");
        touch(dir.path(), "pkg/sub/child.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(r.resolve_module("pkg/sub/child.py", "core", 2), "pkg/core.py");
    }

    #[test]
    fn test_failed_relative_import_is_unresolved() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "pkg/views.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(
            r.resolve_module("pkg/views.py", "missing", 1),
            "<unresolved:.missing>"
        );
    }

    #[test]
    fn test_from_import_picks_submodule() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "pkg/__init__.py");
        touch(dir.path(), "pkg/handlers.py");
        touch(dir.path(), "app.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(
            r.resolve_from_import("app.py", "pkg", 0, "handlers"),
            "pkg/handlers.py"
        );
        assert_eq!(
            r.resolve_from_import("app.py", "pkg", 0, "SOME_CONSTANT"),
            "pkg/__init__.py"
        );
    }

    #[test]
    fn test_bare_relative_symbol() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "pkg/__init__.py");
        touch(dir.path(), "pkg/sibling.py");
        touch(dir.path(), "pkg/main.py");
        let r = ModuleResolver::new(dir.path());
        assert_eq!(
            r.resolve_relative_symbol("pkg/main.py", 1, "sibling"),
            "pkg/sibling.py"
        );
    }
}
