use std::fs;
use std::path::PathBuf;
use weft::{Config, Session};

// ── helpers ──────────────────────────────────────────────────────────────────

struct TempProject {
    dir: tempfile::TempDir,
}

impl TempProject {
    fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
        }
    }

    fn file(&self, name: &str, content: &str) -> &Self {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        self
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn session(&self) -> Session {
        Session::start(self.dir.path(), Config::default()).unwrap()
    }

    fn session_with(&self, config: Config) -> Session {
        Session::start(self.dir.path(), config).unwrap()
    }

    fn warning_log(&self) -> Vec<serde_json::Value> {
        let path = self.dir.path().join(".weft/warning_log.jsonl");
        match fs::read_to_string(path) {
            Ok(text) => text
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

// ── basic import and injection ───────────────────────────────────────────────

#[test]
fn test_import_creates_bidirectional_edges() {
    let p = TempProject::new();
    p.file("retry.py", "def retry_with_backoff(func):\n    return func\n")
        .file("bot.py", "from retry import retry_with_backoff\n");
    let session = p.session();

    let deps = session.get_dependencies("bot.py").unwrap();
    assert_eq!(deps.len(), 1);
    assert!(deps.contains("retry.py"));
    assert!(session.get_dependents("retry.py").unwrap().contains("bot.py"));
}

#[test]
fn test_injected_section_quotes_signature_and_docstring() {
    let p = TempProject::new();
    // The definition sits well below the top of the file, so the snippet
    // has to name the real line.
    let mut retry = String::new();
    for _ in 0..119 {
        retry.push_str("# padding\n");
    }
    retry.push_str("def retry_with_backoff(func, max_attempts=3, base_delay=1.0):\n");
    retry.push_str("    \"\"\"Retry a callable with backoff.\"\"\"\n");
    retry.push_str("    return func\n");
    p.file("retry.py", &retry);

    let mut bot = String::from("from retry import retry_with_backoff\n");
    for _ in 0..44 {
        bot.push('\n');
    }
    bot.push_str("retry_with_backoff(fn)\n");
    p.file("bot.py", &bot);

    let session = p.session();
    let resp = session.read_with_context("bot.py").unwrap();

    assert!(resp.content.contains("[Cross-File Context]"));
    assert!(resp.content.contains("From retry.py:120"));
    assert!(resp
        .content
        .contains("def retry_with_backoff(func, max_attempts=3, base_delay=1.0):"));
    assert!(resp.content.contains("\"\"\"Retry a callable with backoff.\"\"\""));
    assert!(resp.content.contains("# Implementation in retry.py:120-"));
    assert!(resp.content.contains("(Cached "));
    // Separator, then the untouched original content.
    let tail = resp.content.split("\n---\n").nth(1).unwrap();
    assert_eq!(tail, bot);
}

#[test]
fn test_read_is_idempotent_without_changes() {
    let p = TempProject::new();
    p.file("util.py", "def helper():\n    \"\"\"Do it.\"\"\"\n    pass\n")
        .file("app.py", "from util import helper\nhelper()\n");
    let session = p.session();

    let first = session.read_with_context("app.py").unwrap();
    let second = session.read_with_context("app.py").unwrap();
    // Byte-identical modulo the cache-age line.
    let strip_age = |s: &str| {
        s.lines()
            .filter(|l| !l.starts_with("(Cached "))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(strip_age(&first.content), strip_age(&second.content));
}

// ── wildcard imports ─────────────────────────────────────────────────────────

#[test]
fn test_wildcard_import_relationship_and_note() {
    let p = TempProject::new();
    p.file("utils.py", "def tool():\n    pass\n")
        .file("a.py", "from utils import *\n");
    let session = p.session();

    let export = session.get_relationship_graph().unwrap();
    let wildcard: Vec<_> = export
        .relationships
        .iter()
        .filter(|r| r.source_file == "a.py" && r.target_file == "utils.py")
        .collect();
    assert_eq!(wildcard.len(), 1);
    assert_eq!(
        wildcard[0].relationship_type,
        weft::RelationshipType::WildcardImport
    );
    assert_eq!(
        wildcard[0].metadata.get("limitation").map(String::as_str),
        Some("function-level tracking unavailable")
    );

    let resp = session.read_with_context("a.py").unwrap();
    assert!(resp.content.contains("function-level tracking unavailable"));
    assert!(!resp.content.contains("def tool"));
}

// ── dynamic dispatch classification ──────────────────────────────────────────

#[test]
fn test_dynamic_dispatch_warned_in_source_only() {
    let p = TempProject::new();
    let mut src = String::new();
    for _ in 0..41 {
        src.push_str("x = 1\n");
    }
    src.push_str("getattr(obj, name)()\n");
    p.file("src/handler.py", &src);

    let mut test_src = String::new();
    for _ in 0..9 {
        test_src.push_str("y = 2\n");
    }
    test_src.push_str("getattr(obj, name)()\n");
    p.file("tests/test_handler.py", &test_src);

    let session = p.session();

    let log = p.warning_log();
    let dynamic: Vec<_> = log
        .iter()
        .filter(|w| w["warning_type"] == "dynamic_dispatch")
        .collect();
    assert_eq!(dynamic.len(), 1);
    assert_eq!(dynamic[0]["filepath"], "src/handler.py");
    assert_eq!(dynamic[0]["line_number"], 42);

    // Neither file gains a function_call relationship from those lines.
    let export = session.get_relationship_graph().unwrap();
    assert!(!export
        .relationships
        .iter()
        .any(|r| r.relationship_type == weft::RelationshipType::FunctionCall));
}

// ── staleness ────────────────────────────────────────────────────────────────

#[test]
fn test_modified_file_refreshes_content_and_graph() {
    let p = TempProject::new();
    p.file("retry.py", "def retry_with_backoff(func):\n    pass\n")
        .file("helper.py", "def assist():\n    pass\n")
        .file("bot.py", "from retry import retry_with_backoff\n");
    let session = p.session();

    let first = session.read_with_context("bot.py").unwrap();
    assert!(first.content.contains("retry_with_backoff"));
    let refreshes_before = session.get_cache_statistics().staleness_refreshes;

    // External modification; the watcher records the event.
    p.file("bot.py", "from helper import assist\n");
    session
        .events()
        .touch_at("bot.py", weft::logs::unix_now() + 1.0);

    let second = session.read_with_context("bot.py").unwrap();
    assert!(second.content.contains("from helper import assist"));
    assert!(!second.content.ends_with("from retry import retry_with_backoff\n"));

    let refreshes_after = session.get_cache_statistics().staleness_refreshes;
    let deps = session.get_dependencies("bot.py").unwrap();
    assert!(deps.contains("helper.py"));
    assert!(!deps.contains("retry.py"));
    // The trigger file itself refreshed exactly once more; its new
    // dependency may refresh on top during snippet assembly.
    assert!(refreshes_after > refreshes_before);
}

// ── module vs package shadowing ──────────────────────────────────────────────

#[test]
fn test_module_file_shadows_package() {
    let p = TempProject::new();
    p.file("utils.py", "def from_module():\n    pass\n")
        .file("utils/__init__.py", "def from_package():\n    pass\n")
        .file("app.py", "import utils\n");
    let session = p.session();

    let deps = session.get_dependencies("app.py").unwrap();
    assert!(deps.contains("utils.py"));
    assert!(!deps.contains("utils/__init__.py"));
}

// ── oversized files ──────────────────────────────────────────────────────────

#[test]
fn test_large_file_skipped_without_crash() {
    let p = TempProject::new();
    let big = "import os\n".repeat(12_000);
    p.file("big.py", &big).file("app.py", "x = 1\n");
    let session = p.session();

    assert!(session.get_dependencies("big.py").unwrap().is_empty());
    let log = p.warning_log();
    let too_large: Vec<_> = log
        .iter()
        .filter(|w| w["warning_type"] == "file_too_large")
        .collect();
    assert_eq!(too_large.len(), 1);
    assert_eq!(too_large[0]["filepath"], "big.py");
}

// ── unparseable dependencies ─────────────────────────────────────────────────

#[test]
fn test_broken_dependency_noted_not_quoted() {
    let p = TempProject::new();
    p.file("broken.py", "def broken(\n")
        .file("app.py", "from broken import broken\n");
    let session = p.session();

    let resp = session.read_with_context("app.py").unwrap();
    assert!(resp.content.contains("could not be parsed"));
}

#[test]
fn test_deleted_dependency_noted() {
    let p = TempProject::new();
    p.file("gone.py", "def helper():\n    pass\n")
        .file("app.py", "from gone import helper\nhelper()\n");
    let session = p.session();

    // Warm the cache so the dependency is known, then delete it.
    session.read_with_context("app.py").unwrap();
    fs::remove_file(p.path("gone.py")).unwrap();
    session
        .events()
        .touch_at("gone.py", weft::logs::unix_now() + 1.0);
    // One read observes the deletion (the snippet degrades to a note),
    // the next renders the deleted-file note from graph metadata.
    session.read_with_context("app.py").unwrap();
    let resp = session.read_with_context("app.py").unwrap();
    assert!(
        resp.content.contains("deleted on") || resp.content.contains("currently unreadable"),
        "expected a deletion note, got:\n{}",
        resp.content
    );
}

// ── conditional imports ──────────────────────────────────────────────────────

#[test]
fn test_type_checking_import_tagged_conditional() {
    let p = TempProject::new();
    p.file("models.py", "class User:\n    pass\n").file(
        "views.py",
        "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    from models import User\n",
    );
    let session = p.session();

    let export = session.get_relationship_graph().unwrap();
    assert!(export.relationships.iter().any(|r| {
        r.source_file == "views.py"
            && r.target_file == "models.py"
            && r.relationship_type == weft::RelationshipType::ConditionalImport
    }));
}

// ── inheritance ──────────────────────────────────────────────────────────────

#[test]
fn test_inheritance_relationship_extracted() {
    let p = TempProject::new();
    p.file("base.py", "class BaseHandler:\n    pass\n").file(
        "handler.py",
        "from base import BaseHandler\n\nclass Handler(BaseHandler):\n    pass\n",
    );
    let session = p.session();

    let export = session.get_relationship_graph().unwrap();
    assert!(export.relationships.iter().any(|r| {
        r.source_file == "handler.py"
            && r.target_file == "base.py"
            && r.relationship_type == weft::RelationshipType::Inheritance
    }));
}

// ── cache behaviour through the tool surface ─────────────────────────────────

#[test]
fn test_cache_hit_on_second_read() {
    let p = TempProject::new();
    p.file("a.py", "x = 1\n");
    let session = p.session();

    session.read_with_context("a.py").unwrap();
    session.read_with_context("a.py").unwrap();
    let stats = session.get_cache_statistics();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.staleness_refreshes, 1);
}

#[test]
fn test_eviction_under_tight_limit() {
    let p = TempProject::new();
    let filler = format!("# {}\n", "z".repeat(600));
    for name in ["a.py", "b.py", "c.py"] {
        p.file(name, &filler);
    }
    let session = p.session_with(Config {
        cache_size_limit_kb: 1,
        ..Default::default()
    });

    session.read_with_context("a.py").unwrap();
    session.read_with_context("b.py").unwrap();
    session.read_with_context("c.py").unwrap();
    let stats = session.get_cache_statistics();
    assert!(stats.evictions >= 1);
    assert!(stats.current_bytes <= 1024);
}

// ── export round-trip ────────────────────────────────────────────────────────

#[test]
fn test_export_rebuild_reexport_is_identical() {
    let p = TempProject::new();
    p.file("util.py", "def helper():\n    pass\n")
        .file("app.py", "from util import helper\nhelper()\n")
        .file("other.py", "import util\nutil.helper()\n");
    let session = p.session();

    let first = serde_json::to_string(&session.get_relationship_graph().unwrap()).unwrap();
    // A second session over the same tree re-analyses everything from
    // scratch; the canonical export must not change.
    drop(session);
    let session = p.session();
    let second = serde_json::to_string(&session.get_relationship_graph().unwrap()).unwrap();
    assert_eq!(first, second);
}

// ── tool-surface argument validation ─────────────────────────────────────────

#[test]
fn test_invalid_arguments_are_errors() {
    let p = TempProject::new();
    p.file("a.py", "x = 1\n");
    let session = p.session();

    assert!(session.read_with_context("").is_err());
    assert!(session.read_with_context("../etc/passwd").is_err());
    assert!(session.get_dependencies("").is_err());
}

#[test]
fn test_missing_file_is_error_not_panic() {
    let p = TempProject::new();
    p.file("a.py", "x = 1\n");
    let session = p.session();
    assert!(session.read_with_context("nope.py").is_err());
}

// ── session outputs ──────────────────────────────────────────────────────────

#[test]
fn test_session_metrics_written_on_shutdown() {
    let p = TempProject::new();
    p.file("util.py", "def helper():\n    \"\"\"Hi.\"\"\"\n    pass\n")
        .file("app.py", "from util import helper\nhelper()\n");
    let session = p.session();
    session.read_with_context("app.py").unwrap();
    session.shutdown().unwrap();

    let text = fs::read_to_string(p.path(".weft/session_metrics.jsonl")).unwrap();
    let record: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert!(record["cache"]["misses"].as_u64().unwrap() >= 1);
    assert!(record["injection_tokens"]["count"].as_u64().unwrap() >= 1);
    assert!(record["graph"]["relationship_count"].as_u64().unwrap() >= 1);
    assert!(record["config"]["cache_size_limit_kb"].as_u64().unwrap() == 50);
}

#[test]
fn test_recent_injections_query() {
    let p = TempProject::new();
    p.file("util.py", "def helper():\n    \"\"\"Hi.\"\"\"\n    pass\n")
        .file("app.py", "from util import helper\nhelper()\n");
    let session = p.session();

    session.read_with_context("app.py").unwrap();
    session.read_with_context("app.py").unwrap();
    let recent = session.get_recent_injections("app.py", 1).unwrap();
    assert_eq!(recent.len(), 1);
    let all = session.get_recent_injections("app.py", 10).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].snippets[0].token_count > 0);
}
