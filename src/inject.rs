//! Context injection: augmenting a file read with signatures drawn from
//! the files it depends on.
//!
//! The pipeline ranks the trigger file's direct dependencies, pulls each
//! one through the cache (which refreshes it if stale), extracts the
//! signature and short docstring of every referenced symbol, and assembles
//! the fixed-format `[Cross-File Context]` section.  Failures after the
//! primary read degrade to the raw content — a broken snippet pipeline
//! must never break the read itself.

use crate::cache::{CacheEnv, WorkingMemory};
use crate::config::Config;
use crate::graph::{DefKind, RelationshipGraph, RelationshipType};
use crate::logs::{rfc3339_now, unix_now};
use crate::warn::Warning;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Docstring first lines longer than this are left out of snippets.
const DOCSTRING_SUMMARY_LIMIT: usize = 50;

// ── Event records ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetRecord {
    pub source_file: String,
    pub line_start: usize,
    pub line_end: usize,
    pub text: String,
    pub relationship_type: String,
    pub cache_age_seconds: f64,
    pub token_count: u64,
}

/// One grouped record per injection, appended to `injection_log.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionEvent {
    pub timestamp: String,
    pub trigger_file: String,
    pub snippets: Vec<SnippetRecord>,
    pub total_token_count: u64,
    pub cache_hit: bool,
}

/// What `read_with_context` hands back to the session.
pub struct ReadOutcome {
    pub content: String,
    pub snippet_section: Option<String>,
    pub warnings: Vec<Warning>,
    pub event: Option<InjectionEvent>,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub fn read_with_context(
    cache: &mut WorkingMemory,
    graph: &mut RelationshipGraph,
    env: &CacheEnv<'_>,
    config: &Config,
    rel_path: &str,
) -> Result<ReadOutcome> {
    // 1. Primary read; refreshes the graph for this file.
    let primary = cache.get(graph, env, rel_path, None)?;
    let mut warnings = primary.warnings;
    let cache_hit = !primary.refreshed;

    if !config.enable_context_injection {
        return Ok(ReadOutcome {
            content: primary.content,
            snippet_section: None,
            warnings,
            event: None,
        });
    }

    // 2–8. Anything failing past the primary read degrades to raw content.
    match build_section(cache, graph, env, config, rel_path, cache_hit, &mut warnings) {
        Ok((section, event)) => Ok(ReadOutcome {
            content: primary.content,
            snippet_section: section,
            warnings,
            event,
        }),
        Err(err) => {
            debug!(file = rel_path, error = %err, "context injection failed; returning raw content");
            Ok(ReadOutcome {
                content: primary.content,
                snippet_section: None,
                warnings,
                event: None,
            })
        }
    }
}

fn build_section(
    cache: &mut WorkingMemory,
    graph: &mut RelationshipGraph,
    env: &CacheEnv<'_>,
    config: &Config,
    rel_path: &str,
    cache_hit: bool,
    warnings: &mut Vec<Warning>,
) -> Result<(Option<String>, Option<InjectionEvent>)> {
    let ranked = rank_dependencies(graph, cache, env, config, rel_path);
    if ranked.is_empty() {
        return Ok((None, None));
    }

    let mut blocks: Vec<String> = Vec::new();
    let mut records: Vec<SnippetRecord> = Vec::new();

    for dep in &ranked {
        let meta_deleted = graph
            .file_metadata(&dep.path)
            .is_some_and(|m| m.is_deleted);
        let meta_unparseable = graph
            .file_metadata(&dep.path)
            .is_some_and(|m| m.is_unparseable);

        if meta_deleted {
            let when = env
                .events
                .last_event(&dep.path)
                .map(format_unix_time)
                .unwrap_or_else(|| "an earlier session".to_string());
            blocks.push(format!("# Note: imported file {} deleted on {when}", dep.path));
            continue;
        }
        if dep.wildcard_only {
            blocks.push(format!(
                "# Note: {} is wildcard-imported; function-level tracking unavailable",
                dep.path
            ));
            continue;
        }
        if meta_unparseable {
            blocks.push(format!(
                "# Note: {} could not be parsed; no signatures available",
                dep.path
            ));
            continue;
        }

        // Pull the dependency through the cache; it may refresh here.
        let dep_content = match cache.get(graph, env, &dep.path, None) {
            Ok(out) => {
                warnings.extend(out.warnings);
                out.content
            }
            Err(_) => {
                blocks.push(format!("# Note: {} is currently unreadable", dep.path));
                continue;
            }
        };
        let cache_age = cache
            .last_read(&dep.path)
            .map(|t| (unix_now() - t).max(0.0))
            .unwrap_or(0.0);

        for symbol in &dep.symbols {
            let Some(def) = graph
                .definitions_of(&dep.path)
                .iter()
                .find(|d| &d.name == symbol)
            else {
                continue;
            };
            let extracted = extract_signature(&dep_content, def.line, def.kind);
            let text = match extracted {
                Some(text) => text,
                None => continue,
            };
            let body_end = find_body_end(&dep_content, def.line);
            let token_count = estimate_tokens(&text);
            let block = format!(
                "From {path}:{line}\n{text}\n# Implementation in {path}:{line}-{body_end}\n(Cached {age} ago)",
                path = dep.path,
                line = def.line,
                age = format_age(cache_age),
            );
            blocks.push(block);
            records.push(SnippetRecord {
                source_file: dep.path.clone(),
                line_start: def.line,
                line_end: body_end,
                text,
                relationship_type: dep.best_type.to_string(),
                cache_age_seconds: cache_age,
                token_count,
            });
        }
    }

    if blocks.is_empty() {
        return Ok((None, None));
    }

    // Optional limit: drop lowest-priority snippet records past the cap.
    // Note blocks carry no tokens and are never dropped.
    if let Some(limit) = config.context_token_limit {
        let mut total: u64 = records.iter().map(|r| r.token_count).sum();
        while total > limit as u64 && records.len() > 1 {
            let dropped = records.pop().expect("len checked above");
            blocks.retain(|b| !b.contains(&format!("From {}:{}", dropped.source_file, dropped.line_start)));
            total -= dropped.token_count;
        }
    }

    let total_token_count: u64 = records.iter().map(|r| r.token_count).sum();
    let section = format!(
        "[Cross-File Context]\nDependencies: {} file(s) referenced by {}\n\n{}\n",
        ranked.len(),
        rel_path,
        blocks.join("\n\n"),
    );

    let event = InjectionEvent {
        timestamp: rfc3339_now(),
        trigger_file: rel_path.to_string(),
        snippets: records,
        total_token_count,
        cache_hit,
    };
    Ok((Some(section), Some(event)))
}

/// Compose the tool-surface content: section, `---` separator, original.
pub fn compose(content: &str, snippet_section: Option<&str>) -> String {
    match snippet_section {
        Some(section) => format!("{section}\n---\n{content}"),
        None => content.to_string(),
    }
}

// ── Ranking ───────────────────────────────────────────────────────────────────

struct RankedDep {
    path: String,
    symbols: Vec<String>,
    best_type: RelationshipType,
    wildcard_only: bool,
}

/// Order the direct dependency set, highest priority first: recently
/// touched (10 minutes), then symbols referenced from at least the
/// configured number of files, then import > function_call > inheritance,
/// then path order for determinism.
fn rank_dependencies(
    graph: &RelationshipGraph,
    cache: &WorkingMemory,
    env: &CacheEnv<'_>,
    config: &Config,
    rel_path: &str,
) -> Vec<RankedDep> {
    let now = unix_now();
    let mut deps: Vec<RankedDep> = graph
        .get_dependencies(rel_path)
        .into_iter()
        .filter(|d| !d.starts_with('<'))
        .map(|path| {
            let mut symbols: BTreeSet<String> = BTreeSet::new();
            let mut best = None::<RelationshipType>;
            let mut non_wildcard = false;
            for r in graph.edges_between(rel_path, &path) {
                if r.relationship_type != RelationshipType::WildcardImport {
                    non_wildcard = true;
                }
                if let Some(sym) = &r.target_symbol {
                    symbols.insert(sym.clone());
                }
                let rank = type_rank(r.relationship_type);
                if best.map(type_rank).unwrap_or(u8::MAX) > rank {
                    best = Some(r.relationship_type);
                }
            }
            RankedDep {
                symbols: symbols.into_iter().collect(),
                best_type: best.unwrap_or(RelationshipType::Import),
                wildcard_only: !non_wildcard,
                path,
            }
        })
        .collect();

    deps.sort_by_key(|dep| {
        let touched = cache
            .last_read(&dep.path)
            .into_iter()
            .chain(env.events.last_event(&dep.path))
            .fold(f64::NEG_INFINITY, f64::max);
        let recent = now - touched <= 600.0;
        let widely_used = dep.symbols.iter().any(|s| {
            graph.symbol_usage_spread(&dep.path, s) >= config.function_usage_warning_threshold
        });
        (
            !recent,
            !widely_used,
            type_rank(dep.best_type),
            dep.path.clone(),
        )
    });
    deps
}

fn type_rank(t: RelationshipType) -> u8 {
    match t {
        RelationshipType::Import
        | RelationshipType::WildcardImport
        | RelationshipType::ConditionalImport => 0,
        RelationshipType::FunctionCall => 1,
        RelationshipType::Inheritance => 2,
    }
}

// ── Signature extraction ──────────────────────────────────────────────────────

/// Declaration line(s) plus the immediately following docstring when its
/// summary is short.  Bodies are never included, however small.
fn extract_signature(content: &str, def_line: usize, kind: DefKind) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let start = def_line.checked_sub(1)?;
    let first = lines.get(start)?;
    let mut sig_lines: Vec<&str> = vec![first];

    if kind == DefKind::Function {
        // Multi-line signatures: accumulate until the brackets balance and
        // the line ends in a colon.
        let mut depth = bracket_delta(first);
        let mut i = start + 1;
        while (depth > 0 || !sig_lines.last().is_some_and(|l| ends_with_colon(l)))
            && i < lines.len()
            && sig_lines.len() < 12
        {
            depth += bracket_delta(lines[i]);
            sig_lines.push(lines[i]);
            i += 1;
        }
    }

    let mut out: Vec<String> = sig_lines.iter().map(|l| l.to_string()).collect();

    // Docstring summary, when present and short.
    let after = start + out.len();
    if let Some(doc_line) = lines.get(after) {
        let trimmed = doc_line.trim();
        if trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''") || trimmed.starts_with("r\"\"\"")
        {
            let summary = trimmed
                .trim_start_matches('r')
                .trim_matches(['"', '\''])
                .trim();
            if !summary.is_empty() && summary.len() < DOCSTRING_SUMMARY_LIMIT {
                out.push((*doc_line).to_string());
            }
        }
    }

    Some(out.join("\n"))
}

/// Does the line end with the suite colon, ignoring a trailing comment?
/// Good enough for signature lines, where `#` cannot appear in a string.
fn ends_with_colon(line: &str) -> bool {
    let code = line.split('#').next().unwrap_or(line);
    code.trim_end().ends_with(':')
}

fn bracket_delta(line: &str) -> i32 {
    let mut delta = 0;
    for c in line.chars() {
        match c {
            '(' | '[' | '{' => delta += 1,
            ')' | ']' | '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Last line of the definition's body: everything indented deeper than
/// the `def`/`class` line, stopping at the next top-level statement.
fn find_body_end(content: &str, def_line: usize) -> usize {
    let lines: Vec<&str> = content.lines().collect();
    let Some(first) = lines.get(def_line.saturating_sub(1)) else {
        return def_line;
    };
    let def_indent = indent_of(first);
    let mut last = def_line;
    for (idx, line) in lines.iter().enumerate().skip(def_line) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= def_indent {
            break;
        }
        last = idx + 1;
    }
    last
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

// ── Token estimation ──────────────────────────────────────────────────────────

/// Deterministic token estimate: one token per short identifier/number
/// run (long runs count one per four characters, as subword tokenizers
/// do), one per punctuation character, whitespace free.
pub fn estimate_tokens(text: &str) -> u64 {
    let mut tokens: u64 = 0;
    let mut run_len: usize = 0;
    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            run_len += 1;
        } else {
            if run_len > 0 {
                tokens += run_tokens(run_len);
                run_len = 0;
            }
            if !c.is_whitespace() {
                tokens += 1;
            }
        }
    }
    if run_len > 0 {
        tokens += run_tokens(run_len);
    }
    tokens
}

fn run_tokens(len: usize) -> u64 {
    if len <= 8 { 1 } else { len.div_ceil(4) as u64 }
}

fn format_age(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor() as u64;
    if minutes == 0 {
        "moments".to_string()
    } else if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{minutes} minutes")
    }
}

fn format_unix_time(t: f64) -> String {
    chrono::DateTime::from_timestamp(t as i64, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| format!("{t:.0}"))
}

// ── tests ────────────────────────────────────────────────────────────────────
