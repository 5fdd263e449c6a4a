//! Bidirectional cross-file relationship graph.
//!
//! The graph owns the canonical relationship list plus two single-hop
//! indices (`dependencies`, `dependents`).  There is deliberately no
//! traversal anywhere: cyclic import graphs are represented as plain
//! index + edge list, and every query is an O(1) lookup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::warn;

/// Above this many relationships the graph emits a one-time size advisory.
/// The memory target is ~500 MB for a 10k-file tree; ordinary projects sit
/// orders of magnitude below this.
const RELATIONSHIP_ADVISORY_THRESHOLD: usize = 1_000_000;

// ── Relationship ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Import,
    FunctionCall,
    Inheritance,
    WildcardImport,
    ConditionalImport,
}

impl RelationshipType {
    /// Import-shaped relationships may reference unparseable targets; the
    /// import statement itself is real even when the target is broken.
    pub fn is_import_shaped(self) -> bool {
        matches!(
            self,
            RelationshipType::Import
                | RelationshipType::WildcardImport
                | RelationshipType::ConditionalImport
        )
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipType::Import => "import",
            RelationshipType::FunctionCall => "function_call",
            RelationshipType::Inheritance => "inheritance",
            RelationshipType::WildcardImport => "wildcard_import",
            RelationshipType::ConditionalImport => "conditional_import",
        };
        write!(f, "{s}")
    }
}

/// One extracted cross-file relationship.  Paths are project-relative with
/// `/` separators; unresolvable targets carry a `<stdlib:…>`,
/// `<third-party:…>`, or `<unresolved:…>` tag instead of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub source_file: String,
    pub target_file: String,
    pub relationship_type: RelationshipType,
    pub line_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_line: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Relationship {
    pub fn new(
        source_file: impl Into<String>,
        target_file: impl Into<String>,
        relationship_type: RelationshipType,
        line_number: usize,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            target_file: target_file.into(),
            relationship_type,
            line_number,
            source_symbol: None,
            target_symbol: None,
            target_line: None,
            metadata: BTreeMap::new(),
        }
    }

    /// True when the target is a `<stdlib:…>` / `<third-party:…>` /
    /// `<unresolved:…>` tag rather than a project file.
    pub fn target_is_external(&self) -> bool {
        self.target_file.starts_with('<')
    }
}

// ── File metadata / definitions ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filepath: String,
    /// Unix seconds of the most recent analysis of this content.
    pub last_analyzed: f64,
    pub relationship_count: usize,
    pub has_dynamic_patterns: bool,
    pub dynamic_pattern_types: Vec<String>,
    pub is_unparseable: bool,
    /// Set when the file disappeared from disk; the record is retained so
    /// dependents can still reference its last-known state.
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefKind {
    Function,
    Class,
}

/// A module-level definition, kept so the injector can locate signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefRecord {
    pub name: String,
    pub line: usize,
    pub kind: DefKind,
}

// ── Graph ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RelationshipGraph {
    relationships: Vec<Relationship>,
    dependencies: HashMap<String, HashSet<String>>,
    dependents: HashMap<String, HashSet<String>>,
    metadata: HashMap<String, FileMetadata>,
    definitions: HashMap<String, Vec<DefRecord>>,
    size_advisory_emitted: bool,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one relationship into the list and both indices.  Returns
    /// `false` (and inserts nothing) when the target is known-unparseable
    /// and the relationship is not the import declaring it.
    pub fn add_relationship(&mut self, r: Relationship) -> bool {
        if !r.relationship_type.is_import_shaped()
            && self
                .metadata
                .get(&r.target_file)
                .is_some_and(|m| m.is_unparseable)
        {
            return false;
        }
        self.dependencies
            .entry(r.source_file.clone())
            .or_default()
            .insert(r.target_file.clone());
        self.dependents
            .entry(r.target_file.clone())
            .or_default()
            .insert(r.source_file.clone());
        self.relationships.push(r);
        if self.relationships.len() > RELATIONSHIP_ADVISORY_THRESHOLD && !self.size_advisory_emitted
        {
            self.size_advisory_emitted = true;
            warn!(
                relationships = self.relationships.len(),
                "relationship graph is unusually large"
            );
        }
        true
    }

    /// Erase every outgoing edge from `file` from the list and both
    /// indices.  Metadata and definitions are dropped only when the file
    /// is gone from disk — and even then the metadata record is retained
    /// with `is_deleted` set.
    pub fn remove_relationships_for(&mut self, file: &str, deleted_on_disk: bool) {
        self.relationships.retain(|r| r.source_file != file);
        if let Some(targets) = self.dependencies.remove(file) {
            for target in targets {
                if let Some(set) = self.dependents.get_mut(&target) {
                    set.remove(file);
                    if set.is_empty() {
                        self.dependents.remove(&target);
                    }
                }
            }
        }
        if deleted_on_disk && let Some(meta) = self.metadata.get_mut(file) {
            meta.is_deleted = true;
        }
    }

    /// Swap in the complete analysis result for one file: outgoing edges
    /// replaced, metadata and definitions updated.  Both index insertions
    /// for each relationship complete before this returns.
    pub fn replace_file_analysis(
        &mut self,
        file: &str,
        relationships: Vec<Relationship>,
        mut metadata: FileMetadata,
        definitions: Vec<DefRecord>,
    ) {
        self.remove_relationships_for(file, false);
        let mut added = 0;
        for r in relationships {
            if self.add_relationship(r) {
                added += 1;
            }
        }
        metadata.relationship_count = added;
        self.metadata.insert(file.to_string(), metadata);
        self.definitions.insert(file.to_string(), definitions);
    }

    pub fn get_dependencies(&self, file: &str) -> HashSet<String> {
        self.dependencies.get(file).cloned().unwrap_or_default()
    }

    pub fn get_dependents(&self, file: &str) -> HashSet<String> {
        self.dependents.get(file).cloned().unwrap_or_default()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationships from `source` to `target`, in extraction order.
    pub fn edges_between<'a>(
        &'a self,
        source: &'a str,
        target: &'a str,
    ) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |r| r.source_file == source && r.target_file == target)
    }

    pub fn file_metadata(&self, file: &str) -> Option<&FileMetadata> {
        self.metadata.get(file)
    }

    pub fn definitions_of(&self, file: &str) -> &[DefRecord] {
        self.definitions.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct files that reference `symbol` in `target_file`.
    pub fn symbol_usage_spread(&self, target_file: &str, symbol: &str) -> usize {
        self.relationships
            .iter()
            .filter(|r| {
                r.target_file == target_file && r.target_symbol.as_deref() == Some(symbol)
            })
            .map(|r| r.source_file.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn file_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn clear(&mut self) {
        self.relationships.clear();
        self.dependencies.clear();
        self.dependents.clear();
        self.metadata.clear();
        self.definitions.clear();
    }

    // ── validation ───────────────────────────────────────────────────────────

    /// Consistency checks run at export time: bidirectional symmetry, no
    /// orphan index entries, no duplicate tuples.  Returns human-readable
    /// violations; empty means consistent.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for r in &self.relationships {
            if !self
                .dependencies
                .get(&r.source_file)
                .is_some_and(|s| s.contains(&r.target_file))
            {
                problems.push(format!(
                    "missing forward index entry {} -> {}",
                    r.source_file, r.target_file
                ));
            }
            if !self
                .dependents
                .get(&r.target_file)
                .is_some_and(|s| s.contains(&r.source_file))
            {
                problems.push(format!(
                    "missing reverse index entry {} <- {}",
                    r.target_file, r.source_file
                ));
            }
        }

        let edge_pairs: HashSet<(&str, &str)> = self
            .relationships
            .iter()
            .map(|r| (r.source_file.as_str(), r.target_file.as_str()))
            .collect();
        for (source, targets) in &self.dependencies {
            for target in targets {
                if !edge_pairs.contains(&(source.as_str(), target.as_str())) {
                    problems.push(format!("orphan index entry {source} -> {target}"));
                }
            }
        }

        let mut seen = HashSet::new();
        for r in &self.relationships {
            if !seen.insert(r) {
                problems.push(format!(
                    "duplicate relationship {} -> {} ({})",
                    r.source_file, r.target_file, r.relationship_type
                ));
            }
        }

        problems
    }

    // ── export ───────────────────────────────────────────────────────────────

    /// Serializable snapshot of the whole graph.  Deterministic: sorted
    /// relationships, ordered maps, no volatile timestamps.
    pub fn export(&self, anonymize_paths: bool) -> GraphExport {
        let rename = |p: &str| -> String {
            if anonymize_paths && !p.starts_with('<') {
                hash_path(p)
            } else {
                p.to_string()
            }
        };

        let mut relationships: Vec<Relationship> = self
            .relationships
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.source_file = rename(&r.source_file);
                r.target_file = rename(&r.target_file);
                r
            })
            .collect();
        relationships.sort();

        let files: BTreeMap<String, FileExportEntry> = self
            .metadata
            .values()
            .map(|m| {
                (
                    rename(&m.filepath),
                    FileExportEntry {
                        relationship_count: m.relationship_count,
                        has_dynamic_patterns: m.has_dynamic_patterns,
                        dynamic_pattern_types: m.dynamic_pattern_types.clone(),
                        is_unparseable: m.is_unparseable,
                        is_deleted: m.is_deleted,
                    },
                )
            })
            .collect();

        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for r in &self.relationships {
            *by_type.entry(r.relationship_type.to_string()).or_default() += 1;
        }

        // Degree = in + out, project files only.
        let mut degree: HashMap<&str, usize> = HashMap::new();
        for r in &self.relationships {
            *degree.entry(r.source_file.as_str()).or_default() += 1;
            if !r.target_is_external() {
                *degree.entry(r.target_file.as_str()).or_default() += 1;
            }
        }
        let mut most_connected: Vec<(String, usize)> = degree
            .into_iter()
            .map(|(p, d)| (rename(p), d))
            .collect();
        most_connected.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        most_connected.truncate(10);

        GraphExport {
            schema_version: 1,
            stats: GraphStats {
                file_count: self.metadata.len(),
                relationship_count: self.relationships.len(),
                relationships_by_type: by_type,
                most_connected,
            },
            files,
            relationships,
        }
    }
}

pub(crate) fn hash_path(path: &str) -> String {
    let mut h = DefaultHasher::new();
    path.hash(&mut h);
    format!("file-{:016x}", h.finish())
}

// ── export document ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub schema_version: u32,
    pub stats: GraphStats,
    pub files: BTreeMap<String, FileExportEntry>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileExportEntry {
    pub relationship_count: usize,
    pub has_dynamic_patterns: bool,
    pub dynamic_pattern_types: Vec<String>,
    pub is_unparseable: bool,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub file_count: usize,
    pub relationship_count: usize,
    pub relationships_by_type: BTreeMap<String, usize>,
    pub most_connected: Vec<(String, usize)>,
}

// ── tests ────────────────────────────────────────────────────────────────────
