//! Weft: live cross-file relationship graph and context injection for
//! Python source trees.
//!
//! A [`session::Session`] watches a project, maintains a bidirectional
//! dependency graph extracted by static analysis, keeps a working-memory
//! cache of file excerpts, and serves reads augmented with signatures
//! from the files the read file depends on.  The session methods are the
//! tool surface a host protocol adapter (e.g. an LLM coding assistant)
//! calls.

pub mod analyzer;
pub mod ast;
pub mod cache;
pub mod config;
pub mod detect;
pub mod discovery;
pub mod graph;
pub mod inject;
pub mod location;
pub mod logs;
pub mod metrics;
pub mod pyparse;
pub mod resolve;
pub mod session;
pub mod warn;
pub mod watch;

pub use config::Config;
pub use graph::{Relationship, RelationshipType};
pub use session::{Session, ToolReadResponse};
