use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process;
use weft::{Config, Session};

#[derive(Parser)]
#[command(
    name = "weft",
    about = "Cross-file context for Python source trees",
    version,
    long_about = "Weft indexes a Python project into a cross-file relationship graph and \
                  serves file reads augmented with signatures from their dependencies.\n\n\
                  One-shot driver: index the tree, then optionally read a file with \
                  context, export the graph, or print cache statistics."
)]
struct Cli {
    /// Project root to index.
    root: PathBuf,

    /// Read this file (project-relative) with cross-file context injected.
    #[arg(long)]
    read: Option<String>,

    /// Print the relationship graph export.
    #[arg(long)]
    export_graph: bool,

    /// Print cache statistics after the run.
    #[arg(long)]
    stats: bool,

    /// Emit JSON instead of the default text format.
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let session = match Session::start(&cli.root, Config::default()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {e:#}", "error".red().bold());
            process::exit(2);
        }
    };

    // ── read with context ─────────────────────────────────────────────────────
    if let Some(path) = &cli.read {
        match session.read_with_context(path) {
            Ok(resp) => {
                if cli.json {
                    print_json(&resp);
                } else {
                    println!("{}", resp.content);
                    for w in &resp.warnings {
                        eprintln!(
                            "{} {}:{} {} — {}",
                            "warning".yellow().bold(),
                            w.filepath,
                            w.line_number,
                            w.warning_type,
                            w.message
                        );
                    }
                }
            }
            Err(e) => {
                if cli.json {
                    println!(
                        "{}",
                        serde_json::json!({ "error": format!("{e:#}") })
                    );
                } else {
                    eprintln!("{}: {e:#}", "error".red().bold());
                }
                let _ = session.shutdown();
                process::exit(1);
            }
        }
    }

    // ── graph export ──────────────────────────────────────────────────────────
    if cli.export_graph {
        match session.get_relationship_graph() {
            Ok(export) => {
                if cli.json {
                    print_json(&export);
                } else {
                    println!(
                        "{} files, {} relationships",
                        export.stats.file_count.to_string().bold(),
                        export.stats.relationship_count.to_string().bold()
                    );
                    for (kind, count) in &export.stats.relationships_by_type {
                        println!("  {kind}: {count}");
                    }
                    if !export.stats.most_connected.is_empty() {
                        println!("most connected:");
                        for (path, degree) in &export.stats.most_connected {
                            println!("  {path} ({degree})");
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("{}: {e:#}", "error".red().bold());
                let _ = session.shutdown();
                process::exit(1);
            }
        }
    }

    // ── cache stats ───────────────────────────────────────────────────────────
    if cli.stats {
        let stats = session.get_cache_statistics();
        if cli.json {
            print_json(&stats);
        } else {
            println!(
                "cache: {} hits, {} misses, {} evictions, {} refreshes, {} bytes peak",
                stats.hits, stats.misses, stats.evictions, stats.staleness_refreshes,
                stats.peak_bytes
            );
        }
    }

    if let Err(e) = session.shutdown() {
        eprintln!("{}: {e:#}", "error".red().bold());
        process::exit(2);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("tool responses are always serializable")
    );
}
