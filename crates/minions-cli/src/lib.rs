//! Command-line interface for the minions codebase index.

pub mod cli;
pub mod client;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use minions_config::Config;
use minions_index::{CodebaseIndexer, EmbeddingProvider, FileStatus, IndexReport, SearchResult};
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cli::{Cli, Commands};

/// Parse arguments, set up logging and run the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli).await
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "minions=debug,minions_index=debug,minions_cli=debug"
    } else {
        "minions=info,minions_index=info,minions_cli=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run a parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    let workspace = cli
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace {} is not accessible", cli.workspace.display()))?;
    let config = Config::load(cli.config.as_deref(), &workspace)?;

    if cli.command == Commands::Config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let indexer = client::build_indexer(&config, &workspace).await?;
    let mut out = std::io::stdout();

    match cli.command {
        Commands::Index => {
            let report = indexer.index().await?;
            print_report(&mut out, &report)?;
            if !report.is_success() {
                anyhow::bail!("{} file(s) failed to index", report.failures().count());
            }
        }
        Commands::Search { query, top_k, json } => {
            let results = indexer.search(&query, top_k).await?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&results)?)?;
            } else {
                print_results(&mut out, &results)?;
            }
        }
        Commands::Update { path } => {
            let status = indexer.update(&path).await?;
            writeln!(out, "{}: {}", path.display(), describe(status))?;
        }
        Commands::Remove { path } => {
            if indexer.remove(&path).await? {
                writeln!(out, "Removed {}", path.display())?;
            } else {
                writeln!(out, "{} was not indexed", path.display())?;
            }
        }
        Commands::Clear => {
            let deleted = indexer.clear_index().await?;
            writeln!(out, "Deleted {} index records", deleted)?;
        }
        Commands::Stats { json } => {
            let stats = indexer.get_stats().await?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
            } else {
                writeln!(out, "Workspace:     {}", stats.workspace_path.display())?;
                writeln!(out, "Indexed files: {}", stats.indexed_files)?;
                writeln!(out, "Total chunks:  {}", stats.total_chunks)?;
            }
        }
        Commands::Files => {
            for path in indexer.get_indexed_files().await? {
                writeln!(out, "{}", path)?;
            }
        }
        Commands::Show { path } => show(&mut out, &indexer, &path).await?,
        Commands::Config => {}
    }

    Ok(())
}

async fn show(
    out: &mut impl Write,
    indexer: &CodebaseIndexer<dyn EmbeddingProvider>,
    path: &str,
) -> Result<()> {
    match indexer.get_file_content(path).await {
        Some(content) => write!(out, "{}", content)?,
        None => anyhow::bail!(
            "Cannot read {} in {}",
            path,
            indexer.workspace_path().display()
        ),
    }
    Ok(())
}

fn describe(status: FileStatus) -> String {
    match status {
        FileStatus::Indexed { chunks } => format!("indexed ({} chunks)", chunks),
        FileStatus::Unchanged => "unchanged".to_string(),
        FileStatus::Empty => "empty, nothing to index".to_string(),
        FileStatus::Removed => "removed from index".to_string(),
    }
}

fn print_report(out: &mut impl Write, report: &IndexReport) -> Result<()> {
    for failure in report.failures() {
        if let Err(e) = &failure.result {
            warn!("{}: {}", failure.path, e);
            writeln!(out, "FAILED  {}: {}", failure.path, e)?;
        }
    }
    for path in &report.pruned {
        writeln!(out, "pruned  {}", path)?;
    }
    writeln!(
        out,
        "{} files: {} indexed, {} unchanged, {} failed, {} pruned ({} ms)",
        report.outcomes.len(),
        report.indexed_count(),
        report.unchanged_count(),
        report.failures().count(),
        report.pruned.len(),
        report.duration_ms
    )?;
    Ok(())
}

fn print_results(out: &mut impl Write, results: &[SearchResult]) -> Result<()> {
    if results.is_empty() {
        writeln!(out, "No results")?;
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        writeln!(
            out,
            "{}. {}:{}-{} (score {:.3})",
            rank + 1,
            result.file_path,
            result.line_start,
            result.line_end,
            result.score
        )?;
        for line in result.content.lines() {
            writeln!(out, "    {}", line)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
