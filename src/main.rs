use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codecompass::config::{Config, DEFAULT_CONFIG_FILE};
use codecompass::db::{self, Direction, EdgeList, LoadStrategy};
use codecompass::error::NavError;
use codecompass::indexer::{self, CodeParser, StructuralExtractor};
use codecompass::mcp::server::{McpContext, McpServer};
use codecompass::navigator::Navigator;
use codecompass::render;
use codecompass::search::{self, Bm25Params, ChunkIndex};

#[derive(Parser)]
#[command(name = "codecompass", version, about = "Structural navigation for Python codebases")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract IMPORTS / INHERITS / INSTANTIATES edges from a source tree
    Extract {
        repo: PathBuf,
        /// Edge list output (defaults to `edges_path` from config)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Bulk-load an edge list into the graph store
    Load {
        #[arg(long, short)]
        edges: Option<PathBuf>,
        /// Remove every node and relationship first
        #[arg(long)]
        clear: bool,
        /// Skip the generic merge and load one relation type at a time
        #[arg(long)]
        per_relation: bool,
    },
    /// Chunk a source tree and publish the BM25 chunk index
    Index {
        repo: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Run a test query against the freshly built index
        #[arg(long, short)]
        query: Option<String>,
    },
    /// Convert a legacy chunk list into the versioned index format
    MigrateIndex {
        legacy: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Files structurally connected to FILE
    Neighbors {
        file: String,
        #[arg(long, short, default_value = "both")]
        direction: Direction,
        #[arg(long)]
        json: bool,
    },
    /// Rank files for a keyword query
    Search {
        query: String,
        #[arg(long, short = 'n')]
        top: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// File and per-relation edge counts
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Serve the navigation tools over MCP stdio
    Serve,
    /// Write the effective configuration to the config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// 0 = success, 1 = nothing found, 2 = error.
enum Outcome {
    Found,
    Empty,
}

fn main() -> ExitCode {
    // stdout carries results (and the MCP protocol), logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(Outcome::Found) => ExitCode::SUCCESS,
        Ok(Outcome::Empty) => ExitCode::from(1),
        Err(e) => {
            match e.downcast_ref::<NavError>() {
                // already carries its remediation
                Some(nav) if nav.is_boundary() => eprintln!("{nav}"),
                _ => eprintln!("Error: {e:#}"),
            }
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Commands::Extract { repo, output } => {
            let output = output.unwrap_or_else(|| config.edges_path.clone());
            extract(&repo, &output)
        }
        Commands::Load {
            edges,
            clear,
            per_relation,
        } => {
            let edges = edges.unwrap_or_else(|| config.edges_path.clone());
            load(&config, &edges, clear, per_relation)
        }
        Commands::Index { repo, output, query } => {
            let output = output.unwrap_or_else(|| config.index.path.clone());
            index(&config, &repo, &output, query.as_deref())
        }
        Commands::MigrateIndex { legacy, output } => {
            let output = output.unwrap_or_else(|| config.index.path.clone());
            let params = Bm25Params {
                k1: config.index.k1,
                b: config.index.b,
            };
            let index = search::migrate_legacy(&legacy, &output, params)?;
            println!(
                "Migrated {} chunks ({} files) to {}",
                index.len(),
                index.file_count(),
                output.display()
            );
            Ok(Outcome::Found)
        }
        Commands::Neighbors { file, direction, json } => {
            let nav = Navigator::from_config(&config);
            let rows = nav.neighbors(&file, direction)?;
            nav.close()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if !rows.is_empty() {
                println!("{}", render::render_neighbors(&file, &rows));
            }
            if rows.is_empty() {
                eprintln!("{}", render::no_neighbors_message(&file));
                return Ok(Outcome::Empty);
            }
            Ok(Outcome::Found)
        }
        Commands::Search { query, top, json } => {
            let nav = Navigator::from_config(&config);
            let hits = nav.search(&query, top.unwrap_or(config.search_top_k))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if !hits.is_empty() {
                println!("{}", render::render_search(&query, &hits));
            }
            if hits.is_empty() {
                eprintln!("{}", render::no_results_message(&query));
                return Ok(Outcome::Empty);
            }
            Ok(Outcome::Found)
        }
        Commands::Stats { json } => {
            let nav = Navigator::from_config(&config);
            let stats = nav.stats()?;
            nav.close()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", render::render_stats(&stats));
            }
            Ok(Outcome::Found)
        }
        Commands::Init { force } => {
            anyhow::ensure!(
                force || !Path::new(&cli.config).exists(),
                "{} already exists (use --force to overwrite)",
                cli.config
            );
            // credentials stay in the environment
            let mut written = config.clone();
            written.graph.password = None;
            written.save(&cli.config)?;
            println!("Wrote {}", cli.config);
            Ok(Outcome::Found)
        }
        Commands::Serve => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(McpServer::new(McpContext::new(config)).start())?;
            Ok(Outcome::Found)
        }
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} files ({eta})")
            .expect("valid template")
            .progress_chars("█▓░"),
    );
    pb
}

fn extract(repo: &Path, output: &Path) -> Result<Outcome> {
    let extractor = StructuralExtractor::default();
    let files = indexer::scan_source_files(repo, extractor.language());
    let pb = progress_bar(files.len());
    let outcome = indexer::extract_files(repo, &files, &extractor, &|_path: &str| pb.inc(1))?;
    pb.finish_and_clear();

    outcome.edges.write_json(output)?;

    println!(
        "Parsed {} of {} files ({} skipped)",
        outcome.summary.parsed, outcome.summary.files, outcome.summary.skipped
    );
    println!("Extracted {} edges -> {}", outcome.edges.len(), output.display());
    for (relation, count) in outcome.edges.relation_counts() {
        println!("  {:<15} {count:>4}", relation.as_str());
    }
    Ok(Outcome::Found)
}

fn load(config: &Config, edges_path: &Path, clear: bool, per_relation: bool) -> Result<Outcome> {
    let edges = EdgeList::read_json(edges_path)?;
    let mut store = db::open_store(&config.graph)?;
    if clear {
        info!("Clearing {} graph", store.backend_name());
        store.clear()?;
    }

    let summary = if per_relation {
        store.load_edges(edges.edges(), LoadStrategy::PerRelation)?
    } else {
        db::load_with_fallback(store.as_mut(), edges.edges())?
    };
    info!("Submitted {} edges ({:?} load)", summary.submitted, summary.strategy);

    let stats = store.stats()?;
    store.close()?;
    println!(
        "Loaded {} edges: graph now has {} files and {} relationships",
        summary.submitted,
        stats.files,
        stats.total_edges()
    );
    Ok(Outcome::Found)
}

fn index(config: &Config, repo: &Path, output: &Path, query: Option<&str>) -> Result<Outcome> {
    let parser = CodeParser::new(
        indexer::languages::python_config(),
        config.index.module_prefix_chars,
    )?;
    let files = indexer::scan_source_files(repo, parser.language());
    let pb = progress_bar(files.len());
    let outcome = indexer::chunk_files(repo, &files, &parser, &|_path: &str| pb.inc(1))?;
    pb.finish_and_clear();

    let params = Bm25Params {
        k1: config.index.k1,
        b: config.index.b,
    };
    let index = ChunkIndex::build(repo, outcome.chunks, params);
    index.save(output)?;
    println!(
        "Indexed {} chunks from {} files -> {} ({} skipped)",
        index.len(),
        index.file_count(),
        output.display(),
        outcome.summary.skipped
    );

    if let Some(query) = query {
        let hits = index.search(query, config.search_top_k);
        if hits.is_empty() {
            eprintln!("{}", render::no_results_message(query));
            return Ok(Outcome::Empty);
        }
        println!("{}", render::render_search(query, &hits));
    }
    Ok(Outcome::Found)
}
