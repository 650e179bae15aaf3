//! CLI entrypoint: wires the library modules together behind a single
//! `search` subcommand. Argument parsing is deliberately thin — a rich
//! interactive printer is a separate concern this crate doesn't take on.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use codesearch::config::Settings;
use codesearch::embeddings::{EmbeddingClient, EmbeddingProvider, EmbeddingScheduler};
use codesearch::error::Result;
use codesearch::ignore_oracle::IgnoreOracle;
use codesearch::indexer::Indexer;
use codesearch::models::RepoPaths;
use codesearch::repo::find_root_git_repository;
use codesearch::search::{SearchCache, SearchEngine, SearchOptions};
use codesearch::stats::{Stats, Timer};
use codesearch::storage::Storage;
use codesearch::tokenizer::create_tokenizer;
use codesearch::vector_index::VectorIndex;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Parser)]
#[command(name = "codesearch", about = "Local, per-repository code search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the repository (if needed) and run a hybrid search.
    Search {
        /// Query text: quoted phrases and bareword keywords.
        query: Option<String>,

        #[arg(long, default_value = ".")]
        directory: PathBuf,

        #[arg(long, default_value_t = 10)]
        top_k: usize,

        #[arg(long, default_value_t = true, overrides_with = "no_semantic")]
        semantic: bool,
        #[arg(long, default_value_t = false, overrides_with = "semantic")]
        no_semantic: bool,

        #[arg(long = "full-text", default_value_t = true, overrides_with = "no_full_text")]
        full_text: bool,
        #[arg(long = "no-full-text", default_value_t = false, overrides_with = "full_text")]
        no_full_text: bool,

        /// Reload every object's stored embedding into the vector index
        /// even for files whose content hasn't changed since last run.
        #[arg(long)]
        rebuild_faiss_index: bool,

        /// Don't call the remote embedding provider for the query text.
        #[arg(long)]
        cached_only: bool,

        /// Skip this invocation's own indexing pass; trust a separately
        /// running background indexer to keep the store current.
        #[arg(long, default_value_t = false, overrides_with = "no_background")]
        background: bool,
        #[arg(long, default_value_t = true, overrides_with = "background")]
        no_background: bool,

        #[arg(long)]
        stats: bool,
    },
    /// Print shell completions for this CLI.
    Completions { shell: Shell },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Search {
            query,
            directory,
            top_k,
            semantic,
            no_semantic,
            full_text,
            no_full_text,
            rebuild_faiss_index,
            cached_only,
            background,
            no_background,
            stats,
        } => cmd_search(
            query.unwrap_or_default(),
            &directory,
            top_k,
            semantic && !no_semantic,
            full_text && !no_full_text,
            rebuild_faiss_index,
            cached_only,
            !(background && !no_background),
            stats,
        ),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "codesearch", &mut std::io::stdout());
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_search(
    query: String,
    directory: &PathBuf,
    top_k: usize,
    semantic: bool,
    full_text: bool,
    rebuild_faiss_index: bool,
    cached_only: bool,
    run_own_index_pass: bool,
    print_stats: bool,
) -> Result<()> {
    let root = find_root_git_repository(directory)?;
    let paths = RepoPaths { root };
    std::fs::create_dir_all(paths.private_dir())?;

    let settings = Settings::load_or_default(None);
    let mut storage = Storage::open(&paths.db_path())?;
    let ignore = IgnoreOracle::build(&paths);
    let vector_index = Mutex::new(VectorIndex::load_or_new(&paths.index_path(), settings.embeddings.dimensions));
    let search_cache = SearchCache::new();
    let stats_collector = Stats::new();

    let provider: Arc<dyn EmbeddingClient> = Arc::new(EmbeddingProvider::new(settings.embeddings.clone()));
    let tokenizer = create_tokenizer("tiktoken");
    let mut scheduler = EmbeddingScheduler::new(
        provider.clone(),
        tokenizer,
        settings.indexing.batch_size_limit,
        settings.indexing.batch_token_limit,
        settings.indexing.per_request_token_cap,
    );

    if run_own_index_pass {
        let _timer = Timer::new(|d| stats_collector.record_index_duration(d));
        let indexer = Indexer { paths: paths.clone(), ignore: &ignore, vector_index: &vector_index, search_cache: &search_cache };
        indexer.run(&mut storage, &mut scheduler, &[paths.root.clone()], true, rebuild_faiss_index, &stats_collector)?;
    }

    let engine = SearchEngine {
        paths: &paths,
        vector_index: &vector_index,
        provider: provider.as_ref(),
        cache: &search_cache,
        stats: &stats_collector,
    };
    let opts = SearchOptions { top_k, semantic, full_text, cached_only };

    let results = {
        let _timer = Timer::new(|d| stats_collector.record_search_duration(d));
        engine.search(&storage.conn, &query, &opts)?
    };

    for result in &results {
        println!(
            "{:.4}  {} [{}] {}:{}-{}",
            result.score,
            result.object.name,
            result.object.kind.as_str(),
            result.object.path,
            result.object.start_row() + 1,
            result.object.end_row() + 1,
        );
    }

    if print_stats {
        let snapshot = stats_collector.snapshot();
        eprintln!(
            "files indexed: {}  skipped: {}  deleted: {}  objects inserted: {}",
            snapshot.files_indexed, snapshot.files_skipped, snapshot.files_deleted, snapshot.objects_inserted
        );
        eprintln!(
            "embedding requests: {}  batches: {}  cache hits: {}  misses: {}",
            snapshot.embedding_requests, snapshot.embedding_batches, snapshot.cache_hits, snapshot.cache_misses
        );
        eprintln!(
            "index: {:?}  search: {:?}  results: {}",
            snapshot.index_duration,
            snapshot.search_duration,
            results.len()
        );
    }

    Ok(())
}
