//! End-to-end indexing scenarios (run against a real temp repository, a real
//! SQLite file, and the deterministic `FakeEmbeddingClient` so no network
//! call is required).

use codesearch::embeddings::testing::FakeEmbeddingClient;
use codesearch::embeddings::{EmbeddingClient, EmbeddingScheduler};
use codesearch::ignore_oracle::IgnoreOracle;
use codesearch::indexer::Indexer;
use codesearch::models::RepoPaths;
use codesearch::search::{SearchCache, SearchOptions};
use codesearch::stats::Stats;
use codesearch::storage::Storage;
use codesearch::tokenizer::BytesEstimateTokenizer;
use codesearch::vector_index::VectorIndex;
use std::fs;
use std::sync::{Arc, Mutex};

const DIM: usize = 8;

struct Fixture {
    _tmp: tempfile::TempDir,
    paths: RepoPaths,
    storage: Storage,
    ignore: IgnoreOracle,
    vector_index: Mutex<VectorIndex>,
    search_cache: SearchCache,
    scheduler: EmbeddingScheduler,
    provider: Arc<dyn EmbeddingClient>,
    fake: Arc<FakeEmbeddingClient>,
    stats: Stats,
}

fn setup() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join(".git")).unwrap();
    let paths = RepoPaths { root: tmp.path().to_path_buf() };
    fs::create_dir_all(paths.private_dir()).unwrap();

    let storage = Storage::open(&paths.db_path()).unwrap();
    let ignore = IgnoreOracle::build(&paths);
    let vector_index = Mutex::new(VectorIndex::new(DIM));
    let search_cache = SearchCache::new();
    let fake = Arc::new(FakeEmbeddingClient::new(DIM));
    let provider: Arc<dyn EmbeddingClient> = fake.clone();
    let scheduler = EmbeddingScheduler::new(provider.clone(), Arc::new(BytesEstimateTokenizer), 2048, 400_000, 8192);

    Fixture { _tmp: tmp, paths, storage, ignore, vector_index, search_cache, scheduler, provider, fake, stats: Stats::new() }
}

impl Fixture {
    fn run_index(&mut self) -> codesearch::indexer::IndexStats {
        let indexer = Indexer {
            paths: self.paths.clone(),
            ignore: &self.ignore,
            vector_index: &self.vector_index,
            search_cache: &self.search_cache,
        };
        indexer
            .run(&mut self.storage, &mut self.scheduler, &[self.paths.root.clone()], true, false, &self.stats)
            .unwrap()
    }
}

#[test]
fn indexes_a_hello_world_repository() {
    let mut fx = setup();
    fs::write(fx.paths.root.join("main.rs"), "fn main() {\n    println!(\"hello\");\n}\n").unwrap();

    let stats = fx.run_index();
    assert_eq!(stats.files_indexed, 1);
    assert!(stats.objects_inserted >= 2); // whole-file object + fn main

    assert_eq!(fx.vector_index.lock().unwrap().len(), stats.objects_inserted);
}

#[test]
fn deleting_a_file_between_runs_removes_its_objects() {
    let mut fx = setup();
    let file_path = fx.paths.root.join("a.rs");
    fs::write(&file_path, "fn a() {}\n").unwrap();
    fx.run_index();
    assert!(fx.vector_index.lock().unwrap().len() > 0);

    fs::remove_file(&file_path).unwrap();
    let stats = fx.run_index();
    assert_eq!(stats.files_deleted, 1);
    assert_eq!(fx.vector_index.lock().unwrap().len(), 0);
}

#[test]
fn gitignored_files_are_never_indexed() {
    let mut fx = setup();
    fs::write(fx.paths.root.join(".gitignore"), "ignored.rs\n").unwrap();
    fx.ignore = IgnoreOracle::build(&fx.paths);
    fs::write(fx.paths.root.join("ignored.rs"), "fn z() {}\n").unwrap();
    fs::write(fx.paths.root.join("kept.rs"), "fn k() {}\n").unwrap();

    let stats = fx.run_index();
    assert_eq!(stats.files_indexed, 1);
}

#[test]
fn unchanged_content_is_skipped_on_second_pass() {
    let mut fx = setup();
    fs::write(fx.paths.root.join("a.rs"), "fn a() {}\n").unwrap();
    let first = fx.run_index();
    assert_eq!(first.files_indexed, 1);

    let second = fx.run_index();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.files_skipped, 1);
}

#[test]
fn touching_mtime_without_changing_content_does_not_reindex_objects() {
    let mut fx = setup();
    let path = fx.paths.root.join("a.rs");
    fs::write(&path, "fn a() {}\n").unwrap();
    let first = fx.run_index();
    let objects_after_first = fx.vector_index.lock().unwrap().len();
    assert_eq!(first.files_indexed, 1);

    // Rewrite identical bytes: mtime changes but the content digest matches.
    std::thread::sleep(std::time::Duration::from_millis(5));
    fs::write(&path, "fn a() {}\n").unwrap();
    let second = fx.run_index();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(fx.vector_index.lock().unwrap().len(), objects_after_first);
}

#[test]
fn rebuild_faiss_index_reloads_unchanged_files_embeddings() {
    let mut fx = setup();
    fs::write(fx.paths.root.join("a.rs"), "fn a() {}\n").unwrap();
    fx.run_index();
    let before = fx.vector_index.lock().unwrap().len();
    assert!(before > 0);

    // Simulate a blown-away vector index file while the DB still has data.
    *fx.vector_index.lock().unwrap() = VectorIndex::new(DIM);
    assert_eq!(fx.vector_index.lock().unwrap().len(), 0);

    let indexer = Indexer {
        paths: fx.paths.clone(),
        ignore: &fx.ignore,
        vector_index: &fx.vector_index,
        search_cache: &fx.search_cache,
    };
    indexer.run(&mut fx.storage, &mut fx.scheduler, &[fx.paths.root.clone()], true, true, &fx.stats).unwrap();
    assert_eq!(fx.vector_index.lock().unwrap().len(), before);
}

#[test]
fn adding_a_trailing_newline_leaves_the_rendered_object_unchanged_and_reuses_its_embedding() {
    let mut fx = setup();
    let path = fx.paths.root.join("README.md");
    fs::write(&path, "Hello, world!").unwrap();
    fx.run_index();
    let calls_after_first = fx.fake.call_count();
    assert!(calls_after_first > 0);

    // The file's bytes (and so its sha256 digest) change, forcing a
    // re-index, but the whole-file Object's rendered form is unchanged
    // (trailing newline does not add a line), so its content_sha256 is
    // identical and the stored embedding is reused with no provider call.
    fs::write(&path, "Hello, world!\n").unwrap();
    let stats = fx.run_index();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(fx.fake.call_count(), calls_after_first);
}

#[test]
fn full_text_search_finds_an_indexed_function_by_name() {
    let mut fx = setup();
    fs::write(fx.paths.root.join("math.rs"), "fn add_numbers(a: i32, b: i32) -> i32 {\n    a + b\n}\n").unwrap();
    fx.run_index();

    let engine = codesearch::search::SearchEngine {
        paths: &fx.paths,
        vector_index: &fx.vector_index,
        provider: fx.provider.as_ref(),
        cache: &fx.search_cache,
        stats: &fx.stats,
    };
    let opts = SearchOptions { top_k: 5, semantic: false, full_text: true, cached_only: true };
    let results = engine.search(&fx.storage.conn, "add_numbers", &opts).unwrap();
    assert!(results.iter().any(|r| r.object.name == "add_numbers"));
}
