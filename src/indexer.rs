//! Indexer (spec.md §4.5) — the event-driven pipeline hub.
//!
//! A single-threaded event loop drained in **LIFO** order from an explicit
//! `Vec` used as a stack, rather than recursive calls: pushing dependent
//! events onto the same stack makes delete-before-insert, flush-before-
//! commit, and per-file scheduling orderings explicit. This is a direct
//! port of the original tool's `index_paths` event loop — event variants,
//! seeding order, and all.

use crate::embeddings::EmbeddingScheduler;
use crate::error::Result;
use crate::ignore_oracle::IgnoreOracle;
use crate::models::{Embedding, EmbeddingRequest, Object, RepoPaths};
use crate::parser::{self, sha256_hex};
use crate::search::SearchCache;
use crate::stats::Stats;
use crate::storage::{self, Storage};
use crate::vector_index::VectorIndex;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

enum Event {
    Directory(PathBuf),
    File(PathBuf),
    DeleteFile(PathBuf),
    DeleteFileObjects(PathBuf),
    IndexFile(PathBuf, String),
    IndexObjects(String, Vec<(i64, Object)>),
    ScheduleEmbeddingRequests(Vec<EmbeddingRequest>),
    StoreEmbeddings(Vec<Embedding>),
    FlushEmbeddings,
    FaissDeletes,
    FaissInserts,
    DeleteNotVisited,
    ReloadFileEmbeddings(PathBuf),
    Commit,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub objects_inserted: usize,
}

pub struct Indexer<'a> {
    pub paths: RepoPaths,
    pub ignore: &'a IgnoreOracle,
    pub vector_index: &'a Mutex<VectorIndex>,
    pub search_cache: &'a SearchCache,
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.contains(&0u8)
}

fn is_utf8(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok()
}

fn is_utf16(bytes: &[u8]) -> bool {
    if bytes.starts_with(&[0xff, 0xfe]) || bytes.starts_with(&[0xfe, 0xff]) {
        return true;
    }
    if bytes.len() % 2 != 0 {
        return false;
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    char::decode_utf16(units).all(|r| r.is_ok())
}

/// Decodes file bytes already classified as text by `is_utf8`/`is_utf16`.
/// UTF-8 is returned as-is; UTF-16 (BOM or bare, big- or little-endian) is
/// transcoded to UTF-8 rather than silently dropped.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    decode_utf16_lossy(bytes)
}

fn decode_utf16_lossy(bytes: &[u8]) -> String {
    let (body, big_endian) = if let Some(rest) = bytes.strip_prefix(&[0xfe, 0xff]) {
        (rest, true)
    } else if let Some(rest) = bytes.strip_prefix(&[0xff, 0xfe]) {
        (rest, false)
    } else {
        (bytes, false)
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| if big_endian { u16::from_be_bytes([c[0], c[1]]) } else { u16::from_le_bytes([c[0], c[1]]) })
        .collect();
    String::from_utf16_lossy(&units)
}

impl<'a> Indexer<'a> {
    /// Runs one index pass over `paths_to_index`. `total` additionally
    /// reconciles deletions of anything not visited. `rebuild_faiss_index`
    /// forces unchanged files to reload their stored embeddings into the
    /// Vector Index instead of being skipped outright.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        storage: &mut Storage,
        scheduler: &mut EmbeddingScheduler,
        paths_to_index: &[PathBuf],
        total: bool,
        rebuild_faiss_index: bool,
        metrics: &Stats,
    ) -> Result<IndexStats> {
        let rebuilding = total && rebuild_faiss_index;
        let mut stats = IndexStats::default();
        let requests_before = scheduler.requests_scheduled();
        let batches_before = scheduler.batches_flushed();

        let tx = storage.conn.transaction()?;

        let mut embeddings_to_index: Vec<Embedding> = Vec::new();
        let mut deletion_markers: Vec<i64> = Vec::new();
        let mut paths_visited: Vec<String> = Vec::new();

        let mut events: Vec<Event> = Vec::new();
        events.push(Event::Commit);
        events.push(Event::FaissInserts);
        events.push(Event::FaissDeletes);
        if total {
            events.push(Event::DeleteNotVisited);
        }
        events.push(Event::FlushEmbeddings);
        for p in paths_to_index {
            if p.is_dir() {
                events.push(Event::Directory(p.clone()));
            } else {
                events.push(Event::File(p.clone()));
            }
        }

        let mut should_commit = false;

        let run_result: Result<()> = (|| {
            while let Some(event) = events.pop() {
                match event {
                    Event::Directory(path) => {
                        if path == self.paths.root.join(".git") || path == self.paths.private_dir() {
                            continue;
                        }
                        let entries = match std::fs::read_dir(&path) {
                            Ok(e) => e,
                            Err(_) => continue,
                        };
                        for entry in entries.flatten() {
                            let entry_path = entry.path();
                            if self.ignore.is_ignored(&entry_path) {
                                continue;
                            }
                            let Ok(file_type) = entry.file_type() else { continue };
                            if file_type.is_symlink() {
                                continue;
                            }
                            if file_type.is_dir() {
                                events.push(Event::Directory(entry_path));
                            } else if file_type.is_file() {
                                events.push(Event::File(entry_path));
                            }
                        }
                    }
                    Event::File(path) => {
                        self.handle_file_event(&tx, &path, rebuilding, &mut events, &mut paths_visited, &mut stats)?;
                    }
                    Event::ReloadFileEmbeddings(path) => {
                        let rel = relative_str(&self.paths.root, &path);
                        let rows = storage::embeddings_for_path(&tx, &rel)?;
                        embeddings_to_index.extend(rows.into_iter().map(|r| Embedding {
                            object_id: r.object_id,
                            data: storage::deserialize_embedding(&r.data),
                            content_hash: r.content_hash,
                        }));
                    }
                    Event::DeleteFile(path) => {
                        let rel = relative_str(&self.paths.root, &path);
                        storage::delete_file(&tx, &rel)?;
                        stats.files_deleted += 1;
                    }
                    Event::DeleteFileObjects(path) => {
                        let rel = relative_str(&self.paths.root, &path);
                        let ids = storage::delete_object_by_path(&tx, &rel)?;
                        deletion_markers.extend(ids);
                    }
                    Event::IndexFile(path, text) => {
                        let rel = relative_str(&self.paths.root, &path);
                        let objects = parser::parse_objects(&rel, &text);
                        let mut objects_by_id = Vec::with_capacity(objects.len());
                        for obj in objects {
                            let id = storage::insert_object(&tx, &obj)?;
                            stats.objects_inserted += 1;
                            objects_by_id.push((id, obj));
                        }
                        events.push(Event::IndexObjects(text, objects_by_id));
                    }
                    Event::IndexObjects(text, objects_by_id) => {
                        let lines = parser::lines_of(&text);
                        let mut requests = Vec::with_capacity(objects_by_id.len());
                        for (id, obj) in &objects_by_id {
                            let rendered = parser::render_object(obj, &lines, true, false, false);
                            let hash = sha256_hex(rendered.as_bytes());
                            requests.push(EmbeddingRequest { object_id: *id, content: rendered, content_hash: hash });

                            let (start, end) = obj.byte_range;
                            let content = text.get(start..end.min(text.len())).unwrap_or("");
                            storage::insert_fts_row(&tx, *id, &obj.path, &obj.name, content)?;
                        }
                        events.push(Event::ScheduleEmbeddingRequests(requests));
                    }
                    Event::ScheduleEmbeddingRequests(requests) => {
                        let mut batch = Vec::new();
                        for req in requests {
                            if let Some(data) = storage::lookup_embedding_by_content_hash(&tx, &req.content_hash)? {
                                batch.push(Embedding {
                                    object_id: req.object_id,
                                    data: storage::deserialize_embedding(&data),
                                    content_hash: req.content_hash,
                                });
                            } else {
                                let flushed = scheduler.schedule(req)?;
                                batch.extend(flushed);
                            }
                        }
                        events.push(Event::StoreEmbeddings(batch));
                    }
                    Event::FlushEmbeddings => {
                        let results = scheduler.flush()?;
                        events.push(Event::StoreEmbeddings(results));
                    }
                    Event::StoreEmbeddings(batch) => {
                        if batch.is_empty() {
                            continue;
                        }
                        for e in &batch {
                            let data = storage::serialize_embedding(&e.data);
                            storage::insert_embedding(&tx, e.object_id, &data, &e.content_hash)?;
                        }
                        embeddings_to_index.extend(batch);
                    }
                    Event::FaissInserts => {
                        if !embeddings_to_index.is_empty() {
                            let ids: Vec<i64> = embeddings_to_index.iter().map(|e| e.object_id).collect();
                            let vectors: Vec<Vec<f32>> = embeddings_to_index.iter().map(|e| e.data.clone()).collect();
                            self.vector_index.lock().unwrap().add(&ids, &vectors);
                        }
                        embeddings_to_index.clear();
                    }
                    Event::FaissDeletes => {
                        if !deletion_markers.is_empty() {
                            self.vector_index.lock().unwrap().remove(&deletion_markers);
                        }
                        deletion_markers.clear();
                    }
                    Event::DeleteNotVisited => {
                        let ids = storage::delete_not_visited(&tx, &paths_visited)?;
                        stats.files_deleted += ids.len();
                        deletion_markers.extend(ids);
                    }
                    Event::Commit => {
                        should_commit = true;
                    }
                }
            }
            Ok(())
        })();

        if run_result.is_err() {
            tx.rollback()?;
            run_result?;
        }

        if should_commit {
            self.search_cache.clear();
            tx.commit()?;
            let index = self.vector_index.lock().unwrap();
            index.save(&self.paths.index_path())?;
            info!(files_indexed = stats.files_indexed, files_skipped = stats.files_skipped, "indexer commit");

            metrics.add_files_indexed(stats.files_indexed as u64);
            metrics.add_files_skipped(stats.files_skipped as u64);
            metrics.add_files_deleted(stats.files_deleted as u64);
            metrics.add_objects_inserted(stats.objects_inserted as u64);
            metrics.add_embedding_requests(scheduler.requests_scheduled() - requests_before);
            metrics.add_embedding_batches(scheduler.batches_flushed() - batches_before);
        }

        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_file_event(
        &self,
        tx: &rusqlite::Transaction,
        path: &Path,
        rebuilding: bool,
        events: &mut Vec<Event>,
        paths_visited: &mut Vec<String>,
        stats: &mut IndexStats,
    ) -> Result<()> {
        let rel = relative_str(&self.paths.root, path);

        if !path.is_file() {
            events.push(Event::DeleteFile(path.to_path_buf()));
            events.push(Event::DeleteFileObjects(path.to_path_buf()));
            return Ok(());
        }

        paths_visited.push(rel.clone());

        let existing = storage::get_file(&tx, &rel)?;
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => {
                events.push(Event::DeleteFile(path.to_path_buf()));
                events.push(Event::DeleteFileObjects(path.to_path_buf()));
                return Ok(());
            }
        };
        let size = meta.len() as i64;
        let mtime_ns = mtime_ns(&meta);

        if let Some(row) = &existing {
            if row.size_bytes == size && row.last_modified_ns == mtime_ns {
                stats.files_skipped += 1;
                if rebuilding {
                    events.push(Event::ReloadFileEmbeddings(path.to_path_buf()));
                }
                return Ok(());
            }
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(_) => {
                events.push(Event::DeleteFile(path.to_path_buf()));
                events.push(Event::DeleteFileObjects(path.to_path_buf()));
                return Ok(());
            }
        };

        if is_binary(&bytes) {
            debug!(path = %rel, "ignoring binary file");
            return Ok(());
        }
        if !(is_utf8(&bytes) || is_utf16(&bytes)) {
            debug!(path = %rel, "ignoring non-utf8/utf16 file");
            return Ok(());
        }

        let digest_hex = sha256_hex(&bytes);
        let digest = digest_hex.as_bytes().to_vec();
        let previous_digest = existing.map(|r| r.sha256_digest);

        storage::insert_file(tx, &rel, size, mtime_ns, &digest)?;

        if previous_digest.as_deref() == Some(digest.as_slice()) {
            stats.files_skipped += 1;
            return Ok(());
        }

        let text = decode_text(&bytes);
        events.push(Event::IndexFile(path.to_path_buf(), text));
        events.push(Event::DeleteFileObjects(path.to_path_buf()));
        stats.files_indexed += 1;
        Ok(())
    }
}

#[cfg(unix)]
fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime() * 1_000_000_000 + meta.mtime_nsec()
}

#[cfg(not(unix))]
fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn relative_str(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_text_passes_utf8_through() {
        assert_eq!(decode_text("hello".as_bytes()), "hello");
    }

    #[test]
    fn decode_text_transcodes_utf16_le_with_bom() {
        let units: Vec<u16> = "hello".encode_utf16().collect();
        let mut bytes = vec![0xff, 0xfe];
        for u in units {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        assert!(is_utf16(&bytes));
        assert_eq!(decode_text(&bytes), "hello");
    }

    #[test]
    fn decode_text_transcodes_utf16_be_with_bom() {
        let units: Vec<u16> = "hello".encode_utf16().collect();
        let mut bytes = vec![0xfe, 0xff];
        for u in units {
            bytes.extend_from_slice(&u.to_be_bytes());
        }
        assert!(is_utf16(&bytes));
        assert_eq!(decode_text(&bytes), "hello");
    }
}
