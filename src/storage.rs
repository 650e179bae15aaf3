//! Storage (spec.md §4.2).
//!
//! CRUD for Files, Objects, Embeddings, and FTS rows, plus schema
//! migrations, backed by `rusqlite` (bundled SQLite + FTS5). All mutating
//! operations take an explicit `&rusqlite::Transaction` — the Indexer is
//! the sole writer and drives one transaction per run. Read-only lookups
//! take a plain `&Connection` so the Search Engine can read the last
//! committed state without participating in any write transaction.

use crate::error::Result;
use crate::models::{FileRow, Object, ObjectKind};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;

/// Numbered migrations, embedded at compile time. Applied ascending; each
/// one commits independently and is recorded in `migrations(version)`,
/// mirroring the original tool's `DatabaseMigrations.migrate`.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../migrations/0001_init.sql"))];

pub struct Storage {
    pub conn: Connection,
}

impl Storage {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        let mut storage = Storage { conn };
        storage.migrate()?;
        Ok(storage)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Storage { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute("CREATE TABLE IF NOT EXISTS migrations (version INTEGER PRIMARY KEY)", [])?;
        let current: Option<i64> = self
            .conn
            .query_row("SELECT version FROM migrations ORDER BY version DESC LIMIT 1", [], |r| r.get(0))
            .optional()?;
        for (version, sql) in MIGRATIONS {
            if let Some(current) = current {
                if current >= *version {
                    continue;
                }
            }
            self.conn.execute_batch(sql)?;
            self.conn.execute("INSERT INTO migrations (version) VALUES (?1)", params![version])?;
        }
        Ok(())
    }
}

/// Little-endian IEEE-754 binary32 packing, one component after another.
pub fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// Upsert by `path`.
pub fn insert_file(tx: &Transaction, path: &str, size: i64, mtime_ns: i64, digest: &[u8]) -> Result<()> {
    tx.execute(
        "INSERT INTO file (path, size_bytes, last_modified_ns, sha256_digest) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(path) DO UPDATE SET size_bytes = ?2, last_modified_ns = ?3, sha256_digest = ?4",
        params![path, size, mtime_ns, digest],
    )?;
    Ok(())
}

pub fn get_file(conn: &Connection, path: &str) -> Result<Option<FileRow>> {
    conn.query_row(
        "SELECT path, size_bytes, last_modified_ns, sha256_digest FROM file WHERE path = ?1",
        params![path],
        |r| {
            Ok(FileRow {
                path: r.get(0)?,
                size_bytes: r.get(1)?,
                last_modified_ns: r.get(2)?,
                sha256_digest: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn delete_file(tx: &Transaction, path: &str) -> Result<()> {
    tx.execute("DELETE FROM file WHERE path = ?1", params![path])?;
    Ok(())
}

/// Deletes Object and FTS rows for `path`, returning the deleted object ids.
/// Embeddings are retained, reachable by content hash for reuse.
pub fn delete_object_by_path(tx: &Transaction, path: &str) -> Result<Vec<i64>> {
    let ids: Vec<i64> = {
        let mut stmt = tx.prepare("DELETE FROM object WHERE path = ?1 RETURNING id")?;
        let rows = stmt.query_map(params![path], |r| r.get(0))?;
        rows.collect::<std::result::Result<Vec<i64>, _>>()?
    };
    if !ids.is_empty() {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("DELETE FROM fts WHERE rowid IN ({placeholders})");
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
        tx.execute(&sql, params.as_slice())?;
    }
    Ok(ids)
}

/// Inserts a new Object row, returning its assigned id. Ids may be reused
/// after a prior delete (SQLite's default rowid-reuse behavior).
pub fn insert_object(tx: &Transaction, obj: &Object) -> Result<i64> {
    tx.execute(
        "INSERT INTO object (path, name, language, kind, byte_range, coordinates, context_before, context_after)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            obj.path,
            obj.name,
            obj.language,
            obj.kind.as_str(),
            serde_json::to_string(&obj.byte_range)?,
            serde_json::to_string(&obj.coordinates)?,
            serde_json::to_string(&obj.context_before)?,
            serde_json::to_string(&obj.context_after)?,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

pub fn get_object(conn: &Connection, id: i64) -> Result<Option<Object>> {
    conn.query_row(
        "SELECT id, path, name, language, kind, byte_range, coordinates, context_before, context_after
         FROM object WHERE id = ?1",
        params![id],
        row_to_object,
    )
    .optional()
    .map_err(Into::into)
}

fn row_to_object(r: &rusqlite::Row) -> rusqlite::Result<Object> {
    let byte_range: String = r.get(5)?;
    let coordinates: String = r.get(6)?;
    let context_before: String = r.get(7)?;
    let context_after: String = r.get(8)?;
    Ok(Object {
        id: Some(r.get(0)?),
        path: r.get(1)?,
        name: r.get(2)?,
        language: r.get(3)?,
        kind: ObjectKind::parse(&r.get::<_, String>(4)?),
        byte_range: serde_json::from_str(&byte_range).unwrap_or((0, 0)),
        coordinates: serde_json::from_str(&coordinates).unwrap_or(((0, 0), (0, 0))),
        context_before: serde_json::from_str(&context_before).unwrap_or_default(),
        context_after: serde_json::from_str(&context_after).unwrap_or_default(),
    })
}

pub fn insert_fts_row(tx: &Transaction, object_id: i64, path: &str, name: &str, content: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO fts (rowid, path, name, content) VALUES (?1, ?2, ?3, ?4)",
        params![object_id, path, name, content],
    )?;
    Ok(())
}

/// Upsert by `object_id`.
pub fn insert_embedding(tx: &Transaction, object_id: i64, data: &[u8], content_hash: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO embedding (object_id, data, content_sha256) VALUES (?1, ?2, ?3)
         ON CONFLICT(object_id) DO UPDATE SET data = ?2, content_sha256 = ?3",
        params![object_id, data, content_hash],
    )?;
    Ok(())
}

/// Returns the most recent vector bytes stored under `hash`, if any.
pub fn lookup_embedding_by_content_hash(tx: &Transaction, hash: &str) -> Result<Option<Vec<u8>>> {
    tx.query_row("SELECT data FROM embedding WHERE content_sha256 = ?1 LIMIT 1", params![hash], |r| r.get(0))
        .optional()
        .map_err(Into::into)
}

pub struct StoredEmbedding {
    pub object_id: i64,
    pub data: Vec<u8>,
    pub content_hash: String,
}

/// All embeddings for objects currently stored under `path`, used by
/// `ReloadFileEmbeddings` when rebuilding the vector index.
pub fn embeddings_for_path(tx: &Transaction, path: &str) -> Result<Vec<StoredEmbedding>> {
    let mut stmt = tx.prepare(
        "SELECT object_id, content_sha256, data FROM embedding
         WHERE object_id IN (SELECT id FROM object WHERE path = ?1)",
    )?;
    let rows = stmt.query_map(params![path], |r| {
        Ok(StoredEmbedding { object_id: r.get(0)?, content_hash: r.get(1)?, data: r.get(2)? })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

/// Deletes every Object/File not in `visited_paths` (total-pass reconciliation).
/// Returns the deleted object ids so callers can queue Vector Index removals.
pub fn delete_not_visited(tx: &Transaction, visited_paths: &[String]) -> Result<Vec<i64>> {
    let placeholders = visited_paths.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let params: Vec<&dyn rusqlite::ToSql> = visited_paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

    let ids: Vec<i64> = {
        let sql = format!("DELETE FROM object WHERE path NOT IN ({placeholders}) RETURNING id");
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |r| r.get(0))?;
        rows.collect::<std::result::Result<Vec<i64>, _>>()?
    };

    let sql = format!("DELETE FROM file WHERE path NOT IN ({placeholders})");
    tx.execute(&sql, params.as_slice())?;

    if !ids.is_empty() {
        let id_placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("DELETE FROM fts WHERE rowid IN ({id_placeholders})");
        let id_params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
        tx.execute(&sql, id_params.as_slice())?;
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trips_bit_exactly() {
        let v = vec![0.5f32, -1.25, 3.0, f32::MIN_POSITIVE];
        let bytes = serialize_embedding(&v);
        assert_eq!(bytes.len(), v.len() * 4);
        assert_eq!(deserialize_embedding(&bytes), v);
    }

    #[test]
    fn insert_and_delete_object_round_trips() {
        let mut storage = Storage::open_in_memory().unwrap();
        let tx = storage.conn.transaction().unwrap();
        insert_file(&tx, "a.rs", 10, 1, b"digest").unwrap();
        let obj = Object {
            id: None,
            path: "a.rs".into(),
            name: "a.rs".into(),
            language: "text".into(),
            kind: ObjectKind::File,
            byte_range: (0, 10),
            coordinates: ((0, 0), (0, 10)),
            context_before: vec![],
            context_after: vec![],
        };
        let id = insert_object(&tx, &obj).unwrap();
        insert_fts_row(&tx, id, "a.rs", "a.rs", "hello").unwrap();
        tx.commit().unwrap();

        assert!(get_object(&storage.conn, id).unwrap().is_some());

        let tx = storage.conn.transaction().unwrap();
        let deleted = delete_object_by_path(&tx, "a.rs").unwrap();
        tx.commit().unwrap();
        assert_eq!(deleted, vec![id]);
        assert!(get_object(&storage.conn, id).unwrap().is_none());
    }
}
