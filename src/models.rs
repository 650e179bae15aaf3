//! Data model shared by the parser, storage, embedding, and search components.
//!
//! Field-for-field encoding of the spec's entities: `File`, `Object`,
//! `Embedding`, `FtsRow`. See storage.rs for how these map to table rows.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A (row, col) position, 0-based, as tree-sitter reports it.
pub type Point = (usize, usize);
/// (start, end) pair of points bounding a syntactic node.
pub type Coordinates = (Point, Point);
/// Half-open [start, end) byte range within a file's bytes.
pub type ByteRange = (usize, usize);

/// A kind tag for an Object. Stored as its string form in SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    File,
    DefinitionFunction,
    DefinitionMethod,
    DefinitionClass,
    DefinitionStruct,
    DefinitionInterface,
    DefinitionType,
    DefinitionModule,
    DefinitionMacro,
    DefinitionConstant,
    DefinitionField,
    DefinitionTraitImpl,
    DefinitionStructImpl,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::File => "file",
            ObjectKind::DefinitionFunction => "definition.function",
            ObjectKind::DefinitionMethod => "definition.method",
            ObjectKind::DefinitionClass => "definition.class",
            ObjectKind::DefinitionStruct => "definition.struct",
            ObjectKind::DefinitionInterface => "definition.interface",
            ObjectKind::DefinitionType => "definition.type",
            ObjectKind::DefinitionModule => "definition.module",
            ObjectKind::DefinitionMacro => "definition.macro",
            ObjectKind::DefinitionConstant => "definition.constant",
            ObjectKind::DefinitionField => "definition.field",
            ObjectKind::DefinitionTraitImpl => "definition.trait.impl",
            ObjectKind::DefinitionStructImpl => "definition.struct.impl",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "file" => ObjectKind::File,
            "definition.function" => ObjectKind::DefinitionFunction,
            "definition.method" => ObjectKind::DefinitionMethod,
            "definition.class" => ObjectKind::DefinitionClass,
            "definition.struct" => ObjectKind::DefinitionStruct,
            "definition.interface" => ObjectKind::DefinitionInterface,
            "definition.type" => ObjectKind::DefinitionType,
            "definition.module" => ObjectKind::DefinitionModule,
            "definition.macro" => ObjectKind::DefinitionMacro,
            "definition.constant" => ObjectKind::DefinitionConstant,
            "definition.field" => ObjectKind::DefinitionField,
            "definition.trait.impl" => ObjectKind::DefinitionTraitImpl,
            "definition.struct.impl" => ObjectKind::DefinitionStructImpl,
            other => panic!("unknown object kind: {other}"),
        }
    }
}

/// A syntactic entity discovered in a File (spec.md §3 `Object`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub id: Option<i64>,
    pub path: String,
    pub name: String,
    pub language: String,
    pub kind: ObjectKind,
    pub byte_range: ByteRange,
    pub coordinates: Coordinates,
    pub context_before: Vec<usize>,
    pub context_after: Vec<usize>,
}

impl Object {
    pub fn start_row(&self) -> usize {
        (self.coordinates.0).0
    }

    pub fn end_row(&self) -> usize {
        (self.coordinates.1).0
    }
}

/// An embedding request derived from one rendered Object.
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub object_id: i64,
    pub content: String,
    pub content_hash: String,
}

/// A vector bound to an Object id by content hash (spec.md §3 `Embedding`).
#[derive(Debug, Clone)]
pub struct Embedding {
    pub object_id: i64,
    pub data: Vec<f32>,
    pub content_hash: String,
}

/// The stored row for a File (spec.md §3 `File`).
#[derive(Debug, Clone)]
pub struct FileRow {
    pub path: String,
    pub size_bytes: i64,
    pub last_modified_ns: i64,
    pub sha256_digest: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct RepoPaths {
    pub root: PathBuf,
}

impl RepoPaths {
    pub fn private_dir(&self) -> PathBuf {
        self.root.join(".codesearch")
    }

    pub fn db_path(&self) -> PathBuf {
        self.private_dir().join("codesearch.db")
    }

    pub fn index_path(&self) -> PathBuf {
        self.private_dir().join("index.faiss")
    }
}
