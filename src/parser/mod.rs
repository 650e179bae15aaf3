//! Object Parser (spec.md §4.1).
//!
//! Turns `(relative_path, file_bytes)` into an ordered list of `Object`s: a
//! whole-file object first, then one object per tree-sitter tag-query match.
//! Unsupported extensions fall back to a single `kind=file`,
//! `language=text` object. Context anchors are computed by walking named
//! ancestors with monotonic narrowing (see `context_anchors`).

mod queries;

use crate::models::{ByteRange, Coordinates, Object, ObjectKind};
use sha2::{Digest, Sha256};

/// Canonical embedding input for an Object: optional path header, context
/// lines, then the object's own lines. `context_after` is intentionally
/// never rendered (it would duplicate closing braces/dedent markers that
/// add no retrieval signal — this mirrors the original tool's renderer,
/// which computes `context_after` only for potential future use).
pub fn render_object(
    obj: &Object,
    file_lines: &[&str],
    include_context: bool,
    include_path: bool,
    line_numbers: bool,
) -> String {
    let mut out = Vec::new();
    if include_path {
        out.push(obj.path.clone());
        out.push(String::new());
    }

    let start_row = obj.start_row();
    let end_row = obj.end_row();
    let max_line_no = obj
        .context_before
        .iter()
        .copied()
        .chain([start_row, end_row])
        .max()
        .unwrap_or(0)
        + 1;
    let line_width = max_line_no.to_string().len();

    let fmt_line = |idx: usize, content: &str| -> String {
        if line_numbers {
            format!("{:>width$} {}", idx + 1, content, width = line_width)
        } else {
            content.to_string()
        }
    };

    if include_context {
        for &row in &obj.context_before {
            if let Some(line) = file_lines.get(row) {
                out.push(fmt_line(row, line));
            }
        }
    }
    for row in start_row..=end_row {
        if let Some(line) = file_lines.get(row) {
            out.push(fmt_line(row, line));
        }
    }
    out.join("\n")
}

/// `content_hash` is SHA-256 of the rendered form with
/// `include_context=true, include_path=false, line_numbers=false`.
pub fn content_hash(obj: &Object, file_lines: &[&str]) -> String {
    let rendered = render_object(obj, file_lines, true, false, false);
    sha256_hex(rendered.as_bytes())
}

/// Lowercase-hex SHA-256 digest, used for both content hashes and file digests.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        write!(out, "{byte:02x}").unwrap();
    }
    out
}

/// Splits on `\n` the way Python's `str.splitlines()` does: a single
/// trailing newline does not create an extra empty final line. This keeps
/// a whole-file Object's rendered form (and therefore its content hash)
/// stable across a file gaining or losing a trailing newline.
pub fn lines_of(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.len() > 1 && lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

fn text_coordinates(text: &str) -> Coordinates {
    let lines = lines_of(text);
    let last_len = lines.last().map(|l| l.len()).unwrap_or(0);
    ((0, 0), (lines.len().saturating_sub(1), last_len))
}

fn file_object(path: &str, language: &str, text: &str) -> Object {
    Object {
        id: None,
        path: path.to_string(),
        name: path.to_string(),
        language: language.to_string(),
        kind: ObjectKind::File,
        byte_range: (0, text.len()),
        coordinates: text_coordinates(text),
        context_before: Vec::new(),
        context_after: Vec::new(),
    }
}

/// Extensions without a registered grammar yield a single whole-file object.
pub fn parse_objects(path: &str, text: &str) -> Vec<Object> {
    #[cfg(feature = "treesitter")]
    {
        if let Some(objs) = treesitter_impl::parse_with_treesitter(path, text) {
            return objs;
        }
    }
    vec![file_object(path, "text", text)]
}

#[cfg(feature = "treesitter")]
mod treesitter_impl {
    use super::*;
    use std::ops::Range;
    use std::sync::OnceLock;
    use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator};

    struct LanguageImpl {
        name: &'static str,
        file_types: &'static [&'static str],
        language: tree_sitter::Language,
        query: Query,
    }

    fn byte_range(node: &Node) -> ByteRange {
        (node.start_byte(), node.end_byte())
    }

    fn node_coordinates(node: &Node) -> Coordinates {
        let s = node.start_position();
        let e = node.end_position();
        ((s.row, s.column), (e.row, e.column))
    }

    /// Walk named ancestors (excluding the tree root), collecting only the
    /// ones that (a) have a `name` field and (b) strictly narrow the current
    /// bracket versus the previously accepted ancestor. Outermost to
    /// innermost order, matching the original `get_context` algorithm.
    fn context_anchors(node: &Node) -> (Vec<usize>, Vec<usize>) {
        let mut ancestors = Vec::new();
        let mut cur = node.parent();
        while let Some(p) = cur {
            ancestors.push(p);
            cur = p.parent();
        }
        // Drop the tree root (last pushed).
        ancestors.pop();

        let mut before = Vec::new();
        let mut after = Vec::new();
        let mut start_line: i64 = i64::MIN;
        let mut end_line: i64 = i64::MAX;

        // Process outermost -> innermost, i.e. reverse of the
        // immediate-parent-first collection order.
        for parent in ancestors.into_iter().rev() {
            if parent.child_by_field_name("name").is_none() {
                continue;
            }
            let parent_start = parent.start_position().row as i64;
            let parent_end = parent.end_position().row as i64;
            if start_line < parent_start && parent_start < node.start_position().row as i64 {
                before.push(parent_start as usize);
            }
            if (node.end_position().row as i64) < parent_end && parent_end < end_line {
                after.push(parent_end as usize);
            }
            start_line = parent_start;
            end_line = parent_end;
        }
        (before, after)
    }

    fn languages() -> &'static Vec<LanguageImpl> {
        static LANGS: OnceLock<Vec<LanguageImpl>> = OnceLock::new();
        LANGS.get_or_init(|| {
            let mut v = Vec::new();
            v.push(build(
                "rust",
                &["rs"],
                tree_sitter_rust::LANGUAGE.into(),
                queries::RUST_QUERY,
            ));
            v.push(build(
                "python",
                &["py"],
                tree_sitter_python::LANGUAGE.into(),
                queries::PYTHON_QUERY,
            ));
            v.push(build(
                "go",
                &["go"],
                tree_sitter_go::LANGUAGE.into(),
                queries::GO_QUERY,
            ));
            v.push(build(
                "java",
                &["java"],
                tree_sitter_java::LANGUAGE.into(),
                queries::JAVA_QUERY,
            ));
            v.push(build(
                "javascript",
                &["js", "mjs", "cjs", "jsx"],
                tree_sitter_javascript::LANGUAGE.into(),
                queries::JAVASCRIPT_QUERY,
            ));
            let ts_query = queries::typescript_query();
            v.push(build(
                "typescript",
                &["ts"],
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                Box::leak(ts_query.clone().into_boxed_str()),
            ));
            v.push(build(
                "tsx",
                &["tsx"],
                tree_sitter_typescript::LANGUAGE_TSX.into(),
                Box::leak(ts_query.into_boxed_str()),
            ));
            v.push(build(
                "c",
                &["c", "h"],
                tree_sitter_c::LANGUAGE.into(),
                queries::C_QUERY,
            ));
            v.push(build(
                "cpp",
                &["cc", "cpp", "cxx", "hpp", "hxx"],
                tree_sitter_cpp::LANGUAGE.into(),
                queries::CPP_QUERY,
            ));
            v
        })
    }

    fn build(
        name: &'static str,
        file_types: &'static [&'static str],
        language: tree_sitter::Language,
        query_src: &'static str,
    ) -> LanguageImpl {
        let query = Query::new(&language, query_src)
            .unwrap_or_else(|e| panic!("invalid tag query for {name}: {e}"));
        LanguageImpl { name, file_types, language, query }
    }

    fn extension(path: &str) -> Option<&str> {
        path.rsplit('.').next().filter(|ext| *ext != path)
    }

    pub fn parse_with_treesitter(path: &str, text: &str) -> Option<Vec<Object>> {
        let ext = extension(path)?;
        let lang_impl = languages().iter().find(|l| l.file_types.contains(&ext))?;

        let mut parser = Parser::new();
        parser.set_language(&lang_impl.language).ok()?;
        let tree = parser.parse(text, None)?;
        let root = tree.root_node();

        let mut objects = vec![file_object(path, lang_impl.name, text)];

        let name_idx = lang_impl
            .query
            .capture_names()
            .iter()
            .position(|n| *n == "name");

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&lang_impl.query, root, text.as_bytes());
        while let Some(m) = matches.next() {
            let mut name_node: Option<Node> = None;
            let mut definitions: Vec<(String, Node)> = Vec::new();
            for cap in m.captures {
                let cap_name = &lang_impl.query.capture_names()[cap.index as usize];
                if Some(cap.index as usize) == name_idx {
                    name_node = Some(cap.node);
                } else if let Some(kind) = cap_name.strip_prefix("definition.") {
                    definitions.push((kind.to_string(), cap.node));
                }
            }
            let Some(name_node) = name_node else { continue };
            let Ok(name_text) = name_node.utf8_text(text.as_bytes()) else { continue };

            for (kind, def_node) in definitions {
                let (before, after) = context_anchors(&def_node);
                let byte_range: Range<usize> = def_node.byte_range();
                objects.push(Object {
                    id: None,
                    path: path.to_string(),
                    name: name_text.to_string(),
                    language: lang_impl.name.to_string(),
                    kind: ObjectKind::parse(&format!("definition.{kind}")),
                    byte_range: (byte_range.start, byte_range.end),
                    coordinates: node_coordinates(&def_node),
                    context_before: before,
                    context_after: after,
                });
            }
        }
        Some(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_yields_single_file_object() {
        let objs = parse_objects("README.md", "Hello, world!");
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].kind, ObjectKind::File);
        assert_eq!(objs[0].language, "text");
        assert_eq!(objs[0].byte_range, (0, "Hello, world!".len()));
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn rust_source_yields_function_and_struct_objects() {
        let src = "struct Foo {}\n\nfn bar() -> i32 {\n    1\n}\n";
        let objs = parse_objects("src/lib.rs", src);
        // file object + struct + fn
        assert!(objs.iter().any(|o| o.kind == ObjectKind::File));
        assert!(objs.iter().any(|o| o.kind == ObjectKind::DefinitionClass && o.name == "Foo"));
        assert!(objs.iter().any(|o| o.kind == ObjectKind::DefinitionFunction && o.name == "bar"));
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn context_before_is_strictly_less_than_object_start_row() {
        let src = "mod outer {\n    fn inner() {\n        1;\n    }\n}\n";
        let objs = parse_objects("src/lib.rs", src);
        let inner = objs.iter().find(|o| o.name == "inner").unwrap();
        for &row in &inner.context_before {
            assert!(row < inner.start_row());
        }
    }

    #[test]
    fn render_object_never_includes_context_after() {
        let obj = Object {
            id: Some(1),
            path: "a.rs".into(),
            name: "f".into(),
            language: "rust".into(),
            kind: ObjectKind::DefinitionFunction,
            byte_range: (0, 1),
            coordinates: ((1, 0), (1, 1)),
            context_before: vec![0],
            context_after: vec![2],
        };
        let lines = ["mod m {", "  x", "}"];
        let rendered = render_object(&obj, &lines, true, false, false);
        assert!(!rendered.contains('}'));
        assert_eq!(rendered, "mod m {\n  x");
    }
}
