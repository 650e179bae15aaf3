//! Search Engine (spec.md §4.8).
//!
//! Query parsing (quoted phrases + bareword keywords), per-object highlight
//! spans, and the hybrid semantic/full-text merge. The default merge policy
//! is rank-order with name-match promotion; the original tool's
//! distance-times-bm25 weighting is kept behind the `legacy-merge` feature.

use crate::embeddings::EmbeddingClient;
use crate::error::{Error, Result};
use crate::indexer;
use crate::models::{ByteRange, Object, RepoPaths};
use crate::parser;
use crate::stats::Stats;
use crate::storage;
use crate::vector_index::VectorIndex;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub phrases: Vec<String>,
    pub keywords: Vec<String>,
}

impl ParsedQuery {
    pub fn terms(&self) -> Vec<String> {
        self.phrases.iter().chain(self.keywords.iter()).cloned().collect()
    }

    fn is_empty(&self) -> bool {
        self.phrases.is_empty() && self.keywords.is_empty()
    }
}

/// Splits `input` into double-quoted phrases (`\"` escapes a literal quote)
/// and whitespace-separated keywords. A linear one-pass scan over `chars` —
/// no regex, so it cannot backtrack on pathological input.
pub fn parse_query(input: &str) -> ParsedQuery {
    let chars: Vec<char> = input.chars().collect();
    let mut phrases = Vec::new();
    let mut keywords = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '"' => {
                i += 1;
                let mut phrase = String::new();
                while i < chars.len() {
                    if chars[i] == '\\' && i + 1 < chars.len() && chars[i + 1] == '"' {
                        phrase.push('"');
                        i += 2;
                        continue;
                    }
                    if chars[i] == '"' {
                        i += 1;
                        break;
                    }
                    phrase.push(chars[i]);
                    i += 1;
                }
                if !phrase.is_empty() {
                    phrases.push(phrase);
                }
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    keywords.push(std::mem::take(&mut current));
                }
                i += 1;
            }
            c => {
                current.push(c);
                i += 1;
            }
        }
    }
    if !current.is_empty() {
        keywords.push(current);
    }
    ParsedQuery { phrases, keywords }
}

fn fts_match_expression(parsed: &ParsedQuery) -> String {
    parsed
        .terms()
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// An FTS5 column-filter expression restricting the match to a single
/// column, e.g. `name : "foo" bar`.
fn column_match_expression(column: &str, parsed: &ParsedQuery) -> String {
    format!("{} : {}", column, fts_match_expression(parsed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight {
    pub byte_range: ByteRange,
    pub line_range: (usize, usize),
}

/// Case-insensitive literal substring search, independently per term.
/// Overlapping or touching spans are merged; the result is sorted by start.
pub fn find_highlights(content: &str, terms: &[String]) -> Vec<Highlight> {
    let lower_content = content.to_lowercase();
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for term in terms {
        if term.is_empty() {
            continue;
        }
        let lower_term = term.to_lowercase();
        let mut cursor = 0;
        while cursor <= lower_content.len() {
            let Some(pos) = lower_content[cursor..].find(&lower_term) else { break };
            let start = cursor + pos;
            let end = start + lower_term.len();
            spans.push((start, end));
            cursor = start + 1;
        }
    }

    spans.sort_by_key(|s| s.0);
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    merged
        .into_iter()
        .map(|(start, end)| Highlight { byte_range: (start, end), line_range: line_range(content, start, end) })
        .collect()
}

fn line_range(content: &str, start: usize, end: usize) -> (usize, usize) {
    let clamp = |i: usize| i.min(content.len());
    let start_line = content[..clamp(start)].matches('\n').count();
    let end_line = content[..clamp(end)].matches('\n').count();
    (start_line, end_line)
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub object: Object,
    pub score: f32,
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub semantic: bool,
    pub full_text: bool,
    /// Skip the remote embedding provider call for the query text; semantic
    /// ranking is dropped rather than reaching the network.
    pub cached_only: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions { top_k: 10, semantic: true, full_text: true, cached_only: false }
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct CacheKey {
    query: String,
    top_k: usize,
    semantic: bool,
    full_text: bool,
}

/// Process-local cache keyed by query + flags, cleared whenever the Indexer
/// commits (spec.md §4.8; the committed data a cached result reflects may
/// otherwise go stale).
#[derive(Default)]
pub struct SearchCache {
    entries: Mutex<HashMap<CacheKey, Vec<(i64, f32)>>>,
}

impl SearchCache {
    pub fn new() -> Self {
        SearchCache::default()
    }

    fn get(&self, key: &CacheKey) -> Option<Vec<(i64, f32)>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: CacheKey, value: Vec<(i64, f32)>) {
        self.entries.lock().unwrap().insert(key, value);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

pub struct SearchEngine<'a> {
    pub paths: &'a RepoPaths,
    pub vector_index: &'a Mutex<VectorIndex>,
    pub provider: &'a dyn EmbeddingClient,
    pub cache: &'a SearchCache,
    pub stats: &'a Stats,
}

impl<'a> SearchEngine<'a> {
    pub fn search(&self, conn: &Connection, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let cache_key = CacheKey {
            query: query.to_string(),
            top_k: opts.top_k,
            semantic: opts.semantic,
            full_text: opts.full_text,
        };
        if let Some(ranked) = self.cache.get(&cache_key) {
            self.stats.record_cache_hit();
            return self.hydrate(conn, ranked, query);
        }
        self.stats.record_cache_miss();

        let parsed = parse_query(query);

        let semantic_ranked: Vec<(i64, f32)> = if opts.semantic && !opts.cached_only && !parsed.is_empty() {
            match self.provider.embed(&[query.to_string()]) {
                Ok(mut vectors) => {
                    let vector = vectors.remove(0);
                    let index = self.vector_index.lock().unwrap();
                    let k = (opts.top_k * 4).max(opts.top_k);
                    let (distances, ids) = index.search(&vector, k);
                    ids.into_iter()
                        .zip(distances)
                        .filter(|(id, _)| *id != crate::vector_index::SENTINEL_ID)
                        .collect()
                }
                Err(_) => Vec::new(),
            }
        } else {
            Vec::new()
        };

        // spec.md §4.8: name and content are ranked by two independent FTS
        // queries rather than one combined match, so a name-column hit can
        // be told apart from a content-column hit of the same object.
        let (fts_ranked, name_hits): (Vec<(i64, f32)>, HashSet<i64>) = if opts.full_text && !parsed.is_empty() {
            let limit = (opts.top_k * 4).max(opts.top_k) as i64;
            let name_rows = query_fts_column(conn, "name", &parsed, limit)?;
            let content_rows = query_fts_column(conn, "content", &parsed, limit)?;

            let name_hits: HashSet<i64> = name_rows.iter().map(|(id, _)| *id).collect();

            let mut seen = HashSet::new();
            let mut ranked = Vec::new();
            for (id, score) in name_rows.into_iter().chain(content_rows) {
                if seen.insert(id) {
                    ranked.push((id, score));
                }
            }
            ranked.truncate(limit as usize);
            (ranked, name_hits)
        } else {
            (Vec::new(), HashSet::new())
        };

        let merged = merge(&semantic_ranked, &fts_ranked, &name_hits, opts.top_k)?;
        self.cache.put(cache_key, merged.clone());
        self.hydrate(conn, merged, query)
    }

    fn hydrate(&self, conn: &Connection, ranked: Vec<(i64, f32)>, query: &str) -> Result<Vec<SearchResult>> {
        let parsed = parse_query(query);
        let terms = parsed.terms();
        let mut results = Vec::with_capacity(ranked.len());
        for (id, score) in ranked {
            let Some(object) = storage::get_object(conn, id)? else { continue };
            let rendered = match self.render(conn, &object) {
                Ok(Some(text)) => text,
                Ok(None) => object.name.clone(),
                Err(Error::BadFile(_)) => continue,
                Err(e) => return Err(e),
            };
            let highlights = find_highlights(&rendered, &terms);
            results.push(SearchResult { object, score, highlights });
        }
        Ok(results)
    }

    /// Re-renders an object's source text for highlighting, discarding it
    /// (`Error::BadFile`) if the file's current content no longer matches
    /// its stored digest (spec.md §4.8: stale objects aren't surfaced).
    /// Returns `Ok(None)` if the file has since moved, which isn't staleness.
    fn render(&self, conn: &Connection, object: &Object) -> Result<Option<String>> {
        let path = self.paths.root.join(&object.path);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };
        if let Some(file_row) = storage::get_file(conn, &object.path)? {
            if parser::sha256_hex(&bytes).as_bytes() != file_row.sha256_digest.as_slice() {
                return Err(Error::BadFile(path));
            }
        }
        let text = indexer::decode_text(&bytes);
        let lines = parser::lines_of(&text);
        Ok(Some(parser::render_object(object, &lines, true, false, false)))
    }
}

fn query_fts_column(conn: &Connection, column: &str, parsed: &ParsedQuery, limit: i64) -> Result<Vec<(i64, f32)>> {
    let expr = column_match_expression(column, parsed);
    let mut stmt = conn.prepare("SELECT rowid, bm25(fts) FROM fts WHERE fts MATCH ?1 ORDER BY bm25(fts) LIMIT ?2")?;
    let rows = stmt.query_map(rusqlite::params![expr, limit], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f32>(1)?)))?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

/// Default rank-order merge: the semantic ranking is taken as the base
/// order, with any full-text hits absent from it appended afterwards in
/// full-text rank order, then objects whose name exactly matches a query
/// term are stably promoted to the front. E.g. semantic `[A,B,C]` and
/// full-text `[B,D,A]` with `B` matching the query by name merge to
/// `[B,A,C,D]`: union order is `[A,B,C,D]` (semantic, then the
/// full-text-only `D` appended), then `B` is promoted ahead.
#[cfg(not(feature = "legacy-merge"))]
fn merge(
    semantic: &[(i64, f32)],
    fts: &[(i64, f32)],
    name_hits: &HashSet<i64>,
    top_k: usize,
) -> Result<Vec<(i64, f32)>> {
    let semantic_scores: HashMap<i64, f32> = semantic.iter().cloned().collect();
    let fts_scores: HashMap<i64, f32> = fts.iter().cloned().collect();

    let mut order: Vec<i64> = semantic.iter().map(|(id, _)| *id).collect();
    let mut seen: HashSet<i64> = order.iter().copied().collect();
    for (id, _) in fts {
        if seen.insert(*id) {
            order.push(*id);
        }
    }

    let (promoted, rest): (Vec<i64>, Vec<i64>) = order.into_iter().partition(|id| name_hits.contains(id));
    let mut final_order = promoted;
    final_order.extend(rest);
    final_order.truncate(top_k);

    Ok(final_order
        .into_iter()
        .map(|id| (id, semantic_scores.get(&id).copied().unwrap_or(fts_scores.get(&id).copied().unwrap_or(0.0))))
        .collect())
}

/// The original tool's weighting: `l2_distance * bm25_score` over the
/// intersection of both ranked lists, ascending (lower is better for both
/// inputs). Kept for compatibility, not the default.
#[cfg(feature = "legacy-merge")]
fn merge(
    semantic: &[(i64, f32)],
    fts: &[(i64, f32)],
    _name_hits: &HashSet<i64>,
    top_k: usize,
) -> Result<Vec<(i64, f32)>> {
    let fts_scores: HashMap<i64, f32> = fts.iter().cloned().collect();
    let mut scored: Vec<(i64, f32)> = semantic
        .iter()
        .filter_map(|(id, l2)| fts_scores.get(id).map(|bm25| (*id, l2 * bm25)))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_phrase_and_keywords() {
        let parsed = parse_query("\"hello world\" foo bar");
        assert_eq!(parsed.phrases, vec!["hello world".to_string()]);
        assert_eq!(parsed.keywords, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn parses_escaped_quote_inside_phrase() {
        let parsed = parse_query("\"say \\\"hi\\\"\"");
        assert_eq!(parsed.phrases, vec!["say \"hi\"".to_string()]);
    }

    #[test]
    fn pathological_input_does_not_hang() {
        let input = format!("{}{}", "\"".repeat(200), "a ".repeat(200));
        let _ = parse_query(&input);
    }

    #[test]
    fn highlights_merge_overlapping_spans() {
        let content = "foobar";
        let terms = vec!["foo".to_string(), "oba".to_string()];
        let highlights = find_highlights(content, &terms);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].byte_range, (0, 6));
    }

    #[test]
    fn highlights_are_case_insensitive() {
        let highlights = find_highlights("Hello World", &["hello".to_string()]);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].byte_range, (0, 5));
    }

    #[test]
    fn highlights_span_a_quoted_phrase_and_a_keyword() {
        let content = "have you been to sea world? hello";
        let parsed = parse_query("\"sea world\" hello");
        let highlights = find_highlights(content, &parsed.terms());
        let spans: Vec<ByteRange> = highlights.iter().map(|h| h.byte_range).collect();
        assert_eq!(spans, vec![(17, 26), (28, 33)]);
    }

    #[test]
    #[cfg(not(feature = "legacy-merge"))]
    fn merge_promotes_a_name_match_ahead_of_rank_order() {
        let (a, b, c, d) = (1i64, 2i64, 3i64, 4i64);

        let semantic = vec![(a, 0.1), (b, 0.2), (c, 0.3)];
        let fts = vec![(b, 3.0), (d, 2.0), (a, 1.0)];
        let name_hits: HashSet<i64> = [b].into_iter().collect();

        let merged = merge(&semantic, &fts, &name_hits, 10).unwrap();
        let order: Vec<i64> = merged.into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![b, a, c, d]);
    }
}
