//! Separator-priority text splitter.
//!
//! Splits a text blob into pieces of at most `max_size` characters, breaking
//! on the largest separator that still yields small enough pieces: paragraph
//! break, line break, sentence end, space, and finally a hard character
//! boundary. Separators stay attached to the preceding piece, so
//! concatenating the pieces reproduces the input byte for byte.
//!
//! Consecutive windows carry `overlap` characters of trailing context from
//! the text before them, preserving continuity across a chunk boundary.
//! Sizes are measured in characters, not bytes, so multi-byte input never
//! splits inside a code point.

use crate::models::Chunk;

/// Separator priority, largest first. The empty fallback is a hard
/// character split handled separately.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into overlapping windows of at most `max_size + overlap`
/// characters. Requires `overlap < max_size`; returns an empty vector for
/// empty input and never fails otherwise.
pub fn split_text(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < max_size, "overlap must be smaller than max_size");
    if text.is_empty() {
        return Vec::new();
    }

    let pieces = split_bounded(text, max_size, &SEPARATORS);

    if overlap == 0 {
        return pieces;
    }

    // Prefix each piece (after the first) with the trailing `overlap`
    // characters of everything before it.
    let mut windows = Vec::with_capacity(pieces.len());
    let mut tail: Vec<char> = Vec::with_capacity(overlap);
    for (i, piece) in pieces.iter().enumerate() {
        if i == 0 {
            windows.push(piece.clone());
        } else {
            let mut window: String = tail.iter().collect();
            window.push_str(piece);
            windows.push(window);
        }
        for ch in piece.chars() {
            if tail.len() == overlap {
                tail.remove(0);
            }
            tail.push(ch);
        }
    }
    windows
}

/// Recursively split `text` into pieces of at most `max` characters using
/// the given separator priority list. Concatenation of the result equals
/// the input.
fn split_bounded(text: &str, max: usize, seps: &[&str]) -> Vec<String> {
    if char_len(text) <= max {
        return vec![text.to_string()];
    }

    let Some((sep, rest)) = seps.split_first() else {
        return hard_split(text, max);
    };

    let parts = split_keep_sep(text, sep);
    if parts.len() == 1 {
        return split_bounded(text, max, rest);
    }

    // Greedily merge adjacent parts up to `max`; oversized parts recurse
    // with the next separator.
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;
    for part in parts {
        let part_len = char_len(&part);
        if part_len > max {
            if !buf.is_empty() {
                out.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            out.extend(split_bounded(&part, max, rest));
        } else if buf_len + part_len > max {
            out.push(std::mem::replace(&mut buf, part));
            buf_len = part_len;
        } else {
            buf.push_str(&part);
            buf_len += part_len;
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

/// Split on `sep`, keeping the separator attached to the preceding part.
/// Never produces empty parts.
fn split_keep_sep(text: &str, sep: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(pos) = text[start..].find(sep) {
        let end = start + pos + sep.len();
        parts.push(text[start..end].to_string());
        start = end;
    }
    if start < text.len() {
        parts.push(text[start..].to_string());
    }
    parts
}

/// Last-resort split at every `max` characters, respecting char boundaries.
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        if count == max {
            out.push(std::mem::take(&mut buf));
            count = 0;
        }
        buf.push(ch);
        count += 1;
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Chunk a document's pages, skipping blank pages and assigning global
/// zero-based chunk indices. `pages` pairs an optional 1-based page number
/// with the page's raw text (unpaginated formats pass a single `None` page).
pub fn chunk_pages(
    document_id: &str,
    pages: &[(Option<u32>, String)],
    max_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut index: i64 = 0;
    for (page_number, text) in pages {
        if text.trim().is_empty() {
            continue;
        }
        for window in split_text(text, max_size, overlap) {
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                chunk_index: index,
                page_number: *page_number,
                text: window,
            });
            index += 1;
        }
    }
    chunks
}
