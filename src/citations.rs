//! Source-citation micro-format.
//!
//! Retrieval results are rendered into the observation text handed back to
//! the chat model as delimited blocks:
//!
//! ```text
//! <metadata_source_1>
//! filename:report.pdf
//! page:3
//! score:0.87
//! </metadata_source_1>
//! <chunk text>
//! ---
//! <metadata_source_2>
//! ...
//! ```
//!
//! This format is a durable contract between the retrieval tool and the
//! query orchestrator: the renderer and the parser below must change
//! together. Citations are primarily carried as structured [`Source`]
//! records alongside each observation; the parser exists for transcripts
//! that carry tags without that side-channel (e.g. replayed history).

use crate::models::{SearchHit, Source};

/// Divider between rendered result blocks.
pub const BLOCK_DIVIDER: &str = "\n---\n";

const TAG_OPEN: &str = "<metadata_source_";

/// Page label used when a hit has no page number.
pub const PAGE_NA: &str = "N/A";

/// The citation a hit contributes.
pub fn hit_source(hit: &SearchHit) -> Source {
    Source {
        filename: hit.filename.clone(),
        page: hit
            .page_number
            .map(|p| p.to_string())
            .unwrap_or_else(|| PAGE_NA.to_string()),
        score: hit.score,
    }
}

/// Render hits as citation-tagged context blocks, in rank order.
pub fn render_blocks(hits: &[SearchHit]) -> String {
    let blocks: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let n = i + 1;
            let source = hit_source(hit);
            format!(
                "<metadata_source_{n}>\nfilename:{}\npage:{}\nscore:{:.2}\n</metadata_source_{n}>\n{}",
                source.filename, source.page, source.score, hit.text
            )
        })
        .collect();
    blocks.join(BLOCK_DIVIDER)
}

/// Parse every source tag found in `text`, in order of appearance.
///
/// Malformed blocks (missing fields, unparsable score) are skipped rather
/// than failing the whole scan.
pub fn parse_source_tags(text: &str) -> Vec<Source> {
    let mut sources = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(TAG_OPEN) {
        let block = &rest[start..];
        // Advance past this opening tag regardless of parse outcome.
        let after = &block[TAG_OPEN.len()..];
        if let Some(source) = parse_one_tag(block) {
            sources.push(source);
        }
        rest = after;
    }
    sources
}

/// Parse a single block starting at `<metadata_source_N>`.
fn parse_one_tag(block: &str) -> Option<Source> {
    let body_start = block.find('>')? + 1;
    let body = &block[body_start..];

    let mut filename = None;
    let mut page = None;
    let mut score = None;
    for line in body.lines() {
        if let Some(v) = line.strip_prefix("filename:") {
            filename = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("page:") {
            page = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("score:") {
            score = v.trim().parse::<f32>().ok();
        } else if line.starts_with("</metadata_source_") {
            break;
        }
    }

    Some(Source {
        filename: filename?,
        page: page?,
        score: score?,
    })
}

/// De-duplicate by (filename, page), keeping the first score seen for each
/// pair and the order of first appearance.
pub fn dedup_sources<I: IntoIterator<Item = Source>>(sources: I) -> Vec<Source> {
    let mut out: Vec<Source> = Vec::new();
    for source in sources {
        let seen = out
            .iter()
            .any(|s| s.filename == source.filename && s.page == source.page);
        if !seen {
            out.push(source);
        }
    }
    out
}
