//! Markdown chunking for index nodes
//!
//! Splits parsed markdown into chunks that respect heading and sentence
//! boundaries, with stable hashes so re-indexing the same content produces
//! identical nodes.

use crate::config::ChunkConfig;
use blake3::Hasher;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use unicode_segmentation::UnicodeSegmentation;

/// A text chunk destined for the vector index
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content
    pub text: String,

    /// Chunk index (0-based)
    pub index: usize,

    /// Heading breadcrumb above this chunk
    pub headings: Vec<String>,

    /// Blake3 hash of the chunk text
    pub hash: String,
}

/// A heading in the markdown source
#[derive(Debug, Clone)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub position: usize,
}

/// Compute a stable hash for a string
pub fn compute_text_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Extract headings with their byte positions from markdown
pub fn extract_headings(markdown: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut current: Option<(u8, usize, String)> = None;

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((level as u8, range.start, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, buf)) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, position, text)) = current.take() {
                    headings.push(Heading {
                        level,
                        text,
                        position,
                    });
                }
            }
            _ => {}
        }
    }

    headings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreakPriority {
    Sentence,
    Paragraph,
    Heading,
}

#[derive(Debug, Clone, Copy)]
struct BreakPoint {
    position: usize,
    priority: BreakPriority,
}

/// Chunk markdown text into index nodes
pub fn chunk_markdown(text: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let headings = extract_headings(text);
    let breaks = find_break_points(text, &headings, config);

    let mut pieces: Vec<(usize, String)> = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let target = start + config.max_chars;
        let end = if target >= text.len() {
            text.len()
        } else {
            best_break(text, start, target, &breaks)
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            pieces.push((start, piece.to_string()));
        }
        start = end;
    }

    // Fold undersized trailing pieces into their predecessor so no content
    // is dropped and no tiny chunks reach the index.
    let mut merged: Vec<(usize, String)> = Vec::new();
    for (pos, piece) in pieces {
        match merged.last_mut() {
            Some((_, prev)) if piece.len() < config.min_chars => {
                prev.push_str("\n\n");
                prev.push_str(&piece);
            }
            _ => merged.push((pos, piece)),
        }
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(index, (pos, piece))| {
            let hash = compute_text_hash(&piece);
            TextChunk {
                headings: breadcrumb_at(&headings, pos),
                text: piece,
                index,
                hash,
            }
        })
        .collect()
}

/// Collect candidate break positions, highest priority last on ties
fn find_break_points(text: &str, headings: &[Heading], config: &ChunkConfig) -> Vec<BreakPoint> {
    let mut points = Vec::new();

    if config.prefer_heading_boundaries {
        for heading in headings {
            if heading.position > 0 {
                points.push(BreakPoint {
                    position: heading.position,
                    priority: BreakPriority::Heading,
                });
            }
        }
    }

    for (i, _) in text.match_indices("\n\n") {
        points.push(BreakPoint {
            position: i + 2,
            priority: BreakPriority::Paragraph,
        });
    }

    for (i, _) in text.split_sentence_bound_indices() {
        if i > 0 {
            points.push(BreakPoint {
                position: i,
                priority: BreakPriority::Sentence,
            });
        }
    }

    // On position ties keep the strongest candidate
    points.sort_by_key(|p| (p.position, std::cmp::Reverse(p.priority)));
    points.dedup_by_key(|p| p.position);
    points
}

/// Best break position in the window between half and full chunk size
fn best_break(text: &str, start: usize, target: usize, breaks: &[BreakPoint]) -> usize {
    let min_pos = start + (target - start) / 2;

    let best = breaks
        .iter()
        .filter(|p| p.position > min_pos && p.position <= target)
        .max_by_key(|p| (p.priority, p.position));

    match best {
        Some(p) => p.position,
        None => floor_char_boundary(text, target),
    }
}

fn floor_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut adjusted = pos;
    while adjusted > 0 && !text.is_char_boundary(adjusted) {
        adjusted -= 1;
    }
    adjusted
}

/// Heading breadcrumb in effect at a byte position
fn breadcrumb_at(headings: &[Heading], pos: usize) -> Vec<String> {
    let mut stack: Vec<&Heading> = Vec::new();
    for heading in headings.iter().filter(|h| h.position <= pos) {
        while stack
            .last()
            .map(|top| top.level >= heading.level)
            .unwrap_or(false)
        {
            stack.pop();
        }
        stack.push(heading);
    }
    stack.into_iter().map(|h| h.text.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ChunkConfig {
        ChunkConfig {
            max_chars: 200,
            min_chars: 20,
            prefer_heading_boundaries: true,
        }
    }

    #[test]
    fn test_short_document_is_one_chunk() {
        let chunks = chunk_markdown("Just a short note.", &test_config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Just a short note.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        assert!(chunk_markdown("", &test_config()).is_empty());
        assert!(chunk_markdown("   \n\n  ", &test_config()).is_empty());
    }

    #[test]
    fn test_long_document_splits_within_budget() {
        let text = "One short sentence here. ".repeat(60);
        let config = test_config();
        let chunks = chunk_markdown(&text, &config);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // An undersized tail may be folded into its predecessor
            assert!(chunk.text.len() <= config.max_chars + config.min_chars + 2);
            assert!(chunk.text.len() >= config.min_chars);
        }
    }

    #[test]
    fn test_heading_breadcrumb() {
        let text = format!(
            "# Guide\n\n{}\n\n## Returns\n\n{}",
            "Intro paragraph about the product. ".repeat(8),
            "Returns are accepted within thirty days. ".repeat(8)
        );
        let chunks = chunk_markdown(&text, &test_config());

        let last = chunks.last().unwrap();
        assert_eq!(last.headings, vec!["Guide", "Returns"]);
        assert_eq!(chunks[0].headings, vec!["Guide"]);
    }

    #[test]
    fn test_chunks_are_deterministic() {
        let text = "## Section\n\nSome repeated content here. ".repeat(20);
        let a = chunk_markdown(&text, &test_config());
        let b = chunk_markdown(&text, &test_config());
        assert_eq!(a, b);
        assert_eq!(a[0].hash, b[0].hash);
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "Der Käufer erhält die Ware innerhalb von vierzehn Tagen zurück. ".repeat(30);
        let chunks = chunk_markdown(&text, &test_config());
        assert!(!chunks.is_empty());
    }
}
