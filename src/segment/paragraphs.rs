use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::navigation::Span;

/// What marks a paragraph break in the displayed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParagraphEvidence {
    /// A blank line between two sentences (PDF and plain text).
    BlankLines,
    /// Byte ranges of the structural blocks (EPUB headings, paragraphs, list items).
    Blocks(Vec<Range<usize>>),
}

fn blank_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("valid blank-line regex"))
}

/// Group sentence indices into paragraphs. Every index `0..spans.len()`
/// appears exactly once, in order.
pub fn paragraph_map(text: &str, spans: &[Span], evidence: &ParagraphEvidence) -> Vec<Vec<usize>> {
    match evidence {
        ParagraphEvidence::BlankLines => by_blank_lines(text, spans),
        ParagraphEvidence::Blocks(blocks) => by_blocks(spans, blocks),
    }
}

fn by_blank_lines(text: &str, spans: &[Span]) -> Vec<Vec<usize>> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();

    for (i, span) in spans.iter().enumerate() {
        current.push(i);
        let boundary = match spans.get(i + 1) {
            Some(next) => blank_line_re().is_match(&text[span.end..next.start]),
            None => true,
        };
        if boundary {
            paragraphs.push(std::mem::take(&mut current));
        }
    }
    paragraphs
}

fn by_blocks(spans: &[Span], blocks: &[Range<usize>]) -> Vec<Vec<usize>> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_block: Option<usize> = None;

    for (i, span) in spans.iter().enumerate() {
        let last_byte = span.end.saturating_sub(1);
        let block = blocks.iter().position(|b| b.contains(&last_byte));

        if let (Some(block), Some(open)) = (block, current_block) {
            if block != open && !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        }
        if block.is_some() {
            current_block = block;
        }
        current.push(i);
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}
