use serde::Serialize;

/// Half-open byte range into the displayed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Derived navigation state for one processed document. Rebuilt, never edited.
#[derive(Debug, Clone, Default)]
pub struct NavigationIndex {
    text: String,
    spans: Vec<Span>,
    paragraphs: Vec<Vec<usize>>,
    sentence_paragraph: Vec<usize>,
}

impl NavigationIndex {
    pub fn new(text: String, spans: Vec<Span>, paragraphs: Vec<Vec<usize>>) -> Self {
        let mut sentence_paragraph = vec![0; spans.len()];
        for (p, sentences) in paragraphs.iter().enumerate() {
            for &i in sentences {
                if let Some(slot) = sentence_paragraph.get_mut(i) {
                    *slot = p;
                }
            }
        }

        Self {
            text,
            spans,
            paragraphs,
            sentence_paragraph,
        }
    }

    pub fn displayed_text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn span(&self, i: usize) -> Option<Span> {
        self.spans.get(i).copied()
    }

    pub fn text(&self, i: usize) -> Option<&str> {
        self.span(i).map(|s| &self.text[s.start..s.end])
    }

    pub fn sentences(&self) -> Vec<&str> {
        self.spans.iter().map(|s| &self.text[s.start..s.end]).collect()
    }

    pub fn paragraph_sentence_map(&self) -> &[Vec<usize>] {
        &self.paragraphs
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn paragraph_of(&self, i: usize) -> Option<usize> {
        self.sentence_paragraph.get(i).copied()
    }

    /// First and last sentence index of paragraph `p`.
    pub fn paragraph_bounds(&self, p: usize) -> Option<(usize, usize)> {
        let sentences = self.paragraphs.get(p)?;
        Some((*sentences.first()?, *sentences.last()?))
    }

    /// Sentence under a byte offset. An offset between two sentences maps to
    /// the following one; past the last sentence there is none.
    pub fn sentence_at(&self, offset: usize) -> Option<usize> {
        let i = self.spans.partition_point(|s| s.end <= offset);
        (i < self.spans.len()).then_some(i)
    }

    /// Sentence index of the first sentence starting at or after `offset`.
    pub fn sentence_from(&self, offset: usize) -> Option<usize> {
        let i = self.spans.partition_point(|s| s.start < offset);
        (i < self.spans.len()).then_some(i)
    }

    /// Byte offset of a character offset, for UIs that count characters.
    pub fn char_to_byte(&self, char_offset: usize) -> Option<usize> {
        if char_offset == self.text.chars().count() {
            return Some(self.text.len());
        }
        self.text.char_indices().nth(char_offset).map(|(b, _)| b)
    }

    pub fn byte_to_char(&self, byte_offset: usize) -> usize {
        let end = byte_offset.min(self.text.len());
        self.text
            .char_indices()
            .take_while(|(b, _)| *b < end)
            .count()
    }

    /// Sentence `i` in character offsets.
    pub fn char_span(&self, i: usize) -> Option<(usize, usize)> {
        let span = self.span(i)?;
        let start = self.byte_to_char(span.start);
        let len = self.text[span.start..span.end].chars().count();
        Some((start, start + len))
    }

    pub fn sentence_at_char(&self, char_offset: usize) -> Option<usize> {
        self.sentence_at(self.char_to_byte(char_offset)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{paragraph_map, ParagraphEvidence, RuleSentenceTokenizer, SentenceTokenizer};
    use proptest::prelude::*;

    fn build(text: &str) -> NavigationIndex {
        let spans: Vec<Span> = RuleSentenceTokenizer::default()
            .span_tokenize(text)
            .into_iter()
            .map(|(start, end)| Span { start, end })
            .collect();
        let paragraphs = paragraph_map(text, &spans, &ParagraphEvidence::BlankLines);
        NavigationIndex::new(text.to_string(), spans, paragraphs)
    }

    #[test]
    fn test_lookups() {
        let nav = build("Café is open. Come in.\n\nThe end.");
        assert_eq!(nav.len(), 3);
        assert_eq!(nav.text(1), Some("Come in."));
        assert_eq!(nav.paragraph_of(2), Some(1));
        assert_eq!(nav.paragraph_bounds(0), Some((0, 1)));
        assert_eq!(nav.paragraph_bounds(5), None);

        // "é" is two bytes, so character and byte offsets diverge after it.
        assert_eq!(nav.span(1), Some(Span { start: 15, end: 23 }));
        assert_eq!(nav.char_span(1), Some((14, 22)));
        assert_eq!(nav.char_to_byte(14), Some(15));
        assert_eq!(nav.sentence_at_char(14), Some(1));

        assert_eq!(nav.sentence_at(0), Some(0));
        assert_eq!(nav.sentence_at(14), Some(1));
        assert_eq!(nav.sentence_at(1000), None);
        assert_eq!(nav.sentence_from(1), Some(1));
    }

    #[test]
    fn test_empty_index() {
        let nav = NavigationIndex::default();
        assert!(nav.is_empty());
        assert_eq!(nav.sentence_at(0), None);
        assert_eq!(nav.paragraph_of(0), None);
        assert_eq!(nav.char_to_byte(0), Some(0));
    }

    proptest! {
        #[test]
        fn prop_spans_round_trip_and_paragraphs_partition(
            words in prop::collection::vec("[A-Za-z]{1,8}[.!?]?", 0..40),
            breaks in prop::collection::vec(0u8..4, 0..40),
        ) {
            let mut text = String::new();
            for (i, word) in words.iter().enumerate() {
                if i > 0 {
                    text.push_str(match breaks.get(i).copied().unwrap_or(0) {
                        0 | 1 => " ",
                        2 => "\n",
                        _ => "\n\n",
                    });
                }
                text.push_str(word);
            }

            let nav = build(&text);
            let sentences = RuleSentenceTokenizer::default().tokenize(&text);
            prop_assert_eq!(nav.len(), sentences.len());
            for (i, sentence) in sentences.iter().enumerate() {
                prop_assert_eq!(nav.text(i), Some(sentence.as_str()));
            }
            for pair in nav.spans().windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }

            let flat: Vec<usize> = nav.paragraph_sentence_map().iter().flatten().copied().collect();
            prop_assert_eq!(flat, (0..nav.len()).collect::<Vec<_>>());
        }
    }
}
