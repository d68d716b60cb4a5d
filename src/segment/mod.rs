pub mod clean;
pub mod paragraphs;
pub mod tokenizer;

use tracing::info;

use crate::config::PipelineConfig;
use crate::navigation::{NavigationIndex, Span};

pub use self::paragraphs::{paragraph_map, ParagraphEvidence};
pub use self::tokenizer::{RuleSentenceTokenizer, SentenceTokenizer};

/// One engine for every source; only the paragraph evidence differs.
#[derive(Debug, Clone)]
pub struct Resegmenter<T: SentenceTokenizer = RuleSentenceTokenizer> {
    tokenizer: T,
    chapter_keywords: Vec<String>,
}

impl Resegmenter<RuleSentenceTokenizer> {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            RuleSentenceTokenizer::from_config(&config.tokenizer),
            config.chapter_keywords.clone(),
        )
    }
}

impl<T: SentenceTokenizer> Resegmenter<T> {
    pub fn new(tokenizer: T, chapter_keywords: Vec<String>) -> Self {
        Self {
            tokenizer,
            chapter_keywords,
        }
    }

    /// Cleaning pass for PDF and plain-text input.
    pub fn canonical_text(&self, raw: &str) -> String {
        clean::clean_text(raw, &self.tokenizer, &self.chapter_keywords)
    }

    /// Tokenize `displayed` (which must be final) and group the sentences.
    pub fn index(&self, displayed: String, evidence: &ParagraphEvidence) -> NavigationIndex {
        let spans: Vec<Span> = self
            .tokenizer
            .span_tokenize(&displayed)
            .into_iter()
            .map(|(start, end)| Span { start, end })
            .collect();
        let paragraphs = paragraph_map(&displayed, &spans, evidence);

        info!(
            "Segmented {} characters into {} sentences, {} paragraphs",
            displayed.chars().count(),
            spans.len(),
            paragraphs.len()
        );
        NavigationIndex::new(displayed, spans, paragraphs)
    }

    /// Clean, then index with blank-line paragraph evidence.
    pub fn resegment(&self, raw: &str) -> NavigationIndex {
        let displayed = self.canonical_text(raw);
        self.index(displayed, &ParagraphEvidence::BlankLines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resegment_round_trip() {
        let engine = Resegmenter::from_config(&PipelineConfig::default());
        let nav = engine.resegment("Hello Mr. Smith.\nHe left.\n\nThe end. Chapter 2 Begins here.");

        assert_eq!(
            nav.displayed_text(),
            "Hello Mr. Smith. He left.\n\nThe end.\n\nChapter 2 Begins here."
        );
        assert_eq!(nav.len(), 4);
        assert_eq!(nav.text(0), Some("Hello Mr. Smith."));
        assert_eq!(nav.paragraph_sentence_map(), &[vec![0, 1], vec![2], vec![3]]);
    }

    #[test]
    fn test_empty_input_gives_empty_index() {
        let engine = Resegmenter::from_config(&PipelineConfig::default());
        let nav = engine.resegment("   ");
        assert!(nav.is_empty());
        assert!(nav.paragraph_sentence_map().is_empty());
    }
}
