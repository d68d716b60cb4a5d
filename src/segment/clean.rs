use regex::Regex;
use std::sync::OnceLock;

use super::tokenizer::SentenceTokenizer;

/// Stands in for a paragraph break while the text is tokenized.
pub const PARAGRAPH_MARK: char = '\u{2029}';

fn blank_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n\s*").expect("valid blank-line regex"))
}

fn heading_re(keywords: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .flat_map(|k| {
            let k = k.trim().to_lowercase();
            let mut capitalized = k.clone();
            if let Some(first) = capitalized.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            [regex::escape(&capitalized), regex::escape(&k.to_uppercase())]
        })
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(\S)([ \t]+)((?:{})\b)", alternatives.join("|"))).ok()
}

/// Put a blank line before capitalized chapter keywords that run on from the
/// previous sentence on the same line. A keyword after a lowercase letter or
/// comma is part of the sentence and left alone.
pub fn inject_heading_breaks(text: &str, keywords: &[String]) -> String {
    let Some(re) = heading_re(keywords) else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &regex::Captures| {
        let before = &caps[1];
        let in_sentence = before
            .chars()
            .next()
            .map_or(false, |c| c.is_lowercase() || c == ',');
        if in_sentence {
            caps[0].to_string()
        } else {
            format!("{}\n\n{}", before, &caps[3])
        }
    })
    .into_owned()
}

/// Collapse whitespace runs to single spaces.
pub fn flatten(sentence: &str) -> String {
    sentence.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical displayed text for PDF and plain-text sources: one line per
/// paragraph, sentences joined by single spaces, paragraphs separated by a
/// blank line.
pub fn clean_text<T: SentenceTokenizer + ?Sized>(text: &str, tokenizer: &T, keywords: &[String]) -> String {
    let text = text.replace("\r\n", "\n");
    let text = inject_heading_breaks(&text, keywords);
    let marked = blank_line_re().replace_all(&text, PARAGRAPH_MARK.to_string().as_str());

    let mut result = String::new();
    let mut previous_end = 0;

    for (start, end) in tokenizer.span_tokenize(&marked) {
        let sentence = flatten(&marked[start..end].replace(PARAGRAPH_MARK, " "));
        if sentence.is_empty() {
            previous_end = end;
            continue;
        }
        if !result.is_empty() {
            if marked[previous_end..start].contains(PARAGRAPH_MARK) {
                result.push_str("\n\n");
            } else {
                result.push(' ');
            }
        }
        result.push_str(&sentence);
        previous_end = end;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::segment::tokenizer::RuleSentenceTokenizer;

    fn keywords() -> Vec<String> {
        PipelineConfig::default().chapter_keywords
    }

    #[test]
    fn test_inject_heading_breaks() {
        let text = "The end. Chapter 2 Dawn came. See chapter 3, Chapter 4 and PROLOGUE.";
        assert_eq!(
            inject_heading_breaks(text, &keywords()),
            "The end.\n\nChapter 2 Dawn came. See chapter 3, Chapter 4 and PROLOGUE."
        );
    }

    #[test]
    fn test_clean_text_flattens_and_keeps_paragraphs() {
        let tokenizer = RuleSentenceTokenizer::default();
        let raw = "It was a dark\nand stormy night. The rain\nfell.\n\n  Second paragraph here.\n\n\nThird.";
        assert_eq!(
            clean_text(raw, &tokenizer, &keywords()),
            "It was a dark and stormy night. The rain fell.\n\nSecond paragraph here.\n\nThird."
        );
    }

    #[test]
    fn test_clean_text_empty() {
        let tokenizer = RuleSentenceTokenizer::default();
        assert_eq!(clean_text("  \n\n ", &tokenizer, &keywords()), "");
    }
}
