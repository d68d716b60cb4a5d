use std::collections::HashSet;

use crate::config::TokenizerConfig;

/// Sentence boundary detection
pub trait SentenceTokenizer: Send + Sync {
    /// Byte spans of each sentence, trimmed of surrounding whitespace
    fn span_tokenize(&self, text: &str) -> Vec<(usize, usize)>;

    /// Sentence texts, exactly `text[start..end]` for each span
    fn tokenize(&self, text: &str) -> Vec<String> {
        self.span_tokenize(text)
            .into_iter()
            .map(|(start, end)| text[start..end].to_string())
            .collect()
    }

    /// Register a word that never ends a sentence when followed by a period
    fn add_abbreviation(&mut self, abbreviation: &str);
}

/// Punctuation-driven tokenizer with a non-breaking abbreviation list.
///
/// A boundary is a run of `.`, `!`, `?` or `…` (plus closing quotes and
/// brackets) followed by whitespace and then an uppercase letter, a digit,
/// an opening quote, or the end of the text. A blank line or U+2029 always
/// ends a sentence.
#[derive(Debug, Clone)]
pub struct RuleSentenceTokenizer {
    abbreviations: HashSet<String>,
}

impl Default for RuleSentenceTokenizer {
    fn default() -> Self {
        Self::from_config(&TokenizerConfig::default())
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '»')
}

fn is_opening(c: char) -> bool {
    matches!(c, '"' | '\'' | '(' | '[' | '“' | '‘' | '«')
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let trimmed = slice.trim_start();
    let s = start + (slice.len() - trimmed.len());
    let e = s + trimmed.trim_end().len();
    if e > s {
        spans.push((s, e));
    }
}

impl RuleSentenceTokenizer {
    pub fn new() -> Self {
        Self {
            abbreviations: HashSet::new(),
        }
    }

    pub fn from_config(config: &TokenizerConfig) -> Self {
        let mut tokenizer = Self::new();
        for abbreviation in &config.abbreviations {
            tokenizer.add_abbreviation(abbreviation);
        }
        tokenizer
    }

    /// Does the text before a period end in an abbreviation or a name initial?
    /// `after` is the text from the next non-space character on.
    fn ends_with_abbreviation(&self, before: &str, after: &str) -> bool {
        let word: String = before
            .chars()
            .rev()
            .take_while(|c| c.is_alphabetic() || *c == '.')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let word = word.trim_start_matches('.');

        let mut letters = word.chars();
        if let (Some(c), None) = (letters.next(), letters.next()) {
            if c.is_uppercase() {
                return is_name_initial(c, after);
            }
        }

        let lower = before.to_lowercase();
        self.abbreviations.iter().any(|abbr| {
            lower.strip_suffix(abbr.as_str()).map_or(false, |rest| {
                !rest.chars().next_back().map_or(false, char::is_alphanumeric)
            })
        })
    }
}

/// Words that open sentences far more often than they follow an initial.
const SENTENCE_OPENERS: [&str; 36] = [
    "a", "after", "an", "and", "as", "at", "but", "for", "he", "her", "his", "how", "i", "if", "in",
    "it", "its", "my", "no", "now", "on", "our", "she", "so", "that", "the", "then", "there",
    "they", "this", "we", "what", "when", "where", "yes", "you",
];

/// A single capital before a period is an initial ("J. R. Tolkien",
/// "John F. Kennedy") unless it is the pronoun "I" or the next word reads
/// like the start of a new sentence ("Plan B. Then we left.").
fn is_name_initial(letter: char, after: &str) -> bool {
    if letter == 'I' {
        return false;
    }

    let next = after
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches(is_opening);
    let mut chars = next.chars();
    if let (Some(c), Some('.')) = (chars.next(), chars.next()) {
        if c.is_uppercase() {
            return true;
        }
    }

    let next_word: String = next
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    !SENTENCE_OPENERS.contains(&next_word.as_str())
}

impl SentenceTokenizer for RuleSentenceTokenizer {
    fn span_tokenize(&self, text: &str) -> Vec<(usize, usize)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let n = chars.len();
        let byte_at = |i: usize| if i < n { chars[i].0 } else { text.len() };

        let mut spans = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < n {
            let (pos, c) = chars[i];

            if c == '\u{2029}' {
                push_trimmed(text, start, pos, &mut spans);
                start = byte_at(i + 1);
                i += 1;
                continue;
            }

            if c == '\n' {
                let mut j = i + 1;
                while j < n && matches!(chars[j].1, ' ' | '\t' | '\r') {
                    j += 1;
                }
                if j < n && chars[j].1 == '\n' {
                    push_trimmed(text, start, pos, &mut spans);
                    start = byte_at(j + 1);
                    i = j + 1;
                    continue;
                }
                i += 1;
                continue;
            }

            if !is_terminal(c) {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            while j < n && (is_terminal(chars[j].1) || is_closing(chars[j].1)) {
                j += 1;
            }
            let end = byte_at(j);

            if j == n {
                push_trimmed(text, start, end, &mut spans);
                start = end;
                i = j;
                continue;
            }
            if !chars[j].1.is_whitespace() {
                i = j;
                continue;
            }

            let mut k = j;
            while k < n && chars[k].1.is_whitespace() && chars[k].1 != '\u{2029}' {
                k += 1;
            }
            if k < n {
                let next = chars[k].1;
                let starts_sentence = next.is_uppercase() || next.is_ascii_digit() || is_opening(next) || next == '\u{2029}';
                if !starts_sentence || (c == '.' && self.ends_with_abbreviation(&text[start..pos], &text[chars[k].0..])) {
                    i = j;
                    continue;
                }
            }

            push_trimmed(text, start, end, &mut spans);
            start = end;
            i = j;
        }

        push_trimmed(text, start, text.len(), &mut spans);
        spans
    }

    fn add_abbreviation(&mut self, abbreviation: &str) {
        let abbreviation = abbreviation.trim().trim_end_matches('.').to_lowercase();
        if !abbreviation.is_empty() {
            self.abbreviations.insert(abbreviation);
        }
    }
}
