use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::footer::FooterPatternSet;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Front/back-matter boilerplate terms, matched case-insensitively.
    pub junk_keywords: Vec<String>,
    /// Only this many leading text-bearing units are checked for junk.
    pub junk_check_limit: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            junk_keywords: strings(&[
                "copyright",
                "isbn",
                "translation by",
                "cover art",
                "yen press",
                "kadawa",
                "tuttle-mori",
                "library of congress",
                "lccn",
                "e-book",
                "ebook",
                "first published",
                "english translation",
                "visit us at",
                "novel",
                "download",
            ]),
            junk_check_limit: 5,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.junk_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid("junk_keywords must not contain blanks".into()));
        }
        Ok(())
    }
}

impl fmt::Display for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Upper bound on pages scanned for table-of-contents links.
    pub toc_scan_pages: usize,
    /// A page with more keyword hits than this counts as a TOC page.
    pub toc_keyword_threshold: usize,
    /// Blocks whose top edge lies below this fraction of the page are footer candidates.
    pub footer_zone_ratio: f32,
    /// Footer candidates must be shorter than this many characters.
    pub footer_max_chars: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            toc_scan_pages: 15,
            toc_keyword_threshold: 4,
            footer_zone_ratio: 0.9,
            footer_max_chars: 100,
        }
    }
}

impl PdfConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.footer_zone_ratio) {
            return Err(ConfigError::Invalid(
                "footer_zone_ratio must be within [0,1]".into(),
            ));
        }
        if self.toc_scan_pages == 0 {
            return Err(ConfigError::Invalid("toc_scan_pages must be > 0".into()));
        }
        Ok(())
    }
}

impl fmt::Display for PdfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Lowercase abbreviations (without the final period) that never end a sentence.
    pub abbreviations: Vec<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            abbreviations: strings(&[
                "mr", "mrs", "ms", "dr", "prof", "rev", "capt", "sgt", "col", "gen", "st", "jr",
                "sr", "vs", "no", "etc", "e.g", "i.e", "et al", "cf",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Words that mark a genuine chapter start (TOC titles, headings, low-page titles).
    pub chapter_keywords: Vec<String>,
    /// Regex footer rules every new pattern set starts from.
    pub footer_patterns: Vec<String>,
    pub classifier: ClassifierConfig,
    pub pdf: PdfConfig,
    pub tokenizer: TokenizerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chapter_keywords: strings(&[
                "chapter",
                "prologue",
                "epilogue",
                "appendix",
                "afterword",
                "interlude",
            ]),
            footer_patterns: strings(&[
                r"(?i)\bpage\s+\d+(?:\s+of\s+\d+)?\b",
                r"\d+\s*\|\s*P\s*a\s*g\s*e\b",
            ]),
            classifier: ClassifierConfig::default(),
            pdf: PdfConfig::default(),
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = serde_json::from_str(&json)
            .with_context(|| "Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chapter_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "chapter_keywords must not contain blanks".into(),
            ));
        }
        self.classifier.validate()?;
        self.pdf.validate()?;
        FooterPatternSet::from_config(self)?;
        Ok(())
    }

    /// Case-insensitive substring test against the chapter keywords.
    pub fn mentions_chapter_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.chapter_keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classifier.junk_check_limit, 5);
        assert_eq!(config.pdf.toc_scan_pages, 15);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"pdf": {{"toc_scan_pages": 8}}}}"#).unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.pdf.toc_scan_pages, 8);
        assert_eq!(config.pdf.footer_max_chars, 100);
        assert!(config.chapter_keywords.contains(&"prologue".to_string()));
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let mut config = PipelineConfig::default();
        config.pdf.footer_zone_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_footer_pattern_rejected() {
        let mut config = PipelineConfig::default();
        config.footer_patterns.push("(unclosed".into());
        assert!(matches!(config.validate(), Err(ConfigError::Footer(_))));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"footer_patterns": ["[a-"]}}"#).unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_mentions_chapter_keyword() {
        let config = PipelineConfig::default();
        assert!(config.mentions_chapter_keyword("CHAPTER ONE"));
        assert!(config.mentions_chapter_keyword("The Prologue"));
        assert!(!config.mentions_chapter_keyword("Contents"));
    }
}
