use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::FooterPatternError;
use crate::source::{BlockGeometry, ContentUnit};

/// Ordered, append-only footer rules. Every mutation bumps `version` so a
/// caller can tell whether a processed document is stale.
#[derive(Debug, Clone, Default)]
pub struct FooterPatternSet {
    rules: Vec<Regex>,
    version: u64,
}

impl FooterPatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a set from the configured footer regexes.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FooterPatternError> {
        let mut set = Self::new();
        for pattern in &config.footer_patterns {
            set.add_pattern(pattern)?;
        }
        Ok(set)
    }

    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), FooterPatternError> {
        let regex = Regex::new(pattern).map_err(|source| FooterPatternError::Invalid {
            pattern: pattern.to_string(),
            source,
        })?;
        self.rules.push(regex);
        self.version += 1;
        debug!("Footer pattern added: {} (version {})", pattern, self.version);
        Ok(())
    }

    /// Add user-reported footer text as a case-insensitive literal match.
    /// Blank text is ignored.
    pub fn add_literal(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let pattern = format!("(?i){}", regex::escape(text));
        if let Err(e) = self.add_pattern(&pattern) {
            // An escaped literal always compiles unless it exceeds the size limit.
            warn!("Ignoring footer text {:?}: {}", text, e);
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(Regex::as_str)
    }

    /// Delete every match and trim, repeating until nothing changes.
    pub fn strip(&self, text: &str) -> String {
        let mut current = text.trim().to_string();
        loop {
            let mut next = current.clone();
            for rule in &self.rules {
                next = rule.replace_all(&next, "").into_owned();
            }
            let next = next.trim().to_string();
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

/// Applies the positional heuristic and the pattern set to PDF blocks and
/// plain-text units.
pub struct FooterStripper<'a> {
    config: &'a PipelineConfig,
    patterns: &'a FooterPatternSet,
}

impl<'a> FooterStripper<'a> {
    pub fn new(config: &'a PipelineConfig, patterns: &'a FooterPatternSet) -> Self {
        Self { config, patterns }
    }

    /// A short block low on the page with a digit in it, unless it reads like a title.
    pub fn is_positional_footer(&self, text: &str, geometry: BlockGeometry) -> bool {
        let pdf = &self.config.pdf;
        let candidate = geometry.y > geometry.page_height * pdf.footer_zone_ratio
            && text.chars().count() < pdf.footer_max_chars;

        if !candidate || self.config.mentions_chapter_keyword(text) {
            return false;
        }
        text.chars().any(|c| c.is_ascii_digit())
    }

    pub fn clean_text(&self, text: &str) -> String {
        self.patterns.strip(text)
    }

    /// Cleaned unit text, or `None` when the unit is dropped or nothing survives.
    pub fn clean_unit(&self, unit: &ContentUnit) -> Option<String> {
        if let Some(geometry) = unit.geometry {
            if self.is_positional_footer(unit.text.trim(), geometry) {
                debug!("Dropping footer block {}: {:?}", unit.id, unit.text.trim());
                return None;
            }
        }
        let cleaned = self.clean_text(&unit.text);
        (!cleaned.is_empty()).then_some(cleaned)
    }

    pub fn clean_units(&self, units: &[&ContentUnit]) -> Vec<(String, String)> {
        let cleaned: Vec<(String, String)> = units
            .iter()
            .filter_map(|unit| self.clean_unit(unit).map(|text| (unit.id.clone(), text)))
            .collect();
        info!(
            "Footer stripping kept {} of {} units (pattern version {})",
            cleaned.len(),
            units.len(),
            self.patterns.version()
        );
        cleaned
    }
}

fn link_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<link\b[^>]*>(?:\s*</link\s*>)?").expect("valid link regex"))
}

fn style_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)\s+style\s*=\s*(?:"[^"]*"|'[^']*')"#).expect("valid style regex")
    })
}

/// Structural cleanup for EPUB markup: stylesheet links and inline styles.
pub fn strip_markup_noise(html: &str) -> String {
    let without_links = link_tag_re().replace_all(html, "");
    style_attr_re().replace_all(&without_links, "").into_owned()
}
