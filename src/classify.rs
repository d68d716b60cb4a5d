use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::config::{ClassifierConfig, PipelineConfig};
use crate::source::{ContentUnit, TocLink};

/// Unit ids that start a genuine chapter, with the TOC title that named them.
#[derive(Debug, Clone, Default)]
pub struct EssentialAnchors {
    order: Vec<String>,
    titles: HashMap<String, String>,
}

impl EssentialAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an essential unit. The first title seen for an id wins.
    pub fn insert(&mut self, id: impl Into<String>, title: impl Into<String>) {
        let id = id.into();
        if !self.titles.contains_key(&id) {
            self.order.push(id.clone());
            self.titles.insert(id, title.into());
        }
    }

    /// TOC entries whose title mentions a chapter keyword, keyed by href.
    pub fn from_toc(toc: &[TocLink], config: &PipelineConfig) -> Self {
        let mut anchors = Self::new();
        for link in toc {
            if config.mentions_chapter_keyword(&link.title) && !link.href().is_empty() {
                anchors.insert(link.href(), link.title.trim());
            }
        }
        debug!("{} of {} TOC entries are essential", anchors.len(), toc.len());
        anchors
    }

    /// Drop anchors that do not name a text-bearing unit; they can never be kept.
    pub fn retain_units(&mut self, units: &[ContentUnit]) {
        let present: HashSet<&str> = units.iter().filter(|u| u.is_text()).map(|u| u.id.as_str()).collect();
        let before = self.order.len();
        self.order.retain(|id| present.contains(id.as_str()));
        self.titles.retain(|id, _| present.contains(id.as_str()));
        if self.order.len() != before {
            debug!("Ignoring {} essential anchors with no text unit", before - self.order.len());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.titles.contains_key(id)
    }

    pub fn title(&self, id: &str) -> Option<&str> {
        self.titles.get(id).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Outcome of classifying units, each list in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub kept: Vec<String>,
    pub discarded: Vec<String>,
    pub non_text: Vec<String>,
}

/// Flags publisher boilerplate among the first few text-bearing units.
#[derive(Debug, Clone)]
pub struct JunkClassifier {
    keywords: Vec<String>,
    check_limit: usize,
}

impl JunkClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            keywords: config.junk_keywords.iter().map(|k| k.to_lowercase()).collect(),
            check_limit: config.junk_check_limit,
        }
    }

    pub fn is_junk(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    pub fn classify(&self, units: &[ContentUnit]) -> Classification {
        let mut result = Classification::default();
        let mut checked = 0;

        for unit in units {
            if !unit.is_text() {
                result.non_text.push(unit.id.clone());
                continue;
            }

            if checked < self.check_limit {
                checked += 1;
                if self.is_junk(&unit.text) {
                    debug!("Discarding boilerplate unit {}", unit.id);
                    result.discarded.push(unit.id.clone());
                    continue;
                }
            }
            result.kept.push(unit.id.clone());
        }

        info!(
            "Classified {} units: {} kept, {} discarded, {} without text",
            units.len(),
            result.kept.len(),
            result.discarded.len(),
            result.non_text.len()
        );
        result
    }

    /// Every text-bearing unit kept; used when the caller fixed the start explicitly.
    pub fn keep_all(units: &[ContentUnit]) -> Classification {
        let (kept, non_text): (Vec<&ContentUnit>, Vec<&ContentUnit>) = units.iter().partition(|u| u.is_text());
        Classification {
            kept: kept.into_iter().map(|u| u.id.clone()).collect(),
            discarded: Vec::new(),
            non_text: non_text.into_iter().map(|u| u.id.clone()).collect(),
        }
    }
}
