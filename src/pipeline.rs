use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::classify::{EssentialAnchors, JunkClassifier};
use crate::config::PipelineConfig;
use crate::error::{FooterPatternError, Result};
use crate::footer::{strip_markup_noise, FooterPatternSet, FooterStripper};
use crate::images::{group_images, ImageGroups, SourceImage};
use crate::navigation::{NavigationIndex, Span};
use crate::segment::{ParagraphEvidence, Resegmenter, RuleSentenceTokenizer, SentenceTokenizer};
use crate::source::{
    self, html, BlockGeometry, ContentUnit, EpubPackage, PdfLayout, PdfPage, SourceKind, UnitOrigin,
};
use crate::toc::{scan_pdf_toc, TocDestination};
use crate::window::{ContentWindow, ContentWindowResolver};

const DEFAULT_CSS: &str = "body { font-family: serif; line-height: 1.6; margin: 1em 2em; }\n\
p { margin: 0 0 1em 0; }\n\
a.image-placeholder { color: #777; font-style: italic; text-decoration: none; }";

/// Words of a unit used to find where it landed in the displayed text.
const ANCHOR_SEARCH_WORDS: usize = 8;

/// A navigable chapter start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub title: String,
    /// `chapter-anchor-{n}`, unique within the document.
    pub anchor_id: String,
    /// Byte offset into the displayed text, when the chapter start was located.
    pub offset: Option<usize>,
    pub sentence: Option<usize>,
}

/// Everything the reader needs for one loaded document.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub kind: SourceKind,
    /// Display markup (EPUB only); the plain text is in `navigation`.
    pub displayed_html: Option<String>,
    pub toc: Vec<TocEntry>,
    pub images: ImageGroups,
    pub navigation: NavigationIndex,
    /// PDF page the transcript starts at.
    pub start_page: Option<usize>,
    /// Version of the footer pattern set the run used.
    pub footer_version: u64,
}

impl ProcessedDocument {
    pub fn displayed_text(&self) -> &str {
        self.navigation.displayed_text()
    }

    pub fn sentence_spans(&self) -> &[Span] {
        self.navigation.spans()
    }

    pub fn sentences(&self) -> Vec<&str> {
        self.navigation.sentences()
    }

    pub fn paragraph_sentence_map(&self) -> &[Vec<usize>] {
        self.navigation.paragraph_sentence_map()
    }

    /// False when nothing survived the pipeline; playback has nothing to read.
    pub fn is_readable(&self) -> bool {
        !self.navigation.is_empty()
    }

    /// Was this computed against an older footer pattern set?
    pub fn is_stale(&self, footers: &FooterPatternSet) -> bool {
        self.footer_version != footers.version()
    }
}

fn squash(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

/// Find the first words of `unit_text` in `displayed`, ignoring how whitespace changed.
fn locate(displayed: &str, unit_text: &str, from: usize) -> Option<usize> {
    let words: Vec<String> = unit_text
        .split_whitespace()
        .take(ANCHOR_SEARCH_WORDS)
        .map(regex::escape)
        .collect();
    if words.is_empty() || from > displayed.len() {
        return None;
    }
    let re = Regex::new(&words.join(r"\s+")).ok()?;
    re.find_at(displayed, from).map(|m| m.start())
}

fn anchor_id(n: usize) -> String {
    format!("chapter-anchor-{}", n)
}

fn order_map(units: &[ContentUnit]) -> HashMap<String, usize> {
    units.iter().map(|u| (u.id.clone(), u.order_index)).collect()
}

/// Source adapter, classifier, content window, footer stripping and image
/// grouping, then re-segmentation of whatever survives.
pub struct Pipeline<T: SentenceTokenizer = RuleSentenceTokenizer> {
    config: PipelineConfig,
    classifier: JunkClassifier,
    resegmenter: Resegmenter<T>,
}

impl Pipeline<RuleSentenceTokenizer> {
    pub fn new(config: PipelineConfig) -> Self {
        let tokenizer = RuleSentenceTokenizer::from_config(&config.tokenizer);
        Self::with_tokenizer(config, tokenizer)
    }
}

impl Default for Pipeline<RuleSentenceTokenizer> {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl<T: SentenceTokenizer> Pipeline<T> {
    pub fn with_tokenizer(config: PipelineConfig, tokenizer: T) -> Self {
        Self {
            classifier: JunkClassifier::new(&config.classifier),
            resegmenter: Resegmenter::new(tokenizer, config.chapter_keywords.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A fresh pattern set seeded from the configured footer rules.
    pub fn footer_patterns(&self) -> std::result::Result<FooterPatternSet, FooterPatternError> {
        FooterPatternSet::from_config(&self.config)
    }

    /// Load and process a document from disk. Re-running with a grown footer
    /// set or an earlier start page recomputes everything from the source.
    pub fn process_path(
        &self,
        path: &Path,
        footers: &FooterPatternSet,
        start_page_override: Option<usize>,
    ) -> Result<ProcessedDocument> {
        let kind = SourceKind::from_path(path)?;
        info!("Processing {:?} as {:?}", path, kind);

        let document = match kind {
            SourceKind::Pdf => {
                let layout = source::load_pdf_layout(path)?;
                self.process_pdf_layout(&layout, footers, start_page_override)
            }
            SourceKind::Epub => {
                let package = source::load_epub_package(path)?;
                self.process_epub_package(&package, footers)
            }
            SourceKind::Text => {
                let text = source::load_text(path)?;
                self.process_text(&text, footers)
            }
        };

        if !document.is_readable() {
            warn!("Nothing readable was recovered from {:?}", path);
        }
        Ok(document)
    }

    fn resolve_window(&self, units: &[ContentUnit], anchors: &EssentialAnchors, trim: bool) -> ContentWindow {
        let classification = if trim {
            self.classifier.classify(units)
        } else {
            JunkClassifier::keep_all(units)
        };
        ContentWindowResolver::new(trim).resolve(classification, anchors, &order_map(units))
    }

    pub fn process_text(&self, text: &str, footers: &FooterPatternSet) -> ProcessedDocument {
        // Plain text has no TOC to roll back to, so nothing is classified away.
        let units = source::text::text_units(text);
        let window = self.resolve_window(&units, &EssentialAnchors::new(), false);

        let by_id: HashMap<&str, &ContentUnit> = units.iter().map(|u| (u.id.as_str(), u)).collect();
        let kept: Vec<&ContentUnit> = window.kept.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect();

        let stripper = FooterStripper::new(&self.config, footers);
        let raw = stripper
            .clean_units(&kept)
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n\n");

        ProcessedDocument {
            kind: SourceKind::Text,
            displayed_html: None,
            toc: Vec::new(),
            images: ImageGroups::default(),
            navigation: self.resegmenter.resegment(&raw),
            start_page: None,
            footer_version: footers.version(),
        }
    }

    /// Footer-filtered, cleaned text blocks of one page, top to bottom.
    fn page_blocks(&self, page: &PdfPage, stripper: &FooterStripper) -> Vec<(String, BlockGeometry)> {
        page.text_blocks()
            .filter_map(|block| {
                let geometry = BlockGeometry {
                    y: block.y,
                    page_height: page.page_height,
                };
                let text = block.text.trim();
                if stripper.is_positional_footer(text, geometry) {
                    debug!("Page {}: dropping footer block {:?}", page.page_index, text);
                    return None;
                }
                let cleaned = stripper.clean_text(text);
                (!cleaned.is_empty()).then_some((cleaned, geometry))
            })
            .collect()
    }

    /// Units for every page from `start`, with chapter titles injected on
    /// destination pages. Returns the units and the chapter-start anchors.
    fn pdf_units(
        &self,
        layout: &PdfLayout,
        start: usize,
        destinations: &[TocDestination],
        stripper: &FooterStripper,
    ) -> (Vec<ContentUnit>, EssentialAnchors) {
        let mut units = Vec::new();
        let mut anchors = EssentialAnchors::new();
        let mut skip_next = false;

        for page_index in start..layout.page_count() {
            if skip_next {
                skip_next = false;
                continue;
            }

            let mut source_page = page_index;
            let mut blocks = self.page_blocks(&layout.pages[page_index], stripper);
            let title = destinations.iter().find(|d| d.dest_page == page_index).map(|d| d.title.as_str());

            if title.is_some() && blocks.is_empty() && page_index + 1 < layout.page_count() {
                debug!("Chapter page {} is blank, borrowing page {}", page_index, page_index + 1);
                source_page = page_index + 1;
                blocks = self.page_blocks(&layout.pages[source_page], stripper);
                skip_next = true;
            }

            if let Some(title) = title {
                let top = blocks.first().map(|(text, _)| squash(text)).unwrap_or_default();
                if !top.contains(&squash(title)) {
                    let geometry = BlockGeometry {
                        y: 0.0,
                        page_height: layout.pages[source_page].page_height,
                    };
                    blocks.insert(0, (title.to_string(), geometry));
                }
            }

            for (i, (text, geometry)) in blocks.into_iter().enumerate() {
                let id = format!("p{}-b{}", source_page, i);
                if i == 0 {
                    if let Some(title) = title {
                        anchors.insert(id.clone(), title);
                    }
                }
                let unit = ContentUnit::new(id, units.len(), text, UnitOrigin::Page(source_page));
                units.push(unit.with_geometry(geometry));
            }
        }

        (units, anchors)
    }

    pub fn process_pdf_layout(
        &self,
        layout: &PdfLayout,
        footers: &FooterPatternSet,
        start_page_override: Option<usize>,
    ) -> ProcessedDocument {
        let scan = scan_pdf_toc(layout, &self.config);

        let mut start = start_page_override.unwrap_or(scan.start_page);
        if start >= layout.page_count() && start > 0 {
            warn!(
                "Start page {} is past the last page ({}), starting from the beginning",
                start,
                layout.page_count()
            );
            start = 0;
        }

        let stripper = FooterStripper::new(&self.config, footers);
        let (units, mut anchors) = self.pdf_units(layout, start, &scan.destinations, &stripper);
        anchors.retain_units(&units);

        let window = self.resolve_window(&units, &anchors, start_page_override.is_none());

        let by_id: HashMap<&str, &ContentUnit> = units.iter().map(|u| (u.id.as_str(), u)).collect();
        let kept: Vec<&ContentUnit> = window.kept.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect();
        let raw = kept.iter().map(|u| u.text.as_str()).collect::<Vec<_>>().join("\n\n");

        let displayed = self.resegmenter.canonical_text(&raw);
        let navigation = self.resegmenter.index(displayed, &ParagraphEvidence::BlankLines);

        let mut toc = Vec::new();
        let mut search_from = 0;
        for group in window.groups.iter().filter(|g| g.essential) {
            let Some(title) = anchors.title(group.first()) else {
                continue;
            };
            let offset = by_id
                .get(group.first())
                .and_then(|u| locate(navigation.displayed_text(), &u.text, search_from));
            if let Some(offset) = offset {
                search_from = offset;
            }
            toc.push(TocEntry {
                title: title.to_string(),
                anchor_id: anchor_id(toc.len()),
                offset,
                sentence: offset.and_then(|o| navigation.sentence_at(o)),
            });
        }

        info!(
            "PDF: started at page {}, {} chapters, {} sentences",
            start,
            toc.len(),
            navigation.len()
        );

        ProcessedDocument {
            kind: SourceKind::Pdf,
            displayed_html: None,
            toc,
            images: ImageGroups::default(),
            navigation,
            start_page: Some(start),
            footer_version: footers.version(),
        }
    }

    fn unit_images(&self, package: &EpubPackage, unit: &ContentUnit) -> Vec<SourceImage> {
        let Some(markup) = unit.markup.as_deref() else {
            return Vec::new();
        };
        html::image_sources(markup)
            .into_iter()
            .filter_map(|src| match package.find_image(&unit.id, &src) {
                Some(item) => Some(SourceImage {
                    href: item.href.clone(),
                    bytes: item.bytes.clone(),
                }),
                None => {
                    warn!("Image {} referenced by {} is not in the package, skipping", src, unit.id);
                    None
                }
            })
            .collect()
    }

    /// EPUB documents carry no fixed running footer, so `footers` only
    /// stamps the version; cleanup is structural.
    pub fn process_epub_package(&self, package: &EpubPackage, footers: &FooterPatternSet) -> ProcessedDocument {
        let units = package.document_units();
        let mut anchors = EssentialAnchors::from_toc(&package.toc, &self.config);
        anchors.retain_units(&units);

        let window = self.resolve_window(&units, &anchors, true);

        let images_by_unit: HashMap<String, Vec<SourceImage>> = units
            .iter()
            .filter(|u| !u.is_text())
            .map(|u| (u.id.clone(), self.unit_images(package, u)))
            .filter(|(_, images)| !images.is_empty())
            .collect();
        let images = group_images(&units, &window.groups, &images_by_unit);

        let kept: HashSet<&str> = window.kept.iter().map(String::as_str).collect();
        let group_starts: HashMap<&str, bool> = window.groups.iter().map(|g| (g.first(), g.essential)).collect();

        let order = order_map(&units);
        let first = window.groups.first().and_then(|g| order.get(g.first()).copied());
        let last = window.groups.last().and_then(|g| order.get(g.last()).copied());

        let mut body = String::new();
        let mut text = String::new();
        let mut blocks: Vec<Range<usize>> = Vec::new();
        let mut toc = Vec::new();

        if let (Some(first), Some(last)) = (first, last) {
            for unit in &units[first..=last] {
                if !unit.is_text() {
                    for record in images.for_unit(&unit.id) {
                        body.push_str(&format!("<p>{}</p>\n", record.id.placeholder()));
                    }
                    continue;
                }
                if !kept.contains(unit.id.as_str()) {
                    continue;
                }

                let markup = strip_markup_noise(unit.markup.as_deref().unwrap_or(""));

                let mut unit_blocks = html::text_blocks(&markup);
                if unit_blocks.is_empty() && !unit.text.is_empty() {
                    unit_blocks.push(unit.text.clone());
                }
                let unit_offset = if text.is_empty() { 0 } else { text.len() + 2 };

                if group_starts.get(unit.id.as_str()) == Some(&true) {
                    let id = anchor_id(toc.len());
                    body.push_str(&format!("<a name=\"{0}\" id=\"{0}\"></a>\n", id));
                    toc.push(TocEntry {
                        title: anchors.title(&unit.id).unwrap_or(&unit.id).to_string(),
                        anchor_id: id,
                        offset: Some(unit_offset),
                        sentence: None,
                    });
                }

                body.push_str(html::body_inner(&markup).trim());
                body.push('\n');

                for block in unit_blocks {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    let start = text.len();
                    text.push_str(&block);
                    blocks.push(start..text.len());
                }
            }
        }

        let navigation = self.resegmenter.index(text, &ParagraphEvidence::Blocks(blocks));
        for entry in &mut toc {
            entry.sentence = entry.offset.and_then(|o| navigation.sentence_from(o));
        }

        let displayed_html = format!(
            "<html><head><meta charset=\"utf-8\"/><style>{}</style></head><body>\n{}</body></html>",
            DEFAULT_CSS, body
        );

        info!(
            "EPUB: {} chapters, {} images, {} sentences",
            toc.len(),
            images.len(),
            navigation.len()
        );

        ProcessedDocument {
            kind: SourceKind::Epub,
            displayed_html: Some(displayed_html),
            toc,
            images,
            navigation,
            start_page: None,
            footer_version: footers.version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PageLink, TextBlock};

    fn footers() -> FooterPatternSet {
        FooterPatternSet::from_config(&PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_locate_ignores_whitespace_changes() {
        let displayed = "Intro text.\n\nChapter 1 The Start It began.";
        assert_eq!(locate(displayed, "Chapter 1\nThe  Start", 0), Some(13));
        assert_eq!(locate(displayed, "Chapter 1", 14), None);
        assert_eq!(locate(displayed, "   ", 0), None);
    }

    #[test]
    fn test_process_text() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let mut set = footers();
        let text = "It was cold. Page 3\n\nHe left. BOOK TITLE";

        let doc = pipeline.process_text(text, &set);
        assert_eq!(doc.displayed_text(), "It was cold.\n\nHe left. BOOK TITLE");
        assert_eq!(doc.paragraph_sentence_map(), &[vec![0], vec![1, 2]]);

        set.add_literal("book title");
        assert!(doc.is_stale(&set));
        let doc = pipeline.process_text(text, &set);
        assert_eq!(doc.displayed_text(), "It was cold.\n\nHe left.");
        assert_eq!(doc.footer_version, 3);
    }

    #[test]
    fn test_process_text_keeps_paragraphs_with_junk_words() {
        let text = "She had always wanted to write a novel.\n\nSo one morning she began.";
        let doc = Pipeline::new(PipelineConfig::default()).process_text(text, &footers());
        assert_eq!(
            doc.displayed_text(),
            "She had always wanted to write a novel.\n\nSo one morning she began."
        );
        assert_eq!(doc.paragraph_sentence_map(), &[vec![0], vec![1]]);
    }

    #[test]
    fn test_process_text_empty_is_not_readable() {
        let doc = Pipeline::new(PipelineConfig::default()).process_text("", &footers());
        assert!(!doc.is_readable());
        assert!(doc.sentence_spans().is_empty());
    }

    fn pdf_page(index: usize, blocks: &[(f32, &str)]) -> PdfPage {
        let mut page = PdfPage::new(index, 800.0);
        page.blocks = blocks.iter().map(|&(y, t)| TextBlock::text(y, t)).collect();
        page
    }

    #[test]
    fn test_pdf_title_injection_and_blank_page() {
        let mut toc_page = pdf_page(0, &[(50.0, "Contents")]);
        toc_page.links = vec![
            PageLink { source_page: 0, clip_text: "Chapter 1".into(), row_text: "Chapter 1".into(), dest_page: 1 },
            PageLink { source_page: 0, clip_text: "Chapter 2".into(), row_text: "Chapter 2".into(), dest_page: 3 },
        ];
        let layout = PdfLayout {
            pages: vec![
                toc_page,
                pdf_page(1, &[(60.0, "It was morning."), (780.0, "1")]),
                pdf_page(2, &[(60.0, "Still morning.")]),
                pdf_page(3, &[]),
                pdf_page(4, &[(60.0, "CHAPTER 2"), (100.0, "Night fell.")]),
            ],
        };

        let doc = Pipeline::new(PipelineConfig::default()).process_pdf_layout(&layout, &footers(), None);
        assert_eq!(doc.start_page, Some(1));
        assert_eq!(
            doc.displayed_text(),
            "Chapter 1\n\nIt was morning.\n\nStill morning.\n\nCHAPTER 2\n\nNight fell."
        );
        assert_eq!(doc.toc.len(), 2);
        assert_eq!(doc.toc[0].anchor_id, "chapter-anchor-0");
        assert_eq!(doc.toc[0].offset, Some(0));
        assert_eq!(doc.toc[1].title, "Chapter 2");
        assert_eq!(doc.toc[1].sentence, Some(3));
    }

    #[test]
    fn test_pdf_start_page_override() {
        let layout = PdfLayout {
            pages: vec![pdf_page(0, &[(60.0, "Copyright notice.")]), pdf_page(1, &[(60.0, "Body.")])],
        };
        let pipeline = Pipeline::new(PipelineConfig::default());

        let doc = pipeline.process_pdf_layout(&layout, &footers(), None);
        assert_eq!(doc.displayed_text(), "Body.");

        let doc = pipeline.process_pdf_layout(&layout, &footers(), Some(0));
        assert_eq!(doc.displayed_text(), "Copyright notice.\n\nBody.");

        let doc = pipeline.process_pdf_layout(&layout, &footers(), Some(9));
        assert_eq!(doc.start_page, Some(0));
    }
}
