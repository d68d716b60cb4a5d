use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::source::{PageLink, PdfLayout};

/// A chapter link found on a TOC page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocDestination {
    pub title: String,
    pub dest_page: usize,
}

/// Which leading pages are the TOC, where the body starts, and where the
/// chapter links point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfTocScan {
    pub toc_pages: Vec<usize>,
    /// First page after the TOC, or 0 when no TOC was found.
    pub start_page: usize,
    pub destinations: Vec<TocDestination>,
}

/// Number of chapter-keyword occurrences in `text`, case-insensitive.
pub fn keyword_hits(text: &str, keywords: &[String]) -> usize {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| lower.matches(k.as_str()).count())
        .sum()
}

/// Sorted unique candidates, cut at the first gap.
pub fn contiguous_run(candidates: &[usize]) -> Vec<usize> {
    let unique: BTreeSet<usize> = candidates.iter().copied().collect();
    let mut run: Vec<usize> = Vec::new();

    for page in unique {
        match run.last() {
            Some(&last) if page != last + 1 => break,
            _ => run.push(page),
        }
    }
    run
}

/// Pages `[first..=last]` of the contiguous run, and `last + 1` as the start page.
pub fn detect_start_page(candidates: &[usize]) -> (Vec<usize>, usize) {
    let toc_pages = contiguous_run(candidates);
    let start_page = toc_pages.last().map(|p| p + 1).unwrap_or(0);
    (toc_pages, start_page)
}

fn link_title(link: &PageLink) -> String {
    let text = if link.clip_text.trim().is_empty() {
        &link.row_text
    } else {
        &link.clip_text
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Scan the leading pages of a PDF for a linked table of contents.
pub fn scan_pdf_toc(layout: &PdfLayout, config: &PipelineConfig) -> PdfTocScan {
    let keywords = &config.chapter_keywords;
    let threshold = config.pdf.toc_keyword_threshold;
    let window = &layout.pages[..layout.page_count().min(config.pdf.toc_scan_pages)];

    let links: Vec<&PageLink> = window.iter().flat_map(|p| p.links.iter()).collect();
    let has_empty_links = links.iter().any(|l| l.clip_text.trim().is_empty());

    let dense_page = |page_index: usize| {
        layout
            .page(page_index)
            .map(|p| keyword_hits(&p.text(), keywords) > threshold)
            .unwrap_or(false)
    };

    let candidates: Vec<usize> = if links.is_empty() {
        debug!("No links in the first {} pages, using keyword density", window.len());
        window.iter().map(|p| p.page_index).filter(|&i| dense_page(i)).collect()
    } else if has_empty_links {
        window
            .iter()
            .filter(|p| !p.links.is_empty())
            .map(|p| p.page_index)
            .filter(|&i| dense_page(i))
            .collect()
    } else {
        links
            .iter()
            .filter(|l| config.mentions_chapter_keyword(&l.clip_text))
            .map(|l| l.source_page)
            .collect()
    };

    let (toc_pages, start_page) = detect_start_page(&candidates);

    let mut destinations: Vec<TocDestination> = Vec::new();
    for link in links.iter().filter(|l| toc_pages.contains(&l.source_page)) {
        let title = link_title(link);
        if title.is_empty() || !config.mentions_chapter_keyword(&title) {
            continue;
        }
        let dest = TocDestination {
            title,
            dest_page: link.dest_page,
        };
        if !destinations.contains(&dest) {
            destinations.push(dest);
        }
    }

    info!(
        "TOC pages {:?}, start page {}, {} chapter destinations",
        toc_pages,
        start_page,
        destinations.len()
    );

    PdfTocScan {
        toc_pages,
        start_page,
        destinations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PdfPage, TextBlock};

    fn page(index: usize, text: &str, links: Vec<(&str, &str, usize)>) -> PdfPage {
        let mut page = PdfPage::new(index, 800.0);
        page.blocks.push(TextBlock::text(50.0, text));
        page.links = links
            .into_iter()
            .map(|(clip, row, dest)| PageLink {
                source_page: index,
                clip_text: clip.to_string(),
                row_text: row.to_string(),
                dest_page: dest,
            })
            .collect();
        page
    }

    #[test]
    fn test_contiguous_run_stops_at_gap() {
        let (pages, start) = detect_start_page(&[6, 2, 3, 4, 3]);
        assert_eq!(pages, vec![2, 3, 4]);
        assert_eq!(start, 5);
        assert_eq!(detect_start_page(&[]), (vec![], 0));
    }

    #[test]
    fn test_keyword_hits_counts_occurrences() {
        let keywords = PipelineConfig::default().chapter_keywords;
        assert_eq!(keyword_hits("Chapter 1 ... chapter 2 ... Epilogue", &keywords), 3);
    }

    #[test]
    fn test_scan_with_named_links() {
        let config = PipelineConfig::default();
        let mut pages: Vec<PdfPage> = (0..8).map(|i| page(i, "body", vec![])).collect();
        for i in [2, 3, 4, 6] {
            pages[i] = page(i, "Contents", vec![("Chapter X", "Chapter X ..... 9", 9)]);
        }
        pages[2].links.push(PageLink {
            source_page: 2,
            clip_text: "Prologue".into(),
            row_text: "Prologue".into(),
            dest_page: 7,
        });

        let scan = scan_pdf_toc(&PdfLayout { pages }, &config);
        assert_eq!(scan.toc_pages, vec![2, 3, 4]);
        assert_eq!(scan.start_page, 5);
        assert_eq!(
            scan.destinations,
            vec![
                TocDestination { title: "Chapter X".into(), dest_page: 9 },
                TocDestination { title: "Prologue".into(), dest_page: 7 },
            ]
        );
    }

    #[test]
    fn test_scan_with_empty_link_text_uses_density_and_rows() {
        let config = PipelineConfig::default();
        let dense = "Chapter 1\nChapter 2\nChapter 3\nChapter 4\nChapter 5";
        let pages = vec![
            page(0, "Title page", vec![]),
            page(1, dense, vec![("", "Chapter 1  The Start", 3)]),
            page(2, "Chapter one begins.", vec![]),
            page(3, "More.", vec![]),
        ];

        let scan = scan_pdf_toc(&PdfLayout { pages }, &config);
        assert_eq!(scan.toc_pages, vec![1]);
        assert_eq!(scan.start_page, 2);
        assert_eq!(scan.destinations[0].title, "Chapter 1 The Start");
        assert_eq!(scan.destinations[0].dest_page, 3);
    }

    #[test]
    fn test_scan_without_links() {
        let config = PipelineConfig::default();
        let pages = vec![page(0, "Novel", vec![]), page(1, "It was a dark night.", vec![])];

        let scan = scan_pdf_toc(&PdfLayout { pages }, &config);
        assert!(scan.toc_pages.is_empty());
        assert_eq!(scan.start_page, 0);
        assert!(scan.destinations.is_empty());
    }

    #[test]
    fn test_scan_without_links_finds_dense_pages() {
        let config = PipelineConfig::default();
        let dense = "Contents\nChapter 1 Chapter 2 Chapter 3\nChapter 4 Chapter 5 Epilogue";
        let pages = vec![
            page(0, "A Story", vec![]),
            page(1, dense, vec![]),
            page(2, "Chapter 6", vec![]),
            page(3, "Chapter 1. It was a dark night.", vec![]),
        ];

        let scan = scan_pdf_toc(&PdfLayout { pages }, &config);
        assert_eq!(scan.toc_pages, vec![1]);
        assert_eq!(scan.start_page, 2);
        assert!(scan.destinations.is_empty());
    }
}
