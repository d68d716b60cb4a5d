use std::io::Write;

use focal_reader::source::{EpubPackage, PageLink, PdfLayout, PdfPage, TextBlock};
use focal_reader::{FooterPatternSet, ImageId, Pipeline, PipelineConfig, SourceError, SourceKind};

const JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn xhtml(body: &str) -> Vec<u8> {
    format!(
        r#"<html><head><link rel="stylesheet" href="../style.css"/></head><body>{}</body></html>"#,
        body
    )
    .into_bytes()
}

fn sample_epub() -> EpubPackage {
    let mut pkg = EpubPackage::default();
    pkg.add_document("cover", "OEBPS/cover.xhtml", xhtml(r#"<img src="images/cover.jpg"/>"#));
    pkg.add_document("copy", "OEBPS/copyright.xhtml", xhtml("<p>Copyright 2020, Yen Press</p>"));
    pkg.add_document("toc", "OEBPS/toc.xhtml", xhtml("<p>Contents</p>"));
    pkg.add_document(
        "c1",
        "OEBPS/ch1.xhtml",
        xhtml("<h1>Chapter 1</h1><p>Hello Mr. Smith. He left.</p><p>The door closed.</p>"),
    );
    pkg.add_document("plate", "OEBPS/plate.xhtml", xhtml(r#"<img src="images/plate.png"/>"#));
    pkg.add_document(
        "c2",
        "OEBPS/ch2.xhtml",
        xhtml(r#"<h1>Chapter 2</h1><p style="color: red">Morning came.</p>"#),
    );
    pkg.add_document("back", "OEBPS/back.xhtml", xhtml(r#"<img src="images/back.png"/><img src="missing.png"/>"#));

    pkg.add_image("i1", "OEBPS/images/cover.jpg", JPEG.to_vec());
    pkg.add_image("i2", "OEBPS/images/plate.png", PNG.to_vec());
    pkg.add_image("i3", "OEBPS/images/back.png", PNG.to_vec());

    pkg.add_toc_entry("Contents", "OEBPS/toc.xhtml");
    pkg.add_toc_entry("Chapter 1", "OEBPS/ch1.xhtml#start");
    pkg.add_toc_entry("Chapter 2", "OEBPS/ch2.xhtml");
    pkg
}

fn footers() -> FooterPatternSet {
    FooterPatternSet::from_config(&PipelineConfig::default()).unwrap()
}

#[test]
fn epub_end_to_end() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let doc = pipeline.process_epub_package(&sample_epub(), &footers());

    assert_eq!(doc.kind, SourceKind::Epub);
    assert_eq!(
        doc.displayed_text(),
        "Chapter 1\n\nHello Mr. Smith. He left.\n\nThe door closed.\n\nChapter 2\n\nMorning came."
    );
    assert_eq!(
        doc.sentences(),
        vec!["Chapter 1", "Hello Mr. Smith.", "He left.", "The door closed.", "Chapter 2", "Morning came."]
    );
    assert_eq!(
        doc.paragraph_sentence_map(),
        &[vec![0], vec![1, 2], vec![3], vec![4], vec![5]]
    );

    assert_eq!(doc.toc.len(), 2);
    assert_eq!(doc.toc[0].title, "Chapter 1");
    assert_eq!(doc.toc[0].anchor_id, "chapter-anchor-0");
    assert_eq!(doc.toc[0].sentence, Some(0));
    assert_eq!(doc.toc[1].anchor_id, "chapter-anchor-1");
    assert_eq!(doc.toc[1].sentence, Some(4));

    assert_eq!(doc.images.cover.len(), 1);
    assert_eq!(doc.images.cover[0].media_type, "image/jpeg");
    assert_eq!(doc.images.chapters.len(), 2);
    assert_eq!(doc.images.chapters[0][0].id, ImageId(1));
    assert!(doc.images.chapters[1].is_empty());
    assert_eq!(doc.images.ending.len(), 1);

    let html = doc.displayed_html.as_deref().unwrap();
    assert!(html.contains(r#"<a name="chapter-anchor-0""#));
    assert!(html.contains(r#"<a name="chapter-anchor-1""#));
    assert!(html.contains(r#"href="image://1""#));
    assert!(!html.contains(r#"href="image://0""#));
    assert!(!html.contains("style=\"color"));
    assert!(!html.contains("<link"));
    assert!(!html.contains("Copyright"));
    assert!(html.find("chapter-anchor-0") < html.find("image://1"));
    assert!(html.find("image://1") < html.find("chapter-anchor-1"));
}

#[test]
fn epub_rollback_restores_discarded_chapter() {
    let mut pkg = EpubPackage::default();
    pkg.add_document("title", "title.xhtml", xhtml("<p>A Story</p>"));
    pkg.add_document(
        "c1",
        "c1.xhtml",
        xhtml("<h1>Chapter 1</h1><p>Copyright 2020, Yen Press. The tale begins.</p>"),
    );
    pkg.add_document("c2", "c2.xhtml", xhtml("<h1>Chapter 2</h1><p>It goes on.</p>"));
    pkg.add_toc_entry("Chapter 1", "c1.xhtml");
    pkg.add_toc_entry("Chapter 2", "c2.xhtml");

    let doc = Pipeline::new(PipelineConfig::default()).process_epub_package(&pkg, &footers());
    assert!(doc.displayed_text().starts_with("Chapter 1\n\nCopyright 2020, Yen Press."));
    assert!(!doc.displayed_text().contains("A Story"));
    assert_eq!(doc.toc.len(), 2);
}

#[test]
fn epub_without_toc_keeps_everything() {
    let mut pkg = EpubPackage::default();
    pkg.add_document("a", "a.xhtml", xhtml("<p>First part.</p>"));
    pkg.add_document("b", "b.xhtml", xhtml("<p>Second part.</p>"));

    let doc = Pipeline::new(PipelineConfig::default()).process_epub_package(&pkg, &footers());
    assert_eq!(doc.displayed_text(), "First part.\n\nSecond part.");
    assert!(doc.toc.is_empty());
    assert!(doc.is_readable());
}

fn pdf_page(index: usize, blocks: &[(f32, &str)], links: &[(&str, usize)]) -> PdfPage {
    let mut page = PdfPage::new(index, 800.0);
    page.blocks = blocks.iter().map(|&(y, t)| TextBlock::text(y, t)).collect();
    page.links = links
        .iter()
        .map(|&(text, dest)| PageLink {
            source_page: index,
            clip_text: text.to_string(),
            row_text: text.to_string(),
            dest_page: dest,
        })
        .collect();
    page
}

#[test]
fn pdf_end_to_end_with_footer_rerun() {
    let layout = PdfLayout {
        pages: vec![
            pdf_page(0, &[(100.0, "My Book")], &[]),
            pdf_page(1, &[(50.0, "Contents")], &[("Chapter One", 3)]),
            pdf_page(2, &[(50.0, "Contents cont.")], &[("Chapter Two", 4)]),
            pdf_page(3, &[(60.0, "CHAPTER ONE\nThe Beginning"), (120.0, "It was late. My Book Series"), (760.0, "3")], &[]),
            pdf_page(4, &[(120.0, "It was later."), (760.0, "Page 4")], &[]),
        ],
    };
    let pipeline = Pipeline::new(PipelineConfig::default());
    let mut set = footers();

    let doc = pipeline.process_pdf_layout(&layout, &set, None);
    assert_eq!(doc.start_page, Some(3));
    assert_eq!(
        doc.displayed_text(),
        "CHAPTER ONE The Beginning\n\nIt was late. My Book Series\n\nChapter Two\n\nIt was later."
    );
    assert_eq!(doc.toc.len(), 2);
    assert!(doc.toc.iter().all(|e| e.offset.is_some()));

    set.add_literal("My Book Series");
    let doc = pipeline.process_pdf_layout(&layout, &set, None);
    assert!(doc.displayed_text().contains("It was late.\n\nChapter Two"));
    assert_eq!(doc.footer_version, set.version());

    let doc = pipeline.process_pdf_layout(&layout, &set, Some(2));
    assert!(doc.displayed_text().starts_with("Contents cont."));
}

#[test]
fn process_path_text_and_errors() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(file, "ISBN 12345\n\nHello Mr. Smith. He left.\n\nThe end.").unwrap();

    let pipeline = Pipeline::new(PipelineConfig::default());
    let doc = pipeline.process_path(file.path(), &footers(), None).unwrap();
    assert_eq!(doc.kind, SourceKind::Text);
    assert_eq!(doc.sentences(), vec!["ISBN 12345", "Hello Mr. Smith.", "He left.", "The end."]);
    for (i, span) in doc.sentence_spans().iter().enumerate() {
        assert_eq!(&doc.displayed_text()[span.start..span.end], doc.sentences()[i]);
    }

    let docx = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
    let err = pipeline.process_path(docx.path(), &footers(), None).unwrap_err();
    assert!(matches!(err, SourceError::UnsupportedFormat(_)));

    let broken = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    let err = pipeline.process_path(broken.path(), &footers(), None).unwrap_err();
    assert!(matches!(err, SourceError::Pdf(_)));
}
