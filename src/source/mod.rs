pub mod epub;
pub mod html;
pub mod pdf;
pub mod text;

use std::path::Path;

use crate::error::{Result, SourceError};

pub use self::epub::{load_epub_package, EpubItem, EpubPackage, ItemKind, TocLink};
pub use self::pdf::{load_pdf_layout, BlockKind, PageLink, PdfLayout, PdfPage, TextBlock};
pub use self::text::load_text;

/// Document format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Epub,
    Text,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "epub" => Ok(Self::Epub),
            "txt" | "text" => Ok(Self::Text),
            _ => Err(SourceError::UnsupportedFormat(if ext.is_empty() {
                format!("{:?} has no extension", path)
            } else {
                ext
            })),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Text,
    /// No extractable text; a candidate for image extraction.
    NonText,
}

/// Where a unit came from in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOrigin {
    Page(usize),
    Href(String),
    Paragraph(usize),
}

/// Vertical placement of a PDF block, top-down page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockGeometry {
    pub y: f32,
    pub page_height: f32,
}

/// One unit of raw extracted content, immutable once the adapter pass is done.
#[derive(Debug, Clone)]
pub struct ContentUnit {
    pub id: String,
    pub order_index: usize,
    pub kind: UnitKind,
    /// Plain text used for classification and re-segmentation.
    pub text: String,
    /// Original markup (EPUB documents only).
    pub markup: Option<String>,
    pub origin: UnitOrigin,
    pub geometry: Option<BlockGeometry>,
}

impl ContentUnit {
    /// Build a unit, routing it to the non-text branch when it carries no text.
    pub fn new(id: impl Into<String>, order_index: usize, text: String, origin: UnitOrigin) -> Self {
        let kind = if text.trim().is_empty() {
            UnitKind::NonText
        } else {
            UnitKind::Text
        };

        Self {
            id: id.into(),
            order_index,
            kind,
            text,
            markup: None,
            origin,
            geometry: None,
        }
    }

    pub fn with_markup(mut self, markup: String) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn with_geometry(mut self, geometry: BlockGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn is_text(&self) -> bool {
        self.kind == UnitKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_source_kind_from_extension() {
        assert_eq!(SourceKind::from_path(&PathBuf::from("a/B.PDF")).unwrap(), SourceKind::Pdf);
        assert_eq!(SourceKind::from_path(&PathBuf::from("b.epub")).unwrap(), SourceKind::Epub);
        assert_eq!(SourceKind::from_path(&PathBuf::from("c.txt")).unwrap(), SourceKind::Text);
        assert!(SourceKind::from_path(&PathBuf::from("d.docx")).is_err());
        assert!(SourceKind::from_path(&PathBuf::from("noext")).is_err());
    }

    #[test]
    fn test_empty_text_routes_to_non_text() {
        let unit = ContentUnit::new("a.xhtml", 0, "  \n ".to_string(), UnitOrigin::Href("a.xhtml".into()));
        assert_eq!(unit.kind, UnitKind::NonText);

        let unit = ContentUnit::new("b.xhtml", 1, "Text".to_string(), UnitOrigin::Href("b.xhtml".into()));
        assert!(unit.is_text());
    }
}
