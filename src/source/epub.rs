use epub::doc::{EpubDoc, NavPoint};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use super::html;
use super::{ContentUnit, UnitOrigin};
use crate::error::{Result, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Document,
    Image,
}

/// One manifest item the pipeline may need: a spine document or an image it references.
#[derive(Debug, Clone)]
pub struct EpubItem {
    /// Archive path, `/`-separated.
    pub href: String,
    pub kind: ItemKind,
    pub bytes: Vec<u8>,
}

/// A navigation entry; `target` may carry a `#fragment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocLink {
    pub title: String,
    pub target: String,
}

impl TocLink {
    /// Target with any fragment removed.
    pub fn href(&self) -> &str {
        self.target.split('#').next().unwrap_or("")
    }
}

/// Everything the pipeline reads from an EPUB: reading order, items, and TOC.
#[derive(Debug, Clone, Default)]
pub struct EpubPackage {
    pub spine_order: Vec<String>,
    pub items: HashMap<String, EpubItem>,
    pub toc: Vec<TocLink>,
}

impl EpubPackage {
    /// Append a spine document.
    pub fn add_document(&mut self, id: impl Into<String>, href: impl Into<String>, bytes: Vec<u8>) {
        let id = id.into();
        self.spine_order.push(id.clone());
        self.items.insert(
            id,
            EpubItem {
                href: href.into(),
                kind: ItemKind::Document,
                bytes,
            },
        );
    }

    pub fn add_image(&mut self, id: impl Into<String>, href: impl Into<String>, bytes: Vec<u8>) {
        self.items.insert(
            id.into(),
            EpubItem {
                href: href.into(),
                kind: ItemKind::Image,
                bytes,
            },
        );
    }

    pub fn add_toc_entry(&mut self, title: impl Into<String>, target: impl Into<String>) {
        self.toc.push(TocLink {
            title: title.into(),
            target: target.into(),
        });
    }

    pub fn item_by_href(&self, href: &str) -> Option<&EpubItem> {
        self.items.values().find(|item| item.href == href)
    }

    /// Resolve an image reference from a document. Falls back to matching the
    /// file name alone, since some books reference images with broken paths.
    pub fn find_image(&self, document_href: &str, src: &str) -> Option<&EpubItem> {
        let resolved = html::resolve_href(document_href, src);
        let images = || self.items.values().filter(|item| item.kind == ItemKind::Image);

        if let Some(item) = images().find(|item| item.href == resolved) {
            return Some(item);
        }

        let file_name = resolved.rsplit('/').next().unwrap_or(&resolved);
        if file_name.is_empty() {
            return None;
        }
        images().find(|item| item.href.ends_with(file_name))
    }

    /// One unit per distinct spine document, in reading order. Documents
    /// without visible text become non-text units.
    pub fn document_units(&self) -> Vec<ContentUnit> {
        let mut seen = HashSet::new();
        let mut units = Vec::new();

        for id in &self.spine_order {
            let Some(item) = self.items.get(id) else {
                warn!("Spine references unknown item: {}", id);
                continue;
            };
            if item.kind != ItemKind::Document || !seen.insert(item.href.as_str()) {
                continue;
            }

            let markup = String::from_utf8_lossy(&item.bytes).into_owned();
            let text = html::plain_text(&markup);
            let unit = ContentUnit::new(
                item.href.clone(),
                units.len(),
                text,
                UnitOrigin::Href(item.href.clone()),
            );
            units.push(unit.with_markup(markup));
        }

        debug!("Built {} document units from spine", units.len());
        units
    }
}

fn path_to_href(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn flatten_toc(points: &[NavPoint], out: &mut Vec<TocLink>) {
    for point in points {
        out.push(TocLink {
            title: point.label.trim().to_string(),
            target: path_to_href(&point.content),
        });
        flatten_toc(&point.children, out);
    }
}

/// Read an EPUB into an [`EpubPackage`]: spine documents, the images they
/// reference, and the flattened navigation tree.
pub fn load_epub_package(path: &Path) -> Result<EpubPackage> {
    info!("Reading EPUB package: {:?}", path);

    let mut doc = EpubDoc::new(path).map_err(|e| SourceError::Epub {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut package = EpubPackage::default();
    flatten_toc(&doc.toc, &mut package.toc);

    loop {
        if let (Some(id), Some(doc_path)) = (doc.get_current_id(), doc.get_current_path()) {
            let href = path_to_href(&doc_path);

            if let Some((content, _mime)) = doc.get_current_str() {
                for src in html::image_sources(&content) {
                    let resolved = html::resolve_href(&href, &src);
                    if package.item_by_href(&resolved).is_some() {
                        continue;
                    }
                    match doc.get_resource_by_path(&resolved) {
                        Some(bytes) => package.add_image(resolved.clone(), resolved, bytes),
                        None => debug!("Image {} referenced by {} not in archive", src, href),
                    }
                }
                package.add_document(id, href, content.into_bytes());
            }
        }

        if !doc.go_next() {
            break;
        }
    }

    info!(
        "EPUB: {} spine documents, {} items, {} TOC entries",
        package.spine_order.len(),
        package.items.len(),
        package.toc.len()
    );

    Ok(package)
}
