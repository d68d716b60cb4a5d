use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::source::ContentUnit;
use crate::window::ChapterGroup;

const PLACEHOLDER_SCHEME: &str = "image://";

/// Per-load image identifier, the join key between a placeholder and its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageId(pub usize);

impl ImageId {
    pub fn placeholder_href(&self) -> String {
        format!("{}{}", PLACEHOLDER_SCHEME, self.0)
    }

    /// Inert link standing in for the image in the displayed HTML.
    pub fn placeholder(&self) -> String {
        format!(
            r#"<a class="image-placeholder" href="{}">[Image {}]</a>"#,
            self.placeholder_href(),
            self.0
        )
    }

    pub fn from_placeholder_href(href: &str) -> Option<Self> {
        href.trim()
            .strip_prefix(PLACEHOLDER_SCHEME)?
            .parse()
            .ok()
            .map(ImageId)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBucket {
    Cover,
    Chapter(usize),
    Ending,
}

/// An image referenced by a unit, before it has been given an id.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub href: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: ImageId,
    pub unit_id: String,
    pub href: String,
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub bucket: ImageBucket,
}

/// Sniff the media type from the image bytes.
pub fn media_type(bytes: &[u8]) -> &'static str {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return "image/svg+xml";
    }

    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::Tiff) => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageGroups {
    pub cover: Vec<ImageRecord>,
    /// One gallery per chapter group, index-aligned with the groups.
    pub chapters: Vec<Vec<ImageRecord>>,
    pub ending: Vec<ImageRecord>,
}

impl ImageGroups {
    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.cover
            .iter()
            .chain(self.chapters.iter().flatten())
            .chain(self.ending.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: ImageId) -> Option<&ImageRecord> {
        self.iter().find(|r| r.id == id)
    }

    /// Images of one unit, in id order.
    pub fn for_unit(&self, unit_id: &str) -> Vec<&ImageRecord> {
        let mut records: Vec<&ImageRecord> = self.iter().filter(|r| r.unit_id == unit_id).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    fn push(&mut self, record: ImageRecord) {
        match record.bucket {
            ImageBucket::Cover => self.cover.push(record),
            ImageBucket::Chapter(i) => self.chapters[i].push(record),
            ImageBucket::Ending => self.ending.push(record),
        }
    }
}

/// Assign ids to the images of non-text units in document order and bucket
/// them relative to the chapter groups.
pub fn group_images(
    units: &[ContentUnit],
    groups: &[ChapterGroup],
    images: &HashMap<String, Vec<SourceImage>>,
) -> ImageGroups {
    let position: HashMap<&str, usize> = units.iter().map(|u| (u.id.as_str(), u.order_index)).collect();
    let boundary: HashMap<usize, usize> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, g)| position.get(g.first()).map(|&p| (p, i)))
        .collect();

    let first = groups.first().and_then(|g| position.get(g.first()).copied());
    let last = groups.last().and_then(|g| position.get(g.last()).copied());

    let mut result = ImageGroups {
        chapters: vec![Vec::new(); groups.len()],
        ..ImageGroups::default()
    };
    let mut next_id = 0;

    for unit in units.iter().filter(|u| !u.is_text()) {
        let Some(unit_images) = images.get(&unit.id) else {
            continue;
        };

        let index = unit.order_index;
        let bucket = match (first, last) {
            (Some(first), Some(_)) if index < first => Some(ImageBucket::Cover),
            (Some(_), Some(last)) if index > last => Some(ImageBucket::Ending),
            (Some(_), Some(_)) => (0..=index)
                .rev()
                .find_map(|p| boundary.get(&p))
                .map(|&g| ImageBucket::Chapter(g)),
            _ => Some(ImageBucket::Cover),
        };

        for image in unit_images {
            let id = ImageId(next_id);
            next_id += 1;

            let Some(bucket) = bucket else {
                warn!("No chapter precedes image {} in {}, dropping it", image.href, unit.id);
                continue;
            };
            debug!("Image {} ({}) -> {:?}", id, image.href, bucket);

            result.push(ImageRecord {
                id,
                unit_id: unit.id.clone(),
                href: image.href.clone(),
                media_type: media_type(&image.bytes),
                bytes: image.bytes.clone(),
                bucket,
            });
        }
    }

    info!(
        "Images: {} cover, {} in chapters, {} ending",
        result.cover.len(),
        result.chapters.iter().map(Vec::len).sum::<usize>(),
        result.ending.len()
    );
    result
}
