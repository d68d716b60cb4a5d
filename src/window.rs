use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::classify::{Classification, EssentialAnchors};

/// A contiguous run of kept units; `essential` when its first unit is a chapter start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterGroup {
    pub unit_ids: Vec<String>,
    pub essential: bool,
}

impl ChapterGroup {
    pub fn first(&self) -> &str {
        &self.unit_ids[0]
    }

    pub fn last(&self) -> &str {
        &self.unit_ids[self.unit_ids.len() - 1]
    }
}

fn missing<'a>(essential: &'a EssentialAnchors, kept: &[String]) -> Vec<&'a str> {
    essential.ids().filter(|id| !kept.iter().any(|k| k == id)).collect()
}

/// Restore discarded units until every essential id is kept or nothing is left
/// to restore. Units come back most-recently-discarded first and are inserted
/// at the front of `kept`, which is then re-sorted into document order.
///
/// Returns the restored ids.
pub fn rollback(
    kept: &mut Vec<String>,
    discarded: &mut Vec<String>,
    essential: &EssentialAnchors,
    order: &HashMap<String, usize>,
) -> Vec<String> {
    let mut restored = Vec::new();

    while !missing(essential, kept).is_empty() {
        let Some(unit) = discarded.pop() else {
            warn!("Essential units still missing after restoring every discarded unit");
            break;
        };
        debug!("Restoring discarded unit {}", unit);
        kept.insert(0, unit.clone());
        restored.push(unit);
    }

    kept.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
    restored
}

/// Split `kept` at its first essential unit. With no essential unit the whole
/// list is kept.
pub fn trim_front_matter(kept: Vec<String>, essential: &EssentialAnchors) -> (Vec<String>, Vec<String>) {
    match kept.iter().position(|id| essential.contains(id)) {
        Some(start) => {
            let mut kept = kept;
            let body = kept.split_off(start);
            (body, kept)
        }
        None => (kept, Vec::new()),
    }
}

/// The first unit opens a group; every essential unit opens another.
pub fn group_chapters(kept: &[String], essential: &EssentialAnchors) -> Vec<ChapterGroup> {
    let mut groups: Vec<ChapterGroup> = Vec::new();

    for id in kept {
        let is_essential = essential.contains(id);
        match groups.last_mut() {
            Some(group) if !is_essential => group.unit_ids.push(id.clone()),
            _ => groups.push(ChapterGroup {
                unit_ids: vec![id.clone()],
                essential: is_essential,
            }),
        }
    }
    groups
}

/// Result of resolving the content window.
#[derive(Debug, Clone, Default)]
pub struct ContentWindow {
    /// Body units in document order, after trimming.
    pub kept: Vec<String>,
    pub restored: Vec<String>,
    /// Kept units cut off as front matter.
    pub front_matter: Vec<String>,
    pub groups: Vec<ChapterGroup>,
}

#[derive(Debug, Clone)]
pub struct ContentWindowResolver {
    pub trim_front_matter: bool,
}

impl Default for ContentWindowResolver {
    fn default() -> Self {
        Self {
            trim_front_matter: true,
        }
    }
}

impl ContentWindowResolver {
    pub fn new(trim_front_matter: bool) -> Self {
        Self { trim_front_matter }
    }

    pub fn resolve(
        &self,
        classification: Classification,
        essential: &EssentialAnchors,
        order: &HashMap<String, usize>,
    ) -> ContentWindow {
        let Classification {
            mut kept,
            mut discarded,
            ..
        } = classification;

        let restored = rollback(&mut kept, &mut discarded, essential, order);

        let (kept, front_matter) = if self.trim_front_matter {
            trim_front_matter(kept, essential)
        } else {
            (kept, Vec::new())
        };

        let groups = group_chapters(&kept, essential);

        info!(
            "Content window: {} units in {} groups ({} restored, {} front matter)",
            kept.len(),
            groups.len(),
            restored.len(),
            front_matter.len()
        );

        ContentWindow {
            kept,
            restored,
            front_matter,
            groups,
        }
    }
}
