use lopdf::content::Content;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Letter-size fallback when a page carries no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Rough glyph advance, as a fraction of the font size. Only used to decide
/// where inter-word spaces fall when a line is drawn in several pieces.
const GLYPH_ADVANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Image,
}

/// A block of text (or an image placement) on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Top edge, measured downward from the top of the page.
    pub y: f32,
    pub kind: BlockKind,
    pub text: String,
}

impl TextBlock {
    pub fn text(y: f32, text: impl Into<String>) -> Self {
        Self {
            y,
            kind: BlockKind::Text,
            text: text.into(),
        }
    }
}

/// An internal link annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    pub source_page: usize,
    /// Text drawn inside the link rectangle.
    pub clip_text: String,
    /// Text on the same row as the link, regardless of horizontal extent.
    pub row_text: String,
    pub dest_page: usize,
}

#[derive(Debug, Clone)]
pub struct PdfPage {
    pub page_index: usize,
    pub page_height: f32,
    pub blocks: Vec<TextBlock>,
    pub links: Vec<PageLink>,
}

impl PdfPage {
    pub fn new(page_index: usize, page_height: f32) -> Self {
        Self {
            page_index,
            page_height,
            blocks: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn text_blocks(&self) -> impl Iterator<Item = &TextBlock> {
        self.blocks.iter().filter(|b| b.kind == BlockKind::Text)
    }

    /// All text on the page, one block per line.
    pub fn text(&self) -> String {
        self.text_blocks()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Positioned page content for a whole PDF.
#[derive(Debug, Clone, Default)]
pub struct PdfLayout {
    pub pages: Vec<PdfPage>,
}

impl PdfLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&PdfPage> {
        self.pages.get(index)
    }

    /// Walk every page's content stream into blocks and collect internal links.
    /// A page whose content cannot be decoded is kept, empty.
    pub fn from_document(doc: &Document) -> Self {
        let page_ids = doc.get_pages();
        let page_numbers: HashMap<ObjectId, usize> = page_ids
            .values()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();

        let mut pages = Vec::with_capacity(page_ids.len());

        for (index, page_id) in page_ids.values().enumerate() {
            let [_, lly, _, ury] = media_box(doc, *page_id).unwrap_or(DEFAULT_MEDIA_BOX);
            let mut page = PdfPage::new(index, (ury - lly).abs());

            let lines = match walk_page(doc, *page_id) {
                Ok((lines, images)) => {
                    page.blocks = group_blocks(&lines, ury);
                    for image_y in images {
                        page.blocks.push(TextBlock {
                            y: (ury - image_y).max(0.0),
                            kind: BlockKind::Image,
                            text: String::new(),
                        });
                    }
                    lines
                }
                Err(e) => {
                    warn!("Failed to decode content of page {}: {}", index, e);
                    Vec::new()
                }
            };

            page.links = page_links(doc, *page_id, index, &page_numbers, &lines);
            pages.push(page);
        }

        Self { pages }
    }
}

/// Open a PDF and build its [`PdfLayout`].
pub fn load_pdf_layout(path: &Path) -> Result<PdfLayout> {
    info!("Extracting layout from PDF: {:?}", path);

    let doc = Document::load(path)?;
    let layout = PdfLayout::from_document(&doc);

    let blocks: usize = layout.pages.iter().map(|p| p.blocks.len()).sum();
    let links: usize = layout.pages.iter().map(|p| p.links.len()).sum();
    info!(
        "Extracted {} pages ({} blocks, {} internal links)",
        layout.page_count(),
        blocks,
        links
    );

    Ok(layout)
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(l: &Matrix, r: &Matrix) -> Matrix {
    [
        l[0] * r[0] + l[1] * r[2],
        l[0] * r[1] + l[1] * r[3],
        l[2] * r[0] + l[3] * r[2],
        l[2] * r[1] + l[3] * r[3],
        l[4] * r[0] + l[5] * r[2] + r[4],
        l[4] * r[1] + l[5] * r[3] + r[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn number(obj: &Object) -> Option<f32> {
    obj.as_float().ok()
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    let values: Vec<f32> = operands.iter().take(6).filter_map(number).collect();
    (values.len() == 6).then(|| [values[0], values[1], values[2], values[3], values[4], values[5]])
}

/// WinAnsi code points 0x80..=0x9F that differ from Latin-1.
fn win_ansi(byte: u8) -> char {
    match byte {
        0x80 => '€',
        0x85 => '…',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x99 => '™',
        other => other as char,
    }
}

fn printable(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect()
}

/// Decode a string operand drawn without a known font encoding:
/// UTF-16BE with BOM, otherwise single-byte.
fn decode_pdf_string(bytes: &[u8]) -> String {
    let text: String = if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| win_ansi(b)).collect()
    };
    printable(&text)
}

/// Encodings of the fonts in a page's resources, keyed by resource name.
/// Fonts lopdf cannot map (and pages without font resources) are left out;
/// their strings fall back to [`decode_pdf_string`].
fn font_encodings(doc: &Document, page_id: ObjectId) -> BTreeMap<Vec<u8>, Encoding<'_>> {
    let fonts = match doc.get_page_fonts(page_id) {
        Ok(fonts) => fonts,
        Err(e) => {
            debug!("No font resources for page object {:?}: {}", page_id, e);
            return BTreeMap::new();
        }
    };

    fonts
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                warn!("Font {} has no usable encoding: {}", String::from_utf8_lossy(&name), e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Piece {
    x: f32,
    y: f32,
    size: f32,
    width: f32,
    text: String,
}

#[derive(Debug, Clone)]
struct Line {
    x: f32,
    y: f32,
    size: f32,
    end_x: f32,
    text: String,
}

/// Minimal text-state machine over a page content stream.
struct TextWalker<'a> {
    xobjects: Option<&'a Dictionary>,
    doc: &'a Document,
    encodings: BTreeMap<Vec<u8>, Encoding<'a>>,
    font: Option<Vec<u8>>,
    ctm: Matrix,
    stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    leading: f32,
    font_size: f32,
    pieces: Vec<Piece>,
    images: Vec<f32>,
}

impl<'a> TextWalker<'a> {
    fn new(doc: &'a Document, xobjects: Option<&'a Dictionary>, encodings: BTreeMap<Vec<u8>, Encoding<'a>>) -> Self {
        Self {
            xobjects,
            doc,
            encodings,
            font: None,
            ctm: IDENTITY,
            stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            leading: 0.0,
            font_size: 0.0,
            pieces: Vec::new(),
            images: Vec::new(),
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = multiply(&translate(tx, ty), &self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn advance(&mut self, text_space: f32) {
        self.tm = multiply(&translate(text_space, 0.0), &self.tm);
    }

    /// Decode through the current font's encoding (ToUnicode CMap, named
    /// or Identity encodings), falling back to single-byte text.
    fn decode(&self, bytes: &[u8]) -> String {
        let decoded = self
            .font
            .as_ref()
            .and_then(|name| self.encodings.get(name))
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok());

        match decoded {
            Some(text) => printable(&text),
            None => decode_pdf_string(bytes),
        }
    }

    fn show(&mut self, operand: &Object) {
        let Object::String(bytes, _) = operand else {
            return;
        };
        let text = self.decode(bytes);
        let chars = text.chars().count() as f32;
        if chars == 0.0 {
            return;
        }

        let m = multiply(&self.tm, &self.ctm);
        let scale = (m[2] * m[2] + m[3] * m[3]).sqrt();
        let size = if scale > 0.0 { self.font_size.abs() * scale } else { self.font_size.abs() };

        self.pieces.push(Piece {
            x: m[4],
            y: m[5],
            size,
            width: chars * GLYPH_ADVANCE * size,
            text,
        });
        self.advance(chars * GLYPH_ADVANCE * self.font_size);
    }

    fn show_array(&mut self, items: &[Object]) {
        for item in items {
            match item {
                Object::String(..) => self.show(item),
                other => {
                    let Some(adjust) = number(other) else { continue };
                    // Large negative kerning is how many producers draw a word gap.
                    if adjust < -250.0 {
                        if let Some(last) = self.pieces.last_mut() {
                            if !last.text.ends_with(' ') {
                                last.text.push(' ');
                            }
                        }
                    }
                    self.advance(-adjust / 1000.0 * self.font_size);
                }
            }
        }
    }

    fn place_xobject(&mut self, name: &Object) {
        let (Ok(name), Some(xobjects)) = (name.as_name(), self.xobjects) else {
            return;
        };
        let is_image = xobjects
            .get(name)
            .and_then(|obj| self.doc.dereference(obj))
            .ok()
            .and_then(|(_, obj)| obj.as_stream().ok())
            .and_then(|stream| stream.dict.get(b"Subtype").ok())
            .and_then(|subtype| subtype.as_name().ok())
            .map(|subtype| subtype == b"Image")
            .unwrap_or(false);

        if is_image {
            // Images are drawn into the unit square; its top edge is at (0, 1).
            self.images.push(self.ctm[3] + self.ctm[5]);
        }
    }

    fn run(&mut self, content: &Content) {
        for op in &content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => self.stack.push(self.ctm),
                "Q" => {
                    if let Some(ctm) = self.stack.pop() {
                        self.ctm = ctm;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(operands) {
                        self.ctm = multiply(&m, &self.ctm);
                    }
                }
                "BT" => {
                    self.tm = IDENTITY;
                    self.tlm = IDENTITY;
                }
                "Tf" => {
                    self.font = operands.first().and_then(|f| f.as_name().ok()).map(<[u8]>::to_vec);
                    if let Some(size) = operands.get(1).and_then(number) {
                        self.font_size = size;
                    }
                }
                "TL" => {
                    if let Some(leading) = operands.first().and_then(number) {
                        self.leading = leading;
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_from(operands) {
                        self.tm = m;
                        self.tlm = m;
                    }
                }
                "Td" | "TD" => {
                    let tx = operands.first().and_then(number).unwrap_or(0.0);
                    let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                    if op.operator == "TD" {
                        self.leading = -ty;
                    }
                    self.move_line(tx, ty);
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(s) = operands.first() {
                        self.show(s);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(s) = operands.first() {
                        self.show(s);
                    }
                }
                "\"" => {
                    self.next_line();
                    if let Some(s) = operands.get(2) {
                        self.show(s);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        self.show_array(items);
                    }
                }
                "Do" => {
                    if let Some(name) = operands.first() {
                        self.place_xobject(name);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Look up a page attribute, following `/Parent` for inheritable keys.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(obj) = dict.get(key) {
            return doc.dereference(obj).ok().map(|(_, obj)| obj);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn media_box(doc: &Document, page_id: ObjectId) -> Option<[f32; 4]> {
    let values: Vec<f32> = inherited(doc, page_id, b"MediaBox")?
        .as_array()
        .ok()?
        .iter()
        .filter_map(|obj| doc.dereference(obj).ok().and_then(|(_, o)| number(o)))
        .collect();

    match values.as_slice() {
        [a, b, c, d] => Some([a.min(*c), b.min(*d), a.max(*c), b.max(*d)]),
        _ => None,
    }
}

fn walk_page(doc: &Document, page_id: ObjectId) -> Result<(Vec<Line>, Vec<f32>)> {
    let raw = doc.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;

    let xobjects = inherited(doc, page_id, b"Resources")
        .and_then(|res| res.as_dict().ok())
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok());

    let mut walker = TextWalker::new(doc, xobjects, font_encodings(doc, page_id));
    walker.run(&content);

    debug!(
        "Page object {:?}: {} text pieces, {} images",
        page_id,
        walker.pieces.len(),
        walker.images.len()
    );

    Ok((assemble_lines(walker.pieces), walker.images))
}

fn assemble_lines(pieces: Vec<Piece>) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();

    for piece in pieces {
        match lines.last_mut() {
            Some(line) if (line.y - piece.y).abs() <= 0.5 * line.size.max(piece.size).max(1.0) => {
                let gap = piece.x - line.end_x;
                if gap > 0.2 * piece.size && !line.text.ends_with(' ') && !piece.text.starts_with(' ') {
                    line.text.push(' ');
                }
                line.text.push_str(&piece.text);
                line.end_x = line.end_x.max(piece.x + piece.width);
                line.size = line.size.max(piece.size);
            }
            _ => lines.push(Line {
                x: piece.x,
                y: piece.y,
                size: piece.size,
                end_x: piece.x + piece.width,
                text: piece.text,
            }),
        }
    }

    for line in &mut lines {
        line.text = line.text.trim().to_string();
    }
    lines.retain(|l| !l.text.is_empty());
    lines
}

/// Group consecutive lines into blocks, splitting on large vertical gaps or
/// when the flow jumps back up the page.
fn group_blocks(lines: &[Line], page_top: f32) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<&Line> = Vec::new();

    let flush = |current: &mut Vec<&Line>, blocks: &mut Vec<TextBlock>| {
        if let Some(first) = current.first() {
            let text = current.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n");
            blocks.push(TextBlock::text((page_top - first.y - first.size).max(0.0), text));
        }
        current.clear();
    };

    for line in lines {
        if let Some(prev) = current.last() {
            let size = prev.size.max(line.size).max(1.0);
            let gap = prev.y - line.y;
            if gap > 1.8 * size || gap < -0.5 * size {
                flush(&mut current, &mut blocks);
            }
        }
        current.push(line);
    }
    flush(&mut current, &mut blocks);

    blocks
}

fn rect(dict: &Dictionary, doc: &Document) -> Option<[f32; 4]> {
    let (_, obj) = doc.dereference(dict.get(b"Rect").ok()?).ok()?;
    let values: Vec<f32> = obj.as_array().ok()?.iter().filter_map(number).collect();
    match values.as_slice() {
        [a, b, c, d] => Some([a.min(*c), b.min(*d), a.max(*c), b.max(*d)]),
        _ => None,
    }
}

fn lookup_name_tree<'a>(doc: &'a Document, node: &'a Dictionary, key: &[u8], depth: usize) -> Option<&'a Object> {
    if depth > 16 {
        return None;
    }
    if let Ok(names) = node.get(b"Names").and_then(|n| n.as_array()) {
        for pair in names.chunks(2) {
            if let [Object::String(name, _), value] = pair {
                if name.as_slice() == key {
                    return Some(value);
                }
            }
        }
    }
    if let Ok(kids) = node.get(b"Kids").and_then(|k| k.as_array()) {
        for kid in kids {
            let Some(kid) = doc.dereference(kid).ok().and_then(|(_, k)| k.as_dict().ok()) else {
                continue;
            };
            if let Some(found) = lookup_name_tree(doc, kid, key, depth + 1) {
                return Some(found);
            }
        }
    }
    None
}

fn named_destination<'a>(doc: &'a Document, name: &[u8]) -> Option<&'a Object> {
    let catalog = doc
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|root| doc.dereference(root).ok())
        .and_then(|(_, root)| root.as_dict().ok())?;

    let from_dests = catalog
        .get(b"Dests")
        .ok()
        .and_then(|d| doc.dereference(d).ok())
        .and_then(|(_, d)| d.as_dict().ok())
        .and_then(|d| d.get(name).ok());
    if from_dests.is_some() {
        return from_dests;
    }

    let tree = catalog
        .get(b"Names")
        .ok()
        .and_then(|n| doc.dereference(n).ok())
        .and_then(|(_, n)| n.as_dict().ok())
        .and_then(|n| n.get(b"Dests").ok())
        .and_then(|d| doc.dereference(d).ok())
        .and_then(|(_, d)| d.as_dict().ok())?;
    lookup_name_tree(doc, tree, name, 0)
}

fn resolve_destination(
    doc: &Document,
    dest: &Object,
    page_numbers: &HashMap<ObjectId, usize>,
    depth: usize,
) -> Option<usize> {
    if depth > 4 {
        return None;
    }
    let (_, dest) = doc.dereference(dest).ok()?;

    match dest {
        Object::Array(items) => match items.first()? {
            Object::Reference(id) => page_numbers.get(id).copied(),
            Object::Integer(n) if *n >= 0 => Some(*n as usize),
            _ => None,
        },
        Object::Dictionary(dict) => resolve_destination(doc, dict.get(b"D").ok()?, page_numbers, depth + 1),
        Object::String(name, _) | Object::Name(name) => {
            resolve_destination(doc, named_destination(doc, name)?, page_numbers, depth + 1)
        }
        _ => None,
    }
}

fn link_target(doc: &Document, annot: &Dictionary, page_numbers: &HashMap<ObjectId, usize>) -> Option<usize> {
    if let Ok(dest) = annot.get(b"Dest") {
        return resolve_destination(doc, dest, page_numbers, 0);
    }

    let (_, action) = doc.dereference(annot.get(b"A").ok()?).ok()?;
    let action = action.as_dict().ok()?;
    if action.get(b"S").ok()?.as_name().ok()? != b"GoTo" {
        return None;
    }
    resolve_destination(doc, action.get(b"D").ok()?, page_numbers, 0)
}

fn page_links(
    doc: &Document,
    page_id: ObjectId,
    page_index: usize,
    page_numbers: &HashMap<ObjectId, usize>,
    lines: &[Line],
) -> Vec<PageLink> {
    let Some(annots) = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|a| doc.dereference(a).ok())
        .and_then(|(_, a)| a.as_array().ok())
    else {
        return Vec::new();
    };

    let mut links = Vec::new();

    for annot in annots {
        let Some(annot) = doc.dereference(annot).ok().and_then(|(_, a)| a.as_dict().ok()) else {
            continue;
        };
        let is_link = annot
            .get(b"Subtype")
            .and_then(|s| s.as_name())
            .map(|s| s == b"Link")
            .unwrap_or(false);
        if !is_link {
            continue;
        }

        let (Some([x1, y1, x2, y2]), Some(dest_page)) = (rect(annot, doc), link_target(doc, annot, page_numbers)) else {
            continue;
        };

        let tolerance = 2.0;
        let in_row = |l: &&Line| l.y >= y1 - tolerance && l.y <= y2 + tolerance;
        let row: Vec<&Line> = lines.iter().filter(in_row).collect();

        let clip_text = row
            .iter()
            .filter(|l| l.x >= x1 - tolerance && l.x <= x2 + tolerance)
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let row_text = row.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join(" ");

        links.push(PageLink {
            source_page: page_index,
            clip_text,
            row_text,
            dest_page,
        });
    }

    links
}
