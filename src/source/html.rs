use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

const BLOCK_TAGS: [&str; 8] = ["h1", "h2", "h3", "h4", "h5", "h6", "p", "li"];

fn block_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| {
        Selector::parse("h1, h2, h3, h4, h5, h6, p, li").expect("valid block selector")
    })
}

fn image_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("img, image").expect("valid image selector"))
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>")
            .expect("valid script/style regex")
    })
}

fn body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("valid body regex"))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All visible text of a document, whitespace-collapsed. Empty means the
/// document carries no text (cover pages, image plates).
pub fn plain_text(html: &str) -> String {
    let without_code = script_style_re().replace_all(html, " ");
    let doc = Html::parse_document(&without_code);
    normalize_whitespace(&doc.root_element().text().collect::<Vec<_>>().join(" "))
}

fn has_nested_block(el: &ElementRef) -> bool {
    el.descendants().skip(1).any(|node| {
        node.value()
            .as_element()
            .map(|e| BLOCK_TAGS.contains(&e.name()))
            .unwrap_or(false)
    })
}

/// Text of each heading/paragraph/list-item block, in document order.
///
/// A block that contains another block is skipped so nested markup
/// (`<li><p>..</p></li>`) is not read twice.
pub fn text_blocks(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);

    doc.select(block_selector())
        .filter(|el| !has_nested_block(el))
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect()
}

/// `src` of every `<img>` and `href` of every SVG `<image>`, in document order.
pub fn image_sources(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);

    doc.select(image_selector())
        .filter_map(|el| el.value().attr("src").or_else(|| el.value().attr("href")))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
        .collect()
}

/// Inner markup of `<body>`, or the whole input if there is no body element.
pub fn body_inner(html: &str) -> &str {
    body_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html)
}

/// Resolve an `src` relative to the archive path of the document that uses it.
pub fn resolve_href(document_href: &str, src: &str) -> String {
    let src = src.split('#').next().unwrap_or("").replace("%20", " ");
    if src.starts_with('/') {
        return src.trim_start_matches('/').to_string();
    }

    let mut parts: Vec<&str> = document_href.split('/').collect();
    parts.pop();

    for segment in src.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_skips_script_and_style() {
        let html = "<html><head><style>p{color:red}</style></head><body><p>Text</p><script>alert('hi');</script><p>More text</p></body></html>";
        let text = plain_text(html);
        assert_eq!(text, "Text More text");
    }

    #[test]
    fn test_plain_text_empty_for_image_page() {
        let html = r#"<html><body><div><img src="../Images/cover.jpg"/></div></body></html>"#;
        assert!(plain_text(html).is_empty());
    }

    #[test]
    fn test_text_blocks_skip_nested() {
        let html = "<body><h1>Chapter 1</h1><p>Hello <b>World</b>!</p><ul><li><p>Item</p></li></ul></body>";
        assert_eq!(text_blocks(html), vec!["Chapter 1", "Hello World!", "Item"]);
    }

    #[test]
    fn test_image_sources() {
        let html = r#"<body><img src="a.png"/><svg><image href="../b.jpg"/></svg><img/></body>"#;
        assert_eq!(image_sources(html), vec!["a.png", "../b.jpg"]);
    }

    #[test]
    fn test_body_inner() {
        assert_eq!(body_inner("<html><body class=\"x\"><p>A</p></body></html>"), "<p>A</p>");
        assert_eq!(body_inner("<p>B</p>"), "<p>B</p>");
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS/Text/ch1.xhtml", "../Images/a.jpg"), "OEBPS/Images/a.jpg");
        assert_eq!(resolve_href("OEBPS/ch1.xhtml", "img/a%20b.png#x"), "OEBPS/img/a b.png");
        assert_eq!(resolve_href("ch1.xhtml", "a.png"), "a.png");
    }
}
