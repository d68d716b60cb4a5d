use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use super::{ContentUnit, UnitOrigin};
use crate::error::{Result, SourceError};

fn blank_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n\s*").expect("valid blank-line regex"))
}

/// Read a UTF-8 text file (a leading BOM is dropped).
pub fn load_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    let text = String::from_utf8(bytes.to_vec()).map_err(|_| SourceError::Encoding {
        path: path.to_path_buf(),
    })?;

    info!("Loaded text file: {:?} ({} characters)", path, text.len());
    Ok(text.replace("\r\n", "\n"))
}

/// Split plain text into one unit per blank-line separated paragraph.
pub fn text_units(text: &str) -> Vec<ContentUnit> {
    blank_line_re()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, paragraph)| {
            ContentUnit::new(format!("t{}", i), i, paragraph.to_string(), UnitOrigin::Paragraph(i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_text_units_split_on_blank_lines() {
        let units = text_units("First para\nstill first.\n\n  \nSecond.\n\n\nThird.");
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].text, "First para\nstill first.");
        assert_eq!(units[1].id, "t1");
        assert_eq!(units[2].order_index, 2);
    }

    #[test]
    fn test_load_text_strips_bom_and_crlf() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\xEF\xBB\xBFHello.\r\nWorld.").unwrap();

        let text = load_text(file.path()).unwrap();
        assert_eq!(text, "Hello.\nWorld.");
    }

    #[test]
    fn test_load_text_rejects_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x66, 0xff, 0xfe, 0x00]).unwrap();

        let err = load_text(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::Encoding { .. }));
    }
}
