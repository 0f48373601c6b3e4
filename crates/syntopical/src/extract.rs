//! Text and metadata extraction for paper files.
//!
//! | Extension | Text | Metadata |
//! |-----------|------|----------|
//! | `.pdf` | `pdf-extract` | `lopdf` Info dictionary (`Title`, `Author`, `CreationDate`) |
//! | `.txt`, `.md`, `.markdown` | UTF-8 contents | none |
//!
//! Missing fields fall back to heuristics over the text: the title is the
//! first non-empty line (then the file stem), and the abstract, keywords and
//! DOI are located by their usual labels. Every failure is an
//! [`Error::Extraction`]; the caller skips that file.

use std::path::Path;

use syntopical_core::error::{Error, Result};
use syntopical_core::models::PaperMetadata;

/// Longest title kept from the first-line heuristic, in bytes.
const MAX_TITLE_BYTES: usize = 200;
/// Abstract length used when no closing section header is found.
const ABSTRACT_FALLBACK_BYTES: usize = 1500;

/// Result of extracting one file.
#[derive(Debug, Clone)]
pub struct ExtractedPaper {
    pub title: String,
    pub text: String,
    pub metadata: PaperMetadata,
}

/// Fields read from a PDF's Info dictionary.
#[derive(Debug, Default, Clone, PartialEq)]
struct PdfInfo {
    title: Option<String>,
    author: Option<String>,
    creation_date: Option<String>,
}

/// File types `extract_paper` understands, by lowercase extension.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown"];

pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Read `path` and extract its text and bibliographic metadata.
pub fn extract_paper(path: &Path) -> Result<ExtractedPaper> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Extraction(format!("{}: {}", path.display(), e)))?;

    let (text, info) = match extension(path).as_deref() {
        Some("pdf") => {
            let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                Error::Extraction(format!("{}: PDF extraction failed: {}", path.display(), e))
            })?;
            (text, read_pdf_info(&bytes))
        }
        Some("txt") | Some("md") | Some("markdown") => {
            let text = String::from_utf8(bytes).map_err(|_| {
                Error::Extraction(format!("{}: file is not valid UTF-8", path.display()))
            })?;
            (text, PdfInfo::default())
        }
        _ => {
            return Err(Error::Extraction(format!(
                "{}: unsupported file type",
                path.display()
            )))
        }
    };

    if text.trim().is_empty() {
        return Err(Error::Extraction(format!(
            "{}: no extractable text",
            path.display()
        )));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled");
    let title = info
        .title
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_string())
        .or_else(|| title_from_text(&text))
        .unwrap_or_else(|| stem.to_string());

    let metadata = PaperMetadata {
        authors: info.author.as_deref().map(split_authors).unwrap_or_default(),
        published: info.creation_date.as_deref().and_then(parse_pdf_date),
        abstract_text: find_abstract(&text),
        doi: find_doi(&text),
        keywords: find_keywords(&text),
        extra: serde_json::json!({}),
    };

    Ok(ExtractedPaper {
        title,
        text,
        metadata,
    })
}

/// Read the Info dictionary. Unreadable or absent metadata is not an error.
fn read_pdf_info(bytes: &[u8]) -> PdfInfo {
    let Ok(doc) = lopdf::Document::load_mem(bytes) else {
        return PdfInfo::default();
    };
    let info = match doc.trailer.get(b"Info") {
        Ok(lopdf::Object::Reference(id)) => doc.get_object(*id).and_then(|o| o.as_dict()).ok(),
        Ok(lopdf::Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let Some(info) = info else {
        return PdfInfo::default();
    };

    let field = |key: &[u8]| match info.get(key) {
        Ok(lopdf::Object::String(raw, _)) => Some(decode_pdf_string(raw)),
        _ => None,
    };
    PdfInfo {
        title: field(b"Title"),
        author: field(b"Author"),
        creation_date: field(b"CreationDate"),
    }
}

/// Decode a PDF text string: UTF-16BE with a byte-order mark, otherwise
/// one byte per char.
fn decode_pdf_string(raw: &[u8]) -> String {
    if let Some(utf16) = raw.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    raw.iter().map(|&b| b as char).collect()
}

/// `D:YYYYMMDDHHmmSS…` → `YYYY-MM-DD` (or `YYYY-MM` / `YYYY` when shorter).
fn parse_pdf_date(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.len() {
        0..=3 => None,
        4 | 5 => Some(digits[..4].to_string()),
        6 | 7 => Some(format!("{}-{}", &digits[..4], &digits[4..6])),
        _ => Some(format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..8])),
    }
}

/// Split an author field on `,`, `;` and ` and `.
fn split_authors(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

fn title_from_text(text: &str) -> Option<String> {
    let line = text
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())?;
    Some(truncate_at_char(line, MAX_TITLE_BYTES).to_string())
}

fn truncate_at_char(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// The text between an "Abstract" label and the next section marker
/// ("introduction", "keywords", "1.", a line-leading "I.", "background"),
/// or the following [`ABSTRACT_FALLBACK_BYTES`] if no marker follows.
fn find_abstract(text: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let start = lower.find("abstract")? + "abstract".len();

    let end = ["introduction", "keywords", "1.", "\ni.", "background"]
        .iter()
        .filter_map(|marker| lower[start..].find(marker).map(|p| start + p))
        .min()
        .unwrap_or_else(|| (start + ABSTRACT_FALLBACK_BYTES).min(text.len()));

    let mut end = end;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let body = text[start..end]
        .trim_start_matches(|c: char| c == ':' || c == '.' || c == '-' || c.is_whitespace())
        .trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Comma- or semicolon-separated terms on the line after a "Keywords" label.
fn find_keywords(text: &str) -> Vec<String> {
    let lower = text.to_ascii_lowercase();
    let Some(pos) = lower.find("keywords") else {
        return Vec::new();
    };
    let rest = &text[pos + "keywords".len()..];
    let line = rest
        .trim_start_matches(|c: char| c == ':' || c == '-' || c == ' ')
        .lines()
        .next()
        .unwrap_or_default();
    line.split([',', ';'])
        .map(|k| k.trim().trim_end_matches('.'))
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// First DOI following a `doi:` or `doi.org/` label.
fn find_doi(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = ["doi.org/", "doi:"]
        .iter()
        .filter_map(|label| lower.find(label).map(|p| p + label.len()))
        .min()?;
    let doi: String = text[start..]
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    let doi = doi.trim_end_matches(['.', ',', ';', ')']);
    doi.starts_with("10.").then(|| doi.to_string())
}
