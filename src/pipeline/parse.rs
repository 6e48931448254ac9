//! Page parsing: split a document into numbered page units of plain text.
//!
//! | Format  | Page unit                                         |
//! |---------|---------------------------------------------------|
//! | `.pdf`  | physical page (pdfium text layer)                 |
//! | `.pptx` | slide, in slide-number order                      |
//! | `.docx` | run of paragraphs reaching [`DOCX_PAGE_CHARS`]    |
//! | `.txt`  | run of lines exceeding [`TEXT_PAGE_CHARS`]        |
//!
//! Parsing is blocking (zip inflate, XML scan, pdfium FFI) and runs on the
//! `spawn_blocking` pool. Every returned text has gone through
//! [`normalize_text`].

use crate::error::DigestError;
use crate::output::PageContent;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

/// A `.docx` page is closed once its paragraphs reach this many chars.
pub const DOCX_PAGE_CHARS: usize = 1200;
/// A text page is closed once its joined lines exceed this many chars.
pub const TEXT_PAGE_CHARS: usize = 1500;

/// Parse a document into page units.
pub async fn parse_pages(path: &Path, extension: &str) -> Result<Vec<PageContent>, DigestError> {
    let path = path.to_path_buf();
    let extension = extension.to_lowercase();
    tokio::task::spawn_blocking(move || parse_pages_blocking(&path, &extension))
        .await
        .map_err(|e| DigestError::Internal(format!("Parse task panicked: {}", e)))?
}

/// Blocking implementation of [`parse_pages`].
pub fn parse_pages_blocking(path: &Path, extension: &str) -> Result<Vec<PageContent>, DigestError> {
    let pages = match extension {
        ".pdf" => parse_pdf(path)?,
        ".pptx" => parse_pptx(path)?,
        ".docx" => parse_docx(path)?,
        ".txt" | ".md" => parse_plain_text(path)?,
        other => {
            return Err(DigestError::UnsupportedFileType {
                extension: other.to_string(),
            })
        }
    };
    info!("Parsed {} into {} pages", path.display(), pages.len());
    Ok(pages)
}

/// Remove BOMs, compose to NFC and unify line endings to `\n`.
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.chars().filter(|&c| c != '\u{feff}').nfc().collect();
    composed.replace("\r\n", "\n").replace('\r', "\n")
}

fn parse_failed(path: &Path, detail: impl std::fmt::Display) -> DigestError {
    DigestError::DocumentParseFailed {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Bind to pdfium: `PDFIUM_LIB_PATH` when set, else the system library.
fn bind_pdfium() -> Result<Pdfium, DigestError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(lib) if !lib.trim().is_empty() => Pdfium::bind_to_library(PathBuf::from(lib)),
        _ => Pdfium::bind_to_system_library(),
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| DigestError::PdfiumBindingFailed(e.to_string()))
}

fn parse_pdf(path: &Path) -> Result<Vec<PageContent>, DigestError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| parse_failed(path, format!("{:?}", e)))?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let page_number = idx + 1;
        let text = match page.text() {
            Ok(text) => text.all(),
            Err(e) => {
                warn!("Page {}: text extraction failed: {:?}", page_number, e);
                String::new()
            }
        };
        pages.push(PageContent::new(page_number, normalize_text(&text)));
    }
    debug!("PDF text extracted from {} pages", pages.len());
    Ok(pages)
}

// ── Office Open XML ──────────────────────────────────────────────────────

static RE_SLIDE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

fn open_archive(path: &Path) -> Result<zip::ZipArchive<std::fs::File>, DigestError> {
    let file = std::fs::File::open(path).map_err(|e| parse_failed(path, e))?;
    zip::ZipArchive::new(file).map_err(|e| parse_failed(path, format!("not a valid package: {e}")))
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, String> {
    let mut part = archive
        .by_name(name)
        .map_err(|e| format!("missing part {name}: {e}"))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| format!("unreadable part {name}: {e}"))?;
    Ok(xml)
}

/// Collect the text of every paragraph element `para` from `xml`.
///
/// Text is taken only from `text` elements. `tab` and `br` become `\t` and
/// `\n`. Namespace prefixes are ignored.
fn xml_paragraphs(xml: &str, para: &[u8], text: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local = e.local_name();
                if local.as_ref() == para {
                    in_paragraph = true;
                    current.clear();
                } else if local.as_ref() == text {
                    in_text = true;
                }
            }
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" if in_paragraph => current.push('\t'),
                b"br" if in_paragraph => current.push('\n'),
                local if local == para => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                let unescaped = e.unescape().map_err(|e| e.to_string())?;
                current.push_str(&unescaped);
            }
            Ok(Event::CData(ref e)) if in_text => {
                current.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(ref e)) => {
                let local = e.local_name();
                if local.as_ref() == text {
                    in_text = false;
                } else if local.as_ref() == para && in_paragraph {
                    in_paragraph = false;
                    paragraphs.push(std::mem::take(&mut current));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.error_position(),
                    e
                ))
            }
            _ => {}
        }
    }
    Ok(paragraphs)
}

fn parse_pptx(path: &Path) -> Result<Vec<PageContent>, DigestError> {
    let mut archive = open_archive(path)?;

    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = RE_SLIDE_PART.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut pages = Vec::with_capacity(slides.len());
    for (idx, (_, part)) in slides.iter().enumerate() {
        let xml = read_part(&mut archive, part).map_err(|e| parse_failed(path, e))?;
        let paragraphs = xml_paragraphs(&xml, b"p", b"t").map_err(|e| parse_failed(path, e))?;
        let text = paragraphs
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        pages.push(PageContent::new(idx + 1, normalize_text(&text)));
    }
    Ok(pages)
}

fn parse_docx(path: &Path) -> Result<Vec<PageContent>, DigestError> {
    let mut archive = open_archive(path)?;
    let xml = read_part(&mut archive, "word/document.xml").map_err(|e| parse_failed(path, e))?;
    let paragraphs = xml_paragraphs(&xml, b"p", b"t").map_err(|e| parse_failed(path, e))?;
    Ok(group_paragraphs(
        paragraphs.iter().map(|p| normalize_text(p.trim())),
    ))
}

/// Group non-empty paragraphs into pages of at least [`DOCX_PAGE_CHARS`].
fn group_paragraphs(paragraphs: impl Iterator<Item = String>) -> Vec<PageContent> {
    let mut pages = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut chars = 0;

    for text in paragraphs.filter(|p| !p.is_empty()) {
        chars += text.chars().count();
        buffer.push(text);
        if chars >= DOCX_PAGE_CHARS {
            pages.push(PageContent::new(pages.len() + 1, buffer.join("\n")));
            buffer.clear();
            chars = 0;
        }
    }
    if !buffer.is_empty() {
        pages.push(PageContent::new(pages.len() + 1, buffer.join("\n")));
    }
    if pages.is_empty() {
        pages.push(PageContent::new(1, ""));
    }
    pages
}

// ── Plain text ───────────────────────────────────────────────────────────

fn parse_plain_text(path: &Path) -> Result<Vec<PageContent>, DigestError> {
    let bytes = std::fs::read(path).map_err(|e| parse_failed(path, e))?;
    let content = normalize_text(&String::from_utf8_lossy(&bytes));
    Ok(chunk_lines(&content))
}

/// Accumulate lines; a page is closed before the next line once the joined
/// buffer exceeds [`TEXT_PAGE_CHARS`].
fn chunk_lines(content: &str) -> Vec<PageContent> {
    let mut pages = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    // Length of `buffer.join("\n")` in chars.
    let mut joined = 0;

    for line in content.lines() {
        if joined > TEXT_PAGE_CHARS {
            pages.push(PageContent::new(pages.len() + 1, buffer.join("\n")));
            buffer.clear();
            joined = 0;
        }
        if !buffer.is_empty() {
            joined += 1;
        }
        joined += line.chars().count();
        buffer.push(line);
    }
    if !buffer.is_empty() {
        pages.push(PageContent::new(pages.len() + 1, buffer.join("\n")));
    }
    if pages.is_empty() {
        pages.push(PageContent::new(1, ""));
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_package(dir: &Path, name: &str, parts: &[(&str, String)]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (part, body) in parts {
            zip.start_file(*part, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn slide(paragraphs: &[&[&str]]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|runs| {
                let runs: String = runs.iter().map(|r| format!("<a:r><a:t>{r}</a:t></a:r>")).collect();
                format!("<a:p>{runs}</a:p>")
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree><p:sp><p:txBody>{body}</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
        )
    }

    fn document(paragraphs: &[String]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="w"><w:body>{body}</w:body></w:document>"#
        )
    }

    #[test]
    fn normalize_strips_bom_and_crlf() {
        assert_eq!(normalize_text("\u{feff}a\r\nb\rc"), "a\nb\nc");
        // "e" + combining acute composes to a single scalar.
        assert_eq!(normalize_text("e\u{0301}"), "\u{00e9}");
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_package(
            dir.path(),
            "deck.pptx",
            &[
                ("ppt/slides/slide10.xml", slide(&[&["第十頁"]])),
                ("ppt/slides/slide2.xml", slide(&[&["營收", "成長"], &["毛利 &amp; 成本"]])),
                ("ppt/slides/slide1.xml", slide(&[&["年度報告"]])),
                ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>".to_string()),
            ],
        );

        let pages = parse_pages_blocking(&path, ".pptx").unwrap();
        let texts: Vec<&str> = pages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["年度報告", "營收成長\n毛利 & 成本", "第十頁"]);
        assert_eq!(pages[2].page_number, 3);
    }

    #[test]
    fn docx_groups_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let long = "字".repeat(700);
        let path = write_package(
            dir.path(),
            "memo.docx",
            &[(
                "word/document.xml",
                document(&[long.clone(), String::new(), long.clone(), "結語".to_string()]),
            )],
        );

        let pages = parse_pages_blocking(&path, ".docx").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].text, format!("{long}\n{long}"));
        assert_eq!(pages[1].text, "結語");
    }

    #[test]
    fn empty_docx_yields_one_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_package(
            dir.path(),
            "empty.docx",
            &[("word/document.xml", document(&[]))],
        );
        let pages = parse_pages_blocking(&path, ".docx").unwrap();
        assert_eq!(pages, vec![PageContent::new(1, "")]);
    }

    #[test]
    fn corrupt_package_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        let err = parse_pages_blocking(&path, ".docx").unwrap_err();
        assert!(matches!(err, DigestError::DocumentParseFailed { .. }));
    }

    #[test]
    fn text_chunks_after_threshold() {
        let line = "a".repeat(500);
        let content = vec![line.as_str(); 5].join("\n");
        let pages = chunk_lines(&content);
        // The check runs before each append: after three lines the buffer
        // holds 1502 chars, so the fourth line opens page 2.
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].text.lines().count(), 3);
        assert_eq!(pages[1].text, format!("{line}\n{line}"));
    }

    #[test]
    fn empty_text_yields_one_page() {
        assert_eq!(chunk_lines(""), vec![PageContent::new(1, "")]);
    }

    #[tokio::test]
    async fn plain_text_file_is_lossy_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"\xef\xbb\xbfline one\r\nline \xff two").unwrap();
        let pages = parse_pages(&path, ".TXT").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].text.starts_with("line one\nline "));
        assert!(pages[0].text.ends_with(" two"));
    }
}
