//! Turn files on disk into [`Document`]s.
//!
//! Loading is selected by extension through a static table:
//!
//! | Extensions            | Format | Output                              |
//! |-----------------------|--------|-------------------------------------|
//! | `py` `md` `txt` `json`| Text   | one Document, strict UTF-8          |
//! | `pdf`                 | Pdf    | one Document per page with text     |
//! | `docx`                | Docx   | one Document, paragraphs on lines   |
//!
//! All failures come back as [`LoadError`]; the ingestor logs them and moves
//! on to the next file.

use std::io::Read;
use std::path::Path;

use kb_harness_core::models::{Document, META_FORMAT, META_PAGE};

use crate::error::LoadError;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Text,
    Pdf,
    Docx,
}

const FORMATS: &[(&str, FileFormat)] = &[
    ("py", FileFormat::Text),
    ("md", FileFormat::Text),
    ("txt", FileFormat::Text),
    ("json", FileFormat::Text),
    ("pdf", FileFormat::Pdf),
    ("docx", FileFormat::Docx),
];

impl FileFormat {
    /// Look up the format for `path` by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        FORMATS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, format)| *format)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Text => "text",
            FileFormat::Pdf => "pdf",
            FileFormat::Docx => "docx",
        }
    }

    pub fn load(&self, path: &Path) -> Result<Vec<Document>, LoadError> {
        let bytes = std::fs::read(path)?;
        let source = path.to_string_lossy();
        let docs = match self {
            FileFormat::Text => vec![Document::new(source, String::from_utf8(bytes)?)],
            FileFormat::Pdf => pdf_pages(&bytes)?
                .into_iter()
                .map(|(page, text)| {
                    Document::new(source.clone(), text).with_meta(META_PAGE, page.to_string())
                })
                .collect(),
            FileFormat::Docx => vec![Document::new(source, docx_text(&bytes)?)],
        };
        Ok(docs
            .into_iter()
            .map(|d| d.with_meta(META_FORMAT, self.as_str()))
            .collect())
    }
}

/// Load `path` with the format its extension maps to.
pub fn load_file(path: &Path) -> Result<Vec<Document>, LoadError> {
    let format = FileFormat::from_path(path)
        .ok_or_else(|| LoadError::Unsupported(path.display().to_string()))?;
    format.load(path)
}

/// 1-based page numbers paired with their text; blank pages are dropped.
fn pdf_pages(bytes: &[u8]) -> Result<Vec<(usize, String)>, LoadError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| LoadError::Pdf(e.to_string()))?;
    let pages: Vec<(usize, String)> = pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| (i + 1, text))
        .collect();
    if pages.is_empty() {
        return Err(LoadError::Pdf("no extractable text".to_string()));
    }
    Ok(pages)
}

fn docx_text(bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| LoadError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY)
        .map_err(|_| LoadError::Ooxml(format!("{} not found", DOCX_BODY)))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| LoadError::Ooxml(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadError::Ooxml(format!(
            "{} exceeds size limit ({} bytes)",
            DOCX_BODY, MAX_XML_ENTRY_BYTES
        )));
    }
    paragraph_text(&xml)
}

/// Text of every `<w:t>` run, one line per `<w:p>` paragraph.
fn paragraph_text(xml: &[u8]) -> Result<String, LoadError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| LoadError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}
