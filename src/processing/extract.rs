//! Text extraction for PDF, plain text, and markdown documents.
//!
//! PDF parsing runs on the blocking pool; `pdf-extract` separates pages with form feeds, which
//! is also how the page count is derived. Text and markdown are decoded as UTF-8 and passed
//! through unchanged apart from a leading byte-order mark.

use super::types::MediaType;
use thiserror::Error;

const FORM_FEED: char = '\x0c';

/// Errors raised while extracting text from a single document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Text document was not valid UTF-8.
    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// PDF parser rejected the document.
    #[error("failed to parse PDF: {0}")]
    Pdf(String),
    /// Blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Plain text and basic metadata recovered from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    /// Extracted text content.
    pub text: String,
    /// Number of pages, when the format has pages.
    pub page_count: Option<usize>,
    /// First markdown heading, or the file stem.
    pub title: Option<String>,
    /// Format the text was extracted from.
    pub media_type: MediaType,
}

/// Extract text from raw bytes, returning `None` when the extension is unsupported.
pub async fn extract_document(
    bytes: Vec<u8>,
    filename: &str,
) -> Result<Option<ExtractedDocument>, ExtractionError> {
    let Some(media_type) = MediaType::from_filename(filename) else {
        tracing::debug!(filename, "Skipping unsupported document type");
        return Ok(None);
    };

    let (text, page_count) = match media_type {
        MediaType::Pdf => {
            let (text, pages) = tokio::task::spawn_blocking(move || extract_pdf(&bytes)).await??;
            (text, Some(pages))
        }
        MediaType::Text | MediaType::Markdown => (decode_text(bytes)?, None),
    };

    let title = match media_type {
        MediaType::Markdown => markdown_heading(&text).or_else(|| file_stem(filename)),
        MediaType::Pdf | MediaType::Text => file_stem(filename),
    };

    tracing::debug!(
        filename,
        media_type = media_type.mime(),
        characters = text.chars().count(),
        page_count,
        "Extracted document"
    );

    Ok(Some(ExtractedDocument {
        text,
        page_count,
        title,
        media_type,
    }))
}

fn extract_pdf(bytes: &[u8]) -> Result<(String, usize), ExtractionError> {
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|err| ExtractionError::Pdf(err.to_string()))?;
    let pages = split_pages(&raw);
    if pages.iter().all(|page| page.is_empty()) {
        tracing::warn!("PDF produced no text; it may be a scanned document");
    }
    let page_count = pages.len().max(1);
    Ok((pages.join("\n\n"), page_count))
}

fn split_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split(FORM_FEED)
        .map(|page| page.trim().to_string())
        .collect();
    // pdf-extract emits a trailing form feed after the last page.
    while pages.len() > 1 && pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

fn decode_text(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    let text = String::from_utf8(bytes)?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

fn markdown_heading(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
        .filter(|heading| !heading.is_empty())
        .map(str::to_string)
}

fn file_stem(filename: &str) -> Option<String> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem).trim();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
