use pdfium_render::prelude::*;
use tracing::warn;

pub const MEDIA_TYPE_PDF: &str = "application/pdf";
pub const MEDIA_TYPE_TEXT: &str = "text/plain";

pub const ALLOWED_MEDIA_TYPES: &[&str] = &[MEDIA_TYPE_PDF, MEDIA_TYPE_TEXT];

/// Strips any parameters (`text/plain; charset=utf-8` -> `text/plain`).
pub fn normalize_media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_allowed_media_type(value: &str) -> bool {
    let normalized = normalize_media_type(value);
    ALLOWED_MEDIA_TYPES.iter().any(|allowed| *allowed == normalized)
}

/// Best-effort plain-text extraction for a stored document. Returns None when
/// the bytes yield no usable text; callers skip the document rather than fail
/// the whole corpus. Blocking (pdfium), so call from `spawn_blocking`.
pub fn extract_text(media_type: &str, bytes: &[u8]) -> Option<String> {
    let text = match normalize_media_type(media_type).as_str() {
        MEDIA_TYPE_TEXT => String::from_utf8_lossy(bytes).into_owned(),
        MEDIA_TYPE_PDF => match extract_pdf_text(bytes) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "pdf text extraction failed");
                return None;
            }
        },
        other => {
            warn!(media_type = %other, "unsupported media type for text extraction");
            return None;
        }
    };

    if text.trim().is_empty() {
        return None;
    }

    Some(text)
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|err| format!("load pdf: {err}"))?;

    let mut combined = String::new();
    let pages = document.pages();
    for page_index in 0..pages.len() {
        let page = pages
            .get(page_index)
            .map_err(|err| format!("load page {page_index}: {err}"))?;
        if let Ok(page_text) = page.text() {
            for segment in page_text.segments().iter() {
                combined.push_str(&segment.text());
                combined.push('\n');
            }
        };
    }

    Ok(combined)
}
