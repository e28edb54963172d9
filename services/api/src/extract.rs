//! services/api/src/extract.rs
//!
//! Upload validation and text extraction for attached files.
//!
//! Uploads are held entirely in memory as multipart field bytes; nothing is
//! ever written to disk, so there is no temp file to clean up on any path.

use tracing::error;

use crate::error::RequestError;

/// The upload size ceiling, enforced before a file is accepted.
pub const MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

/// The declared content types a file attachment may carry.
const ALLOWED_MIME_TYPES: [&str; 4] = [
    "text/plain",
    "text/csv",
    "application/json",
    "application/pdf",
];

/// Checks the declared content type against the allow-list.
pub fn validate_content_type(content_type: &str) -> Result<(), RequestError> {
    if ALLOWED_MIME_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(RequestError::UnsupportedFile(
            "File type not supported.".to_string(),
        ))
    }
}

/// Extracts the text of an accepted upload: PDFs via text extraction,
/// everything else via UTF-8 decode.
pub fn extract_text(content_type: &str, data: &[u8]) -> Result<String, RequestError> {
    if data.len() > MAX_FILE_BYTES {
        return Err(RequestError::FileTooLarge);
    }

    if content_type == "application/pdf" {
        pdf_extract::extract_text_from_mem(data).map_err(|e| {
            error!("PDF text extraction failed: {e}");
            RequestError::UnsupportedFile("Could not extract text from the PDF file.".to_string())
        })
    } else {
        String::from_utf8(data.to_vec()).map_err(|e| {
            error!("Uploaded file is not valid UTF-8: {e}");
            RequestError::UnsupportedFile("Uploaded file is not valid UTF-8 text.".to_string())
        })
    }
}

/// Composes the provider message: file text prefixed to the question when an
/// upload is present, the question verbatim otherwise.
pub fn compose_message(file_text: Option<&str>, question: &str) -> String {
    match file_text {
        Some(text) => format!("{}\n{}", text, question),
        None => question.to_string(),
    }
}
