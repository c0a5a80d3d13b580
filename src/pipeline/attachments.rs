//! PDF attachment text extraction.
//!
//! Bank receipts arrive as `application/octet-stream` (sometimes
//! `application/pdf`) parts. Every such part anywhere in the MIME tree is
//! parsed as a PDF and its text is appended, page by page.

use std::panic::{self, AssertUnwindSafe};

use lopdf::Document;
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::mail::RawMessage;

/// Concatenated text of every readable PDF attachment, in part order.
///
/// Unreadable parts are logged and skipped; a message with none yields
/// an empty string.
pub fn extract_text(message: &RawMessage) -> String {
    let Some(parsed) = MessageParser::default().parse(&message.raw) else {
        warn!(id = %message.id, "{}", DecodeError::Mime);
        return String::new();
    };

    let mut candidates = Vec::new();
    collect_candidates(&parsed.parts, &mut candidates);
    debug!(id = %message.id, parts = candidates.len(), "Found binary attachment parts");

    let mut text = String::new();
    for (index, bytes) in candidates.into_iter().enumerate() {
        match pdf_text(bytes) {
            Ok(part_text) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&part_text);
            }
            Err(e) => {
                warn!(id = %message.id, part = index, "Skipping attachment: {e}");
            }
        }
    }
    text
}

/// Walk the part tree, descending into attached messages.
fn collect_candidates<'m>(parts: &'m [MessagePart<'_>], out: &mut Vec<&'m [u8]>) {
    for part in parts {
        match &part.body {
            PartType::Message(inner) => collect_candidates(&inner.parts, out),
            PartType::Binary(_) | PartType::InlineBinary(_) if is_pdf_candidate(part) => {
                out.push(part.contents());
            }
            _ => {}
        }
    }
}

fn is_pdf_candidate(part: &MessagePart<'_>) -> bool {
    let Some(ct) = MimeHeaders::content_type(part) else {
        return false;
    };
    ct.ctype().eq_ignore_ascii_case("application")
        && ct
            .subtype()
            .is_some_and(|s| s.eq_ignore_ascii_case("octet-stream") || s.eq_ignore_ascii_case("pdf"))
}

/// Text of every page in page order. A page that cannot be decoded
/// contributes nothing; a payload that is not a PDF is an error.
pub fn pdf_text(bytes: &[u8]) -> Result<String, DecodeError> {
    // lopdf can panic on malformed xref tables.
    panic::catch_unwind(AssertUnwindSafe(|| read_pages(bytes)))
        .unwrap_or(Err(DecodeError::ParserPanicked))
}

fn read_pages(bytes: &[u8]) -> Result<String, DecodeError> {
    let doc = Document::load_mem(bytes).map_err(|e| DecodeError::NotPdf(e.to_string()))?;

    let mut text = String::new();
    for page in doc.get_pages().keys() {
        match doc.extract_text(&[*page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Err(e) => debug!(page, "No extractable text on page: {e}"),
        }
    }
    Ok(text)
}
