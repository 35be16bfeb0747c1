//! MIME walking for fetched messages.

use mailparse::{DispositionType, ParsedMail};
use regflow_core::error::{RegflowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Html,
    Plain,
}

/// A decoded text part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    pub kind: BodyKind,
    pub text: String,
}

/// Decoded `text/html` and `text/plain` parts in document order.
/// Attachments and non-text parts are skipped.
pub fn body_parts(raw: &[u8]) -> Result<Vec<BodyPart>> {
    let parsed = mailparse::parse_mail(raw)
        .map_err(|e| RegflowError::io(format!("cannot parse message: {e}")))?;
    let mut parts = Vec::new();
    collect(&parsed, &mut parts);
    Ok(parts)
}

fn collect(mail: &ParsedMail<'_>, parts: &mut Vec<BodyPart>) {
    if !mail.subparts.is_empty() {
        for sub in &mail.subparts {
            collect(sub, parts);
        }
        return;
    }

    if matches!(
        mail.get_content_disposition().disposition,
        DispositionType::Attachment
    ) {
        return;
    }

    let kind = match mail.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/html" => BodyKind::Html,
        "text/plain" => BodyKind::Plain,
        _ => return,
    };
    match mail.get_body() {
        Ok(text) => parts.push(BodyPart { kind, text }),
        Err(e) => tracing::debug!("Skipping undecodable part: {}", e),
    }
}
