//! Subject/body extraction from uploaded email files.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::pipeline::types::Attachment;

/// A `subject:` header line, terminated by a line break.
static SUBJECT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)subject:(.+?)(\r?\n|\r)").unwrap());

/// Subject and body recovered from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEmail {
    pub subject: String,
    pub body: String,
}

/// Recover subject and body from an attachment.
///
/// Never fails: unreadable or non-text files come back as the file name
/// plus a placeholder body.
pub fn extract_from_attachment(attachment: &Attachment) -> ExtractedEmail {
    match attachment_text(attachment) {
        Ok(text) => {
            let email = extract_from_text(text, &attachment.name);
            debug!(file = %attachment.name, subject = %email.subject, "Extracted email from attachment");
            email
        }
        Err(e) => {
            warn!(file = %attachment.name, error = %e, "Falling back to placeholder content");
            ExtractedEmail {
                subject: attachment.name.clone(),
                body: format!("Failed to extract content from {}", attachment.name),
            }
        }
    }
}

fn attachment_text(attachment: &Attachment) -> Result<&str, ExtractionError> {
    let data = attachment
        .data
        .as_deref()
        .ok_or_else(|| ExtractionError::Unreadable {
            name: attachment.name.clone(),
        })?;
    std::str::from_utf8(data).map_err(|_| ExtractionError::NotUtf8 {
        name: attachment.name.clone(),
    })
}

/// Split raw email text into subject and body.
///
/// A `subject:` line (any case) wins; otherwise the first line is the
/// subject. Empty content takes the file name as subject.
pub fn extract_from_text(content: &str, file_name: &str) -> ExtractedEmail {
    if let Some(caps) = SUBJECT_LINE.captures(content) {
        let subject = caps[1].trim().to_string();
        let body = SUBJECT_LINE.replace(content, "").trim().to_string();
        return ExtractedEmail { subject, body };
    }

    let mut lines = content.lines();
    match lines.next() {
        Some(first) => ExtractedEmail {
            subject: first.trim().to_string(),
            body: lines.collect::<Vec<_>>().join("\n").trim().to_string(),
        },
        None => ExtractedEmail {
            subject: file_name.to_string(),
            body: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_header_is_removed_from_body() {
        let email = extract_from_text(
            "From: agent@bank.com\nSUBJECT:  Closing notice \nPlease see attached.\n",
            "notice.eml",
        );
        assert_eq!(email.subject, "Closing notice");
        assert_eq!(email.body, "From: agent@bank.com\nPlease see attached.");
    }

    #[test]
    fn crlf_subject_line() {
        let email = extract_from_text("Subject: Fee payment\r\nOngoing fee due\r\n", "a.eml");
        assert_eq!(email.subject, "Fee payment");
        assert_eq!(email.body, "Ongoing fee due");
    }

    #[test]
    fn first_line_is_subject_without_header() {
        let email = extract_from_text("  Wire received  \nline one\r\nline two\n\n", "wire.txt");
        assert_eq!(email.subject, "Wire received");
        assert_eq!(email.body, "line one\nline two");
    }

    #[test]
    fn unterminated_subject_header_falls_back_to_first_line() {
        let email = extract_from_text("Subject: only line", "x.txt");
        assert_eq!(email.subject, "Subject: only line");
        assert_eq!(email.body, "");
    }

    #[test]
    fn empty_content_uses_file_name() {
        let email = extract_from_text("", "empty.eml");
        assert_eq!(email.subject, "empty.eml");
        assert_eq!(email.body, "");
    }

    #[test]
    fn unreadable_attachment_gets_placeholder() {
        let email = extract_from_attachment(&Attachment::unreadable("lost.eml"));
        assert_eq!(email.subject, "lost.eml");
        assert_eq!(email.body, "Failed to extract content from lost.eml");
    }

    #[test]
    fn binary_attachment_gets_placeholder() {
        let email = extract_from_attachment(&Attachment::new("scan.pdf", vec![0xff, 0xfe, 0x00]));
        assert_eq!(email.subject, "scan.pdf");
        assert_eq!(email.body, "Failed to extract content from scan.pdf");
    }

    #[test]
    fn empty_attachment_uses_file_name() {
        let email = extract_from_attachment(&Attachment::new("blank.eml", Vec::new()));
        assert_eq!(email.subject, "blank.eml");
        assert!(email.body.is_empty());
    }
}
