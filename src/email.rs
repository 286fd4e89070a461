//! Plain-text email parsing — header block, blank line, body.
//!
//! No MIME decoding. Parsing never fails on content shape; only reading
//! the source can fail.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EmailError;

/// Placeholder for absent headers.
pub const UNKNOWN: &str = "Unknown";

/// Zoned date formats, tried before the naive ones.
const ZONED_DATE_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M:%S %z"];

/// Zone-less date formats, read as UTC.
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"];

/// A parsed inbound email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    /// Raw header values keyed by lower-cased header name.
    pub headers: BTreeMap<String, String>,
    /// Date header as written, or `"Unknown"`.
    pub date_raw: String,
    /// Best-effort parse of `date_raw`.
    pub date_parsed: Option<DateTime<FixedOffset>>,
    /// Trimmed body text.
    pub body: String,
}

/// Read and parse an email file.
pub async fn read_email(path: impl AsRef<Path>) -> Result<EmailRecord, EmailError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| EmailError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), bytes = raw.len(), "Read email file");
    Ok(parse_email(&raw))
}

/// Parse raw email text into an `EmailRecord`.
pub fn parse_email(raw: &str) -> EmailRecord {
    let (header_block, body) = split_header_block(raw);
    let headers = parse_headers(&header_block);

    let subject = headers
        .get("subject")
        .map(|s| strip_subject_prefix(s))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let sender = headers
        .get("from")
        .or_else(|| headers.get("sender"))
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string());
    let recipient = headers
        .get("to")
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string());
    let date_raw = headers
        .get("date")
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string());
    let date_parsed = headers.get("date").and_then(|d| parse_date(d));

    EmailRecord {
        subject,
        sender,
        recipient,
        headers,
        date_raw,
        date_parsed,
        body: body.trim().to_string(),
    }
}

/// Split on the first blank line. Without one, everything is body.
fn split_header_block(raw: &str) -> (Vec<&str>, String) {
    let lines: Vec<&str> = raw.lines().collect();
    match lines.iter().position(|l| l.trim().is_empty()) {
        Some(blank) => (lines[..blank].to_vec(), lines[blank + 1..].join("\n")),
        None => (Vec::new(), raw.to_string()),
    }
}

fn parse_headers(lines: &[&str]) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(key.trim().to_lowercase(), value.trim().to_string());
    }
    headers
}

fn strip_subject_prefix(value: &str) -> String {
    value
        .strip_prefix("Subject:")
        .unwrap_or(value)
        .trim()
        .to_string()
}

/// Try each known format in order; first match wins.
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Some(parsed) = ZONED_DATE_FORMATS
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(value, fmt).ok())
    {
        return Some(parsed);
    }
    NAIVE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn parses_headers_and_body() {
        let raw = "Subject: Meeting\nFrom: alice@example.com\nTo: bob@example.com\n\nCan we meet Tuesday?\n";
        let email = parse_email(raw);
        assert_eq!(email.subject, "Meeting");
        assert_eq!(email.sender, "alice@example.com");
        assert_eq!(email.recipient, "bob@example.com");
        assert_eq!(email.body, "Can we meet Tuesday?");
    }

    #[test]
    fn no_blank_line_means_all_body() {
        let raw = "Subject: Not a header block\nstill body";
        let email = parse_email(raw);
        assert_eq!(email.subject, UNKNOWN);
        assert!(email.headers.is_empty());
        assert_eq!(email.body, raw);
    }

    #[test]
    fn empty_input_has_empty_body() {
        let email = parse_email("");
        assert_eq!(email.body, "");
        assert_eq!(email.subject, UNKNOWN);
        assert_eq!(email.sender, UNKNOWN);
        assert_eq!(email.recipient, UNKNOWN);
        assert_eq!(email.date_raw, UNKNOWN);
        assert!(email.date_parsed.is_none());
    }

    #[test]
    fn lines_without_colon_are_dropped() {
        let raw = "Subject: Hi\nthis line has no separator\nX-Tag: a\n\nbody";
        let email = parse_email(raw);
        assert_eq!(email.headers.len(), 2);
        assert_eq!(email.headers.get("x-tag").map(String::as_str), Some("a"));
    }

    #[test]
    fn header_keys_lowercased_values_trimmed() {
        let raw = "  SUBJECT :   Loud   \nReply-To: x@y.z\n\nbody";
        let email = parse_email(raw);
        assert_eq!(email.headers.get("subject").map(String::as_str), Some("Loud"));
        assert_eq!(email.headers.get("reply-to").map(String::as_str), Some("x@y.z"));
        assert_eq!(email.subject, "Loud");
    }

    #[test]
    fn header_value_keeps_later_colons() {
        let raw = "Subject: Re: Re: Plans\n\nbody";
        let email = parse_email(raw);
        assert_eq!(email.subject, "Re: Re: Plans");
    }

    #[test]
    fn duplicated_subject_prefix_is_stripped() {
        let raw = "Subject: Subject: Invoice\n\nbody";
        let email = parse_email(raw);
        assert_eq!(email.subject, "Invoice");
    }

    #[test]
    fn sender_falls_back_to_sender_header() {
        let raw = "Sender: ops@example.com\n\nbody";
        assert_eq!(parse_email(raw).sender, "ops@example.com");

        let raw = "From: a@x.com\nSender: b@x.com\n\nbody";
        assert_eq!(parse_email(raw).sender, "a@x.com");
    }

    #[test]
    fn body_is_trimmed_and_keeps_inner_blank_lines() {
        let raw = "Subject: T\n\n\n  Hi there,\n\nThanks  \n\n";
        let email = parse_email(raw);
        assert_eq!(email.body, "Hi there,\n\nThanks");
    }

    #[test]
    fn crlf_input_is_accepted() {
        let raw = "Subject: Windows\r\nFrom: w@x.com\r\n\r\nLine one\r\nLine two\r\n";
        let email = parse_email(raw);
        assert_eq!(email.subject, "Windows");
        assert_eq!(email.sender, "w@x.com");
        assert_eq!(email.body, "Line one\nLine two");
    }

    #[test]
    fn rfc2822_style_date_parses() {
        let raw = "Date: Tue, 14 Jan 2025 09:30:00 +0100\n\nbody";
        let email = parse_email(raw);
        let parsed = email.date_parsed.expect("date should parse");
        assert_eq!(parsed.year(), 2025);
        assert_eq!(parsed.hour(), 9);
        assert_eq!(parsed.offset().local_minus_utc(), 3600);
        assert_eq!(email.date_raw, "Tue, 14 Jan 2025 09:30:00 +0100");
    }

    #[test]
    fn date_without_weekday_parses() {
        assert!(parse_date("14 Jan 2025 09:30:00 -0500").is_some());
    }

    #[test]
    fn naive_dates_read_as_utc() {
        let iso = parse_date("2025-01-14 09:30:00").expect("iso date");
        assert_eq!(iso.offset().local_minus_utc(), 0);
        assert_eq!(iso.day(), 14);

        let us = parse_date("01/14/2025 09:30:00").expect("us date");
        assert_eq!(us.month(), 1);
        assert_eq!(us.day(), 14);
    }

    #[test]
    fn unparseable_date_is_none() {
        let raw = "Date: sometime next week\n\nbody";
        let email = parse_email(raw);
        assert!(email.date_parsed.is_none());
        assert_eq!(email.date_raw, "sometime next week");
    }

    #[tokio::test]
    async fn read_email_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, "Subject: Test Email\n\nHi there,\n\nThis is a test.").unwrap();

        let email = read_email(&path).await.unwrap();
        assert_eq!(email.subject, "Test Email");
        assert!(email.body.contains("This is a test."));
    }

    #[tokio::test]
    async fn read_email_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let err = read_email(&path).await.unwrap_err();
        match err {
            EmailError::Io { path: p, .. } => assert_eq!(p, path),
        }
    }
}
