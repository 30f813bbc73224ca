//! MIME header handling.

use crate::encoding::codec::CodecRegistry;
use crate::encoding::rfc2047::decode_header;
use std::fmt;
use std::io::{self, BufRead, Read};

/// Collection of email headers.
///
/// Fields keep their original order and spelling. Lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.fields.push((name, value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets the first value for a header with RFC 2047 words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str, codecs: &CodecRegistry) -> Option<String> {
        self.get(name).map(|value| decode_header(value, codecs))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses headers from raw text, stopping at the first empty line.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///  continuation
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                break;
            }
            headers.push_line(line);
        }
        headers
    }

    /// Reads a header block from `reader`, consuming the blank line that ends
    /// it. Bytes are decoded lossily as UTF-8. Lines longer than
    /// [`MAX_LINE_LEN`] are truncated.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `reader`.
    pub fn read_from<R: BufRead>(reader: &mut R) -> io::Result<Self> {
        let mut headers = Self::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if read_capped_line(reader, &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                break;
            }
            headers.push_line(line);
        }
        Ok(headers)
    }

    fn push_line(&mut self, line: &str) {
        if line.starts_with([' ', '\t']) {
            self.extend_last(line);
        } else if let Some((name, value)) = split_field(line) {
            self.add(name, value);
        } else {
            tracing::debug!(line, "skipping malformed header line");
        }
    }

    /// Appends a folded continuation line to the last field.
    pub(crate) fn extend_last(&mut self, line: &str) {
        let line = line.trim();
        match self.fields.last_mut() {
            Some((_, value)) if !line.is_empty() => {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(line);
            }
            Some(_) => {}
            None => tracing::debug!(line, "continuation line without a field"),
        }
    }
}

/// Longest line buffered at once by the header and multipart readers.
pub const MAX_LINE_LEN: usize = 8192;

/// Reads one line of at most [`MAX_LINE_LEN`] bytes and drops the rest of it.
fn read_capped_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let read = reader.by_ref().take(MAX_LINE_LEN as u64).read_until(b'\n', buf)?;
    if read < MAX_LINE_LEN || buf.ends_with(b"\n") {
        return Ok(read);
    }
    tracing::debug!(limit = MAX_LINE_LEN, "header line too long, truncating");
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        if let Some(end) = available.iter().position(|&b| b == b'\n') {
            reader.consume(end + 1);
            break;
        }
        let len = available.len();
        reader.consume(len);
    }
    Ok(read)
}

/// Splits `Name: value`. The name must be non-empty printable ASCII.
pub(crate) fn split_field(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim_end();
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic()) {
        return None;
    }
    Some((name, value.trim()))
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.len(), 0);
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
    }

    #[test]
    fn test_headers_set() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("to", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("To"), vec!["charlie@example.com"]);
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        headers.remove("SUBJECT");
        assert!(headers.get("Subject").is_none());
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            "\tcharset=utf-8\r\n",
            "\r\n",
            "X-Body: not a header\r\n"
        );

        let headers = Headers::parse(text);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(headers.get("X-Body").is_none());
    }

    #[test]
    fn test_headers_read_from() {
        let mut input = &b"Subject: caf\xC3\xA9\r\nBad line\r\nX-Empty:\r\n\r\nbody"[..];
        let headers = Headers::read_from(&mut input).unwrap();
        assert_eq!(headers.get("subject"), Some("café"));
        assert_eq!(headers.get("x-empty"), Some(""));
        assert_eq!(headers.len(), 2);
        assert_eq!(input, b"body");
    }

    #[test]
    fn test_headers_read_from_long_line() {
        let raw = format!(
            "X-Long: {}\r\nSubject: hi\r\n\r\nbody",
            "x".repeat(MAX_LINE_LEN * 3)
        );
        let mut input = raw.as_bytes();
        let headers = Headers::read_from(&mut input).unwrap();
        assert_eq!(headers.get("x-long").unwrap().len(), MAX_LINE_LEN - "X-Long: ".len());
        assert_eq!(headers.get("subject"), Some("hi"));
        assert_eq!(input, b"body");
    }

    #[test]
    fn test_split_field() {
        assert_eq!(split_field("A: b"), Some(("A", "b")));
        assert_eq!(split_field("A : b "), Some(("A", "b")));
        assert_eq!(split_field(": b"), None);
        assert_eq!(split_field("not a header: x"), None);
        assert_eq!(split_field("plain text"), None);
    }

    #[test]
    fn test_headers_decoded() {
        let mut headers = Headers::new();
        headers.add("Subject", "=?utf-8?Q?caf=C3=A9?=");
        let codecs = CodecRegistry::with_defaults();
        assert_eq!(headers.get_decoded("subject", &codecs).unwrap(), "café");
    }

    #[test]
    fn test_headers_display() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");
        assert_eq!(
            headers.to_string(),
            "From: sender@example.com\nTo: recipient@example.com\n"
        );
    }
}
