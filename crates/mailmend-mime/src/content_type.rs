//! MIME content type handling.
//!
//! Parsing is forgiving: problems that leave the type and subtype intact are
//! repaired and recorded as warnings instead of failing the whole header.

use crate::error::{Error, Result};
use charset::Charset;
use std::collections::HashMap;
use std::fmt;

const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx). Names are lower case.
    pub parameters: HashMap<String, String>,
    warnings: Vec<String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns `type/subtype`, or the bare type if the subtype is empty.
    #[must_use]
    pub fn mime_type(&self) -> String {
        if self.sub_type.is_empty() {
            self.main_type.clone()
        } else {
            format!("{}/{}", self.main_type, self.sub_type)
        }
    }

    /// Returns a parameter by case-insensitive name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present and non-empty.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary").filter(|b| !b.is_empty())
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Checks for `message/rfc822`.
    #[must_use]
    pub fn is_message_rfc822(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("message") && self.sub_type.eq_ignore_ascii_case("rfc822")
    }

    /// Problems that were repaired while parsing.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="quoted value"`
    ///
    /// A missing or empty subtype (`application`, `image/`) is kept as a bare
    /// type. A missing type in front of a subtype (`/octet-stream`) becomes
    /// `application`. Both are recorded as warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty, has neither type nor subtype,
    /// or the type contains characters that are not allowed in a token.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidContentType("empty content type".to_string()));
        }

        let (head, params) = s.split_once(';').unwrap_or((s, ""));
        let (main_type, sub_and_rest) = match head.split_once('/') {
            Some((main, rest)) => (main.trim(), rest.trim_start()),
            None => (head.trim(), ""),
        };
        if !main_type.chars().all(is_token_char) {
            return Err(Error::InvalidContentType(format!(
                "invalid character in type {main_type:?}"
            )));
        }

        let sub_end = sub_and_rest
            .find(|c: char| !is_token_char(c))
            .unwrap_or(sub_and_rest.len());
        let (sub_type, stray) = sub_and_rest.split_at(sub_end);

        let mut warnings = Vec::new();
        let main_type = match (main_type.is_empty(), sub_type.is_empty()) {
            (true, true) => {
                return Err(Error::InvalidContentType(format!("missing type in {s:?}")));
            }
            (true, false) => {
                warnings.push(format!("missing type in {s:?}, assuming application"));
                "application"
            }
            (false, true) => {
                warnings.push(format!("missing subtype in {s:?}"));
                main_type
            }
            (false, false) => main_type,
        };

        let mut content_type = Self::new(main_type.to_ascii_lowercase(), sub_type.to_ascii_lowercase());
        content_type.warnings = warnings;
        let stray = stray.trim();
        if !stray.is_empty() {
            content_type
                .warnings
                .push(format!("unexpected text after subtype: {stray:?}"));
            // Senders that forget the semicolon still mean a parameter.
            content_type.parameters = parse_parameters(stray, &mut content_type.warnings);
        }
        for (name, value) in parse_parameters(params, &mut content_type.warnings) {
            if content_type.parameters.contains_key(&name) {
                content_type
                    .warnings
                    .push(format!("duplicate parameter {name:?}"));
            } else {
                content_type.parameters.insert(name, value);
            }
        }

        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime_type())?;

        let mut parameters: Vec<_> = self.parameters.iter().collect();
        parameters.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (key, value) in parameters {
            // Quote value if it contains special characters
            if value.is_empty() || value.contains(|c: char| !is_token_char(c)) {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "; {key}=\"{escaped}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !TSPECIALS.contains(c)
}

/// A continuation segment of an RFC 2231 parameter.
struct Segment {
    index: u32,
    encoded: bool,
    value: String,
}

/// Parses a `; name=value` parameter list.
///
/// The first occurrence of a parameter wins. RFC 2231 extended and
/// continued parameters are reassembled and decoded.
pub(crate) fn parse_parameters(input: &str, warnings: &mut Vec<String>) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    let mut extended: HashMap<String, Vec<Segment>> = HashMap::new();

    for (name, value) in split_parameters(input, warnings) {
        if let Some((base, section)) = name.split_once('*') {
            let (digits, encoded) = match section.strip_suffix('*') {
                Some(digits) => (digits, true),
                None if section.is_empty() => ("", true),
                None => (section, false),
            };
            let index = if digits.is_empty() {
                Some(0)
            } else {
                digits.parse().ok()
            };
            match index {
                Some(index) => extended.entry(base.to_string()).or_default().push(Segment {
                    index,
                    encoded,
                    value,
                }),
                None => warnings.push(format!("bad parameter section {name:?}")),
            }
            continue;
        }
        if parameters.contains_key(&name) {
            warnings.push(format!("duplicate parameter {name:?}"));
        } else {
            parameters.insert(name, value);
        }
    }

    for (name, mut segments) in extended {
        segments.sort_by_key(|segment| segment.index);
        parameters.insert(name, join_segments(&segments));
    }
    parameters
}

fn join_segments(segments: &[Segment]) -> String {
    let mut label = "";
    let mut bytes = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        let mut value = segment.value.as_str();
        if i == 0 && segment.encoded {
            // charset'language'value
            let mut fields = value.splitn(3, '\'');
            if let (Some(charset), Some(_), Some(rest)) = (fields.next(), fields.next(), fields.next()) {
                label = charset;
                value = rest;
            }
        }
        if segment.encoded {
            bytes.extend(percent_encoding::percent_decode_str(value));
        } else {
            bytes.extend_from_slice(value.as_bytes());
        }
    }

    match Charset::for_label_no_replacement(label.as_bytes()) {
        Some(charset) => charset.decode_without_bom_handling(&bytes).0.into_owned(),
        None => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

/// Splits a parameter list into lower-cased names and unquoted values.
fn split_parameters(input: &str, warnings: &mut Vec<String>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let name_end = rest.find(['=', ';']).unwrap_or(rest.len());
        let name = rest[..name_end].trim().to_ascii_lowercase();
        rest = &rest[name_end..];
        let Some(after_eq) = rest.strip_prefix('=') else {
            warnings.push(format!("parameter {name:?} has no value"));
            continue;
        };

        let after_eq = after_eq.trim_start();
        let value = if let Some(quoted) = after_eq.strip_prefix('"') {
            let (value, consumed, closed) = unquote(quoted);
            if !closed {
                warnings.push(format!("unterminated quoted string in parameter {name:?}"));
            }
            rest = &quoted[consumed..];
            value
        } else {
            let end = after_eq.find(';').unwrap_or(after_eq.len());
            rest = &after_eq[end..];
            after_eq[..end].trim().to_string()
        };

        if name.is_empty() {
            warnings.push("parameter with empty name".to_string());
            continue;
        }
        out.push((name, value));
    }

    out
}

/// Reads a quoted string body. Returns the value, the bytes consumed
/// including the closing quote, and whether the quote was closed.
fn unquote(input: &str) -> (String, usize, bool) {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (value, i + 1, true),
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => return (value, input.len(), false),
            },
            _ => value.push(c),
        }
    }
    (value, input.len(), false)
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
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.mime_type(), "text/plain");
        assert!(ct.parameters.is_empty());
        assert!(ct.warnings().is_empty());
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/HTML; Charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "html");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert!(ct.is_text());
        assert!(!ct.is_multipart());
        assert!(ct.warnings().is_empty());
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse(r#"multipart/mixed; boundary="a;b \"c\"""#).unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some(r#"a;b "c""#));
    }

    #[test]
    fn test_content_type_parse_errors() {
        for bad in ["", "   ", "/", "/; name=x", "; name=x", "te xt/plain", "te(t/plain"] {
            assert!(
                matches!(ContentType::parse(bad), Err(Error::InvalidContentType(_))),
                "{bad:?} parsed"
            );
        }
    }

    #[test]
    fn test_content_type_repairs() {
        let ct = ContentType::parse("text/plain; format; charset=\"utf-8").unwrap();
        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.warnings().len(), 2);

        let ct = ContentType::parse("text/plain; charset=utf-8; charset=latin1").unwrap();
        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.warnings().len(), 1);

        let ct = ContentType::parse("text/plain; =x; name=a").unwrap();
        assert_eq!(ct.parameter("name"), Some("a"));
        assert_eq!(ct.warnings().len(), 1);
    }

    #[test]
    fn test_content_type_missing_subtype() {
        let ct = ContentType::parse("Application; name=noslash.pdf").unwrap();
        assert_eq!(ct.mime_type(), "application");
        assert_eq!(ct.parameter("name"), Some("noslash.pdf"));
        assert_eq!(ct.warnings().len(), 1);

        let ct = ContentType::parse("image/; name=slash.png").unwrap();
        assert_eq!(ct.mime_type(), "image");
        assert_eq!(ct.parameter("name"), Some("slash.png"));
        assert_eq!(ct.to_string(), "image; name=slash.png");

        let ct = ContentType::parse("text").unwrap();
        assert!(ct.is_text());
        assert_eq!(ct.sub_type, "");
    }

    #[test]
    fn test_content_type_missing_type() {
        let ct = ContentType::parse("/octet-stream; name=x").unwrap();
        assert_eq!(ct.mime_type(), "application/octet-stream");
        assert_eq!(ct.parameter("name"), Some("x"));
        assert_eq!(ct.warnings().len(), 1);
    }

    #[test]
    fn test_content_type_missing_semicolon() {
        let ct = ContentType::parse("multipart/mixed boundary=abc").unwrap();
        assert_eq!(ct.sub_type, "mixed");
        assert_eq!(ct.boundary(), Some("abc"));
        assert_eq!(ct.warnings().len(), 1);
    }

    #[test]
    fn test_content_type_empty_boundary() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"\"").unwrap();
        assert_eq!(ct.parameter("boundary"), Some(""));
        assert_eq!(ct.boundary(), None);
    }

    #[test]
    fn test_rfc2231_parameters() {
        let ct = ContentType::parse(
            "application/x-stuff; title*=us-ascii'en-us'This%20is%20%2A%2A%2Afun%2A%2A%2A",
        )
        .unwrap();
        assert_eq!(ct.parameter("title"), Some("This is ***fun***"));

        let ct = ContentType::parse(
            "application/octet-stream; name*0*=iso-8859-1''caf%E9; name*1=\".txt\"",
        )
        .unwrap();
        assert_eq!(ct.parameter("name"), Some("café.txt"));
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("charset", "utf-8")
            .with_parameter("Name", "a b.txt");
        assert_eq!(ct.to_string(), "text/plain; charset=utf-8; name=\"a b.txt\"");
    }

    #[test]
    fn test_message_rfc822() {
        assert!(ContentType::parse("Message/RFC822").unwrap().is_message_rfc822());
        assert!(!ContentType::parse("message/partial").unwrap().is_message_rfc822());
    }
}
