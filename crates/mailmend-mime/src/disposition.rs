//! Content-Disposition header handling.

use std::collections::HashMap;

use crate::content_type::parse_parameters;

/// Parsed `Content-Disposition` value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentDisposition {
    /// Disposition type, lower case (e.g., "inline", "attachment").
    pub disposition: String,
    /// Parameters keyed by lower-case name.
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a disposition value. Malformed parameters are skipped.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (head, params) = s.split_once(';').unwrap_or((s, ""));
        let mut warnings = Vec::new();
        Self {
            disposition: head.trim().to_ascii_lowercase(),
            parameters: parse_parameters(params, &mut warnings),
        }
    }

    /// Returns the `filename` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }

    /// Checks for an `attachment` disposition.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.disposition == "attachment"
    }
}
