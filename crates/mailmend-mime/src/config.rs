//! Parser configuration types.

/// Header value assumed for parts that do not declare a content type.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=US-ASCII";

/// Default limit on multipart nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// MIME parser configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Decode quoted-printable UTF-8 text with the tolerant decoder.
    pub correct_utf8_qp: bool,
    /// Deepest multipart nesting that is split into parts. Deeper
    /// containers are kept as one leaf with their raw body.
    pub max_depth: usize,
    /// Content type given to parts without one.
    pub default_content_type: String,
}

impl ParserConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correct_utf8_qp: true,
            max_depth: DEFAULT_MAX_DEPTH,
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::new()
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfigBuilder {
    correct_utf8_qp: bool,
    max_depth: usize,
    default_content_type: Option<String>,
}

impl ParserConfigBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            correct_utf8_qp: true,
            max_depth: DEFAULT_MAX_DEPTH,
            default_content_type: None,
        }
    }

    /// Enables or disables the tolerant UTF-8 quoted-printable decoder.
    #[must_use]
    pub const fn correct_utf8_qp(mut self, enabled: bool) -> Self {
        self.correct_utf8_qp = enabled;
        self
    }

    /// Sets the multipart nesting limit.
    #[must_use]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the content type assumed for parts without one.
    #[must_use]
    pub fn default_content_type(mut self, value: impl Into<String>) -> Self {
        self.default_content_type = Some(value.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ParserConfig {
        ParserConfig {
            correct_utf8_qp: self.correct_utf8_qp,
            max_depth: self.max_depth,
            default_content_type: self
                .default_content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        }
    }
}

impl Default for ParserConfigBuilder {
    fn default() -> Self {
        Self::new()
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
    fn test_config_new() {
        let config = ParserConfig::new();
        assert!(config.correct_utf8_qp);
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.default_content_type, "text/plain; charset=US-ASCII");
        assert_eq!(config, ParserConfig::default());
    }

    #[test]
    fn test_config_builder() {
        let config = ParserConfig::builder()
            .correct_utf8_qp(false)
            .max_depth(3)
            .default_content_type("application/octet-stream")
            .build();

        assert!(!config.correct_utf8_qp);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.default_content_type, "application/octet-stream");
    }

    #[test]
    fn test_config_builder_defaults() {
        assert_eq!(ParserConfigBuilder::default().build(), ParserConfig::new());
    }
}
