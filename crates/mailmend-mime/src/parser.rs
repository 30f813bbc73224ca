//! Multipart tree builder.
//!
//! [`MimeParser`] turns a message body into a [`PartTree`]. Containers are
//! split recursively with [`MultipartReader`]; leaves are decoded according
//! to their `Content-Transfer-Encoding`. Framing problems that can be
//! repaired are logged at debug level and never surface as errors.

use std::io::{BufReader, Read};

use crate::config::ParserConfig;
use crate::content_type::ContentType;
use crate::encoding::codec::CodecRegistry;
use crate::encoding::{TransferEncoding, decode_section, decode_transfer};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::multipart::MultipartReader;
use crate::part::{Part, PartId, PartTree};

/// Media type of the root when a single-part body has an unusable type.
const FALLBACK_MEDIA_TYPE: &str = "attachment";

/// Builds part trees from MIME messages.
#[derive(Debug, Clone)]
pub struct MimeParser {
    config: ParserConfig,
    codecs: CodecRegistry,
}

impl Default for MimeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeParser {
    /// Creates a parser with the default configuration and codecs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Creates a parser with the given configuration.
    #[must_use]
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            codecs: CodecRegistry::with_defaults(),
        }
    }

    /// Replaces the codec registry used for header words.
    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Returns the codec registry.
    #[must_use]
    pub const fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Parses a complete message: header block, blank line, body.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, the media type cannot be parsed,
    /// a multipart body has no boundary, or a leaf fails to decode.
    pub fn parse<R: Read>(&self, reader: R) -> Result<PartTree> {
        let mut reader = BufReader::new(reader);
        let headers = Headers::read_from(&mut reader)?;
        self.parse_body(headers, reader)
    }

    /// Parses a body whose header block was already read.
    ///
    /// A `multipart/*` root is split into parts; any other root is decoded
    /// as a single leaf.
    ///
    /// # Errors
    ///
    /// See [`MimeParser::parse`].
    pub fn parse_body<R: Read>(&self, headers: Headers, mut body: R) -> Result<PartTree> {
        let declared = self.declared_type(&headers);
        let content_type = ContentType::parse(&declared)?;
        log_warnings(&content_type, &declared, 0);
        let encoding = transfer_encoding(&headers);

        let mut root = Part::new(content_type.mime_type(), headers);
        root.resolve_metadata(Some(&content_type), &self.codecs);
        let mut tree = PartTree::new(root);
        let root = tree.root();

        if content_type.is_multipart() {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            self.build_level(&mut tree, root, &mut body, boundary, 1)?;
        } else {
            let charset = content_type.charset().unwrap_or_default();
            let content = decode_transfer(&encoding, charset, self.config.correct_utf8_qp, body)?;
            set_content(&mut tree, root, content);
        }
        Ok(tree)
    }

    /// Wraps a whole body as the only child of a root part.
    ///
    /// The root takes the declared media type, or `attachment` if it does
    /// not parse. The child copies `Content-Type` and `Content-Disposition`
    /// from `headers` and holds the decoded body. UTF-8 quoted-printable
    /// correction is not applied.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or decoding the body fails.
    pub fn parse_single_part<R: Read>(&self, headers: Headers, body: R) -> Result<PartTree> {
        let content_type = headers
            .get("Content-Type")
            .and_then(|value| ContentType::parse(value).ok());
        let media_type = content_type
            .as_ref()
            .map_or_else(|| FALLBACK_MEDIA_TYPE.to_string(), ContentType::mime_type);

        let mut child_headers = Headers::new();
        for name in ["Content-Type", "Content-Disposition"] {
            if let Some(value) = headers.get(name) {
                child_headers.add(name, value);
            }
        }
        let mut child = Part::new(media_type.clone(), child_headers);
        child.resolve_metadata(content_type.as_ref(), &self.codecs);

        let encoding = headers
            .get("Content-Transfer-Encoding")
            .unwrap_or_default();
        child.set_content(decode_section(encoding, "", false, body)?);

        let mut tree = PartTree::new(Part::new(media_type, headers));
        let root = tree.root();
        tree.append_child(root, child);
        Ok(tree)
    }

    /// Splits a multipart `body` delimited by `boundary` and appends its
    /// parts to `parent`, recursing into nested containers.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, an unparseable part media type, or a
    /// leaf that fails to decode. Parts linked before the error stay in
    /// the tree.
    pub fn build_parts<R: Read>(
        &self,
        tree: &mut PartTree,
        parent: PartId,
        mut body: R,
        boundary: &str,
    ) -> Result<()> {
        let mut depth = 1;
        let mut cursor = parent;
        while let Some(up) = tree.parent(cursor) {
            depth += 1;
            cursor = up;
        }
        self.build_level(tree, parent, &mut body, boundary, depth)
    }

    fn build_level(
        &self,
        tree: &mut PartTree,
        parent: PartId,
        body: &mut dyn Read,
        boundary: &str,
        depth: usize,
    ) -> Result<()> {
        let mut reader = MultipartReader::new(BufReader::new(body), boundary);

        while let Some(mut section) = reader.next_part()? {
            let mut headers = std::mem::take(&mut section.headers);
            if !headers.is_empty() {
                self.add_part(tree, parent, headers, &mut section, depth)?;
                continue;
            }

            // Without a header there is no telling a real part from a stray
            // delimiter at the end, so look at the body first.
            let mut raw = Vec::new();
            section.read_to_end(&mut raw)?;
            drop(section);
            if reader.is_finished() && raw.iter().all(u8::is_ascii_whitespace) {
                tracing::debug!(boundary, depth, "ignoring empty part at end of multipart body");
                break;
            }
            tracing::debug!(
                boundary,
                depth,
                content_type = %self.config.default_content_type,
                "part has no header, using default content type"
            );
            headers.add("Content-Type", self.config.default_content_type.as_str());
            self.add_part(tree, parent, headers, &mut raw.as_slice(), depth)?;
        }

        if reader.is_exhausted() {
            tracing::debug!(boundary, depth, "multipart body ended without close delimiter");
        }
        Ok(())
    }

    fn add_part(
        &self,
        tree: &mut PartTree,
        parent: PartId,
        mut headers: Headers,
        body: &mut dyn Read,
        depth: usize,
    ) -> Result<()> {
        if headers.get("Content-Type").is_none_or(|v| v.trim().is_empty()) {
            tracing::debug!(
                depth,
                content_type = %self.config.default_content_type,
                "part has no content type, using default"
            );
            headers.set("Content-Type", self.config.default_content_type.as_str());
        }
        let declared = self.declared_type(&headers);
        let content_type = ContentType::parse(&declared)?;
        log_warnings(&content_type, &declared, depth);
        let mut encoding = transfer_encoding(&headers);

        let mut part = Part::new(content_type.mime_type(), headers);
        part.resolve_metadata(Some(&content_type), &self.codecs);
        let id = tree.append_child(parent, part);

        if let Some(boundary) = content_type.boundary().filter(|_| !content_type.is_text()) {
            if depth < self.config.max_depth {
                return self.build_level(tree, id, body, boundary, depth + 1);
            }
            tracing::debug!(
                boundary,
                depth,
                content_type = %content_type.mime_type(),
                "nesting limit reached, keeping raw body"
            );
            let mut raw = Vec::new();
            body.read_to_end(&mut raw)?;
            set_content(tree, id, raw);
            return Ok(());
        }

        // An embedded message is RFC 5322 text, not a transfer-encoded blob.
        if content_type.is_message_rfc822() && !encoding.is_identity() {
            tracing::debug!(depth, %encoding, "not decoding message/rfc822 part");
            encoding = TransferEncoding::Binary;
        }
        let charset = if content_type.is_text() {
            content_type.charset().unwrap_or_default()
        } else {
            ""
        };
        let content = decode_transfer(&encoding, charset, self.config.correct_utf8_qp, body)?;
        set_content(tree, id, content);
        Ok(())
    }

    fn declared_type(&self, headers: &Headers) -> String {
        headers
            .get("Content-Type")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(&self.config.default_content_type)
            .to_string()
    }
}

fn log_warnings(content_type: &ContentType, declared: &str, depth: usize) {
    for warning in content_type.warnings() {
        tracing::debug!(depth, content_type = %declared, %warning, "repaired content type");
    }
}

fn transfer_encoding(headers: &Headers) -> TransferEncoding {
    TransferEncoding::parse(headers.get("Content-Transfer-Encoding").unwrap_or_default())
}

fn set_content(tree: &mut PartTree, id: PartId, content: Vec<u8>) {
    if let Some(part) = tree.get_mut(id) {
        part.set_content(content);
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
    use crate::encoding::codec::TextCodec;

    fn parse(raw: &str) -> PartTree {
        MimeParser::new().parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_single_leaf_root() {
        let tree = parse(concat!(
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "SGVs\r\nbG8=\r\n"
        ));
        let root = &tree[tree.root()];
        assert_eq!(root.content_type(), "text/plain");
        assert_eq!(root.charset(), "utf-8");
        assert_eq!(root.content(), b"Hello");
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_root_without_content_type() {
        let tree = parse("Subject: hi\r\n\r\nbody\r\n");
        assert_eq!(tree[tree.root()].content_type(), "text/plain");
        assert_eq!(tree[tree.root()].content(), b"body\r\n");
    }

    #[test]
    fn test_multipart_without_boundary() {
        let err = MimeParser::new()
            .parse(&b"Content-Type: multipart/mixed\r\n\r\n--x\r\n"[..])
            .unwrap_err();
        assert!(matches!(err, Error::MissingBoundary));
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_malformed_part_types_are_kept() {
        let tree = parse(concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "This is plain text\r\n",
            "--b\r\n",
            "Content-Type: application; name=noslash.pdf\r\n",
            "\r\n",
            "content1\r\n",
            "--b\r\n",
            "Content-Type: image/; name=slash.png\r\n",
            "\r\n",
            "content2\r\n",
            "--b\r\n",
            "Content-Type: /octet-stream; file=nomime.typ\r\n",
            "\r\n",
            "content3\r\n",
            "--b\r\n",
            "Content-Type: text\r\n",
            "\r\n",
            "content4\r\n",
            "--b--\r\n"
        ));

        let parts: Vec<_> = tree
            .children(tree.root())
            .iter()
            .map(|&id| {
                let part = &tree[id];
                (
                    part.content_type(),
                    part.file_name(),
                    String::from_utf8_lossy(part.content()).into_owned(),
                )
            })
            .collect();
        assert_eq!(
            parts,
            [
                ("text/plain", "", "This is plain text".to_string()),
                ("application", "noslash.pdf", "content1".to_string()),
                ("image", "slash.png", "content2".to_string()),
                ("application/octet-stream", "nomime.typ", "content3".to_string()),
                ("text", "", "content4".to_string()),
            ]
        );
    }

    #[test]
    fn test_unusable_part_type_aborts() {
        let err = MimeParser::new()
            .parse(
                &b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\nContent-Type: te(t/plain\r\n\r\nx\r\n--b--\r\n"[..],
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidContentType(_)));
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_missing_part_content_type() {
        let tree = parse(concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "caf=C3=A9\r\n",
            "--b--\r\n"
        ));
        let child = &tree[tree.first_child(tree.root()).unwrap()];
        assert_eq!(child.content_type(), "text/plain");
        assert_eq!(child.charset(), "US-ASCII");
        assert_eq!(child.headers().get("content-type"), Some("text/plain; charset=US-ASCII"));
        assert_eq!(child.content(), "café".as_bytes());
    }

    #[test]
    fn test_nesting_limit_keeps_raw_body() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=outer\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "\r\n",
            "deep\r\n",
            "--inner--\r\n",
            "--outer--\r\n"
        );
        let parser = MimeParser::with_config(ParserConfig::builder().max_depth(1).build());
        let tree = parser.parse(raw.as_bytes()).unwrap();
        let inner = &tree[tree.first_child(tree.root()).unwrap()];
        assert!(inner.children().is_empty());
        assert_eq!(inner.content(), b"--inner\r\n\r\ndeep\r\n--inner--");

        let tree = parse(raw);
        let inner = tree.first_child(tree.root()).unwrap();
        assert_eq!(tree[tree.first_child(inner).unwrap()].content(), b"deep");
    }

    #[test]
    fn test_text_part_with_boundary_is_leaf() {
        let tree = parse(concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain; boundary=c\r\n",
            "\r\n",
            "--c\r\n",
            "--b--\r\n"
        ));
        let child = &tree[tree.first_child(tree.root()).unwrap()];
        assert_eq!(child.content(), b"--c");
    }

    #[test]
    fn test_build_parts_into_existing_tree() {
        let parser = MimeParser::new();
        let mut tree = PartTree::new(Part::new("multipart/mixed", Headers::new()));
        let root = tree.root();
        parser
            .build_parts(&mut tree, root, &b"--z\r\n\r\none\r\n--z\r\n\r\ntwo\r\n--z--\r\n"[..], "z")
            .unwrap();
        let contents: Vec<_> = tree
            .children(root)
            .iter()
            .map(|&id| tree[id].content().to_vec())
            .collect();
        assert_eq!(contents, [b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_codec_error_propagates() {
        let err = MimeParser::new()
            .parse(
                &b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\nContent-Transfer-Encoding: base64\r\n\r\n****\r\n--b--\r\n"[..],
            )
            .unwrap_err();
        assert!(err.is_codec_error(), "unexpected error: {err:?}");
    }

    #[test]
    fn test_single_part_fallback() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "application/pdf; name=\"doc.pdf\"");
        headers.add("Content-Transfer-Encoding", "base64");
        headers.add("Subject", "scan");
        let tree = MimeParser::new()
            .parse_single_part(headers, &b"JVBERi0=\r\n"[..])
            .unwrap();

        let root = &tree[tree.root()];
        assert_eq!(root.content_type(), "application/pdf");
        assert_eq!(root.headers().get("subject"), Some("scan"));
        let child = &tree[root.first_child().unwrap()];
        assert_eq!(child.parent(), Some(tree.root()));
        assert_eq!(child.file_name(), "doc.pdf");
        assert_eq!(child.content(), b"%PDF-");
        assert_eq!(child.headers().len(), 1);
    }

    #[test]
    fn test_single_part_bad_type() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "gar(bage");
        headers.add("Content-Transfer-Encoding", "quoted-printable");
        headers.add("Content-Disposition", "attachment; filename=x.bin");
        let tree = MimeParser::new()
            .parse_single_part(headers, &b"a=3Db"[..])
            .unwrap();
        assert_eq!(tree[tree.root()].content_type(), "attachment");
        let child = &tree[tree.first_child(tree.root()).unwrap()];
        assert_eq!(child.content_type(), "attachment");
        assert_eq!(child.disposition(), "attachment");
        assert_eq!(child.file_name(), "x.bin");
        assert_eq!(child.content(), b"a=b");
    }

    struct Upper;

    impl TextCodec for Upper {
        fn decode(&self, input: &[u8]) -> Result<String> {
            Ok(String::from_utf8_lossy(input).to_uppercase())
        }

        fn encode(&self, text: &str) -> Vec<u8> {
            text.to_lowercase().into_bytes()
        }
    }

    #[test]
    fn test_custom_codecs_and_config() {
        let mut codecs = CodecRegistry::with_defaults();
        codecs.register("x-upper", Upper);
        let config = ParserConfig::builder()
            .default_content_type("application/octet-stream")
            .build();
        let parser = MimeParser::with_config(config).with_codecs(codecs);
        assert!(parser.codecs().supports("X-Upper"));
        assert_eq!(parser.config().default_content_type, "application/octet-stream");

        let headers = Headers::parse(concat!(
            "Subject: codecs\r\n",
            "Content-Type: multipart/mixed;\r\n",
            " boundary=\"q\"\r\n",
            "\r\n",
            "ignored\r\n"
        ));
        assert_eq!(headers.len(), 2);
        let body = concat!(
            "--q\r\n",
            "Content-Type: text/plain; name=\"=?x-upper?Q?report.txt?=\"\r\n",
            "\r\n",
            "one\r\n",
            "--q\r\n",
            "\r\n",
            "two\r\n",
            "--q--\r\n"
        );
        let tree = parser.parse_body(headers, body.as_bytes()).unwrap();
        let children = tree[tree.root()].children();
        assert_eq!(tree[children[0]].file_name(), "REPORT.TXT");
        assert_eq!(tree[children[1]].content_type(), "application/octet-stream");
        assert_eq!(tree[children[1]].content(), b"two");
    }
}
