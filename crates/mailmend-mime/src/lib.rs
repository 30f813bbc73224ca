//! # mailmend-mime
//!
//! MIME body decoding for real-world email.
//!
//! ## Features
//!
//! - **Part tree**: Split multipart messages into an ordered tree of parts
//! - **Recovery**: Tolerate missing headers, missing close delimiters and
//!   corrupted or re-padded base64
//! - **Transfer encodings**: Base64, Quoted-Printable (strict and UTF-8
//!   tolerant), uuencode
//! - **Headers**: RFC 2047 encoded words, RFC 2231 parameters
//! - **UTF-7**: Encoder and decoder, usable as a named text codec
//!
//! ## Quick Start
//!
//! ### Parsing a message
//!
//! ```
//! use mailmend_mime::parse_mime;
//!
//! let raw = "Content-Type: multipart/mixed; boundary=frontier\r\n\
//!            \r\n\
//!            --frontier\r\n\
//!            Content-Type: text/plain\r\n\
//!            \r\n\
//!            Hello, World!\r\n\
//!            --frontier\r\n\
//!            Content-Type: application/octet-stream\r\n\
//!            Content-Transfer-Encoding: base64\r\n\
//!            Content-Disposition: attachment; filename=\"a.bin\"\r\n\
//!            \r\n\
//!            AAEC\r\n\
//!            --frontier--\r\n";
//!
//! let tree = parse_mime(raw.as_bytes())?;
//! let attachments = tree.depth_match_all(|part| part.disposition() == "attachment");
//! assert_eq!(tree[attachments[0]].file_name(), "a.bin");
//! assert_eq!(tree[attachments[0]].content(), [0u8, 1, 2]);
//! # Ok::<(), mailmend_mime::Error>(())
//! ```
//!
//! ### Configuring the parser
//!
//! ```
//! use mailmend_mime::{MimeParser, ParserConfig};
//!
//! let config = ParserConfig::builder()
//!     .correct_utf8_qp(false)
//!     .max_depth(8)
//!     .build();
//! let parser = MimeParser::with_config(config);
//! let tree = parser.parse(&b"Content-Type: text/plain\r\n\r\nhi"[..])?;
//! assert_eq!(tree[tree.root()].content(), b"hi");
//! # Ok::<(), mailmend_mime::Error>(())
//! ```
//!
//! ### Decoding
//!
//! ```
//! use mailmend_mime::{decode_section, utf7};
//!
//! // Two base64 blocks glued together, wrapped and padded mid-stream
//! let decoded = decode_section("base64", "", false, &b"SGVs\r\nbG8=\r\nIHdvcmxk"[..])?;
//! assert_eq!(decoded, b"Hello world");
//!
//! assert_eq!(utf7::decode("+AKM-1")?, "£1");
//! # Ok::<(), mailmend_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod content_type;
mod disposition;
mod error;
mod header;
mod multipart;
mod parser;
mod part;

pub mod encoding;

use std::io::Read;

pub use config::{DEFAULT_CONTENT_TYPE, DEFAULT_MAX_DEPTH, ParserConfig, ParserConfigBuilder};
pub use content_type::ContentType;
pub use disposition::ContentDisposition;
pub use encoding::codec::{CodecRegistry, TextCodec, Utf7};
pub use encoding::rfc2047::decode_header;
pub use encoding::{TransferEncoding, decode_section, utf7};
pub use error::{Error, Result};
pub use header::{Headers, MAX_LINE_LEN};
pub use multipart::{MultipartReader, PartReader};
pub use parser::MimeParser;
pub use part::{BreadthFirst, DepthFirst, Part, PartId, PartTree};

/// Parses a complete message with the default configuration.
///
/// # Errors
///
/// See [`MimeParser::parse`].
pub fn parse_mime<R: Read>(reader: R) -> Result<PartTree> {
    MimeParser::new().parse(reader)
}
