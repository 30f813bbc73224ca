//! Content-transfer-encoding and text codecs.
//!
//! [`decode_section`] routes a part body through the decoder named by its
//! `Content-Transfer-Encoding` header:
//!
//! - `base64` goes through the recovery pipeline in [`base64`], which
//!   tolerates line wrapping, stray filler bytes and re-padded segments
//! - `quoted-printable` uses the strict decoder, or the UTF-8 tolerant one
//!   for UTF-8 text when correction is enabled
//! - `uuencode` extracts the first encoded file
//! - everything else is passed through unchanged

pub mod base64;
pub mod codec;
pub mod quoted_printable;
pub mod rfc2047;
pub mod utf7;
pub mod uuencode;

use std::fmt;
use std::io::Read;

use crate::error::{Error, Result};

/// Transfer encoding types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit data.
    EightBit,
    /// Binary (no encoding).
    Binary,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Base64 encoding.
    Base64,
    /// Unix-to-Unix encoding.
    Uuencode,
    /// Any other declared value. Passed through unchanged.
    Other(String),
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let value = s.trim().to_ascii_lowercase();
        match value.as_str() {
            "" | "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "quoted-printable" => Self::QuotedPrintable,
            "base64" => Self::Base64,
            "uuencode" | "x-uuencode" | "x-uue" => Self::Uuencode,
            _ => Self::Other(value),
        }
    }

    /// Returns true for the encodings that leave bytes untouched.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Binary => write!(f, "binary"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Base64 => write!(f, "base64"),
            Self::Uuencode => write!(f, "uuencode"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Decodes a section body according to its declared transfer encoding.
///
/// `charset` is the text charset of the section, if any. It only matters for
/// quoted-printable when `correct_utf8_qp` is set.
///
/// # Errors
///
/// Returns the error of the selected decoder, or an I/O error from `source`.
/// No partial content is returned.
pub fn decode_section<R: Read>(
    transfer_encoding: &str,
    charset: &str,
    correct_utf8_qp: bool,
    source: R,
) -> Result<Vec<u8>> {
    decode_transfer(
        &TransferEncoding::parse(transfer_encoding),
        charset,
        correct_utf8_qp,
        source,
    )
}

/// Decodes a section body with an already parsed transfer encoding.
///
/// # Errors
///
/// See [`decode_section`].
pub fn decode_transfer<R: Read>(
    encoding: &TransferEncoding,
    charset: &str,
    correct_utf8_qp: bool,
    mut source: R,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match encoding {
        TransferEncoding::QuotedPrintable => {
            source.read_to_end(&mut out)?;
            let charset = charset.to_ascii_lowercase();
            if correct_utf8_qp && (charset == "utf8" || charset == "utf-8") {
                quoted_printable::decode_utf8(&out)
            } else {
                quoted_printable::decode(&out)
            }
        }
        TransferEncoding::Base64 => {
            self::base64::Base64Combiner::new(source)
                .read_to_end(&mut out)
                .map_err(Error::from_read)?;
            Ok(out)
        }
        TransferEncoding::Uuencode => {
            source.read_to_end(&mut out)?;
            uuencode::decode_first(&out)
        }
        TransferEncoding::SevenBit
        | TransferEncoding::EightBit
        | TransferEncoding::Binary
        | TransferEncoding::Other(_) => {
            source.read_to_end(&mut out)?;
            Ok(out)
        }
    }
}
