//! Error types for MIME decoding.

use std::io;

/// Result type alias for MIME decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME decoding error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the underlying source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Invalid quoted-printable data.
    #[error("Quoted-printable decode error: {0}")]
    QuotedPrintable(String),

    /// Invalid uuencoded data.
    #[error("Uudecode error: {0}")]
    Uuencode(String),

    /// Invalid UTF-7 data.
    #[error("utf7: bad utf-7 encoding")]
    BadUtf7,

    /// Unrecoverable media type syntax.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Missing boundary in multipart entity.
    #[error("Missing boundary in multipart entity")]
    MissingBoundary,

    /// No codec registered for a character set.
    #[error("Unknown charset: {0}")]
    UnknownCharset(String),
}

impl Error {
    /// Returns true if the error came from decoding the content of a part.
    ///
    /// Callers that want to keep the rest of a message can catch these and
    /// substitute the raw bytes of the offending part.
    #[must_use]
    pub const fn is_codec_error(&self) -> bool {
        matches!(
            self,
            Self::Base64(_) | Self::QuotedPrintable(_) | Self::Uuencode(_) | Self::BadUtf7
        )
    }

    /// Returns true if the error aborts parsing of the message structure.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::InvalidContentType(_) | Self::MissingBoundary
        )
    }

    /// Unwraps decoder errors that travelled through an `io::Read` stage.
    ///
    /// Any other error is kept as it is.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<base64::DecodeError>())
        {
            Some(decode) => Self::Base64(decode.clone()),
            None => Self::Io(err),
        }
    }
}
