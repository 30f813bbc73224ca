//! Quoted-Printable decoding (RFC 2045 section 6.7).
//!
//! Two variants share one line decoder. [`decode`] rejects malformed `=XX`
//! escapes. [`decode_utf8`] keeps them as literal bytes, which recovers the
//! common case of UTF-8 text whose multi-byte sequences were split or
//! mangled by a broken encoder.

use crate::error::{Error, Result};

/// Decodes Quoted-Printable data, failing on invalid escapes.
///
/// # Errors
///
/// Returns an error if an `=` is followed by anything other than two hex
/// digits or a line break.
pub fn decode(input: &[u8]) -> Result<Vec<u8>> {
    decode_with(input, false)
}

/// Decodes Quoted-Printable data, keeping invalid escapes verbatim.
///
/// # Errors
///
/// Never fails; the `Result` keeps the signature in line with [`decode`].
pub fn decode_utf8(input: &[u8]) -> Result<Vec<u8>> {
    decode_with(input, true)
}

fn decode_with(input: &[u8], tolerant: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut offset = 0;

    for line in input.split_inclusive(|&b| b == b'\n') {
        let (body, eol) = split_eol(line);
        // Transport padding at the end of a line is not data.
        let body = trim_end_whitespace(body);
        let (body, soft_break) = match body.strip_suffix(b"=") {
            Some(rest) => (rest, true),
            None => (body, false),
        };

        let mut i = 0;
        while i < body.len() {
            let byte = body[i];
            if byte != b'=' {
                out.push(byte);
                i += 1;
                continue;
            }
            match (body.get(i + 1).and_then(hex_value), body.get(i + 2).and_then(hex_value)) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                _ if tolerant => {
                    out.push(b'=');
                    i += 1;
                }
                _ => {
                    return Err(Error::QuotedPrintable(format!(
                        "invalid escape sequence at byte {}",
                        offset + i
                    )));
                }
            }
        }

        if !soft_break {
            out.extend_from_slice(eol);
        }
        offset += line.len();
    }

    Ok(out)
}

fn split_eol(line: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = line.strip_suffix(b"\r\n") {
        (body, &b"\r\n"[..])
    } else if let Some(body) = line.strip_suffix(b"\n") {
        (body, &b"\n"[..])
    } else {
        (line, &b""[..])
    }
}

fn trim_end_whitespace(mut body: &[u8]) -> &[u8] {
    while let [rest @ .., b' ' | b'\t' | b'\r'] = body {
        body = rest;
    }
    body
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) const fn hex_value(byte: &u8) -> Option<u8> {
    match *byte {
        b'0'..=b'9' => Some(*byte - b'0'),
        b'A'..=b'F' => Some(*byte - b'A' + 10),
        b'a'..=b'f' => Some(*byte - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode(b"Hello, World!").unwrap(), b"Hello, World!");
        assert_eq!(decode(b"H=C3=A9llo").unwrap(), "Héllo".as_bytes());
        assert_eq!(decode(b"h=c3=a9llo").unwrap(), "héllo".as_bytes());
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode(b"Hello=\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode(b"Hello=  \r\nWorld").unwrap(), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_hard_line_break() {
        assert_eq!(
            decode(b"line one   \r\nline two\n").unwrap(),
            b"line one\r\nline two\n"
        );
    }

    #[test]
    fn test_quoted_printable_strict_rejects_bad_escape() {
        let err = decode(b"abc=ZZ").unwrap_err();
        assert!(matches!(err, Error::QuotedPrintable(ref msg) if msg.contains("byte 3")));
        assert!(decode(b"trailing =4").is_err());
    }

    #[test]
    fn test_quoted_printable_utf8_keeps_bad_escape() {
        assert_eq!(decode_utf8(b"abc=ZZ").unwrap(), b"abc=ZZ");
        assert_eq!(decode_utf8(b"=E2=80=9").unwrap(), b"\xE2\x80=9");
        assert_eq!(decode_utf8(b"caf=C3=A9=\r\n!").unwrap(), "café!".as_bytes());
    }

    #[test]
    fn test_quoted_printable_error_offset_spans_lines() {
        let err = decode(b"ok\r\n=G0").unwrap_err();
        assert!(matches!(err, Error::QuotedPrintable(ref msg) if msg.contains("byte 4")));
    }
}
