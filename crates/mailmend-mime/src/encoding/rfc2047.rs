//! RFC 2047 encoded-word decoding for header values.
//!
//! Format: `=?charset?encoding?encoded-text?=`, where the encoding is `B`
//! (base64) or `Q` (a quoted-printable variant with `_` for space).

use super::base64::decode_lenient;
use super::codec::CodecRegistry;
use super::quoted_printable::hex_value;

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
}

/// Decodes every encoded word in a header value.
///
/// Whitespace separating two adjacent encoded words is dropped. Words that
/// are malformed, use an unknown encoding or name an unknown charset are
/// kept verbatim.
#[must_use]
pub fn decode_header(value: &str, codecs: &CodecRegistry) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        let Some((word, len)) = parse_word(candidate) else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
            continue;
        };

        match decode_word(&word, codecs) {
            Some(text) => {
                if !(after_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&text);
                after_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str(&candidate[..len]);
                after_word = false;
            }
        }
        rest = &candidate[len..];
    }

    out.push_str(rest);
    out
}

fn parse_word(candidate: &str) -> Option<(EncodedWord<'_>, usize)> {
    let inner = candidate.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let end = inner.find("?=")?;
    let text = &inner[..end];

    let blank = |s: &str| s.is_empty() || s.contains(char::is_whitespace);
    if blank(charset) || encoding.len() != 1 || text.contains(char::is_whitespace) {
        return None;
    }

    let len = candidate.len() - inner.len() + end + 2;
    Some((
        EncodedWord {
            charset,
            encoding,
            text,
        },
        len,
    ))
}

fn decode_word(word: &EncodedWord<'_>, codecs: &CodecRegistry) -> Option<String> {
    let bytes = match word.encoding {
        "B" | "b" => decode_lenient(word.text.as_bytes()).ok()?,
        "Q" | "q" => decode_q(word.text.as_bytes()),
        _ => return None,
    };
    // RFC 2231 allows a language suffix: `charset*lang`.
    let charset = word.charset.split('*').next().unwrap_or(word.charset);
    codecs.decode(charset, &bytes).ok()
}

fn decode_q(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        match text[i] {
            b'_' => out.push(b' '),
            b'=' => {
                if let (Some(hi), Some(lo)) = (
                    text.get(i + 1).and_then(hex_value),
                    text.get(i + 2).and_then(hex_value),
                ) {
                    out.push((hi << 4) | lo);
                    i += 2;
                } else {
                    out.push(b'=');
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    out
}
