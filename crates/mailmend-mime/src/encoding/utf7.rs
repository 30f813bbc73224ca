//! UTF-7 (RFC 2152).
//!
//! Printable ASCII other than `~` and `\` is written as itself. Everything
//! else travels in shifted runs: `+`, the UTF-16BE code units in unpadded
//! base64, then `-`. A literal `+` is written as `+-`.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD_NO_PAD};
use base64::engine::DecodePaddingMode;

use crate::error::{Error, Result};

const SHIFT: u8 = b'+';
const UNSHIFT: u8 = b'-';

static SHIFTED: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Printable ASCII written as itself. `~` and `\` are excluded, so they
/// are always shifted and a shifted `~` or `\` decodes.
const fn is_direct(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7E) && byte != b'~' && byte != b'\\'
}

const fn is_base64(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/'
}

/// Encodes UTF-8 text as UTF-7.
#[must_use]
pub fn encode(text: &str) -> String {
    // The output is pure ASCII.
    encode_bytes(text.as_bytes()).into_iter().map(char::from).collect()
}

/// Encodes a byte string as UTF-7.
///
/// Invalid UTF-8 is replaced with U+FFFD.
#[must_use]
pub fn encode_bytes(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2);
    let mut i = 0;
    while i < input.len() {
        let byte = input[i];
        if is_direct(byte) {
            out.push(byte);
            if byte == SHIFT {
                out.push(UNSHIFT);
            }
            i += 1;
            continue;
        }

        let start = i;
        while i < input.len() && !is_direct(input[i]) {
            i += 1;
        }
        encode_run(&input[start..i], &mut out);
    }
    out
}

fn encode_run(run: &[u8], out: &mut Vec<u8>) {
    let units: Vec<u8> = String::from_utf8_lossy(run)
        .encode_utf16()
        .flat_map(u16::to_be_bytes)
        .collect();
    out.push(SHIFT);
    out.extend_from_slice(STANDARD_NO_PAD.encode(units).as_bytes());
    out.push(UNSHIFT);
}

/// Decodes UTF-7 text.
///
/// # Errors
///
/// Returns [`Error::BadUtf7`] on any malformed input.
pub fn decode(text: &str) -> Result<String> {
    decode_bytes(text.as_bytes())
}

/// Decodes a UTF-7 byte string.
///
/// # Errors
///
/// Returns [`Error::BadUtf7`] if the input contains a byte that may not
/// appear directly, padding inside a shifted run, a run that does not decode
/// to whole UTF-16 code units, an unpaired surrogate, or a shifted character
/// that should have been written directly.
pub fn decode_bytes(input: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let byte = input[i];
        if !is_direct(byte) && !matches!(byte, b'\t' | b'\r' | b'\n') {
            return Err(Error::BadUtf7);
        }
        i += 1;
        if byte != SHIFT {
            out.push(char::from(byte));
            continue;
        }

        let start = i;
        while i < input.len() && is_base64(input[i]) {
            i += 1;
        }
        let run = &input[start..i];
        match input.get(i) {
            Some(&b'=') => return Err(Error::BadUtf7),
            Some(&UNSHIFT) => i += 1,
            Some(_) if run.is_empty() => return Err(Error::BadUtf7),
            _ => {}
        }

        if run.is_empty() {
            out.push('+');
        } else {
            decode_run(run, &mut out)?;
        }
    }
    Ok(out)
}

fn decode_run(run: &[u8], out: &mut String) -> Result<()> {
    let bytes = SHIFTED.decode(run).map_err(|_| Error::BadUtf7)?;
    if bytes.len() % 2 != 0 {
        return Err(Error::BadUtf7);
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    for decoded in char::decode_utf16(units) {
        let ch = decoded.map_err(|_| Error::BadUtf7)?;
        // Shifted `~` and `\` are accepted since they are never direct.
        if u8::try_from(ch).is_ok_and(is_direct) {
            return Err(Error::BadUtf7);
        }
        out.push(ch);
    }
    Ok(())
}
