//! Unix-to-Unix decoding.
//!
//! Only the first `begin ... end` block of a stream is decoded. Lines are
//! length-prefixed; both `` ` `` and space stand for zero.

use crate::error::{Error, Result};

/// Decodes the first uuencoded file found in `input`.
///
/// # Errors
///
/// Returns an error if there is no `begin` line or a line contains bytes
/// outside the uuencode alphabet.
pub fn decode_first(input: &[u8]) -> Result<Vec<u8>> {
    let mut lines = input
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    if !lines.by_ref().any(|line| line.starts_with(b"begin ")) {
        return Err(Error::Uuencode("missing begin line".to_string()));
    }

    let mut out = Vec::new();
    for (number, line) in lines.enumerate() {
        if line == b"end" {
            break;
        }
        let Some((&count, data)) = line.split_first() else {
            continue;
        };
        let len = usize::from(sextet(count, number)?);
        if len == 0 {
            break;
        }

        let start = out.len();
        for group in data.chunks(4) {
            let mut s = [0u8; 4];
            for (slot, &byte) in s.iter_mut().zip(group) {
                *slot = sextet(byte, number)?;
            }
            out.push((s[0] << 2) | (s[1] >> 4));
            out.push((s[1] << 4) | (s[2] >> 2));
            out.push((s[2] << 6) | s[3]);
        }
        // Lines carry padding up to a multiple of three bytes.
        out.truncate(start + len.min(out.len() - start));
    }

    Ok(out)
}

fn sextet(byte: u8, line: usize) -> Result<u8> {
    if (b' '..=b'`').contains(&byte) {
        Ok((byte - b' ') & 0x3F)
    } else {
        Err(Error::Uuencode(format!(
            "invalid character {byte:#04x} in line {} of encoded data",
            line + 1
        )))
    }
}
