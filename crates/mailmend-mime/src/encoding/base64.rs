//! Base64 recovery pipeline.
//!
//! Real-world senders wrap base64 at arbitrary columns, sprinkle filler
//! bytes between lines and sometimes concatenate several independently
//! padded blocks (`segment1=segment2==segment3`). A plain decoder rejects
//! all of that. The pipeline here is three pull-based stages:
//!
//! 1. [`PadSplitter`] buffers the raw source in a bounded ring and reports
//!    end-of-stream right after a `=` padding run, one segment at a time.
//! 2. [`JunkStripper`] drops line breaks and filler bytes, as RFC 2045
//!    requires of decoders.
//! 3. [`Base64Combiner`] decodes each segment with a fresh decoder and
//!    stitches the outputs together.
//!
//! No stage reads more than [`CHUNK_SIZE`] bytes ahead of its consumer.

use std::collections::VecDeque;
use std::io::{self, Read};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::read::DecoderReader;

/// Read-ahead limit of each stage.
pub const CHUNK_SIZE: usize = 1024;

/// Segment decoder. Accepts missing or partial padding and non-zero
/// trailing bits.
static RECOVERY: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

type SegmentDecoder<R> = DecoderReader<'static, GeneralPurpose, JunkStripper<PadSplitter<R>>>;

/// Returns true for bytes the stripper removes.
#[must_use]
pub const fn is_junk(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | b'!' | b'.' | 0)
}

/// Drops whitespace, `!`, `.` and NUL bytes from the wrapped reader.
#[derive(Debug)]
pub struct JunkStripper<R> {
    inner: R,
    buf: [u8; CHUNK_SIZE],
}

impl<R: Read> JunkStripper<R> {
    /// Wraps a reader.
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            buf: [0; CHUNK_SIZE],
        }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for JunkStripper<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        // A chunk of pure junk must not look like end-of-stream.
        loop {
            let size = out.len().min(CHUNK_SIZE);
            let read = self.inner.read(&mut self.buf[..size])?;
            if read == 0 {
                return Ok(0);
            }
            let mut n = 0;
            for &byte in &self.buf[..read] {
                if !is_junk(byte) {
                    out[n] = byte;
                    n += 1;
                }
            }
            if n > 0 {
                return Ok(n);
            }
        }
    }
}

/// Splits a base64 stream into independently padded segments.
///
/// Bytes are handed out up to and including a run of `=`. The first
/// alphabet byte after that run ends the segment: reads return `Ok(0)` and
/// the byte stays buffered for the next segment. Junk bytes after a `=` do
/// not end the segment, so a padding run broken across lines stays whole.
#[derive(Debug)]
pub struct PadSplitter<R> {
    inner: R,
    ring: VecDeque<u8>,
    found_equal: bool,
    segment_end: bool,
    eof: bool,
}

impl<R: Read> PadSplitter<R> {
    /// Wraps a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            ring: VecDeque::with_capacity(CHUNK_SIZE),
            found_equal: false,
            segment_end: false,
            eof: false,
        }
    }

    /// Re-arms the splitter after a segment was consumed.
    ///
    /// Returns false once the ring is empty and the source is exhausted,
    /// meaning no further segment exists.
    pub fn next_segment(&mut self) -> bool {
        if self.eof && self.ring.is_empty() {
            return false;
        }
        self.found_equal = false;
        self.segment_end = false;
        true
    }

    fn fill(&mut self, want: usize) -> io::Result<()> {
        let space = CHUNK_SIZE - self.ring.len();
        if self.eof || space == 0 {
            return Ok(());
        }
        let mut chunk = [0u8; CHUNK_SIZE];
        let size = space.min(want);
        let read = self.inner.read(&mut chunk[..size])?;
        if read == 0 {
            self.eof = true;
        } else {
            self.ring.extend(&chunk[..read]);
        }
        Ok(())
    }
}

impl<R: Read> Read for PadSplitter<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.segment_end || out.is_empty() {
            return Ok(0);
        }
        self.fill(out.len())?;

        let mut n = 0;
        while n < out.len() {
            let Some(&byte) = self.ring.front() else {
                break;
            };
            if byte == b'=' {
                self.found_equal = true;
            } else if self.found_equal && !is_junk(byte) {
                self.found_equal = false;
                self.segment_end = true;
                break;
            }
            out[n] = byte;
            self.ring.pop_front();
            n += 1;
        }
        Ok(n)
    }
}

/// Decodes concatenated, line-wrapped and partially padded base64.
///
/// ```
/// use std::io::Read;
/// use mailmend_mime::encoding::base64::Base64Combiner;
///
/// let mut out = Vec::new();
/// Base64Combiner::new(&b"YQ==\r\nYmM=\r\n"[..]).read_to_end(&mut out)?;
/// assert_eq!(out, b"abc");
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct Base64Combiner<R: Read> {
    decoder: Option<SegmentDecoder<R>>,
}

impl<R: Read> Base64Combiner<R> {
    /// Creates the pipeline over a raw base64 source.
    pub fn new(source: R) -> Self {
        Self {
            decoder: Some(segment_decoder(PadSplitter::new(source))),
        }
    }
}

fn segment_decoder<R: Read>(splitter: PadSplitter<R>) -> SegmentDecoder<R> {
    DecoderReader::new(JunkStripper::new(splitter), &RECOVERY)
}

impl<R: Read> Read for Base64Combiner<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(0);
            };
            let n = decoder.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            let Some(decoder) = self.decoder.take() else {
                return Ok(0);
            };
            let mut splitter = decoder.into_inner().into_inner();
            if !splitter.next_segment() {
                return Ok(0);
            }
            tracing::trace!("base64 padding boundary, starting next segment");
            self.decoder = Some(segment_decoder(splitter));
        }
    }
}

/// Decodes a complete base64 buffer through the recovery pipeline.
///
/// # Errors
///
/// Returns an error if a segment is not valid base64.
pub fn decode_lenient(input: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    Base64Combiner::new(input).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use proptest::prelude::*;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Reader that fails after its data is gone.
    struct Failing<'a>(&'a [u8]);

    impl Read for Failing<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = buf.len().min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    fn strip(input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        JunkStripper::new(input).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_junk_stripper() {
        assert_eq!(strip(b"\tA B\r\nC"), b"ABC");
        assert_eq!(strip(b"A!.\0B"), b"AB");
    }

    #[test]
    fn test_junk_stripper_all_junk_chunks() {
        let mut input = vec![b'\n'; CHUNK_SIZE * 2];
        input.extend_from_slice(b"QQ==");
        let mut out = Vec::new();
        JunkStripper::new(Trickle {
            data: &input,
            step: 7,
        })
        .read_to_end(&mut out)
        .unwrap();
        assert_eq!(out, b"QQ==");
    }

    #[test]
    fn test_junk_stripping_idempotent() {
        let clean = b"TWFueSBoYW5kcyBtYWtlIGxpZ2h0IHdvcmsu";
        assert_eq!(strip(clean), clean);
        assert_eq!(strip(&strip(b"TW Fu\r\neS4=")), strip(b"TW Fu\r\neS4="));
    }

    #[test]
    fn test_pad_splitter_segments() {
        let mut splitter = PadSplitter::new(&b"YQ==YmM=ZGVm"[..]);
        let mut segment = String::new();
        splitter.read_to_string(&mut segment).unwrap();
        assert_eq!(segment, "YQ==");

        assert!(splitter.next_segment());
        segment.clear();
        splitter.read_to_string(&mut segment).unwrap();
        assert_eq!(segment, "YmM=");

        assert!(splitter.next_segment());
        segment.clear();
        splitter.read_to_string(&mut segment).unwrap();
        assert_eq!(segment, "ZGVm");

        assert!(!splitter.next_segment());
    }

    #[test]
    fn test_pad_splitter_keeps_junk_inside_padding_run() {
        let mut splitter = PadSplitter::new(&b"YQ=\r\n=\r\nYg=="[..]);
        let mut segment = Vec::new();
        splitter.read_to_end(&mut segment).unwrap();
        assert_eq!(segment, b"YQ=\r\n=\r\n");
    }

    #[test]
    fn test_combiner_single_segment() {
        assert_eq!(decode_lenient(b"SGVsbG8sIFdvcmxkIQ==").unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_combiner_line_wrapped() {
        let input = b"SGVs\r\nbG8s\r\n IFdv\tcm\nxk\r\nIQ==\r\n";
        assert_eq!(decode_lenient(input).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_combiner_concatenated_segments() {
        let input = b"YQ==\r\nYmM=\nZGVm\r\n";
        assert_eq!(decode_lenient(input).unwrap(), b"abcdef");
    }

    #[test]
    fn test_combiner_truncated_padding() {
        let input = b"MTIzNDU2Nzg5MDEyMzQ1Ng=";
        assert_eq!(decode_lenient(input).unwrap(), b"1234567890123456");
        assert_eq!(
            decode_lenient(b"MTIzNDU2Nzg5MDEyMzQ1Ng==").unwrap(),
            b"1234567890123456"
        );
    }

    #[test]
    fn test_combiner_truncated_padding_split() {
        for (first, next) in [("a", "abcd"), ("xyz1234", "mnopqrstuv"), ("abcd", "a")] {
            let mut a = STANDARD.encode(first);
            a.pop();
            let mut b = STANDARD.encode(next);
            b.pop();
            let input = format!("{a}\r\n\t\r\n{b}");
            let out = decode_lenient(input.as_bytes()).unwrap();
            assert_eq!(out, format!("{first}{next}").as_bytes());
        }
    }

    #[test]
    fn test_combiner_empty_and_trailing_junk() {
        assert!(decode_lenient(b"").unwrap().is_empty());
        assert!(decode_lenient(b"\r\n\r\n").unwrap().is_empty());
        assert_eq!(decode_lenient(b"QQ==\r\n\r\n").unwrap(), b"A");
    }

    #[test]
    fn test_combiner_small_reads() {
        let encoded = STANDARD.encode(b"the quick brown fox jumps over the lazy dog");
        let wrapped: String = encoded
            .as_bytes()
            .chunks(5)
            .map(|c| format!("{}\r\n", std::str::from_utf8(c).unwrap()))
            .collect();
        let mut out = Vec::new();
        Base64Combiner::new(Trickle {
            data: wrapped.as_bytes(),
            step: 3,
        })
        .read_to_end(&mut out)
        .unwrap();
        assert_eq!(out, b"the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn test_combiner_invalid_segment() {
        let err = decode_lenient(b"YQ==\r\nY$M=").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_combiner_propagates_source_error() {
        let mut out = Vec::new();
        let err = Base64Combiner::new(Failing(b"YWJj"))
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    fn separator() -> impl Strategy<Value = String> {
        proptest::collection::vec(prop_oneof![Just('\t'), Just('\r'), Just('\n')], 0..8)
            .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_round_trip_with_whitespace(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            breaks in proptest::collection::vec((any::<prop::sample::Index>(), separator()), 0..16),
        ) {
            let mut encoded = STANDARD.encode(&data);
            for (index, sep) in breaks {
                let at = index.index(encoded.len() + 1);
                encoded.insert_str(at, &sep);
            }
            prop_assert_eq!(decode_lenient(encoded.as_bytes()).unwrap(), data);
        }

        #[test]
        fn prop_segment_concatenation(
            segments in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..600), 0..8),
            sep in separator(),
        ) {
            let encoded: Vec<String> = segments.iter().map(|s| STANDARD.encode(s)).collect();
            let whole = encoded.join(&sep);
            let expected: Vec<u8> = segments.concat();
            prop_assert_eq!(decode_lenient(whole.as_bytes()).unwrap(), expected);
        }
    }
}
