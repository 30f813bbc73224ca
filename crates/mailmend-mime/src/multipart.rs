//! Boundary-delimited multipart body reader (RFC 2046 section 5.1).
//!
//! The reader works line by line. A delimiter line is `--boundary`, or
//! `--boundary--` for the close delimiter, optionally followed by transport
//! whitespace. The line break before a delimiter belongs to the delimiter,
//! so it is held back until the next line shows whether it is body data.
//!
//! Real mail breaks these rules in a few recurring ways, all repaired here
//! and reported through `tracing` at debug level:
//!
//! - a part whose header block is missing (the first line is body text)
//! - input that ends without a close delimiter
//! - a delimiter directly after another one (a part with no header or body)

use std::io::{self, BufRead, Read};

use crate::header::{Headers, MAX_LINE_LEN, split_field};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first delimiter.
    Preamble,
    /// Inside the body of the current part.
    Body,
    /// A delimiter was read; the next part's header follows.
    NextPart,
    /// The close delimiter was read.
    Closed,
    /// Input ended without a close delimiter.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Part,
    Close,
}

/// Splits a multipart body into its parts.
#[derive(Debug)]
pub struct MultipartReader<R> {
    source: R,
    dash_boundary: Vec<u8>,
    state: State,
    line: Vec<u8>,
    pending: Vec<u8>,
    pending_pos: usize,
    held_eol: &'static [u8],
    /// The last read stopped at the length cap, not at a line break.
    partial: bool,
    /// The current `line` continues a capped line.
    continuation: bool,
}

impl<R: BufRead> MultipartReader<R> {
    /// Creates a reader for parts delimited by `boundary`.
    pub fn new(source: R, boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self {
            source,
            dash_boundary,
            state: State::Preamble,
            line: Vec::new(),
            pending: Vec::new(),
            pending_pos: 0,
            held_eol: b"",
            partial: false,
            continuation: false,
        }
    }

    /// Returns the boundary, without the leading dashes.
    #[must_use]
    pub fn boundary(&self) -> &str {
        // Built from a &str in `new`.
        std::str::from_utf8(&self.dash_boundary[2..]).unwrap_or_default()
    }

    /// True once the close delimiter was read or the input ran out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Closed | State::Exhausted)
    }

    /// True if the input ended before a close delimiter.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == State::Exhausted
    }

    /// Advances to the next part, skipping the preamble and whatever is left
    /// of the current part's body.
    ///
    /// Returns `None` after the close delimiter or at end of input.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the source.
    pub fn next_part(&mut self) -> io::Result<Option<PartReader<'_, R>>> {
        while self.state == State::Body {
            self.discard_pending();
            self.fill_body_line()?;
        }
        self.discard_pending();

        if self.state == State::Preamble {
            self.skip_preamble()?;
        }
        if self.state != State::NextPart {
            return Ok(None);
        }

        let headers = self.read_part_header()?;
        Ok(Some(PartReader {
            headers,
            reader: self,
        }))
    }

    fn skip_preamble(&mut self) -> io::Result<()> {
        loop {
            if !self.read_line()? {
                tracing::debug!(boundary = self.boundary(), "no delimiter in multipart body");
                self.state = State::Exhausted;
                return Ok(());
            }
            match self.classify() {
                Some(Delimiter::Part) => {
                    self.state = State::NextPart;
                    return Ok(());
                }
                Some(Delimiter::Close) => {
                    tracing::debug!(boundary = self.boundary(), "close delimiter before first part");
                    self.state = State::Closed;
                    return Ok(());
                }
                None => {}
            }
        }
    }

    fn read_part_header(&mut self) -> io::Result<Headers> {
        let mut headers = Headers::new();
        self.held_eol = b"";
        loop {
            if !self.read_line()? {
                tracing::debug!(boundary = self.boundary(), "input ended inside part header");
                self.state = State::Exhausted;
                return Ok(headers);
            }
            if self.continuation {
                tracing::debug!(boundary = self.boundary(), "part header line too long, truncating");
                continue;
            }
            if let Some(delimiter) = self.classify() {
                tracing::debug!(boundary = self.boundary(), "empty part");
                self.state = match delimiter {
                    Delimiter::Part => State::NextPart,
                    Delimiter::Close => State::Closed,
                };
                return Ok(headers);
            }

            let (content, eol) = split_eol(&self.line);
            let text = String::from_utf8_lossy(content);
            if text.trim().is_empty() {
                self.state = State::Body;
                return Ok(headers);
            }
            if text.starts_with([' ', '\t']) && !headers.is_empty() {
                headers.extend_last(&text);
                continue;
            }
            if let Some((name, value)) = split_field(&text) {
                headers.add(name, value);
                continue;
            }

            tracing::debug!(boundary = self.boundary(), "part header missing, line taken as body");
            self.pending.extend_from_slice(content);
            self.held_eol = eol;
            self.state = State::Body;
            return Ok(headers);
        }
    }

    fn read_body(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let available = &self.pending[self.pending_pos..];
            if !available.is_empty() {
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.pending_pos += n;
                return Ok(n);
            }
            if self.state != State::Body {
                return Ok(0);
            }
            self.discard_pending();
            self.fill_body_line()?;
        }
    }

    /// Reads one body line into `pending`, or moves past the body.
    fn fill_body_line(&mut self) -> io::Result<()> {
        if !self.read_line()? {
            tracing::debug!(boundary = self.boundary(), "missing close delimiter");
            self.pending.extend_from_slice(self.held_eol);
            self.held_eol = b"";
            self.state = State::Exhausted;
            return Ok(());
        }
        match self.classify() {
            Some(Delimiter::Part) => {
                self.held_eol = b"";
                self.state = State::NextPart;
            }
            Some(Delimiter::Close) => {
                self.held_eol = b"";
                self.state = State::Closed;
            }
            None => {
                let (content, eol) = split_eol(&self.line);
                self.pending.extend_from_slice(self.held_eol);
                self.pending.extend_from_slice(content);
                self.held_eol = eol;
            }
        }
        Ok(())
    }

    /// Reads up to [`MAX_LINE_LEN`] bytes of the next line. Longer lines
    /// arrive in several pieces.
    fn read_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        self.continuation = self.partial;
        let read = self
            .source
            .by_ref()
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut self.line)?;
        if read == 0 {
            self.partial = false;
            return Ok(false);
        }
        self.partial = !self.line.ends_with(b"\n");
        // Keep a CRLF split by the cap together.
        if self.partial && self.line.ends_with(b"\r") && self.source.fill_buf()?.first() == Some(&b'\n') {
            self.source.consume(1);
            self.line.push(b'\n');
            self.partial = false;
        }
        Ok(true)
    }

    fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_pos = 0;
    }

    fn classify(&self) -> Option<Delimiter> {
        if self.continuation {
            return None;
        }
        let rest = self.line.strip_prefix(self.dash_boundary.as_slice())?;
        let rest = rest.trim_ascii_end();
        if rest.is_empty() {
            Some(Delimiter::Part)
        } else if rest == b"--" {
            Some(Delimiter::Close)
        } else {
            None
        }
    }
}

fn split_eol(line: &[u8]) -> (&[u8], &'static [u8]) {
    if let Some(content) = line.strip_suffix(b"\r\n") {
        (content, &b"\r\n"[..])
    } else if let Some(content) = line.strip_suffix(b"\n") {
        (content, &b"\n"[..])
    } else {
        (line, &b""[..])
    }
}

/// One part of a multipart body: its header and a reader over its body.
#[derive(Debug)]
pub struct PartReader<'a, R> {
    /// The part's header block. Empty if the part had none.
    pub headers: Headers,
    reader: &'a mut MultipartReader<R>,
}

impl<R: BufRead> PartReader<'_, R> {
    /// True if the multipart body ended with this part.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.reader.is_finished()
    }
}

impl<R: BufRead> Read for PartReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.reader.read_body(buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn collect(input: &[u8], boundary: &str) -> (Vec<(Headers, Vec<u8>)>, bool) {
        let mut reader = MultipartReader::new(input, boundary);
        let mut parts = Vec::new();
        while let Some(mut part) = reader.next_part().unwrap() {
            let mut body = Vec::new();
            part.read_to_end(&mut body).unwrap();
            parts.push((part.headers.clone(), body));
        }
        (parts, reader.is_exhausted())
    }

    #[test]
    fn test_two_parts() {
        let input = concat!(
            "preamble\r\n",
            "--xyz\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first\r\n",
            "line\r\n",
            "--xyz\r\n",
            "\r\n",
            "second\r\n",
            "--xyz--\r\n",
            "epilogue\r\n"
        );
        let (parts, exhausted) = collect(input.as_bytes(), "xyz");
        assert!(!exhausted);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0.get("content-type"), Some("text/plain"));
        assert_eq!(parts[0].1, b"first\r\nline");
        assert!(parts[1].0.is_empty());
        assert_eq!(parts[1].1, b"second");
    }

    #[test]
    fn test_delimiter_with_trailing_space() {
        let input = b"--b  \n\nbody\n--b-- \t\n";
        let (parts, exhausted) = collect(input, "b");
        assert!(!exhausted);
        assert_eq!(parts[0].1, b"body");
    }

    #[test]
    fn test_boundary_prefix_is_body() {
        let input = b"--b\n\n--bx\n--b--\n";
        let (parts, _) = collect(input, "b");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, b"--bx");
    }

    #[test]
    fn test_missing_close_delimiter() {
        let input = b"--b\nContent-Type: text/plain\n\nno end\n";
        let (parts, exhausted) = collect(input, "b");
        assert!(exhausted);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, b"no end\n");
    }

    #[test]
    fn test_omitted_header() {
        let input = b"--b\nJust text, no header\nmore\n--b--\n";
        let (parts, _) = collect(input, "b");
        assert!(parts[0].0.is_empty());
        assert_eq!(parts[0].1, b"Just text, no header\nmore");
    }

    #[test]
    fn test_folded_part_header() {
        let input = b"--b\nContent-Type: text/plain;\n charset=utf-8\n\nx\n--b--\n";
        let (parts, _) = collect(input, "b");
        assert_eq!(parts[0].0.get("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_empty_parts() {
        let input = b"--b\n--b\n\nbody\n--b\n--b--\n";
        let (parts, _) = collect(input, "b");
        let bodies: Vec<_> = parts.iter().map(|(_, body)| body.as_slice()).collect();
        assert_eq!(bodies, [&b""[..], &b"body"[..], &b""[..]]);
    }

    #[test]
    fn test_skips_unread_body() {
        let input = b"--b\n\nskip me\nand me\n--b\n\nkeep\n--b--\n";
        let mut reader = MultipartReader::new(&input[..], "b");
        assert!(reader.next_part().unwrap().is_some());
        let mut part = reader.next_part().unwrap().unwrap();
        let mut body = String::new();
        part.read_to_string(&mut body).unwrap();
        assert_eq!(body, "keep");
        assert!(part.is_last());
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_no_delimiter() {
        let (parts, exhausted) = collect(b"just a preamble\n", "b");
        assert!(parts.is_empty());
        assert!(exhausted);
    }

    #[test]
    fn test_long_line_is_not_a_delimiter() {
        let mut input = vec![b'a'; MAX_LINE_LEN];
        input.extend_from_slice(b"--b\r\n--b--\r\n");
        let mut framed = b"--b\r\n\r\n".to_vec();
        framed.extend_from_slice(&input);
        let (parts, exhausted) = collect(&framed, "b");
        assert!(!exhausted);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1.len(), MAX_LINE_LEN + 3);
        assert!(parts[0].1.ends_with(b"a--b"));
    }

    #[test]
    fn test_crlf_at_line_cap() {
        let mut input = b"--b\r\n\r\n".to_vec();
        input.extend(std::iter::repeat_n(b'a', MAX_LINE_LEN - 1));
        input.extend_from_slice(b"\r\n--b--\r\n");
        let (parts, _) = collect(&input, "b");
        assert_eq!(parts[0].1, vec![b'a'; MAX_LINE_LEN - 1]);
    }

    #[test]
    fn test_long_part_header_line() {
        let input = format!(
            "--b\nX-Long: {}\nContent-Type: text/html\n\nbody\n--b--\n",
            "y".repeat(MAX_LINE_LEN * 2)
        );
        let (parts, _) = collect(input.as_bytes(), "b");
        assert_eq!(parts[0].0.get("content-type"), Some("text/html"));
        assert_eq!(parts[0].0.get("x-long").unwrap().len(), MAX_LINE_LEN - "X-Long: ".len());
        assert_eq!(parts[0].1, b"body");
    }

    #[test]
    fn test_small_reads() {
        let input = b"--b\n\nabcdef\r\nghi\r\n--b--\r\n";
        let mut reader = MultipartReader::new(&input[..], "b");
        let mut part = reader.next_part().unwrap().unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = part.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcdef\r\nghi");
    }
}
