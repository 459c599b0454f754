//! Line framing over a compacting fixed-capacity read buffer.
//!
//! [`FrameReader`] turns the byte chunks produced by repeated socket reads
//! into discrete frames: complete lines with their terminator stripped.
//! Bytes left over after the last terminator in a chunk are retained,
//! shifted to the start of the buffer, and consumed by the next chunk, so
//! a line may be split across any number of reads without loss.
//!
//! The buffer does not grow: an unterminated line longer than the
//! configured capacity fails loudly with [`EngineError::LineTooLong`]
//! instead of consuming unbounded memory.
//!
//! Frames decode through a configurable text encoding (an `encoding_rs`
//! label, UTF-8 by default); undecodable byte sequences are replaced, not
//! dropped.

use bytes::{Buf, BytesMut};
use encoding::{Encoding, UTF_8};
use tracing::warn;

use crate::error::{EngineError, Result};

/// Maximum bytes an unterminated line may accumulate before framing fails.
pub const MAX_LINE_LEN: usize = 8191;

/// Incremental CRLF frame decoder.
///
/// Frames are emitted in wire order. A terminator is a line-feed byte; a
/// carriage return immediately before it is stripped as part of the
/// terminator. Two adjacent terminators decode as an empty frame, which is
/// forwarded rather than dropped.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    capacity: usize,
    encoding: &'static Encoding,
}

impl FrameReader {
    /// UTF-8 reader with the default [`MAX_LINE_LEN`] capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_LINE_LEN)
    }

    /// UTF-8 reader with an explicit capacity bound on the unconsumed
    /// tail.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            encoding: UTF_8,
        }
    }

    /// Reader decoding frames with the encoding named by `label`
    /// (an `encoding_rs` label such as `"utf-8"` or `"latin1"`).
    ///
    /// An unrecognized label falls back to UTF-8.
    pub fn with_encoding(label: &str) -> Self {
        let encoding = Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
            warn!(label, "unknown encoding label, falling back to utf-8");
            UTF_8
        });
        Self {
            buf: BytesMut::with_capacity(MAX_LINE_LEN),
            capacity: MAX_LINE_LEN,
            encoding,
        }
    }

    /// The encoding frames are decoded with.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Number of retained bytes awaiting a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Consume one read's worth of bytes and return the complete frames it
    /// finished, in order. Returns [`EngineError::LineTooLong`] when the
    /// retained tail would exceed capacity; the reader is unusable for
    /// that connection afterwards.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(off) = find_lf(&self.buf[start..]) {
            let lf = start + off;
            let mut end = lf;
            if end > start && self.buf[end - 1] == b'\r' {
                end -= 1;
            }
            let (decoded, _) = self.encoding.decode_without_bom_handling(&self.buf[start..end]);
            frames.push(decoded.into_owned());
            start = lf + 1;
        }
        self.buf.advance(start);

        if self.buf.len() > self.capacity {
            return Err(EngineError::LineTooLong(self.buf.len()));
        }
        Ok(frames)
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn find_lf(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_line() {
        let mut reader = FrameReader::new();
        let frames = reader.feed(b"PING :irc.example.com\r\n").unwrap();
        assert_eq!(frames, vec!["PING :irc.example.com"]);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn test_multiple_lines_per_chunk() {
        let mut reader = FrameReader::new();
        let frames = reader.feed(b"FOO\r\nBAR\r\nBAZ\r\n").unwrap();
        assert_eq!(frames, vec!["FOO", "BAR", "BAZ"]);
    }

    #[test]
    fn test_partial_line_retained() {
        let mut reader = FrameReader::new();
        let frames = reader.feed(b"PING :ser").unwrap();
        assert!(frames.is_empty());
        assert_eq!(reader.pending(), 9);

        let frames = reader.feed(b"ver.example\r\n").unwrap();
        assert_eq!(frames, vec!["PING :server.example"]);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn test_split_mid_terminator() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"HELLO\r").unwrap().is_empty());
        let frames = reader.feed(b"\nWORLD\r\n").unwrap();
        assert_eq!(frames, vec!["HELLO", "WORLD"]);
    }

    #[test]
    fn test_terminator_at_chunk_end_then_tail() {
        let mut reader = FrameReader::new();
        let frames = reader.feed(b"ONE\r\nTW").unwrap();
        assert_eq!(frames, vec!["ONE"]);
        assert_eq!(reader.pending(), 2);

        let frames = reader.feed(b"O\r\n").unwrap();
        assert_eq!(frames, vec!["TWO"]);
    }

    #[test]
    fn test_bare_lf_accepted() {
        let mut reader = FrameReader::new();
        let frames = reader.feed(b"NOTICE hi\n").unwrap();
        assert_eq!(frames, vec!["NOTICE hi"]);
    }

    #[test]
    fn test_empty_frame_quirk() {
        // \r\n\r\n decodes the second terminator as an empty frame, which
        // is forwarded rather than filtered.
        let mut reader = FrameReader::new();
        let frames = reader.feed(b"PING :x\r\n\r\n").unwrap();
        assert_eq!(frames, vec!["PING :x", ""]);
    }

    #[test]
    fn test_overflow_fails_loudly() {
        let mut reader = FrameReader::with_capacity(16);
        let err = reader.feed(&[b'a'; 32]).unwrap_err();
        match err {
            EngineError::LineTooLong(n) => assert_eq!(n, 32),
            other => panic!("expected LineTooLong, got {other:?}"),
        }
    }

    #[test]
    fn test_terminator_makes_room() {
        // A chunk that both completes a line and leaves a short tail stays
        // within capacity even if the combined length exceeds it.
        let mut reader = FrameReader::with_capacity(16);
        reader.feed(b"0123456789").unwrap();
        let frames = reader.feed(b"abcde\r\nrest").unwrap();
        assert_eq!(frames, vec!["0123456789abcde"]);
        assert_eq!(reader.pending(), 4);
    }

    #[test]
    fn test_configured_encoding_decodes_frames() {
        let mut reader = FrameReader::with_encoding("latin1");
        let frames = reader.feed(b"PRIVMSG #caf\xe9 :d\xe9j\xe0 vu\r\n").unwrap();
        assert_eq!(frames, vec!["PRIVMSG #café :déjà vu"]);
    }

    #[test]
    fn test_unknown_encoding_label_falls_back_to_utf8() {
        let mut reader = FrameReader::with_encoding("no-such-encoding");
        let frames = reader.feed("PRIVMSG #chan :héllo\r\n".as_bytes()).unwrap();
        assert_eq!(frames, vec!["PRIVMSG #chan :héllo"]);
    }

    #[test]
    fn test_byte_exact_reassembly() {
        let wire = b"NICK tester\r\nUSER tester hostname servername :Test\r\n";
        for split in 0..wire.len() {
            let mut reader = FrameReader::new();
            let mut frames = reader.feed(&wire[..split]).unwrap();
            frames.extend(reader.feed(&wire[split..]).unwrap());
            assert_eq!(
                frames,
                vec!["NICK tester", "USER tester hostname servername :Test"],
                "split at {split}"
            );
        }
    }
}
