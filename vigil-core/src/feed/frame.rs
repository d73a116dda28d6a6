//! Incremental decoder for server-push text frames.
//!
//! Frames look like `data: <JSON>\n\n`. Bytes are buffered until a full
//! line is available, so chunk boundaries (including ones that split a
//! multi-byte character) do not affect the decoded payloads. Lines and
//! events larger than the size limit are discarded, as are events with a
//! line that is not valid UTF-8.

use tracing::{trace, warn};

/// Largest line or event the decoder buffers.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Accumulates raw bytes and yields complete `data` payloads.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline.
    scanned: usize,
    data: Vec<String>,
    data_len: usize,
    /// Skipping the rest of the current event.
    discarding: bool,
    max_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder with a custom line and event size limit.
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            data: Vec::new(),
            data_len: 0,
            discarding: false,
            max_bytes: max_bytes.max(1),
        }
    }

    /// Feed a chunk and collect every payload it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        let mut start = 0;
        let mut search = self.scanned;
        while let Some(offset) = buf[search..].iter().position(|&b| b == b'\n') {
            let end = search + offset;
            let mut line = &buf[start..end];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            match std::str::from_utf8(line) {
                Ok(line) => {
                    if let Some(payload) = self.process_line(line) {
                        out.push(payload);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Discarding event with invalid UTF-8 line");
                    self.discard_event();
                }
            }
            start = end + 1;
            search = start;
        }

        buf.drain(..start);
        self.scanned = buf.len();
        self.pending = buf;

        if self.pending.len() > self.max_bytes {
            warn!(
                buffered = self.pending.len(),
                limit = self.max_bytes,
                "Frame line exceeds size limit, discarding"
            );
            self.pending.clear();
            self.scanned = 0;
            self.discard_event();
        }
        out
    }

    /// Drop any partially received event. An event without its
    /// terminating blank line is never dispatched.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.scanned = 0;
        self.data.clear();
        self.data_len = 0;
        self.discarding = false;
    }

    /// Bytes buffered but not yet terminated by a newline.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    fn discard_event(&mut self) {
        self.data.clear();
        self.data_len = 0;
        self.discarding = true;
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.discarding {
                self.discarding = false;
                return None;
            }
            if self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            self.data_len = 0;
            return Some(payload);
        }

        if self.discarding || line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data_len += value.len() + 1;
                if self.data_len > self.max_bytes {
                    warn!(limit = self.max_bytes, "Frame event exceeds size limit, discarding");
                    self.discard_event();
                } else {
                    self.data.push(value.to_string());
                }
            }
            other => trace!(field = other, "Ignoring frame field"),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut dec = FrameDecoder::new();
        let out = dec.push(b"data: {\"type\":\"threat\"}\n\n");
        assert_eq!(out, vec![r#"{"type":"threat"}"#.to_string()]);
        assert_eq!(dec.buffered_len(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut dec = FrameDecoder::new();
        let out = dec.push(b"data: 1\n\ndata: 2\n\ndata: 3\n\n");
        assert_eq!(out, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut dec = FrameDecoder::new();
        assert!(dec.push(b"da").is_empty());
        assert!(dec.push(b"ta: hel").is_empty());
        assert!(dec.push(b"lo\n").is_empty());
        assert_eq!(dec.push(b"\n"), vec!["hello"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut dec = FrameDecoder::new();
        let out = dec.push(b"data: a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut dec = FrameDecoder::new();
        let out = dec.push(b"data: first\ndata: second\n\n");
        assert_eq!(out, vec!["first\nsecond"]);
    }

    #[test]
    fn test_comments_and_other_fields_are_ignored() {
        let mut dec = FrameDecoder::new();
        let out = dec.push(b": keep-alive\n\nevent: update\nid: 7\nretry: 100\ndata: x\n\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn test_blank_lines_without_data_dispatch_nothing() {
        let mut dec = FrameDecoder::new();
        assert!(dec.push(b"\n\n\n").is_empty());
    }

    #[test]
    fn test_no_space_after_colon() {
        let mut dec = FrameDecoder::new();
        assert_eq!(dec.push(b"data:tight\n\n"), vec!["tight"]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let frame = "data: {\"location\":\"Dubaï ☂\"}\n\n".as_bytes();
        let split = frame.iter().position(|&b| b == 0xE2).unwrap() + 1;
        let mut dec = FrameDecoder::new();
        assert!(dec.push(&frame[..split]).is_empty());
        let out = dec.push(&frame[split..]);
        assert_eq!(out, vec![r#"{"location":"Dubaï ☂"}"#]);
    }

    #[test]
    fn test_reset_discards_partial_event() {
        let mut dec = FrameDecoder::new();
        assert!(dec.push(b"data: half\n").is_empty());
        dec.reset();
        assert!(dec.push(b"\n").is_empty());
    }

    #[test]
    fn test_overlong_line_is_discarded() {
        let mut dec = FrameDecoder::with_limit(64);
        let long = vec![b'x'; 100];
        assert!(dec.push(b"data: ").is_empty());
        assert!(dec.push(&long).is_empty());
        assert_eq!(dec.buffered_len(), 0);

        // Tail of the oversized event is skipped, the next one decodes.
        assert!(dec.push(b"xxx\n\n").is_empty());
        assert_eq!(dec.push(b"data: ok\n\n"), vec!["ok"]);
    }

    #[test]
    fn test_overlong_event_is_discarded() {
        let mut dec = FrameDecoder::with_limit(16);
        let out = dec.push(b"data: 0123456789\ndata: 0123456789\ndata: tail\n\ndata: next\n\n");
        assert_eq!(out, vec!["next"]);
    }

    #[test]
    fn test_long_line_across_many_chunks() {
        let payload = "y".repeat(10_000);
        let frame = format!("data: {}\n\n", payload);
        let mut dec = FrameDecoder::new();
        let mut out = Vec::new();
        for chunk in frame.as_bytes().chunks(7) {
            out.extend(dec.push(chunk));
        }
        assert_eq!(out, vec![payload]);
        assert_eq!(dec.buffered_len(), 0);
    }

    #[test]
    fn test_invalid_utf8_line_drops_event() {
        let mut dec = FrameDecoder::new();
        let out = dec.push(b"data: {\"id\":\"\xff\xfe\"}\n\ndata: clean\n\n");
        assert_eq!(out, vec!["clean"]);
    }

    #[test]
    fn test_invalid_utf8_in_multiline_event_drops_whole_event() {
        let mut dec = FrameDecoder::new();
        let out = dec.push(b"data: first\ndata: \xc3\ndata: third\n\n");
        assert!(out.is_empty());
    }
}
