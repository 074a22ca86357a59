//! Newline-delimited frame reassembly.
//!
//! The chat backend answers a send with a chunked body of NDJSON text: one JSON
//! event per line. The network hands us that body in arbitrary pieces, so a
//! single chunk can hold half a line, several lines, or end in the middle of a
//! multi-byte UTF-8 character:
//!
//! ```text
//! chunk 1: {"type":"start","content":{"message":"ok"}}\n{"type":"text_del
//! chunk 2: ta","content":"caf\xC3
//! chunk 3: \xA9"}\n
//!
//! frames:  {"type":"start","content":{"message":"ok"}}
//!          {"type":"text_delta","content":"café"}
//! ```
//!
//! [`FrameReassembler`] turns that byte sequence back into whole lines. Its
//! output depends only on the bytes, never on where the chunk boundaries fell.

use crate::{Error, Result};

/// Largest unterminated frame kept in memory before the stream is rejected.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Buffers raw body chunks and yields complete newline-terminated frames.
///
/// # State
///
/// - **`pending`**: decoded text after the last newline seen so far. This is
///   the incomplete trailing frame carried into the next [`feed`](Self::feed).
/// - **`partial_utf8`**: up to three bytes of a UTF-8 sequence cut off by a
///   chunk boundary. They are prepended to the next chunk before decoding.
///
/// # Invariants
///
/// - A returned frame never contains `\n`.
/// - Frames come out in exactly the order their bytes arrived.
/// - Trailing text without a newline is never dropped: [`flush`](Self::flush)
///   hands it out once the body ends.
#[derive(Debug)]
pub struct FrameReassembler {
    pending: String,
    partial_utf8: Vec<u8>,
    max_frame_bytes: usize,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReassembler {
    /// Creates an empty reassembler with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Creates an empty reassembler that rejects unterminated frames longer
    /// than `limit` bytes.
    pub fn with_max_frame_bytes(limit: usize) -> Self {
        Self {
            pending: String::new(),
            partial_utf8: Vec::new(),
            max_frame_bytes: limit,
        }
    }

    /// Appends a chunk and returns every frame it completed.
    ///
    /// Consecutive newlines produce empty frames; the decoder skips those.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stream`] when the text after the last newline grows past
    /// the frame size limit. The body is then not NDJSON we can consume.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.decode_into_pending(chunk);

        let mut frames = Vec::new();
        if let Some(last_newline) = self.pending.rfind('\n') {
            let complete: String = self.pending.drain(..=last_newline).collect();
            frames.extend(
                complete[..complete.len() - 1]
                    .split('\n')
                    .map(str::to_owned),
            );
        }

        if self.pending.len() > self.max_frame_bytes {
            return Err(Error::stream(format!(
                "NDJSON frame exceeded {} bytes without a newline",
                self.max_frame_bytes
            )));
        }

        Ok(frames)
    }

    /// Returns the unterminated trailing frame once the body has ended.
    ///
    /// Held-back bytes of an unfinished UTF-8 sequence are decoded lossily.
    /// The buffer is cleared, so a second call returns `None`.
    pub fn flush(&mut self) -> Option<String> {
        if !self.partial_utf8.is_empty() {
            let tail = std::mem::take(&mut self.partial_utf8);
            self.pending.push_str(&String::from_utf8_lossy(&tail));
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Drops everything buffered so far.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.partial_utf8.clear();
    }

    /// Bytes currently held for the next frame.
    pub fn buffered_len(&self) -> usize {
        self.pending.len() + self.partial_utf8.len()
    }

    fn decode_into_pending(&mut self, chunk: &[u8]) {
        let joined;
        let mut bytes = if self.partial_utf8.is_empty() {
            chunk
        } else {
            let mut carried = std::mem::take(&mut self.partial_utf8);
            carried.extend_from_slice(chunk);
            joined = carried;
            joined.as_slice()
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.pending.push_str(text);
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.pending
                        .push_str(&String::from_utf8_lossy(&bytes[..valid]));
                    match err.error_len() {
                        // Invalid sequence in the middle: substitute and go on.
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            bytes = &bytes[valid + len..];
                        }
                        // Sequence cut short by the chunk boundary.
                        None => {
                            self.partial_utf8 = bytes[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}
