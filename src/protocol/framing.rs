//! Newline frame splitter for the inbound byte stream.
//!
//! A transport read may carry zero, one or many frames and may end halfway
//! through one. [`LineDecoder`] keeps the incomplete tail between reads and
//! hands back every complete frame, without its terminator, in arrival order.
//!
//! Frames longer than the configured limit are dropped: the decoder discards
//! bytes up to the next newline and resumes with the frame after it.

use crate::constants::{FRAME_DELIMITER, MAX_FRAME_SIZE};

/// Incremental newline frame decoder.
///
/// Owned by the reader task; never shared.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_frame_size: usize,
    /// Set while skipping the remainder of an oversized frame.
    discarding: bool,
}

impl LineDecoder {
    /// Create a decoder with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a decoder that drops frames longer than `max_frame_size` bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_size,
            discarding: false,
        }
    }

    /// Feed bytes into the decoder and extract all complete frames.
    ///
    /// Incomplete data is buffered for the next call. Blank lines are skipped.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|&b| b == FRAME_DELIMITER) {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buf.clear();
                continue;
            }

            if self.buf.len() + line.len() > self.max_frame_size {
                log::warn!(
                    "[Framing] Dropping oversized frame: {} bytes (max {})",
                    self.buf.len() + line.len(),
                    self.max_frame_size
                );
                self.buf.clear();
                continue;
            }

            let frame = if self.buf.is_empty() {
                line.to_vec()
            } else {
                let mut frame = std::mem::take(&mut self.buf);
                frame.extend_from_slice(line);
                frame
            };

            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            frames.push(frame);
        }

        if !self.discarding {
            if self.buf.len() + rest.len() > self.max_frame_size {
                log::warn!(
                    "[Framing] Frame exceeds {} bytes, discarding until next delimiter",
                    self.max_frame_size
                );
                self.buf.clear();
                self.discarding = true;
            } else {
                self.buf.extend_from_slice(rest);
            }
        }

        frames
    }

    /// Returns true if the decoder holds part of a frame.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}
