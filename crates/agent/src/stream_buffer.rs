//! Batches stable response text into sink fragments.
//!
//! The agent feeds the buffer the stable prefix of its cleaned response
//! after every backend fragment. The buffer keeps track of what it has
//! already accepted, queues only the new tail, and releases the queue when
//! it grows past the flush threshold or when the newest piece carries
//! sentence or clause punctuation. Whatever is left goes out at the end.
//!
//! Once the response is recognized as a control command the buffer is
//! suspended: queued text is dropped and nothing more is released.

use tracing::debug;

/// Default number of buffered characters that forces a flush.
pub const DEFAULT_FLUSH_CHARS: usize = 30;

const FLUSH_PUNCTUATION: &[char] = &['.', '!', '?', ',', ';', ':'];

#[derive(Debug)]
pub struct StreamBuffer {
    flush_chars: usize,
    accepted: String,
    pending: String,
    suspended: bool,
}

impl StreamBuffer {
    pub fn new(flush_chars: usize) -> Self {
        Self {
            flush_chars: flush_chars.max(1),
            accepted: String::new(),
            pending: String::new(),
            suspended: false,
        }
    }

    /// Offer the current stable text; returns a fragment to emit, if any.
    pub fn offer(&mut self, stable: &str) -> Option<String> {
        if self.suspended {
            return None;
        }

        let delta = stable.strip_prefix(self.accepted.as_str())?;
        if delta.is_empty() {
            return None;
        }

        self.accepted.push_str(delta);
        self.pending.push_str(delta);

        let punctuated = delta.contains(FLUSH_PUNCTUATION);
        if punctuated || self.pending.chars().count() >= self.flush_chars {
            return Some(std::mem::take(&mut self.pending));
        }
        None
    }

    /// The stream ended; release everything up to `final_text`.
    pub fn finish(&mut self, final_text: &str) -> Option<String> {
        if self.suspended {
            return None;
        }

        match final_text.strip_prefix(self.accepted.as_str()) {
            Some(rest) => {
                self.accepted.push_str(rest);
                self.pending.push_str(rest);
            }
            None => {
                debug!(
                    accepted = %self.accepted,
                    "Final text diverged from streamed text, flushing what was accepted"
                );
            }
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Stop emitting for the rest of this response.
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.pending.clear();
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Everything accepted so far, flushed or not.
    pub fn accepted(&self) -> &str {
        &self.accepted
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_CHARS)
    }
}
