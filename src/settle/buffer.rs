use std::fmt;
use std::time::Instant;

use super::{total_len, SettleContext, Settled, Settler};

/// Owns pending text and applies a settler to it.
///
/// Whatever the settler yields is removed from the front of the pending text. On
/// flush, anything the settler left behind is released as a final plain chunk.
pub struct SettleBuffer {
    settler: Box<dyn Settler>,
    pending: String,
    waiting_since: Option<Instant>,
}

impl SettleBuffer {
    pub fn new(settler: Box<dyn Settler>) -> Self {
        Self {
            settler,
            pending: String::new(),
            waiting_since: None,
        }
    }

    pub fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.waiting_since.is_none() {
            self.waiting_since = Some(Instant::now());
        }
        self.pending.push_str(text);
    }

    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Settles against wall-clock time elapsed since the pending text started waiting.
    pub fn drain(&mut self, flush: bool) -> Vec<Settled> {
        let elapsed = self
            .waiting_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        self.drain_with(SettleContext { elapsed, flush })
    }

    pub fn drain_with(&mut self, ctx: SettleContext) -> Vec<Settled> {
        let mut settled = self.settler.settle(&self.pending, ctx);
        let consumed = total_len(&settled).min(self.pending.len());
        debug_assert!(
            self.pending.is_char_boundary(consumed),
            "settler yielded a non-prefix slice"
        );

        settled.retain(|chunk| !chunk.content.is_empty());
        self.pending.drain(..consumed);

        if ctx.flush && !self.pending.is_empty() {
            settled.push(Settled::plain(std::mem::take(&mut self.pending)));
        }

        if self.pending.is_empty() {
            self.waiting_since = None;
        } else if consumed > 0 {
            self.waiting_since = Some(Instant::now());
        }

        settled
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.waiting_since = None;
    }
}

impl fmt::Debug for SettleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettleBuffer")
            .field("pending", &self.pending)
            .field("waiting_since", &self.waiting_since)
            .finish_non_exhaustive()
    }
}
