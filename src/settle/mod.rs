//! Settling: deciding which prefix of streamed text is final.
//!
//! A [`Settler`] inspects the text that has arrived but not yet been finalized and
//! returns the slices that are now safe to commit. Results are always contiguous
//! prefixes of `pending`; the owning [`SettleBuffer`] drops exactly the bytes it was
//! handed back.
//!
//! Built-in settlers compose through [`any`] and [`all`]:
//!
//! ```
//! use frameflow::settle::{any, line, paragraph, SettleContext, Settler, SettlerExt};
//!
//! let mut settler = any([line().boxed(), paragraph().boxed()]);
//! let settled = settler.settle("has\n\nboth", SettleContext::default());
//! let contents: Vec<&str> = settled.iter().map(|s| s.content.as_str()).collect();
//! assert_eq!(contents, vec!["has\n", "\n"]);
//! ```

mod basic;
mod buffer;
mod code_fence;
mod combinators;

use std::time::Duration;

use serde::Serialize;

pub use basic::{line, max_size, paragraph, sentence, timeout, Line, MaxSize, Paragraph, Sentence, Timeout};
pub use buffer::SettleBuffer;
pub use code_fence::{code_fence, CodeFence};
pub use combinators::{all, any, All, Any};

/// Fence metadata attached to chunks produced by [`CodeFence`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkMeta {
    pub in_code_fence: bool,
    pub language: Option<String>,
    pub fence_start: bool,
    pub fence_end: bool,
}

/// One finalized slice of pending text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settled {
    pub content: String,
    pub meta: Option<ChunkMeta>,
}

impl Settled {
    #[must_use]
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            meta: None,
        }
    }

    #[must_use]
    pub fn with_meta(content: impl Into<String>, meta: ChunkMeta) -> Self {
        Self {
            content: content.into(),
            meta: Some(meta),
        }
    }
}

/// Per-call inputs that are not part of the pending text itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleContext {
    /// Time since pending text last settled (or since it started accumulating).
    pub elapsed: Duration,
    /// End of stream: nothing more will arrive.
    pub flush: bool,
}

impl SettleContext {
    #[must_use]
    pub fn elapsed(elapsed: Duration) -> Self {
        Self {
            elapsed,
            flush: false,
        }
    }

    #[must_use]
    pub fn flush() -> Self {
        Self {
            elapsed: Duration::ZERO,
            flush: true,
        }
    }
}

/// Decides which prefix of `pending` is final.
pub trait Settler: Send {
    fn settle(&mut self, pending: &str, ctx: SettleContext) -> Vec<Settled>;

    /// Copy of the state `settle` advances, used to undo a discarded yield.
    /// Stateless settlers return `None`.
    fn fork(&self) -> Option<Box<dyn Settler>> {
        None
    }
}

impl<S: Settler + ?Sized> Settler for Box<S> {
    fn settle(&mut self, pending: &str, ctx: SettleContext) -> Vec<Settled> {
        (**self).settle(pending, ctx)
    }

    fn fork(&self) -> Option<Box<dyn Settler>> {
        (**self).fork()
    }
}

/// Boxing helper so heterogeneous settlers can be handed to combinators.
pub trait SettlerExt: Settler + Sized + 'static {
    fn boxed(self) -> Box<dyn Settler> {
        Box::new(self)
    }
}

impl<S: Settler + Sized + 'static> SettlerExt for S {}

/// Total bytes covered by a settler's yield.
#[must_use]
pub fn total_len(settled: &[Settled]) -> usize {
    settled.iter().map(|chunk| chunk.content.len()).sum()
}
