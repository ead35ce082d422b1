//! Processor contract.
//!
//! A processor is a named, referentially transparent transformation over a
//! [`Frame`]. It must return the input `Arc` untouched when it has nothing to do, so
//! running a processor twice over its own output is a no-op.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;

use crate::error::RenderError;
use crate::frame::{Block, BlockKind, Frame};

pub type SharedProcessor = Arc<dyn Processor>;

pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    /// Names of processors that must run before this one.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// Code languages this processor renders exclusively.
    fn claimed_languages(&self) -> &[&'static str] {
        &[]
    }

    /// Whether this processor renders code blocks no other processor has claimed.
    fn renders_code(&self) -> bool {
        false
    }

    /// Loads expensive resources ahead of the first frame. Must be awaited inside a
    /// tokio runtime.
    fn preload(&self) -> BoxFuture<'static, Result<(), RenderError>> {
        async { Ok(()) }.boxed()
    }

    /// Cheap synchronous check; a pipeline skips processors that are not ready until
    /// the stream is flushed.
    fn is_ready(&self) -> bool {
        true
    }

    fn process(&self, frame: &Arc<Frame>, ctx: &ProcessContext) -> Arc<Frame>;
}

/// Which processor owns which code blocks within one resolved pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessContext {
    claims: BTreeMap<String, String>,
    code_renderer: Option<String>,
}

impl ProcessContext {
    #[must_use]
    pub fn from_processors(processors: &[SharedProcessor]) -> Self {
        let mut ctx = Self::default();
        for processor in processors {
            for language in processor.claimed_languages() {
                ctx.claims
                    .entry(language.to_ascii_lowercase())
                    .or_insert_with(|| processor.name().to_string());
            }
            if ctx.code_renderer.is_none() && processor.renders_code() {
                ctx.code_renderer = Some(processor.name().to_string());
            }
        }
        ctx
    }

    /// The processor that gives a code block its full render, if any.
    #[must_use]
    pub fn code_owner(&self, language: Option<&str>) -> Option<&str> {
        language
            .and_then(|language| self.claims.get(&language.to_ascii_lowercase()))
            .or(self.code_renderer.as_ref())
            .map(String::as_str)
    }

    /// True when `block` is a code block owned by the processor called `name`.
    #[must_use]
    pub fn owns_code_block(&self, name: &str, block: &Block) -> bool {
        block.kind == BlockKind::Code && self.code_owner(block.language.as_deref()) == Some(name)
    }
}

/// Runs every processor's preload concurrently and returns the failures.
pub async fn preload_all(processors: &[SharedProcessor]) -> Vec<RenderError> {
    let results = join_all(processors.iter().map(|processor| processor.preload())).await;
    results.into_iter().filter_map(Result::err).collect()
}
