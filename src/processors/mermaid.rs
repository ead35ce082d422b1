use std::fmt;
use std::sync::Arc;

use html_escape::encode_text;
use tracing::warn;

use crate::error::RenderError;
use crate::frame::{set_block_error, set_block_rendered, update_blocks, Block, Frame, RenderPass};
use crate::processor::{ProcessContext, Processor};

pub const NAME: &str = "mermaid";

/// Turns diagram source into HTML.
pub trait DiagramRenderer: Send + Sync {
    fn render(&self, source: &str) -> Result<String, RenderError>;
}

/// Emits `<pre class="mermaid">` for a client-side mermaid runtime to pick up.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreDiagramRenderer;

impl DiagramRenderer for PreDiagramRenderer {
    fn render(&self, source: &str) -> Result<String, RenderError> {
        if source.trim().is_empty() {
            return Err(RenderError::render(NAME, "empty diagram"));
        }
        Ok(format!("<pre class=\"mermaid\">{}</pre>", encode_text(source)))
    }
}

/// Full render for complete `mermaid` code blocks.
pub struct MermaidProcessor {
    renderer: Arc<dyn DiagramRenderer>,
}

impl MermaidProcessor {
    #[must_use]
    pub fn new(renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self { renderer }
    }

    fn render_block(&self, block: &Arc<Block>, ctx: &ProcessContext) -> Arc<Block> {
        if !block.is_complete()
            || block.render_pass == RenderPass::Full
            || !ctx.owns_code_block(NAME, block)
        {
            return Arc::clone(block);
        }

        match self.renderer.render(block.code_body()) {
            Ok(html) => set_block_rendered(block, &html, RenderPass::Full),
            Err(err) => {
                warn!(block = %block.id, error = %err, "diagram render failed");
                set_block_error(block, NAME, err.message())
            }
        }
    }
}

impl Default for MermaidProcessor {
    fn default() -> Self {
        Self::new(Arc::new(PreDiagramRenderer))
    }
}

impl fmt::Debug for MermaidProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MermaidProcessor").finish_non_exhaustive()
    }
}

impl Processor for MermaidProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn dependencies(&self) -> &[&'static str] {
        &["markdown"]
    }

    fn claimed_languages(&self) -> &[&'static str] {
        &["mermaid"]
    }

    fn process(&self, frame: &Arc<Frame>, ctx: &ProcessContext) -> Arc<Frame> {
        update_blocks(frame, |block| self.render_block(block, ctx))
    }
}
