use std::sync::Arc;

use ::markdown::{to_html, to_html_with_options, Options};
use tracing::debug;

use super::plain_code_html;
use crate::frame::{set_block_error, set_block_rendered, update_blocks, Block, BlockKind, Frame, RenderPass};
use crate::processor::{ProcessContext, Processor};

pub const NAME: &str = "markdown";

/// Markdown to HTML.
///
/// Streaming text gets a fast CommonMark render; complete text is rendered once more
/// with GFM extensions. Code blocks get plain escaped markup, and only the quick pass
/// when another processor owns their full render.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownProcessor;

impl MarkdownProcessor {
    fn render_block(block: &Arc<Block>, ctx: &ProcessContext) -> Arc<Block> {
        let Some(pass) = block.next_pass() else {
            return Arc::clone(block);
        };

        match block.kind {
            BlockKind::Text => match pass {
                RenderPass::Full => match to_html_with_options(&block.raw, &Options::gfm()) {
                    Ok(html) => set_block_rendered(block, &html, RenderPass::Full),
                    Err(message) => {
                        debug!(block = %block.id, error = %message, "markdown full render failed");
                        set_block_error(block, NAME, &message.to_string())
                    }
                },
                _ => set_block_rendered(block, &to_html(&block.raw), pass),
            },
            BlockKind::Code => {
                let owned_elsewhere = ctx.code_owner(block.language.as_deref()).is_some();
                if owned_elsewhere && block.render_pass >= RenderPass::Quick {
                    return Arc::clone(block);
                }
                let pass = if owned_elsewhere {
                    RenderPass::Quick
                } else {
                    pass
                };
                let html = plain_code_html(block.language.as_deref(), block.code_body());
                set_block_rendered(block, &html, pass)
            }
        }
    }
}

impl Processor for MarkdownProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn process(&self, frame: &Arc<Frame>, ctx: &ProcessContext) -> Arc<Frame> {
        update_blocks(frame, |block| Self::render_block(block, ctx))
    }
}
