use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use once_cell::sync::OnceCell;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::frame::{set_block_error, set_block_rendered, update_blocks, Block, Frame, RenderPass};
use crate::processor::{ProcessContext, Processor};

pub const NAME: &str = "highlight";
pub const DEFAULT_THEME: &str = "InspiredGitHub";

static SYNTAXES: OnceCell<SyntaxSet> = OnceCell::new();
static THEMES: OnceCell<ThemeSet> = OnceCell::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn themes() -> &'static ThemeSet {
    THEMES.get_or_init(ThemeSet::load_defaults)
}

fn syntax_for<'a>(syntaxes: &'a SyntaxSet, language: Option<&str>) -> &'a SyntaxReference {
    language
        .map(str::trim)
        .filter(|language| !language.is_empty())
        .and_then(|language| {
            syntaxes
                .find_syntax_by_token(language)
                .or_else(|| syntaxes.find_syntax_by_extension(language))
                .or_else(|| syntaxes.find_syntax_by_name(language))
        })
        .unwrap_or_else(|| syntaxes.find_syntax_plain_text())
}

/// Syntax highlighting for complete code blocks not claimed by another processor.
///
/// Syntax and theme sets are process-wide and loaded once; [`Processor::preload`]
/// loads them on a blocking thread so the first highlighted block does not stall a
/// pull.
#[derive(Debug, Clone)]
pub struct HighlightProcessor {
    theme: String,
}

impl HighlightProcessor {
    #[must_use]
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
        }
    }

    #[must_use]
    pub fn theme(&self) -> &str {
        &self.theme
    }

    fn highlight(&self, block: &Block) -> Result<String, RenderError> {
        let theme = themes()
            .themes
            .get(&self.theme)
            .ok_or_else(|| RenderError::render(NAME, format!("unknown theme '{}'", self.theme)))?;
        let syntaxes = syntax_set();
        let syntax = syntax_for(syntaxes, block.language.as_deref());
        highlighted_html_for_string(block.code_body(), syntaxes, syntax, theme)
            .map_err(|err| RenderError::render(NAME, err.to_string()))
    }

    fn render_block(&self, block: &Arc<Block>, ctx: &ProcessContext) -> Arc<Block> {
        if !block.is_complete()
            || block.render_pass == RenderPass::Full
            || !ctx.owns_code_block(NAME, block)
        {
            return Arc::clone(block);
        }

        match self.highlight(block) {
            Ok(html) => set_block_rendered(block, &html, RenderPass::Full),
            Err(err) => {
                warn!(block = %block.id, error = %err, "highlight failed");
                set_block_error(block, NAME, err.message())
            }
        }
    }
}

impl Default for HighlightProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_THEME)
    }
}

impl Processor for HighlightProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn dependencies(&self) -> &[&'static str] {
        &["markdown"]
    }

    fn renders_code(&self) -> bool {
        true
    }

    fn preload(&self) -> BoxFuture<'static, Result<(), RenderError>> {
        async {
            tokio::task::spawn_blocking(|| {
                syntax_set();
                themes();
            })
            .await
            .map_err(|err| RenderError::preload(NAME, err.to_string()))?;
            debug!("highlight syntaxes loaded");
            Ok(())
        }
        .boxed()
    }

    fn is_ready(&self) -> bool {
        SYNTAXES.get().is_some() && THEMES.get().is_some()
    }

    fn process(&self, frame: &Arc<Frame>, ctx: &ProcessContext) -> Arc<Frame> {
        update_blocks(frame, |block| self.render_block(block, ctx))
    }
}
