//! Built-in processors.

mod highlight;
mod markdown;
mod math;
mod mermaid;

use std::sync::Arc;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::resolve::ProcessorRegistry;

pub use highlight::{HighlightProcessor, DEFAULT_THEME};
pub use self::markdown::MarkdownProcessor;
pub use math::{MathRenderer, MathProcessor, PlainMathRenderer};
pub use mermaid::{DiagramRenderer, MermaidProcessor, PreDiagramRenderer};

/// Registry holding every built-in processor, with `theme` for the highlighter.
#[must_use]
pub fn builtin_registry(theme: &str) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry
        .register(Arc::new(MarkdownProcessor))
        .register(Arc::new(HighlightProcessor::new(theme)))
        .register(Arc::new(MermaidProcessor::default()))
        .register(Arc::new(MathProcessor::default()));
    registry
}

/// Plain `<pre><code>` markup used until a dedicated renderer takes over.
pub(crate) fn plain_code_html(language: Option<&str>, code: &str) -> String {
    match language {
        Some(language) => format!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            encode_double_quoted_attribute(language),
            encode_text(code)
        ),
        None => format!("<pre><code>{}</code></pre>", encode_text(code)),
    }
}
