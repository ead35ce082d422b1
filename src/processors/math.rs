use std::fmt;
use std::sync::Arc;

use html_escape::encode_text;
use serde_json::json;

use crate::error::RenderError;
use crate::frame::{set_annotations, update_blocks, Annotation, Block, BlockKind, Frame};
use crate::processor::{ProcessContext, Processor};

pub const NAME: &str = "math";
const ANNOTATION: &str = "math";

/// Turns TeX into HTML.
pub trait MathRenderer: Send + Sync {
    fn render(&self, tex: &str, display: bool) -> Result<String, RenderError>;
}

/// Wraps escaped TeX in a classed element for a client-side renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMathRenderer;

impl MathRenderer for PlainMathRenderer {
    fn render(&self, tex: &str, display: bool) -> Result<String, RenderError> {
        Ok(if display {
            format!("<div class=\"math math-display\">{}</div>", encode_text(tex))
        } else {
            format!("<span class=\"math math-inline\">{}</span>", encode_text(tex))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MathSpan {
    display: bool,
    start: usize,
    end: usize,
    tex_start: usize,
    tex_end: usize,
}

/// Annotates `$inline$` and `$$display$$` math in text blocks.
///
/// Rendering is left to the annotation consumer; each annotation carries the TeX and
/// the renderer's HTML (or its error).
pub struct MathProcessor {
    renderer: Arc<dyn MathRenderer>,
}

impl MathProcessor {
    #[must_use]
    pub fn new(renderer: Arc<dyn MathRenderer>) -> Self {
        Self { renderer }
    }

    fn annotate(&self, block: &Arc<Block>) -> Arc<Block> {
        if block.kind != BlockKind::Text {
            return Arc::clone(block);
        }

        let annotations = scan(&block.raw)
            .into_iter()
            .map(|span| {
                let tex = &block.raw[span.tex_start..span.tex_end];
                let data = match self.renderer.render(tex, span.display) {
                    Ok(html) => json!({ "tex": tex, "html": html }),
                    Err(err) => json!({ "tex": tex, "error": err.message() }),
                };
                Annotation {
                    kind: ANNOTATION.to_string(),
                    subtype: Some(if span.display { "display" } else { "inline" }.to_string()),
                    raw_start: span.start,
                    raw_end: span.end,
                    data,
                }
            })
            .collect();

        set_annotations(block, ANNOTATION, annotations)
    }
}

impl Default for MathProcessor {
    fn default() -> Self {
        Self::new(Arc::new(PlainMathRenderer))
    }
}

impl fmt::Debug for MathProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MathProcessor").finish_non_exhaustive()
    }
}

impl Processor for MathProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn dependencies(&self) -> &[&'static str] {
        &["markdown"]
    }

    fn process(&self, frame: &Arc<Frame>, _ctx: &ProcessContext) -> Arc<Frame> {
        update_blocks(frame, |block| self.annotate(block))
    }
}

fn scan(raw: &str) -> Vec<MathSpan> {
    let bytes = raw.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => i = skip_code_span(bytes, i),
            b'$' if bytes.get(i + 1) == Some(&b'$') => match find_display_close(bytes, i + 2) {
                Some(close) => {
                    let tex = &raw[i + 2..close];
                    if !tex.trim().is_empty() {
                        spans.push(MathSpan {
                            display: true,
                            start: i,
                            end: close + 2,
                            tex_start: i + 2,
                            tex_end: close,
                        });
                    }
                    i = close + 2;
                }
                None => break,
            },
            b'$' => match find_inline_close(bytes, i) {
                Some(close) => {
                    spans.push(MathSpan {
                        display: false,
                        start: i,
                        end: close + 1,
                        tex_start: i + 1,
                        tex_end: close,
                    });
                    i = close + 1;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    spans
}

fn skip_code_span(bytes: &[u8], start: usize) -> usize {
    let run = bytes[start..].iter().take_while(|b| **b == b'`').count();
    let mut i = start + run;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let close = bytes[i..].iter().take_while(|b| **b == b'`').count();
            if close == run {
                return i + close;
            }
            i += close;
        } else {
            i += 1;
        }
    }
    start + run
}

fn find_display_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes[i + 1] == b'$' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Pandoc's rule: the opener is not followed by whitespace, the closer is not
/// preceded by whitespace and not followed by a digit.
fn find_inline_close(bytes: &[u8], open: usize) -> Option<usize> {
    let first = *bytes.get(open + 1)?;
    if first.is_ascii_whitespace() || first == b'$' {
        return None;
    }

    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if bytes.get(i + 1) == Some(&b'\n') => return None,
            b'$' => {
                let before = bytes[i - 1];
                let after = bytes.get(i + 1).copied();
                if !before.is_ascii_whitespace() && !after.is_some_and(|b| b.is_ascii_digit()) {
                    return Some(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::frame::{create_block, push_block, IdGen};

    fn tex_of(raw: &str) -> Vec<(bool, &str)> {
        scan(raw)
            .into_iter()
            .map(|span| (span.display, &raw[span.tex_start..span.tex_end]))
            .collect()
    }

    #[test]
    fn finds_inline_and_display_math() {
        assert_eq!(
            tex_of("Euler: $e^{i\\pi}+1=0$ and $$\\int_0^1 x\\,dx$$."),
            vec![(false, "e^{i\\pi}+1=0"), (true, "\\int_0^1 x\\,dx")]
        );
    }

    #[test]
    fn currency_is_not_math() {
        assert!(tex_of("costs $5 and $10").is_empty());
        assert!(tex_of("between $ and $ signs").is_empty());
    }

    #[test]
    fn whitespace_only_captures_are_ignored() {
        assert!(tex_of("$ $").is_empty());
        assert!(tex_of("$$  $$").is_empty());
        assert!(tex_of("$$$$").is_empty());
    }

    #[test]
    fn escaped_dollar_never_opens() {
        assert!(tex_of(r"price \$x$ here").is_empty());
        assert_eq!(tex_of(r"$a\$b$"), vec![(false, r"a\$b")]);
    }

    #[test]
    fn code_spans_are_skipped() {
        assert!(tex_of("run `echo $HOME$` now").is_empty());
        assert_eq!(tex_of("``a`b`` then $x$"), vec![(false, "x")]);
    }

    #[test]
    fn unterminated_display_stops_scan() {
        assert!(tex_of("$$ x + y").is_empty());
    }

    #[test]
    fn annotations_are_replaced_not_accumulated() {
        let mut ids = IdGen::default();
        let mut block = create_block(ids.block(), BlockKind::Text, None);
        block.raw = "$a$ and $b$".to_string();
        let frame = push_block(&Frame::empty(ids.frame()), block, true);
        let processor = MathProcessor::default();
        let ctx = ProcessContext::default();

        let once = processor.process(&frame, &ctx);
        let annotations = once.blocks[0].annotations_of("math");
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].subtype.as_deref(), Some("inline"));
        assert_eq!((annotations[1].raw_start, annotations[1].raw_end), (8, 11));
        assert_eq!(
            annotations[0].data["html"],
            "<span class=\"math math-inline\">a</span>"
        );

        assert!(Arc::ptr_eq(&once, &processor.process(&once, &ctx)));
    }

    #[test]
    fn code_blocks_are_not_annotated() {
        let mut ids = IdGen::default();
        let mut block = create_block(ids.block(), BlockKind::Code, Some("tex".to_string()));
        block.raw = "```tex\n$x$\n```\n".to_string();
        let frame = push_block(&Frame::empty(ids.frame()), block, true);
        let out = MathProcessor::default().process(&frame, &ProcessContext::default());
        assert!(Arc::ptr_eq(&frame, &out));
    }
}
