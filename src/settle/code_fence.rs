use super::{ChunkMeta, SettleContext, Settled, Settler};

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenFence {
    marker: u8,
    len: usize,
    language: Option<String>,
}

/// Line-oriented settler that tracks fenced code blocks.
///
/// Every complete line is yielded with [`ChunkMeta`] describing whether it opens,
/// closes or sits inside a fence. Openers are three or more backticks or tildes
/// (indented by at most three spaces) with an optional language tag; a fence closes
/// on a line of the same marker that is at least as long as the opener.
#[derive(Debug, Clone, Default)]
pub struct CodeFence {
    open: Option<OpenFence>,
}

#[must_use]
pub fn code_fence() -> CodeFence {
    CodeFence::default()
}

impl CodeFence {
    #[must_use]
    pub fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.open
            .as_ref()
            .and_then(|open| open.language.as_deref())
    }

    pub fn reset(&mut self) {
        self.open = None;
    }

    /// Classifies one line (with or without its terminator) and advances fence state.
    pub fn classify(&mut self, line: &str) -> ChunkMeta {
        let text = line.trim_end_matches(['\n', '\r']);

        match self.open.take() {
            None => match parse_opening(text) {
                Some(open) => {
                    let meta = ChunkMeta {
                        in_code_fence: true,
                        language: open.language.clone(),
                        fence_start: true,
                        fence_end: false,
                    };
                    self.open = Some(open);
                    meta
                }
                None => ChunkMeta::default(),
            },
            Some(open) => {
                let closing = is_closing(text, &open);
                let meta = ChunkMeta {
                    in_code_fence: true,
                    language: open.language.clone(),
                    fence_start: false,
                    fence_end: closing,
                };
                if !closing {
                    self.open = Some(open);
                }
                meta
            }
        }
    }

    /// Returns true when an unterminated line could still turn out to be a fence
    /// marker (an opener outside a fence, a closer inside one) once it completes.
    #[must_use]
    pub fn could_become_fence(&self, partial: &str) -> bool {
        let text = partial.trim_end_matches('\r');
        let Some(rest) = strip_indent(text) else {
            return false;
        };
        let bytes = rest.as_bytes();

        match &self.open {
            None => {
                let Some(&marker) = bytes.first() else {
                    return true;
                };
                if marker != b'`' && marker != b'~' {
                    return false;
                }
                let run = marker_run(bytes, marker);
                run == bytes.len() || run >= 3
            }
            Some(open) => {
                let run = marker_run(bytes, open.marker);
                run == bytes.len() || (run >= open.len && rest[run..].trim().is_empty())
            }
        }
    }
}

impl Settler for CodeFence {
    fn settle(&mut self, pending: &str, ctx: SettleContext) -> Vec<Settled> {
        let mut out = Vec::new();
        let mut start = 0;

        while let Some(offset) = pending[start..].find('\n') {
            let end = start + offset + 1;
            let line = &pending[start..end];
            let meta = self.classify(line);
            out.push(Settled::with_meta(line, meta));
            start = end;
        }

        if ctx.flush {
            if start < pending.len() {
                let rest = &pending[start..];
                let meta = self.classify(rest);
                out.push(Settled::with_meta(rest, meta));
            }
            self.open = None;
        }

        out
    }

    fn fork(&self) -> Option<Box<dyn Settler>> {
        Some(Box::new(self.clone()))
    }
}

fn strip_indent(text: &str) -> Option<&str> {
    let indent = text.bytes().take_while(|byte| *byte == b' ').count();
    if indent > 3 {
        None
    } else {
        Some(&text[indent..])
    }
}

fn marker_run(bytes: &[u8], marker: u8) -> usize {
    bytes.iter().take_while(|byte| **byte == marker).count()
}

fn parse_opening(text: &str) -> Option<OpenFence> {
    let rest = strip_indent(text)?;
    let bytes = rest.as_bytes();
    let marker = *bytes.first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }

    let len = marker_run(bytes, marker);
    if len < 3 {
        return None;
    }

    let info = rest[len..].trim();
    if marker == b'`' && info.contains('`') {
        return None;
    }

    Some(OpenFence {
        marker,
        len,
        language: info.split_whitespace().next().map(ToString::to_string),
    })
}

fn is_closing(text: &str, open: &OpenFence) -> bool {
    let Some(rest) = strip_indent(text) else {
        return false;
    };
    let run = marker_run(rest.as_bytes(), open.marker);
    run >= open.len && rest[run..].trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(settler: &mut CodeFence, text: &str, flush: bool) -> Vec<(String, ChunkMeta)> {
        let ctx = if flush {
            SettleContext::flush()
        } else {
            SettleContext::default()
        };
        settler
            .settle(text, ctx)
            .into_iter()
            .map(|chunk| (chunk.content, chunk.meta.unwrap_or_default()))
            .collect()
    }

    #[test]
    fn recognizes_open_body_and_close() {
        let mut fence = code_fence();
        let chunks = settle(&mut fence, "intro\n```rust\nfn main() {}\n```\nafter", false);

        assert_eq!(chunks.len(), 4);
        assert!(!chunks[0].1.in_code_fence);
        assert!(chunks[1].1.fence_start);
        assert_eq!(chunks[1].1.language.as_deref(), Some("rust"));
        assert!(chunks[2].1.in_code_fence);
        assert!(!chunks[2].1.fence_start && !chunks[2].1.fence_end);
        assert!(chunks[3].1.fence_end);
        assert!(!fence.in_fence());
    }

    #[test]
    fn close_must_match_marker_and_be_at_least_as_long() {
        let mut fence = code_fence();
        let chunks = settle(&mut fence, "~~~~\n~~~\n```\n~~~~~\n", false);

        assert!(chunks[0].1.fence_start);
        assert!(!chunks[1].1.fence_end, "shorter closer stays in fence");
        assert!(!chunks[2].1.fence_end, "different marker stays in fence");
        assert!(chunks[3].1.fence_end, "longer closer closes");
    }

    #[test]
    fn backtick_info_string_cannot_contain_backticks() {
        let mut fence = code_fence();
        let chunks = settle(&mut fence, "``` a`b\n", false);
        assert!(!chunks[0].1.in_code_fence);
    }

    #[test]
    fn deep_indent_is_not_a_fence() {
        let mut fence = code_fence();
        let chunks = settle(&mut fence, "    ```\n", false);
        assert!(!chunks[0].1.fence_start);
    }

    #[test]
    fn partial_line_waits_until_flush() {
        let mut fence = code_fence();
        let chunks = settle(&mut fence, "```py\nprint(1)", false);
        assert_eq!(chunks.len(), 1);

        let chunks = settle(&mut fence, "print(1)", true);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, "print(1)");
        assert!(chunks[0].1.in_code_fence);
        assert_eq!(chunks[0].1.language.as_deref(), Some("py"));
        assert!(!chunks[0].1.fence_end);
    }

    #[test]
    fn flushed_remainder_matching_close_ends_fence() {
        let mut fence = code_fence();
        settle(&mut fence, "```\nbody\n", false);
        let chunks = settle(&mut fence, "```", true);
        assert!(chunks[0].1.fence_end);
    }

    #[test]
    fn could_become_fence_outside_fence() {
        let fence = code_fence();
        assert!(fence.could_become_fence(""));
        assert!(fence.could_become_fence("  `"));
        assert!(fence.could_become_fence("``"));
        assert!(fence.could_become_fence("```ru"));
        assert!(!fence.could_become_fence("``x"));
        assert!(!fence.could_become_fence("hello"));
        assert!(!fence.could_become_fence("    ```"));
    }

    #[test]
    fn could_become_fence_inside_fence() {
        let mut fence = code_fence();
        fence.classify("````\n");
        assert!(fence.could_become_fence("``"));
        assert!(fence.could_become_fence("````  "));
        assert!(!fence.could_become_fence("~~~"));
        assert!(!fence.could_become_fence("let x"));
    }
}
