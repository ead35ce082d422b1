use std::sync::Arc;

use crate::frame::{
    append_to_block, complete_block, create_block, push_block, update_active_block,
    update_blocks, with_active_block, BlockKind, Frame, IdGen,
};
use crate::settle::{code_fence, CodeFence};

/// Incremental, fence-aware splitter from raw text into frame blocks.
///
/// Complete lines are classified with [`CodeFence`]. A partial line is appended to the
/// active block right away unless it is blank or could still turn into a fence marker;
/// those wait for their newline. A blank line marks a paragraph break and the text
/// block completes as soon as non-blank content follows it. Blank lines that follow a
/// closed code block are carried into whichever block opens next.
#[derive(Debug, Default)]
pub struct BlockParser {
    fence: CodeFence,
    line: String,
    committed: usize,
    paragraph_break: bool,
    orphan_blank: String,
}

impl BlockParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fence: code_fence(),
            ..Self::default()
        }
    }

    /// Text accepted but not yet placed in any block.
    #[must_use]
    pub fn held(&self) -> &str {
        &self.line[self.committed..]
    }

    pub fn feed(&mut self, frame: &Arc<Frame>, text: &str, ids: &mut IdGen) -> Arc<Frame> {
        let mut frame = Arc::clone(frame);
        let mut rest = text;

        while !rest.is_empty() {
            match rest.find('\n') {
                Some(offset) => {
                    self.line.push_str(&rest[..=offset]);
                    rest = &rest[offset + 1..];
                    frame = self.complete_line(&frame, ids);
                }
                None => {
                    self.line.push_str(rest);
                    rest = "";
                    frame = self.commit_partial(&frame, ids);
                }
            }
        }

        frame
    }

    /// Releases any held line and completes every block.
    pub fn finish(&mut self, frame: &Arc<Frame>, ids: &mut IdGen) -> Arc<Frame> {
        let mut frame = Arc::clone(frame);
        if !self.line.is_empty() {
            frame = self.complete_line(&frame, ids);
        }

        if !self.orphan_blank.is_empty() {
            let raw = std::mem::take(&mut self.orphan_blank);
            frame = open_block(&frame, ids, BlockKind::Text, None, raw);
        }

        self.reset();
        let frame = update_blocks(&frame, complete_block);
        with_active_block(&frame, None)
    }

    pub fn reset(&mut self) {
        self.fence.reset();
        self.line.clear();
        self.committed = 0;
        self.paragraph_break = false;
        self.orphan_blank.clear();
    }

    fn complete_line(&mut self, frame: &Arc<Frame>, ids: &mut IdGen) -> Arc<Frame> {
        let line = std::mem::take(&mut self.line);
        let committed = std::mem::replace(&mut self.committed, 0);

        let meta = self.fence.classify(&line);
        if committed > 0 {
            let frame = append_active(frame, &line[committed..]);
            return if meta.fence_end {
                close_active(&frame)
            } else {
                frame
            };
        }

        if meta.fence_start {
            self.paragraph_break = false;
            let frame = close_active(frame);
            let mut raw = std::mem::take(&mut self.orphan_blank);
            raw.push_str(&line);
            return open_block(&frame, ids, BlockKind::Code, meta.language, raw);
        }

        if meta.in_code_fence {
            let frame = append_active(frame, &line);
            return if meta.fence_end {
                close_active(&frame)
            } else {
                frame
            };
        }

        if line.trim().is_empty() {
            return self.blank_line(frame, &line);
        }
        self.text(frame, ids, &line)
    }

    fn commit_partial(&mut self, frame: &Arc<Frame>, ids: &mut IdGen) -> Arc<Frame> {
        if self.committed > 0 {
            let frame = append_active(frame, &self.line[self.committed..]);
            self.committed = self.line.len();
            return frame;
        }

        if self.line.trim().is_empty() || self.fence.could_become_fence(&self.line) {
            return Arc::clone(frame);
        }

        let partial = self.line.clone();
        self.committed = partial.len();
        if self.fence.in_fence() {
            append_active(frame, &partial)
        } else {
            self.text(frame, ids, &partial)
        }
    }

    fn blank_line(&mut self, frame: &Arc<Frame>, line: &str) -> Arc<Frame> {
        let active_text = frame
            .active_block()
            .is_some_and(|block| block.kind == BlockKind::Text && !block.is_complete());
        if active_text {
            self.paragraph_break = true;
            append_active(frame, line)
        } else {
            self.orphan_blank.push_str(line);
            Arc::clone(frame)
        }
    }

    fn text(&mut self, frame: &Arc<Frame>, ids: &mut IdGen, text: &str) -> Arc<Frame> {
        let active_text = frame
            .active_block()
            .is_some_and(|block| block.kind == BlockKind::Text && !block.is_complete());

        if active_text && !self.paragraph_break {
            return append_active(frame, text);
        }

        self.paragraph_break = false;
        let frame = close_active(frame);
        let mut raw = std::mem::take(&mut self.orphan_blank);
        raw.push_str(text);
        open_block(&frame, ids, BlockKind::Text, None, raw)
    }
}

fn append_active(frame: &Arc<Frame>, text: &str) -> Arc<Frame> {
    update_active_block(frame, |block| append_to_block(block, text))
}

fn close_active(frame: &Arc<Frame>) -> Arc<Frame> {
    let frame = update_active_block(frame, complete_block);
    with_active_block(&frame, None)
}

fn open_block(
    frame: &Arc<Frame>,
    ids: &mut IdGen,
    kind: BlockKind,
    language: Option<String>,
    raw: String,
) -> Arc<Frame> {
    let mut block = create_block(ids.block(), kind, language);
    block.raw = raw;
    push_block(frame, block, true)
}
