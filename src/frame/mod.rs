//! Immutable frame/block model.
//!
//! A [`Frame`] is one snapshot of every content block in a stream. Frames and blocks
//! are shared through [`Arc`]; every update function returns a new `Arc` when it
//! changes something and a clone of the input `Arc` when it does not, so callers can
//! detect "nothing happened" with [`Arc::ptr_eq`].

mod render;
mod update;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

pub use render::{render_to_raw, render_to_rendered};
pub use update::{
    append_to_block, complete_block, create_block, push_block, set_annotations, set_block_error,
    set_block_rendered, update_active_block, update_block_by_id, update_blocks, with_active_block,
    with_frame_id, with_trace,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BlockId(u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FrameId(u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

/// Instance-scoped monotonic id source for frames and blocks.
#[derive(Debug, Default)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    pub fn block(&mut self) -> BlockId {
        self.next += 1;
        BlockId(self.next)
    }

    pub fn frame(&mut self) -> FrameId {
        self.next += 1;
        FrameId(self.next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Streaming,
    Complete,
}

/// Quality tier of a block's rendered output. Ordered: `None < Quick < Full`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPass {
    #[default]
    None,
    Quick,
    Full,
}

/// Non-visual metadata over a byte range of a block's raw content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub raw_start: usize,
    pub raw_end: usize,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub raw: String,
    pub rendered: String,
    pub status: BlockStatus,
    pub render_pass: RenderPass,
    pub language: Option<String>,
    pub annotations: Vec<Annotation>,
    pub meta: BTreeMap<String, Value>,
}

impl Block {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == BlockStatus::Complete
    }

    /// The render pass a processor owning this block should produce next, if any.
    ///
    /// Streaming blocks only ever get the quick pass; complete blocks get the full
    /// pass exactly once.
    #[must_use]
    pub fn next_pass(&self) -> Option<RenderPass> {
        match self.status {
            BlockStatus::Streaming if self.render_pass == RenderPass::None => {
                Some(RenderPass::Quick)
            }
            BlockStatus::Streaming => None,
            BlockStatus::Complete if self.render_pass < RenderPass::Full => Some(RenderPass::Full),
            BlockStatus::Complete => None,
        }
    }

    /// Code between the fence lines. Text blocks return their raw content.
    #[must_use]
    pub fn code_body(&self) -> &str {
        if self.kind != BlockKind::Code {
            return &self.raw;
        }

        let mut raw = self.raw.as_str();
        while let Some(newline) = raw.find('\n') {
            if !raw[..newline].trim().is_empty() {
                break;
            }
            raw = &raw[newline + 1..];
        }

        let body = match raw.find('\n') {
            Some(newline) if is_fence_line(&raw[..newline]) => &raw[newline + 1..],
            None if is_fence_line(raw) => "",
            _ => raw,
        };

        let trimmed = body.strip_suffix('\n').unwrap_or(body);
        let last_start = trimmed.rfind('\n').map_or(0, |index| index + 1);
        if self.is_complete() && is_fence_line(&trimmed[last_start..]) {
            &body[..last_start]
        } else {
            body
        }
    }

    #[must_use]
    pub fn annotations_of(&self, kind: &str) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|annotation| annotation.kind == kind)
            .collect()
    }
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(marker) = trimmed.chars().next() else {
        return false;
    };
    (marker == '`' || marker == '~') && trimmed.chars().take_while(|ch| *ch == marker).count() >= 3
}

/// One processor step recorded on a frame when tracing is enabled.
///
/// `frame_id` is the frame the processor was handed; `changed_blocks` lists the
/// blocks it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub processor: String,
    pub frame_id: FrameId,
    pub changed_blocks: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub id: FrameId,
    pub blocks: Vec<Arc<Block>>,
    pub active_block_index: Option<usize>,
    pub trace: Vec<TraceEntry>,
}

impl Frame {
    #[must_use]
    pub fn empty(id: FrameId) -> Arc<Self> {
        Arc::new(Self {
            id,
            blocks: Vec::new(),
            active_block_index: None,
            trace: Vec::new(),
        })
    }

    #[must_use]
    pub fn active_block(&self) -> Option<&Arc<Block>> {
        self.active_block_index
            .and_then(|index| self.blocks.get(index))
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Arc<Block>> {
        self.blocks.iter().find(|block| block.id == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
