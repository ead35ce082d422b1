use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::{
    Annotation, Block, BlockId, BlockKind, BlockStatus, Frame, FrameId, RenderPass, TraceEntry,
};

#[must_use]
pub fn create_block(id: BlockId, kind: BlockKind, language: Option<String>) -> Block {
    Block {
        id,
        kind,
        raw: String::new(),
        rendered: String::new(),
        status: BlockStatus::Streaming,
        render_pass: RenderPass::None,
        language,
        annotations: Vec::new(),
        meta: BTreeMap::new(),
    }
}

/// Appends raw text and drops the render pass back to `None`. Complete blocks and
/// empty text are left untouched.
#[must_use]
pub fn append_to_block(block: &Arc<Block>, text: &str) -> Arc<Block> {
    if text.is_empty() || block.is_complete() {
        return Arc::clone(block);
    }

    let mut next = Block::clone(block);
    next.raw.push_str(text);
    next.render_pass = RenderPass::None;
    Arc::new(next)
}

#[must_use]
pub fn complete_block(block: &Arc<Block>) -> Arc<Block> {
    if block.is_complete() {
        return Arc::clone(block);
    }

    let mut next = Block::clone(block);
    next.status = BlockStatus::Complete;
    Arc::new(next)
}

/// Stores rendered output for `pass`. A pass below the block's current one is ignored.
#[must_use]
pub fn set_block_rendered(block: &Arc<Block>, html: &str, pass: RenderPass) -> Arc<Block> {
    if pass < block.render_pass || (pass == block.render_pass && block.rendered == html) {
        return Arc::clone(block);
    }

    let mut next = Block::clone(block);
    next.rendered = html.to_string();
    next.render_pass = pass;
    Arc::new(next)
}

/// Records a render failure under `<processor>_error` and marks the block `Full` so
/// it is not retried. Existing rendered output is kept.
#[must_use]
pub fn set_block_error(block: &Arc<Block>, processor: &str, message: &str) -> Arc<Block> {
    let key = format!("{processor}_error");
    let value = Value::String(message.to_string());
    if block.render_pass == RenderPass::Full && block.meta.get(&key) == Some(&value) {
        return Arc::clone(block);
    }

    let mut next = Block::clone(block);
    next.meta.insert(key, value);
    next.render_pass = RenderPass::Full;
    Arc::new(next)
}

/// Replaces every annotation of type `kind` with `annotations`, keeping other types.
#[must_use]
pub fn set_annotations(block: &Arc<Block>, kind: &str, annotations: Vec<Annotation>) -> Arc<Block> {
    let current: Vec<&Annotation> = block.annotations_of(kind);
    if current.len() == annotations.len()
        && current.iter().zip(&annotations).all(|(a, b)| *a == b)
    {
        return Arc::clone(block);
    }

    let mut next = Block::clone(block);
    next.annotations.retain(|annotation| annotation.kind != kind);
    next.annotations.extend(annotations);
    Arc::new(next)
}

/// Applies `update` to the block with `id`. Returns the same frame when no block has
/// that id or the update returned its input.
#[must_use]
pub fn update_block_by_id(
    frame: &Arc<Frame>,
    id: BlockId,
    update: impl FnOnce(&Arc<Block>) -> Arc<Block>,
) -> Arc<Frame> {
    let Some(index) = frame.blocks.iter().position(|block| block.id == id) else {
        return Arc::clone(frame);
    };
    replace_at(frame, index, update)
}

#[must_use]
pub fn update_active_block(
    frame: &Arc<Frame>,
    update: impl FnOnce(&Arc<Block>) -> Arc<Block>,
) -> Arc<Frame> {
    match frame.active_block_index {
        Some(index) if index < frame.blocks.len() => replace_at(frame, index, update),
        _ => Arc::clone(frame),
    }
}

/// Maps every block. Unchanged blocks keep their `Arc`; the frame itself is only
/// rebuilt when at least one block changed.
#[must_use]
pub fn update_blocks(
    frame: &Arc<Frame>,
    mut update: impl FnMut(&Arc<Block>) -> Arc<Block>,
) -> Arc<Frame> {
    let mut changed = false;
    let blocks: Vec<Arc<Block>> = frame
        .blocks
        .iter()
        .map(|block| {
            let next = update(block);
            changed |= !Arc::ptr_eq(block, &next);
            next
        })
        .collect();

    if !changed {
        return Arc::clone(frame);
    }

    let mut next = Frame::clone(frame);
    next.blocks = blocks;
    Arc::new(next)
}

#[must_use]
pub fn push_block(frame: &Arc<Frame>, block: Block, active: bool) -> Arc<Frame> {
    let mut next = Frame::clone(frame);
    next.blocks.push(Arc::new(block));
    if active {
        next.active_block_index = Some(next.blocks.len() - 1);
    }
    Arc::new(next)
}

#[must_use]
pub fn with_active_block(frame: &Arc<Frame>, index: Option<usize>) -> Arc<Frame> {
    if frame.active_block_index == index {
        return Arc::clone(frame);
    }

    let mut next = Frame::clone(frame);
    next.active_block_index = index;
    Arc::new(next)
}

#[must_use]
pub fn with_frame_id(frame: &Arc<Frame>, id: FrameId) -> Arc<Frame> {
    if frame.id == id {
        return Arc::clone(frame);
    }

    let mut next = Frame::clone(frame);
    next.id = id;
    Arc::new(next)
}

/// Replaces the frame's trace.
#[must_use]
pub fn with_trace(frame: &Arc<Frame>, trace: Vec<TraceEntry>) -> Arc<Frame> {
    if frame.trace == trace {
        return Arc::clone(frame);
    }

    let mut next = Frame::clone(frame);
    next.trace = trace;
    Arc::new(next)
}

fn replace_at(
    frame: &Arc<Frame>,
    index: usize,
    update: impl FnOnce(&Arc<Block>) -> Arc<Block>,
) -> Arc<Frame> {
    let current = &frame.blocks[index];
    let updated = update(current);
    if Arc::ptr_eq(current, &updated) {
        return Arc::clone(frame);
    }

    let mut next = Frame::clone(frame);
    next.blocks[index] = updated;
    Arc::new(next)
}
