use std::sync::Arc;

use super::{BlockId, Frame};

/// Concatenates rendered output in block order.
#[must_use]
pub fn render_to_rendered(frame: &Frame) -> String {
    frame
        .blocks
        .iter()
        .map(|block| block.rendered.as_str())
        .collect()
}

/// Concatenates raw source in block order.
#[must_use]
pub fn render_to_raw(frame: &Frame) -> String {
    frame.blocks.iter().map(|block| block.raw.as_str()).collect()
}

impl Frame {
    /// Ids of blocks that are new or were replaced since `previous`.
    #[must_use]
    pub fn diff_from(&self, previous: &Frame) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|block| {
                previous
                    .block(block.id)
                    .map_or(true, |before| !Arc::ptr_eq(before, block))
            })
            .map(|block| block.id)
            .collect()
    }
}
