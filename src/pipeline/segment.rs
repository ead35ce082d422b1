use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{Pipeline, PipelineBlueprint};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Kind of streamed content a part carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Text,
    Reasoning,
}

/// Sequential id of one contiguous run of same-kind content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PartId(u64);

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// The current part's frame changed.
    Frame {
        part: PartId,
        kind: SegmentKind,
        frame: Arc<Frame>,
    },
    /// The part was flushed; `frame` is final.
    PartEnded {
        part: PartId,
        kind: SegmentKind,
        frame: Arc<Frame>,
    },
}

impl SegmentEvent {
    #[must_use]
    pub fn part(&self) -> PartId {
        match self {
            Self::Frame { part, .. } | Self::PartEnded { part, .. } => *part,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SegmentKind {
        match self {
            Self::Frame { kind, .. } | Self::PartEnded { kind, .. } => *kind,
        }
    }

    #[must_use]
    pub fn frame(&self) -> &Arc<Frame> {
        match self {
            Self::Frame { frame, .. } | Self::PartEnded { frame, .. } => frame,
        }
    }
}

struct ActivePart {
    id: PartId,
    kind: SegmentKind,
    pipeline: Pipeline,
    last_emitted: Arc<Frame>,
}

/// One pipeline per contiguous part of text or reasoning.
///
/// Pushing a different kind than the current part ends that part first; the next
/// pipeline is built lazily from the shared blueprint.
pub struct SegmentedPipeline {
    blueprint: PipelineBlueprint,
    current: Option<ActivePart>,
    next_part: u64,
}

impl SegmentedPipeline {
    #[must_use]
    pub fn new(blueprint: PipelineBlueprint) -> Self {
        Self {
            blueprint,
            current: None,
            next_part: 0,
        }
    }

    #[must_use]
    pub fn blueprint(&self) -> &PipelineBlueprint {
        &self.blueprint
    }

    #[must_use]
    pub fn current_kind(&self) -> Option<SegmentKind> {
        self.current.as_ref().map(|part| part.kind)
    }

    #[must_use]
    pub fn current_part(&self) -> Option<PartId> {
        self.current.as_ref().map(|part| part.id)
    }

    /// Text of the current part not yet in any block.
    #[must_use]
    pub fn pending_text(&self) -> String {
        self.current
            .as_ref()
            .map(|part| part.pipeline.pending_text())
            .unwrap_or_default()
    }

    /// Buffers `chunk` in the part for `kind`. Returns the `PartEnded` event when a
    /// kind switch closed the previous part.
    pub fn push(
        &mut self,
        kind: SegmentKind,
        chunk: &str,
    ) -> Result<Option<SegmentEvent>, PipelineError> {
        let ended = match self.current_kind() {
            Some(current) if current != kind => {
                debug!(from = ?current, to = ?kind, "segment kind switched");
                self.end_part()
            }
            _ => None,
        };

        let next_part = &mut self.next_part;
        let blueprint = &self.blueprint;
        let part = self.current.get_or_insert_with(|| {
            *next_part += 1;
            let pipeline = blueprint.instantiate();
            let last_emitted = Arc::clone(pipeline.frame());
            ActivePart {
                id: PartId(*next_part),
                kind,
                pipeline,
                last_emitted,
            }
        });
        part.pipeline.push(chunk)?;
        Ok(ended)
    }

    /// Runs the current part's pipeline; yields a frame event only when it changed.
    pub fn pull(&mut self) -> Option<SegmentEvent> {
        let part = self.current.as_mut()?;
        let frame = part.pipeline.pull();
        if Arc::ptr_eq(&frame, &part.last_emitted) {
            return None;
        }
        part.last_emitted = Arc::clone(&frame);
        Some(SegmentEvent::Frame {
            part: part.id,
            kind: part.kind,
            frame,
        })
    }

    /// Flushes and drops the current part.
    pub fn end_part(&mut self) -> Option<SegmentEvent> {
        let mut part = self.current.take()?;
        let frame = part.pipeline.flush();
        debug!(part = %part.id, kind = ?part.kind, blocks = frame.blocks.len(), "part ended");
        Some(SegmentEvent::PartEnded {
            part: part.id,
            kind: part.kind,
            frame,
        })
    }

    /// Drops the current part without flushing it.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl fmt::Debug for SegmentedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedPipeline")
            .field("current_part", &self.current_part())
            .field("current_kind", &self.current_kind())
            .field("next_part", &self.next_part)
            .finish()
    }
}
