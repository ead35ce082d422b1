use std::collections::HashSet;
use std::sync::Arc;

use frameflow::{
    BlockId, Frame, PartId, PipelineBlueprint, RenderPass, SegmentEvent, SegmentKind,
    SegmentedPipeline,
};
use session_patch::Patch;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TransformError;

/// Routes streamed text through segment pipelines and interleaves `buffer_*` patches
/// with the forwarded input.
///
/// Only text parts feed the buffer. Reasoning parts still get their own pipeline so a
/// switch between the two always ends the previous part.
#[derive(Debug)]
pub struct PatchTransform {
    segments: SegmentedPipeline,
    settled: HashSet<(PartId, BlockId)>,
    settled_html: String,
    pending: String,
    renderable: String,
    reasoning: Option<Arc<Frame>>,
}

impl PatchTransform {
    #[must_use]
    pub fn new(blueprint: PipelineBlueprint) -> Self {
        Self {
            segments: SegmentedPipeline::new(blueprint),
            settled: HashSet::new(),
            settled_html: String::new(),
            pending: String::new(),
            renderable: String::new(),
            reasoning: None,
        }
    }

    #[must_use]
    pub fn blueprint(&self) -> &PipelineBlueprint {
        self.segments.blueprint()
    }

    /// Latest frame of the current or last reasoning part.
    #[must_use]
    pub fn reasoning_frame(&self) -> Option<&Arc<Frame>> {
        self.reasoning.as_ref()
    }

    /// Maps one input patch to the patches to publish, in order.
    pub fn apply(&mut self, patch: Patch) -> Result<Vec<Patch>, TransformError> {
        let mut out = Vec::new();
        match patch {
            Patch::StreamingStart => {
                self.clear();
                out.push(Patch::StreamingStart);
            }
            Patch::StreamingText { text } => {
                let forward = Patch::StreamingText { text: text.clone() };
                self.stream(SegmentKind::Text, &text, forward, &mut out)?;
            }
            Patch::StreamingThinking { text } => {
                let forward = Patch::StreamingThinking { text: text.clone() };
                self.stream(SegmentKind::Reasoning, &text, forward, &mut out)?;
            }
            patch if patch.ends_content() => {
                self.end_part(&mut out);
                let reset = matches!(patch, Patch::Reset);
                out.push(patch);
                if reset {
                    self.clear();
                }
            }
            patch => out.push(patch),
        }
        Ok(out)
    }

    /// Flushes whatever part is still open. Used when the input ends without a
    /// closing patch.
    pub fn finish(&mut self) -> Vec<Patch> {
        let mut out = Vec::new();
        self.end_part(&mut out);
        out
    }

    fn stream(
        &mut self,
        kind: SegmentKind,
        text: &str,
        forward: Patch,
        out: &mut Vec<Patch>,
    ) -> Result<(), TransformError> {
        if self.segments.current_kind().is_some_and(|current| current != kind) {
            self.end_part(out);
        }
        out.push(forward);

        if let Some(ended) = self.segments.push(kind, text)? {
            self.observe(&ended, true, out);
        }
        if let Some(event) = self.segments.pull() {
            self.observe(&event, false, out);
        }
        Ok(())
    }

    fn end_part(&mut self, out: &mut Vec<Patch>) {
        if let Some(event) = self.segments.end_part() {
            self.observe(&event, true, out);
        }
    }

    fn observe(&mut self, event: &SegmentEvent, last: bool, out: &mut Vec<Patch>) {
        match event.kind() {
            SegmentKind::Reasoning => self.reasoning = Some(Arc::clone(event.frame())),
            SegmentKind::Text => self.emit_buffer(event.part(), event.frame(), last, out),
        }
    }

    /// Settles complete blocks in order. Before the part ends, a complete block waits
    /// until its full pass is in so settled html never changes afterwards.
    fn emit_buffer(&mut self, part: PartId, frame: &Frame, last: bool, out: &mut Vec<Patch>) {
        let mut pending = String::new();
        let mut streaming_html = String::new();
        let mut open = false;

        for block in &frame.blocks {
            if self.settled.contains(&(part, block.id)) {
                continue;
            }
            let ready = block.is_complete() && (last || block.render_pass == RenderPass::Full);
            if !open && ready {
                self.settled.insert((part, block.id));
                self.settled_html.push_str(&block.rendered);
                out.push(Patch::BufferSettled {
                    content: block.raw.clone(),
                    html: block.rendered.clone(),
                });
                continue;
            }
            open = true;
            pending.push_str(&block.raw);
            streaming_html.push_str(&block.rendered);
        }

        if !last {
            pending.push_str(&self.segments.pending_text());
        }
        if pending != self.pending {
            self.pending.clone_from(&pending);
            out.push(Patch::BufferPending { content: pending });
        }

        let renderable = format!("{}{}", self.settled_html, streaming_html);
        if renderable != self.renderable {
            self.renderable.clone_from(&renderable);
            out.push(Patch::BufferRenderable { html: renderable });
        }
    }

    fn clear(&mut self) {
        self.segments.reset();
        self.settled.clear();
        self.settled_html.clear();
        self.pending.clear();
        self.renderable.clear();
        self.reasoning = None;
    }
}

/// Runs a [`PatchTransform`] on its own task.
///
/// The output channel exists before the task starts, so nothing it sends can be lost.
/// Processor preloads all start before the first input patch is handled.
pub fn spawn_transform(
    blueprint: PipelineBlueprint,
    mut input: mpsc::UnboundedReceiver<Patch>,
) -> (
    mpsc::UnboundedReceiver<Patch>,
    JoinHandle<Result<(), TransformError>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        for error in blueprint.preload().await {
            warn!(%error, "processor preload failed; it will run on flush");
        }
        let mut transform = PatchTransform::new(blueprint);

        while let Some(patch) = input.recv().await {
            let kind = patch.kind();
            for out in transform.apply(patch)? {
                if tx.send(out).is_err() {
                    debug!(%kind, "transform output dropped; stopping");
                    return Ok(());
                }
            }
        }

        for out in transform.finish() {
            if tx.send(out).is_err() {
                break;
            }
        }
        Ok(())
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use frameflow::{PipelineConfig, Preset};
    use pretty_assertions::assert_eq;
    use session_patch::PatchKind;

    use super::*;

    fn transform() -> PatchTransform {
        PatchTransform::new(PipelineConfig::preset(Preset::Markdown).build().unwrap())
    }

    fn run(transform: &mut PatchTransform, patches: Vec<Patch>) -> Vec<Patch> {
        patches
            .into_iter()
            .flat_map(|patch| transform.apply(patch).unwrap())
            .collect()
    }

    fn text(text: &str) -> Patch {
        Patch::StreamingText {
            text: text.to_string(),
        }
    }

    #[test]
    fn trailing_content_settles_before_streaming_end() {
        let mut transform = transform();
        let out = run(
            &mut transform,
            vec![
                Patch::StreamingStart,
                text("Hello.\n\n"),
                text("> trailing"),
                Patch::StreamingEnd,
            ],
        );

        let settled: Vec<(usize, &str)> = out
            .iter()
            .enumerate()
            .filter_map(|(index, patch)| match patch {
                Patch::BufferSettled { content, .. } => Some((index, content.as_str())),
                _ => None,
            })
            .collect();
        let end = out
            .iter()
            .position(|patch| patch.kind() == PatchKind::StreamingEnd)
            .unwrap();

        assert_eq!(
            settled.iter().map(|(_, c)| *c).collect::<Vec<_>>(),
            vec!["Hello.\n\n", "> trailing"]
        );
        assert!(settled.iter().all(|(index, _)| *index < end));
        assert_eq!(end, out.len() - 1);
    }

    #[test]
    fn settled_html_is_the_full_render() {
        let mut transform = transform();
        let out = run(&mut transform, vec![Patch::StreamingStart, text("*a*\n\nb")]);
        let html: Vec<&str> = out
            .iter()
            .filter_map(|patch| match patch {
                Patch::BufferSettled { html, .. } => Some(html.trim_end()),
                _ => None,
            })
            .collect();
        assert_eq!(html, vec!["<p><em>a</em></p>"]);
    }

    #[test]
    fn pending_and_renderable_follow_the_open_block() {
        let mut transform = transform();
        let out = run(&mut transform, vec![Patch::StreamingStart, text("Hel")]);
        assert!(out.contains(&Patch::BufferPending {
            content: "Hel".to_string()
        }));
        assert!(out
            .iter()
            .any(|patch| matches!(patch, Patch::BufferRenderable { html } if html.contains("Hel"))));

        let out = transform.apply(text("")).unwrap();
        assert_eq!(out, vec![text("")]);
    }

    #[test]
    fn switching_to_thinking_flushes_text_first() {
        let mut transform = transform();
        let out = run(
            &mut transform,
            vec![
                Patch::StreamingStart,
                text("draft"),
                Patch::StreamingThinking {
                    text: "hmm".to_string(),
                },
            ],
        );
        let settled = out
            .iter()
            .position(|patch| matches!(patch, Patch::BufferSettled { .. }))
            .unwrap();
        let thinking = out
            .iter()
            .position(|patch| patch.kind() == PatchKind::StreamingThinking)
            .unwrap();
        assert!(settled < thinking);
        assert!(transform.reasoning_frame().is_some());
    }

    #[test]
    fn tool_call_ends_the_text_part() {
        let mut transform = transform();
        let out = run(
            &mut transform,
            vec![
                Patch::StreamingStart,
                text("draft"),
                Patch::ToolCallStart {
                    call_id: "call-1".to_string(),
                    tool_name: "search".to_string(),
                    arguments: serde_json::json!({}),
                },
                text("after"),
                Patch::StreamingEnd,
            ],
        );

        let settled: Vec<(usize, &str)> = out
            .iter()
            .enumerate()
            .filter_map(|(index, patch)| match patch {
                Patch::BufferSettled { content, .. } => Some((index, content.as_str())),
                _ => None,
            })
            .collect();
        let tool_call = out
            .iter()
            .position(|patch| patch.kind() == PatchKind::ToolCallStart)
            .unwrap();

        assert_eq!(
            settled.iter().map(|(_, content)| *content).collect::<Vec<_>>(),
            vec!["draft", "after"]
        );
        assert!(settled[0].0 < tool_call);
        assert!(settled[1].0 > tool_call);

        let draft = transform.settled_html.find("draft").unwrap();
        let after = transform.settled_html.find("after").unwrap();
        assert!(draft < after);
        assert!(out.iter().any(|patch| matches!(
            patch,
            Patch::BufferRenderable { html } if html == &transform.settled_html
        )));
    }

    #[test]
    fn unrelated_patches_pass_through() {
        let mut transform = transform();
        let patch = Patch::ClientToolProgress {
            call_id: "c".to_string(),
            message: "working".to_string(),
        };
        assert_eq!(transform.apply(patch.clone()).unwrap(), vec![patch]);
    }
}
