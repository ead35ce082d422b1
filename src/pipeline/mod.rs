//! Lazy push/pull pipeline runner.
//!
//! `push` only buffers. `pull` moves buffered text through the optional settle gate
//! and the block parser, then through every resolved processor in dependency order.
//! The current frame is replaced only when some step changed it, so callers can
//! compare successive pulls with [`Arc::ptr_eq`].

mod parser;
mod segment;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::EnvConfig;
use crate::error::{PipelineError, RenderError};
use crate::frame::{with_frame_id, with_trace, Frame, IdGen, TraceEntry};
use crate::preset::Preset;
use crate::processor::{preload_all, ProcessContext, SharedProcessor};
use crate::processors::{builtin_registry, DEFAULT_THEME};
use crate::resolve::{resolve, ProcessorRegistry};
use crate::settle::{SettleBuffer, Settler};

pub use parser::BlockParser;
pub use segment::{PartId, SegmentEvent, SegmentKind, SegmentedPipeline};

/// Builds a fresh settler for each pipeline instance.
pub type SettlerFactory = Arc<dyn Fn() -> Box<dyn Settler> + Send + Sync>;

#[derive(Clone)]
pub enum ProcessorSelection {
    Preset(Preset),
    /// Processor names looked up in the registry.
    Names(Vec<String>),
    Processors(Vec<SharedProcessor>),
}

/// In-code pipeline configuration.
#[derive(Clone)]
pub struct PipelineConfig {
    pub selection: ProcessorSelection,
    pub highlight_theme: String,
    pub trace: bool,
    pub settler: Option<SettlerFactory>,
    pub registry: Option<ProcessorRegistry>,
}

impl PipelineConfig {
    #[must_use]
    pub fn preset(preset: Preset) -> Self {
        Self {
            selection: ProcessorSelection::Preset(preset),
            highlight_theme: DEFAULT_THEME.to_string(),
            trace: false,
            settler: None,
            registry: None,
        }
    }

    #[must_use]
    pub fn processors(processors: Vec<SharedProcessor>) -> Self {
        Self {
            selection: ProcessorSelection::Processors(processors),
            ..Self::preset(Preset::Full)
        }
    }

    #[must_use]
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selection: ProcessorSelection::Names(names.into_iter().map(Into::into).collect()),
            ..Self::preset(Preset::Full)
        }
    }

    pub fn from_env(config: &EnvConfig) -> Result<Self, PipelineError> {
        let preset = match config.preset.as_deref() {
            Some(name) => name.parse()?,
            None => Preset::Full,
        };
        let mut pipeline = Self::preset(preset).with_trace(config.trace);
        if let Some(theme) = &config.highlight_theme {
            pipeline = pipeline.with_highlight_theme(theme.clone());
        }
        Ok(pipeline)
    }

    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn with_highlight_theme(mut self, theme: impl Into<String>) -> Self {
        self.highlight_theme = theme.into();
        self
    }

    #[must_use]
    pub fn with_settler<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Settler> + Send + Sync + 'static,
    {
        self.settler = Some(Arc::new(factory));
        self
    }

    /// Replaces the built-in registry used for name lookup and dependency insertion.
    #[must_use]
    pub fn with_registry(mut self, registry: ProcessorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Resolves processors. Resolution errors surface here, never during a run.
    pub fn build(&self) -> Result<PipelineBlueprint, PipelineError> {
        let registry = self
            .registry
            .clone()
            .unwrap_or_else(|| builtin_registry(&self.highlight_theme));

        let requested = match &self.selection {
            ProcessorSelection::Preset(preset) => lookup(&registry, preset.processor_names())?,
            ProcessorSelection::Names(names) => lookup(&registry, names)?,
            ProcessorSelection::Processors(processors) => processors.clone(),
        };

        let resolution = resolve(requested, &registry)?;
        info!(
            processors = ?resolution.names(),
            auto_added = ?resolution.auto_added,
            "pipeline resolved"
        );

        let context = ProcessContext::from_processors(&resolution.processors);
        Ok(PipelineBlueprint {
            processors: resolution.processors.into(),
            context: Arc::new(context),
            settler: self.settler.clone(),
            trace: self.trace,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::preset(Preset::Full)
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selection = match &self.selection {
            ProcessorSelection::Preset(preset) => format!("preset {preset}"),
            ProcessorSelection::Names(names) => format!("names {names:?}"),
            ProcessorSelection::Processors(processors) => format!(
                "processors {:?}",
                processors.iter().map(|p| p.name()).collect::<Vec<_>>()
            ),
        };
        f.debug_struct("PipelineConfig")
            .field("selection", &selection)
            .field("highlight_theme", &self.highlight_theme)
            .field("trace", &self.trace)
            .field("settler", &self.settler.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}

fn lookup<S: AsRef<str>>(
    registry: &ProcessorRegistry,
    names: &[S],
) -> Result<Vec<SharedProcessor>, PipelineError> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            registry
                .get(name)
                .cloned()
                .ok_or_else(|| PipelineError::UnknownProcessor {
                    name: name.to_string(),
                })
        })
        .collect()
}

/// A resolved processor chain that stamps out independent pipelines.
#[derive(Clone)]
pub struct PipelineBlueprint {
    processors: Arc<[SharedProcessor]>,
    context: Arc<ProcessContext>,
    settler: Option<SettlerFactory>,
    trace: bool,
}

impl PipelineBlueprint {
    #[must_use]
    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    #[must_use]
    pub fn processors(&self) -> &[SharedProcessor] {
        &self.processors
    }

    /// Preloads every processor concurrently; failures are logged and returned.
    pub async fn preload(&self) -> Vec<RenderError> {
        let failures = preload_all(&self.processors).await;
        for failure in &failures {
            warn!(error = %failure, "processor preload failed");
        }
        failures
    }

    #[must_use]
    pub fn instantiate(&self) -> Pipeline {
        let mut ids = IdGen::default();
        let frame = Frame::empty(ids.frame());
        Pipeline {
            processors: Arc::clone(&self.processors),
            context: Arc::clone(&self.context),
            gate: self.settler.as_ref().map(|factory| SettleBuffer::new(factory())),
            parser: BlockParser::new(),
            ids,
            input: String::new(),
            frame,
            trace: self.trace,
            done: false,
        }
    }
}

impl fmt::Debug for PipelineBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBlueprint")
            .field("processors", &self.processor_names())
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

pub struct Pipeline {
    processors: Arc<[SharedProcessor]>,
    context: Arc<ProcessContext>,
    gate: Option<SettleBuffer>,
    parser: BlockParser,
    ids: IdGen,
    input: String,
    frame: Arc<Frame>,
    trace: bool,
    done: bool,
}

impl Pipeline {
    /// Convenience for one-off pipelines.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(config.build()?.instantiate())
    }

    /// Buffers `chunk`. No parsing or rendering happens until the next pull.
    pub fn push(&mut self, chunk: &str) -> Result<(), PipelineError> {
        if self.done {
            return Err(PipelineError::PushAfterDone);
        }
        self.input.push_str(chunk);
        Ok(())
    }

    pub fn pull(&mut self) -> Arc<Frame> {
        self.run(false)
    }

    /// Ends the stream: releases held text, completes every block, runs full passes
    /// and refuses further pushes.
    pub fn flush(&mut self) -> Arc<Frame> {
        if self.done {
            return Arc::clone(&self.frame);
        }
        let frame = self.run(true);
        self.done = true;
        frame
    }

    pub fn reset(&mut self) {
        self.parser.reset();
        if let Some(gate) = &mut self.gate {
            gate.clear();
        }
        self.input.clear();
        self.frame = Frame::empty(self.ids.frame());
        self.done = false;
    }

    #[must_use]
    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Text pushed but not yet placed in a block.
    #[must_use]
    pub fn pending_text(&self) -> String {
        let mut pending = String::new();
        if let Some(gate) = &self.gate {
            pending.push_str(gate.pending());
        }
        pending.push_str(self.parser.held());
        pending.push_str(&self.input);
        pending
    }

    fn run(&mut self, end: bool) -> Arc<Frame> {
        let input = std::mem::take(&mut self.input);
        let released = match &mut self.gate {
            Some(gate) => {
                gate.push(&input);
                gate.drain(end)
                    .into_iter()
                    .map(|chunk| chunk.content)
                    .collect::<String>()
            }
            None => input,
        };

        let mut frame = self.parser.feed(&self.frame, &released, &mut self.ids);
        if end {
            frame = self.parser.finish(&frame, &mut self.ids);
        }

        let mut steps = Vec::new();
        for processor in self.processors.iter() {
            if !end && !processor.is_ready() {
                trace!(processor = processor.name(), "processor not ready; skipped");
                continue;
            }
            let next = processor.process(&frame, &self.context);
            if Arc::ptr_eq(&next, &frame) {
                continue;
            }
            if self.trace {
                steps.push(TraceEntry {
                    processor: processor.name().to_string(),
                    frame_id: frame.id,
                    changed_blocks: next.diff_from(&frame),
                });
            }
            frame = next;
        }

        if Arc::ptr_eq(&frame, &self.frame) {
            return Arc::clone(&self.frame);
        }

        let frame = with_frame_id(&frame, self.ids.frame());
        let frame = with_trace(&frame, steps);
        debug!(frame = %frame.id, blocks = frame.blocks.len(), end, "frame updated");
        self.frame = Arc::clone(&frame);
        frame
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("frame", &self.frame.id)
            .field("pending", &self.pending_text())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
