//! Progressive rendering of streamed model output.
//!
//! Text arrives token by token. A [`settle`] policy decides which prefix is final, the
//! [`pipeline`] splits it into [`frame`] blocks and runs dependency-ordered
//! [`processor`]s over them (markdown, highlighting, diagrams, math). Every step is a
//! pure function over immutable, `Arc`-shared frames, so "nothing changed" is a pointer
//! comparison.
//!
//! ```
//! use frameflow::{render_to_rendered, Pipeline, PipelineConfig, Preset};
//!
//! let mut pipeline = Pipeline::new(&PipelineConfig::preset(Preset::Markdown))?;
//! pipeline.push("# Title\n\nBody")?;
//! let frame = pipeline.flush();
//! let html = render_to_rendered(&frame);
//! assert!(html.starts_with("<h1>Title</h1>"));
//! assert!(html.ends_with("<p>Body</p>"));
//! # Ok::<(), frameflow::PipelineError>(())
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod preset;
pub mod processor;
pub mod processors;
pub mod resolve;
pub mod settle;

pub use crate::config::EnvConfig;
pub use crate::error::{PipelineError, RenderError, ResolveError};
pub use crate::frame::{
    render_to_raw, render_to_rendered, Annotation, Block, BlockId, BlockKind, BlockStatus,
    Frame, FrameId, RenderPass, TraceEntry,
};
pub use crate::pipeline::{
    PartId, Pipeline, PipelineBlueprint, PipelineConfig, SegmentEvent, SegmentKind,
    SegmentedPipeline,
};
pub use crate::preset::Preset;
pub use crate::processor::{ProcessContext, Processor, SharedProcessor};
pub use crate::resolve::{resolve, ProcessorRegistry, Resolution};
