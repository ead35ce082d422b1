//! Async glue between a patch source, the frame pipelines and chat state.
//!
//! [`PatchTransform`] is the synchronous core. [`spawn_transform`] runs it on a tokio
//! task, and [`Session`] adds a reducer task that publishes [`chat_state::ChatState`]
//! snapshots.

mod error;
mod session;
mod transform;

pub use error::TransformError;
pub use session::Session;
pub use transform::{spawn_transform, PatchTransform};
