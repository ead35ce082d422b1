//! Chat session state driven by [`session_patch::Patch`]es.
//!
//! [`reduce`] is pure: the same patch sequence always yields the same state. Respond
//! callbacks for prompts, emissions and approvals are held in [`Responders`] and
//! referenced from state by id.

mod error;
mod reduce;
mod responders;
mod state;

pub use error::RespondError;
pub use reduce::{apply, reduce};
pub use responders::{
    answer_approval, answer_emission, answer_permission, answer_step, Responders,
};
pub use state::{
    BufferState, ChatState, ClientTool, ClientToolStatus, Emission, EmissionStatus,
    ExecutionTrailState, Message, PendingHandoff, PendingStep, PermissionPrompt, ResponseStep,
    Role, StepKey, ToolCallStatus, ToolCallStep, ToolEmissionState,
};
