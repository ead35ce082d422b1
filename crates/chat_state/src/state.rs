use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;
use session_patch::{ExecutionStep, HandoffDirection, ResponderId, SessionInfo, TrailStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Waiting on the other side of a handoff.
    Pending,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallStep {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub status: ToolCallStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// One entry of an assistant response's step chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseStep {
    Text { content: String },
    Thinking { content: String },
    ToolCall(ToolCallStep),
}

impl ResponseStep {
    pub(crate) fn same_kind(&self, other: &ResponseStep) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    #[must_use]
    pub fn as_tool_call(&self) -> Option<&ToolCallStep> {
        match self {
            Self::ToolCall(step) => Some(step),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub rendered: Option<String>,
    pub steps: Vec<ResponseStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientToolStatus {
    AwaitingApproval,
    Executing,
    Complete,
    Error,
    Denied,
}

impl ClientToolStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Denied)
    }

    /// Allowed forward moves. Terminal states never move again.
    #[must_use]
    pub fn can_become(self, next: ClientToolStatus) -> bool {
        match (self, next) {
            (Self::AwaitingApproval, Self::Executing)
            | (Self::AwaitingApproval, Self::Denied)
            | (Self::AwaitingApproval, Self::Error)
            | (Self::Executing, Self::Complete)
            | (Self::Executing, Self::Error) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionPrompt {
    pub prompt: String,
    #[serde(skip)]
    pub respond: Option<ResponderId>,
}

/// A tool executed on the client, with its approval lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientTool {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub status: ClientToolStatus,
    pub message: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub permission: Option<PermissionPrompt>,
    #[serde(skip)]
    pub respond: Option<ResponderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionStatus {
    Pending,
    Complete,
}

/// A request a running tool sent out mid-execution (e.g. a confirmation).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emission {
    pub id: String,
    pub kind: String,
    pub payload: Value,
    pub status: EmissionStatus,
    pub response: Option<Value>,
    #[serde(skip)]
    pub respond: Option<ResponderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolEmissionState {
    pub call_id: String,
    pub tool_name: String,
    pub emissions: Vec<Emission>,
    pub complete: bool,
}

impl ToolEmissionState {
    #[must_use]
    pub fn emission(&self, id: &str) -> Option<&Emission> {
        self.emissions.iter().find(|emission| emission.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionTrailState {
    pub call_id: String,
    pub tool_name: String,
    pub steps: Vec<ExecutionStep>,
    pub status: TrailStatus,
}

impl ExecutionTrailState {
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|step| step.id == id)
    }
}

/// Step ids are only unique within their trail, so the pending index is keyed by both.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepKey {
    pub call_id: String,
    pub step_id: String,
}

impl StepKey {
    #[must_use]
    pub fn new(call_id: &str, step_id: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            step_id: step_id.to_string(),
        }
    }
}

/// Index entry for a trail prompt still waiting on an answer. The step itself lives
/// in its trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingStep {
    pub call_id: String,
    pub step_id: String,
    #[serde(skip)]
    pub respond: Option<ResponderId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingHandoff {
    pub call_id: String,
    pub direction: HandoffDirection,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BufferState {
    /// Settled raw text of the current response.
    pub settled: String,
    /// Raw text not yet settled.
    pub pending: String,
    /// Full renders of settled blocks, in order.
    pub settled_html: String,
    /// Everything displayable now.
    pub renderable: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatState {
    pub session: Option<SessionInfo>,
    pub messages: Vec<Message>,
    pub current_response: Vec<ResponseStep>,
    pub active_step: Option<ResponseStep>,
    pub pending_client_tools: BTreeMap<String, ClientTool>,
    pub tool_emissions: BTreeMap<String, ToolEmissionState>,
    pub execution_trails: BTreeMap<String, ExecutionTrailState>,
    #[serde(serialize_with = "entries_only")]
    pub pending_steps: BTreeMap<StepKey, PendingStep>,
    pub pending_handoffs: BTreeMap<String, PendingHandoff>,
    pub buffer: BufferState,
    pub is_streaming: bool,
    pub error: Option<String>,
}

impl ChatState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn pending_step(&self, call_id: &str, step_id: &str) -> Option<&PendingStep> {
        self.pending_steps.get(&StepKey::new(call_id, step_id))
    }

    /// Looks a tool call up in the in-flight response first, then in past messages.
    #[must_use]
    pub fn tool_call(&self, call_id: &str) -> Option<&ToolCallStep> {
        self.current_response
            .iter()
            .chain(self.messages.iter().rev().flat_map(|message| &message.steps))
            .filter_map(ResponseStep::as_tool_call)
            .find(|step| step.call_id == call_id)
    }
}

fn entries_only<S: Serializer>(
    steps: &BTreeMap<StepKey, PendingStep>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(steps.values())
}
