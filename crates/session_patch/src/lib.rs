//! Closed set of session patches.
//!
//! Patches are the only input to chat state. They serialize as JSON objects tagged by
//! `"type"` in snake_case. Respond handles are process-local tokens: they are skipped
//! on serialization and decode as `None`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque handle to a pending respond callback held in a side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponderId(Uuid);

impl ResponderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResponderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResponderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "responder-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Which side takes over a tool call during a handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffDirection {
    ServerToClient,
    ClientToServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStepKind {
    Prompt,
    Log,
    Progress,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStepStatus {
    Pending,
    Complete,
}

/// One step of a server-side tool execution trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: String,
    pub kind: ExecutionStepKind,
    pub content: Value,
    pub status: ExecutionStepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailStatus {
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Patch {
    SessionInfo(SessionInfo),
    UserMessage {
        id: String,
        content: String,
    },

    StreamingStart,
    StreamingText {
        text: String,
    },
    StreamingThinking {
        text: String,
    },
    StreamingEnd,

    ToolCallStart {
        call_id: String,
        tool_name: String,
        #[serde(default)]
        arguments: Value,
    },
    ToolCallResult {
        call_id: String,
        result: Value,
    },
    ToolCallError {
        call_id: String,
        error: String,
    },

    AssistantMessage {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rendered: Option<String>,
    },
    AbortComplete {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rendered: Option<String>,
    },
    Error {
        message: String,
    },
    Reset,

    /// A block became final; `html` is its full render.
    BufferSettled {
        content: String,
        html: String,
    },
    /// Raw text not yet settled.
    BufferPending {
        content: String,
    },
    /// Everything displayable right now: settled HTML plus quick renders.
    BufferRenderable {
        html: String,
    },

    ClientToolAwaitingApproval {
        call_id: String,
        tool_name: String,
        #[serde(default)]
        arguments: Value,
        #[serde(skip)]
        respond: Option<ResponderId>,
    },
    ClientToolExecuting {
        call_id: String,
    },
    ClientToolComplete {
        call_id: String,
        result: Value,
    },
    ClientToolError {
        call_id: String,
        error: String,
    },
    ClientToolDenied {
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ClientToolProgress {
        call_id: String,
        message: String,
    },
    ClientToolPermissionRequest {
        call_id: String,
        prompt: String,
        #[serde(skip)]
        respond: Option<ResponderId>,
    },
    /// Records the answer to a permission prompt and clears it.
    ClientToolPermissionResponse {
        call_id: String,
        granted: bool,
    },

    PendingHandoff {
        call_id: String,
        direction: HandoffDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    HandoffComplete {
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },

    ToolEmissionStart {
        call_id: String,
        tool_name: String,
    },
    ToolEmission {
        call_id: String,
        emission_id: String,
        kind: String,
        payload: Value,
        #[serde(skip)]
        respond: Option<ResponderId>,
    },
    ToolEmissionResponse {
        call_id: String,
        emission_id: String,
        response: Value,
    },
    ToolEmissionComplete {
        call_id: String,
    },

    ExecutionTrailStart {
        call_id: String,
        tool_name: String,
    },
    ExecutionTrailStep {
        call_id: String,
        step: ExecutionStep,
        #[serde(skip)]
        respond: Option<ResponderId>,
    },
    ExecutionTrailStepResponse {
        call_id: String,
        step_id: String,
        response: Value,
    },
    ExecutionTrailComplete {
        call_id: String,
        status: TrailStatus,
    },
}

/// Field-less mirror of [`Patch`] for logging and dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchKind {
    SessionInfo,
    UserMessage,
    StreamingStart,
    StreamingText,
    StreamingThinking,
    StreamingEnd,
    ToolCallStart,
    ToolCallResult,
    ToolCallError,
    AssistantMessage,
    AbortComplete,
    Error,
    Reset,
    BufferSettled,
    BufferPending,
    BufferRenderable,
    ClientToolAwaitingApproval,
    ClientToolExecuting,
    ClientToolComplete,
    ClientToolError,
    ClientToolDenied,
    ClientToolProgress,
    ClientToolPermissionRequest,
    ClientToolPermissionResponse,
    PendingHandoff,
    HandoffComplete,
    ToolEmissionStart,
    ToolEmission,
    ToolEmissionResponse,
    ToolEmissionComplete,
    ExecutionTrailStart,
    ExecutionTrailStep,
    ExecutionTrailStepResponse,
    ExecutionTrailComplete,
}

impl PatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionInfo => "session_info",
            Self::UserMessage => "user_message",
            Self::StreamingStart => "streaming_start",
            Self::StreamingText => "streaming_text",
            Self::StreamingThinking => "streaming_thinking",
            Self::StreamingEnd => "streaming_end",
            Self::ToolCallStart => "tool_call_start",
            Self::ToolCallResult => "tool_call_result",
            Self::ToolCallError => "tool_call_error",
            Self::AssistantMessage => "assistant_message",
            Self::AbortComplete => "abort_complete",
            Self::Error => "error",
            Self::Reset => "reset",
            Self::BufferSettled => "buffer_settled",
            Self::BufferPending => "buffer_pending",
            Self::BufferRenderable => "buffer_renderable",
            Self::ClientToolAwaitingApproval => "client_tool_awaiting_approval",
            Self::ClientToolExecuting => "client_tool_executing",
            Self::ClientToolComplete => "client_tool_complete",
            Self::ClientToolError => "client_tool_error",
            Self::ClientToolDenied => "client_tool_denied",
            Self::ClientToolProgress => "client_tool_progress",
            Self::ClientToolPermissionRequest => "client_tool_permission_request",
            Self::ClientToolPermissionResponse => "client_tool_permission_response",
            Self::PendingHandoff => "pending_handoff",
            Self::HandoffComplete => "handoff_complete",
            Self::ToolEmissionStart => "tool_emission_start",
            Self::ToolEmission => "tool_emission",
            Self::ToolEmissionResponse => "tool_emission_response",
            Self::ToolEmissionComplete => "tool_emission_complete",
            Self::ExecutionTrailStart => "execution_trail_start",
            Self::ExecutionTrailStep => "execution_trail_step",
            Self::ExecutionTrailStepResponse => "execution_trail_step_response",
            Self::ExecutionTrailComplete => "execution_trail_complete",
        }
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Patch {
    #[must_use]
    pub fn kind(&self) -> PatchKind {
        match self {
            Self::SessionInfo(_) => PatchKind::SessionInfo,
            Self::UserMessage { .. } => PatchKind::UserMessage,
            Self::StreamingStart => PatchKind::StreamingStart,
            Self::StreamingText { .. } => PatchKind::StreamingText,
            Self::StreamingThinking { .. } => PatchKind::StreamingThinking,
            Self::StreamingEnd => PatchKind::StreamingEnd,
            Self::ToolCallStart { .. } => PatchKind::ToolCallStart,
            Self::ToolCallResult { .. } => PatchKind::ToolCallResult,
            Self::ToolCallError { .. } => PatchKind::ToolCallError,
            Self::AssistantMessage { .. } => PatchKind::AssistantMessage,
            Self::AbortComplete { .. } => PatchKind::AbortComplete,
            Self::Error { .. } => PatchKind::Error,
            Self::Reset => PatchKind::Reset,
            Self::BufferSettled { .. } => PatchKind::BufferSettled,
            Self::BufferPending { .. } => PatchKind::BufferPending,
            Self::BufferRenderable { .. } => PatchKind::BufferRenderable,
            Self::ClientToolAwaitingApproval { .. } => PatchKind::ClientToolAwaitingApproval,
            Self::ClientToolExecuting { .. } => PatchKind::ClientToolExecuting,
            Self::ClientToolComplete { .. } => PatchKind::ClientToolComplete,
            Self::ClientToolError { .. } => PatchKind::ClientToolError,
            Self::ClientToolDenied { .. } => PatchKind::ClientToolDenied,
            Self::ClientToolProgress { .. } => PatchKind::ClientToolProgress,
            Self::ClientToolPermissionRequest { .. } => PatchKind::ClientToolPermissionRequest,
            Self::ClientToolPermissionResponse { .. } => PatchKind::ClientToolPermissionResponse,
            Self::PendingHandoff { .. } => PatchKind::PendingHandoff,
            Self::HandoffComplete { .. } => PatchKind::HandoffComplete,
            Self::ToolEmissionStart { .. } => PatchKind::ToolEmissionStart,
            Self::ToolEmission { .. } => PatchKind::ToolEmission,
            Self::ToolEmissionResponse { .. } => PatchKind::ToolEmissionResponse,
            Self::ToolEmissionComplete { .. } => PatchKind::ToolEmissionComplete,
            Self::ExecutionTrailStart { .. } => PatchKind::ExecutionTrailStart,
            Self::ExecutionTrailStep { .. } => PatchKind::ExecutionTrailStep,
            Self::ExecutionTrailStepResponse { .. } => PatchKind::ExecutionTrailStepResponse,
            Self::ExecutionTrailComplete { .. } => PatchKind::ExecutionTrailComplete,
        }
    }

    /// The respond handle this patch carries, if any.
    #[must_use]
    pub fn responder(&self) -> Option<ResponderId> {
        match self {
            Self::ClientToolAwaitingApproval { respond, .. }
            | Self::ClientToolPermissionRequest { respond, .. }
            | Self::ToolEmission { respond, .. }
            | Self::ExecutionTrailStep { respond, .. } => *respond,
            _ => None,
        }
    }

    /// Ends or interrupts the streamed content of the current response.
    #[must_use]
    pub fn ends_content(&self) -> bool {
        matches!(
            self,
            Self::StreamingEnd
                | Self::AbortComplete { .. }
                | Self::AssistantMessage { .. }
                | Self::Error { .. }
                | Self::ToolCallStart { .. }
                | Self::Reset
        )
    }

    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
