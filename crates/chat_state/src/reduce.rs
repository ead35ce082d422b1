//! Pure `(state, patch) -> state` reducer.

use serde_json::Value;
use session_patch::{
    ExecutionStep, ExecutionStepKind, ExecutionStepStatus, HandoffDirection, Patch, ResponderId,
    TrailStatus,
};

use crate::state::{
    BufferState, ChatState, ClientTool, ClientToolStatus, Emission, EmissionStatus,
    ExecutionTrailState, Message, PendingHandoff, PendingStep, PermissionPrompt, ResponseStep,
    Role, StepKey, ToolCallStatus, ToolCallStep, ToolEmissionState,
};

const ABORTED: &str = "aborted";

/// Applies one patch. Patches naming unknown ids leave the state unchanged.
#[must_use]
pub fn reduce(mut state: ChatState, patch: Patch) -> ChatState {
    apply(&mut state, patch);
    state
}

/// In-place form of [`reduce`].
pub fn apply(state: &mut ChatState, patch: Patch) {
    match patch {
        Patch::SessionInfo(info) => state.session = Some(info),
        Patch::UserMessage { id, content } => state.messages.push(Message {
            id,
            role: Role::User,
            content,
            rendered: None,
            steps: Vec::new(),
        }),

        Patch::StreamingStart => handle_streaming_start(state),
        Patch::StreamingText { text } => extend_step(state, ResponseStep::Text { content: text }),
        Patch::StreamingThinking { text } => {
            extend_step(state, ResponseStep::Thinking { content: text })
        }
        Patch::StreamingEnd => {
            commit_active_step(state);
            state.is_streaming = false;
        }

        Patch::ToolCallStart {
            call_id,
            tool_name,
            arguments,
        } => handle_tool_call_start(state, call_id, tool_name, arguments),
        Patch::ToolCallResult { call_id, result } => {
            update_tool_call(state, &call_id, |step| {
                step.status = ToolCallStatus::Complete;
                step.result = Some(result);
            })
        }
        Patch::ToolCallError { call_id, error } => update_tool_call(state, &call_id, |step| {
            step.status = ToolCallStatus::Error;
            step.error = Some(error);
        }),

        Patch::AssistantMessage {
            id,
            content,
            rendered,
        } => finalize_response(state, id, Some(content), rendered),
        Patch::AbortComplete { id, rendered } => {
            for step in state.current_response.iter_mut() {
                if let ResponseStep::ToolCall(call) = step {
                    if matches!(call.status, ToolCallStatus::Running | ToolCallStatus::Pending) {
                        call.status = ToolCallStatus::Error;
                        call.error = Some(ABORTED.to_string());
                    }
                }
            }
            finalize_response(state, id, None, rendered);
            state.is_streaming = false;
        }
        Patch::Error { message } => {
            state.error = Some(message);
            state.is_streaming = false;
        }
        Patch::Reset => {
            let session = state.session.take();
            *state = ChatState {
                session,
                ..ChatState::default()
            };
        }

        Patch::BufferSettled { content, html } => {
            state.buffer.settled.push_str(&content);
            state.buffer.settled_html.push_str(&html);
        }
        Patch::BufferPending { content } => state.buffer.pending = content,
        Patch::BufferRenderable { html } => state.buffer.renderable = html,

        Patch::ClientToolAwaitingApproval {
            call_id,
            tool_name,
            arguments,
            respond,
        } => {
            state
                .pending_client_tools
                .entry(call_id.clone())
                .or_insert_with(|| ClientTool {
                    call_id,
                    tool_name,
                    arguments,
                    status: ClientToolStatus::AwaitingApproval,
                    message: None,
                    result: None,
                    error: None,
                    permission: None,
                    respond,
                });
        }
        Patch::ClientToolExecuting { call_id } => {
            if !state.pending_client_tools.contains_key(&call_id) {
                let (tool_name, arguments) = state
                    .tool_call(&call_id)
                    .map(|step| (step.tool_name.clone(), step.arguments.clone()))
                    .unwrap_or_default();
                state.pending_client_tools.insert(
                    call_id.clone(),
                    ClientTool {
                        call_id: call_id.clone(),
                        tool_name,
                        arguments,
                        status: ClientToolStatus::AwaitingApproval,
                        message: None,
                        result: None,
                        error: None,
                        permission: None,
                        respond: None,
                    },
                );
            }
            transition_client_tool(state, &call_id, ClientToolStatus::Executing, |_| {});
        }
        Patch::ClientToolComplete { call_id, result } => {
            transition_client_tool(state, &call_id, ClientToolStatus::Complete, |tool| {
                tool.result = Some(result);
            })
        }
        Patch::ClientToolError { call_id, error } => {
            transition_client_tool(state, &call_id, ClientToolStatus::Error, |tool| {
                tool.error = Some(error);
            })
        }
        Patch::ClientToolDenied { call_id, reason } => {
            transition_client_tool(state, &call_id, ClientToolStatus::Denied, |tool| {
                tool.message = reason;
            })
        }
        Patch::ClientToolProgress { call_id, message } => {
            if let Some(tool) = state.pending_client_tools.get_mut(&call_id) {
                if !tool.status.is_terminal() {
                    tool.message = Some(message);
                }
            }
        }
        Patch::ClientToolPermissionRequest {
            call_id,
            prompt,
            respond,
        } => {
            if let Some(tool) = state.pending_client_tools.get_mut(&call_id) {
                if !tool.status.is_terminal() {
                    tool.permission = Some(PermissionPrompt { prompt, respond });
                }
            }
        }
        Patch::ClientToolPermissionResponse { call_id, .. } => {
            if let Some(tool) = state.pending_client_tools.get_mut(&call_id) {
                tool.permission = None;
            }
        }

        Patch::PendingHandoff {
            call_id,
            direction,
            reason,
        } => handle_pending_handoff(state, call_id, direction, reason),
        Patch::HandoffComplete { call_id, result } => {
            if state.pending_handoffs.remove(&call_id).is_some() {
                update_tool_call(state, &call_id, |step| match result {
                    Some(result) => {
                        step.status = ToolCallStatus::Complete;
                        step.result = Some(result);
                    }
                    None => step.status = ToolCallStatus::Running,
                });
            }
        }

        Patch::ToolEmissionStart { call_id, tool_name } => {
            state
                .tool_emissions
                .entry(call_id.clone())
                .or_insert_with(|| ToolEmissionState {
                    call_id,
                    tool_name,
                    emissions: Vec::new(),
                    complete: false,
                });
        }
        Patch::ToolEmission {
            call_id,
            emission_id,
            kind,
            payload,
            respond,
        } => handle_tool_emission(state, call_id, emission_id, kind, payload, respond),
        Patch::ToolEmissionResponse {
            call_id,
            emission_id,
            response,
        } => {
            let emission = state
                .tool_emissions
                .get_mut(&call_id)
                .and_then(|entry| entry.emissions.iter_mut().find(|e| e.id == emission_id));
            if let Some(emission) = emission {
                emission.status = EmissionStatus::Complete;
                emission.response = Some(response);
                emission.respond = None;
            }
        }
        Patch::ToolEmissionComplete { call_id } => {
            if let Some(entry) = state.tool_emissions.get_mut(&call_id) {
                entry.complete = true;
            }
        }

        Patch::ExecutionTrailStart { call_id, tool_name } => {
            state
                .execution_trails
                .entry(call_id.clone())
                .or_insert_with(|| ExecutionTrailState {
                    call_id,
                    tool_name,
                    steps: Vec::new(),
                    status: TrailStatus::Running,
                });
        }
        Patch::ExecutionTrailStep {
            call_id,
            step,
            respond,
        } => handle_trail_step(state, call_id, step, respond),
        Patch::ExecutionTrailStepResponse {
            call_id,
            step_id,
            response,
        } => {
            let step = state
                .execution_trails
                .get_mut(&call_id)
                .and_then(|trail| trail.steps.iter_mut().find(|step| step.id == step_id));
            if let Some(step) = step {
                step.status = ExecutionStepStatus::Complete;
                step.response = Some(response);
                state.pending_steps.remove(&StepKey::new(&call_id, &step_id));
            }
        }
        Patch::ExecutionTrailComplete { call_id, status } => {
            if let Some(trail) = state.execution_trails.get_mut(&call_id) {
                trail.status = status;
            }
        }
    }
}

fn handle_streaming_start(state: &mut ChatState) {
    state.current_response.clear();
    state.active_step = None;
    state.error = None;
    state.buffer = BufferState::default();
    state.is_streaming = true;
}

/// Appends to the active step when `incoming` is the same kind; otherwise commits the
/// active step and starts a new one.
fn extend_step(state: &mut ChatState, incoming: ResponseStep) {
    let extends = state
        .active_step
        .as_ref()
        .is_some_and(|active| active.same_kind(&incoming));
    if !extends {
        commit_active_step(state);
        state.active_step = Some(incoming);
        return;
    }

    if let (
        Some(ResponseStep::Text { content } | ResponseStep::Thinking { content }),
        ResponseStep::Text { content: more } | ResponseStep::Thinking { content: more },
    ) = (state.active_step.as_mut(), incoming)
    {
        content.push_str(&more);
    }
}

fn commit_active_step(state: &mut ChatState) {
    if let Some(step) = state.active_step.take() {
        let empty = matches!(
            &step,
            ResponseStep::Text { content } | ResponseStep::Thinking { content } if content.is_empty()
        );
        if !empty {
            state.current_response.push(step);
        }
    }
}

fn handle_tool_call_start(state: &mut ChatState, call_id: String, tool_name: String, arguments: Value) {
    commit_active_step(state);
    if state.tool_call(&call_id).is_some() {
        return;
    }
    state.current_response.push(ResponseStep::ToolCall(ToolCallStep {
        call_id,
        tool_name,
        arguments,
        status: ToolCallStatus::Running,
        result: None,
        error: None,
    }));
}

fn update_tool_call(state: &mut ChatState, call_id: &str, update: impl FnOnce(&mut ToolCallStep)) {
    let step = state
        .current_response
        .iter_mut()
        .chain(
            state
                .messages
                .iter_mut()
                .rev()
                .flat_map(|message| message.steps.iter_mut()),
        )
        .find_map(|step| match step {
            ResponseStep::ToolCall(call) if call.call_id == call_id => Some(call),
            _ => None,
        });
    if let Some(step) = step {
        update(step);
    }
}

/// Turns the in-flight step chain into an assistant message.
///
/// Text steps are merged into a single trailing text step; thinking and tool call
/// steps keep their relative order.
fn finalize_response(
    state: &mut ChatState,
    id: String,
    content: Option<String>,
    rendered: Option<String>,
) {
    commit_active_step(state);

    let mut merged = String::new();
    let mut steps = Vec::with_capacity(state.current_response.len() + 1);
    for step in state.current_response.drain(..) {
        match step {
            ResponseStep::Text { content } => merged.push_str(&content),
            other => steps.push(other),
        }
    }

    let content = content.unwrap_or_else(|| merged.clone());
    let text = if merged.is_empty() {
        content.clone()
    } else {
        merged
    };
    if !text.is_empty() {
        steps.push(ResponseStep::Text { content: text });
    }

    let rendered = rendered.or_else(|| {
        let settled = std::mem::take(&mut state.buffer.settled_html);
        (!settled.is_empty()).then_some(settled)
    });

    state.messages.push(Message {
        id,
        role: Role::Assistant,
        content,
        rendered,
        steps,
    });
    state.buffer = BufferState::default();
}

fn transition_client_tool(
    state: &mut ChatState,
    call_id: &str,
    next: ClientToolStatus,
    update: impl FnOnce(&mut ClientTool),
) {
    let Some(tool) = state.pending_client_tools.get_mut(call_id) else {
        return;
    };
    if !tool.status.can_become(next) {
        return;
    }

    tool.status = next;
    update(tool);
    if next.is_terminal() {
        tool.respond = None;
        tool.permission = None;
    }
}

fn handle_pending_handoff(
    state: &mut ChatState,
    call_id: String,
    direction: HandoffDirection,
    reason: Option<String>,
) {
    update_tool_call(state, &call_id, |step| {
        if step.status == ToolCallStatus::Running {
            step.status = ToolCallStatus::Pending;
        }
    });
    state.pending_handoffs.insert(
        call_id.clone(),
        PendingHandoff {
            call_id,
            direction,
            reason,
        },
    );
}

fn handle_tool_emission(
    state: &mut ChatState,
    call_id: String,
    emission_id: String,
    kind: String,
    payload: Value,
    respond: Option<ResponderId>,
) {
    let entry = state
        .tool_emissions
        .entry(call_id.clone())
        .or_insert_with(|| ToolEmissionState {
            call_id,
            tool_name: String::new(),
            emissions: Vec::new(),
            complete: false,
        });
    if entry.emission(&emission_id).is_some() {
        return;
    }
    entry.emissions.push(Emission {
        id: emission_id,
        kind,
        payload,
        status: EmissionStatus::Pending,
        response: None,
        respond,
    });
}

fn handle_trail_step(
    state: &mut ChatState,
    call_id: String,
    step: ExecutionStep,
    respond: Option<ResponderId>,
) {
    let trail = state
        .execution_trails
        .entry(call_id.clone())
        .or_insert_with(|| ExecutionTrailState {
            call_id: call_id.clone(),
            tool_name: String::new(),
            steps: Vec::new(),
            status: TrailStatus::Running,
        });

    let awaiting_answer =
        step.kind == ExecutionStepKind::Prompt && step.status == ExecutionStepStatus::Pending;
    let step_id = step.id.clone();
    match trail.steps.iter_mut().find(|existing| existing.id == step.id) {
        Some(existing) => *existing = step,
        None => trail.steps.push(step),
    }

    let key = StepKey::new(&call_id, &step_id);
    if awaiting_answer {
        state.pending_steps.insert(
            key,
            PendingStep {
                call_id,
                step_id,
                respond,
            },
        );
    } else {
        state.pending_steps.remove(&key);
    }
}
