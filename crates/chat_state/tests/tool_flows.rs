use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use chat_state::{
    answer_approval, answer_emission, answer_permission, answer_step, reduce, ChatState,
    ClientToolStatus, EmissionStatus, RespondError, Responders, ToolCallStatus,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use session_patch::{
    ExecutionStep, ExecutionStepKind, ExecutionStepStatus, HandoffDirection, Patch, TrailStatus,
};

#[derive(Default)]
struct Answers {
    values: Arc<Mutex<Vec<Value>>>,
}

impl Answers {
    fn callback(&self) -> impl FnOnce(Value) + Send + 'static {
        let values = Arc::clone(&self.values);
        move |value| values.lock().unwrap().push(value)
    }

    fn seen(&self) -> Vec<Value> {
        self.values.lock().unwrap().clone()
    }
}

fn fold(state: ChatState, patches: impl IntoIterator<Item = Patch>) -> ChatState {
    patches.into_iter().fold(state, reduce)
}

fn prompt_step(id: &str, status: ExecutionStepStatus) -> ExecutionStep {
    ExecutionStep {
        id: id.to_string(),
        kind: ExecutionStepKind::Prompt,
        content: json!({ "question": "continue?" }),
        status,
        response: None,
    }
}

#[test]
fn emissions_are_answered_one_by_one() {
    let mut responders = Responders::new();
    let answers = Answers::default();
    let first = responders.register(answers.callback());
    let second = responders.register(answers.callback());

    let mut state = fold(
        ChatState::new(),
        [
            Patch::ToolEmissionStart {
                call_id: "call-1".to_string(),
                tool_name: "deploy".to_string(),
            },
            Patch::ToolEmission {
                call_id: "call-1".to_string(),
                emission_id: "em-1".to_string(),
                kind: "confirm".to_string(),
                payload: json!({ "target": "staging" }),
                respond: Some(first),
            },
            Patch::ToolEmission {
                call_id: "call-1".to_string(),
                emission_id: "em-2".to_string(),
                kind: "confirm".to_string(),
                payload: json!({ "target": "prod" }),
                respond: Some(second),
            },
        ],
    );

    let patch = answer_emission(&state, &mut responders, "call-1", "em-1", json!(true)).unwrap();
    state = reduce(state, patch);

    let entry = &state.tool_emissions["call-1"];
    assert_eq!(entry.emission("em-1").unwrap().status, EmissionStatus::Complete);
    assert_eq!(entry.emission("em-1").unwrap().response, Some(json!(true)));
    assert!(entry.emission("em-1").unwrap().respond.is_none());
    assert_eq!(entry.emission("em-2").unwrap().status, EmissionStatus::Pending);
    assert!(!entry.complete);

    assert_matches!(
        answer_emission(&state, &mut responders, "call-1", "em-1", json!(false)),
        Err(RespondError::NotPending { .. })
    );

    let patch = answer_emission(&state, &mut responders, "call-1", "em-2", json!(false)).unwrap();
    state = fold(
        state,
        [
            patch,
            Patch::ToolEmissionComplete {
                call_id: "call-1".to_string(),
            },
        ],
    );
    assert!(state.tool_emissions["call-1"].complete);
    assert_eq!(answers.seen(), vec![json!(true), json!(false)]);
    assert!(responders.is_empty());
}

#[test]
fn emission_without_start_creates_entry() {
    let state = reduce(
        ChatState::new(),
        Patch::ToolEmission {
            call_id: "call-9".to_string(),
            emission_id: "em-1".to_string(),
            kind: "notice".to_string(),
            payload: Value::Null,
            respond: None,
        },
    );
    assert_eq!(state.tool_emissions["call-9"].emissions.len(), 1);
}

#[test]
fn trail_prompt_answer_clears_pending_step_in_same_patch() {
    let mut responders = Responders::new();
    let answers = Answers::default();
    let handle = responders.register(answers.callback());

    let state = fold(
        ChatState::new(),
        [
            Patch::ExecutionTrailStart {
                call_id: "call-1".to_string(),
                tool_name: "migrate".to_string(),
            },
            Patch::ExecutionTrailStep {
                call_id: "call-1".to_string(),
                step: prompt_step("step-1", ExecutionStepStatus::Pending),
                respond: Some(handle),
            },
        ],
    );
    let pending = state.pending_step("call-1", "step-1").unwrap();
    assert_eq!(pending.call_id, "call-1");
    assert_eq!(pending.respond, Some(handle));

    assert_matches!(
        answer_step(&state, &mut responders, "other-call", "step-1", json!("yes")),
        Err(RespondError::NotPending { what: "step", .. })
    );

    let patch = answer_step(&state, &mut responders, "call-1", "step-1", json!("yes")).unwrap();
    let state = reduce(state, patch);

    assert!(state.pending_steps.is_empty());
    let step = state.execution_trails["call-1"].step("step-1").unwrap();
    assert_eq!(step.status, ExecutionStepStatus::Complete);
    assert_eq!(step.response, Some(json!("yes")));
    assert_eq!(answers.seen(), vec![json!("yes")]);

    let state = reduce(
        state,
        Patch::ExecutionTrailComplete {
            call_id: "call-1".to_string(),
            status: TrailStatus::Complete,
        },
    );
    assert_eq!(state.execution_trails["call-1"].status, TrailStatus::Complete);
}

#[test]
fn every_pending_step_points_at_a_pending_prompt() {
    let patches = vec![
        Patch::ExecutionTrailStart {
            call_id: "c".to_string(),
            tool_name: "t".to_string(),
        },
        Patch::ExecutionTrailStep {
            call_id: "c".to_string(),
            step: ExecutionStep {
                id: "log-1".to_string(),
                kind: ExecutionStepKind::Log,
                content: json!("starting"),
                status: ExecutionStepStatus::Complete,
                response: None,
            },
            respond: None,
        },
        Patch::ExecutionTrailStep {
            call_id: "c".to_string(),
            step: prompt_step("p-1", ExecutionStepStatus::Pending),
            respond: None,
        },
        Patch::ExecutionTrailStep {
            call_id: "c".to_string(),
            step: prompt_step("p-2", ExecutionStepStatus::Pending),
            respond: None,
        },
        Patch::ExecutionTrailStep {
            call_id: "c".to_string(),
            step: prompt_step("p-1", ExecutionStepStatus::Complete),
            respond: None,
        },
        Patch::ExecutionTrailStepResponse {
            call_id: "c".to_string(),
            step_id: "p-2".to_string(),
            response: json!(1),
        },
    ];

    let mut state = ChatState::new();
    for patch in patches {
        state = reduce(state, patch);
        for (key, pending) in &state.pending_steps {
            assert_eq!((&key.call_id, &key.step_id), (&pending.call_id, &pending.step_id));
            let step = state.execution_trails[&pending.call_id]
                .step(&pending.step_id)
                .unwrap();
            assert_eq!(step.kind, ExecutionStepKind::Prompt);
            assert_eq!(step.status, ExecutionStepStatus::Pending);
        }
    }
    assert!(state.pending_steps.is_empty());
    assert_eq!(state.execution_trails["c"].steps.len(), 3);
}

#[test]
fn trails_reusing_a_step_id_keep_separate_pending_entries() {
    let pending_prompt = |call_id: &str| Patch::ExecutionTrailStep {
        call_id: call_id.to_string(),
        step: prompt_step("s1", ExecutionStepStatus::Pending),
        respond: None,
    };
    let state = fold(
        ChatState::new(),
        [
            pending_prompt("trail-a"),
            pending_prompt("trail-b"),
            Patch::ExecutionTrailStepResponse {
                call_id: "trail-a".to_string(),
                step_id: "s1".to_string(),
                response: json!("ok"),
            },
        ],
    );

    assert_eq!(
        state.execution_trails["trail-a"].step("s1").unwrap().status,
        ExecutionStepStatus::Complete
    );
    assert_eq!(
        state.execution_trails["trail-b"].step("s1").unwrap().status,
        ExecutionStepStatus::Pending
    );
    assert_eq!(state.pending_steps.len(), 1);
    assert_eq!(state.pending_step("trail-b", "s1").unwrap().call_id, "trail-b");
    assert!(state.pending_step("trail-a", "s1").is_none());

    let snapshot = serde_json::to_value(&state).unwrap();
    assert_eq!(
        snapshot["pending_steps"],
        json!([{ "call_id": "trail-b", "step_id": "s1" }])
    );
}

#[test]
fn client_tool_approval_then_completion() {
    let mut responders = Responders::new();
    let answers = Answers::default();
    let handle = responders.register(answers.callback());

    let state = reduce(
        ChatState::new(),
        Patch::ClientToolAwaitingApproval {
            call_id: "call-1".to_string(),
            tool_name: "shell".to_string(),
            arguments: json!({ "cmd": "ls" }),
            respond: Some(handle),
        },
    );

    let patch = answer_approval(&state, &mut responders, "call-1", true).unwrap();
    assert_eq!(
        patch,
        Patch::ClientToolExecuting {
            call_id: "call-1".to_string()
        }
    );
    let state = fold(
        state,
        [
            patch,
            Patch::ClientToolProgress {
                call_id: "call-1".to_string(),
                message: "listing".to_string(),
            },
            Patch::ClientToolComplete {
                call_id: "call-1".to_string(),
                result: json!(["a", "b"]),
            },
        ],
    );

    let tool = &state.pending_client_tools["call-1"];
    assert_eq!(tool.status, ClientToolStatus::Complete);
    assert_eq!(tool.message.as_deref(), Some("listing"));
    assert_eq!(tool.result, Some(json!(["a", "b"])));
    assert!(tool.respond.is_none());
    assert_eq!(answers.seen(), vec![json!({ "approved": true })]);
}

#[test]
fn permission_answer_clears_the_prompt() {
    let mut responders = Responders::new();
    let answers = Answers::default();
    let handle = responders.register(answers.callback());

    let state = fold(
        ChatState::new(),
        [
            Patch::ClientToolAwaitingApproval {
                call_id: "call-1".to_string(),
                tool_name: "shell".to_string(),
                arguments: json!({}),
                respond: None,
            },
            Patch::ClientToolExecuting {
                call_id: "call-1".to_string(),
            },
            Patch::ClientToolPermissionRequest {
                call_id: "call-1".to_string(),
                prompt: "write to /tmp?".to_string(),
                respond: Some(handle),
            },
        ],
    );
    assert_eq!(
        state.pending_client_tools["call-1"]
            .permission
            .as_ref()
            .map(|permission| permission.prompt.as_str()),
        Some("write to /tmp?")
    );

    let patch = answer_permission(&state, &mut responders, "call-1", true).unwrap();
    assert_eq!(
        patch,
        Patch::ClientToolPermissionResponse {
            call_id: "call-1".to_string(),
            granted: true,
        }
    );
    let state = reduce(state, patch);

    let tool = &state.pending_client_tools["call-1"];
    assert!(tool.permission.is_none());
    assert_eq!(tool.status, ClientToolStatus::Executing);
    assert_eq!(answers.seen(), vec![json!({ "granted": true })]);
    assert_matches!(
        answer_permission(&state, &mut responders, "call-1", false),
        Err(RespondError::NotPending { what: "permission", .. })
    );
}

#[test]
fn terminal_client_tool_ignores_later_transitions() {
    let state = fold(
        ChatState::new(),
        [
            Patch::ClientToolAwaitingApproval {
                call_id: "call-1".to_string(),
                tool_name: "shell".to_string(),
                arguments: json!({}),
                respond: None,
            },
            Patch::ClientToolDenied {
                call_id: "call-1".to_string(),
                reason: Some("not allowed".to_string()),
            },
            Patch::ClientToolExecuting {
                call_id: "call-1".to_string(),
            },
            Patch::ClientToolComplete {
                call_id: "call-1".to_string(),
                result: json!(1),
            },
            Patch::ClientToolProgress {
                call_id: "call-1".to_string(),
                message: "late".to_string(),
            },
        ],
    );

    let tool = &state.pending_client_tools["call-1"];
    assert_eq!(tool.status, ClientToolStatus::Denied);
    assert_eq!(tool.message.as_deref(), Some("not allowed"));
    assert_eq!(tool.result, None);
}

#[test]
fn executing_without_approval_picks_up_tool_call_name() {
    let state = fold(
        ChatState::new(),
        [
            Patch::StreamingStart,
            Patch::ToolCallStart {
                call_id: "call-1".to_string(),
                tool_name: "read_file".to_string(),
                arguments: json!({ "path": "a.rs" }),
            },
            Patch::ClientToolExecuting {
                call_id: "call-1".to_string(),
            },
        ],
    );
    let tool = &state.pending_client_tools["call-1"];
    assert_eq!(tool.tool_name, "read_file");
    assert_eq!(tool.status, ClientToolStatus::Executing);
}

#[test]
fn handoff_pauses_and_resumes_tool_call() {
    let start = fold(
        ChatState::new(),
        [
            Patch::StreamingStart,
            Patch::ToolCallStart {
                call_id: "call-1".to_string(),
                tool_name: "browser".to_string(),
                arguments: json!({}),
            },
            Patch::PendingHandoff {
                call_id: "call-1".to_string(),
                direction: HandoffDirection::ServerToClient,
                reason: Some("needs local browser".to_string()),
            },
        ],
    );
    assert_eq!(start.tool_call("call-1").unwrap().status, ToolCallStatus::Pending);
    assert_eq!(
        start.pending_handoffs["call-1"].direction,
        HandoffDirection::ServerToClient
    );

    let resumed = reduce(
        start.clone(),
        Patch::HandoffComplete {
            call_id: "call-1".to_string(),
            result: None,
        },
    );
    assert!(resumed.pending_handoffs.is_empty());
    assert_eq!(resumed.tool_call("call-1").unwrap().status, ToolCallStatus::Running);

    let finished = reduce(
        start,
        Patch::HandoffComplete {
            call_id: "call-1".to_string(),
            result: Some(json!("page text")),
        },
    );
    let call = finished.tool_call("call-1").unwrap();
    assert_eq!(call.status, ToolCallStatus::Complete);
    assert_eq!(call.result, Some(json!("page text")));
}

#[test]
fn unknown_ids_leave_state_untouched() {
    let base = ChatState::new();
    for patch in [
        Patch::ToolCallResult {
            call_id: "nope".to_string(),
            result: json!(1),
        },
        Patch::ClientToolComplete {
            call_id: "nope".to_string(),
            result: json!(1),
        },
        Patch::ToolEmissionResponse {
            call_id: "nope".to_string(),
            emission_id: "em".to_string(),
            response: json!(1),
        },
        Patch::ExecutionTrailStepResponse {
            call_id: "nope".to_string(),
            step_id: "s".to_string(),
            response: json!(1),
        },
        Patch::HandoffComplete {
            call_id: "nope".to_string(),
            result: None,
        },
    ] {
        assert_eq!(reduce(base.clone(), patch), base);
    }
}
