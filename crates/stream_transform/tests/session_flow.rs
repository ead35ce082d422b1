use chat_state::{ResponseStep, ToolCallStatus};
use frameflow::{PipelineConfig, Preset};
use pretty_assertions::assert_eq;
use serde_json::json;
use session_patch::{Patch, PatchKind};
use stream_transform::{spawn_transform, Session};
use tokio::sync::mpsc;

fn blueprint() -> frameflow::PipelineBlueprint {
    PipelineConfig::preset(Preset::Markdown).build().unwrap()
}

fn text(text: &str) -> Patch {
    Patch::StreamingText {
        text: text.to_string(),
    }
}

#[tokio::test]
async fn spawned_transform_settles_before_streaming_end() {
    let (input, input_rx) = mpsc::unbounded_channel();
    let (mut output, handle) = spawn_transform(blueprint(), input_rx);

    for patch in [
        Patch::StreamingStart,
        text("Hello.\n\n"),
        text("> trailing"),
        Patch::StreamingEnd,
    ] {
        input.send(patch).unwrap();
    }
    drop(input);

    let mut kinds = Vec::new();
    while let Some(patch) = output.recv().await {
        kinds.push(patch.kind());
    }
    handle.await.unwrap().unwrap();

    let last_settled = kinds
        .iter()
        .rposition(|kind| *kind == PatchKind::BufferSettled)
        .unwrap();
    assert_eq!(kinds.last(), Some(&PatchKind::StreamingEnd));
    assert!(last_settled < kinds.len() - 1);
    assert_eq!(
        kinds.iter().filter(|kind| **kind == PatchKind::BufferSettled).count(),
        2
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn session_builds_message_with_rendered_html() {
    let session = Session::spawn(blueprint());
    for patch in [
        Patch::UserMessage {
            id: "u1".to_string(),
            content: "greet me".to_string(),
        },
        Patch::StreamingStart,
        text("Hello "),
        text("*there*"),
        Patch::StreamingEnd,
        Patch::AssistantMessage {
            id: "a1".to_string(),
            content: "Hello *there*".to_string(),
            rendered: None,
        },
    ] {
        session.send(patch).unwrap();
    }

    let state = session.close().await.unwrap();
    assert_eq!(state.messages.len(), 2);
    let reply = &state.messages[1];
    assert_eq!(reply.content, "Hello *there*");
    assert_eq!(
        reply.rendered.as_deref().map(str::trim_end),
        Some("<p>Hello <em>there</em></p>")
    );
    assert_eq!(
        reply.steps,
        vec![ResponseStep::Text {
            content: "Hello *there*".to_string()
        }]
    );
    assert!(!state.is_streaming);
}

#[tokio::test]
async fn wait_for_sees_tool_state() {
    let session = Session::spawn(blueprint());
    session.send(Patch::StreamingStart).unwrap();
    session
        .send(Patch::ToolCallStart {
            call_id: "call-1".to_string(),
            tool_name: "search".to_string(),
            arguments: json!({ "q": "rust" }),
        })
        .unwrap();

    let snapshot = session
        .wait_for(|state| state.tool_call("call-1").is_some())
        .await
        .unwrap();
    assert_eq!(
        snapshot.tool_call("call-1").unwrap().status,
        ToolCallStatus::Running
    );

    session.close().await.unwrap();
}
