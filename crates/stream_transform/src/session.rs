use std::sync::Arc;

use chat_state::{apply, ChatState};
use frameflow::PipelineBlueprint;
use session_patch::Patch;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TransformError;
use crate::transform::spawn_transform;

/// Input patches → transform → reducer, with a snapshot published after each patch.
///
/// Snapshots are whole-patch: a subscriber never sees half of one patch applied.
#[derive(Debug)]
pub struct Session {
    input: mpsc::UnboundedSender<Patch>,
    state: watch::Receiver<Arc<ChatState>>,
    transform: JoinHandle<Result<(), TransformError>>,
    reducer: JoinHandle<Arc<ChatState>>,
}

impl Session {
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(blueprint: PipelineBlueprint) -> Self {
        let (input, input_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(Arc::new(ChatState::new()));
        let (mut patches, transform) = spawn_transform(blueprint, input_rx);

        let reducer = tokio::spawn(async move {
            let mut current = Arc::new(ChatState::new());
            let mut applied = 0usize;
            while let Some(patch) = patches.recv().await {
                let mut next = ChatState::clone(&current);
                apply(&mut next, patch);
                current = Arc::new(next);
                state_tx.send_replace(Arc::clone(&current));
                applied += 1;
            }
            debug!(applied, "session reducer stopped");
            current
        });

        info!("session started");
        Self {
            input,
            state,
            transform,
            reducer,
        }
    }

    pub fn send(&self, patch: Patch) -> Result<(), TransformError> {
        self.input.send(patch).map_err(|_| TransformError::Closed)
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<ChatState> {
        Arc::clone(&self.state.borrow())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<ChatState>> {
        self.state.clone()
    }

    /// Waits for the first snapshot satisfying `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&Arc<ChatState>) -> bool,
    ) -> Result<Arc<ChatState>, TransformError> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(predicate)
            .await
            .map_err(|_| TransformError::Closed)?;
        Ok(Arc::clone(&snapshot))
    }

    /// Closes the input, drains everything in flight and returns the final state.
    pub async fn close(self) -> Result<Arc<ChatState>, TransformError> {
        drop(self.input);
        self.transform
            .await
            .map_err(|source| TransformError::task("transform", source))??;
        let state = self
            .reducer
            .await
            .map_err(|source| TransformError::task("reducer", source))?;
        info!(messages = state.messages.len(), "session closed");
        Ok(state)
    }
}
