//! Respond callbacks kept out of the state tree.
//!
//! State only stores [`ResponderId`]s, so it stays cloneable and comparable. The
//! callbacks live here and each one fires at most once.

use std::collections::HashMap;
use std::fmt;

use serde_json::{json, Value};
use session_patch::{Patch, ResponderId};

use crate::error::RespondError;
use crate::state::{ChatState, ClientToolStatus, EmissionStatus};

type Callback = Box<dyn FnOnce(Value) + Send>;

#[derive(Default)]
pub struct Responders {
    callbacks: HashMap<ResponderId, Callback>,
}

impl fmt::Debug for Responders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responders")
            .field("pending", &self.callbacks.len())
            .finish()
    }
}

impl Responders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `callback` and returns the handle to put on a patch.
    pub fn register(&mut self, callback: impl FnOnce(Value) + Send + 'static) -> ResponderId {
        let id = ResponderId::new();
        self.callbacks.insert(id, Box::new(callback));
        id
    }

    /// Fires and forgets the callback behind `id`.
    pub fn respond(&mut self, id: ResponderId, value: Value) -> Result<(), RespondError> {
        let callback = self
            .callbacks
            .remove(&id)
            .ok_or(RespondError::UnknownResponder { id })?;
        callback(value);
        Ok(())
    }

    /// Drops a callback without calling it. Returns whether one was registered.
    pub fn cancel(&mut self, id: ResponderId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// Answers a pending trail prompt and returns the patch recording the answer.
pub fn answer_step(
    state: &ChatState,
    responders: &mut Responders,
    call_id: &str,
    step_id: &str,
    response: Value,
) -> Result<Patch, RespondError> {
    let pending = state
        .pending_step(call_id, step_id)
        .ok_or_else(|| RespondError::not_pending("step", step_id))?;
    let id = pending
        .respond
        .ok_or_else(|| RespondError::missing_handle("step", step_id))?;

    responders.respond(id, response.clone())?;
    Ok(Patch::ExecutionTrailStepResponse {
        call_id: call_id.to_string(),
        step_id: step_id.to_string(),
        response,
    })
}

/// Answers a pending tool emission and returns the patch recording the answer.
pub fn answer_emission(
    state: &ChatState,
    responders: &mut Responders,
    call_id: &str,
    emission_id: &str,
    response: Value,
) -> Result<Patch, RespondError> {
    let emission = state
        .tool_emissions
        .get(call_id)
        .and_then(|entry| entry.emission(emission_id))
        .filter(|emission| emission.status == EmissionStatus::Pending)
        .ok_or_else(|| RespondError::not_pending("emission", emission_id))?;
    let id = emission
        .respond
        .ok_or_else(|| RespondError::missing_handle("emission", emission_id))?;

    responders.respond(id, response.clone())?;
    Ok(Patch::ToolEmissionResponse {
        call_id: call_id.to_string(),
        emission_id: emission_id.to_string(),
        response,
    })
}

/// Approves or denies a client tool awaiting approval.
///
/// The callback receives `{"approved": bool}`.
pub fn answer_approval(
    state: &ChatState,
    responders: &mut Responders,
    call_id: &str,
    approved: bool,
) -> Result<Patch, RespondError> {
    let tool = state
        .pending_client_tools
        .get(call_id)
        .filter(|tool| tool.status == ClientToolStatus::AwaitingApproval)
        .ok_or_else(|| RespondError::not_pending("client tool", call_id))?;
    let id = tool
        .respond
        .ok_or_else(|| RespondError::missing_handle("client tool", call_id))?;

    responders.respond(id, json!({ "approved": approved }))?;
    let call_id = call_id.to_string();
    Ok(if approved {
        Patch::ClientToolExecuting { call_id }
    } else {
        Patch::ClientToolDenied {
            call_id,
            reason: None,
        }
    })
}

/// Grants or refuses the permission prompt of a client tool.
///
/// The callback receives `{"granted": bool}`; the returned patch clears the prompt.
pub fn answer_permission(
    state: &ChatState,
    responders: &mut Responders,
    call_id: &str,
    granted: bool,
) -> Result<Patch, RespondError> {
    let prompt = state
        .pending_client_tools
        .get(call_id)
        .and_then(|tool| tool.permission.as_ref())
        .ok_or_else(|| RespondError::not_pending("permission", call_id))?;
    let id = prompt
        .respond
        .ok_or_else(|| RespondError::missing_handle("permission", call_id))?;

    responders.respond(id, json!({ "granted": granted }))?;
    Ok(Patch::ClientToolPermissionResponse {
        call_id: call_id.to_string(),
        granted,
    })
}
