use thiserror::Error;

use session_patch::ResponderId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RespondError {
    #[error("no respond callback registered for {id}; it was already answered or cancelled")]
    UnknownResponder { id: ResponderId },

    #[error("{what} '{id}' is not waiting for an answer")]
    NotPending { what: &'static str, id: String },

    #[error("{what} '{id}' carries no respond handle")]
    MissingHandle { what: &'static str, id: String },
}

impl RespondError {
    pub(crate) fn not_pending(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotPending {
            what,
            id: id.into(),
        }
    }

    pub(crate) fn missing_handle(what: &'static str, id: impl Into<String>) -> Self {
        Self::MissingHandle {
            what,
            id: id.into(),
        }
    }
}
