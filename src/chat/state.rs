//! Conversation state and its single transition function.
//!
//! Nothing outside this module can mutate a [`Conversation`]: callers build
//! an [`Action`] and run it through [`reduce`].

use std::collections::BTreeSet;

use crate::api::types::{HealthState, HealthStatus};

use super::message::{Message, MessagePatch};
use super::mode::QueryMode;

/// Why a submission was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    EmptyInput,
    Busy,
    BackendUnreachable,
}

/// Last known backend reachability.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HealthIndicator {
    #[default]
    Unknown,
    Connected(HealthStatus),
    Unreachable(String),
}

impl HealthIndicator {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, HealthIndicator::Unreachable(_))
    }

    pub fn summary(&self) -> String {
        match self {
            HealthIndicator::Unknown => "Checking...".to_string(),
            HealthIndicator::Connected(status) => {
                let state = match status.status {
                    HealthState::Healthy => "Connected",
                    HealthState::Degraded => "Connected (degraded)",
                };
                match (&status.version, status.index_loaded) {
                    (Some(version), true) => format!("{} v{}", state, version),
                    (Some(version), false) => format!("{} v{}, index not loaded", state, version),
                    (None, true) => state.to_string(),
                    (None, false) => format!("{}, index not loaded", state),
                }
            }
            HealthIndicator::Unreachable(reason) => format!("Disconnected: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    SetInput(String),
    ClearInput,
    SetLoading(bool),
    SetError(Option<String>),
    SetHealth(HealthIndicator),
    SetQueryMode(QueryMode),
    AddMessage(Message),
    UpdateMessage { id: String, patch: MessagePatch },
    ToggleSources(String),
    ClearMessages,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    input: String,
    loading: bool,
    error: Option<String>,
    health: HealthIndicator,
    query_mode: QueryMode,
    expanded_sources: BTreeSet<String>,
}

impl Conversation {
    pub fn new(query_mode: QueryMode) -> Self {
        Self {
            query_mode,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn health(&self) -> &HealthIndicator {
        &self.health
    }

    pub fn query_mode(&self) -> QueryMode {
        self.query_mode
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded_sources.contains(id)
    }

    pub fn expanded_sources(&self) -> &BTreeSet<String> {
        &self.expanded_sources
    }

    /// Submission needs non-blank input, nothing in flight and a backend
    /// not known to be unreachable. `None` means the input may be sent.
    pub fn submit_rejection(&self) -> Option<SubmitRejection> {
        if self.input.trim().is_empty() {
            Some(SubmitRejection::EmptyInput)
        } else if self.loading {
            Some(SubmitRejection::Busy)
        } else if self.health.is_unreachable() {
            Some(SubmitRejection::BackendUnreachable)
        } else {
            None
        }
    }

    /// Most recent message that still offers web enrichment.
    pub fn latest_web_search_candidate(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.can_request_web_search())
    }
}

pub fn reduce(mut state: Conversation, action: Action) -> Conversation {
    match action {
        Action::SetInput(text) => state.input = text,
        Action::ClearInput => state.input.clear(),
        Action::SetLoading(loading) => state.loading = loading,
        Action::SetError(error) => state.error = error,
        Action::SetHealth(health) => state.health = health,
        Action::SetQueryMode(mode) => state.query_mode = mode,
        Action::AddMessage(message) => {
            if state.messages.iter().any(|m| m.id == message.id) {
                tracing::warn!("Ignoring message with duplicate id {}", message.id);
            } else {
                state.messages.push(message);
            }
        }
        Action::UpdateMessage { id, patch } => {
            match state.messages.iter_mut().find(|m| m.id == id) {
                Some(message) => patch.apply_to(message),
                None => tracing::debug!("Update for unknown message {} ignored", id),
            }
        }
        Action::ToggleSources(id) => {
            if !state.expanded_sources.remove(&id) {
                state.expanded_sources.insert(id);
            }
        }
        Action::ClearMessages => {
            state.messages.clear();
            state.expanded_sources.clear();
        }
    }
    state
}
