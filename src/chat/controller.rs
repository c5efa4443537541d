//! Drives submissions and web enrichment against the backend.
//!
//! The controller owns the conversation behind a mutex and funnels every
//! change through [`reduce`]. The lock is only taken for synchronous
//! transitions, never across a backend call, so a web enrichment for one
//! message and a query for another can be in flight at the same time.

use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};

use crate::api::types::{
    DeleteMessageResponse, FilterOptions, SaveMessageRequest, StoredChatMessage,
    UpdateWebResponseRequest, UserRecord, WebEnrichmentRequest,
};
use crate::api::RagApi;
use crate::core::config::AppConfig;
use crate::core::errors::ClientError;
use crate::session::SessionStore;

use super::message::{
    parse_server_timestamp, EnhancedResult, Message, MessagePatch, Role, Source,
    WebEnrichmentResult,
};
use super::mode::QueryMode;
use super::state::{reduce, Action, Conversation, HealthIndicator, SubmitRejection};
use super::strategy::{strategy_for, QueryOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub query: QueryOptions,
    pub web_max_results: u32,
    pub concise_mode: bool,
    pub persist_history: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            query: QueryOptions::default(),
            web_max_results: 5,
            concise_mode: true,
            persist_history: true,
        }
    }
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            query: QueryOptions {
                top_k: config.query.top_k,
                filters: config.query.filters.clone(),
            },
            web_max_results: config.web_search.max_results,
            concise_mode: config.web_search.concise_mode,
            persist_history: config.history.persist,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The answer was appended under this id.
    Answered(String),
    Rejected(SubmitRejection),
    /// The error banner has been set to this text.
    Failed(String),
    /// The session was rejected and has been cleared.
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSearchRejection {
    NotFound,
    NotEligible,
    AlreadyLoading,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebSearchOutcome {
    Enriched,
    Rejected(WebSearchRejection),
    Failed(String),
    LoggedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOutcome {
    /// The conversation now holds this many restored exchanges.
    Restored(usize),
    /// A submission is in flight; the conversation was left alone.
    Busy,
    Failed(String),
    LoggedOut,
}

#[derive(Clone)]
pub struct ChatController {
    api: Arc<dyn RagApi>,
    session: SessionStore,
    settings: ChatSettings,
    state: Arc<Mutex<Conversation>>,
}

impl ChatController {
    pub fn new(
        api: Arc<dyn RagApi>,
        session: SessionStore,
        settings: ChatSettings,
        mode: QueryMode,
    ) -> Self {
        Self {
            api,
            session,
            settings,
            state: Arc::new(Mutex::new(Conversation::new(mode))),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn snapshot(&self) -> Conversation {
        self.with_state(|state| state.clone())
    }

    pub fn dispatch(&self, action: Action) {
        self.with_state(|state| transition(state, action));
    }

    fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) {
        self.with_state(|state| {
            for action in actions {
                transition(state, action);
            }
        });
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn set_query_mode(&self, mode: QueryMode) {
        tracing::debug!("Query mode set to {}", mode);
        self.dispatch(Action::SetQueryMode(mode));
    }

    pub fn toggle_sources(&self, message_id: impl Into<String>) {
        self.dispatch(Action::ToggleSources(message_id.into()));
    }

    /// Empties the conversation unless a submission is in flight.
    /// Returns whether it was cleared.
    pub fn clear_history(&self) -> bool {
        self.with_state(|state| {
            if state.is_loading() {
                return false;
            }
            transition(state, Action::ClearMessages);
            transition(state, Action::SetError(None));
            true
        })
    }

    /// Probes the backend once and records the result.
    pub async fn check_health(&self) -> HealthIndicator {
        let indicator = match self.api.health_check().await {
            Ok(status) => HealthIndicator::Connected(status),
            Err(err) => {
                tracing::warn!("Health check failed: {}", err);
                HealthIndicator::Unreachable(err.to_string())
            }
        };
        self.dispatch(Action::SetHealth(indicator.clone()));
        indicator
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserRecord, ClientError> {
        let session = self.api.login(username, password).await?;
        self.dispatch(Action::SetError(None));
        Ok(session.user)
    }

    /// Explicit logout. Local history is kept.
    pub fn logout(&self) -> bool {
        self.session.logout()
    }

    /// Replaces the input with `text` and submits it with the current mode.
    pub async fn submit_query(&self, text: impl Into<String>) -> SubmitOutcome {
        let text = text.into();
        let admitted = self.with_state(|state| {
            transition(state, Action::SetInput(text));
            if let Some(rejection) = state.submit_rejection() {
                return Err(rejection);
            }
            let query = state.input().trim().to_string();
            let mode = state.query_mode();
            for action in [
                Action::AddMessage(Message::user(query.clone())),
                Action::SetLoading(true),
                Action::SetError(None),
                Action::ClearInput,
            ] {
                transition(state, action);
            }
            Ok((query, mode))
        });

        let (query, mode) = match admitted {
            Ok(admitted) => admitted,
            Err(rejection) => {
                tracing::debug!("Submission rejected: {:?}", rejection);
                return SubmitOutcome::Rejected(rejection);
            }
        };

        tracing::info!("Submitting query in {} mode", mode);
        let strategy = strategy_for(mode, self.api.clone(), self.settings.query.clone());
        let mut message = match strategy.execute(&query).await {
            Ok(message) => message,
            Err(err) if err.is_authentication() => return self.abandon_submission(),
            Err(err) => {
                tracing::warn!("Query failed: {}", err);
                let text = err.user_message();
                self.dispatch_all([Action::SetError(Some(text.clone())), Action::SetLoading(false)]);
                return SubmitOutcome::Failed(text);
            }
        };

        if self.settings.persist_history {
            if let Some(result) = message
                .enhanced_response
                .as_mut()
                .filter(|result| result.message_id.is_none())
            {
                match self.save_exchange(result).await {
                    Ok(()) => {}
                    Err(err) if err.is_authentication() => return self.abandon_submission(),
                    Err(err) => tracing::warn!("Failed to save chat message: {}", err),
                }
            }
        }

        let id = message.id.clone();
        self.dispatch_all([Action::AddMessage(message), Action::SetLoading(false)]);
        SubmitOutcome::Answered(id)
    }

    async fn save_exchange(&self, result: &mut EnhancedResult) -> Result<(), ClientError> {
        let mut metadata = Map::new();
        metadata.insert("mode".into(), json!(QueryMode::Enhanced.as_str()));
        if let Some(filters) = &self.settings.query.filters {
            metadata.insert(
                "filters".into(),
                serde_json::to_value(filters).unwrap_or(Value::Null),
            );
        }

        let request = SaveMessageRequest {
            message: result.query.clone(),
            local_response: result.response.clone(),
            local_citations: result.sources.iter().map(Source::to_node).collect(),
            metadata: Some(metadata),
        };
        let saved = self.api.save_message(&request).await?;
        tracing::debug!("Saved chat message {}", saved.message_id);
        result.message_id = Some(saved.message_id);
        Ok(())
    }

    /// Phase 2 for one enhanced answer.
    pub async fn request_web_search(&self, message_id: &str) -> WebSearchOutcome {
        let admitted = self.with_state(|state| {
            let Some(message) = state.message(message_id) else {
                return Err(WebSearchRejection::NotFound);
            };
            if message.is_web_search_loading {
                return Err(WebSearchRejection::AlreadyLoading);
            }
            if !message.can_request_web_search() {
                return Err(WebSearchRejection::NotEligible);
            }
            let result = message.enhanced_response.clone();
            transition(
                state,
                Action::UpdateMessage {
                    id: message_id.to_string(),
                    patch: MessagePatch::new()
                        .web_search_loading(true)
                        .web_search_error(None),
                },
            );
            result.ok_or(WebSearchRejection::NotEligible)
        });

        let result = match admitted {
            Ok(result) => result,
            Err(rejection) => {
                tracing::debug!("Web search for {} rejected: {:?}", message_id, rejection);
                return WebSearchOutcome::Rejected(rejection);
            }
        };

        let request = WebEnrichmentRequest {
            query: result.query.clone(),
            message_id: result.message_id.clone(),
            local_context: result.local_context(),
            preferred_sources: result.preferred_sources.clone(),
            keywords: None,
            max_results: self.settings.web_max_results,
            concise_mode: self.settings.concise_mode,
        };

        tracing::info!("Requesting web enrichment for {}", message_id);
        let enrichment = match self.api.web_search_explicit(&request).await {
            Ok(response) => WebEnrichmentResult::from(response),
            Err(err) if err.is_authentication() => {
                self.dispatch(Action::UpdateMessage {
                    id: message_id.to_string(),
                    patch: MessagePatch::new().web_search_loading(false),
                });
                self.handle_auth_failure();
                return WebSearchOutcome::LoggedOut;
            }
            Err(err) => {
                tracing::warn!("Web enrichment failed: {}", err);
                let text = format!("Web search failed: {}", err.user_message());
                self.dispatch(Action::UpdateMessage {
                    id: message_id.to_string(),
                    patch: MessagePatch::new()
                        .web_search_loading(false)
                        .web_search_error(Some(text.clone())),
                });
                return WebSearchOutcome::Failed(text);
            }
        };

        let update = match (&result.message_id, self.settings.persist_history) {
            (Some(server_id), true) => Some(UpdateWebResponseRequest {
                message_id: server_id.clone(),
                web_response: enrichment.enriched_response.clone(),
                web_citations: enrichment.citations().iter().map(Source::to_node).collect(),
            }),
            _ => None,
        };

        self.dispatch(Action::UpdateMessage {
            id: message_id.to_string(),
            patch: MessagePatch::new()
                .web_search_response(enrichment)
                .web_search_loading(false)
                .show_web_search_button(false),
        });

        if let Some(update) = update {
            match self.api.update_web_response(&update).await {
                Ok(()) => {}
                Err(err) if err.is_authentication() => {
                    self.handle_auth_failure();
                    return WebSearchOutcome::LoggedOut;
                }
                Err(err) => tracing::warn!("Failed to store web enrichment: {}", err),
            }
        }

        WebSearchOutcome::Enriched
    }

    /// Replaces the conversation with the newest `limit` stored exchanges.
    /// Refused while a submission is in flight, both before the fetch and
    /// when the restored exchanges are swapped in.
    pub async fn load_history(&self, limit: u32) -> HistoryOutcome {
        if self.with_state(|state| state.is_loading()) {
            return HistoryOutcome::Busy;
        }
        let page = match self.api.get_messages(limit, 0).await {
            Ok(page) => page,
            Err(err) if err.is_authentication() => {
                self.handle_auth_failure();
                return HistoryOutcome::LoggedOut;
            }
            Err(err) => {
                tracing::warn!("Loading chat history failed: {}", err);
                return HistoryOutcome::Failed(err.user_message());
            }
        };

        // The backend lists newest first.
        let mut records = page.messages;
        records.reverse();
        let restored = records.len();
        let mut messages = Vec::with_capacity(restored * 2);
        for record in records {
            let (user, assistant) = restore_exchange(record);
            messages.push(user);
            messages.push(assistant);
        }

        let replaced = self.with_state(|state| {
            if state.is_loading() {
                return false;
            }
            transition(state, Action::ClearMessages);
            for message in messages {
                transition(state, Action::AddMessage(message));
            }
            true
        });
        if !replaced {
            tracing::debug!("History restore dropped, a submission started meanwhile");
            return HistoryOutcome::Busy;
        }

        tracing::info!("Restored {} of {} stored exchanges", restored, page.total);
        HistoryOutcome::Restored(restored)
    }

    /// Deletes a stored exchange on the server. The local history is left as is.
    pub async fn delete_stored_message(
        &self,
        server_id: &str,
    ) -> Result<DeleteMessageResponse, ClientError> {
        self.guard_auth(self.api.delete_message(server_id).await)
    }

    pub async fn load_filters(&self) -> Result<FilterOptions, ClientError> {
        self.guard_auth(self.api.get_filters().await)
    }

    fn guard_auth<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(err) = &result {
            if err.is_authentication() {
                self.handle_auth_failure();
            }
        }
        result
    }

    /// A rejected session is cleared without a banner; the caller is
    /// expected to prompt for login.
    fn handle_auth_failure(&self) {
        self.session.logout();
        tracing::info!("Session rejected by backend; logged out");
    }

    /// Ends the in-flight submission after a rejected session.
    fn abandon_submission(&self) -> SubmitOutcome {
        self.dispatch(Action::SetLoading(false));
        self.handle_auth_failure();
        SubmitOutcome::LoggedOut
    }
}

fn transition(state: &mut Conversation, action: Action) {
    *state = reduce(std::mem::take(state), action);
}

fn restore_exchange(record: StoredChatMessage) -> (Message, Message) {
    let timestamp = record
        .timestamp
        .as_deref()
        .and_then(parse_server_timestamp)
        .unwrap_or_else(chrono::Utc::now);

    let user = Message::restored(Role::User, record.message.clone(), timestamp);

    let sources: Vec<Source> = record
        .local_citations
        .into_iter()
        .map(Source::from)
        .collect();
    let mut assistant = Message::restored(Role::Assistant, record.local_response.clone(), timestamp);
    assistant.sources = Some(sources.clone());
    assistant.enhanced_response = Some(EnhancedResult {
        query: record.message,
        response: record.local_response,
        sources,
        metadata_context: record.metadata.unwrap_or_default(),
        web_search_eligible: false,
        preferred_sources: None,
        suggested_search_context: None,
        message_id: record.id,
    });
    if let Some(web_response) = record.web_response.filter(|_| record.is_web_enriched) {
        assistant.web_search_response =
            Some(WebEnrichmentResult::restored(web_response, record.web_citations));
    }

    (user, assistant)
}
