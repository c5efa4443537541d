//! In-process stand-in for the backend, used by the chat tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::api::types::{
    DeleteMessageResponse, FilterOptions, GetMessagesResponse, HealthState, HealthStatus,
    LocalQueryResponse, QueryRequest, QueryResponse, SaveMessageRequest, SaveMessageResponse,
    ServiceInfo, UpdateWebResponseRequest, UserRecord, WebEnrichmentRequest,
    WebEnrichmentResponse,
};
use crate::api::RagApi;
use crate::core::errors::ClientError;
use crate::session::Session;

type Queue<T> = Mutex<VecDeque<Result<T, ClientError>>>;

/// Answers each endpoint from its own queue, in push order. An empty queue
/// answers with a network error. Calls are recorded for later assertions.
#[derive(Default)]
pub struct ScriptedApi {
    health: Queue<HealthStatus>,
    query: Queue<QueryResponse>,
    local: Queue<LocalQueryResponse>,
    web: Queue<WebEnrichmentResponse>,
    filters: Queue<FilterOptions>,
    messages: Queue<GetMessagesResponse>,
    saves: Queue<SaveMessageResponse>,
    updates: Queue<()>,
    deletes: Queue<DeleteMessageResponse>,
    query_calls: Mutex<Vec<(QueryRequest, bool)>>,
    local_calls: Mutex<Vec<QueryRequest>>,
    web_calls: Mutex<Vec<WebEnrichmentRequest>>,
    save_calls: Mutex<Vec<SaveMessageRequest>>,
    update_calls: Mutex<Vec<UpdateWebResponseRequest>>,
    delete_calls: Mutex<Vec<String>>,
    message_calls: Mutex<Vec<(u32, u32)>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

fn pop<T>(queue: &Queue<T>, endpoint: &str) -> Result<T, ClientError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ClientError::Network(format!("no scripted {endpoint} response"))))
}

fn record<T>(calls: &Mutex<Vec<T>>, call: T) {
    calls.lock().unwrap().push(call);
}

pub fn healthy() -> HealthStatus {
    HealthStatus {
        status: HealthState::Healthy,
        index_loaded: true,
        index_path_exists: Some(true),
        version: Some("2.0.0".into()),
    }
}

impl ScriptedApi {
    /// Makes query, local, web and history-page calls wait until [`ScriptedApi::release`]
    /// hands out a permit.
    pub fn hold_requests(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, count: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(count);
        }
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    pub fn push_health(&self, response: Result<HealthStatus, ClientError>) {
        self.health.lock().unwrap().push_back(response);
    }

    pub fn push_query(&self, response: Result<QueryResponse, ClientError>) {
        self.query.lock().unwrap().push_back(response);
    }

    pub fn push_local(&self, response: Result<LocalQueryResponse, ClientError>) {
        self.local.lock().unwrap().push_back(response);
    }

    pub fn push_web(&self, response: Result<WebEnrichmentResponse, ClientError>) {
        self.web.lock().unwrap().push_back(response);
    }

    pub fn push_filters(&self, response: Result<FilterOptions, ClientError>) {
        self.filters.lock().unwrap().push_back(response);
    }

    pub fn push_messages(&self, response: Result<GetMessagesResponse, ClientError>) {
        self.messages.lock().unwrap().push_back(response);
    }

    pub fn push_save(&self, response: Result<SaveMessageResponse, ClientError>) {
        self.saves.lock().unwrap().push_back(response);
    }

    pub fn push_update(&self, response: Result<(), ClientError>) {
        self.updates.lock().unwrap().push_back(response);
    }

    pub fn push_delete(&self, response: Result<DeleteMessageResponse, ClientError>) {
        self.deletes.lock().unwrap().push_back(response);
    }

    pub fn query_calls(&self) -> Vec<(QueryRequest, bool)> {
        self.query_calls.lock().unwrap().clone()
    }

    pub fn local_calls(&self) -> Vec<QueryRequest> {
        self.local_calls.lock().unwrap().clone()
    }

    pub fn web_calls(&self) -> Vec<WebEnrichmentRequest> {
        self.web_calls.lock().unwrap().clone()
    }

    pub fn save_calls(&self) -> Vec<SaveMessageRequest> {
        self.save_calls.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> Vec<UpdateWebResponseRequest> {
        self.update_calls.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }

    pub fn message_calls(&self) -> Vec<(u32, u32)> {
        self.message_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RagApi for ScriptedApi {
    async fn health_check(&self) -> Result<HealthStatus, ClientError> {
        pop(&self.health, "health")
    }

    async fn service_info(&self) -> Result<ServiceInfo, ClientError> {
        Ok(ServiceInfo {
            message: "scripted".into(),
            version: Some("2.0.0".into()),
        })
    }

    async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        if password.is_empty() {
            return Err(ClientError::Http {
                status: 401,
                detail: "Incorrect username or password".into(),
            });
        }
        Ok(Session {
            token: format!("token-{username}"),
            token_type: "bearer".into(),
            user: UserRecord {
                username: username.into(),
                email: None,
                is_active: true,
            },
            logged_in_at: chrono::Utc::now(),
        })
    }

    async fn query(
        &self,
        request: &QueryRequest,
        use_web_search: bool,
    ) -> Result<QueryResponse, ClientError> {
        record(&self.query_calls, (request.clone(), use_web_search));
        self.pass_gate().await;
        pop(&self.query, "query")
    }

    async fn query_local(&self, request: &QueryRequest) -> Result<LocalQueryResponse, ClientError> {
        record(&self.local_calls, request.clone());
        self.pass_gate().await;
        pop(&self.local, "query-local")
    }

    async fn web_search_explicit(
        &self,
        request: &WebEnrichmentRequest,
    ) -> Result<WebEnrichmentResponse, ClientError> {
        record(&self.web_calls, request.clone());
        self.pass_gate().await;
        pop(&self.web, "web enrichment")
    }

    async fn get_filters(&self) -> Result<FilterOptions, ClientError> {
        pop(&self.filters, "filters")
    }

    async fn get_messages(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<GetMessagesResponse, ClientError> {
        record(&self.message_calls, (limit, offset));
        self.pass_gate().await;
        pop(&self.messages, "messages")
    }

    async fn save_message(
        &self,
        request: &SaveMessageRequest,
    ) -> Result<SaveMessageResponse, ClientError> {
        record(&self.save_calls, request.clone());
        pop(&self.saves, "save")
    }

    async fn update_web_response(
        &self,
        request: &UpdateWebResponseRequest,
    ) -> Result<(), ClientError> {
        record(&self.update_calls, request.clone());
        pop(&self.updates, "update-web")
    }

    async fn delete_message(&self, message_id: &str) -> Result<DeleteMessageResponse, ClientError> {
        record(&self.delete_calls, message_id.to_string());
        pop(&self.deletes, "delete")
    }
}
