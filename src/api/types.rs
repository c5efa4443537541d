//! Request and response bodies of the query backend, field-for-field with
//! its JSON contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata filters understood by the retriever. Empty fields are left out
/// of the request body entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.platform.is_none()
            && self.tags.is_empty()
            && self.source_type.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<QueryFilters>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, top_k: u32, filters: Option<QueryFilters>) -> Self {
        Self {
            query: query.into(),
            top_k,
            filters: filters.filter(|f| !f.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Body of `/query` and `/query-combined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    #[serde(default)]
    pub source_nodes: Vec<SourceNode>,
}

/// Body of `/query-local` (phase 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalQueryResponse {
    pub response: String,
    #[serde(default)]
    pub source_nodes: Vec<SourceNode>,
    #[serde(default)]
    pub metadata_context: Map<String, Value>,
    #[serde(default)]
    pub web_search_eligible: bool,
    #[serde(default)]
    pub preferred_sources: Option<Vec<String>>,
    #[serde(default)]
    pub suggested_search_context: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Body sent to `/query-web-enrich` (phase 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEnrichmentRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    pub max_results: u32,
    pub concise_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    /// 1-based rank in the search engine's result list.
    #[serde(default)]
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEnrichmentResponse {
    #[serde(default)]
    pub synthesized_keywords: Vec<String>,
    #[serde(default)]
    pub web_search_results: Vec<WebSearchHit>,
    pub enriched_response: String,
    #[serde(default)]
    pub sources_fetched: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    /// Anything other than `healthy` is treated as degraded.
    #[serde(other)]
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    #[serde(default)]
    pub index_loaded: bool,
    #[serde(default)]
    pub index_path_exists: Option<bool>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: UserRecord,
}

/// Facets offered by `GET /filters`. Facets beyond the four known ones are
/// kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_types: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A chat exchange as stored server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChatMessage {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub message: String,
    pub local_response: String,
    #[serde(default)]
    pub local_citations: Vec<SourceNode>,
    #[serde(default)]
    pub web_response: Option<String>,
    #[serde(default)]
    pub web_citations: Vec<SourceNode>,
    #[serde(default)]
    pub is_web_enriched: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMessagesResponse {
    #[serde(default)]
    pub messages: Vec<StoredChatMessage>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMessageRequest {
    pub message: String,
    pub local_response: String,
    #[serde(default)]
    pub local_citations: Vec<SourceNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMessageResponse {
    pub message_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateWebResponseRequest {
    pub message_id: String,
    pub web_response: String,
    #[serde(default)]
    pub web_citations: Vec<SourceNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMessageResponse {
    pub message_id: String,
    pub status: String,
}

fn default_true() -> bool {
    true
}

fn default_token_type() -> String {
    "bearer".to_string()
}
