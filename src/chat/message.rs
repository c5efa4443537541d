use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::api::types::{LocalQueryResponse, SourceNode, WebEnrichmentResponse, WebSearchHit};

pub const WEB_SOURCE_TYPE: &str = "web_search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A retrieved passage attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub text: String,
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Source {
    pub fn is_web(&self) -> bool {
        ["source_type", "source_origin"].iter().any(|key| {
            self.metadata.get(*key).and_then(Value::as_str) == Some(WEB_SOURCE_TYPE)
        })
    }

    /// Citation links of a web-derived source.
    pub fn web_links(&self) -> Vec<String> {
        if let Some(links) = self.metadata.get("web_links").and_then(Value::as_array) {
            return links
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        self.metadata
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(|url| vec![url.to_string()])
            .unwrap_or_default()
    }

    /// A short human name for the source, if its metadata carries one.
    pub fn title(&self) -> Option<&str> {
        ["title", "file_name", "source", "datatype"]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(Value::as_str))
            .filter(|title| !title.is_empty())
    }

    pub fn to_node(&self) -> SourceNode {
        SourceNode {
            text: self.text.clone(),
            metadata: if self.metadata.is_empty() {
                None
            } else {
                Some(self.metadata.clone())
            },
            score: self.score,
        }
    }
}

impl From<SourceNode> for Source {
    fn from(node: SourceNode) -> Self {
        Source {
            text: node.text,
            score: node.score.map(|s| s.clamp(0.0, 1.0)),
            metadata: node.metadata.unwrap_or_default(),
        }
    }
}

/// Phase-1 answer, kept whole on the message so phase 2 can be issued later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedResult {
    /// The question that produced this answer.
    pub query: String,
    pub response: String,
    pub sources: Vec<Source>,
    pub metadata_context: Map<String, Value>,
    pub web_search_eligible: bool,
    pub preferred_sources: Option<Vec<String>>,
    pub suggested_search_context: Option<String>,
    /// Server-side record id, used to attach the enrichment to the same record.
    pub message_id: Option<String>,
}

impl EnhancedResult {
    pub fn from_response(query: impl Into<String>, response: LocalQueryResponse) -> Self {
        EnhancedResult {
            query: query.into(),
            response: response.response,
            sources: response.source_nodes.into_iter().map(Source::from).collect(),
            metadata_context: response.metadata_context,
            web_search_eligible: response.web_search_eligible,
            preferred_sources: response.preferred_sources.filter(|s| !s.is_empty()),
            suggested_search_context: response.suggested_search_context,
            message_id: response.message_id.filter(|id| !id.is_empty()),
        }
    }

    /// Context handed to phase 2: the server's suggestion when it made one,
    /// otherwise the local answer itself.
    pub fn local_context(&self) -> Option<String> {
        self.suggested_search_context
            .clone()
            .filter(|ctx| !ctx.trim().is_empty())
            .or_else(|| Some(self.response.clone()).filter(|r| !r.trim().is_empty()))
    }
}

/// Phase-2 result. `sources_fetched` never exceeds the number of hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEnrichmentResult {
    pub synthesized_keywords: Vec<String>,
    pub web_search_results: Vec<WebSearchHit>,
    pub enriched_response: String,
    pub sources_fetched: usize,
}

impl From<WebEnrichmentResponse> for WebEnrichmentResult {
    fn from(response: WebEnrichmentResponse) -> Self {
        let reported = response.sources_fetched as usize;
        let available = response.web_search_results.len();
        if reported > available {
            tracing::warn!(
                "Backend reported {} fetched sources for {} results; clamping",
                reported,
                available
            );
        }
        WebEnrichmentResult {
            synthesized_keywords: response.synthesized_keywords,
            web_search_results: response.web_search_results,
            enriched_response: response.enriched_response,
            sources_fetched: reported.min(available),
        }
    }
}

impl WebEnrichmentResult {
    /// Web hits as citation sources, in the same shape the backend stores
    /// them when it persists an enrichment.
    pub fn citations(&self) -> Vec<Source> {
        self.web_search_results.iter().map(web_citation).collect()
    }

    /// Rebuilds an enrichment from a stored record's web answer and citations.
    pub fn restored(enriched_response: impl Into<String>, citations: Vec<SourceNode>) -> Self {
        let web_search_results: Vec<WebSearchHit> = citations
            .into_iter()
            .enumerate()
            .map(|(index, node)| hit_from_citation(index, Source::from(node)))
            .collect();
        WebEnrichmentResult {
            synthesized_keywords: Vec::new(),
            sources_fetched: web_search_results.len(),
            web_search_results,
            enriched_response: enriched_response.into(),
        }
    }
}

fn hit_from_citation(index: usize, source: Source) -> WebSearchHit {
    let field = |key: &str| {
        source
            .metadata
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let position = source
        .metadata
        .get("position")
        .and_then(Value::as_u64)
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(index as u32 + 1);
    let snippet = match field("snippet") {
        s if s.is_empty() => source.text.clone(),
        s => s,
    };

    WebSearchHit {
        title: field("title"),
        link: source.web_links().into_iter().next().unwrap_or_default(),
        snippet,
        position,
    }
}

fn web_citation(hit: &WebSearchHit) -> Source {
    let text = if hit.title.is_empty() {
        format!("{}\nURL: {}", hit.snippet, hit.link)
    } else {
        format!("{}\n\nSource: {}\nURL: {}", hit.snippet, hit.title, hit.link)
    };

    let metadata = json!({
        "source_type": WEB_SOURCE_TYPE,
        "source_origin": WEB_SOURCE_TYPE,
        "url": hit.link,
        "title": hit.title,
        "position": hit.position,
        "snippet": hit.snippet,
        "web_links": [hit.link],
    });

    Source {
        text,
        score: Some((1.0 - f64::from(hit.position) / 10.0).clamp(0.0, 1.0)),
        metadata: match metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sources: Option<Vec<Source>>,
    pub enhanced_response: Option<EnhancedResult>,
    pub web_search_response: Option<WebEnrichmentResult>,
    pub is_web_search_loading: bool,
    pub show_web_search_button: bool,
    /// Last failed enrichment attempt for this message.
    #[serde(default)]
    pub web_search_error: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Message {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp,
            sources: None,
            enhanced_response: None,
            web_search_response: None,
            is_web_search_loading: false,
            show_web_search_button: false,
            web_search_error: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, Utc::now())
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Source>) -> Self {
        let mut message = Self::new(Role::Assistant, content, Utc::now());
        message.sources = Some(sources);
        message
    }

    /// Phase-1 answer. The web-search action is offered only when the
    /// backend marked the answer eligible.
    pub fn enhanced(result: EnhancedResult) -> Self {
        let mut message = Self::assistant(result.response.clone(), result.sources.clone());
        message.show_web_search_button = result.web_search_eligible;
        message.enhanced_response = Some(result);
        message
    }

    /// A message rebuilt from server-side history.
    pub fn restored(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(role, content, timestamp)
    }

    pub fn can_request_web_search(&self) -> bool {
        self.enhanced_response
            .as_ref()
            .is_some_and(|result| result.web_search_eligible)
            && self.show_web_search_button
            && !self.is_web_search_loading
    }

    pub fn server_id(&self) -> Option<&str> {
        self.enhanced_response
            .as_ref()
            .and_then(|result| result.message_id.as_deref())
    }
}

/// Field updates for an existing message. Identity fields (`id`, `role`,
/// `timestamp`) have no slot here, so an update can never change them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub sources: Option<Vec<Source>>,
    pub web_search_response: Option<WebEnrichmentResult>,
    pub is_web_search_loading: Option<bool>,
    pub show_web_search_button: Option<bool>,
    pub web_search_error: Option<Option<String>>,
}

impl MessagePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn web_search_response(mut self, result: WebEnrichmentResult) -> Self {
        self.web_search_response = Some(result);
        self
    }

    pub fn web_search_loading(mut self, loading: bool) -> Self {
        self.is_web_search_loading = Some(loading);
        self
    }

    pub fn show_web_search_button(mut self, show: bool) -> Self {
        self.show_web_search_button = Some(show);
        self
    }

    pub fn web_search_error(mut self, error: Option<String>) -> Self {
        self.web_search_error = Some(error);
        self
    }

    pub fn apply_to(self, message: &mut Message) {
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(sources) = self.sources {
            message.sources = Some(sources);
        }
        if let Some(result) = self.web_search_response {
            message.web_search_response = Some(result);
        }
        if let Some(loading) = self.is_web_search_loading {
            message.is_web_search_loading = loading;
        }
        if let Some(show) = self.show_web_search_button {
            message.show_web_search_button = show;
        }
        if let Some(error) = self.web_search_error {
            message.web_search_error = error;
        }
    }
}

/// Time-ordered unique id.
pub fn new_message_id() -> String {
    Uuid::now_v7().to_string()
}

/// Parses server timestamps: RFC 3339, or naive ISO-8601 taken as UTC.
pub fn parse_server_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
