use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::api::types::{QueryFilters, QueryRequest, QueryResponse};
use crate::api::RagApi;
use crate::core::errors::ClientError;

use super::message::{EnhancedResult, Message, Source};
use super::mode::QueryMode;

/// Request parameters shared by every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top_k: u32,
    pub filters: Option<QueryFilters>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            filters: None,
        }
    }
}

impl QueryOptions {
    fn request(&self, query: &str) -> QueryRequest {
        QueryRequest::new(query, self.top_k, self.filters.clone())
    }
}

/// Turns one query into one assistant message.
#[async_trait]
pub trait QueryStrategy: Send + Sync {
    fn mode(&self) -> QueryMode;

    async fn execute(&self, query: &str) -> Result<Message, ClientError>;
}

pub struct BasicStrategy {
    api: Arc<dyn RagApi>,
    options: QueryOptions,
}

pub struct CombinedStrategy {
    api: Arc<dyn RagApi>,
    options: QueryOptions,
}

pub struct EnhancedStrategy {
    api: Arc<dyn RagApi>,
    options: QueryOptions,
}

fn answer_message(response: QueryResponse) -> Message {
    let sources = response.source_nodes.into_iter().map(Source::from).collect();
    Message::assistant(response.response, sources)
}

#[async_trait]
impl QueryStrategy for BasicStrategy {
    fn mode(&self) -> QueryMode {
        QueryMode::Basic
    }

    async fn execute(&self, query: &str) -> Result<Message, ClientError> {
        let response = self.api.query(&self.options.request(query), false).await?;
        Ok(answer_message(response))
    }
}

#[async_trait]
impl QueryStrategy for CombinedStrategy {
    fn mode(&self) -> QueryMode {
        QueryMode::Combined
    }

    async fn execute(&self, query: &str) -> Result<Message, ClientError> {
        let response = self.api.query(&self.options.request(query), true).await?;
        Ok(answer_message(response))
    }
}

#[async_trait]
impl QueryStrategy for EnhancedStrategy {
    fn mode(&self) -> QueryMode {
        QueryMode::Enhanced
    }

    async fn execute(&self, query: &str) -> Result<Message, ClientError> {
        let response = self.api.query_local(&self.options.request(query)).await?;
        tracing::debug!(
            "Phase 1 answered (eligible: {}, server id: {:?})",
            response.web_search_eligible,
            response.message_id
        );
        Ok(Message::enhanced(EnhancedResult::from_response(
            query, response,
        )))
    }
}

pub fn strategy_for(
    mode: QueryMode,
    api: Arc<dyn RagApi>,
    options: QueryOptions,
) -> Box<dyn QueryStrategy> {
    match mode {
        QueryMode::Basic => Box::new(BasicStrategy { api, options }),
        QueryMode::Combined => Box::new(CombinedStrategy { api, options }),
        QueryMode::Enhanced => Box::new(EnhancedStrategy { api, options }),
    }
}

/// Resolves a mode by name. Unknown names are an error, never a fallback.
pub fn strategy_for_name(
    name: &str,
    api: Arc<dyn RagApi>,
    options: QueryOptions,
) -> Result<Box<dyn QueryStrategy>, ClientError> {
    let mode = QueryMode::from_str(name)?;
    Ok(strategy_for(mode, api, options))
}
