use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{
    DeleteMessageResponse, FilterOptions, GetMessagesResponse, HealthStatus, LocalQueryResponse,
    LoginRequest, LoginResponse, QueryRequest, QueryResponse, SaveMessageRequest,
    SaveMessageResponse, ServiceInfo, UpdateWebResponseRequest, WebEnrichmentRequest,
    WebEnrichmentResponse,
};
use crate::core::errors::ClientError;
use crate::session::{Session, SessionStore};

/// Operations offered by the query backend.
///
/// Protected operations fail with [`ClientError::Authentication`] on a 401,
/// after the implementation has discarded the persisted session.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// unauthenticated; non-2xx is reported as a network error
    async fn health_check(&self) -> Result<HealthStatus, ClientError>;

    async fn service_info(&self) -> Result<ServiceInfo, ClientError>;

    /// exchange credentials for a bearer token and persist the session
    async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError>;

    /// single-shot answer; `use_web_search` selects `/query-combined`
    async fn query(
        &self,
        request: &QueryRequest,
        use_web_search: bool,
    ) -> Result<QueryResponse, ClientError>;

    /// phase 1: local knowledge base only
    async fn query_local(&self, request: &QueryRequest) -> Result<LocalQueryResponse, ClientError>;

    /// phase 2: web enrichment of an earlier answer
    async fn web_search_explicit(
        &self,
        request: &WebEnrichmentRequest,
    ) -> Result<WebEnrichmentResponse, ClientError>;

    async fn get_filters(&self) -> Result<FilterOptions, ClientError>;

    async fn get_messages(&self, limit: u32, offset: u32)
        -> Result<GetMessagesResponse, ClientError>;

    async fn save_message(
        &self,
        request: &SaveMessageRequest,
    ) -> Result<SaveMessageResponse, ClientError>;

    async fn update_web_response(&self, request: &UpdateWebResponseRequest)
        -> Result<(), ClientError>;

    async fn delete_message(&self, message_id: &str) -> Result<DeleteMessageResponse, ClientError>;
}

#[derive(Clone)]
pub struct HttpRagClient {
    base_url: String,
    client: Client,
    session: SessionStore,
}

impl HttpRagClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a protected request and applies the uniform 401 policy.
    async fn send_protected(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(ClientError::network)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("Backend rejected credentials; clearing session");
            self.session.logout();
            return Err(ClientError::Authentication);
        }

        ensure_success(response).await
    }

    async fn get_protected<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        tracing::debug!("GET {}", path);
        let response = self.send_protected(self.client.get(self.url(path))).await?;
        response.json::<T>().await.map_err(ClientError::decode)
    }

    async fn post_protected<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {}", path);
        let response = self
            .send_protected(self.client.post(self.url(path)).json(body))
            .await?;
        response.json::<T>().await.map_err(ClientError::decode)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::from_status(status, &body))
}

#[async_trait]
impl RagApi for HttpRagClient {
    async fn health_check(&self) -> Result<HealthStatus, ClientError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(ClientError::network)?;

        if !response.status().is_success() {
            return Err(ClientError::Network(format!(
                "health check failed: {}",
                response.status()
            )));
        }

        response
            .json::<HealthStatus>()
            .await
            .map_err(ClientError::network)
    }

    async fn service_info(&self) -> Result<ServiceInfo, ClientError> {
        let response = self
            .client
            .get(self.url("/"))
            .send()
            .await
            .map_err(ClientError::network)?;
        let response = ensure_success(response).await?;
        response.json().await.map_err(ClientError::decode)
    }

    async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url("/login"))
            .json(&body)
            .send()
            .await
            .map_err(ClientError::network)?;

        // A 401 here is a credential rejection; the stored session is untouched.
        let response = ensure_success(response).await?;
        let login: LoginResponse = response.json().await.map_err(ClientError::decode)?;

        let session = Session::from(login);
        self.session.login(session.clone())?;
        Ok(session)
    }

    async fn query(
        &self,
        request: &QueryRequest,
        use_web_search: bool,
    ) -> Result<QueryResponse, ClientError> {
        let path = if use_web_search {
            "/query-combined"
        } else {
            "/query"
        };
        self.post_protected(path, request).await
    }

    async fn query_local(&self, request: &QueryRequest) -> Result<LocalQueryResponse, ClientError> {
        self.post_protected("/query-local", request).await
    }

    async fn web_search_explicit(
        &self,
        request: &WebEnrichmentRequest,
    ) -> Result<WebEnrichmentResponse, ClientError> {
        self.post_protected("/query-web-enrich", request).await
    }

    async fn get_filters(&self) -> Result<FilterOptions, ClientError> {
        self.get_protected("/filters").await
    }

    async fn get_messages(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<GetMessagesResponse, ClientError> {
        self.get_protected(&format!(
            "/chat/messages?limit={}&offset={}",
            limit, offset
        ))
        .await
    }

    async fn save_message(
        &self,
        request: &SaveMessageRequest,
    ) -> Result<SaveMessageResponse, ClientError> {
        self.post_protected("/chat/save", request).await
    }

    async fn update_web_response(
        &self,
        request: &UpdateWebResponseRequest,
    ) -> Result<(), ClientError> {
        tracing::debug!("PUT /chat/update-web");
        self.send_protected(self.client.put(self.url("/chat/update-web")).json(request))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<DeleteMessageResponse, ClientError> {
        let path = format!("/chat/messages/{}", urlencoding::encode(message_id));
        tracing::debug!("DELETE {}", path);
        let response = self
            .send_protected(self.client.delete(self.url(&path)))
            .await?;
        response.json().await.map_err(ClientError::decode)
    }
}
