mod common;

use std::sync::Arc;

use ragchat::api::types::{
    HealthState, QueryFilters, QueryRequest, SaveMessageRequest, UpdateWebResponseRequest,
    WebEnrichmentRequest,
};
use ragchat::api::{HttpRagClient, RagApi};
use ragchat::core::errors::ClientError;
use ragchat::session::SessionStore;

use common::{spawn_backend, MockBackend, GOOD_TOKEN};

struct Fixture {
    mock: Arc<MockBackend>,
    client: HttpRagClient,
    dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let mock = Arc::new(MockBackend::default());
    let base_url = spawn_backend(mock.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let session = SessionStore::hydrate(dir.path().join("session.json"));
    Fixture {
        mock,
        client: HttpRagClient::new(format!("{}/", base_url), session),
        dir,
    }
}

async fn logged_in() -> Fixture {
    let fixture = fixture().await;
    fixture.client.login("alice", "secret").await.unwrap();
    fixture
}

#[tokio::test]
async fn health_and_banner_need_no_token() {
    let f = fixture().await;

    let health = f.client.health_check().await.unwrap();
    assert_eq!(health.status, HealthState::Healthy);
    assert!(health.index_loaded);
    assert_eq!(health.version.as_deref(), Some("2.0.0"));

    let info = f.client.service_info().await.unwrap();
    assert_eq!(info.message, "Websters RAG API");
}

#[tokio::test]
async fn unhealthy_status_is_a_network_error() {
    let f = fixture().await;
    f.mock.set_health_down(true);

    let err = f.client.health_check().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn login_persists_session_and_sends_bearer_token() {
    let f = fixture().await;
    let session = f.client.login("alice", "secret").await.unwrap();
    assert_eq!(session.user.username, "alice");
    assert!(f.dir.path().join("session.json").exists());

    // A fresh store over the same file sees the session.
    let restored = SessionStore::hydrate(f.dir.path().join("session.json"));
    assert_eq!(restored.token().as_deref(), Some(GOOD_TOKEN));

    let response = f
        .client
        .query(&QueryRequest::new("What is X", 5, None), false)
        .await
        .unwrap();
    assert_eq!(response.response, "Answer");
    assert!(response.source_nodes.is_empty());

    let sent = f.mock.requests_to("/query");
    assert_eq!(
        sent[0].authorization.as_deref(),
        Some(format!("Bearer {}", GOOD_TOKEN).as_str())
    );
    assert_eq!(sent[0].body["top_k"], 5);
    assert!(sent[0].body.get("filters").is_none());
}

#[tokio::test]
async fn rejected_credentials_do_not_touch_the_stored_session() {
    let f = logged_in().await;

    let err = f.client.login("alice", "wrong").await.unwrap_err();

    assert!(matches!(err, ClientError::Http { status: 401, .. }));
    assert!(f.client.session().is_authenticated());
    assert!(f.dir.path().join("session.json").exists());
}

#[tokio::test]
async fn web_search_flag_selects_combined_endpoint() {
    let f = logged_in().await;
    let filters = QueryFilters {
        platform: Some("ios".into()),
        tags: vec!["privacy".into()],
        ..Default::default()
    };

    let combined = f
        .client
        .query(&QueryRequest::new("tracking", 3, Some(filters)), true)
        .await
        .unwrap();

    assert_eq!(combined.response, "combined: tracking");
    assert_eq!(combined.source_nodes[0].score, Some(0.71));
    let sent = f.mock.requests_to("/query-combined");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body["filters"]["platform"], "ios");
    assert_eq!(sent[0].body["filters"]["tags"][0], "privacy");
    assert!(sent[0].body["filters"].get("category").is_none());
    assert!(f.mock.requests_to("/query").is_empty());
}

#[tokio::test]
async fn unauthorized_protected_call_clears_session() {
    let f = fixture().await;
    // Simulate a stale token from an earlier run.
    std::fs::write(
        f.dir.path().join("session.json"),
        r#"{"token":"stale","user":{"username":"alice"}}"#,
    )
    .unwrap();
    let session = SessionStore::hydrate(f.dir.path().join("session.json"));
    assert!(session.is_authenticated());
    let client = HttpRagClient::new(f.client.base_url(), session.clone());

    let err = client
        .query_local(&QueryRequest::new("q", 5, None))
        .await
        .unwrap_err();

    assert!(err.is_authentication());
    assert!(!session.is_authenticated());
    assert!(!f.dir.path().join("session.json").exists());
    assert_eq!(
        f.mock.requests_to("/query-local")[0].authorization.as_deref(),
        Some("Bearer stale")
    );
}

#[tokio::test]
async fn server_detail_is_carried_in_http_errors() {
    let f = logged_in().await;

    let err = f
        .client
        .query(&QueryRequest::new("explode", 5, None), false)
        .await
        .unwrap_err();

    match err {
        ClientError::Http { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "Index not loaded");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(f.client.session().is_authenticated());
}

#[tokio::test]
async fn two_phase_round_trip() {
    let f = logged_in().await;

    let local = f
        .client
        .query_local(&QueryRequest::new("privacy labels", 5, None))
        .await
        .unwrap();
    assert!(local.web_search_eligible);
    assert_eq!(local.message_id.as_deref(), Some("m1"));
    assert_eq!(local.preferred_sources.as_deref(), Some(&["developer.apple.com".to_string()][..]));

    let enriched = f
        .client
        .web_search_explicit(&WebEnrichmentRequest {
            query: "privacy labels".into(),
            message_id: local.message_id.clone(),
            local_context: local.suggested_search_context.clone(),
            preferred_sources: local.preferred_sources.clone(),
            keywords: None,
            max_results: 5,
            concise_mode: true,
        })
        .await
        .unwrap();
    assert_eq!(enriched.enriched_response, "Enriched");
    assert_eq!(enriched.sources_fetched, 0);

    let body = &f.mock.requests_to("/query-web-enrich")[0].body;
    assert_eq!(body["message_id"], "m1");
    assert_eq!(body["local_context"], "Platforms: ios");
    assert_eq!(body["max_results"], 5);
    assert!(body.get("keywords").is_none());
}

#[tokio::test]
async fn filters_keep_unknown_facets() {
    let f = logged_in().await;

    let options = f.client.get_filters().await.unwrap();

    assert_eq!(options.categories, vec!["social", "video"]);
    assert!(options.tags.is_empty());
    assert_eq!(options.extra["regions"][0], "eu");
}

#[tokio::test]
async fn chat_history_endpoints() {
    let f = logged_in().await;

    let page = f.client.get_messages(20, 40).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.messages[0].id.as_deref(), Some("65f0c2"));
    assert!(!page.messages[0].is_web_enriched);
    let params = &f.mock.requests_to("/chat/messages")[0].body;
    assert_eq!(params["limit"], "20");
    assert_eq!(params["offset"], "40");

    let saved = f
        .client
        .save_message(&SaveMessageRequest {
            message: "q".into(),
            local_response: "a".into(),
            local_citations: vec![],
            metadata: None,
        })
        .await
        .unwrap();
    assert_eq!(saved.message_id, "saved-1");

    f.client
        .update_web_response(&UpdateWebResponseRequest {
            message_id: saved.message_id.clone(),
            web_response: "w".into(),
            web_citations: vec![],
        })
        .await
        .unwrap();
    let update = &f.mock.requests_to("/chat/update-web")[0];
    assert_eq!(update.method, "PUT");
    assert_eq!(update.body["message_id"], "saved-1");

    let deleted = f.client.delete_message("65f0c2").await.unwrap();
    assert_eq!(deleted.status, "deleted");

    let err = f.client.delete_message("missing").await.unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 404, .. }));
}
