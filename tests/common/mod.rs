//! In-process mock of the query backend for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

pub const GOOD_TOKEN: &str = "good-token";

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Default)]
pub struct MockBackend {
    requests: Mutex<Vec<Recorded>>,
    health_down: Mutex<bool>,
    next_save_id: Mutex<u32>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn set_health_down(&self, down: bool) {
        *self.health_down.lock().unwrap() = down;
    }

    fn record(&self, method: &'static str, path: String, headers: &HeaderMap, body: Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(Recorded {
            method,
            path,
            authorization,
            body,
        });
    }
}

/// Binds the mock on an ephemeral port and returns its base URL.
pub async fn spawn_backend(mock: Arc<MockBackend>) -> String {
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/query", post(query))
        .route("/query-combined", post(query_combined))
        .route("/query-local", post(query_local))
        .route("/query-web-enrich", post(web_enrich))
        .route("/filters", get(filters))
        .route("/chat/messages", get(messages))
        .route("/chat/messages/:id", delete(delete_message))
        .route("/chat/save", post(save))
        .route("/chat/update-web", put(update_web))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Could not validate credentials" })),
    )
}

fn check_token(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let expected = format!("Bearer {}", GOOD_TOKEN);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(unauthorized()),
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Websters RAG API", "version": "2.0.0" }))
}

async fn health(State(mock): State<Arc<MockBackend>>) -> Reply {
    if *mock.health_down.lock().unwrap() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": "starting" })),
        ));
    }
    Ok(Json(json!({
        "status": "healthy",
        "index_loaded": true,
        "index_path_exists": true,
        "version": "2.0.0"
    })))
}

async fn login(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    mock.record("POST", "/login".into(), &headers, body.clone());
    if body["username"] == "alice" && body["password"] == "secret" {
        Ok(Json(json!({
            "access_token": GOOD_TOKEN,
            "token_type": "bearer",
            "user": { "username": "alice", "email": "alice@example.com", "is_active": true }
        })))
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Incorrect username or password" })),
        ))
    }
}

fn answer_for(body: &Value, prefix: &str) -> Reply {
    match body["query"].as_str().unwrap_or_default() {
        "explode" => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Index not loaded" })),
        )),
        "What is X" => Ok(Json(json!({ "response": "Answer", "source_nodes": [] }))),
        other => Ok(Json(json!({
            "response": format!("{} {}", prefix, other),
            "source_nodes": [
                { "text": "passage", "metadata": { "file_name": "guide.md" }, "score": 0.71 }
            ]
        }))),
    }
}

async fn query(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    mock.record("POST", "/query".into(), &headers, body.clone());
    check_token(&headers)?;
    answer_for(&body, "local:")
}

async fn query_combined(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    mock.record("POST", "/query-combined".into(), &headers, body.clone());
    check_token(&headers)?;
    answer_for(&body, "combined:")
}

async fn query_local(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    mock.record("POST", "/query-local".into(), &headers, body.clone());
    check_token(&headers)?;
    let query = body["query"].as_str().unwrap_or_default();
    let message_id = if query == "unsaved" {
        Value::Null
    } else {
        json!("m1")
    };
    Ok(Json(json!({
        "response": format!("local answer to {}", query),
        "source_nodes": [{ "text": "passage", "score": 0.5 }],
        "metadata_context": { "platforms": ["ios"] },
        "web_search_eligible": query != "ineligible",
        "preferred_sources": ["developer.apple.com"],
        "suggested_search_context": "Platforms: ios",
        "message_id": message_id
    })))
}

async fn web_enrich(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    mock.record("POST", "/query-web-enrich".into(), &headers, body.clone());
    check_token(&headers)?;
    if body["query"] == "web down" {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Web search failed: quota exceeded" })),
        ));
    }
    Ok(Json(json!({
        "synthesized_keywords": [],
        "web_search_results": [],
        "enriched_response": "Enriched",
        "sources_fetched": 0
    })))
}

async fn filters(State(mock): State<Arc<MockBackend>>, headers: HeaderMap) -> Reply {
    mock.record("GET", "/filters".into(), &headers, Value::Null);
    check_token(&headers)?;
    Ok(Json(json!({
        "categories": ["social", "video"],
        "platforms": ["ios", "android"],
        "tags": [],
        "source_types": ["pdf"],
        "regions": ["eu"]
    })))
}

async fn messages(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    mock.record("GET", "/chat/messages".into(), &headers, json!(params));
    check_token(&headers)?;
    Ok(Json(json!({
        "messages": [
            {
                "_id": "65f0c2",
                "user_id": "u1",
                "message": "What is X",
                "local_response": "Answer",
                "local_citations": [],
                "web_response": null,
                "web_citations": [],
                "is_web_enriched": false,
                "timestamp": "2024-03-01T10:15:00.123000",
                "updated_at": null,
                "metadata": null
            }
        ],
        "total": 1
    })))
}

async fn delete_message(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply {
    mock.record("DELETE", format!("/chat/messages/{}", id), &headers, Value::Null);
    check_token(&headers)?;
    if id == "missing" {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Message not found or not authorized to delete" })),
        ));
    }
    Ok(Json(json!({ "message_id": id, "status": "deleted" })))
}

async fn save(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    mock.record("POST", "/chat/save".into(), &headers, body);
    check_token(&headers)?;
    let mut next = mock.next_save_id.lock().unwrap();
    *next += 1;
    Ok(Json(json!({ "message_id": format!("saved-{}", *next), "status": "success" })))
}

async fn update_web(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    mock.record("PUT", "/chat/update-web".into(), &headers, body);
    check_token(&headers)?;
    Ok(Json(json!({ "status": "success" })))
}
