use serde_json::{json, Value};

pub const DEFAULT_API_URL: &str = "http://localhost:8001";
pub const DEFAULT_TOP_K: u64 = 5;
pub const DEFAULT_WEB_MAX_RESULTS: u64 = 5;
pub const DEFAULT_HISTORY_LIMIT: u64 = 50;

pub fn generate_default_config() -> Value {
    json!({
        "api": {
            "base_url": DEFAULT_API_URL
        },
        "query": {
            "default_mode": "enhanced",
            "top_k": DEFAULT_TOP_K
        },
        "web_search": {
            "max_results": DEFAULT_WEB_MAX_RESULTS,
            "concise_mode": true
        },
        "history": {
            "persist": true,
            "load_limit": DEFAULT_HISTORY_LIMIT
        },
        "logging": {
            "level": "info",
            "file": true
        }
    })
}
