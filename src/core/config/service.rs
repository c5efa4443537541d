use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::defaults::generate_default_config;
use super::paths::AppPaths;
use super::validation::validate_config;
use crate::api::types::QueryFilters;
use crate::chat::mode::QueryMode;
use crate::core::errors::ClientError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiSettings,
    pub query: QuerySettings,
    pub web_search: WebSearchSettings,
    pub history: HistorySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySettings {
    pub default_mode: String,
    pub top_k: u32,
    #[serde(default)]
    pub filters: Option<QueryFilters>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchSettings {
    pub max_results: u32,
    pub concise_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistorySettings {
    pub persist: bool,
    pub load_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub file: bool,
}

impl AppConfig {
    /// The configured mode. Validation has already rejected unknown names,
    /// so an error here means the config bypassed `ConfigService`.
    pub fn default_mode(&self) -> Result<QueryMode, ClientError> {
        QueryMode::from_str(&self.query.default_mode)
    }
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        self.paths.config_path.clone()
    }

    /// Defaults < `config.yml` < environment < `overrides` (CLI flags).
    pub fn load_config(&self, overrides: &Value) -> Result<AppConfig, ClientError> {
        let file_config = load_yaml_file(&self.config_path())?;
        let merged = deep_merge(&generate_default_config(), &file_config);
        let merged = deep_merge(&merged, &env_overrides());
        let merged = deep_merge(&merged, overrides);

        validate_config(&merged)?;
        serde_json::from_value(merged).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Writes the default configuration when no config file exists yet.
    pub fn ensure_config_file(&self) -> Result<bool, ClientError> {
        let path = self.config_path();
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let yaml = serde_yaml::to_string(&generate_default_config())
            .map_err(|e| ClientError::Config(e.to_string()))?;
        fs::write(&path, yaml).map_err(ClientError::storage)?;
        tracing::info!("Wrote default config to {}", path.display());
        Ok(true)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ClientError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ClientError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_yaml::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(_) => Err(ClientError::Config(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
        Err(e) => Err(ClientError::Config(format!(
            "Failed to parse {}: {}",
            path.display(),
            e
        ))),
    }
}

fn env_overrides() -> Value {
    let mut root = Map::new();

    if let Ok(url) = env::var("RAGCHAT_API_URL") {
        insert_path(&mut root, &["api", "base_url"], Value::String(url));
    }
    if let Ok(mode) = env::var("RAGCHAT_QUERY_MODE") {
        insert_path(&mut root, &["query", "default_mode"], Value::String(mode));
    }
    if let Ok(top_k) = env::var("RAGCHAT_TOP_K") {
        let value = top_k
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or(Value::String(top_k));
        insert_path(&mut root, &["query", "top_k"], value);
    }

    Value::Object(root)
}

/// Sets `value` at a dotted location, creating intermediate objects.
pub fn insert_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for key in parents {
        let entry = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        _ => override_value.clone(),
    }
}
