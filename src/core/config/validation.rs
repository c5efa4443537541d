use std::str::FromStr;

use serde_json::{Map, Value};

use crate::chat::mode::QueryMode;
use crate::core::errors::ClientError;

pub fn validate_config(config: &Value) -> Result<(), ClientError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(api) = expect_optional_object(root, "api")? {
        validate_base_url_field(api, "api.base_url", "base_url")?;
    }

    if let Some(query) = expect_optional_object(root, "query")? {
        validate_mode_field(query, "query.default_mode", "default_mode")?;
        validate_u64_field(query, "query.top_k", "top_k", 1, 50)?;

        if let Some(filters) = expect_optional_object(query, "filters")? {
            validate_optional_string_field(filters, "query.filters.category", "category")?;
            validate_optional_string_field(filters, "query.filters.platform", "platform")?;
            validate_optional_string_field(filters, "query.filters.source_type", "source_type")?;
            validate_string_array_field(filters, "query.filters.tags", "tags")?;
        }
    }

    if let Some(web) = expect_optional_object(root, "web_search")? {
        validate_u64_field(web, "web_search.max_results", "max_results", 1, 20)?;
        validate_bool_field(web, "web_search.concise_mode", "concise_mode")?;
    }

    if let Some(history) = expect_optional_object(root, "history")? {
        validate_bool_field(history, "history.persist", "persist")?;
        validate_u64_field(history, "history.load_limit", "load_limit", 1, 500)?;
    }

    if let Some(logging) = expect_optional_object(root, "logging")? {
        validate_optional_string_field(logging, "logging.level", "level")?;
        validate_bool_field(logging, "logging.file", "file")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ClientError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_base_url_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ClientError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    let text = text.trim();
    if !(text.starts_with("http://") || text.starts_with("https://")) {
        return Err(ClientError::Config(format!(
            "Invalid config at '{}': expected an http(s) URL, got '{}'",
            path, text
        )));
    }
    Ok(())
}

fn validate_mode_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ClientError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    QueryMode::from_str(text).map_err(|_| {
        ClientError::Config(format!(
            "Invalid config at '{}': unknown query mode '{}' (expected one of {})",
            path,
            text,
            QueryMode::ALL
                .iter()
                .map(|mode| mode.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;
    Ok(())
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ClientError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ClientError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ClientError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ClientError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ClientError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ClientError::Config(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ClientError {
    ClientError::Config(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
