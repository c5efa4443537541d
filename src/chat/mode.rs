use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::ClientError;

/// How a submission reaches the backend.
///
/// - `Basic`: local knowledge base, one call
/// - `Combined`: local + web folded server-side into one answer
/// - `Enhanced`: local answer first, web enrichment on request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Basic,
    Combined,
    #[default]
    Enhanced,
}

impl QueryMode {
    pub const ALL: [QueryMode; 3] = [QueryMode::Basic, QueryMode::Combined, QueryMode::Enhanced];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryMode::Basic => "basic",
            QueryMode::Combined => "combined",
            QueryMode::Enhanced => "enhanced",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QueryMode::Basic => "Local knowledge base",
            QueryMode::Combined => "Local + web (single pass)",
            QueryMode::Enhanced => "Local first, web on demand",
        }
    }
}

impl FromStr for QueryMode {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "basic" => Ok(QueryMode::Basic),
            "combined" => Ok(QueryMode::Combined),
            "enhanced" => Ok(QueryMode::Enhanced),
            _ => Err(ClientError::UnknownMode(value.to_string())),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
