//! Query catalog loading.
//!
//! The catalog is a JSON array maintained by the teams that consume the
//! exports. Field names are PascalCase because existing catalogs use them.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use lawex_scheduler::QueryDefinition;

use crate::config::Config;
use crate::error::JobError;

/// One catalog entry as written in the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogEntry {
    pub query_name: String,
    pub query_version: String,
    #[serde(rename = "QueryDurationInMins", default, deserialize_with = "duration_minutes")]
    pub duration_minutes: u32,
    pub query: String,
    #[serde(default)]
    pub destination_storage_location: Option<String>,
}

/// Accepts a number, a numeric string or null.
fn duration_minutes<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Raw::Number(n)) => Ok(n),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(0),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid duration '{}'", s))),
    }
}

/// Parse catalog text into query definitions with tokens substituted.
pub fn parse_catalog(text: &str, config: &Config) -> Result<Vec<QueryDefinition>, String> {
    let entries: Vec<CatalogEntry> =
        serde_json::from_str(text).map_err(|e| format!("malformed JSON: {}", e))?;

    let mut seen = HashSet::new();
    let mut queries = Vec::with_capacity(entries.len());

    for entry in entries {
        let query = QueryDefinition::new(
            entry.query_name,
            entry.query_version,
            entry.duration_minutes,
            config.env_specific(&entry.query),
            entry
                .destination_storage_location
                .map(|d| config.env_specific(&d)),
        );

        if query.name.is_empty() {
            return Err("entry with empty QueryName".to_string());
        }
        if query.version.is_empty() {
            return Err(format!("query '{}' has an empty QueryVersion", query.name));
        }
        // Names map to containers, which are lower-case.
        if !seen.insert(query.name.to_lowercase()) {
            return Err(format!("duplicate query name '{}'", query.name));
        }

        debug!(
            query = %query.name,
            version = %query.version,
            duration_minutes = query.duration_minutes,
            destination_override = ?query.destination_override,
            "loaded query"
        );
        queries.push(query);
    }

    Ok(queries)
}

/// Load the catalog file.
pub fn load_catalog(path: &Path, config: &Config) -> Result<Vec<QueryDefinition>, JobError> {
    let catalog_error = |reason: String| JobError::Catalog {
        path: path.display().to_string(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| catalog_error(e.to_string()))?;
    let queries = parse_catalog(&text, config).map_err(catalog_error)?;

    info!(path = %path.display(), count = queries.len(), "loaded query catalog");
    Ok(queries)
}
