//! Request validation.
//!
//! A request body is checked field by field in a fixed order (format, url,
//! sourceID, topsoilIdField, normalizedProperties, version) and the first
//! problem found is reported. Normalization rules are compiled last, so a
//! request that reaches the fetcher is fully typed.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::normalize::NormalizationRule;

/// The only archive format accepted.
pub const ARCHIVE_FORMAT: &str = "zip";

/// A validated archive processing request.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub archive_format: String,
    pub archive_url: String,
    pub source_id: String,
    pub topsoil_id_field: String,
    /// Output property name and the rule deriving it, in request order.
    pub normalized_properties: Vec<(String, NormalizationRule)>,
    pub version: String,
}

impl ArchiveRequest {
    /// Validate a raw request body.
    ///
    /// `accepted_source_id` is the prefix every `sourceID` must start with.
    pub fn validate(body: &Value, accepted_source_id: &str) -> Result<Self> {
        let Some(body) = body.as_object() else {
            return Err(invalid("Request body must be a JSON object !"));
        };

        let archive_format = match body.get("format").and_then(Value::as_str) {
            Some(format) if format.eq_ignore_ascii_case(ARCHIVE_FORMAT) => format.to_string(),
            _ => return Err(invalid("Archive's 'format' must be 'ZIP' !")),
        };

        let archive_url = required_str(body, "url")?;

        let source_id = required_str(body, "sourceID")?;
        if !source_id.starts_with(accepted_source_id) {
            return Err(invalid(format!(
                "sourceID: not a '{accepted_source_id}' data source !"
            )));
        }

        let topsoil_id_field = required_str(body, "topsoilIdField")?;

        let rules = match body.get("normalizedProperties") {
            None => return Err(invalid("Missing 'normalizedProperties' attribute !")),
            Some(Value::Object(rules)) => rules,
            Some(_) => return Err(invalid("'normalizedProperties' is not a dict !")),
        };

        let version = match body.get("version") {
            None | Some(Value::Null) => return Err(invalid("Missing 'version' attribute !")),
            Some(Value::String(version)) => version.clone(),
            Some(Value::Number(version)) => version.to_string(),
            Some(_) => return Err(invalid("'version' must be a string or a number !")),
        };

        let normalized_properties = rules
            .iter()
            .map(|(name, rule)| Ok((name.clone(), NormalizationRule::compile(name, rule)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            archive_format,
            archive_url,
            source_id,
            topsoil_id_field,
            normalized_properties,
            version,
        })
    }

    /// File name the archive is stored under inside the workspace.
    pub fn archive_name(&self) -> String {
        let path = self
            .archive_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        match path.rsplit('/').next() {
            Some(name) if !matches!(name, "" | "." | "..") => name.to_string(),
            _ => "archive.zip".to_string(),
        }
    }
}

fn required_str(body: &Map<String, Value>, field: &str) -> Result<String> {
    match body.get(field) {
        None | Some(Value::Null) => Err(invalid(format!("Missing '{field}' attribute !"))),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(invalid(format!("'{field}' must be a string !"))),
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    let message = message.into();
    warn!(reason = %message, "Rejecting request");
    PipelineError::Validation(message)
}
