//! Semantic validation for parsed pipeline configuration values.

use anyhow::{bail, Result};

use crate::config::types::{PipelineConfig, StateBackendKind};
use crate::storage::Location;

fn validate_location(raw: &str, context: &str, errors: &mut Vec<String>) {
    if raw.trim().is_empty() {
        errors.push(format!("{context}: location must not be empty"));
        return;
    }
    if let Err(e) = Location::parse(raw) {
        errors.push(format!("{context}: {e}"));
    }
}

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the pipeline config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.pipeline.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    validate_location(&config.source.location, "source", &mut errors);

    if let Some(delimiter) = &config.source.delimiter {
        let mut chars = delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() && c != '"' && c != '\n' && c != '\r' => {}
            _ => errors.push(format!(
                "source: delimiter must be a single ASCII character, got '{delimiter}'"
            )),
        }
    }

    if let Some(cursor) = &config.source.cursor_field {
        if cursor.trim().is_empty() {
            errors.push("source: cursor_field must not be empty".to_string());
        }
    }

    if let Some(output) = &config.cleaned_output {
        validate_location(&output.location, "cleaned_output", &mut errors);
    }

    let dest = &config.destination;
    if dest.host.trim().is_empty() {
        errors.push("destination: host must not be empty".to_string());
    }
    if dest.database.trim().is_empty() {
        errors.push("destination: database must not be empty".to_string());
    }
    if dest.user.trim().is_empty() {
        errors.push("destination: user must not be empty".to_string());
    }
    if dest.schema.trim().is_empty() {
        errors.push("destination: schema must not be empty".to_string());
    }
    if dest.table.trim().is_empty() {
        errors.push("destination: table must not be empty".to_string());
    }
    if dest.port == 0 {
        errors.push("destination: port must be > 0".to_string());
    }

    match config.state.backend {
        StateBackendKind::ObjectStore => match &config.state.location {
            Some(location) => validate_location(location, "state", &mut errors),
            None => errors
                .push("state: backend 'object_store' requires a location".to_string()),
        },
        StateBackendKind::Sqlite => {
            if config.state.location.is_some() {
                errors.push(
                    "state: location is only valid for the 'object_store' backend".to_string(),
                );
            }
        }
    }

    if let Some(key) = &config.state.key {
        if key.trim().is_empty() {
            errors.push("state: key must not be empty".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }
}
