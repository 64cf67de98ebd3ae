//! Configuration loading from disk.
//!
//! `${VAR}` and `${VAR:-default}` placeholders are replaced from the process
//! environment before the document is parsed. Comment lines are left as is,
//! and a placeholder never spans lines.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("environment variable '{0}' is not set and has no default")]
    MissingVariable(String),
    #[error("unterminated placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Interpolate, parse and validate a TOML document.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let expanded = interpolate(content, |name| std::env::var(name).ok())?;
    let config: GatewayConfig = toml::from_str(&expanded)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Replace `${NAME}` / `${NAME:-default}` using `lookup`.
pub fn interpolate<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut offset = 0;

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            out.push_str(line);
        } else {
            interpolate_line(line, offset, &lookup, &mut out)?;
        }
        offset += line.len();
    }
    Ok(out)
}

fn interpolate_line<F>(line: &str, offset: usize, lookup: &F, out: &mut String) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rest = line;
    let mut offset = offset;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or(ConfigError::UnterminatedPlaceholder(offset + start))?;
        let expr = &after[..end];

        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (expr.trim(), None),
        };
        match lookup(name).filter(|v| !v.is_empty()) {
            Some(value) => out.push_str(&value),
            None => match default {
                Some(default) => out.push_str(default),
                None => return Err(ConfigError::MissingVariable(name.to_string())),
            },
        }

        let consumed = start + 2 + end + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(())
}
