//! YAML settings loader with `${VAR}` substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::MsaConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let replaced = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| {
            missing.push(cap[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }
    Ok(replaced.into_owned())
}

/// Parse and validate a settings document.
///
/// # Errors
///
/// Returns an error if substitution fails, the YAML is invalid, or a value
/// is out of range.
pub fn parse_config_str(yaml_str: &str) -> Result<MsaConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: MsaConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse msarrow settings YAML")?;
    config.validate().context("Invalid msarrow settings")?;
    Ok(config)
}

/// Read, parse and validate a settings file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_config(path: &Path) -> Result<MsaConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    parse_config_str(&content)
}
