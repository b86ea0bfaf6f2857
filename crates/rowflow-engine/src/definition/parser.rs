//! Graph definition YAML parsing with environment variable
//! substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use rowflow_types::GraphDefinition;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error listing every referenced environment variable that
/// is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                missing.push(var_name.to_string());
            }
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result)
}

/// Parse a graph definition YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is
/// invalid.
pub fn parse_graph_str(yaml_str: &str) -> Result<GraphDefinition> {
    let substituted = substitute_env_vars(yaml_str)?;
    let definition: GraphDefinition =
        serde_yaml::from_str(&substituted).context("Failed to parse graph definition YAML")?;
    Ok(definition)
}

/// Parse a graph definition YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_graph(path: &Path) -> Result<GraphDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph definition file: {}", path.display()))?;
    parse_graph_str(&content)
}
