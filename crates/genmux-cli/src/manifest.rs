//! Node manifest loading
//!
//! A manifest is a JSON array of node specs:
//!
//! ```json
//! [
//!   {"name": "gpt", "kind": "openai", "endpoint": "https://api.openai.com",
//!    "credentials": "env:OPENAI_API_KEY", "weight": 2.0},
//!   {"name": "local", "kind": "ollama", "endpoint": "http://127.0.0.1:11434"}
//! ]
//! ```
//!
//! Credentials of the form `env:VAR` are read from the environment at load
//! time so secrets stay out of the file.

use anyhow::{anyhow, Context, Result};
use genmux_dispatcher::NodeSpec;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `--nodes` is not given.
pub const NODES_ENV: &str = "GENMUX_NODES";

const ENV_PREFIX: &str = "env:";

/// Picks the manifest path from the flag, falling back to `GENMUX_NODES`.
pub fn manifest_path(flag: Option<String>) -> Option<PathBuf> {
    flag.or_else(|| std::env::var(NODES_ENV).ok())
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
}

/// Reads and parses a manifest file.
pub fn load_manifest(path: &Path) -> Result<Vec<NodeSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read node manifest {}", path.display()))?;
    parse_manifest(&text).with_context(|| format!("Invalid node manifest {}", path.display()))
}

/// Parses manifest text and resolves `env:` credentials.
pub fn parse_manifest(text: &str) -> Result<Vec<NodeSpec>> {
    let mut specs: Vec<NodeSpec> =
        serde_json::from_str(text).context("Manifest must be a JSON array of nodes")?;

    for spec in &mut specs {
        if let Some(credentials) = spec.credentials.take() {
            spec.credentials = Some(resolve_credentials(&spec.name, credentials)?);
        }
    }

    Ok(specs)
}

fn resolve_credentials(node: &str, credentials: String) -> Result<String> {
    match credentials.strip_prefix(ENV_PREFIX) {
        Some(var) => std::env::var(var).map_err(|_| {
            anyhow!(
                "Credentials for node '{}' reference unset environment variable {}",
                node,
                var
            )
        }),
        None => Ok(credentials),
    }
}
