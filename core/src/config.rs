//! Toolchain configuration
//!
//! External tools are described in a TOML file: each `[tools.<name>]`
//! table names a command plus optional fixed arguments, environment
//! overrides and a working directory. Loading is strict: unknown fields
//! are rejected by serde and semantic problems are reported with the
//! full field path so a bad file points at its own mistake.

use crate::{CoreError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Parsed toolchain file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainFile {
    #[serde(default)]
    pub tools: BTreeMap<String, ToolSpec>,
}

/// One configured external tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    /// Program name or path, resolved through the system search path
    pub command: String,
    /// Fixed arguments always passed before any caller-supplied ones
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied at spawn time
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory for the tool, if different from the caller's
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ToolchainFile {
    /// Look up a tool by name.
    pub fn tool(&self, name: &str) -> Result<&ToolSpec> {
        self.tools.get(name).ok_or_else(|| {
            CoreError::ConfigurationError(format!("tools.{}: no such tool configured", name))
        })
    }
}

/// Load and validate a toolchain file from disk.
pub fn load_toolchain_from_toml_path(path: &Path) -> Result<ToolchainFile> {
    debug!("Loading toolchain configuration from {:?}", path);
    let text = std::fs::read_to_string(path)?;
    load_toolchain_from_toml_str(&text)
}

/// Parse and validate toolchain TOML.
pub fn load_toolchain_from_toml_str(text: &str) -> Result<ToolchainFile> {
    let file: ToolchainFile = toml::from_str(text).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to parse toolchain TOML: {}", e))
    })?;
    validate(&file)?;
    debug!(
        "Loaded toolchain configuration with {} tool(s)",
        file.tools.len()
    );
    Ok(file)
}

fn validate(file: &ToolchainFile) -> Result<()> {
    for (name, tool) in &file.tools {
        if name.trim().is_empty() {
            return Err(CoreError::ConfigurationError(
                "tools: tool name must not be empty".to_string(),
            ));
        }
        if tool.command.trim().is_empty() {
            return Err(CoreError::ConfigurationError(format!(
                "tools.{}.command: must not be empty",
                name
            )));
        }
        for key in tool.env.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(CoreError::ConfigurationError(format!(
                    "tools.{}.env: invalid variable name {:?}",
                    name, key
                )));
            }
        }
        if let Some(cwd) = &tool.cwd {
            if cwd.trim().is_empty() {
                return Err(CoreError::ConfigurationError(format!(
                    "tools.{}.cwd: must not be empty when present",
                    name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_toolchain() {
        let toml = r#"
            [tools.cc]
            command = "clang"
            args = ["-Wall"]
        "#;
        let file = load_toolchain_from_toml_str(toml).unwrap();
        let tool = file.tool("cc").unwrap();
        assert_eq!(tool.command, "clang");
        assert_eq!(tool.args, vec!["-Wall"]);
        assert!(tool.env.is_empty());
        assert!(tool.cwd.is_none());
    }

    #[test]
    fn test_load_full_tool_entry() {
        let toml = r#"
            [tools.build]
            command = "make"
            args = ["-j4"]
            cwd = "/tmp/project"

            [tools.build.env]
            CC = "clang"
        "#;
        let file = load_toolchain_from_toml_str(toml).unwrap();
        let tool = file.tool("build").unwrap();
        assert_eq!(tool.cwd.as_deref(), Some("/tmp/project"));
        assert_eq!(tool.env.get("CC").map(String::as_str), Some("clang"));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let toml = r#"
            [tools.cc]
            command = "  "
        "#;
        match load_toolchain_from_toml_str(toml).unwrap_err() {
            CoreError::ConfigurationError(msg) => {
                assert!(msg.contains("tools.cc.command"));
            }
            e => panic!("Expected ConfigurationError, got: {}", e),
        }
    }

    #[test]
    fn test_env_key_with_equals_is_rejected() {
        let toml = r#"
            [tools.cc]
            command = "clang"

            [tools.cc.env]
            "BAD=KEY" = "x"
        "#;
        match load_toolchain_from_toml_str(toml).unwrap_err() {
            CoreError::ConfigurationError(msg) => {
                assert!(msg.contains("tools.cc.env"));
            }
            e => panic!("Expected ConfigurationError, got: {}", e),
        }
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let toml = r#"
            [tools.cc]
            command = "clang"
            nonsense = true
        "#;
        assert!(load_toolchain_from_toml_str(toml).is_err());
    }

    #[test]
    fn test_unknown_tool_lookup() {
        let file = load_toolchain_from_toml_str("").unwrap();
        match file.tool("missing").unwrap_err() {
            CoreError::ConfigurationError(msg) => {
                assert!(msg.contains("tools.missing"));
            }
            e => panic!("Expected ConfigurationError, got: {}", e),
        }
    }
}
