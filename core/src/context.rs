//! Caller-owned execution context
//!
//! Path lookups go through an external resolver process, so repeated
//! checks for the same program are worth caching. The cache lives in an
//! explicit context owned by the caller; there is no process-global
//! state, and two contexts never share answers.

use crate::config::ToolSpec;
use crate::{path_search, CommandBuf, EnvironmentBuf, Result};
use std::collections::HashMap;
use tracing::debug;

/// Execution context: a path-lookup cache plus tool-spec factories
#[derive(Debug, Default)]
pub struct ExecContext {
    resolved: HashMap<String, bool>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `program` resolves on the search path.
    ///
    /// The first answer per program is cached for the lifetime of the
    /// context; a tool installed or removed afterwards is not observed.
    pub fn resolves(&mut self, program: &str) -> Result<bool> {
        if let Some(&found) = self.resolved.get(program) {
            debug!("Path lookup cache hit for '{}': {}", program, found);
            return Ok(found);
        }
        let found = path_search::is_in_path(program)?;
        self.resolved.insert(program.to_string(), found);
        Ok(found)
    }

    /// Build the argv for a configured tool: the command, its fixed
    /// arguments, then any caller-supplied extras.
    pub fn command_for(&self, tool: &ToolSpec, extra: &[&str]) -> CommandBuf {
        let arena_bytes = tool.command.len()
            + tool.args.iter().map(String::len).sum::<usize>()
            + extra.iter().map(|a| a.len()).sum::<usize>();
        let mut cmd = CommandBuf::with_capacity(arena_bytes, 1 + tool.args.len() + extra.len());
        cmd.append(&[tool.command.as_str()]);
        for arg in &tool.args {
            cmd.append(&[arg.as_str()]);
        }
        cmd.append(extra);
        cmd
    }

    /// Build the environment override for a configured tool.
    ///
    /// Returns `None` when the tool declares no overrides, so the child
    /// inherits the parent environment untouched.
    pub fn environment_for(&self, tool: &ToolSpec) -> Result<Option<EnvironmentBuf>> {
        if tool.env.is_empty() {
            return Ok(None);
        }
        let arena_bytes = tool.env.iter().map(|(k, v)| k.len() + v.len()).sum();
        let mut env = EnvironmentBuf::with_capacity(arena_bytes, tool.env.len());
        for (key, value) in &tool.env {
            env.add(key, value)?;
        }
        Ok(Some(env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_toolchain_from_toml_str;

    fn sample_tool() -> crate::config::ToolchainFile {
        load_toolchain_from_toml_str(
            r#"
            [tools.cc]
            command = "clang"
            args = ["-Wall", "-O2"]

            [tools.cc.env]
            LANG = "C"
        "#,
        )
        .unwrap()
    }

    #[test]
    fn test_command_for_appends_extras_last() {
        let file = sample_tool();
        let ctx = ExecContext::new();
        let cmd = ctx.command_for(file.tool("cc").unwrap(), &["-c", "main.c"]);

        let args: Vec<_> = cmd.iter().collect();
        assert_eq!(args, vec!["clang", "-Wall", "-O2", "-c", "main.c"]);
    }

    #[test]
    fn test_environment_for_absent_when_empty() {
        let file = load_toolchain_from_toml_str(
            r#"
            [tools.plain]
            command = "true"
        "#,
        )
        .unwrap();
        let ctx = ExecContext::new();
        let env = ctx.environment_for(file.tool("plain").unwrap()).unwrap();
        assert!(env.is_none());
    }

    #[test]
    fn test_environment_for_carries_overrides() {
        let file = sample_tool();
        let ctx = ExecContext::new();
        let env = ctx
            .environment_for(file.tool("cc").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(env.get("LANG"), Some("C"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolves_caches_per_context() {
        let mut ctx = ExecContext::new();
        assert!(ctx.resolves("sh").unwrap());
        // second call is served from the cache
        assert!(ctx.resolves("sh").unwrap());
        assert_eq!(ctx.resolved.len(), 1);

        assert!(!ctx.resolves("rigel_no_such_program_9871").unwrap());
        assert_eq!(ctx.resolved.len(), 2);
    }
}
