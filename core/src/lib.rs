//! Core functionality for the Rigel build tool
//!
//! This crate contains the cross-platform process execution and I/O
//! redirection subsystem shared by the bootstrap tool and its automation
//! tasks: argument and environment buffers, anonymous pipes, process
//! spawning with two platform backends, lifecycle management, and PATH
//! lookup delegation.

pub mod cmdline;
pub mod command;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod path_search;
pub mod pipe;
pub mod process;
pub mod winpath;

pub use command::CommandBuf;
pub use config::{load_toolchain_from_toml_path, load_toolchain_from_toml_str, ToolSpec, ToolchainFile};
pub use context::ExecContext;
pub use environment::EnvironmentBuf;
pub use error::{CoreError, Result};
pub use path_search::is_in_path;
pub use pipe::{Pipe, PipeReader, PipeWriter};
pub use process::{
    run, spawn, wait_many, Child, Redirect, SpawnOptions, TimedWait, EXIT_ABNORMAL,
    EXIT_WAIT_FAILED,
};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::Other(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
