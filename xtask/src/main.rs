//! Development automation for the Rigel workspace
//!
//! Thin glue over `rigel-core`: runs tools described in a toolchain file
//! and checks that they resolve on the search path.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rigel_core::{load_toolchain_from_toml_path, run, ExecContext, SpawnOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask", about = "Rigel development automation")]
struct Cli {
    /// Path to the toolchain configuration file
    #[arg(long, default_value = "toolchain.toml")]
    config: PathBuf,

    /// Log filter level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a configured tool and forward its exit status
    Run {
        /// Tool name from the configuration
        tool: String,
        /// Extra arguments appended after the configured ones
        #[arg(trailing_var_arg = true)]
        extra: Vec<String>,
    },
    /// Check that every configured tool resolves on the search path
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    rigel_core::utils::init_tracing(&cli.log_level).context("Failed to initialize tracing")?;

    let file = load_toolchain_from_toml_path(&cli.config)
        .with_context(|| format!("Failed to load toolchain file {:?}", cli.config))?;

    match cli.command {
        Commands::Run { tool, extra } => {
            let spec = file.tool(&tool)?;
            let ctx = ExecContext::new();
            let extra_refs: Vec<&str> = extra.iter().map(String::as_str).collect();
            let cmd = ctx.command_for(spec, &extra_refs);
            let env = ctx.environment_for(spec)?;
            let cwd = spec.cwd.as_ref().map(PathBuf::from);

            let opts = SpawnOptions {
                cwd: cwd.as_deref(),
                env: env.as_ref(),
                ..Default::default()
            };
            let code = run(&cmd, &opts)?;
            if code != 0 {
                bail!("Tool '{}' exited with code {}", tool, code);
            }
            Ok(())
        }
        Commands::Check => {
            let mut ctx = ExecContext::new();
            let mut missing = 0;
            for (name, spec) in &file.tools {
                if ctx.resolves(&spec.command)? {
                    println!("ok       {} ({})", name, spec.command);
                } else {
                    println!("missing  {} ({})", name, spec.command);
                    missing += 1;
                }
            }
            if missing > 0 {
                bail!(
                    "{} configured tool(s) not found on the search path",
                    missing
                );
            }
            Ok(())
        }
    }
}
