// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `swan-exec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "swan-exec",
    version,
    about = "Run commands and benchmark services locally or in Kubernetes pods.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Swan.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SWAN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Execute a shell command, wait for it and print its output.
    Run {
        #[arg(long, value_enum, default_value_t = Backend::Local)]
        backend: Backend,

        /// Stop the command if it runs longer than this (e.g. "30s").
        #[arg(long, value_name = "DURATION")]
        timeout: Option<String>,

        /// Keep the captured output directory instead of erasing it.
        #[arg(long)]
        keep_output: bool,

        /// The command to run. One argument is a whole shell line; several
        /// are quoted and passed as separate words.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Launch a service workload and keep it up until Ctrl-C.
    Launch {
        #[arg(value_enum)]
        workload: Workload,

        #[arg(long, value_enum, default_value_t = Backend::Local)]
        backend: Backend,
    },

    /// Validate the config and print the commands that would run.
    DryRun,
}

/// Where commands are executed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Local,
    Kubernetes,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Workload {
    Redis,
    Memcached,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_trailing_command() {
        let args = CliArgs::try_parse_from([
            "swan-exec", "run", "--timeout", "5s", "--", "echo", "-n", "hi",
        ])
        .unwrap();

        match args.command {
            CliCommand::Run {
                backend,
                timeout,
                keep_output,
                command,
            } => {
                assert_eq!(backend, Backend::Local);
                assert_eq!(timeout.as_deref(), Some("5s"));
                assert!(!keep_output);
                assert_eq!(command, vec!["echo", "-n", "hi"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn launch_accepts_backend_flag() {
        let args = CliArgs::try_parse_from([
            "swan-exec",
            "launch",
            "memcached",
            "--backend",
            "kubernetes",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(matches!(
            args.command,
            CliCommand::Launch {
                workload: Workload::Memcached,
                backend: Backend::Kubernetes,
            }
        ));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
