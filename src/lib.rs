// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod isolation;
pub mod logging;
pub mod workloads;

use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{Backend, CliArgs, CliCommand, Workload};
use crate::config::duration::parse_duration;
use crate::config::{ConfigFile, default_config_path, load_and_validate, load_or_default};
use crate::executor::{Executor, HandleRef, KubernetesExecutor, LocalExecutor};
use crate::workloads::{Launcher, Memcached, Redis};

/// High-level entry point used by `main.rs`.
///
/// Returns the process exit code: the task's own exit code for `run`, `0`
/// otherwise.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => load_or_default(default_config_path())?,
    };

    match args.command {
        CliCommand::Run {
            backend,
            timeout,
            keep_output,
            command,
        } => {
            let timeout = timeout
                .as_deref()
                .map(parse_duration)
                .transpose()
                .map_err(anyhow::Error::msg)
                .context("parsing --timeout")?;
            let executor = build_executor(&cfg, backend)?;
            run_command(executor.as_ref(), &shell_line(&command), timeout, keep_output).await
        }
        CliCommand::Launch { workload, backend } => {
            let executor = build_executor(&cfg, backend)?;
            let launcher = build_launcher(&cfg, workload, executor);
            hold_workload(launcher.as_ref()).await?;
            Ok(0)
        }
        CliCommand::DryRun => {
            print_dry_run(&cfg)?;
            Ok(0)
        }
    }
}

/// Executor for `backend`, configured from `cfg`.
pub fn build_executor(cfg: &ConfigFile, backend: Backend) -> Result<Arc<dyn Executor>> {
    let executor: Arc<dyn Executor> = match backend {
        Backend::Local => Arc::new(
            LocalExecutor::isolated(cfg.isolation.decorators()?).with_config(cfg.local.clone()),
        ),
        Backend::Kubernetes => Arc::new(
            KubernetesExecutor::from_config(cfg.kubernetes.clone())?
                .with_output_dir(cfg.local.output_dir.clone())
                .with_start_check(cfg.local.start_check),
        ),
    };
    Ok(executor)
}

/// Shell line for `run`'s trailing arguments.
///
/// A single argument is used verbatim, so `run 'a | b'` keeps its shell
/// syntax. Several arguments are single-quoted where needed so each reaches
/// the command as one word.
pub fn shell_line(args: &[String]) -> String {
    match args {
        [line] => line.clone(),
        _ => args
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_./=:,+-@%".contains(c);
    if !arg.is_empty() && arg.chars().all(safe) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

fn build_launcher(
    cfg: &ConfigFile,
    workload: Workload,
    executor: Arc<dyn Executor>,
) -> Box<dyn Launcher> {
    match workload {
        Workload::Redis => Box::new(Redis::new(executor, cfg.redis.clone())),
        Workload::Memcached => Box::new(Memcached::new(executor, cfg.memcached.clone())),
    }
}

async fn run_command(
    executor: &dyn Executor,
    command: &str,
    timeout: Option<std::time::Duration>,
    keep_output: bool,
) -> Result<i32> {
    let task = executor.execute(command).await?;

    if !task.wait(timeout).await? {
        warn!(command, ?timeout, "command did not finish in time; stopping it");
        task.stop().await?;
    }

    copy_output(&task)?;
    let exit_code = task.exit_code()?;
    info!(command, exit_code, "command finished");

    if keep_output {
        info!(command, "keeping captured output");
    } else {
        task.erase_output()?;
    }
    Ok(exit_code)
}

fn copy_output(task: &HandleRef) -> Result<()> {
    let mut buf = Vec::new();

    task.stdout_file()?.read_to_end(&mut buf)?;
    io::stdout().write_all(&buf)?;

    buf.clear();
    task.stderr_file()?.read_to_end(&mut buf)?;
    io::stderr().write_all(&buf)?;
    Ok(())
}

/// Launch, then keep the workload alive until Ctrl-C or until it dies.
async fn hold_workload(launcher: &dyn Launcher) -> Result<()> {
    let task = launcher.launch().await?;
    info!(
        workload = launcher.name(),
        address = %task.address(),
        "workload running; press Ctrl-C to stop"
    );

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("listening for Ctrl-C")?;
            info!(workload = launcher.name(), "stopping workload");
        }
        res = task.wait(None) => {
            res?;
            warn!(
                workload = launcher.name(),
                exit_code = task.exit_code().unwrap_or(-1),
                "workload exited on its own"
            );
        }
    }

    let stopped = task.stop().await;
    task.erase_output()?;
    stopped?;
    Ok(())
}

/// Print the validated config and rendered commands without executing.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    let decorators = cfg.isolation.decorators()?;
    let placeholder: Arc<dyn Executor> = Arc::new(LocalExecutor::isolated(decorators.clone()));

    println!("swan-exec dry-run");
    println!("  local.output_dir = {}", cfg.local.output_dir.display());
    println!("  local.start_check = {:?}", cfg.local.start_check);
    println!("  local.stop_grace = {:?}", cfg.local.stop_grace);
    println!("  isolation decorators = {}", decorators.len());
    println!(
        "  kubernetes = {} (namespace {}, image {})",
        cfg.kubernetes.api_server, cfg.kubernetes.namespace, cfg.kubernetes.container_image
    );
    println!();

    let redis = Redis::new(Arc::clone(&placeholder), cfg.redis.clone());
    let memcached = Memcached::new(placeholder, cfg.memcached.clone());
    println!("workloads:");
    println!("  - {}", redis.name());
    println!("      cmd: {}", decorators.decorate(&redis.command()));
    println!("  - {}", memcached.name());
    println!("      cmd: {}", decorators.decorate(&memcached.command()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(args: &[&str]) -> String {
        shell_line(&args.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn single_argument_keeps_shell_syntax() {
        assert_eq!(line(&["sleep 1; exit 3"]), "sleep 1; exit 3");
    }

    #[test]
    fn several_arguments_are_quoted_word_by_word() {
        assert_eq!(line(&["echo", "-n", "a=b"]), "echo -n a=b");
        assert_eq!(
            line(&["sh", "-c", "sleep 1; exit 7"]),
            "sh -c 'sleep 1; exit 7'"
        );
        assert_eq!(line(&["printf", "it's", ""]), r"printf 'it'\''s' ''");
    }
}
