use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rdpl_core::{ServiceConfig, SERVICE_DESCRIPTION, SERVICE_NAME};
use rdpl_registry::RegistryBackend;
use rdpl_service::{Clock, Orchestrator, ServiceConnector, SERVICE_LAUNCH_ARGUMENT};
use tracing::{debug, error};

use crate::completion::write_completions_script;
use crate::logging::init_logging;
use crate::render::{
    format_backup_lines, format_install_outcome_lines, format_remove_outcome_lines,
    format_status_line, render_status_line, TerminalRenderer,
};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        command,
    } = cli;

    if let Commands::Completions { shell } = command {
        let mut stdout = io::stdout().lock();
        return write_completions_script(shell, &mut stdout);
    }

    let config_path = config_path
        .map(|path| std::path::absolute(&path).unwrap_or(path));
    let config = ServiceConfig::load(config_path.as_deref())
        .context("failed to load configuration")?;
    init_logging(&config)?;
    debug!(
        command = command.name(),
        environment = config.environment.as_str(),
        port = config.server_port,
        data_directory = %config.data_directory.display(),
        "configuration loaded"
    );

    let result = match command {
        Commands::Run => run_service_host(&config),
        command => {
            let renderer = TerminalRenderer::current();
            run_platform_command(config, config_path.as_deref(), &command, renderer)
                .map(|lines| renderer.print_lines(&lines))
        }
    };
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "command failed");
    }
    result
}

#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn launch_arguments(config_path: Option<&Path>) -> Vec<String> {
    let mut arguments = vec![SERVICE_LAUNCH_ARGUMENT.to_string()];
    if let Some(path) = config_path {
        arguments.push("--config".to_string());
        arguments.push(path.display().to_string());
    }
    arguments
}

#[cfg(windows)]
fn run_platform_command(
    config: ServiceConfig,
    config_path: Option<&Path>,
    command: &Commands,
    renderer: TerminalRenderer,
) -> Result<Vec<String>> {
    use rdpl_registry::WindowsRegistry;
    use rdpl_service::WindowsServiceConnector;

    let orchestrator = Orchestrator::new(WindowsServiceConnector, WindowsRegistry::new(), config)
        .with_launch_arguments(launch_arguments(config_path));
    execute_command(&orchestrator, command, renderer)
}

#[cfg(not(windows))]
fn run_platform_command(
    _config: ServiceConfig,
    _config_path: Option<&Path>,
    command: &Commands,
    _renderer: TerminalRenderer,
) -> Result<Vec<String>> {
    Err(rdpl_core::Error::Unsupported(command.name()).into())
}

#[cfg(windows)]
fn run_service_host(config: &ServiceConfig) -> Result<()> {
    crate::host::run(config)
}

#[cfg(not(windows))]
fn run_service_host(_config: &ServiceConfig) -> Result<()> {
    Err(rdpl_core::Error::Unsupported("the service host").into())
}

/// Runs one service management command and returns the lines to print.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn execute_command<C, R, K>(
    orchestrator: &Orchestrator<C, R, K>,
    command: &Commands,
    renderer: TerminalRenderer,
) -> Result<Vec<String>>
where
    C: ServiceConnector,
    R: RegistryBackend,
    K: Clock,
{
    let style = renderer.style();
    match command {
        Commands::Install => {
            let outcome = orchestrator
                .install(SERVICE_NAME, SERVICE_DESCRIPTION)
                .with_context(|| format!("failed to install service {SERVICE_NAME}"))?;
            Ok(format_install_outcome_lines(SERVICE_NAME, &outcome, style))
        }
        Commands::Remove => {
            let wait = renderer.start_wait(&format!("removing {SERVICE_NAME}"));
            let result = orchestrator.remove(SERVICE_NAME);
            match &result {
                Ok(_) => wait.finish_success(),
                Err(_) => wait.finish_abandon(),
            }
            let outcome =
                result.with_context(|| format!("failed to remove service {SERVICE_NAME}"))?;
            Ok(format_remove_outcome_lines(SERVICE_NAME, &outcome, style))
        }
        Commands::Start => {
            orchestrator
                .start(SERVICE_NAME)
                .with_context(|| format!("failed to start service {SERVICE_NAME}"))?;
            Ok(vec![render_status_line(
                style,
                "ok",
                &format!("started service {SERVICE_NAME}"),
            )])
        }
        Commands::Stop => {
            let wait = renderer.start_wait(&format!("stopping {SERVICE_NAME}"));
            let result = orchestrator.stop(SERVICE_NAME);
            match &result {
                Ok(()) => wait.finish_success(),
                Err(_) => wait.finish_abandon(),
            }
            result.with_context(|| format!("failed to stop service {SERVICE_NAME}"))?;
            Ok(vec![render_status_line(
                style,
                "ok",
                &format!("stopped service {SERVICE_NAME}"),
            )])
        }
        Commands::Status => {
            let state = orchestrator
                .status(SERVICE_NAME)
                .with_context(|| format!("failed to query service {SERVICE_NAME}"))?;
            Ok(vec![format_status_line(SERVICE_NAME, state, style)])
        }
        Commands::ShowBackups => {
            let store = orchestrator.backup_store();
            let backups = store.load().with_context(|| {
                format!("failed to read registry backup {}", store.path().display())
            })?;
            Ok(format_backup_lines(&backups, style))
        }
        Commands::RestoreBackups => {
            let path: PathBuf = orchestrator.backup_store().path().to_path_buf();
            let restored = orchestrator
                .restore_backups()
                .with_context(|| format!("failed to restore registry backup {}", path.display()))?;
            Ok(vec![render_status_line(
                style,
                "ok",
                &format!(
                    "restored {restored} registry entries from {}",
                    path.display()
                ),
            )])
        }
        Commands::Run | Commands::Completions { .. } => {
            bail!("{} is not a service management command", command.name())
        }
    }
}
