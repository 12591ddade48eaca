use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rdpl_core::{BackupSet, Error, Result, ServiceConfig};
use rdpl_registry::{BackupStore, RegistryBackend, RegistryManager};
use tracing::{error, info, warn};

use crate::{
    wait_for_state, Clock, PollOutcome, PollPolicy, ServiceConnector, ServiceDefinition,
    ServiceHandle, ServiceManager, ServiceState, SystemClock, UndoLog,
};

/// Argument the service manager passes to the registered executable.
pub const SERVICE_LAUNCH_ARGUMENT: &str = "run";

#[derive(Debug)]
pub struct InstallOutcome {
    pub executable: PathBuf,
    pub backups: usize,
    pub started: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct RemoveOutcome {
    pub stopped: bool,
    pub warnings: Vec<String>,
}

/// Drives install, remove, start and stop of one service together with its registry
/// footprint.
pub struct Orchestrator<C, R, K = SystemClock> {
    connector: C,
    registry: R,
    clock: K,
    config: ServiceConfig,
    policy: PollPolicy,
    executable: Option<PathBuf>,
    launch_arguments: Vec<String>,
}

impl<C, R> Orchestrator<C, R, SystemClock>
where
    C: ServiceConnector,
    R: RegistryBackend,
{
    pub fn new(connector: C, registry: R, config: ServiceConfig) -> Self {
        Self::with_clock(connector, registry, SystemClock, config)
    }
}

impl<C, R, K> Orchestrator<C, R, K>
where
    C: ServiceConnector,
    R: RegistryBackend,
    K: Clock,
{
    pub fn with_clock(connector: C, registry: R, clock: K, config: ServiceConfig) -> Self {
        Self {
            connector,
            registry,
            clock,
            config,
            policy: PollPolicy::default(),
            executable: None,
            launch_arguments: vec![SERVICE_LAUNCH_ARGUMENT.to_string()],
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers `path` instead of the running executable.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Replaces the arguments the service is registered with. The first one should be
    /// [`SERVICE_LAUNCH_ARGUMENT`].
    pub fn with_launch_arguments(mut self, arguments: Vec<String>) -> Self {
        self.launch_arguments = arguments;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    fn registry(&self) -> RegistryManager<'_, R> {
        RegistryManager::new(&self.registry, self.config.catalog())
    }

    fn resolve_executable(&self) -> Result<PathBuf> {
        match &self.executable {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe()
                .map_err(|err| Error::io("failed to resolve the running executable", err)),
        }
    }

    /// Applies the registry catalog and registers the service.
    ///
    /// Any failure before the service exists unwinds the registry changes from the
    /// backups captured in this call, and the data directory when this call created it.
    /// A directory that already holds files, such as the service log, is left in place.
    /// A failed first start is only a warning.
    pub fn install(&self, name: &str, description: &str) -> Result<InstallOutcome> {
        let executable = self.resolve_executable()?;
        info!(name, path = %executable.display(), "installing service");

        let registry = self.registry();
        let mut undo = UndoLog::new();
        let mut warnings = Vec::new();

        let data_directory = self.config.data_directory.clone();
        if !data_directory.is_dir() {
            fs::create_dir_all(&data_directory).map_err(|err| {
                Error::io(
                    format!(
                        "failed to create data directory {}",
                        data_directory.display()
                    ),
                    err,
                )
            })?;
            info!(path = %data_directory.display(), "created data directory");
            undo.push("remove data directory", move || {
                remove_dir_if_empty(&data_directory)
            });
        }

        let applied = registry.apply_all();
        match &applied.error {
            Some(err) => {
                warn!(error = %err, "registry entries partially applied");
                warnings.push(format!("registry entries partially applied: {err}"));
            }
            None => info!(count = applied.backups.len(), "registry entries applied"),
        }
        let backup_count = applied.backups.len();
        let backups = applied.backups;
        undo.push("revert registry entries", move || registry.revert(&backups));

        let manager = match self.connector.connect() {
            Ok(manager) => manager,
            Err(err) => return Err(abort(undo, err)),
        };
        match manager.open_service(name) {
            Ok(None) => {}
            Ok(Some(_existing)) => {
                return Err(abort(undo, Error::AlreadyExists(name.to_string())));
            }
            Err(err) => return Err(abort(undo, err)),
        }

        let definition = ServiceDefinition {
            name: name.to_string(),
            display_name: name.to_string(),
            description: description.to_string(),
            executable_path: executable.clone(),
            launch_arguments: self.launch_arguments.clone(),
            automatic_start: true,
        };
        let service = match manager.create_service(&definition) {
            Ok(service) => service,
            Err(err @ (Error::Creation(_) | Error::AlreadyExists(_))) => {
                return Err(abort(undo, err));
            }
            Err(err) => return Err(abort(undo, Error::Creation(err.to_string()))),
        };
        undo.commit();
        info!(name, "service created");

        let started = match service.start() {
            Ok(()) => {
                info!(name, "service started");
                true
            }
            Err(err) => {
                warn!(name, error = %err, "service installed but failed to start");
                warnings.push(format!("service installed but failed to start: {err}"));
                false
            }
        };

        Ok(InstallOutcome {
            executable,
            backups: backup_count,
            started,
            warnings,
        })
    }

    /// Stops and deletes the service, then reverts the registry.
    ///
    /// Only a failure to delete the service definition is returned; everything else is
    /// reported as a warning.
    pub fn remove(&self, name: &str) -> Result<RemoveOutcome> {
        info!(name, "removing service");
        let mut warnings = Vec::new();

        let manager = self.connector.connect()?;
        let service = open_existing(&manager, name)?;

        let stopped = self.stop_best_effort(name, &service, &mut warnings);

        service.delete()?;
        drop(service);
        drop(manager);
        info!(name, "service deleted");

        if let Err(err) = self.registry().remove_all() {
            warn!(error = %err, "registry cleanup incomplete");
            warnings.push(format!("registry cleanup incomplete: {err}"));
        }

        Ok(RemoveOutcome { stopped, warnings })
    }

    fn stop_best_effort<S: ServiceHandle>(
        &self,
        name: &str,
        service: &S,
        warnings: &mut Vec<String>,
    ) -> bool {
        let initial = match service.stop() {
            Ok(state) => state,
            Err(err) => {
                warn!(name, error = %err, "failed to send stop control");
                warnings.push(format!("failed to send stop control: {err}"));
                match service.query() {
                    Ok(state) => state,
                    Err(err) => {
                        warn!(name, error = %err, "failed to query service state");
                        warnings.push(format!("failed to query service state: {err}"));
                        return false;
                    }
                }
            }
        };

        match wait_for_state(
            service,
            &self.clock,
            initial,
            ServiceState::Stopped,
            self.policy,
        ) {
            Ok(PollOutcome::Reached) => {
                info!(name, "service stopped");
                true
            }
            Ok(PollOutcome::TimedOut { last }) => {
                warn!(
                    name,
                    state = %last,
                    deadline = ?self.policy.deadline,
                    "service did not stop in time, deleting anyway"
                );
                warnings.push(format!(
                    "service did not stop within {:?} (last state: {last})",
                    self.policy.deadline
                ));
                false
            }
            Err(err) => {
                warn!(name, error = %err, "failed to poll service state");
                warnings.push(format!("failed to poll service state: {err}"));
                false
            }
        }
    }

    pub fn start(&self, name: &str) -> Result<()> {
        let manager = self.connector.connect()?;
        let service = open_existing(&manager, name)?;
        service.start()?;
        info!(name, "service started");
        Ok(())
    }

    /// Sends the stop control and waits for `Stopped`, failing with `Timeout` once the
    /// poll deadline passes.
    pub fn stop(&self, name: &str) -> Result<()> {
        let manager = self.connector.connect()?;
        let service = open_existing(&manager, name)?;
        let initial = service.stop()?;
        match wait_for_state(
            &service,
            &self.clock,
            initial,
            ServiceState::Stopped,
            self.policy,
        )? {
            PollOutcome::Reached => {
                info!(name, "service stopped");
                Ok(())
            }
            PollOutcome::TimedOut { last } => {
                error!(name, state = %last, "service did not stop in time");
                Err(Error::Timeout {
                    service: name.to_string(),
                    deadline: self.policy.deadline,
                })
            }
        }
    }

    pub fn status(&self, name: &str) -> Result<ServiceState> {
        let manager = self.connector.connect()?;
        match manager.open_service(name)? {
            Some(service) => service.query(),
            None => Ok(ServiceState::NotInstalled),
        }
    }

    pub fn backup_store(&self) -> BackupStore {
        BackupStore::new(self.config.catalog().backup_path)
    }

    pub fn show_backups(&self) -> Result<BackupSet> {
        self.backup_store().load()
    }

    /// Re-applies the saved originals without deleting the backup file or pruning keys.
    pub fn restore_backups(&self) -> Result<usize> {
        let registry = self.registry();
        let backups = registry.backup_store().load()?;
        info!(count = backups.len(), "restoring registry backups");
        registry.restore(&backups)?;
        Ok(backups.len())
    }
}

fn open_existing<M: ServiceManager>(manager: &M, name: &str) -> Result<M::Service> {
    manager
        .open_service(name)?
        .ok_or_else(|| Error::NotFound(format!("service {name}")))
}

fn abort(undo: UndoLog<'_>, err: Error) -> Error {
    error!(error = %err, steps = undo.len(), "install failed, rolling back");
    let failures = undo.rollback();
    if !failures.is_empty() {
        error!(failures = failures.len(), "rollback left changes behind");
    }
    err
}

fn remove_dir_if_empty(path: &Path) -> Result<()> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            let non_empty = fs::read_dir(path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            if non_empty {
                warn!(path = %path.display(), "data directory not empty, leaving it in place");
                Ok(())
            } else {
                Err(Error::io(
                    format!("failed to remove data directory {}", path.display()),
                    err,
                ))
            }
        }
    }
}
