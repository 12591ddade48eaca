use std::fmt;
use std::path::PathBuf;

use rdpl_core::Result;

/// Lifecycle state of an installed service, plus `NotInstalled` for a missing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotInstalled,
    StartPending,
    Running,
    StopPending,
    Stopped,
    Paused,
}

impl ServiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not installed",
            Self::StartPending => "start pending",
            Self::Running => "running",
            Self::StopPending => "stop pending",
            Self::Stopped => "stopped",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the service manager needs to register a new service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub executable_path: PathBuf,
    pub launch_arguments: Vec<String>,
    pub automatic_start: bool,
}

/// Opens a session with the host service control manager.
pub trait ServiceConnector {
    type Manager: ServiceManager;

    fn connect(&self) -> Result<Self::Manager>;
}

/// A connected service control manager. Dropping it closes the session.
pub trait ServiceManager {
    type Service: ServiceHandle;

    /// Returns `None` when no service with `name` is installed.
    fn open_service(&self, name: &str) -> Result<Option<Self::Service>>;

    fn create_service(&self, definition: &ServiceDefinition) -> Result<Self::Service>;
}

/// An open service handle. Dropping it closes the handle.
pub trait ServiceHandle {
    fn start(&self) -> Result<()>;

    /// Sends the stop control and returns the state reported in reply.
    fn stop(&self) -> Result<ServiceState>;

    fn query(&self) -> Result<ServiceState>;

    /// Marks the service for deletion.
    fn delete(&self) -> Result<()>;
}
