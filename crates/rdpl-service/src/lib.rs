mod control;
#[cfg(any(test, feature = "test-utils"))]
mod fake;
mod orchestrator;
mod poll;
mod undo;
#[cfg(windows)]
mod windows;

pub use control::{
    ServiceConnector, ServiceDefinition, ServiceHandle, ServiceManager, ServiceState,
};
#[cfg(any(test, feature = "test-utils"))]
pub use fake::{FakeHandle, FakeManager, FakeServices, ManualClock, StopBehaviour};
pub use orchestrator::{InstallOutcome, Orchestrator, RemoveOutcome, SERVICE_LAUNCH_ARGUMENT};
pub use poll::{wait_for_state, Clock, PollOutcome, PollPolicy, SystemClock};
pub use undo::UndoLog;
#[cfg(windows)]
pub use windows::{WindowsService, WindowsServiceConnector, WindowsServiceManager};
