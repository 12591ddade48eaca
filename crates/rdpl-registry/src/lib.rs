mod backend;
mod backup_store;
#[cfg(any(windows, test))]
mod codec;
mod manager;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
#[cfg(windows)]
mod windows;

pub use backend::{KeyState, RegistryBackend};
pub use backup_store::BackupStore;
pub use manager::{ApplyOutcome, RegistryManager};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRegistry;
#[cfg(windows)]
pub use windows::WindowsRegistry;

#[cfg(test)]
mod tests;
