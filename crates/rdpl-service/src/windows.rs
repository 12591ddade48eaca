use std::ffi::{OsStr, OsString};

use rdpl_core::{Error, Result};
use tracing::warn;
use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType,
    ServiceState as NativeState, ServiceType,
};
use windows_service::service_manager::{
    ServiceManager as NativeManager, ServiceManagerAccess,
};

use crate::{ServiceConnector, ServiceDefinition, ServiceHandle, ServiceManager, ServiceState};

const ERROR_ACCESS_DENIED: i32 = 5;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_SERVICE_EXISTS: i32 = 1073;

fn os_error(err: &windows_service::Error) -> Option<i32> {
    match err {
        windows_service::Error::Winapi(io) => io.raw_os_error(),
        _ => None,
    }
}

fn classify(err: windows_service::Error, name: &str) -> Error {
    match os_error(&err) {
        Some(ERROR_ACCESS_DENIED) => Error::Permission(format!("service {name}")),
        Some(ERROR_SERVICE_DOES_NOT_EXIST) => Error::NotFound(format!("service {name}")),
        _ => Error::ServiceControl(format!("{name}: {err}")),
    }
}

fn service_access() -> ServiceAccess {
    ServiceAccess::QUERY_STATUS | ServiceAccess::START | ServiceAccess::STOP | ServiceAccess::DELETE
}

/// Connects to the local service control manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsServiceConnector;

impl ServiceConnector for WindowsServiceConnector {
    type Manager = WindowsServiceManager;

    fn connect(&self) -> Result<WindowsServiceManager> {
        let access = ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE;
        NativeManager::local_computer(None::<&str>, access)
            .map(|inner| WindowsServiceManager { inner })
            .map_err(|err| match os_error(&err) {
                Some(ERROR_ACCESS_DENIED) => {
                    Error::Permission("service control manager".to_string())
                }
                _ => Error::Connection(err.to_string()),
            })
    }
}

pub struct WindowsServiceManager {
    inner: NativeManager,
}

impl ServiceManager for WindowsServiceManager {
    type Service = WindowsService;

    fn open_service(&self, name: &str) -> Result<Option<WindowsService>> {
        match self.inner.open_service(name, service_access()) {
            Ok(inner) => Ok(Some(WindowsService {
                inner,
                name: name.to_string(),
            })),
            Err(err) if os_error(&err) == Some(ERROR_SERVICE_DOES_NOT_EXIST) => Ok(None),
            Err(err) => Err(classify(err, name)),
        }
    }

    fn create_service(&self, definition: &ServiceDefinition) -> Result<WindowsService> {
        let info = ServiceInfo {
            name: OsString::from(&definition.name),
            display_name: OsString::from(&definition.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: if definition.automatic_start {
                ServiceStartType::AutoStart
            } else {
                ServiceStartType::OnDemand
            },
            error_control: ServiceErrorControl::Normal,
            executable_path: definition.executable_path.clone(),
            launch_arguments: definition
                .launch_arguments
                .iter()
                .map(OsString::from)
                .collect(),
            dependencies: Vec::new(),
            account_name: None,
            account_password: None,
        };
        let inner = self
            .inner
            .create_service(&info, service_access() | ServiceAccess::CHANGE_CONFIG)
            .map_err(|err| match os_error(&err) {
                Some(ERROR_SERVICE_EXISTS) => Error::AlreadyExists(definition.name.clone()),
                Some(ERROR_ACCESS_DENIED) => {
                    Error::Permission(format!("service {}", definition.name))
                }
                _ => Error::Creation(format!("{}: {err}", definition.name)),
            })?;
        if let Err(err) = inner.set_description(&definition.description) {
            warn!(name = %definition.name, error = %err, "failed to set service description");
        }
        Ok(WindowsService {
            inner,
            name: definition.name.clone(),
        })
    }
}

pub struct WindowsService {
    inner: Service,
    name: String,
}

impl ServiceHandle for WindowsService {
    fn start(&self) -> Result<()> {
        self.inner
            .start::<&OsStr>(&[])
            .map_err(|err| classify(err, &self.name))
    }

    fn stop(&self) -> Result<ServiceState> {
        self.inner
            .stop()
            .map(|status| map_state(status.current_state))
            .map_err(|err| classify(err, &self.name))
    }

    fn query(&self) -> Result<ServiceState> {
        self.inner
            .query_status()
            .map(|status| map_state(status.current_state))
            .map_err(|err| classify(err, &self.name))
    }

    fn delete(&self) -> Result<()> {
        self.inner
            .delete()
            .map_err(|err| classify(err, &self.name))
    }
}

fn map_state(state: NativeState) -> ServiceState {
    match state {
        NativeState::Stopped => ServiceState::Stopped,
        NativeState::StartPending | NativeState::ContinuePending => ServiceState::StartPending,
        NativeState::StopPending => ServiceState::StopPending,
        NativeState::Running => ServiceState::Running,
        NativeState::PausePending | NativeState::Paused => ServiceState::Paused,
    }
}
