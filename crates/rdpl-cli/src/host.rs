use std::ffi::OsString;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use rdpl_core::{ServiceConfig, SERVICE_NAME};
use tracing::{error, info};
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
use windows_service::{define_windows_service, service_dispatcher};

define_windows_service!(ffi_service_main, service_main);

/// Hands the process over to the service control dispatcher. Blocks until the service
/// stops.
pub(crate) fn run(config: &ServiceConfig) -> Result<()> {
    info!(
        name = SERVICE_NAME,
        port = config.server_port,
        "starting service host"
    );
    service_dispatcher::start(SERVICE_NAME, ffi_service_main)
        .context("failed to connect to the service control dispatcher")
}

fn service_main(_arguments: Vec<OsString>) {
    if let Err(err) = run_service() {
        error!(error = %format!("{err:#}"), "service host failed");
    }
}

fn run_service() -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let handler = move |control| match control {
        ServiceControl::Stop | ServiceControl::Shutdown => {
            let _ = shutdown_tx.send(());
            ServiceControlHandlerResult::NoError
        }
        ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
        _ => ServiceControlHandlerResult::NotImplemented,
    };
    let status_handle = service_control_handler::register(SERVICE_NAME, handler)
        .context("failed to register service control handler")?;

    status_handle
        .set_service_status(status(
            ServiceState::Running,
            ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
        ))
        .context("failed to report running state")?;
    info!("service running");

    // a closed channel means the handler is gone; treat it as a stop request
    let _ = shutdown_rx.recv();
    info!("stop requested");

    status_handle
        .set_service_status(status(ServiceState::Stopped, ServiceControlAccept::empty()))
        .context("failed to report stopped state")?;
    info!("service stopped");
    Ok(())
}

fn status(state: ServiceState, controls_accepted: ServiceControlAccept) -> ServiceStatus {
    ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: state,
        controls_accepted,
        exit_code: ServiceExitCode::Win32(0),
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: None,
    }
}
