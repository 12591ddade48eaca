use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rdpl_core::{Error, Result};

use crate::{
    Clock, ServiceConnector, ServiceDefinition, ServiceHandle, ServiceManager, ServiceState,
};

/// How a fake service reacts to the stop control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBehaviour {
    #[default]
    Immediate,
    /// Reports `StopPending` for this many status queries, then `Stopped`.
    AfterQueries(u32),
    Never,
    Refuse,
}

/// Scripted in-memory service control manager. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeServices {
    state: Rc<RefCell<FakeState>>,
}

#[derive(Debug, Default)]
struct FakeState {
    services: BTreeMap<String, FakeService>,
    refuse_connection: bool,
    fail_create: bool,
    fail_start: bool,
    fail_delete: bool,
    stop_behaviour: StopBehaviour,
    calls: Vec<String>,
}

#[derive(Debug)]
struct FakeService {
    definition: ServiceDefinition,
    state: ServiceState,
    pending_queries: u32,
}

impl FakeServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an already-installed, running service.
    pub fn install(&self, name: &str) {
        let definition = ServiceDefinition {
            name: name.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            executable_path: PathBuf::from("existing.exe"),
            launch_arguments: Vec::new(),
            automatic_start: true,
        };
        self.state.borrow_mut().services.insert(
            name.to_string(),
            FakeService {
                definition,
                state: ServiceState::Running,
                pending_queries: 0,
            },
        );
    }

    pub fn refuse_connection(&self) {
        self.state.borrow_mut().refuse_connection = true;
    }

    pub fn fail_create(&self) {
        self.state.borrow_mut().fail_create = true;
    }

    pub fn fail_start(&self) {
        self.state.borrow_mut().fail_start = true;
    }

    pub fn fail_delete(&self) {
        self.state.borrow_mut().fail_delete = true;
    }

    pub fn set_stop_behaviour(&self, behaviour: StopBehaviour) {
        self.state.borrow_mut().stop_behaviour = behaviour;
    }

    pub fn definition(&self, name: &str) -> Option<ServiceDefinition> {
        self.state
            .borrow()
            .services
            .get(name)
            .map(|service| service.definition.clone())
    }

    pub fn state_of(&self, name: &str) -> ServiceState {
        self.state
            .borrow()
            .services
            .get(name)
            .map_or(ServiceState::NotInstalled, |service| service.state)
    }

    /// Every call made against the fake, as `"<operation> <name>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }
}

impl ServiceConnector for FakeServices {
    type Manager = FakeManager;

    fn connect(&self) -> Result<FakeManager> {
        let mut state = self.state.borrow_mut();
        state.calls.push("connect".to_string());
        if state.refuse_connection {
            return Err(Error::Connection("service manager unavailable".to_string()));
        }
        Ok(FakeManager {
            state: Rc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct FakeManager {
    state: Rc<RefCell<FakeState>>,
}

impl ServiceManager for FakeManager {
    type Service = FakeHandle;

    fn open_service(&self, name: &str) -> Result<Option<FakeHandle>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("open {name}"));
        Ok(state.services.contains_key(name).then(|| FakeHandle {
            name: name.to_string(),
            state: Rc::clone(&self.state),
        }))
    }

    fn create_service(&self, definition: &ServiceDefinition) -> Result<FakeHandle> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("create {}", definition.name));
        if state.fail_create {
            return Err(Error::Creation(format!(
                "{}: the account name is invalid",
                definition.name
            )));
        }
        if state.services.contains_key(&definition.name) {
            return Err(Error::AlreadyExists(definition.name.clone()));
        }
        state.services.insert(
            definition.name.clone(),
            FakeService {
                definition: definition.clone(),
                state: ServiceState::Stopped,
                pending_queries: 0,
            },
        );
        Ok(FakeHandle {
            name: definition.name.clone(),
            state: Rc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct FakeHandle {
    name: String,
    state: Rc<RefCell<FakeState>>,
}

impl FakeHandle {
    fn with_service<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut FakeService, &FakeSettings) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("{operation} {}", self.name));
        let settings = FakeSettings {
            fail_start: state.fail_start,
            fail_delete: state.fail_delete,
            stop_behaviour: state.stop_behaviour,
        };
        let service = state
            .services
            .get_mut(&self.name)
            .ok_or_else(|| Error::NotFound(format!("service {}", self.name)))?;
        f(service, &settings)
    }
}

struct FakeSettings {
    fail_start: bool,
    fail_delete: bool,
    stop_behaviour: StopBehaviour,
}

impl ServiceHandle for FakeHandle {
    fn start(&self) -> Result<()> {
        self.with_service("start", |service, settings| {
            if settings.fail_start {
                return Err(Error::ServiceControl(format!(
                    "{}: the service did not respond to the start request",
                    service.definition.name
                )));
            }
            service.state = ServiceState::Running;
            Ok(())
        })
    }

    fn stop(&self) -> Result<ServiceState> {
        self.with_service("stop", |service, settings| {
            if service.state == ServiceState::Stopped {
                return Err(Error::ServiceControl(format!(
                    "{}: the service has not been started",
                    service.definition.name
                )));
            }
            service.state = match settings.stop_behaviour {
                StopBehaviour::Refuse => {
                    return Err(Error::ServiceControl(format!(
                        "{}: the service cannot accept control messages",
                        service.definition.name
                    )));
                }
                StopBehaviour::Immediate | StopBehaviour::AfterQueries(0) => ServiceState::Stopped,
                StopBehaviour::AfterQueries(count) => {
                    service.pending_queries = count;
                    ServiceState::StopPending
                }
                StopBehaviour::Never => ServiceState::StopPending,
            };
            Ok(service.state)
        })
    }

    fn query(&self) -> Result<ServiceState> {
        self.with_service("query", |service, _| {
            if service.state == ServiceState::StopPending && service.pending_queries > 0 {
                service.pending_queries -= 1;
                if service.pending_queries == 0 {
                    service.state = ServiceState::Stopped;
                }
            }
            Ok(service.state)
        })
    }

    fn delete(&self) -> Result<()> {
        let fail_delete = self.with_service("delete", |_, settings| Ok(settings.fail_delete))?;
        if fail_delete {
            return Err(Error::Permission(format!("service {}", self.name)));
        }
        self.state.borrow_mut().services.remove(&self.name);
        Ok(())
    }
}

/// Clock that only moves when slept on or advanced.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
    sleeps: Cell<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}
