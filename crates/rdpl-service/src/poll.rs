use std::thread;
use std::time::{Duration, Instant};

use rdpl_core::Result;
use tracing::debug;

use crate::{ServiceHandle, ServiceState};

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// How often to query the service and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            deadline: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Reached,
    TimedOut { last: ServiceState },
}

/// Queries `service` every `policy.interval` until it reports `target`.
///
/// `initial` is the state already known to the caller, usually the reply to the control
/// that was just sent. The deadline is measured from the call.
pub fn wait_for_state<S, C>(
    service: &S,
    clock: &C,
    initial: ServiceState,
    target: ServiceState,
    policy: PollPolicy,
) -> Result<PollOutcome>
where
    S: ServiceHandle + ?Sized,
    C: Clock + ?Sized,
{
    let deadline = clock.now() + policy.deadline;
    let mut state = initial;
    while state != target {
        if clock.now() >= deadline {
            return Ok(PollOutcome::TimedOut { last: state });
        }
        clock.sleep(policy.interval);
        state = service.query()?;
        debug!(state = %state, target = %target, "polled service state");
    }
    Ok(PollOutcome::Reached)
}
