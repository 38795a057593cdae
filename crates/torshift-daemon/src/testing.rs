//! In-memory fakes for the proxy service and the address probe.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use tokio::time::Instant;

use crate::identity::{AddressProbe, ProbeError};
use crate::service::{DaemonState, ProxyService, ServiceError};

/// Ordered record of probe and restart completions across threads.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<&'static str>>>);

impl EventLog {
    fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// Proxy service with a fixed state and counted restarts.
#[derive(Debug)]
pub struct FakeService {
    state: Option<DaemonState>,
    fail_restarts: bool,
    restart_delay: Duration,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    events: Option<EventLog>,
    attempts: AtomicUsize,
    restarts: AtomicUsize,
}

impl FakeService {
    pub fn new(state: DaemonState) -> Self {
        Self {
            state: Some(state),
            fail_restarts: false,
            restart_delay: Duration::ZERO,
            gate: None,
            events: None,
            attempts: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
        }
    }

    /// Service whose state query cannot be executed.
    pub fn unreachable() -> Self {
        Self {
            state: None,
            ..Self::new(DaemonState::Inactive)
        }
    }

    /// Service whose restarts block until a message arrives on the returned sender.
    pub fn gated(state: DaemonState) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let service = Self {
            gate: Some(Mutex::new(rx)),
            ..Self::new(state)
        };
        (service, tx)
    }

    #[must_use]
    pub fn failing_restarts(mut self) -> Self {
        self.fail_restarts = true;
        self
    }

    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Restart calls, successful or not.
    pub fn restart_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Restarts that completed successfully.
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    fn failure(command: &str) -> ServiceError {
        ServiceError::Failed {
            command: command.to_string(),
            status: "exit status: 1".to_string(),
            stderr: "Job for fake-tor.service failed".to_string(),
        }
    }
}

impl ProxyService for FakeService {
    fn name(&self) -> &str {
        "fake-tor"
    }

    fn state(&self) -> Result<DaemonState, ServiceError> {
        self.state.ok_or_else(|| ServiceError::Spawn {
            command: "systemctl is-active --quiet fake-tor".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }

    fn restart(&self) -> Result<(), ServiceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.lock()
                .unwrap()
                .recv()
                .map_err(|_| Self::failure("systemctl restart fake-tor"))?;
        }
        if !self.restart_delay.is_zero() {
            std::thread::sleep(self.restart_delay);
        }
        if self.fail_restarts {
            return Err(Self::failure("systemctl restart fake-tor"));
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = &self.events {
            events.push("restarted");
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ProbeState {
    script: Mutex<VecDeque<Result<String, ProbeError>>>,
    fallback: Option<String>,
    call_times: Mutex<Vec<Instant>>,
    events: Option<EventLog>,
}

/// Probe that replays scripted results and records when it was called.
///
/// Clones share the script and the call record.
#[derive(Debug, Clone)]
pub struct ScriptedProbe(Arc<ProbeState>);

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = Result<String, ProbeError>>) -> Self {
        Self(Arc::new(ProbeState {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            call_times: Mutex::new(Vec::new()),
            events: None,
        }))
    }

    /// Probe that always answers with `address`.
    pub fn always(address: &str) -> Self {
        Self(Arc::new(ProbeState {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(address.to_string()),
            call_times: Mutex::new(Vec::new()),
            events: None,
        }))
    }

    /// Record each probe in `events`. Must be called before cloning.
    #[must_use]
    pub fn with_events(self, events: EventLog) -> Self {
        let state = Arc::try_unwrap(self.0).unwrap();
        Self(Arc::new(ProbeState {
            events: Some(events),
            ..state
        }))
    }

    pub fn calls(&self) -> usize {
        self.0.call_times.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.0.call_times.lock().unwrap().clone()
    }

    fn next(&self) -> Result<String, ProbeError> {
        self.0.call_times.lock().unwrap().push(Instant::now());
        if let Some(events) = &self.0.events {
            events.push("probe");
        }
        let scripted = self.0.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            self.0
                .fallback
                .clone()
                .ok_or_else(|| ProbeError::Decode("script exhausted".to_string()))
        })
    }
}

impl AddressProbe for ScriptedProbe {
    async fn fetch_address(&self) -> Result<String, ProbeError> {
        self.next()
    }
}
