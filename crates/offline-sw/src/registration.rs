//! Registration: the installing, waiting and active slots for one scope.
//!
//! The registration drives the lifecycle a browser would otherwise drive:
//! it runs the install handler, promotes waiting workers, runs the activate
//! handler and routes fetches and messages to the right worker. State and
//! controller changes are reported on an unbounded channel.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::activate::ActivationReport;
use crate::event::{ExtendableEvent, FetchEvent};
use crate::lifecycle::{Clients, ServiceWorker, ServiceWorkerId, ServiceWorkerState};
use crate::strategy::FetchResponse;
use crate::worker::OfflineWorker;
use crate::WorkerError;

/// Registration events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A worker moved to a new state.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A client is now controlled by a different worker.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
}

/// Which worker a message is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSlot {
    Waiting,
    Active,
}

struct RegisteredWorker {
    record: ServiceWorker,
    worker: Arc<OfflineWorker>,
}

impl RegisteredWorker {
    fn new(worker: Arc<OfflineWorker>) -> Self {
        Self {
            record: ServiceWorker::new(worker.id()),
            worker,
        }
    }
}

#[derive(Default)]
struct Slots {
    installing: Option<RegisteredWorker>,
    waiting: Option<RegisteredWorker>,
    active: Option<RegisteredWorker>,
}

/// Service worker registration for one scope.
pub struct ServiceWorkerRegistration {
    scope: Url,
    slots: RwLock<Slots>,
    clients: Arc<RwLock<Clients>>,
    event_tx: mpsc::UnboundedSender<RegistrationEvent>,
}

impl ServiceWorkerRegistration {
    /// Create an empty registration.
    pub fn new(scope: Url) -> (Self, mpsc::UnboundedReceiver<RegistrationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                scope,
                slots: RwLock::new(Slots::default()),
                clients: Arc::new(RwLock::new(Clients::new())),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Pages known to this registration.
    pub fn clients(&self) -> &Arc<RwLock<Clients>> {
        &self.clients
    }

    /// The worker currently controlling pages, if any.
    pub async fn active(&self) -> Option<Arc<OfflineWorker>> {
        self.slots
            .read()
            .await
            .active
            .as_ref()
            .map(|r| Arc::clone(&r.worker))
    }

    /// The installed worker waiting to take over, if any.
    pub async fn waiting(&self) -> Option<Arc<OfflineWorker>> {
        self.slots
            .read()
            .await
            .waiting
            .as_ref()
            .map(|r| Arc::clone(&r.worker))
    }

    /// Current state of a worker held by this registration.
    pub async fn state_of(&self, id: ServiceWorkerId) -> Option<ServiceWorkerState> {
        let slots = self.slots.read().await;
        let state = [&slots.installing, &slots.waiting, &slots.active]
            .into_iter()
            .flatten()
            .find(|r| r.record.id == id)
            .map(|r| r.record.state);
        state
    }

    fn set_state(&self, registered: &mut RegisteredWorker, state: ServiceWorkerState) {
        registered.record.set_state(state);
        debug!(worker = %registered.record.id, state = %state, "State changed");
        let _ = self.event_tx.send(RegistrationEvent::StateChange {
            worker_id: registered.record.id,
            new_state: state,
        });
    }

    fn check_scope(&self, worker: &OfflineWorker) -> Result<(), WorkerError> {
        if worker.config().scope != self.scope {
            return Err(WorkerError::StateError(format!(
                "worker scope {} does not match registration scope {}",
                worker.config().scope,
                self.scope
            )));
        }
        Ok(())
    }

    /// Install a new worker version.
    ///
    /// A failed install makes the worker redundant and leaves the current
    /// active worker in charge. A successful install replaces any waiting
    /// worker and is activated straight away when it asked to skip waiting
    /// or nothing is active yet. Returns the worker's resulting state.
    pub async fn register(&self, worker: OfflineWorker) -> Result<ServiceWorkerState, WorkerError> {
        self.check_scope(&worker)?;

        let worker = Arc::new(worker.with_clients(Arc::clone(&self.clients)));
        let id = worker.id();
        info!(worker = %id, scope = %self.scope, "Registering worker");

        {
            let mut slots = self.slots.write().await;
            let mut registered = RegisteredWorker::new(Arc::clone(&worker));
            self.set_state(&mut registered, ServiceWorkerState::Installing);
            if let Some(mut previous) = slots.installing.replace(registered) {
                self.set_state(&mut previous, ServiceWorkerState::Redundant);
            }
        }

        let installed = worker.install().await;

        let promote = {
            let mut slots = self.slots.write().await;
            let mut registered = match slots.installing.take() {
                Some(r) if r.record.id == id => r,
                other => {
                    slots.installing = other;
                    return Err(WorkerError::StateError(format!(
                        "{id} was superseded while installing"
                    )));
                }
            };

            if let Err(e) = installed {
                self.set_state(&mut registered, ServiceWorkerState::Redundant);
                return Err(e);
            }

            self.set_state(&mut registered, ServiceWorkerState::Installed);
            if let Some(mut previous) = slots.waiting.replace(registered) {
                self.set_state(&mut previous, ServiceWorkerState::Redundant);
            }
            worker.skip_waiting_requested() || slots.active.is_none()
        };

        if promote {
            self.activate_waiting().await;
        }

        Ok(self
            .state_of(id)
            .await
            .unwrap_or(ServiceWorkerState::Redundant))
    }

    /// Promote the waiting worker: run its activate handler and retire the
    /// previous active worker. Returns `None` when nothing is waiting.
    pub async fn activate_waiting(&self) -> Option<ActivationReport> {
        let worker = {
            let mut slots = self.slots.write().await;
            let mut registered = slots.waiting.take()?;
            if let Some(mut previous) = slots.active.take() {
                self.set_state(&mut previous, ServiceWorkerState::Redundant);
            }
            self.set_state(&mut registered, ServiceWorkerState::Activating);
            let worker = Arc::clone(&registered.worker);
            slots.active = Some(registered);
            worker
        };

        let report = worker.activate().await;

        {
            let mut slots = self.slots.write().await;
            match slots.active.as_mut() {
                Some(registered) if registered.record.id == worker.id() => {
                    self.set_state(registered, ServiceWorkerState::Activated);
                }
                _ => warn!(worker = %worker.id(), "Replaced while activating"),
            }
        }

        for client_id in &report.claimed {
            let _ = self.event_tx.send(RegistrationEvent::ControllerChange {
                client_id: client_id.clone(),
                worker_id: worker.id(),
            });
        }

        Some(report)
    }

    /// Make `worker` the active worker without running install or activate,
    /// for a host restarting over existing cache storage.
    pub async fn restore_active(&self, worker: OfflineWorker) -> Result<(), WorkerError> {
        self.check_scope(&worker)?;

        let worker = Arc::new(worker.with_clients(Arc::clone(&self.clients)));
        let mut registered = RegisteredWorker::new(worker);

        let mut slots = self.slots.write().await;
        if let Some(mut previous) = slots.active.take() {
            self.set_state(&mut previous, ServiceWorkerState::Redundant);
        }
        self.set_state(&mut registered, ServiceWorkerState::Activated);
        info!(worker = %registered.record.id, "Restored active worker");
        slots.active = Some(registered);
        Ok(())
    }

    /// Deliver a message to a worker. The returned event carries any
    /// background work the message started.
    ///
    /// A waiting worker that asks to skip waiting is activated before this
    /// returns.
    pub async fn post_message(
        &self,
        slot: WorkerSlot,
        data: &Value,
    ) -> Result<ExtendableEvent, WorkerError> {
        let worker = match slot {
            WorkerSlot::Waiting => self.waiting().await,
            WorkerSlot::Active => self.active().await,
        }
        .ok_or_else(|| WorkerError::StateError(format!("no {slot:?} worker").to_lowercase()))?;

        let event = ExtendableEvent::new();
        worker.handle_message(&event, data);

        if slot == WorkerSlot::Waiting && worker.skip_waiting_requested() {
            self.activate_waiting().await;
        }

        Ok(event)
    }

    /// Route a fetch to the active worker. `None` means the request goes
    /// to the network untouched.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> Option<FetchResponse> {
        let worker = {
            let slots = self.slots.read().await;
            let active = slots.active.as_ref()?;
            if !active.record.state.can_intercept_fetch() {
                return None;
            }
            Arc::clone(&active.worker)
        };
        worker.handle_fetch(event).await
    }
}

impl std::fmt::Debug for ServiceWorkerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorkerRegistration")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
