//! Worker lifecycle states and the pages a worker controls.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

// ==================== Worker ====================

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ServiceWorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Constructed, not yet installing.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced or failed to install.
    Redundant,
}

impl ServiceWorkerState {
    /// Only an activated worker may intercept requests.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, ServiceWorkerState::Activated)
    }
}

impl fmt::Display for ServiceWorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceWorkerState::Parsed => "parsed",
            ServiceWorkerState::Installing => "installing",
            ServiceWorkerState::Installed => "installed",
            ServiceWorkerState::Activating => "activating",
            ServiceWorkerState::Activated => "activated",
            ServiceWorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Lifecycle record the registration keeps for each worker version.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    /// Worker ID.
    pub id: ServiceWorkerId,

    /// Current state.
    pub state: ServiceWorkerState,
}

impl ServiceWorker {
    pub fn new(id: ServiceWorkerId) -> Self {
        Self {
            id,
            state: ServiceWorkerState::Parsed,
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

// ==================== Clients ====================

/// A page that may be controlled.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

impl Client {
    /// Create an uncontrolled window client.
    pub fn window(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }

    /// Whether the client's URL falls inside `scope`.
    pub fn in_scope(&self, scope: &Url) -> bool {
        self.url.as_str().starts_with(scope.as_str())
    }
}

/// Clients registry.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Make `worker` the controller of every in-scope client it does not
    /// already control. Returns the IDs of clients whose controller changed.
    pub fn claim(&mut self, worker: ServiceWorkerId, scope: &Url) -> Vec<String> {
        let mut claimed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.in_scope(scope) && c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id.clone()
            })
            .collect();
        claimed.sort();
        claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Url {
        Url::parse("https://app.example.com/").unwrap()
    }

    #[test]
    fn test_service_worker_state_transitions() {
        let mut worker = ServiceWorker::new(ServiceWorkerId::new());
        assert_eq!(worker.state, ServiceWorkerState::Parsed);

        worker.set_state(ServiceWorkerState::Installing);
        assert!(!worker.state.can_intercept_fetch());

        worker.set_state(ServiceWorkerState::Activated);
        assert!(worker.is_active());
        assert!(worker.state.can_intercept_fetch());

        worker.set_state(ServiceWorkerState::Redundant);
        assert!(worker.is_redundant());
        assert_eq!(worker.state.to_string(), "redundant");
    }

    #[test]
    fn test_worker_ids_are_unique() {
        let a = ServiceWorkerId::new();
        let b = ServiceWorkerId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("sw-"));
    }

    #[test]
    fn test_claim_only_in_scope_clients() {
        let mut clients = Clients::new();
        clients.add(Client::window("a", Url::parse("https://app.example.com/index.html").unwrap()));
        clients.add(Client::window("b", Url::parse("https://app.example.com/").unwrap()));
        clients.add(Client::window("c", Url::parse("https://other.example.com/").unwrap()));

        let worker = ServiceWorkerId::new();
        assert_eq!(clients.claim(worker, &scope()), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(clients.get("a").unwrap().controller, Some(worker));
        assert_eq!(clients.len(), 3);
        assert!(clients.get("c").unwrap().controller.is_none());

        // Claiming again changes nothing.
        assert!(clients.claim(worker, &scope()).is_empty());
    }

    #[test]
    fn test_claim_takes_over_from_previous_worker() {
        let mut clients = Clients::new();
        clients.add(Client::window("a", Url::parse("https://app.example.com/").unwrap()));

        let old = ServiceWorkerId::new();
        let new = ServiceWorkerId::new();
        clients.claim(old, &scope());
        assert_eq!(clients.claim(new, &scope()), vec!["a".to_string()]);
        assert_eq!(clients.get("a").unwrap().controller, Some(new));

        assert!(clients.remove("a").is_some());
        assert!(clients.is_empty());
    }
}
