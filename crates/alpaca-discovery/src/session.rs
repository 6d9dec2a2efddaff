//! Discovery session state.
//!
//! A session is created per discovery run and shared between the engine
//! (the only writer) and any number of readers polling partial results.
//! Writers only append. Once the session reaches
//! [`DiscoveryState::Complete`] every later write is ignored, so a complete
//! session is immutable.

use alpaca_core::{
    AscomDeviceDescriptor, DeviceError, DeviceType, ServerDescriptor, ServerEndpoint,
    ServerInventory,
};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle of a discovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryState {
    /// Created, nothing sent yet
    Idle,
    /// Probes are being sent and replies collected
    Probing,
    /// Responding servers are being queried through the management API
    Aggregating,
    /// Finished; the session no longer changes
    Complete,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Idle => write!(f, "Idle"),
            DiscoveryState::Probing => write!(f, "Probing"),
            DiscoveryState::Aggregating => write!(f, "Aggregating"),
            DiscoveryState::Complete => write!(f, "Complete"),
        }
    }
}

/// A server that answered the probe but could not be inventoried.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerFailure {
    pub endpoint: ServerEndpoint,
    pub error: DeviceError,
    pub failed_at: DateTime<Utc>,
}

/// Session counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: DiscoveryState,
    pub responses: usize,
    pub servers: usize,
    pub devices: usize,
    pub failures: usize,
}

/// Handle to one discovery run. Clones share the same session.
#[derive(Clone)]
pub struct DiscoverySession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: watch::Sender<DiscoveryState>,
    started_at: DateTime<Utc>,
    deadline: Instant,
    responses: DashSet<ServerEndpoint>,
    servers: DashMap<ServerEndpoint, ServerDescriptor>,
    api_versions: DashMap<ServerEndpoint, Vec<u32>>,
    devices: RwLock<Vec<AscomDeviceDescriptor>>,
    failures: DashMap<ServerEndpoint, ServerFailure>,
    /// Writers hold this shared; completion takes it exclusively.
    gate: RwLock<()>,
    cancel: CancellationToken,
}

impl DiscoverySession {
    /// Creates an idle session whose probing phase ends at `deadline`.
    pub(crate) fn new(deadline: Instant) -> Self {
        let (state, _) = watch::channel(DiscoveryState::Idle);
        Self {
            inner: Arc::new(SessionInner {
                state,
                started_at: Utc::now(),
                deadline,
                responses: DashSet::new(),
                servers: DashMap::new(),
                api_versions: DashMap::new(),
                devices: RwLock::new(Vec::new()),
                failures: DashMap::new(),
                gate: RwLock::new(()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        *self.inner.state.borrow()
    }

    pub fn is_complete(&self) -> bool {
        self.state() == DiscoveryState::Complete
    }

    /// Wall-clock start of the session.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// End of the probing phase.
    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// Every distinct server that answered a probe.
    pub fn responses(&self) -> Vec<ServerEndpoint> {
        self.inner.responses.iter().map(|e| e.key().clone()).collect()
    }

    /// Descriptor of one server, once aggregated.
    pub fn server(&self, endpoint: &ServerEndpoint) -> Option<ServerDescriptor> {
        self.inner.servers.get(endpoint).map(|d| d.value().clone())
    }

    /// Inventories of all servers aggregated so far.
    pub fn servers(&self) -> Vec<ServerInventory> {
        let devices = self.inner.devices.read();
        self.inner
            .servers
            .iter()
            .map(|entry| ServerInventory {
                descriptor: entry.value().clone(),
                api_versions: self
                    .inner
                    .api_versions
                    .get(entry.key())
                    .map(|v| v.value().clone())
                    .unwrap_or_default(),
                devices: devices
                    .iter()
                    .filter(|d| &d.endpoint == entry.key())
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Servers that answered the probe but could not be inventoried.
    pub fn failures(&self) -> Vec<ServerFailure> {
        self.inner.failures.iter().map(|f| f.value().clone()).collect()
    }

    /// Snapshot of the devices aggregated so far, optionally filtered.
    ///
    /// Safe to call at any time; results only grow until the session is
    /// complete.
    pub fn get_devices(&self, device_type: Option<&DeviceType>) -> Vec<AscomDeviceDescriptor> {
        self.inner
            .devices
            .read()
            .iter()
            .filter(|d| device_type.map_or(true, |t| &d.device_type == t))
            .cloned()
            .collect()
    }

    /// Counts for logging.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            responses: self.inner.responses.len(),
            servers: self.inner.servers.len(),
            devices: self.inner.devices.read().len(),
            failures: self.inner.failures.len(),
        }
    }

    /// Waits until the session is complete.
    pub async fn wait_complete(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| *s == DiscoveryState::Complete).await;
    }

    /// Ends the session now.
    ///
    /// Outstanding sends, receives and management calls are abandoned
    /// without error. Calling it on a complete session does nothing.
    pub fn stop(&self) {
        if self.is_complete() {
            return;
        }
        info!("Stopping discovery session");
        self.inner.cancel.cancel();
        self.complete();
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Moves forward from `from` to `to`; false if the session was elsewhere.
    pub(crate) fn advance(&self, from: DiscoveryState, to: DiscoveryState) -> bool {
        let _gate = self.inner.gate.write();
        self.inner.state.send_if_modified(|state| {
            if *state == from {
                debug!(from = %from, to = %to, "Discovery state change");
                *state = to;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn complete(&self) {
        let _gate = self.inner.gate.write();
        self.inner.state.send_if_modified(|state| {
            if *state == DiscoveryState::Complete {
                false
            } else {
                *state = DiscoveryState::Complete;
                true
            }
        });
    }

    /// Adds a responding server; true if it was not seen before.
    pub(crate) fn record_response(&self, endpoint: ServerEndpoint) -> bool {
        let _gate = self.inner.gate.read();
        if self.is_complete() {
            return false;
        }
        self.inner.responses.insert(endpoint)
    }

    /// Adds a server's descriptor, then its devices.
    pub(crate) fn record_inventory(&self, inventory: ServerInventory) {
        let _gate = self.inner.gate.read();
        if self.is_complete() {
            return;
        }
        let endpoint = inventory.descriptor.endpoint.clone();
        self.inner
            .api_versions
            .insert(endpoint.clone(), inventory.api_versions);
        self.inner.servers.insert(endpoint, inventory.descriptor);
        self.inner.devices.write().extend(inventory.devices);
    }

    pub(crate) fn record_failure(&self, endpoint: ServerEndpoint, error: DeviceError) {
        let _gate = self.inner.gate.read();
        if self.is_complete() {
            return;
        }
        self.inner.failures.insert(
            endpoint.clone(),
            ServerFailure {
                endpoint,
                error,
                failed_at: Utc::now(),
            },
        );
    }

    /// True once the server has either been inventoried or has failed.
    pub(crate) fn is_settled(&self, endpoint: &ServerEndpoint) -> bool {
        self.inner.servers.contains_key(endpoint) || self.inner.failures.contains_key(endpoint)
    }
}

impl fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("started_at", &self.inner.started_at)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpaca_core::{CommunicationError, ServiceType};
    use std::time::Duration;

    fn endpoint(port: u16) -> ServerEndpoint {
        ServerEndpoint::new("192.168.1.20", port, ServiceType::Http)
    }

    fn inventory(port: u16, devices: &[(DeviceType, u32)]) -> ServerInventory {
        let ep = endpoint(port);
        ServerInventory {
            descriptor: ServerDescriptor::unnamed(ep.clone()),
            api_versions: vec![1],
            devices: devices
                .iter()
                .map(|(t, n)| AscomDeviceDescriptor {
                    endpoint: ep.clone(),
                    device_type: t.clone(),
                    device_number: *n,
                    device_name: format!("{} {}", t, n),
                    unique_id: format!("{}-{}-{}", port, t, n),
                })
                .collect(),
        }
    }

    fn session() -> DiscoverySession {
        DiscoverySession::new(Instant::now() + Duration::from_secs(1))
    }

    #[test]
    fn test_duplicate_responses_collapse() {
        let session = session();
        assert!(session.record_response(endpoint(11111)));
        assert!(!session.record_response(endpoint(11111)));
        assert!(session.record_response(endpoint(11112)));
        assert_eq!(session.responses().len(), 2);
    }

    #[test]
    fn test_state_only_moves_forward() {
        let session = session();
        assert_eq!(session.state(), DiscoveryState::Idle);
        assert!(session.advance(DiscoveryState::Idle, DiscoveryState::Probing));
        assert!(!session.advance(DiscoveryState::Idle, DiscoveryState::Probing));
        assert!(session.advance(DiscoveryState::Probing, DiscoveryState::Aggregating));
        session.complete();
        assert!(!session.advance(DiscoveryState::Aggregating, DiscoveryState::Probing));
        assert!(session.is_complete());
    }

    #[test]
    fn test_descriptor_visible_with_devices() {
        let session = session();
        session.record_inventory(inventory(11111, &[(DeviceType::Dome, 0), (DeviceType::Switch, 0)]));

        for device in session.get_devices(None) {
            assert!(session.server(&device.endpoint).is_some());
        }
        assert_eq!(session.get_devices(Some(&DeviceType::Dome)).len(), 1);
        assert_eq!(session.servers()[0].devices.len(), 2);
        assert_eq!(session.servers()[0].api_versions, vec![1]);
    }

    #[test]
    fn test_complete_session_is_immutable() {
        let session = session();
        session.record_response(endpoint(11111));
        session.complete();

        assert!(!session.record_response(endpoint(11112)));
        session.record_inventory(inventory(11111, &[(DeviceType::Camera, 0)]));
        session.record_failure(endpoint(11111), CommunicationError::timeout("x", 1).into());

        let snapshot = session.snapshot();
        assert_eq!(snapshot.responses, 1);
        assert_eq!(snapshot.servers, 0);
        assert_eq!(snapshot.devices, 0);
        assert_eq!(snapshot.failures, 0);
    }

    #[test]
    fn test_failures_are_per_server() {
        let session = session();
        session.record_inventory(inventory(11111, &[(DeviceType::Focuser, 0)]));
        session.record_failure(
            endpoint(11112),
            CommunicationError::connection_failed("http://192.168.1.20:11112", "refused").into(),
        );

        assert!(session.is_settled(&endpoint(11111)));
        assert!(session.is_settled(&endpoint(11112)));
        assert!(!session.is_settled(&endpoint(11113)));
        assert_eq!(session.failures().len(), 1);
        assert_eq!(session.get_devices(None).len(), 1);
    }

    #[tokio::test]
    async fn test_stop_completes_and_cancels() {
        let session = session();
        session.advance(DiscoveryState::Idle, DiscoveryState::Probing);

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_complete().await })
        };
        session.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(session.cancel_token().is_cancelled());
        assert!(session.is_complete());
    }
}
