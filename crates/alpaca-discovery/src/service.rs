//! Alpaca discovery engine.
//!
//! A run goes `Idle -> Probing -> Aggregating -> Complete`:
//!
//! 1. One UDP socket per probe target, each with a sender task (the probe,
//!    `retry_count` times, `poll_interval` apart) and a listener task that
//!    records every well-formed reply until the deadline.
//! 2. At the deadline both task groups are cancelled and joined.
//! 3. Every responding server is inventoried in parallel through the
//!    management API, bounded by the aggregation timeout.

use crate::error::{DiscoveryError, Result};
use crate::interfaces::{probe_targets, ProbeTarget};
use crate::session::{DiscoveryState, DiscoverySession};
use alpaca_client::{ManagementApi, TransactionDispatcher};
use alpaca_core::{
    ClientIdentity, CommunicationError, DeviceError, DiscoveryConfig, ServerEndpoint,
    ServerInventory, ServiceType,
};
use alpaca_wire::{decode_probe_response, encode_probe};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Largest discovery reply we accept.
const RECV_BUFFER_SIZE: usize = 1024;

/// Finds Alpaca servers and their devices.
pub struct AlpacaDiscovery {
    config: DiscoveryConfig,
    management: Arc<dyn ManagementApi>,
    identity: ClientIdentity,
}

impl AlpacaDiscovery {
    /// Creates an engine that inventories servers through `dispatcher`.
    pub fn new(config: DiscoveryConfig, dispatcher: TransactionDispatcher) -> Result<Self> {
        let identity = dispatcher.new_client_identity();
        Self::with_management(config, Arc::new(dispatcher), identity)
    }

    /// Creates an engine with a custom management API implementation.
    pub fn with_management(
        config: DiscoveryConfig,
        management: Arc<dyn ManagementApi>,
        identity: ClientIdentity,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            port = config.discovery_port,
            retries = config.retry_count,
            duration_ms = config.discovery_duration_ms,
            ipv4 = config.use_ipv4,
            ipv6 = config.use_ipv6,
            "Alpaca discovery configured"
        );

        Ok(Self {
            config,
            management,
            identity,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Starts a new session and returns it in the `Probing` state.
    ///
    /// Only a failure to list interfaces is an error. Sockets that cannot be
    /// opened are skipped; with none left the session still runs to its
    /// deadline and completes empty.
    #[instrument(skip(self), fields(port = self.config.discovery_port))]
    pub async fn start(&self) -> Result<DiscoverySession> {
        let targets = probe_targets(&self.config)?;

        let mut sockets = Vec::with_capacity(targets.len());
        for target in targets {
            match open_probe_socket(&target) {
                Ok(socket) => sockets.push((target, Arc::new(socket))),
                Err(e) => warn!(interface = %target.interface, error = %e, "Skipping probe target"),
            }
        }

        let session = DiscoverySession::new(Instant::now() + self.config.discovery_duration());
        session.advance(DiscoveryState::Idle, DiscoveryState::Probing);

        info!(
            sockets = sockets.len(),
            started_at = %session.started_at(),
            "Discovery session started"
        );

        tokio::spawn(run_session(
            self.config.clone(),
            self.management.clone(),
            self.identity.clone(),
            session.clone(),
            sockets,
        ));

        Ok(session)
    }

    /// Runs a session to completion.
    pub async fn discover(&self) -> Result<DiscoverySession> {
        let session = self.start().await?;
        session.wait_complete().await;
        Ok(session)
    }
}

/// Creates a nonblocking UDP socket bound to the target's local address.
fn open_probe_socket(target: &ProbeTarget) -> Result<UdpSocket> {
    let setup_err = |e: std::io::Error| DiscoveryError::SocketSetup {
        address: target.bind.to_string(),
        reason: e.to_string(),
    };

    let domain = match target.bind {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(setup_err)?;

    match target.bind {
        SocketAddr::V4(_) => socket.set_broadcast(true).map_err(setup_err)?,
        SocketAddr::V6(_) => {
            socket.set_only_v6(true).map_err(setup_err)?;
            if let Some(scope) = target.multicast_scope() {
                socket.set_multicast_if_v6(scope).map_err(setup_err)?;
            }
        }
    }

    socket.set_nonblocking(true).map_err(setup_err)?;
    socket.bind(&target.bind.into()).map_err(setup_err)?;

    Ok(UdpSocket::from_std(socket.into())?)
}

async fn run_session(
    config: DiscoveryConfig,
    management: Arc<dyn ManagementApi>,
    identity: ClientIdentity,
    session: DiscoverySession,
    sockets: Vec<(ProbeTarget, Arc<UdpSocket>)>,
) {
    let started = Instant::now();
    let cancel = session.cancel_token().clone();

    probe(&config, &session, sockets).await;
    if cancel.is_cancelled() {
        return;
    }

    if session.advance(DiscoveryState::Probing, DiscoveryState::Aggregating) {
        info!(servers = session.responses().len(), "Probing finished, aggregating");
        aggregate(&config, management, &identity, &session).await;
    }

    session.complete();
    let snapshot = session.snapshot();
    info!(
        responses = snapshot.responses,
        servers = snapshot.servers,
        devices = snapshot.devices,
        failures = snapshot.failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Discovery session complete"
    );
}

async fn probe(
    config: &DiscoveryConfig,
    session: &DiscoverySession,
    sockets: Vec<(ProbeTarget, Arc<UdpSocket>)>,
) {
    let stop = session.cancel_token().child_token();
    let mut tasks = JoinSet::new();

    for (target, socket) in sockets {
        tasks.spawn(send_probes(
            socket.clone(),
            target.destination,
            config.retry_count,
            config.poll_interval(),
            stop.clone(),
        ));
        tasks.spawn(listen(
            socket,
            target.interface,
            session.clone(),
            config.service_type,
            stop.clone(),
        ));
    }

    tokio::select! {
        _ = tokio::time::sleep_until(session.deadline().into()) => {}
        _ = stop.cancelled() => {}
    }

    stop.cancel();
    while tasks.join_next().await.is_some() {}
}

async fn send_probes(
    socket: Arc<UdpSocket>,
    destination: SocketAddr,
    retry_count: u32,
    poll_interval: Duration,
    stop: CancellationToken,
) {
    let probe = encode_probe();

    for attempt in 0..retry_count {
        if attempt > 0 {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            result = socket.send_to(&probe, destination) => match result {
                Ok(_) => debug!(destination = %destination, attempt, "Sent discovery probe"),
                Err(e) => warn!(destination = %destination, error = %e, "Failed to send discovery probe"),
            },
        }
    }
}

async fn listen(
    socket: Arc<UdpSocket>,
    interface: String,
    session: DiscoverySession,
    service_type: ServiceType,
    stop: CancellationToken,
) {
    let mut buffer = [0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            result = socket.recv_from(&mut buffer) => match result {
                Ok((len, from)) => match decode_probe_response(&buffer[..len]) {
                    Ok(reply) => {
                        let endpoint = ServerEndpoint::from_ip(
                            from.ip().to_canonical(),
                            reply.alpaca_port,
                            service_type,
                        );
                        if session.record_response(endpoint.clone()) {
                            info!(server = %endpoint, interface = %interface, "Alpaca server responded");
                        }
                    }
                    Err(e) => debug!(from = %from, error = %e, "Ignoring malformed discovery datagram"),
                },
                // ICMP errors from earlier sends show up here; keep listening.
                Err(e) => debug!(interface = %interface, error = %e, "Discovery receive failed"),
            },
        }
    }
}

async fn aggregate(
    config: &DiscoveryConfig,
    management: Arc<dyn ManagementApi>,
    identity: &ClientIdentity,
    session: &DiscoverySession,
) {
    let mut calls = JoinSet::new();
    for endpoint in session.responses() {
        let management = management.clone();
        let identity = identity.clone();
        let session = session.clone();
        let retries = config.management_retries;

        calls.spawn(async move {
            match fetch_inventory(&*management, &identity, &endpoint, retries).await {
                Ok(inventory) => {
                    info!(
                        server = %endpoint,
                        name = %inventory.descriptor.server_name,
                        devices = inventory.devices.len(),
                        "Server inventoried"
                    );
                    session.record_inventory(inventory);
                }
                Err(e) => {
                    warn!(server = %endpoint, error = %e, "Server inventory failed");
                    session.record_failure(endpoint, e);
                }
            }
        });
    }

    let deadline = config.aggregation_timeout();
    let timed_out = tokio::select! {
        _ = async { while calls.join_next().await.is_some() {} } => false,
        _ = tokio::time::sleep(deadline) => true,
        _ = session.cancel_token().cancelled() => false,
    };
    calls.abort_all();

    if timed_out {
        warn!(timeout_ms = config.aggregation_timeout_ms, "Aggregation deadline reached");
        for endpoint in session.responses() {
            if !session.is_settled(&endpoint) {
                session.record_failure(
                    endpoint,
                    CommunicationError::timeout("server inventory", config.aggregation_timeout_ms)
                        .into(),
                );
            }
        }
    }
}

/// One attempt plus up to `retries` more for retryable failures.
#[instrument(skip(management, identity, endpoint), fields(server = %endpoint))]
async fn fetch_inventory(
    management: &dyn ManagementApi,
    identity: &ClientIdentity,
    endpoint: &ServerEndpoint,
    retries: u32,
) -> std::result::Result<ServerInventory, DeviceError> {
    let mut attempt = 0;
    loop {
        match management.server_inventory(identity, endpoint).await {
            Ok(inventory) => return Ok(inventory),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                debug!(server = %endpoint, attempt, error = %e, "Retrying server inventory");
            }
            Err(e) => return Err(e),
        }
    }
}
