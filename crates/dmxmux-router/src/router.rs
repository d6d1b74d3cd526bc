//! Frame router: fans inbound frames out to sessions and routes writes to
//! port transmitters.
//!
//! Three independent locks:
//! - the fan-out lock serializes `deliver`, fixing one global arrival order
//!   that every session observes; port removal takes it too, so no frame
//!   from a port is fanned out once its removal has begun;
//! - the subscriber lock guards a copy-on-write list of sessions, so fan-out
//!   iterates a snapshot that a concurrent `close` cannot disturb;
//! - each port has its own pending-transmit lock, so a backed-up port never
//!   stalls writes to another.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use dmxmux_frame::{Frame, Pushed, QueueConfig, QueueError, Timestamp};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{Result, RouterError};
use crate::registry::{Capabilities, DeviceId, Opaque, PortId, PortState, Registry};
use crate::session::{PortFilter, Session, SessionId, SessionShared};
use crate::transmit::PortTransmitter;

/// Default bound of each port's pending-transmit queue.
pub const DEFAULT_PENDING_TX_CAPACITY: usize = 32;

/// Router-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Sizing and overflow policy of every session mailbox.
    pub mailbox: QueueConfig,
    /// Frames a port may hold back while its transmitter is full.
    pub pending_tx_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mailbox: QueueConfig::default(),
            pending_tx_capacity: DEFAULT_PENDING_TX_CAPACITY,
        }
    }
}

/// Outcome of one `deliver` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Sessions whose rx filter matched.
    pub matched: usize,
    /// Matching mailboxes that discarded their oldest frame to fit this one.
    pub displaced: usize,
    /// Matching mailboxes that refused this frame.
    pub rejected: usize,
}

/// Point-in-time router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub sessions: usize,
    pub delivered: u64,
    pub fanned_out: u64,
    pub mailbox_drops: u64,
    pub transmitted: u64,
    pub queued: u64,
    pub busy: u64,
    pub transmit_errors: u64,
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    fanned_out: AtomicU64,
    mailbox_drops: AtomicU64,
    transmitted: AtomicU64,
    queued: AtomicU64,
    busy: AtomicU64,
    transmit_errors: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Default)]
struct PendingState {
    frames: VecDeque<Frame>,
    retired: bool,
}

/// Frames held back for one port until its transmitter has space.
#[derive(Default)]
struct PendingTransmit {
    state: Mutex<PendingState>,
}

impl PendingTransmit {
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Subscribers = Arc<Vec<Arc<SessionShared>>>;

struct RouterInner {
    registry: Registry,
    config: RouterConfig,
    lifecycle: Mutex<()>,
    fanout: Mutex<()>,
    subscribers: Mutex<Subscribers>,
    pending: RwLock<HashMap<PortId, Arc<PendingTransmit>>>,
    next_session: AtomicU64,
    session_count: AtomicUsize,
    counters: Counters,
}

/// Handle to a router. Clones share the same registry and sessions.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Create a router with default configuration.
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a router with explicit configuration.
    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                registry: Registry::new(),
                config: RouterConfig {
                    pending_tx_capacity: config.pending_tx_capacity.max(1),
                    ..config
                },
                lifecycle: Mutex::new(()),
                fanout: Mutex::new(()),
                subscribers: Mutex::new(Arc::new(Vec::new())),
                pending: RwLock::new(HashMap::new()),
                next_session: AtomicU64::new(1),
                session_count: AtomicUsize::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn create_device(&self, name: &str) -> Result<DeviceId> {
        self.inner.registry.create_device(name)
    }

    pub fn create_device_with_owner(&self, name: &str, owner: Option<Opaque>) -> Result<DeviceId> {
        self.inner.registry.create_device_with_owner(name, owner)
    }

    /// Register a port and make it active for traffic.
    pub fn create_port(
        &self,
        device: DeviceId,
        name: &str,
        capabilities: Capabilities,
        transmitter: Arc<dyn PortTransmitter>,
    ) -> Result<PortId> {
        self.create_port_with_data(device, name, capabilities, transmitter, None)
    }

    pub fn create_port_with_data(
        &self,
        device: DeviceId,
        name: &str,
        capabilities: Capabilities,
        transmitter: Arc<dyn PortTransmitter>,
        user_data: Option<Opaque>,
    ) -> Result<PortId> {
        let _lifecycle = self.lock_lifecycle();
        let port = self.inner.registry.create_port_with_data(
            device,
            name,
            capabilities,
            transmitter,
            user_data,
        )?;
        self.write_pending()
            .insert(port, Arc::new(PendingTransmit::default()));
        if let Err(err) = self.inner.registry.set_port_state(port, PortState::Active) {
            self.write_pending().remove(&port);
            return Err(err);
        }
        Ok(port)
    }

    /// Unregister a port: drain what its transmitter will take, discard the
    /// rest, then remove it.
    pub fn delete_port(&self, port: PortId) -> Result<()> {
        let _lifecycle = self.lock_lifecycle();
        {
            let _order = self.lock_fanout();
            self.inner
                .registry
                .set_port_state(port, PortState::Unregistering)?;
        }
        self.retire_pending(port);
        self.inner.registry.delete_port(port)
    }

    /// Unregister every port of a device, then remove the device and its
    /// ports in one registry step.
    pub fn delete_device(&self, device: DeviceId) -> Result<Vec<PortId>> {
        let _lifecycle = self.lock_lifecycle();
        let ports = {
            let _order = self.lock_fanout();
            self.inner.registry.begin_device_removal(device)?
        };
        for port in &ports {
            self.retire_pending(*port);
        }
        let removed = self.inner.registry.delete_device(device)?;
        for port in &removed {
            self.retire_pending(*port);
        }
        Ok(removed)
    }

    /// Open a session receiving every port.
    pub fn open(&self) -> Session {
        self.open_with_filter(PortFilter::all())
    }

    /// Open a session with a pre-seeded rx filter.
    pub fn open_with_filter(&self, rx_filter: PortFilter) -> Session {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(SessionShared::new(id, self.inner.config.mailbox, rx_filter));

        let mut subscribers = self.lock_subscribers();
        let mut next = Vec::with_capacity(subscribers.len() + 1);
        next.extend(subscribers.iter().cloned());
        next.push(Arc::clone(&shared));
        *subscribers = Arc::new(next);
        self.inner
            .session_count
            .store(subscribers.len(), Ordering::Relaxed);
        drop(subscribers);

        debug!(session = id, "session opened");
        Session::new(shared, self.clone())
    }

    pub fn session_count(&self) -> usize {
        self.inner.session_count.load(Ordering::Relaxed)
    }

    pub(crate) fn unsubscribe(&self, session: SessionId) {
        let mut subscribers = self.lock_subscribers();
        let next: Vec<_> = subscribers
            .iter()
            .filter(|shared| shared.id() != session)
            .cloned()
            .collect();
        *subscribers = Arc::new(next);
        self.inner
            .session_count
            .store(subscribers.len(), Ordering::Relaxed);
    }

    /// Hand an inbound frame from `port` to every matching session.
    ///
    /// Never waits on a consumer: full mailboxes drop or refuse according to
    /// their overflow policy and the loss is reported.
    pub fn deliver(&self, port: PortId, mut frame: Frame) -> Result<DeliveryReport> {
        frame.validate()?;
        frame.port = port;
        if frame.arrival.is_none() {
            frame.stamp_arrival(Timestamp::now());
        }

        let _order = self.lock_fanout();
        if !self.inner.registry.is_live_port(port) {
            return Err(RouterError::port_not_found(port));
        }
        let snapshot: Subscribers = Arc::clone(&self.lock_subscribers());

        let mut report = DeliveryReport::default();
        for session in snapshot.iter().filter(|s| s.accepts(port)) {
            report.matched += 1;
            match session.mailbox().push_back(frame.clone()) {
                Ok(Pushed::Queued) => {}
                Ok(Pushed::DisplacedOldest) => report.displaced += 1,
                Err(QueueError::Closed) => report.matched -= 1,
                Err(err) => {
                    report.rejected += 1;
                    warn!(session = session.id(), port, error = %err, "mailbox refused frame");
                }
            }
        }

        let counters = &self.inner.counters;
        counters.delivered.fetch_add(1, Ordering::Relaxed);
        counters
            .fanned_out
            .fetch_add((report.matched - report.rejected) as u64, Ordering::Relaxed);
        counters
            .mailbox_drops
            .fetch_add((report.displaced + report.rejected) as u64, Ordering::Relaxed);
        trace!(port, matched = report.matched, "frame delivered");
        Ok(report)
    }

    /// Send `frame` on `port` now if its transmitter has space, otherwise
    /// hold it in the port's pending queue.
    ///
    /// Frames already pending go first, so per-port order is preserved.
    pub fn route_write(&self, session: SessionId, port: PortId, mut frame: Frame) -> Result<()> {
        let transmitter = self.inner.registry.transmitter(port)?;
        let pending = self
            .pending_for(port)
            .ok_or_else(|| RouterError::port_not_found(port))?;
        frame.port = port;

        let mut state = pending.lock();
        if state.retired {
            return Err(RouterError::port_not_found(port));
        }

        let counters = &self.inner.counters;
        if state.frames.is_empty() && transmitter.transmitter_has_space(port) {
            transmitter.send_frame(port, &frame).map_err(|source| {
                counters.transmit_errors.fetch_add(1, Ordering::Relaxed);
                RouterError::Transmit { port, source }
            })?;
            counters.transmitted.fetch_add(1, Ordering::Relaxed);
            trace!(session, port, "frame transmitted");
            return Ok(());
        }

        let capacity = self.inner.config.pending_tx_capacity;
        if state.frames.len() >= capacity {
            counters.busy.fetch_add(1, Ordering::Relaxed);
            return Err(RouterError::Busy { port, capacity });
        }
        state.frames.push_back(frame);
        counters.queued.fetch_add(1, Ordering::Relaxed);
        trace!(session, port, pending = state.frames.len(), "frame queued for transmit");
        Ok(())
    }

    /// Drain step: called by a driver when `port` has room again.
    ///
    /// Returns how many pending frames were handed to the transmitter.
    pub fn transmit_ready(&self, port: PortId) -> Result<usize> {
        let transmitter = self.inner.registry.transmitter(port)?;
        let pending = self
            .pending_for(port)
            .ok_or_else(|| RouterError::port_not_found(port))?;
        let mut state = pending.lock();
        Ok(self.drain(port, transmitter.as_ref(), &mut state))
    }

    /// Frames currently held back for `port`.
    pub fn pending_transmits(&self, port: PortId) -> Result<usize> {
        self.pending_for(port)
            .map(|pending| pending.lock().frames.len())
            .ok_or_else(|| RouterError::port_not_found(port))
    }

    pub fn stats(&self) -> RouterStats {
        let counters = &self.inner.counters;
        RouterStats {
            sessions: self.session_count(),
            delivered: counters.delivered.load(Ordering::Relaxed),
            fanned_out: counters.fanned_out.load(Ordering::Relaxed),
            mailbox_drops: counters.mailbox_drops.load(Ordering::Relaxed),
            transmitted: counters.transmitted.load(Ordering::Relaxed),
            queued: counters.queued.load(Ordering::Relaxed),
            busy: counters.busy.load(Ordering::Relaxed),
            transmit_errors: counters.transmit_errors.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
        }
    }

    fn drain(
        &self,
        port: PortId,
        transmitter: &dyn PortTransmitter,
        state: &mut PendingState,
    ) -> usize {
        let counters = &self.inner.counters;
        let mut sent = 0;
        while !state.frames.is_empty() && transmitter.transmitter_has_space(port) {
            let Some(frame) = state.frames.pop_front() else {
                break;
            };
            match transmitter.send_frame(port, &frame) {
                Ok(()) => {
                    sent += 1;
                    counters.transmitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    counters.transmit_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(port, error = %err, "pending frame transmit failed");
                }
            }
        }
        sent
    }

    fn retire_pending(&self, port: PortId) {
        let Some(pending) = self.write_pending().remove(&port) else {
            return;
        };
        let mut state = pending.lock();
        state.retired = true;
        if let Ok(transmitter) = self.inner.registry.draining_transmitter(port) {
            self.drain(port, transmitter.as_ref(), &mut state);
        }
        let discarded = state.frames.len();
        state.frames.clear();
        if discarded > 0 {
            self.inner
                .counters
                .discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            warn!(port, discarded, "port removed with frames still pending");
        }
    }

    fn pending_for(&self, port: PortId) -> Option<Arc<PendingTransmit>> {
        self.inner
            .pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&port)
            .cloned()
    }

    fn write_pending(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<PortId, Arc<PendingTransmit>>> {
        self.inner
            .pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_fanout(&self) -> MutexGuard<'_, ()> {
        self.inner
            .fanout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
