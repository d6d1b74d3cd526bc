//! Sessions: filtered, ordered views of inbound traffic plus an outbound path.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dmxmux_frame::{Frame, FrameQueue, QueueConfig, Wait};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::registry::PortId;
use crate::router::Router;

pub type SessionId = u64;

/// Set of port ids. An empty filter matches every port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PortFilter(BTreeSet<PortId>);

impl PortFilter {
    /// Filter matching every port.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, port: PortId) -> bool {
        self.0.is_empty() || self.0.contains(&port)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, port: PortId) -> bool {
        self.0.contains(&port)
    }

    pub fn iter(&self) -> impl Iterator<Item = PortId> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<PortId> {
        self.iter().collect()
    }
}

impl FromIterator<PortId> for PortFilter {
    fn from_iter<I: IntoIterator<Item = PortId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[PortId; N]> for PortFilter {
    fn from(ports: [PortId; N]) -> Self {
        ports.into_iter().collect()
    }
}

/// State shared between a session handle and the router's subscriber set.
pub(crate) struct SessionShared {
    id: SessionId,
    open: AtomicBool,
    rx_filter: RwLock<PortFilter>,
    tx_filter: RwLock<PortFilter>,
    mailbox: FrameQueue,
}

impl SessionShared {
    pub(crate) fn new(id: SessionId, mailbox: QueueConfig, rx_filter: PortFilter) -> Self {
        Self {
            id,
            open: AtomicBool::new(true),
            rx_filter: RwLock::new(rx_filter),
            tx_filter: RwLock::new(PortFilter::all()),
            mailbox: FrameQueue::with_config(mailbox),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn accepts(&self, port: PortId) -> bool {
        self.rx_filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .matches(port)
    }

    pub(crate) fn mailbox(&self) -> &FrameQueue {
        &self.mailbox
    }
}

/// An open consumer/producer handle.
///
/// A session is independent of device and port lifetimes: it holds only port
/// ids in its filters, and a filter naming a removed port simply stops
/// matching. All methods take `&self`, so a session can be shared between a
/// thread blocked in [`Session::read`] and another that calls
/// [`Session::close`]. Dropping the handle closes the session.
pub struct Session {
    shared: Arc<SessionShared>,
    router: Router,
}

impl Session {
    pub(crate) fn new(shared: Arc<SessionShared>, router: Router) -> Self {
        Self { shared, router }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Replace the receive filter; an empty set receives every port.
    ///
    /// Frames already in the mailbox are unaffected.
    pub fn set_rx_filter(&self, ports: impl IntoIterator<Item = PortId>) -> Result<()> {
        self.ensure_open()?;
        let filter: PortFilter = ports.into_iter().collect();
        debug!(session = self.id(), ports = ?filter.to_vec(), "rx filter set");
        *self
            .shared
            .rx_filter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = filter;
        Ok(())
    }

    pub fn rx_filter(&self) -> PortFilter {
        self.shared
            .rx_filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the transmit filter; an empty set permits every port.
    pub fn set_tx_filter(&self, ports: impl IntoIterator<Item = PortId>) -> Result<()> {
        self.ensure_open()?;
        let filter: PortFilter = ports.into_iter().collect();
        debug!(session = self.id(), ports = ?filter.to_vec(), "tx filter set");
        *self
            .shared
            .tx_filter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = filter;
        Ok(())
    }

    pub fn tx_filter(&self) -> PortFilter {
        self.shared
            .tx_filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the next frame from the mailbox.
    ///
    /// `Wait::NonBlocking` (or `None`) fails with `WouldBlock` when the
    /// mailbox is empty. Otherwise the caller sleeps until a frame arrives
    /// (`Ok`), the timeout elapses (`TimedOut`) or the session is closed
    /// (`Closed`).
    pub fn read(&self, wait: impl Into<Wait>) -> Result<Frame> {
        self.shared.mailbox.pop_wait(wait.into()).map_err(Into::into)
    }

    pub fn try_read(&self) -> Result<Frame> {
        self.read(Wait::NonBlocking)
    }

    pub fn read_timeout(&self, timeout: Duration) -> Result<Frame> {
        self.read(Wait::Timeout(timeout))
    }

    pub fn read_blocking(&self) -> Result<Frame> {
        self.read(Wait::Forever)
    }

    /// The next frame without consuming it.
    pub fn peek(&self) -> Option<Frame> {
        self.shared.mailbox.peek_front()
    }

    /// Frames waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.shared.mailbox.len()
    }

    /// Frames this session lost to mailbox overflow.
    pub fn dropped(&self) -> u64 {
        self.shared.mailbox.dropped()
    }

    /// Send a frame to the port named by `frame.port`.
    ///
    /// Fails with `NotFound` if the port does not exist and with
    /// `PermissionDenied` if a tx filter is set and excludes it.
    pub fn write(&self, frame: Frame) -> Result<()> {
        self.ensure_open()?;
        frame.validate()?;
        let port = frame.port;
        if !self.router.registry().is_live_port(port) {
            return Err(RouterError::port_not_found(port));
        }
        if !self.tx_filter().matches(port) {
            return Err(RouterError::PermissionDenied(port));
        }
        self.router.route_write(self.id(), port, frame)
    }

    /// Close the session. Idempotent.
    ///
    /// Any thread blocked in `read` returns `Closed`.
    pub fn close(&self) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.router.unsubscribe(self.id());
        let discarded = self.shared.mailbox.close();
        debug!(session = self.id(), discarded, "session closed");
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(RouterError::Closed)
        }
    }

    pub(crate) fn router(&self) -> &Router {
        &self.router
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("open", &self.is_open())
            .field("rx_filter", &self.rx_filter())
            .field("tx_filter", &self.tx_filter())
            .finish()
    }
}
