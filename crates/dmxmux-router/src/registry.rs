//! Device and port identity registry.
//!
//! Devices and ports share one id space. Ids are handed out monotonically and
//! never reused, so a filter naming a removed port can never match a port
//! created later. Ports live in an id-keyed table and record only their owning
//! device id; deleting a device removes every id in its port list under the
//! same lock.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::transmit::PortTransmitter;

/// Id shared by devices and ports.
pub type EntityId = u16;
pub type DeviceId = EntityId;
pub type PortId = EntityId;

/// Device selector meaning "every device" in port enumeration.
pub const ANY_DEVICE: DeviceId = 0;

/// Maximum device/port name length in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Opaque reference attached by drivers or the bootstrap layer.
pub type Opaque = Arc<dyn Any + Send + Sync>;

/// Port capability bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const RDM: Self = Self(1 << 0);
    pub const RDM_DISCOVERY: Self = Self(1 << 1);
    pub const INPUT: Self = Self(1 << 2);
    pub const OUTPUT: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Lowercase names of the set bits.
    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::RDM, "rdm"),
            (Self::RDM_DISCOVERY, "rdm_discovery"),
            (Self::INPUT, "input"),
            (Self::OUTPUT, "output"),
        ]
        .into_iter()
        .filter(|(cap, _)| self.contains(*cap))
        .map(|(_, name)| name)
        .collect()
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capabilities").field(&self.names()).finish()
    }
}

/// Port lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    /// In the registry, not yet wired to a router.
    Registered,
    /// Accepting inbound and outbound frames.
    Active,
    /// Draining pending transmits; invisible to new traffic.
    Unregistering,
    /// Gone; the id is retired.
    Removed,
}

impl PortState {
    fn is_live(self) -> bool {
        matches!(self, PortState::Registered | PortState::Active)
    }
}

/// One (id, name) pair from an enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub ports: Vec<PortId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub id: PortId,
    pub name: String,
    pub device: DeviceId,
    pub capabilities: Capabilities,
    pub state: PortState,
}

/// Snapshot of an enumeration, ordered by id.
///
/// Iterating it does not touch the registry, and it can be iterated any
/// number of times.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    entries: Vec<EntityInfo>,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityInfo> + '_ {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }
}

impl IntoIterator for Listing {
    type Item = EntityInfo;
    type IntoIter = std::vec::IntoIter<EntityInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

struct DeviceEntry {
    name: String,
    ports: Vec<PortId>,
    owner: Option<Opaque>,
    removing: bool,
}

struct PortEntry {
    name: String,
    device: DeviceId,
    capabilities: Capabilities,
    state: PortState,
    transmitter: Arc<dyn PortTransmitter>,
    user_data: Option<Opaque>,
}

struct Tables {
    next_id: u32,
    devices: HashMap<DeviceId, DeviceEntry>,
    ports: HashMap<PortId, PortEntry>,
    retired_ports: HashSet<PortId>,
}

impl Tables {
    fn allocate(&mut self) -> Result<EntityId> {
        let id = EntityId::try_from(self.next_id)
            .map_err(|_| RouterError::ResourceExhausted("entity id space exhausted".into()))?;
        self.next_id += 1;
        Ok(id)
    }

    fn remove_port(&mut self, id: PortId) -> Option<PortEntry> {
        let entry = self.ports.remove(&id)?;
        self.retired_ports.insert(id);
        Some(entry)
    }

    fn live_port(&self, id: PortId) -> Result<&PortEntry> {
        self.ports
            .get(&id)
            .filter(|entry| entry.state.is_live())
            .ok_or_else(|| RouterError::port_not_found(id))
    }
}

/// Owner of all devices and ports.
///
/// Read access is public; devices and ports are created and removed through
/// the owning [`Router`](crate::Router), which keeps per-port transmit state
/// in step with the tables.
pub struct Registry {
    tables: Mutex<Tables>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_id: u32::from(ANY_DEVICE) + 1,
                devices: HashMap::new(),
                ports: HashMap::new(),
                retired_ports: HashSet::new(),
            }),
        }
    }

    /// Register a device and return its id.
    pub(crate) fn create_device(&self, name: &str) -> Result<DeviceId> {
        self.create_device_with_owner(name, None)
    }

    /// Register a device with an opaque owner reference.
    pub(crate) fn create_device_with_owner(
        &self,
        name: &str,
        owner: Option<Opaque>,
    ) -> Result<DeviceId> {
        validate_name(name)?;
        let mut tables = self.lock();
        let id = tables.allocate()?;
        tables.devices.insert(
            id,
            DeviceEntry {
                name: name.to_string(),
                ports: Vec::new(),
                owner,
                removing: false,
            },
        );
        debug!(device = id, name, "device created");
        Ok(id)
    }

    /// Remove a device and every port it owns, returning the removed port ids.
    pub(crate) fn delete_device(&self, id: DeviceId) -> Result<Vec<PortId>> {
        let mut tables = self.lock();
        let device = tables
            .devices
            .remove(&id)
            .ok_or_else(|| RouterError::device_not_found(id))?;
        for port in &device.ports {
            tables.remove_port(*port);
        }
        debug!(device = id, ports = device.ports.len(), "device deleted");
        Ok(device.ports)
    }

    /// Register a port under `device`.
    #[cfg(test)]
    pub(crate) fn create_port(
        &self,
        device: DeviceId,
        name: &str,
        capabilities: Capabilities,
        transmitter: Arc<dyn PortTransmitter>,
    ) -> Result<PortId> {
        self.create_port_with_data(device, name, capabilities, transmitter, None)
    }

    /// Register a port carrying driver-private data.
    pub(crate) fn create_port_with_data(
        &self,
        device: DeviceId,
        name: &str,
        capabilities: Capabilities,
        transmitter: Arc<dyn PortTransmitter>,
        user_data: Option<Opaque>,
    ) -> Result<PortId> {
        validate_name(name)?;
        let mut tables = self.lock();
        match tables.devices.get(&device) {
            Some(entry) if !entry.removing => {}
            _ => return Err(RouterError::device_not_found(device)),
        }
        let id = tables.allocate()?;
        tables.ports.insert(
            id,
            PortEntry {
                name: name.to_string(),
                device,
                capabilities,
                state: PortState::Registered,
                transmitter,
                user_data,
            },
        );
        if let Some(entry) = tables.devices.get_mut(&device) {
            entry.ports.push(id);
        }
        debug!(port = id, device, name, "port created");
        Ok(id)
    }

    /// Remove a port and detach it from its device.
    pub(crate) fn delete_port(&self, id: PortId) -> Result<()> {
        let mut tables = self.lock();
        let entry = tables
            .remove_port(id)
            .ok_or_else(|| RouterError::port_not_found(id))?;
        if let Some(device) = tables.devices.get_mut(&entry.device) {
            device.ports.retain(|port| *port != id);
        }
        debug!(port = id, device = entry.device, "port deleted");
        Ok(())
    }

    pub fn device(&self, id: DeviceId) -> Result<DeviceInfo> {
        let tables = self.lock();
        let entry = tables
            .devices
            .get(&id)
            .ok_or_else(|| RouterError::device_not_found(id))?;
        Ok(DeviceInfo {
            id,
            name: entry.name.clone(),
            ports: entry.ports.clone(),
        })
    }

    pub fn device_owner(&self, id: DeviceId) -> Result<Option<Opaque>> {
        let tables = self.lock();
        tables
            .devices
            .get(&id)
            .map(|entry| entry.owner.clone())
            .ok_or_else(|| RouterError::device_not_found(id))
    }

    pub fn port(&self, id: PortId) -> Result<PortInfo> {
        let tables = self.lock();
        let entry = tables
            .ports
            .get(&id)
            .ok_or_else(|| RouterError::port_not_found(id))?;
        Ok(PortInfo {
            id,
            name: entry.name.clone(),
            device: entry.device,
            capabilities: entry.capabilities,
            state: entry.state,
        })
    }

    pub fn port_user_data(&self, id: PortId) -> Result<Option<Opaque>> {
        let tables = self.lock();
        tables
            .ports
            .get(&id)
            .map(|entry| entry.user_data.clone())
            .ok_or_else(|| RouterError::port_not_found(id))
    }

    /// Lifecycle state of a port id; `None` if it was never a port.
    pub fn port_state(&self, id: PortId) -> Option<PortState> {
        let tables = self.lock();
        match tables.ports.get(&id) {
            Some(entry) => Some(entry.state),
            None if tables.retired_ports.contains(&id) => Some(PortState::Removed),
            None => None,
        }
    }

    /// The `index`-th port of a device, in creation order.
    pub fn port_at(&self, device: DeviceId, index: usize) -> Result<PortId> {
        let tables = self.lock();
        let entry = tables
            .devices
            .get(&device)
            .ok_or_else(|| RouterError::device_not_found(device))?;
        entry.ports.get(index).copied().ok_or_else(|| {
            RouterError::InvalidArgument(format!(
                "device {device} has {} ports, index {index} out of range",
                entry.ports.len()
            ))
        })
    }

    /// Whether the port exists and accepts traffic.
    pub fn is_live_port(&self, id: PortId) -> bool {
        self.lock().live_port(id).is_ok()
    }

    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    pub fn port_count(&self) -> usize {
        self.lock().ports.len()
    }

    pub fn list_devices(&self) -> Listing {
        let tables = self.lock();
        let mut entries: Vec<EntityInfo> = tables
            .devices
            .iter()
            .map(|(id, entry)| EntityInfo {
                id: *id,
                name: entry.name.clone(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.id);
        Listing { entries }
    }

    /// Ports of one device (in creation order) or of all devices (by id).
    pub fn list_ports(&self, device: Option<DeviceId>) -> Result<Listing> {
        let tables = self.lock();
        let entries = match device {
            Some(device) => {
                let owner = tables
                    .devices
                    .get(&device)
                    .ok_or_else(|| RouterError::device_not_found(device))?;
                owner
                    .ports
                    .iter()
                    .filter_map(|id| {
                        tables.ports.get(id).map(|entry| EntityInfo {
                            id: *id,
                            name: entry.name.clone(),
                        })
                    })
                    .collect()
            }
            None => {
                let mut entries: Vec<EntityInfo> = tables
                    .ports
                    .iter()
                    .map(|(id, entry)| EntityInfo {
                        id: *id,
                        name: entry.name.clone(),
                    })
                    .collect();
                entries.sort_by_key(|entry| entry.id);
                entries
            }
        };
        Ok(Listing { entries })
    }

    /// Count devices and, if given a buffer, fill it with as many as fit.
    ///
    /// Returns the total number of devices regardless of buffer size.
    pub fn enumerate_devices(&self, out: Option<&mut [EntityInfo]>) -> usize {
        fill(self.list_devices(), out)
    }

    /// Port counterpart of [`Registry::enumerate_devices`]; `ANY_DEVICE`
    /// selects every port.
    pub fn enumerate_ports(
        &self,
        device: DeviceId,
        out: Option<&mut [EntityInfo]>,
    ) -> Result<usize> {
        let scope = (device != ANY_DEVICE).then_some(device);
        Ok(fill(self.list_ports(scope)?, out))
    }

    pub(crate) fn transmitter(&self, id: PortId) -> Result<Arc<dyn PortTransmitter>> {
        let tables = self.lock();
        tables
            .live_port(id)
            .map(|entry| Arc::clone(&entry.transmitter))
    }

    /// Transmitter of a port that is live or still draining.
    pub(crate) fn draining_transmitter(&self, id: PortId) -> Result<Arc<dyn PortTransmitter>> {
        let tables = self.lock();
        tables
            .ports
            .get(&id)
            .map(|entry| Arc::clone(&entry.transmitter))
            .ok_or_else(|| RouterError::port_not_found(id))
    }

    pub(crate) fn set_port_state(&self, id: PortId, state: PortState) -> Result<()> {
        let mut tables = self.lock();
        let entry = tables
            .ports
            .get_mut(&id)
            .ok_or_else(|| RouterError::port_not_found(id))?;
        debug!(port = id, from = ?entry.state, to = ?state, "port state change");
        entry.state = state;
        Ok(())
    }

    /// Close a device to new ports, mark its ports as unregistering and
    /// return their ids.
    pub(crate) fn begin_device_removal(&self, id: DeviceId) -> Result<Vec<PortId>> {
        let mut tables = self.lock();
        let device = tables
            .devices
            .get_mut(&id)
            .ok_or_else(|| RouterError::device_not_found(id))?;
        device.removing = true;
        let ports = device.ports.clone();
        for port in &ports {
            if let Some(entry) = tables.ports.get_mut(port) {
                entry.state = PortState::Unregistering;
            }
        }
        Ok(ports)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RouterError::InvalidArgument("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RouterError::InvalidArgument(format!(
            "name too long ({} bytes, max {MAX_NAME_LEN})",
            name.len()
        )));
    }
    Ok(())
}

fn fill(listing: Listing, out: Option<&mut [EntityInfo]>) -> usize {
    let total = listing.len();
    if let Some(out) = out {
        for (slot, entry) in out.iter_mut().zip(listing) {
            *slot = entry;
        }
    }
    total
}
