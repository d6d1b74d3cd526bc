//! Declarative topology: router settings plus the devices and ports to
//! register, loaded from JSON.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use dmxmux_frame::{OverflowPolicy, QueueConfig, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::registry::{Capabilities, DeviceId, PortId};
use crate::router::{Router, RouterConfig, DEFAULT_PENDING_TX_CAPACITY};
use crate::transmit::PortTransmitter;

/// Largest topology file accepted by [`TopologyConfig::load`].
pub const MAX_TOPOLOGY_FILE_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyConfig {
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterSettings {
    /// Per-session mailbox bound; `null` is unbounded.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_pending_tx_capacity")]
    pub pending_tx_capacity: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            overflow: OverflowPolicy::default(),
            pending_tx_capacity: default_pending_tx_capacity(),
        }
    }
}

fn default_mailbox_capacity() -> Option<usize> {
    Some(DEFAULT_QUEUE_CAPACITY)
}

fn default_pending_tx_capacity() -> usize {
    DEFAULT_PENDING_TX_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortConfig {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityName>,
}

impl PortConfig {
    pub fn capability_mask(&self) -> Capabilities {
        self.capabilities
            .iter()
            .fold(Capabilities::empty(), |mask, cap| mask | Capabilities::from(*cap))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityName {
    Rdm,
    RdmDiscovery,
    Input,
    Output,
}

impl From<CapabilityName> for Capabilities {
    fn from(name: CapabilityName) -> Self {
        match name {
            CapabilityName::Rdm => Capabilities::RDM,
            CapabilityName::RdmDiscovery => Capabilities::RDM_DISCOVERY,
            CapabilityName::Input => Capabilities::INPUT,
            CapabilityName::Output => Capabilities::OUTPUT,
        }
    }
}

/// Ids assigned while building a topology, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltTopology {
    pub devices: Vec<(DeviceId, Vec<PortId>)>,
}

impl BuiltTopology {
    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.devices.iter().flat_map(|(_, ports)| ports.iter().copied())
    }
}

impl TopologyConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| RouterError::Config(err.to_string()))
    }

    /// Read and parse a topology file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|err| RouterError::Config(format!("{}: {err}", path.display())))?;
        let read_limit = u64::try_from(MAX_TOPOLOGY_FILE_SIZE.saturating_add(1)).unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(read_limit)
            .read_to_string(&mut content)
            .map_err(|err| RouterError::Config(format!("{}: {err}", path.display())))?;
        if content.len() > MAX_TOPOLOGY_FILE_SIZE {
            return Err(RouterError::Config(format!(
                "{}: file exceeds {MAX_TOPOLOGY_FILE_SIZE} bytes",
                path.display()
            )));
        }
        Self::from_json(&content)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            mailbox: QueueConfig {
                capacity: self.router.mailbox_capacity,
                overflow: self.router.overflow,
            },
            pending_tx_capacity: self.router.pending_tx_capacity,
        }
    }

    /// Create a router and register every device and port.
    ///
    /// `transmitter` is asked for each port's transmit side in declaration
    /// order.
    pub fn build<F>(&self, transmitter: F) -> Result<Router>
    where
        F: FnMut(&DeviceConfig, &PortConfig) -> Arc<dyn PortTransmitter>,
    {
        self.build_with_ids(transmitter).map(|(router, _)| router)
    }

    /// Like [`TopologyConfig::build`], also returning the assigned ids.
    pub fn build_with_ids<F>(&self, mut transmitter: F) -> Result<(Router, BuiltTopology)>
    where
        F: FnMut(&DeviceConfig, &PortConfig) -> Arc<dyn PortTransmitter>,
    {
        let router = Router::with_config(self.router_config());
        let mut built = BuiltTopology::default();
        for device in &self.devices {
            let device_id = router.create_device(&device.name)?;
            let mut ports = Vec::with_capacity(device.ports.len());
            for port in &device.ports {
                let id = router.create_port(
                    device_id,
                    &port.name,
                    port.capability_mask(),
                    transmitter(device, port),
                )?;
                ports.push(id);
            }
            built.devices.push((device_id, ports));
        }
        debug!(
            devices = built.devices.len(),
            ports = built.ports().count(),
            "topology built"
        );
        Ok((router, built))
    }
}
