//! Session-scoped control operations in request/response form.
//!
//! These mirror the typed methods on [`Session`] and [`Registry`] for callers
//! that speak a serialized protocol (the CLI, or a driver bridge).
//!
//! [`Registry`]: crate::registry::Registry

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, RouterError};
use crate::registry::{DeviceId, EntityInfo, PortId, ANY_DEVICE};
use crate::session::{PortFilter, Session};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// `capacity: None` asks for the count only.
    EnumerateDevices {
        #[serde(default)]
        capacity: Option<usize>,
    },
    /// Device `0` enumerates the ports of every device.
    EnumeratePorts {
        #[serde(default)]
        device: DeviceId,
        #[serde(default)]
        capacity: Option<usize>,
    },
    GetRxFilter {
        #[serde(default)]
        capacity: Option<usize>,
    },
    /// Apply the first `count` ids of `ports`; a count of 0 clears the filter.
    SetRxFilter {
        count: usize,
        #[serde(default)]
        ports: Vec<PortId>,
    },
    GetTxFilter {
        #[serde(default)]
        capacity: Option<usize>,
    },
    SetTxFilter {
        count: usize,
        #[serde(default)]
        ports: Vec<PortId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    /// `count` is the total available; `entries` holds at most the requested
    /// capacity.
    Entities {
        count: usize,
        entries: Vec<EntityInfo>,
    },
    Filter {
        count: usize,
        ports: Vec<PortId>,
    },
    Done,
}

impl Session {
    /// Execute one control request against this session.
    pub fn control(&self, request: ControlRequest) -> Result<ControlResponse> {
        self.ensure_open()?;
        trace!(session = self.id(), ?request, "control request");
        let registry = self.router().registry();
        match request {
            ControlRequest::EnumerateDevices { capacity } => {
                let mut buf = buffer(capacity);
                let count = registry.enumerate_devices(buf.as_deref_mut());
                Ok(entities(count, buf))
            }
            ControlRequest::EnumeratePorts { device, capacity } => {
                let mut buf = buffer(capacity);
                let count = registry.enumerate_ports(device, buf.as_deref_mut())?;
                Ok(entities(count, buf))
            }
            ControlRequest::GetRxFilter { capacity } => Ok(filter(&self.rx_filter(), capacity)),
            ControlRequest::SetRxFilter { count, ports } => {
                self.set_rx_filter(leading(count, &ports)?.iter().copied())?;
                Ok(ControlResponse::Done)
            }
            ControlRequest::GetTxFilter { capacity } => Ok(filter(&self.tx_filter(), capacity)),
            ControlRequest::SetTxFilter { count, ports } => {
                self.set_tx_filter(leading(count, &ports)?.iter().copied())?;
                Ok(ControlResponse::Done)
            }
        }
    }
}

fn buffer(capacity: Option<usize>) -> Option<Vec<EntityInfo>> {
    // Ids are u16, so no enumeration can exceed this.
    capacity.map(|cap| vec![EntityInfo::default(); cap.min(usize::from(u16::MAX))])
}

fn entities(count: usize, buf: Option<Vec<EntityInfo>>) -> ControlResponse {
    let mut entries = buf.unwrap_or_default();
    entries.truncate(count);
    ControlResponse::Entities { count, entries }
}

fn filter(filter: &PortFilter, capacity: Option<usize>) -> ControlResponse {
    let limit = capacity.unwrap_or(0);
    ControlResponse::Filter {
        count: filter.len(),
        ports: filter.iter().take(limit).collect(),
    }
}

fn leading(count: usize, ports: &[PortId]) -> Result<&[PortId]> {
    ports.get(..count).ok_or_else(|| {
        RouterError::InvalidArgument(format!(
            "filter count {count} exceeds {} supplied ids",
            ports.len()
        ))
    })
}

impl ControlRequest {
    /// Count-only enumeration of every port.
    pub fn count_ports() -> Self {
        ControlRequest::EnumeratePorts {
            device: ANY_DEVICE,
            capacity: None,
        }
    }
}
