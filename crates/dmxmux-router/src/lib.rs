//! Device/port registry, per-session mailboxes and frame routing.
//!
//! Board drivers register devices and ports and push received frames in with
//! [`Router::deliver`]. Each open [`Session`] gets its own mailbox, fed by
//! fan-out according to the session's rx filter, and writes back out through
//! the port's [`PortTransmitter`].
//!
//! ```
//! use std::sync::Arc;
//! use dmxmux_frame::Frame;
//! use dmxmux_router::{Capabilities, NullTransmitter, Router};
//!
//! let router = Router::new();
//! let card = router.create_device("card0").unwrap();
//! let port = router
//!     .create_port(card, "card0:0", Capabilities::INPUT, Arc::new(NullTransmitter))
//!     .unwrap();
//!
//! let session = router.open();
//! router.deliver(port, Frame::dmx(port, vec![0xff, 0x00])).unwrap();
//! assert_eq!(session.try_read().unwrap().payload.as_ref(), &[0xff, 0x00]);
//! ```

pub mod control;
pub mod endpoint;
pub mod error;
pub mod registry;
pub mod router;
pub mod session;
pub mod topology;
pub mod transmit;

pub use control::{ControlRequest, ControlResponse};
pub use endpoint::Endpoint;
pub use error::{EntityKind, ErrorKind, Result, RouterError};
pub use registry::{
    Capabilities, DeviceId, DeviceInfo, EntityId, EntityInfo, Listing, Opaque, PortId, PortInfo,
    PortState, Registry, ANY_DEVICE, MAX_NAME_LEN,
};
pub use router::{DeliveryReport, Router, RouterConfig, RouterStats, DEFAULT_PENDING_TX_CAPACITY};
pub use session::{PortFilter, Session, SessionId};
pub use topology::{
    BuiltTopology, CapabilityName, DeviceConfig, PortConfig, RouterSettings, TopologyConfig,
};
pub use transmit::{NullTransmitter, PortTransmitter, StreamTransmitter};
