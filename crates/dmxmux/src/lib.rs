//! DMX512/RDM frame multiplexer.
//!
//! dmxmux sits between board drivers and the applications that consume and
//! produce lighting-control frames. Drivers register devices and ports and
//! push received frames in; applications open sessions, choose which ports
//! they hear, and write frames back out.
//!
//! # Crate Structure
//!
//! - [`frame`]: Frame model, packed wire record, stream reader/writer and the
//!   bounded frame queue
//! - [`router`]: Device/port registry, sessions, fan-out and transmit routing

/// Re-export frame types.
pub mod frame {
    pub use dmxmux_frame::*;
}

/// Re-export registry, session and routing types.
pub mod router {
    pub use dmxmux_router::*;
}
