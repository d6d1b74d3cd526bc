//! Named entry points that open pre-filtered sessions.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RouterError};
use crate::registry::{DeviceId, PortId};
use crate::router::Router;
use crate::session::{PortFilter, Session};

const PREFIX: &str = "dmx";

/// `dmx`, `dmx<dev>` or `dmx<dev>p<port>`.
///
/// `<port>` is the router-wide port id, the same id frames carry and rx
/// filters hold, not the port's index within the device. Use
/// [`Registry::port_at`](crate::Registry::port_at) to turn an index into an
/// id. The device segment must still name the port's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    All,
    Device(DeviceId),
    Port { device: DeviceId, port: PortId },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::All => f.write_str(PREFIX),
            Endpoint::Device(device) => write!(f, "{PREFIX}{device}"),
            Endpoint::Port { device, port } => write!(f, "{PREFIX}{device}p{port}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RouterError::InvalidArgument(format!("invalid endpoint name: {s:?}"));
        let rest = s.strip_prefix(PREFIX).ok_or_else(invalid)?;
        if rest.is_empty() {
            return Ok(Endpoint::All);
        }
        let id = |digits: &str| -> Result<u16> {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            digits.parse().map_err(|_| invalid())
        };
        match rest.split_once('p') {
            None => Ok(Endpoint::Device(id(rest)?)),
            Some((device, port)) => Ok(Endpoint::Port {
                device: id(device)?,
                port: id(port)?,
            }),
        }
    }
}

impl Router {
    /// Open a session whose rx filter covers the endpoint.
    ///
    /// A device endpoint snapshots the device's ports at open time. For a
    /// device with no ports the filter holds the device id itself, which no
    /// port can carry, so the session receives nothing rather than
    /// everything.
    pub fn open_endpoint(&self, endpoint: Endpoint) -> Result<Session> {
        let filter = match endpoint {
            Endpoint::All => PortFilter::all(),
            Endpoint::Device(device) => {
                let info = self.registry().device(device)?;
                if info.ports.is_empty() {
                    PortFilter::from([device])
                } else {
                    info.ports.into_iter().collect()
                }
            }
            Endpoint::Port { device, port } => {
                let info = self.registry().port(port)?;
                if info.device != device || !self.registry().is_live_port(port) {
                    return Err(RouterError::port_not_found(port));
                }
                PortFilter::from([port])
            }
        };
        Ok(self.open_with_filter(filter))
    }

    /// Every endpoint that can currently be opened.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let registry = self.registry();
        let mut out = vec![Endpoint::All];
        for device in registry.list_devices().ids() {
            out.push(Endpoint::Device(device));
            if let Ok(ports) = registry.list_ports(Some(device)) {
                out.extend(
                    ports
                        .ids()
                        .into_iter()
                        .map(|port| Endpoint::Port { device, port }),
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dmxmux_frame::Frame;

    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::Capabilities;
    use crate::transmit::NullTransmitter;

    #[test]
    fn names_round_trip() {
        for (name, endpoint) in [
            ("dmx", Endpoint::All),
            ("dmx3", Endpoint::Device(3)),
            ("dmx3p4", Endpoint::Port { device: 3, port: 4 }),
        ] {
            assert_eq!(name.parse::<Endpoint>().unwrap(), endpoint);
            assert_eq!(endpoint.to_string(), name);
        }
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in ["", "dm", "dmxp", "dmx1p", "dmxx", "dmx+1", "dmx70000", "dmx1p2p3"] {
            let err = name.parse::<Endpoint>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{name}");
        }
    }

    #[test]
    fn device_endpoint_sees_only_its_ports() {
        let router = Router::new();
        let card0 = router.create_device("card0").unwrap();
        let card1 = router.create_device("card1").unwrap();
        let p0 = router
            .create_port(card0, "card0:0", Capabilities::INPUT, Arc::new(NullTransmitter))
            .unwrap();
        let p1 = router
            .create_port(card1, "card1:0", Capabilities::INPUT, Arc::new(NullTransmitter))
            .unwrap();

        let session = router.open_endpoint(Endpoint::Device(card0)).unwrap();
        router.deliver(p1, Frame::dmx(p1, vec![1])).unwrap();
        router.deliver(p0, Frame::dmx(p0, vec![2])).unwrap();

        assert_eq!(session.try_read().unwrap().port, p0);
        assert_eq!(session.try_read().unwrap_err().kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn empty_device_endpoint_receives_nothing() {
        let router = Router::new();
        let empty = router.create_device("empty").unwrap();
        let card = router.create_device("card").unwrap();
        let port = router
            .create_port(card, "card:0", Capabilities::INPUT, Arc::new(NullTransmitter))
            .unwrap();

        let session = router.open_endpoint(Endpoint::Device(empty)).unwrap();
        router.deliver(port, Frame::dmx(port, vec![1])).unwrap();
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn port_endpoint_must_belong_to_device() {
        let router = Router::new();
        let card0 = router.create_device("card0").unwrap();
        let card1 = router.create_device("card1").unwrap();
        let port = router
            .create_port(card0, "card0:0", Capabilities::INPUT, Arc::new(NullTransmitter))
            .unwrap();

        let session = router
            .open_endpoint(Endpoint::Port {
                device: card0,
                port,
            })
            .unwrap();
        assert_eq!(session.rx_filter().to_vec(), vec![port]);

        let err = router
            .open_endpoint(Endpoint::Port {
                device: card1,
                port,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            router.open_endpoint(Endpoint::Device(99)).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn port_segment_is_a_port_id_not_an_index() {
        let router = Router::new();
        let dev = router.create_device("card0").unwrap();
        let ports: Vec<PortId> = (0..2)
            .map(|i| {
                router
                    .create_port(
                        dev,
                        &format!("card0:{i}"),
                        Capabilities::INPUT,
                        Arc::new(NullTransmitter),
                    )
                    .unwrap()
            })
            .collect();

        let by_index = format!("dmx{dev}p0").parse::<Endpoint>().unwrap();
        assert_eq!(
            router.open_endpoint(by_index).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let second = router.registry().port_at(dev, 1).unwrap();
        assert_eq!(second, ports[1]);
        let session = router
            .open_endpoint(format!("dmx{dev}p{second}").parse().unwrap())
            .unwrap();
        assert_eq!(session.rx_filter().to_vec(), vec![ports[1]]);
    }

    #[test]
    fn endpoints_follow_registry() {
        let router = Router::new();
        let dev = router.create_device("card0").unwrap();
        let port = router
            .create_port(dev, "card0:0", Capabilities::INPUT, Arc::new(NullTransmitter))
            .unwrap();

        let names: Vec<String> = router.endpoints().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["dmx".to_string(), format!("dmx{dev}"), format!("dmx{dev}p{port}")]);

        router.delete_device(dev).unwrap();
        assert_eq!(router.endpoints(), vec![Endpoint::All]);
    }
}
