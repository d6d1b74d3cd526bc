use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dmxmux_frame::FrameReader;
use dmxmux_router::{Endpoint, ErrorKind, NullTransmitter, PortFilter, Router, RouterError, Session};
use tracing::{debug, info, warn};

use crate::cmd::{load_topology, open_input, MonitorArgs};
use crate::exit::{frame_error, router_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, print_stats, OutputFormat};

/// How often the reader wakes to check for Ctrl-C and end of input.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_topology(args.config.as_deref())?;
    let router = config
        .build(|_, _| Arc::new(NullTransmitter))
        .map_err(|err| router_error("topology build failed", err))?;
    let session = open_session(&router, &args)?;
    info!(
        session = session.id(),
        filter = ?session.rx_filter().to_vec(),
        "monitoring"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let input_done = Arc::new(AtomicBool::new(false));
    let pump = {
        let router = router.clone();
        let input = open_input(args.input.as_deref())?;
        let input_done = Arc::clone(&input_done);
        let remap = args.port;
        thread::Builder::new()
            .name("dmxmux-pump".into())
            .spawn(move || {
                let result = pump_frames(&router, input, remap);
                input_done.store(true, Ordering::SeqCst);
                result
            })
            .map_err(|err| CliError::new(INTERNAL, format!("pump thread failed: {err}")))?
    };

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match session.read_timeout(POLL_INTERVAL) {
            Ok(frame) => {
                print_frame(&frame, format)?;
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RouterError::TimedOut(_)) => {
                if input_done.load(Ordering::SeqCst) && session.pending() == 0 {
                    break;
                }
            }
            Err(err) => return Err(router_error("read failed", err)),
        }
    }

    if input_done.load(Ordering::SeqCst) {
        let delivered = pump
            .join()
            .map_err(|_| CliError::new(INTERNAL, "pump thread panicked"))??;
        debug!(delivered, printed, "input exhausted");
    }
    if args.stats {
        print_stats(&router.stats(), format);
    }
    session.close();
    Ok(SUCCESS)
}

fn open_session(router: &Router, args: &MonitorArgs) -> CliResult<Session> {
    if let Some(name) = &args.endpoint {
        let endpoint: Endpoint = name
            .parse()
            .map_err(|err| router_error("invalid endpoint", err))?;
        return router
            .open_endpoint(endpoint)
            .map_err(|err| router_error("open endpoint failed", err));
    }

    let filter: PortFilter = args.ports.iter().flatten().copied().collect();
    for port in filter.iter() {
        if !router.registry().is_live_port(port) {
            warn!(port, "filter names a port not in the topology");
        }
    }
    Ok(router.open_with_filter(filter))
}

/// Deliver every record from `input`; returns how many were routed.
fn pump_frames(router: &Router, input: impl Read, remap: Option<u16>) -> CliResult<usize> {
    let mut reader = FrameReader::new(input);
    let mut delivered = 0usize;
    while let Some(frame) = reader
        .next_frame()
        .map_err(|err| frame_error("input decode failed", err))?
    {
        let port = remap.unwrap_or(frame.port);
        match router.deliver(port, frame) {
            Ok(_) => delivered += 1,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(port, "dropping frame for unknown port");
            }
            Err(err) => return Err(router_error("deliver failed", err)),
        }
    }
    Ok(delivered)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use dmxmux_frame::{Frame, FrameWriter};
    use dmxmux_router::Capabilities;

    use super::*;

    fn records(frames: &[Frame]) -> Cursor<Vec<u8>> {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_batch(frames).unwrap();
        Cursor::new(writer.into_inner())
    }

    #[test]
    fn pump_skips_unknown_ports() {
        let router = Router::new();
        let dev = router.create_device("card0").unwrap();
        let port = router
            .create_port(dev, "card0:0", Capabilities::INPUT, Arc::new(NullTransmitter))
            .unwrap();
        let session = router.open();

        let input = records(&[
            Frame::dmx(port, vec![1]),
            Frame::dmx(900, vec![2]),
            Frame::dmx(port, vec![3]),
        ]);
        assert_eq!(pump_frames(&router, input, None).unwrap(), 2);
        assert_eq!(session.pending(), 2);
    }

    #[test]
    fn pump_remaps_port() {
        let router = Router::new();
        let dev = router.create_device("card0").unwrap();
        let port = router
            .create_port(dev, "card0:0", Capabilities::INPUT, Arc::new(NullTransmitter))
            .unwrap();
        let session = router.open();

        let input = records(&[Frame::dmx(900, vec![1])]);
        assert_eq!(pump_frames(&router, input, Some(port)).unwrap(), 1);
        assert_eq!(session.try_read().unwrap().port, port);
    }
}
