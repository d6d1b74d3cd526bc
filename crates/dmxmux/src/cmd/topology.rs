use std::sync::Arc;

use dmxmux_router::NullTransmitter;
use tracing::info;

use crate::cmd::{load_topology, TopologyArgs};
use crate::exit::{router_error, CliResult, SUCCESS};
use crate::output::{print_topology, OutputFormat};

pub fn run(args: TopologyArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_topology(args.config.as_deref())?;
    let router = config
        .build(|_, _| Arc::new(NullTransmitter))
        .map_err(|err| router_error("topology build failed", err))?;
    info!(
        devices = router.registry().device_count(),
        ports = router.registry().port_count(),
        "topology loaded"
    );

    let endpoints: Vec<String> = router.endpoints().iter().map(ToString::to_string).collect();
    print_topology(router.registry(), &endpoints, format);
    Ok(SUCCESS)
}
