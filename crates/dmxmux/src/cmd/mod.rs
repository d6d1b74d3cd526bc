use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use dmxmux_router::{CapabilityName, DeviceConfig, PortConfig, TopologyConfig};

use crate::exit::{router_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod envinfo;
pub mod monitor;
pub mod topology;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a topology and print its devices, ports and endpoints.
    Topology(TopologyArgs),
    /// Write one frame as a packed wire record.
    Encode(EncodeArgs),
    /// Print frames read from a stream of wire records.
    Decode(DecodeArgs),
    /// Route wire records through a router and print what a session receives.
    Monitor(MonitorArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Topology(args) => topology::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct TopologyArgs {
    /// Topology file (JSON). Default: one virtual device with four ports.
    #[arg(long, value_name = "FILE", env = "DMXMUX_TOPOLOGY")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Port id written into the record.
    #[arg(long, short = 'p')]
    pub port: u16,
    /// Start code (decimal or 0x-prefixed hex).
    #[arg(long, default_value = "0x00", value_parser = parse_u8)]
    pub start_code: u8,
    /// Payload slots as hex bytes, e.g. "ff 00 80" or "ff0080".
    #[arg(long, default_value = "")]
    pub data: String,
    /// Break length in 4 µs units (0 = driver default).
    #[arg(long, default_value_t = 0)]
    pub break_size: u8,
    /// Send without a break.
    #[arg(long)]
    pub no_break: bool,
    /// Mark the frame as RDM.
    #[arg(long)]
    pub rdm: bool,
    /// Mark the frame as an RDM discovery request.
    #[arg(long, requires = "rdm")]
    pub discovery: bool,
    /// Append to this file instead of writing to stdout.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Input file of wire records; "-" or absent reads stdin.
    pub input: Option<PathBuf>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Topology file (JSON). Default: one virtual device with four ports.
    #[arg(long, value_name = "FILE", env = "DMXMUX_TOPOLOGY")]
    pub config: Option<PathBuf>,
    /// Input file of wire records; "-" or absent reads stdin.
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
    /// Open this endpoint (dmx, dmx<dev>, dmx<dev>p<port>).
    #[arg(long, conflicts_with = "ports")]
    pub endpoint: Option<String>,
    /// Receive only these ports (comma-separated). Default: all ports.
    #[arg(long, value_delimiter = ',')]
    pub ports: Option<Vec<u16>>,
    /// Deliver every input record on this port instead of its own.
    #[arg(long)]
    pub port: Option<u16>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print router counters to stderr on exit.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}

/// Ports in the built-in topology.
const DEFAULT_PORTS: usize = 4;

pub fn load_topology(path: Option<&Path>) -> CliResult<TopologyConfig> {
    match path {
        Some(path) => TopologyConfig::load(path).map_err(|err| router_error("topology", err)),
        None => Ok(default_topology()),
    }
}

fn default_topology() -> TopologyConfig {
    TopologyConfig {
        devices: vec![DeviceConfig {
            name: "virtual0".to_string(),
            ports: (0..DEFAULT_PORTS)
                .map(|i| PortConfig {
                    name: format!("virtual0:{i}"),
                    capabilities: vec![CapabilityName::Input, CapabilityName::Output],
                })
                .collect(),
        }],
        ..TopologyConfig::default()
    }
}

pub fn parse_u8(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid byte value: {input}"))
}

/// Parse hex slots; bytes may be separated by whitespace, ',' or ':'.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b',' && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex data must have an even number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok())
                .ok_or_else(|| {
                    CliError::new(
                        USAGE,
                        format!("invalid hex byte: {}", String::from_utf8_lossy(pair)),
                    )
                })
        })
        .collect()
}

/// `None` or "-" selects stdin.
pub fn open_input(path: Option<&Path>) -> CliResult<Box<dyn std::io::Read + Send>> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::File::open(path)
            .map(|file| Box::new(file) as Box<dyn std::io::Read + Send>)
            .map_err(|err| crate::exit::io_error(&format!("open {}", path.display()), err)),
        _ => Ok(Box::new(std::io::stdin())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_separators() {
        assert_eq!(parse_hex("ff 00 80").unwrap(), vec![0xff, 0x00, 0x80]);
        assert_eq!(parse_hex("FF0080").unwrap(), vec![0xff, 0x00, 0x80]);
        assert_eq!(parse_hex("01:02,03").unwrap(), vec![1, 2, 3]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert_eq!(parse_hex("abc").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_u8_decimal_and_hex() {
        assert_eq!(parse_u8("0xCC"), Ok(0xcc));
        assert_eq!(parse_u8("23"), Ok(23));
        assert!(parse_u8("256").is_err());
    }

    #[test]
    fn default_topology_builds() {
        let router = default_topology()
            .build(|_, _| std::sync::Arc::new(dmxmux_router::NullTransmitter))
            .unwrap();
        assert_eq!(router.registry().device_count(), 1);
        assert_eq!(router.registry().port_count(), DEFAULT_PORTS);
    }
}
