use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dmxmux_frame::{
    encode_frame, start_code_name, CrcStatus, Frame, FrameFlags, Timestamp, WIRE_SIZE,
};
use dmxmux_router::{PortState, Registry, RouterStats};
use serde::Serialize;

use crate::exit::{frame_error, io_error, CliResult};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Packed wire records, suitable for piping into `decode` or `monitor`.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Payload slots shown before eliding in table/pretty output.
const PREVIEW_SLOTS: usize = 24;

#[derive(Serialize)]
struct FrameOutput<'a> {
    port: u16,
    start_code: u8,
    start_code_name: &'a str,
    slots: usize,
    break_size: u8,
    no_break: bool,
    rdm: bool,
    rdm_discovery: bool,
    crc: CrcStatus,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    arrival: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    departure: Option<String>,
}

impl<'a> FrameOutput<'a> {
    fn new(frame: &'a Frame) -> Self {
        Self {
            port: frame.port,
            start_code: frame.start_code,
            start_code_name: start_code_name(frame.start_code),
            slots: frame.slot_count(),
            break_size: frame.break_size,
            no_break: frame.flags.contains(FrameFlags::NO_BREAK),
            rdm: frame.is_rdm(),
            rdm_discovery: frame.flags.contains(FrameFlags::RDM_DISCOVERY),
            crc: frame.flags.crc_status(),
            payload: hex(&frame.payload),
            arrival: frame.arrival.map(timestamp),
            departure: frame.departure.map(timestamp),
        }
    }
}

pub fn print_frame(frame: &Frame, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput::new(frame);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "START CODE", "SLOTS", "ARRIVAL", "PAYLOAD"])
                .add_row(vec![
                    frame.port.to_string(),
                    format!(
                        "0x{:02X} ({})",
                        frame.start_code,
                        start_code_name(frame.start_code)
                    ),
                    frame.slot_count().to_string(),
                    frame.arrival.map(timestamp).unwrap_or_else(|| "-".into()),
                    preview(&frame.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "port={} start={} slots={} flags={:?} payload={}",
                frame.port,
                start_code_name(frame.start_code),
                frame.slot_count(),
                frame.flags,
                preview(&frame.payload)
            );
        }
        OutputFormat::Raw => write_raw(frame)?,
    }
    Ok(())
}

fn write_raw(frame: &Frame) -> CliResult<()> {
    let mut buf = bytes::BytesMut::with_capacity(WIRE_SIZE);
    encode_frame(frame, &mut buf).map_err(|err| frame_error("encode failed", err))?;
    let mut out = std::io::stdout();
    out.write_all(&buf)
        .and_then(|()| out.flush())
        .map_err(|err| io_error("write failed", err))
}

#[derive(Serialize)]
struct PortOutput {
    id: u16,
    name: String,
    device: u16,
    capabilities: Vec<&'static str>,
    state: PortState,
}

#[derive(Serialize)]
struct DeviceOutput {
    id: u16,
    name: String,
    ports: Vec<PortOutput>,
}

#[derive(Serialize)]
struct TopologyOutput {
    devices: Vec<DeviceOutput>,
    endpoints: Vec<String>,
}

pub fn print_topology(registry: &Registry, endpoints: &[String], format: OutputFormat) {
    let devices: Vec<DeviceOutput> = registry
        .list_devices()
        .iter()
        .map(|device| DeviceOutput {
            id: device.id,
            name: device.name.clone(),
            ports: registry
                .list_ports(Some(device.id))
                .map(|ports| {
                    ports
                        .iter()
                        .filter_map(|port| registry.port(port.id).ok())
                        .map(|info| PortOutput {
                            id: info.id,
                            name: info.name,
                            device: info.device,
                            capabilities: info.capabilities.names(),
                            state: info.state,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect();

    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = TopologyOutput {
                devices,
                endpoints: endpoints.to_vec(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "PORT", "NAME", "CAPABILITIES", "STATE"]);
            for device in &devices {
                table.add_row(vec![
                    device.id.to_string(),
                    "-".to_string(),
                    device.name.clone(),
                    String::new(),
                    String::new(),
                ]);
                for port in &device.ports {
                    table.add_row(vec![
                        device.id.to_string(),
                        port.id.to_string(),
                        port.name.clone(),
                        port.capabilities.join(","),
                        format!("{:?}", port.state).to_lowercase(),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for device in &devices {
                println!("device {} {:?}", device.id, device.name);
                for port in &device.ports {
                    println!(
                        "  port {} {:?} [{}]",
                        port.id,
                        port.name,
                        port.capabilities.join(",")
                    );
                }
            }
            println!("endpoints: {}", endpoints.join(" "));
        }
    }
}

pub fn print_stats(stats: &RouterStats, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            eprintln!(
                "{}",
                serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            eprintln!(
                "delivered={} fanned_out={} mailbox_drops={} transmitted={}",
                stats.delivered, stats.fanned_out, stats.mailbox_drops, stats.transmitted
            );
        }
    }
}

/// Uppercase hex, space separated.
pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn preview(payload: &[u8]) -> String {
    if payload.len() <= PREVIEW_SLOTS {
        return hex(payload);
    }
    format!(
        "{} … (+{} slots)",
        hex(&payload[..PREVIEW_SLOTS]),
        payload.len() - PREVIEW_SLOTS
    )
}

fn timestamp(ts: Timestamp) -> String {
    format!("{}.{:09}", ts.secs, ts.nanos)
}
