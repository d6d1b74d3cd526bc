use std::collections::BTreeMap;

use dmxmux_frame::{DEFAULT_QUEUE_CAPACITY, MAX_PAYLOAD, WIRE_SIZE};
use dmxmux_router::{DEFAULT_PENDING_TX_CAPACITY, MAX_NAME_LEN};
use serde::Serialize;

use crate::cmd::EnvinfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct Limits {
    wire_record_bytes: usize,
    max_payload_slots: usize,
    max_name_len: usize,
    default_mailbox_capacity: usize,
    default_pending_tx_capacity: usize,
}

#[derive(Serialize)]
struct EnvInfoOutput {
    version: String,
    target: String,
    rust_version: String,
    os: String,
    arch: String,
    limits: Limits,
    environment: BTreeMap<String, Option<String>>,
}

const WATCHED_VARS: [&str; 2] = ["DMXMUX_TOPOLOGY", "RUST_LOG"];

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let output = EnvInfoOutput {
        version: env!("CARGO_PKG_VERSION").to_string(),
        target: target_triple(),
        rust_version: option_env!("RUSTC_VERSION")
            .unwrap_or("unknown")
            .to_string(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        limits: Limits {
            wire_record_bytes: WIRE_SIZE,
            max_payload_slots: MAX_PAYLOAD,
            max_name_len: MAX_NAME_LEN,
            default_mailbox_capacity: DEFAULT_QUEUE_CAPACITY,
            default_pending_tx_capacity: DEFAULT_PENDING_TX_CAPACITY,
        },
        environment: WATCHED_VARS
            .iter()
            .map(|name| (name.to_string(), std::env::var(name).ok()))
            .collect(),
    };

    print_envinfo(&output, format);
    Ok(SUCCESS)
}

fn target_triple() -> String {
    option_env!("DMXMUX_BUILD_TARGET")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-unknown-{}", std::env::consts::ARCH, std::env::consts::OS))
}

fn print_envinfo(output: &EnvInfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("dmxmux environment\n");
            println!("  Version:    {}", output.version);
            println!("  Target:     {}", output.target);
            println!("  Rust:       {}", output.rust_version);
            println!("  Platform:   {} ({})", output.os, output.arch);
            println!("\n  Limits:");
            println!("    wire record        {} bytes", output.limits.wire_record_bytes);
            println!("    payload            {} slots", output.limits.max_payload_slots);
            println!("    name               {} bytes", output.limits.max_name_len);
            println!("    mailbox            {} frames", output.limits.default_mailbox_capacity);
            println!("    pending transmit   {} frames", output.limits.default_pending_tx_capacity);
            println!("\n  Environment:");
            for (k, v) in &output.environment {
                println!("    {:<18} {}", k, v.as_deref().unwrap_or("(not set)"));
            }
        }
        OutputFormat::Raw => println!("{}", output.version),
    }
}
