#![cfg(feature = "cli")]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "dmxmux-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn dmxmux(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dmxmux"))
        .env_remove("DMXMUX_TOPOLOGY")
        .env_remove("DMXMUX_LOG_LEVEL")
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("dmxmux should run")
}

fn encode_to(path: &Path, port: &str, data: &str) {
    let output = dmxmux(&[
        "encode",
        "--port",
        port,
        "--data",
        data,
        "--out",
        path.to_str().expect("utf-8 path"),
    ]);
    assert!(output.status.success(), "encode failed: {output:?}");
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect()
}

#[test]
fn encode_then_decode_file() {
    let dir = unique_temp_dir("decode");
    let records = dir.join("frames.bin");
    encode_to(&records, "7", "ff 00 80");
    encode_to(&records, "8", "01");

    assert_eq!(std::fs::metadata(&records).unwrap().len(), 2 * 547);

    let output = dmxmux(&["--format", "json", "decode", records.to_str().unwrap()]);
    assert!(output.status.success());
    let frames = json_lines(&output);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["port"], 7);
    assert_eq!(frames[0]["payload"], "FF 00 80");
    assert_eq!(frames[0]["slots"], 4);
    assert_eq!(frames[1]["port"], 8);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_reads_stdin() {
    let dir = unique_temp_dir("stdin");
    let records = dir.join("frames.bin");
    encode_to(&records, "3", "0a");
    let bytes = std::fs::read(&records).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_dmxmux"))
        .args(["--format", "json", "decode", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");
    child.stdin.take().unwrap().write_all(&bytes).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(json_lines(&output)[0]["payload"], "0A");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn monitor_filters_by_port() {
    let dir = unique_temp_dir("monitor");
    let records = dir.join("frames.bin");
    // Default topology: device 1 with ports 2..=5.
    encode_to(&records, "2", "01 02");
    encode_to(&records, "3", "03");
    encode_to(&records, "2", "04");

    let output = dmxmux(&[
        "--format",
        "json",
        "monitor",
        "--input",
        records.to_str().unwrap(),
        "--ports",
        "2",
    ]);
    assert!(output.status.success(), "monitor failed: {output:?}");
    let frames = json_lines(&output);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["payload"], "01 02");
    assert_eq!(frames[1]["payload"], "04");
    assert!(frames.iter().all(|f| f["port"] == 2));
    assert!(frames.iter().all(|f| f.get("arrival").is_some()));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn monitor_with_topology_and_endpoint() {
    let dir = unique_temp_dir("endpoint");
    let topology = dir.join("topology.json");
    std::fs::write(
        &topology,
        r#"{"devices":[
            {"name":"card0","ports":[{"name":"card0:0"},{"name":"card0:1"}]},
            {"name":"card1","ports":[{"name":"card1:0"}]}
        ]}"#,
    )
    .unwrap();
    // card0 = 1 (ports 2, 3), card1 = 4 (port 5).
    let records = dir.join("frames.bin");
    encode_to(&records, "5", "aa");
    encode_to(&records, "3", "bb");
    encode_to(&records, "2", "cc");

    let output = dmxmux(&[
        "--format",
        "json",
        "monitor",
        "--config",
        topology.to_str().unwrap(),
        "--input",
        records.to_str().unwrap(),
        "--endpoint",
        "dmx1",
    ]);
    assert!(output.status.success(), "monitor failed: {output:?}");
    let payloads: Vec<_> = json_lines(&output)
        .iter()
        .map(|f| f["payload"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(payloads, vec!["BB", "CC"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn topology_lists_devices_and_endpoints() {
    let output = dmxmux(&["--format", "json", "topology"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["devices"][0]["name"], "virtual0");
    assert_eq!(json["devices"][0]["ports"].as_array().unwrap().len(), 4);
    assert_eq!(json["devices"][0]["ports"][0]["state"], "active");
    assert_eq!(json["endpoints"][0], "dmx");
    assert_eq!(json["endpoints"][1], "dmx1");
    assert_eq!(json["endpoints"][2], "dmx1p2");
}

#[test]
fn invalid_inputs_map_to_exit_codes() {
    let output = dmxmux(&["encode", "--port", "1", "--data", "abc"]);
    assert_eq!(output.status.code(), Some(64));

    let output = dmxmux(&["encode", "--port", "1", "--break-size", "255"]);
    assert_eq!(output.status.code(), Some(60));

    let dir = unique_temp_dir("codes");
    let bad = dir.join("bad.json");
    std::fs::write(&bad, r#"{"devices":[{"nom":"x"}]}"#).unwrap();
    let output = dmxmux(&["topology", "--config", bad.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(60));

    let output = dmxmux(&["decode", dir.join("missing.bin").to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(66));

    let output = dmxmux(&["monitor", "--endpoint", "dmx99", "--input", "-"]);
    assert_eq!(output.status.code(), Some(66));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = dmxmux(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("dmxmux {}", env!("CARGO_PKG_VERSION"))
    );
}
