mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "dmxmux", version, about = "DMX512/RDM frame multiplexer")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "DMXMUX_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encode_subcommand() {
        let cli = Cli::try_parse_from([
            "dmxmux", "encode", "--port", "2", "--start-code", "0xCC", "--rdm", "--data", "01 02",
        ])
        .expect("encode args should parse");

        let Command::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(args.start_code, 0xcc);
        assert!(args.rdm);
    }

    #[test]
    fn discovery_requires_rdm() {
        let err = Cli::try_parse_from(["dmxmux", "encode", "--port", "1", "--discovery"])
            .expect_err("discovery without rdm should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_endpoint_with_ports() {
        let err = Cli::try_parse_from([
            "dmxmux",
            "monitor",
            "--endpoint",
            "dmx1",
            "--ports",
            "2,3",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_monitor_port_list() {
        let cli = Cli::try_parse_from(["dmxmux", "monitor", "--ports", "2,3", "--count", "5"])
            .expect("monitor args should parse");
        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor");
        };
        assert_eq!(args.ports, Some(vec![2, 3]));
        assert_eq!(args.count, Some(5));
    }
}
