use std::fmt;
use std::io;

use dmxmux_frame::FrameError;
use dmxmux_router::{ErrorKind, RouterError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const NOT_FOUND: i32 = 66;
pub const BUSY: i32 = 75;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => NOT_FOUND,
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn router_error(context: &str, err: RouterError) -> CliError {
    match err {
        RouterError::Frame(err) => frame_error(context, err),
        RouterError::Transmit { source, .. } => io_error(context, source),
        RouterError::Config(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => {
            let code = match other.kind() {
                ErrorKind::NotFound => NOT_FOUND,
                ErrorKind::InvalidArgument => USAGE,
                ErrorKind::PermissionDenied => PERMISSION_DENIED,
                ErrorKind::TimedOut | ErrorKind::WouldBlock => TIMEOUT,
                ErrorKind::Busy | ErrorKind::ResourceExhausted => BUSY,
                ErrorKind::Closed | ErrorKind::Io => FAILURE,
            };
            CliError::new(code, format!("{context}: {other}"))
        }
    }
}
