use dmxmux_frame::FrameReader;
use tracing::debug;

use crate::cmd::{open_input, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut reader = FrameReader::new(open_input(args.input.as_deref())?);
    let mut printed = 0usize;

    while let Some(frame) = reader
        .next_frame()
        .map_err(|err| frame_error("decode failed", err))?
    {
        print_frame(&frame, format)?;
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    debug!(frames = printed, "decode finished");
    Ok(SUCCESS)
}
