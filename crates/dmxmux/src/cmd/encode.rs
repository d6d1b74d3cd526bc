use std::fs::OpenOptions;
use std::io::Write;

use dmxmux_frame::{Frame, FrameFlags, FrameWriter};

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let frame = build_frame(&args)?;
    match &args.out {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| io_error(&format!("open {}", path.display()), err))?;
            write_one(file, &frame)?;
        }
        None => write_one(std::io::stdout().lock(), &frame)?,
    }
    Ok(SUCCESS)
}

fn build_frame(args: &EncodeArgs) -> CliResult<Frame> {
    let payload = parse_hex(&args.data)?;
    let mut flags = FrameFlags::empty();
    flags.set(FrameFlags::NO_BREAK, args.no_break);
    flags.set(FrameFlags::RDM, args.rdm);
    flags.set(FrameFlags::RDM_DISCOVERY, args.discovery);

    let frame = Frame::new(args.port, args.start_code, payload)
        .with_flags(flags)
        .with_break_size(args.break_size);
    frame
        .validate()
        .map_err(|err| frame_error("invalid frame", err))?;
    Ok(frame)
}

fn write_one<W: Write>(sink: W, frame: &Frame) -> CliResult<()> {
    let mut writer = FrameWriter::new(sink);
    writer
        .write_frame(frame)
        .map_err(|err| frame_error("write failed", err))
}
