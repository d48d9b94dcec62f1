//! Console command language
//!
//! One line, one command. The first character selects the command; the rest
//! of the line is its argument text:
//!
//! ```text
//! o               open the first device found
//! n <id>          open the device reporting identity <id>
//! c               close the device
//! i               list the identities of attached devices
//! ><text>         send <text> to the device
//! p <n> [file]    append data stream <n> to [file], or close its file
//! d <n> [on|off]  hex-dump data stream <n> to the console
//! q               quit
//! ```

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::error::ListenerError;
use crate::packet::StreamId;
use crate::session::Session;

pub const USAGE: &str = "\
I didn't understand what you meant. Please use the following commands:
o to open the first device it finds
n to open a device by name (see <i> for a list of names)
c to close the device
i to query connected devices

> to send to the device
p <id> <file> to pipe data stream <id> (0, 1, or 2) to file named <file>,
     opened in append mode. Omitting <file> will close any open file handle.
d <id> [on|off] to pipe data stream <id> (0, 1, or 2) to stdout in packet-dump form
     if 'on' is specified, and disable this feature if 'off' is specified.
q to quit";

/// Argument errors; the command is dropped without side effects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Could not read device name! '{0}'")]
    UnreadableIdentity(String),

    #[error("Device name out of range (0-255): {0}")]
    IdentityOutOfRange(i64),

    #[error("Could not read device ID.")]
    UnreadableStream,

    #[error("Invalid data stream specified: {0}")]
    InvalidStream(i64),
}

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open,
    OpenByIdentity(u8),
    Close,
    Query,
    Send(Vec<u8>),
    Pipe {
        stream: StreamId,
        path: Option<PathBuf>,
    },
    Dump {
        stream: StreamId,
        enabled: bool,
    },
    Quit,
    Help,
}

/// Whether the input loop keeps going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Scan a leading integer the way C's `%i` does
///
/// Skips leading whitespace, accepts an optional sign, then a `0x`/`0X` hex
/// prefix, a leading-`0` octal number or a decimal number, and stops at the
/// first character that is not a digit of that base.
///
/// # Returns
/// The value and the unscanned rest of `text`, or `None` without digits or on
/// overflow.
pub fn scan_int(text: &str) -> Option<(i64, &str)> {
    let s = text.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let bytes = s.as_bytes();
    let (radix, start) = match bytes {
        [b'0', b'x' | b'X', d, ..] if d.is_ascii_hexdigit() => (16, 2),
        [b'0', ..] => (8, 0),
        _ => (10, 0),
    };

    let digits = s[start..]
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(s.len() - start);
    if digits == 0 {
        return None;
    }

    let end = start + digits;
    let magnitude = i64::from_str_radix(&s[start..end], radix).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    Some((value, &s[end..]))
}

fn scan_stream(args: &str) -> Result<(StreamId, &str), CommandError> {
    let (index, rest) = scan_int(args).ok_or(CommandError::UnreadableStream)?;
    let stream = StreamId::from_index(index).ok_or(CommandError::InvalidStream(index))?;
    Ok((stream, rest))
}

/// Parse one (already truncated) console line
///
/// The line is raw console input. The `>` payload is kept byte for byte;
/// only the numeric and file name arguments of other commands are decoded.
pub fn parse(line: &[u8]) -> Result<Command, CommandError> {
    let Some((&letter, args)) = line.split_first() else {
        return Ok(Command::Help);
    };
    if letter == b'>' {
        return Ok(Command::Send(args.to_vec()));
    }
    let args = String::from_utf8_lossy(args);
    let args = args.as_ref();

    let command = match letter {
        b'o' => Command::Open,
        b'c' => Command::Close,
        b'i' => Command::Query,
        b'q' => Command::Quit,
        b'n' => {
            let (identity, _) =
                scan_int(args).ok_or_else(|| CommandError::UnreadableIdentity(args.to_string()))?;
            let identity =
                u8::try_from(identity).map_err(|_| CommandError::IdentityOutOfRange(identity))?;
            Command::OpenByIdentity(identity)
        }
        b'p' => {
            let (stream, rest) = scan_stream(args)?;
            let file = rest.trim();
            Command::Pipe {
                stream,
                path: (!file.is_empty()).then(|| PathBuf::from(file)),
            }
        }
        b'd' => {
            let (stream, rest) = scan_stream(args)?;
            Command::Dump {
                stream,
                enabled: rest.trim_start().starts_with("on"),
            }
        }
        _ => Command::Help,
    };
    Ok(command)
}

/// Parse and run one console line against the session
///
/// Failures are reported on the session console; they never stop the loop.
pub fn execute(session: &mut Session, line: &[u8]) -> Flow {
    let command = match parse(line) {
        Ok(command) => command,
        Err(e) => {
            session.report(&ListenerError::from(e));
            return Flow::Continue;
        }
    };
    debug!("Command: {:?}", command);

    match dispatch(session, command) {
        Ok(flow) => flow,
        Err(e) => {
            session.report(&e);
            Flow::Continue
        }
    }
}

fn dispatch(session: &mut Session, command: Command) -> Result<Flow, ListenerError> {
    match command {
        Command::Open => {
            session.open_first()?;
        }
        Command::OpenByIdentity(identity) => {
            session.console().line(format_args!("Opening {identity}"));
            session.open_by_identity(identity)?;
            session.console().line("Device open.");
        }
        Command::Close => {
            session.close()?;
            session.console().line("Device closed.");
        }
        Command::Query => {
            session.enumerate()?;
        }
        Command::Send(payload) => {
            session.send_payload(&payload)?;
        }
        Command::Pipe { stream, path } => {
            session.router_mut().set_sink(stream, path.as_deref())?;
            let msg = match path {
                Some(path) => format!("Writing data stream {} to {}", stream.index(), path.display()),
                None => format!("Closed data stream {} file", stream.index()),
            };
            session.console().line(msg);
        }
        Command::Dump { stream, enabled } => {
            session.router_mut().set_echo(stream, enabled);
            let msg = if enabled {
                format!("Echoing data stream {} to console.", stream.index())
            } else {
                format!("Stopped echoing data stream {} to console.", stream.index())
            };
            session.console().line(msg);
        }
        Command::Help => {
            session.console().line(USAGE);
        }
        Command::Quit => {
            session.shutdown();
            return Ok(Flow::Quit);
        }
    }
    Ok(Flow::Continue)
}
