//! Operator console: line input and report output
//!
//! Everything the operator (or a front-end script driving us over a pipe)
//! sees goes through [`Console`]. Diagnostics go to tracing on stderr.
//!
//! Input lines and device text are raw bytes; neither direction assumes the
//! other side speaks UTF-8.

use std::fmt;
use std::io::{self, BufRead, Read, Write};

use tracing::warn;

/// Output side of the console
pub struct Console {
    out: Box<dyn Write + Send>,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Print one line
    pub fn line(&mut self, msg: impl fmt::Display) {
        self.emit(format_args!("{msg}\n"));
    }

    /// Print without a trailing newline (device text is already framed)
    pub fn text(&mut self, msg: impl fmt::Display) {
        self.emit(format_args!("{msg}"));
    }

    /// Print bytes exactly as received
    pub fn bytes(&mut self, raw: &[u8]) {
        let result = self.out.write_all(raw).and_then(|_| self.out.flush());
        Self::check(result);
    }

    fn emit(&mut self, args: fmt::Arguments<'_>) {
        // Front-ends read us through a pipe; flush every report
        let result = self.out.write_fmt(args).and_then(|_| self.out.flush());
        Self::check(result);
    }

    fn check(result: io::Result<()>) {
        if let Err(e) = result {
            warn!("Console write failed: {}", e);
        }
    }
}

/// Clonable in-memory console sink
#[cfg(test)]
#[derive(Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Everything written so far, byte for byte
    pub fn raw(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discard input up to and including the next newline
///
/// # Returns
/// Number of bytes dropped, not counting the newline
fn skip_line<R: BufRead>(input: &mut R) -> io::Result<usize> {
    let mut skipped = 0;
    loop {
        let buf = input.fill_buf()?;
        if buf.is_empty() {
            return Ok(skipped);
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) => {
                input.consume(i + 1);
                return Ok(skipped + i);
            }
            None => {
                let n = buf.len();
                input.consume(n);
                skipped += n;
            }
        }
    }
}

/// Read one command line, cut to `max_len` bytes
///
/// Line terminators (`\n`, `\r\n`) are stripped. At most `max_len + 2` bytes
/// are buffered; the rest of an overlong line is skipped. Returns `Ok(None)`
/// at end of input.
pub fn read_command_line<R: BufRead>(input: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>> {
    let limit = max_len.saturating_add(2);
    let mut line = Vec::with_capacity(limit.min(256));
    let read = input
        .by_ref()
        .take(limit as u64)
        .read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(None);
    }

    let mut dropped = 0;
    if line.last() == Some(&b'\n') {
        line.pop();
    } else if line.len() == limit {
        dropped = skip_line(input)?;
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    if line.len() > max_len {
        dropped += line.len() - max_len;
        line.truncate(max_len);
    }
    if dropped > 0 {
        warn!(
            "Input line truncated to {} bytes ({} dropped)",
            max_len, dropped
        );
    }
    Ok(Some(line))
}
