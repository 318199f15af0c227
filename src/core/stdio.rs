//! Operation tables for the process's own stdin/stdout
//!
//! These are the "original" implementations the transforms delegate to when
//! the shim runs over a real terminal.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::stream::{Console, Control, HandleId, Result, Stream, StreamError, StreamOps, TtyMode};

pub const STDIN_HANDLE: HandleId = HandleId(0);
pub const STDOUT_HANDLE: HandleId = HandleId(1);

/// Reads from the process stdin
#[derive(Debug, Default)]
pub struct StdinOps {
    closed: AtomicBool,
}

impl StdinOps {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamOps for StdinOps {
    fn read(&self, handle: HandleId, buf: &mut [u8]) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed(handle));
        }
        loop {
            match io::stdin().lock().read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return Ok(other?),
            }
        }
    }

    fn write(&self, _handle: HandleId, _buf: &[u8]) -> Result<usize> {
        Err(StreamError::Unsupported("write on stdin"))
    }

    fn close(&self, handle: HandleId) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StreamError::Closed(handle));
        }
        Ok(())
    }
}

/// Writes to the process stdout
#[derive(Debug, Default)]
pub struct StdoutOps {
    closed: AtomicBool,
}

impl StdoutOps {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamOps for StdoutOps {
    fn read(&self, _handle: HandleId, _buf: &mut [u8]) -> Result<usize> {
        Err(StreamError::Unsupported("read on stdout"))
    }

    fn write(&self, handle: HandleId, buf: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed(handle));
        }
        let mut stdout = io::stdout().lock();
        let n = stdout.write(buf)?;
        stdout.flush()?;
        Ok(n)
    }

    fn close(&self, handle: HandleId) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StreamError::Closed(handle));
        }
        io::stdout().flush()?;
        Ok(())
    }

    fn control(&self, _handle: HandleId, request: &Control) -> Result<i64> {
        match request {
            Control::Flush => {
                io::stdout().flush()?;
                Ok(0)
            }
            Control::WindowSize => {
                let (cols, rows) = crossterm::terminal::size()?;
                Ok((i64::from(cols) << 16) | i64::from(rows))
            }
            Control::Other(_) => Err(StreamError::Unsupported("control")),
        }
    }
}

/// Console over the process's stdin/stdout with the detected tty mode
pub fn stdio_console() -> Console {
    let console = Console::new(
        Some(Arc::new(Stream::new(STDIN_HANDLE, Arc::new(StdinOps::new())))),
        Some(Arc::new(Stream::new(STDOUT_HANDLE, Arc::new(StdoutOps::new())))),
    );
    console.set_tty_mode(TtyMode::detect());
    console
}
