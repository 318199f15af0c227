//! Stream dispatcher abstraction
//!
//! A [`Stream`] is a handle plus a slot holding the operation table currently
//! used to perform I/O on it. The [`Console`] keeps the two "current console"
//! streams and the tty mode of the input side.

use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Handle {0} is not wrapped")]
    NotWrapped(HandleId),

    #[error("Escaped control byte was cut short ({written} of 2 bytes written)")]
    ShortEscape { written: usize },

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Handle {0} is closed")]
    Closed(HandleId),
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(e) => e,
            other => {
                let kind = match &other {
                    StreamError::NotWrapped(_) => io::ErrorKind::NotFound,
                    StreamError::ShortEscape { .. } => io::ErrorKind::WriteZero,
                    StreamError::Unsupported(_) => io::ErrorKind::Unsupported,
                    StreamError::Closed(_) => io::ErrorKind::BrokenPipe,
                    StreamError::Io(_) => io::ErrorKind::Other,
                };
                io::Error::new(kind, other.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// Opaque identifier of an OS-level stream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input mode of the terminal behind the current input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtyMode {
    /// Line-buffered input
    #[default]
    Cooked,
    /// Unbuffered single-keystroke delivery
    Raw,
}

impl TtyMode {
    /// Query the real terminal. Anything that cannot be determined counts as cooked.
    pub fn detect() -> Self {
        match crossterm::terminal::is_raw_mode_enabled() {
            Ok(true) => TtyMode::Raw,
            _ => TtyMode::Cooked,
        }
    }
}

/// Control requests forwarded untouched through the transforms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Flush buffered output
    Flush,
    /// Query the window size (cols, rows)
    WindowSize,
    /// Host-specific request code
    Other(u32),
}

/// Operation table for one kind of stream
///
/// The dispatcher calls these with the handle of the stream being operated on.
pub trait StreamOps: Send + Sync {
    fn read(&self, handle: HandleId, buf: &mut [u8]) -> Result<usize>;

    fn write(&self, handle: HandleId, buf: &[u8]) -> Result<usize>;

    fn close(&self, handle: HandleId) -> Result<()>;

    fn seek(&self, _handle: HandleId, _pos: SeekFrom) -> Result<u64> {
        Err(StreamError::Unsupported("seek"))
    }

    fn control(&self, _handle: HandleId, _request: &Control) -> Result<i64> {
        Err(StreamError::Unsupported("control"))
    }

    /// True for the operation tables installed by the console manager
    fn is_console_transform(&self) -> bool {
        false
    }
}

/// A stream handle with a replaceable operation table
pub struct Stream {
    handle: HandleId,
    ops: Mutex<Arc<dyn StreamOps>>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("handle", &self.handle)
            .field("wrapped", &self.ops().is_console_transform())
            .finish()
    }
}

impl Stream {
    pub fn new(handle: HandleId, ops: Arc<dyn StreamOps>) -> Self {
        Self {
            handle,
            ops: Mutex::new(ops),
        }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// The operation table currently installed
    pub fn ops(&self) -> Arc<dyn StreamOps> {
        self.ops.lock().clone()
    }

    pub fn set_ops(&self, ops: Arc<dyn StreamOps>) {
        *self.ops.lock() = ops;
    }

    /// Install `ops` and hand back the table it replaced
    pub fn replace_ops(&self, ops: Arc<dyn StreamOps>) -> Arc<dyn StreamOps> {
        std::mem::replace(&mut *self.ops.lock(), ops)
    }

    // The slot lock is dropped before dispatching so an op may swap its own slot.

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let ops = self.ops();
        ops.read(self.handle, buf)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let ops = self.ops();
        ops.write(self.handle, buf)
    }

    pub fn close(&self) -> Result<()> {
        let ops = self.ops();
        ops.close(self.handle)
    }

    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let ops = self.ops();
        ops.seek(self.handle, pos)
    }

    pub fn control(&self, request: &Control) -> Result<i64> {
        let ops = self.ops();
        ops.control(self.handle, request)
    }
}

/// The process console: current input, current output and input tty mode
#[derive(Debug, Default)]
pub struct Console {
    input: RwLock<Option<Arc<Stream>>>,
    output: RwLock<Option<Arc<Stream>>>,
    tty_mode: RwLock<TtyMode>,
}

impl Console {
    pub fn new(input: Option<Arc<Stream>>, output: Option<Arc<Stream>>) -> Self {
        Self {
            input: RwLock::new(input),
            output: RwLock::new(output),
            tty_mode: RwLock::new(TtyMode::Cooked),
        }
    }

    pub fn current_input(&self) -> Option<Arc<Stream>> {
        self.input.read().clone()
    }

    pub fn current_output(&self) -> Option<Arc<Stream>> {
        self.output.read().clone()
    }

    pub fn set_current_input(&self, stream: Option<Arc<Stream>>) {
        *self.input.write() = stream;
    }

    pub fn set_current_output(&self, stream: Option<Arc<Stream>>) {
        *self.output.write() = stream;
    }

    pub fn tty_mode(&self) -> TtyMode {
        *self.tty_mode.read()
    }

    pub fn set_tty_mode(&self, mode: TtyMode) {
        *self.tty_mode.write() = mode;
    }
}
