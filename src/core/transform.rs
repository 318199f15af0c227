//! Operation tables installed on a wrapped console
//!
//! [`InputTransform`] negotiates single-character reads while the terminal is
//! in raw mode, [`OutputTransform`] byte-stuffs the control byte. Both unhook
//! themselves from the registry on close before closing the real handle.
//!
//! The transforms live inside the console's own stream slots, so they only
//! keep a weak reference back to it. Once the console is gone reads and
//! writes delegate plainly and close reports the handle as not wrapped.

use std::io::SeekFrom;
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use super::escape::{write_stuffed, SINGLE_CHAR_REQUEST};
use super::registry::ConsoleRegistry;
use super::stream::{Console, Control, HandleId, Result, StreamError, StreamOps, TtyMode};

/// Switches for the two transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Ask for single-character mode before each raw-mode read
    pub negotiate_single_char: bool,
    /// Double control bytes on output
    pub stuff_output: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            negotiate_single_char: true,
            stuff_output: true,
        }
    }
}

/// Read side of a wrapped console
pub struct InputTransform {
    original: Arc<dyn StreamOps>,
    registry: Arc<ConsoleRegistry>,
    console: Weak<Console>,
    options: TransformOptions,
}

impl InputTransform {
    pub fn new(
        original: Arc<dyn StreamOps>,
        registry: Arc<ConsoleRegistry>,
        console: &Arc<Console>,
        options: TransformOptions,
    ) -> Self {
        Self {
            original,
            registry,
            console: Arc::downgrade(console),
            options,
        }
    }

    /// Try a negotiated single-character read.
    ///
    /// `Ok(None)` means negotiation did not happen or did not complete and the
    /// caller should fall back to a plain read. A reply of any length other
    /// than two bytes is dropped, so a lone keystroke in it is lost.
    fn read_single_char(&self, handle: HandleId, buf: &mut [u8]) -> Result<Option<usize>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let Some(console) = self.console.upgrade() else {
            return Ok(None);
        };
        if console.tty_mode() != TtyMode::Raw {
            return Ok(None);
        }
        let Some(record) = self.registry.lookup_input(handle) else {
            return Ok(None);
        };
        let Some(out) = console.current_output() else {
            return Ok(None);
        };

        // The request goes through the pre-wrap write so it is not stuffed
        match record.original_output().write(out.handle(), &SINGLE_CHAR_REQUEST) {
            Ok(n) if n == SINGLE_CHAR_REQUEST.len() => {}
            Ok(n) => {
                debug!("Single-char request cut short ({} bytes), plain read", n);
                return Ok(None);
            }
            Err(e) => {
                debug!("Single-char request failed: {}, plain read", e);
                return Ok(None);
            }
        }

        // Keystroke plus the newline the driver appends
        let mut reply = [0u8; 2];
        let n = self.original.read(handle, &mut reply)?;
        if n != reply.len() {
            debug!("Single-char reply was {} bytes, plain read", n);
            return Ok(None);
        }

        buf[0] = reply[0];
        trace!("Single-char read on {}: {:#04x}", handle, reply[0]);
        Ok(Some(1))
    }
}

impl StreamOps for InputTransform {
    fn read(&self, handle: HandleId, buf: &mut [u8]) -> Result<usize> {
        if self.options.negotiate_single_char {
            if let Some(n) = self.read_single_char(handle, buf)? {
                return Ok(n);
            }
        }
        self.original.read(handle, buf)
    }

    fn write(&self, handle: HandleId, buf: &[u8]) -> Result<usize> {
        self.original.write(handle, buf)
    }

    fn close(&self, handle: HandleId) -> Result<()> {
        let console = self
            .console
            .upgrade()
            .ok_or(StreamError::NotWrapped(handle))?;
        let released = self
            .registry
            .release(Some(handle), None, &console)
            .ok_or(StreamError::NotWrapped(handle))?;
        released.original.close(handle)
    }

    fn seek(&self, handle: HandleId, pos: SeekFrom) -> Result<u64> {
        self.original.seek(handle, pos)
    }

    fn control(&self, handle: HandleId, request: &Control) -> Result<i64> {
        self.original.control(handle, request)
    }

    fn is_console_transform(&self) -> bool {
        true
    }
}

/// Write side of a wrapped console
pub struct OutputTransform {
    original: Arc<dyn StreamOps>,
    registry: Arc<ConsoleRegistry>,
    console: Weak<Console>,
    options: TransformOptions,
}

impl OutputTransform {
    pub fn new(
        original: Arc<dyn StreamOps>,
        registry: Arc<ConsoleRegistry>,
        console: &Arc<Console>,
        options: TransformOptions,
    ) -> Self {
        Self {
            original,
            registry,
            console: Arc::downgrade(console),
            options,
        }
    }
}

impl StreamOps for OutputTransform {
    fn read(&self, handle: HandleId, buf: &mut [u8]) -> Result<usize> {
        self.original.read(handle, buf)
    }

    fn write(&self, handle: HandleId, buf: &[u8]) -> Result<usize> {
        if self.options.stuff_output {
            write_stuffed(self.original.as_ref(), handle, buf)
        } else {
            self.original.write(handle, buf)
        }
    }

    fn close(&self, handle: HandleId) -> Result<()> {
        let console = self
            .console
            .upgrade()
            .ok_or(StreamError::NotWrapped(handle))?;
        let released = self
            .registry
            .release(None, Some(handle), &console)
            .ok_or(StreamError::NotWrapped(handle))?;
        released.original.close(handle)
    }

    fn seek(&self, handle: HandleId, pos: SeekFrom) -> Result<u64> {
        self.original.seek(handle, pos)
    }

    fn control(&self, handle: HandleId, request: &Control) -> Result<i64> {
        self.original.control(handle, request)
    }

    fn is_console_transform(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::Stream;
    use crate::core::testing::{ReadStep, ScriptedOps, WriteStep};
    use std::io;

    const IN: HandleId = HandleId(10);
    const OUT: HandleId = HandleId(11);

    struct Fixture {
        console: Arc<Console>,
        registry: Arc<ConsoleRegistry>,
        in_ops: Arc<ScriptedOps>,
        out_ops: Arc<ScriptedOps>,
        input: Arc<Stream>,
        output: Arc<Stream>,
    }

    fn fixture(options: TransformOptions) -> Fixture {
        let in_ops = ScriptedOps::new();
        let out_ops = ScriptedOps::new();
        let input = Arc::new(Stream::new(IN, in_ops.clone()));
        let output = Arc::new(Stream::new(OUT, out_ops.clone()));
        let console = Arc::new(Console::new(Some(input.clone()), Some(output.clone())));
        let registry = Arc::new(ConsoleRegistry::new());

        let record = registry.find(Some(IN), Some(OUT), &console).unwrap();
        input.set_ops(Arc::new(InputTransform::new(
            record.original_input().clone(),
            registry.clone(),
            &console,
            options,
        )));
        output.set_ops(Arc::new(OutputTransform::new(
            record.original_output().clone(),
            registry.clone(),
            &console,
            options,
        )));

        Fixture {
            console,
            registry,
            in_ops,
            out_ops,
            input,
            output,
        }
    }

    #[test]
    fn test_cooked_read_delegates() {
        let f = fixture(TransformOptions::default());
        f.in_ops.push_read(b"line\n");

        let mut buf = [0u8; 64];
        assert_eq!(f.input.read(&mut buf).unwrap(), 5);
        assert_eq!(f.in_ops.read_lens(), vec![64]);
        assert!(f.out_ops.write_calls().is_empty());
    }

    #[test]
    fn test_raw_read_negotiates_single_char() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);
        f.in_ops.push_read(b"k\n");

        let mut buf = [0u8; 64];
        assert_eq!(f.input.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'k');
        // Request sent verbatim, not stuffed
        assert_eq!(f.out_ops.output(), b"\x1bs");
        assert_eq!(f.in_ops.read_lens(), vec![2]);
    }

    #[test]
    fn test_raw_read_short_reply_falls_back() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);
        f.in_ops.push_read(b"k");
        f.in_ops.push_read(b"rest");

        let mut buf = [0u8; 64];
        assert_eq!(f.input.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"rest");
        assert_eq!(f.in_ops.read_lens(), vec![2, 64]);
    }

    #[test]
    fn test_raw_read_short_request_falls_back() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);
        f.out_ops.push_write(WriteStep::Limit(1));
        f.in_ops.push_read(b"abc");

        let mut buf = [0u8; 64];
        assert_eq!(f.input.read(&mut buf).unwrap(), 3);
        assert_eq!(f.in_ops.read_lens(), vec![64]);
    }

    #[test]
    fn test_raw_read_failed_request_falls_back() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);
        f.out_ops.push_write(WriteStep::Fail(io::ErrorKind::BrokenPipe));
        f.in_ops.push_read(b"xy");

        let mut buf = [0u8; 16];
        assert_eq!(f.input.read(&mut buf).unwrap(), 2);
        assert_eq!(f.in_ops.read_lens(), vec![16]);
    }

    #[test]
    fn test_raw_read_error_propagates() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);
        f.in_ops.push_read_step(ReadStep::Fail(io::ErrorKind::Interrupted));

        let mut buf = [0u8; 16];
        match f.input.read(&mut buf) {
            Err(StreamError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::Interrupted),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(f.in_ops.read_lens(), vec![2]);
    }

    #[test]
    fn test_raw_read_without_output() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);
        f.console.set_current_output(None);
        f.in_ops.push_read(b"abc");

        let mut buf = [0u8; 8];
        assert_eq!(f.input.read(&mut buf).unwrap(), 3);
        assert!(f.out_ops.write_calls().is_empty());
    }

    #[test]
    fn test_negotiation_disabled() {
        let f = fixture(TransformOptions {
            negotiate_single_char: false,
            stuff_output: true,
        });
        f.console.set_tty_mode(TtyMode::Raw);
        f.in_ops.push_read(b"k\n");

        let mut buf = [0u8; 8];
        assert_eq!(f.input.read(&mut buf).unwrap(), 2);
        assert!(f.out_ops.write_calls().is_empty());
    }

    #[test]
    fn test_write_stuffs_escape() {
        let f = fixture(TransformOptions::default());

        assert_eq!(f.output.write(b"AB\x1bC").unwrap(), 4);
        assert_eq!(f.out_ops.output(), b"AB\x1b\x1bC");
    }

    #[test]
    fn test_write_without_stuffing() {
        let f = fixture(TransformOptions {
            negotiate_single_char: true,
            stuff_output: false,
        });

        assert_eq!(f.output.write(b"AB\x1bC").unwrap(), 4);
        assert_eq!(f.out_ops.output(), b"AB\x1bC");
    }

    #[test]
    fn test_close_input_then_output() {
        let f = fixture(TransformOptions::default());

        f.input.close().unwrap();
        assert_eq!(f.in_ops.close_count(), 1);
        assert!(!f.input.ops().is_console_transform());
        assert!(f.output.ops().is_console_transform());
        assert_eq!(f.registry.lookup_output(OUT).unwrap().input(), None);

        f.output.close().unwrap();
        assert_eq!(f.out_ops.close_count(), 1);
        assert!(!f.output.ops().is_console_transform());
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_double_close_is_not_found() {
        let f = fixture(TransformOptions::default());
        let transform = f.output.ops();

        transform.close(OUT).unwrap();
        assert!(matches!(
            transform.close(OUT),
            Err(StreamError::NotWrapped(HandleId(11)))
        ));
        assert_eq!(f.out_ops.close_count(), 1);
    }

    #[test]
    fn test_close_failure_still_releases() {
        let f = fixture(TransformOptions::default());
        f.in_ops.fail_close();

        assert!(f.input.close().is_err());
        assert!(f.registry.lookup_input(IN).is_none());
        assert!(!f.input.ops().is_console_transform());
    }

    #[test]
    fn test_released_input_reads_plainly() {
        let f = fixture(TransformOptions::default());
        let transform = f.input.ops();
        f.input.close().unwrap();
        f.console.set_tty_mode(TtyMode::Raw);
        f.in_ops.push_read(b"zz");

        let mut buf = [0u8; 8];
        assert_eq!(transform.read(IN, &mut buf).unwrap(), 2);
        assert!(f.out_ops.write_calls().is_empty());
    }

    #[test]
    fn test_raw_read_empty_buf_no_negotiation() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);

        let mut buf = [0u8; 0];
        assert_eq!(f.input.read(&mut buf).unwrap(), 0);
        assert!(f.out_ops.write_calls().is_empty());
        assert_eq!(f.in_ops.read_lens(), vec![0]);
    }

    #[test]
    fn test_transform_outlives_console() {
        let f = fixture(TransformOptions::default());
        f.console.set_tty_mode(TtyMode::Raw);
        let in_ops = f.in_ops.clone();
        let out_ops = f.out_ops.clone();
        let transform = f.input.ops();
        drop(f);

        in_ops.push_read(b"ab");
        let mut buf = [0u8; 8];
        assert_eq!(transform.read(IN, &mut buf).unwrap(), 2);
        assert_eq!(in_ops.read_lens(), vec![8]);
        assert!(out_ops.write_calls().is_empty());

        assert!(matches!(
            transform.close(IN),
            Err(StreamError::NotWrapped(HandleId(10)))
        ));
        assert_eq!(in_ops.close_count(), 0);
    }
}
