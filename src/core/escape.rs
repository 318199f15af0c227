//! Control byte stuffing
//!
//! The output side of a wrapped console travels through a layer that treats a
//! lone ESC as a command introducer. Literal ESC bytes in application output
//! are therefore doubled on the way out.

use super::stream::{HandleId, Result, StreamError, StreamOps};

/// Reserved control byte
pub const ESC: u8 = 0x1B;

/// Sent on the output side to ask for single-character input
pub const SINGLE_CHAR_REQUEST: [u8; 2] = [ESC, b's'];

/// Stands for one literal ESC in the output stream
pub const ESCAPED_ESC: [u8; 2] = [ESC, ESC];

/// A maximal run of bytes without the control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub run: &'a [u8],
    /// The run was terminated by a control byte
    pub escaped: bool,
}

/// Iterator over the segments of a buffer
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    rest: &'a [u8],
    done: bool,
}

/// Split `buf` into runs separated by control bytes
pub fn segments(buf: &[u8]) -> Segments<'_> {
    Segments {
        rest: buf,
        done: buf.is_empty(),
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rest.iter().position(|&b| b == ESC) {
            Some(pos) => {
                let run = &self.rest[..pos];
                self.rest = &self.rest[pos + 1..];
                // A trailing ESC leaves nothing behind it
                if self.rest.is_empty() {
                    self.done = true;
                }
                Some(Segment { run, escaped: true })
            }
            None => {
                self.done = true;
                Some(Segment {
                    run: self.rest,
                    escaped: false,
                })
            }
        }
    }
}

/// Number of bytes `buf` occupies once stuffed
pub fn stuffed_len(buf: &[u8]) -> usize {
    buf.len() + buf.iter().filter(|&&b| b == ESC).count()
}

/// Write `buf` through `ops`, doubling every control byte.
///
/// Returns how many bytes of `buf` were accounted for. A short write of a
/// plain run stops early with the partial count so the caller can resume at
/// that offset; a short write of a doubled control byte is an error.
pub fn write_stuffed(ops: &dyn StreamOps, handle: HandleId, buf: &[u8]) -> Result<usize> {
    let mut accounted = 0;

    for segment in segments(buf) {
        if !segment.run.is_empty() {
            let n = ops.write(handle, segment.run)?;
            accounted += n.min(segment.run.len());
            if n < segment.run.len() {
                return Ok(accounted);
            }
        }

        if segment.escaped {
            let n = ops.write(handle, &ESCAPED_ESC)?;
            if n != ESCAPED_ESC.len() {
                return Err(StreamError::ShortEscape { written: n });
            }
            accounted += 1;
        }
    }

    tracing::trace!("stuffed {} bytes into {}", accounted, stuffed_len(&buf[..accounted]));
    Ok(accounted)
}
