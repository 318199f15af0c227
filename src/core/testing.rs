//! Scripted operation table for tests
//!
//! Reads and writes follow a queue of scripted steps; once the queue is empty
//! reads report end of input and writes accept everything.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::stream::{HandleId, Result, StreamError, StreamOps};

#[derive(Debug, Clone)]
pub enum ReadStep {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

#[derive(Debug, Clone)]
pub enum WriteStep {
    /// Accept at most this many bytes
    Limit(usize),
    Fail(io::ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read { handle: HandleId, len: usize },
    Write { handle: HandleId, data: Vec<u8> },
    Close { handle: HandleId },
}

#[derive(Default)]
struct ScriptState {
    reads: VecDeque<ReadStep>,
    writes: VecDeque<WriteStep>,
    output: Vec<u8>,
    calls: Vec<Call>,
    close_fails: bool,
}

#[derive(Default)]
pub struct ScriptedOps {
    state: Mutex<ScriptState>,
}

impl ScriptedOps {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_read(&self, data: &[u8]) {
        self.state.lock().reads.push_back(ReadStep::Data(data.to_vec()));
    }

    pub fn push_read_step(&self, step: ReadStep) {
        self.state.lock().reads.push_back(step);
    }

    pub fn push_write(&self, step: WriteStep) {
        self.state.lock().writes.push_back(step);
    }

    pub fn fail_close(&self) {
        self.state.lock().close_fails = true;
    }

    /// Bytes accepted by all writes so far
    pub fn output(&self) -> Vec<u8> {
        self.state.lock().output.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn read_lens(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Read { len, .. } => Some(len),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Close { .. }))
            .count()
    }
}

impl StreamOps for ScriptedOps {
    fn read(&self, handle: HandleId, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.calls.push(Call::Read {
            handle,
            len: buf.len(),
        });
        match state.reads.pop_front() {
            Some(ReadStep::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(ReadStep::Fail(kind)) => Err(StreamError::Io(io::Error::from(kind))),
            None => Ok(0),
        }
    }

    fn write(&self, handle: HandleId, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.calls.push(Call::Write {
            handle,
            data: buf.to_vec(),
        });
        let n = match state.writes.pop_front() {
            Some(WriteStep::Limit(limit)) => limit.min(buf.len()),
            Some(WriteStep::Fail(kind)) => return Err(StreamError::Io(io::Error::from(kind))),
            None => buf.len(),
        };
        state.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&self, handle: HandleId) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Close { handle });
        if state.close_fails {
            return Err(StreamError::Io(io::Error::from(io::ErrorKind::Other)));
        }
        Ok(())
    }
}
