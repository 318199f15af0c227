//! Registry of wrapped consoles
//!
//! Every wrapped input/output pair gets a [`WrapRecord`] holding the operation
//! tables that were installed before wrapping. A record stays alive while
//! either of its sides is still open.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::stream::{Console, HandleId, StreamOps};

/// Upper bound on simultaneously registered consoles
pub const DEFAULT_MAX_RECORDS: usize = 16;

bitflags! {
    /// Sides of a wrapped console
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct WrapSides: u8 {
        const INPUT  = 0b01;
        const OUTPUT = 0b10;
    }
}

/// One wrapped console pairing
#[derive(Clone)]
pub struct WrapRecord {
    input: Option<HandleId>,
    output: Option<HandleId>,
    original_input: Arc<dyn StreamOps>,
    original_output: Arc<dyn StreamOps>,
}

impl fmt::Debug for WrapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapRecord")
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl WrapRecord {
    pub fn input(&self) -> Option<HandleId> {
        self.input
    }

    pub fn output(&self) -> Option<HandleId> {
        self.output
    }

    /// Operation table the input stream had before wrapping
    pub fn original_input(&self) -> &Arc<dyn StreamOps> {
        &self.original_input
    }

    /// Operation table the output stream had before wrapping
    pub fn original_output(&self) -> &Arc<dyn StreamOps> {
        &self.original_output
    }

    /// Sides still open
    pub fn sides(&self) -> WrapSides {
        let mut sides = WrapSides::empty();
        if self.input.is_some() {
            sides |= WrapSides::INPUT;
        }
        if self.output.is_some() {
            sides |= WrapSides::OUTPUT;
        }
        sides
    }

    pub fn is_dead(&self) -> bool {
        self.sides().is_empty()
    }

    fn matches(&self, input: Option<HandleId>, output: Option<HandleId>) -> bool {
        (input.is_some() && self.input == input) || (output.is_some() && self.output == output)
    }
}

/// Result of releasing one side of a record
pub struct Released {
    pub side: WrapSides,
    pub handle: HandleId,
    /// Pre-wrap operation table of the released side; its close is still owed
    pub original: Arc<dyn StreamOps>,
}

impl fmt::Debug for Released {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Released")
            .field("side", &self.side)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Registry of wrapped consoles, newest first
pub struct ConsoleRegistry {
    records: Mutex<Vec<WrapRecord>>,
    max_records: usize,
}

impl Default for ConsoleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleRegistry {
    pub fn new() -> Self {
        Self::with_max_records(DEFAULT_MAX_RECORDS)
    }

    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_records,
        }
    }

    /// Find the record for either handle, creating one if there is none.
    ///
    /// A new record captures the operation tables currently installed on the
    /// console's input and output. Returns `None` when those streams are
    /// missing or the registry is full.
    pub fn find(
        &self,
        input: Option<HandleId>,
        output: Option<HandleId>,
        console: &Console,
    ) -> Option<WrapRecord> {
        let mut records = self.records.lock();

        if let Some(record) = records.iter().find(|r| r.matches(input, output)) {
            return Some(record.clone());
        }

        let (Some(in_stream), Some(out_stream)) = (console.current_input(), console.current_output())
        else {
            debug!("No current console streams to capture");
            return None;
        };

        if records.len() >= self.max_records {
            warn!(
                "Console registry full ({} records), not wrapping {:?}/{:?}",
                records.len(),
                input,
                output
            );
            return None;
        }

        let record = WrapRecord {
            input,
            output,
            original_input: in_stream.ops(),
            original_output: out_stream.ops(),
        };
        debug!("Registered console {:?}/{:?}", input, output);
        records.insert(0, record.clone());
        Some(record)
    }

    /// Record whose input side is `handle`
    pub fn lookup_input(&self, handle: HandleId) -> Option<WrapRecord> {
        self.records
            .lock()
            .iter()
            .find(|r| r.input == Some(handle))
            .cloned()
    }

    /// Record whose output side is `handle`
    pub fn lookup_output(&self, handle: HandleId) -> Option<WrapRecord> {
        self.records
            .lock()
            .iter()
            .find(|r| r.output == Some(handle))
            .cloned()
    }

    /// Release one side of a record.
    ///
    /// The input handle is checked first. The released side's stream gets its
    /// original operation table back and the record is dropped once both
    /// sides are gone. Returns `None` if no record references the handle.
    pub fn release(
        &self,
        input: Option<HandleId>,
        output: Option<HandleId>,
        console: &Console,
    ) -> Option<Released> {
        let released = {
            let mut records = self.records.lock();
            let mut released = None;

            for (idx, record) in records.iter_mut().enumerate() {
                if let Some(handle) = input.filter(|h| record.input == Some(*h)) {
                    record.input = None;
                    released = Some((
                        idx,
                        Released {
                            side: WrapSides::INPUT,
                            handle,
                            original: record.original_input.clone(),
                        },
                    ));
                } else if let Some(handle) = output.filter(|h| record.output == Some(*h)) {
                    record.output = None;
                    released = Some((
                        idx,
                        Released {
                            side: WrapSides::OUTPUT,
                            handle,
                            original: record.original_output.clone(),
                        },
                    ));
                }
                if released.is_some() {
                    break;
                }
            }

            let (idx, released) = released?;
            if records[idx].is_dead() {
                records.remove(idx);
                debug!("Console record for {} dropped", released.handle);
            }
            released
        };

        let stream = if released.side == WrapSides::INPUT {
            console.current_input()
        } else {
            console.current_output()
        };
        if let Some(stream) = stream {
            if stream.handle() == released.handle && stream.ops().is_console_transform() {
                stream.set_ops(released.original.clone());
            }
        }

        debug!("Released {:?} side of {}", released.side, released.handle);
        Some(released)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of all records, newest first
    pub fn records(&self) -> Vec<WrapRecord> {
        self.records.lock().clone()
    }

    /// Drop every record and hand them back
    pub fn clear(&self) -> Vec<WrapRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}
