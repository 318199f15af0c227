//! consplice - console stream interception shim
//!
//! Replaces the operation tables behind a process's console input and output
//! so bytes can be transformed in transit:
//!
//! - In raw mode every read first asks the terminal driver for a single
//!   character (`ESC s`) and drops the newline the driver appends.
//! - Every literal ESC written to the output is doubled.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use consplice::{stdio_console, ConsoleManager, TransformOptions};
//!
//! let console = Arc::new(stdio_console());
//! let manager = ConsoleManager::new(console.clone(), TransformOptions::default());
//! manager.wrap_console().unwrap();
//!
//! let output = console.current_output().unwrap();
//! output.write(b"literal \x1b survives\n").unwrap();
//! ```

pub mod config;
pub mod core;

pub use crate::config::{ConfigError, ShimConfig};
pub use crate::core::escape::{segments, stuffed_len, write_stuffed, Segment, ESC};
pub use crate::core::manager::ConsoleManager;
pub use crate::core::registry::{ConsoleRegistry, WrapRecord, WrapSides};
pub use crate::core::stdio::{stdio_console, StdinOps, StdoutOps};
pub use crate::core::stream::{
    Console, Control, HandleId, Stream, StreamError, StreamOps, TtyMode,
};
pub use crate::core::transform::{InputTransform, OutputTransform, TransformOptions};
