//! Core console interception components.
//!
//! - **stream**: Stream handles, operation tables and the process console
//! - **escape**: Control byte stuffing for the output side
//! - **registry**: Bookkeeping of wrapped consoles and their original tables
//! - **transform**: Read/write/close operation tables installed on a console
//! - **manager**: Entry point that splices the transforms in
//! - **stdio**: Operation tables over the real stdin/stdout
//!
//! # Architecture
//!
//! ```text
//! Stream (dispatcher slot)
//! └── InputTransform / OutputTransform
//!     ├── ConsoleRegistry (WrapRecord per console)
//!     └── original StreamOps (StdinOps / StdoutOps / host tables)
//! ```

pub mod escape;
pub mod manager;
pub mod registry;
pub mod stdio;
pub mod stream;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;
