//! Console manager
//!
//! Owns the registry and splices the transforms into the current console.

use std::sync::Arc;

use tracing::{debug, info};

use super::registry::ConsoleRegistry;
use super::stream::{Console, Result};
use super::transform::{InputTransform, OutputTransform, TransformOptions};

/// Wraps the current console of a [`Console`]
pub struct ConsoleManager {
    console: Arc<Console>,
    registry: Arc<ConsoleRegistry>,
    options: TransformOptions,
}

impl ConsoleManager {
    pub fn new(console: Arc<Console>, options: TransformOptions) -> Self {
        Self::with_registry(console, Arc::new(ConsoleRegistry::new()), options)
    }

    pub fn with_registry(
        console: Arc<Console>,
        registry: Arc<ConsoleRegistry>,
        options: TransformOptions,
    ) -> Self {
        Self {
            console,
            registry,
            options,
        }
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.console
    }

    pub fn registry(&self) -> &Arc<ConsoleRegistry> {
        &self.registry
    }

    /// Install the transforms on the current input and output.
    ///
    /// Does nothing if either stream is missing or the registry has no room.
    ///
    /// # Panics
    ///
    /// Panics if either stream already carries a console transform.
    pub fn wrap_console(&self) -> Result<()> {
        let (Some(input), Some(output)) =
            (self.console.current_input(), self.console.current_output())
        else {
            debug!("No current console, nothing to wrap");
            return Ok(());
        };

        assert!(
            !input.ops().is_console_transform(),
            "input {} is already wrapped",
            input.handle()
        );
        assert!(
            !output.ops().is_console_transform(),
            "output {} is already wrapped",
            output.handle()
        );

        let Some(record) =
            self.registry
                .find(Some(input.handle()), Some(output.handle()), &self.console)
        else {
            return Ok(());
        };

        input.set_ops(Arc::new(InputTransform::new(
            record.original_input().clone(),
            self.registry.clone(),
            &self.console,
            self.options,
        )));
        output.set_ops(Arc::new(OutputTransform::new(
            record.original_output().clone(),
            self.registry.clone(),
            &self.console,
            self.options,
        )));

        info!(
            "Wrapped console {}/{} (negotiate: {}, stuff: {})",
            input.handle(),
            output.handle(),
            self.options.negotiate_single_char,
            self.options.stuff_output
        );
        Ok(())
    }

    /// True if both current streams carry the transforms
    pub fn is_wrapped(&self) -> bool {
        match (self.console.current_input(), self.console.current_output()) {
            (Some(input), Some(output)) => {
                input.ops().is_console_transform() && output.ops().is_console_transform()
            }
            _ => false,
        }
    }

    /// Close the current output, then the current input.
    ///
    /// Both sides are always closed; the first error is returned.
    pub fn close_console(&self) -> Result<()> {
        let output = self.console.current_output().map(|s| s.close());
        let input = self.console.current_input().map(|s| s.close());
        output.unwrap_or(Ok(())).and(input.unwrap_or(Ok(())))
    }

    /// Put the original operation tables back without closing anything and
    /// forget every record.
    pub fn unwrap_console(&self) {
        let records = self.registry.clear();

        if let Some(input) = self.console.current_input() {
            if let Some(record) = records.iter().find(|r| r.input() == Some(input.handle())) {
                if input.ops().is_console_transform() {
                    input.set_ops(record.original_input().clone());
                }
            }
        }
        if let Some(output) = self.console.current_output() {
            if let Some(record) = records.iter().find(|r| r.output() == Some(output.handle())) {
                if output.ops().is_console_transform() {
                    output.set_ops(record.original_output().clone());
                }
            }
        }

        debug!("Unwrapped console, {} records dropped", records.len());
    }
}
