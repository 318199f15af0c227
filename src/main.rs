//! consplice - run the console through the interception shim
//!
//! Wraps the process's own stdin/stdout and echoes everything typed back to
//! the (wrapped) output until end of input or Ctrl+D.
//!
//! ```text
//! consplice              # Cooked mode, line at a time
//! consplice --raw        # Raw mode, single-character negotiation
//! consplice --no-stuff   # Leave ESC bytes alone on output
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use consplice::{
    stdio_console, ConsoleManager, ConsoleRegistry, ShimConfig, StreamError, TtyMode,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ctrl+D
const EOT: u8 = 0x04;

/// Command line options
#[derive(Default)]
struct Args {
    /// Switch the terminal to raw mode while running
    raw: bool,
    /// Disable single-character negotiation
    no_negotiate: bool,
    /// Disable ESC stuffing
    no_stuff: bool,
    /// Explicit config file
    config: Option<PathBuf>,
    /// Debug logging
    verbose: bool,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("consplice {}", VERSION);
}

fn print_help() {
    eprintln!("consplice {} - console stream interception shim", VERSION);
    eprintln!();
    eprintln!("Usage: consplice [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -r, --raw             Put the terminal in raw mode");
    eprintln!("      --no-negotiate    Do not request single-character reads");
    eprintln!("      --no-stuff        Do not double ESC bytes on output");
    eprintln!("  -c, --config <PATH>   Configuration file");
    eprintln!("  -V, --verbose         Debug logging on stderr");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Exit: Ctrl+D or end of input");
    eprintln!();
    eprintln!("Configuration: ~/.consplice/config.toml");
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-r" | "--raw" => {
                parsed.raw = true;
            }
            "--no-negotiate" => {
                parsed.no_negotiate = true;
            }
            "--no-stuff" => {
                parsed.no_stuff = true;
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing config path".to_string());
                }
                parsed.config = Some(PathBuf::from(&args[i]));
            }
            "-V" | "--verbose" => {
                parsed.verbose = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

/// Restores cooked mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> anyhow::Result<Self> {
        crossterm::terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = match &args.config {
        Some(path) => ShimConfig::load_from(path)?,
        None => ShimConfig::load(),
    };
    if args.no_negotiate {
        config.transform.negotiate_single_char = false;
    }
    if args.no_stuff {
        config.transform.stuff_output = false;
    }

    // Logging goes to stderr so it never mixes with the wrapped stdout
    let default_level = if args.verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    info!("consplice starting...");

    let _raw = if args.raw { Some(RawModeGuard::enable()?) } else { None };

    let console = Arc::new(stdio_console());
    let manager = ConsoleManager::with_registry(
        console.clone(),
        Arc::new(ConsoleRegistry::with_max_records(config.registry.max_records)),
        config.transform_options(),
    );
    manager.wrap_console()?;
    info!("Tty mode: {:?}", console.tty_mode());

    let result = pump(&console);
    if let Err(e) = &result {
        error!("Console pump failed: {}", e);
    }

    // Close through the transforms so the registry is emptied
    let closed = manager.close_console();
    if let Err(e) = &closed {
        error!("Console close failed: {}", e);
    }
    info!("Console closed, {} records left", manager.registry().len());

    result.and(closed).map_err(Into::into)
}

/// Copy wrapped input to wrapped output until EOF or Ctrl+D
fn pump(console: &consplice::Console) -> Result<(), StreamError> {
    let (Some(input), Some(output)) = (console.current_input(), console.current_output()) else {
        return Ok(());
    };
    let mut buf = [0u8; 1024];

    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }

        let chunk = &buf[..n];
        let (chunk, done) = match chunk.iter().position(|&b| b == EOT) {
            Some(pos) => (&chunk[..pos], true),
            None => (chunk, false),
        };

        let mut offset = 0;
        while offset < chunk.len() {
            let written = output.write(&chunk[offset..])?;
            if written == 0 {
                return Err(StreamError::Io(std::io::ErrorKind::WriteZero.into()));
            }
            offset += written;
        }

        // In raw mode the terminal does not translate the newline for us
        if console.tty_mode() == TtyMode::Raw && chunk.last() == Some(&b'\r') {
            output.write(b"\n")?;
        }

        if done {
            break;
        }
    }

    Ok(())
}
