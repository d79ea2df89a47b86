//! ymboot CLI - YMODEM firmware transfers over a serial port.
//!
//! ## Features
//!
//! - Receive an image as the bootloader side into an emulated flash region
//! - Send a file to any YMODEM receiver
//! - Serial port listing and auto-detection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use ymboot::TransferError;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

mod commands;
mod config;

use config::Config;

/// Baud rate used when neither the command line nor a config file sets one.
const DEFAULT_BAUD: u32 = 115200;

/// Errors with a dedicated process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad or missing input from the user.
    #[error("{0}")]
    Usage(String),
    /// The user stopped the operation.
    #[error("{0}")]
    Cancelled(String),
    /// The transfer ended without success.
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
            Self::Transfer(_) => 1,
        }
    }
}

/// ymboot - YMODEM firmware transfers for serial bootloaders.
///
/// Environment variables:
///   YMBOOT_PORT   - Default serial port
///   YMBOOT_BAUD   - Default baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "ymboot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if omitted).
    #[arg(short, long, global = true, env = "YMBOOT_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "YMBOOT_BAUD")]
    baud: Option<u32>,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Act as the bootloader: receive an image and save it to a file.
    Receive {
        /// Where to write the received image.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Largest image accepted (e.g. 458752, 448K, 0x70000).
        #[arg(long, value_parser = parse_size)]
        capacity: Option<u32>,

        /// Start address of the emulated flash region.
        #[arg(long, value_parser = parse_size)]
        base: Option<u32>,

        /// Request the 8-bit checksum trailer instead of CRC-16.
        #[arg(long)]
        checksum: bool,
    },

    /// Send a file to a YMODEM receiver.
    Send {
        /// File to send.
        file: PathBuf,

        /// Name announced to the receiver (defaults to the file name).
        #[arg(long)]
        name: Option<String>,

        /// Stop once this many bytes of 1K blocks were sent and data remains.
        #[arg(long, value_parser = parse_size)]
        capacity: Option<u32>,
    },

    /// List available serial ports.
    ListPorts {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse a size or address: decimal, `K`/`M` suffixed, or `0x` hex.
fn parse_size(s: &str) -> Result<u32, String> {
    ymboot::protocol::parse_int(s.as_bytes())
        .ok_or_else(|| format!("invalid size or address: {s} (use 4096, 64K, 1M or 0x1000)"))
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    ymboot::set_interrupt_checker(was_interrupted);
}

fn main() -> ExitCode {
    // NO_COLOR and TTY detection
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "ymboot v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Receive {
            output,
            capacity,
            base,
            checksum,
        } => commands::receive::cmd_receive(cli, &config, output, *capacity, *base, *checksum),
        Commands::Send {
            file,
            name,
            capacity,
        } => commands::send::cmd_send(cli, &config, file, name.as_deref(), *capacity),
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json);
            Ok(())
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}
