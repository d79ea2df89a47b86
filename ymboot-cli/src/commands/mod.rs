//! Command implementations.
//!
//! Each subcommand is implemented in its own module; the helpers below are
//! shared by the commands that open a serial port.

pub(crate) mod completions;
pub(crate) mod ports;
pub(crate) mod receive;
pub(crate) mod send;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use ymboot::{NativePort, NativePortEnumerator, PortEnumerator, SerialConfig, TransferError};

use crate::config::Config;
use crate::{Cli, CliError, DEFAULT_BAUD, use_fancy_output, was_interrupted};

/// Pick the serial port: `--port`/`YMBOOT_PORT`, then the config file, then
/// auto-detection.
pub(crate) fn resolve_port(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(port) = cli
        .port
        .as_ref()
        .or(config.port.serial.as_ref())
    {
        return Ok(port.clone());
    }

    match NativePortEnumerator::auto_detect()? {
        Some(port) => {
            info!("Auto-detected serial port {}", port.name);
            Ok(port.name)
        },
        None => Err(CliError::Usage(
            "no serial port found; pass --port or set YMBOOT_PORT".to_string(),
        )
        .into()),
    }
}

/// Effective baud rate.
pub(crate) fn resolve_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.port.baud)
        .unwrap_or(DEFAULT_BAUD)
}

/// Open the port with stale input discarded.
pub(crate) fn open_port(cli: &Cli, config: &Config) -> Result<NativePort> {
    let name = resolve_port(cli, config)?;
    let baud = resolve_baud(cli, config);

    let mut port = NativePort::open(&SerialConfig::new(&name, baud))
        .with_context(|| format!("Failed to open {name} at {baud} baud"))?;
    port.clear_buffers()
        .with_context(|| format!("Failed to flush {name}"))?;
    info!("Using {name} at {baud} baud");
    Ok(port)
}

/// Map a failed transfer to a CLI error, treating a link abort after
/// Ctrl-C as a cancellation.
pub(crate) fn transfer_failure(err: TransferError) -> anyhow::Error {
    if err == TransferError::Aborted && was_interrupted() {
        CliError::Cancelled("interrupted".to_string()).into()
    } else {
        CliError::Transfer(err).into()
    }
}

/// Byte progress bar on stderr, hidden when quiet or not a terminal.
pub(crate) fn progress_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Progress callback shape shared by both directions.
pub(crate) fn track(pb: &ProgressBar) -> impl FnMut(u32, u32) + '_ {
    move |done, total| {
        pb.set_length(u64::from(total));
        pb.set_position(u64::from(done));
    }
}
