//! Receive command: play the bootloader side of a transfer.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;
use ymboot::{MemoryStorage, Receiver, SystemClock};

use super::{open_port, progress_bar, track, transfer_failure};
use crate::config::{Config, MAX_CAPACITY};
use crate::{Cli, CliError};

/// Reject regions the host cannot buffer or address.
fn check_region(base: u32, capacity: u32) -> Result<(), CliError> {
    if capacity > MAX_CAPACITY {
        return Err(CliError::Usage(format!(
            "capacity {capacity} bytes exceeds the {MAX_CAPACITY}-byte limit"
        )));
    }
    if base
        .checked_add(capacity)
        .is_none()
    {
        return Err(CliError::Usage(format!(
            "region {base:#010x} + {capacity} bytes runs past the 32-bit address space"
        )));
    }
    Ok(())
}

pub(crate) fn cmd_receive(
    cli: &Cli,
    config: &Config,
    output: &Path,
    capacity: Option<u32>,
    base: Option<u32>,
    checksum: bool,
) -> Result<()> {
    let capacity = capacity.unwrap_or_else(|| config.capacity());
    let base = base.unwrap_or_else(|| config.base());
    check_region(base, capacity)?;

    let session_config = config.session_config(checksum);
    let mut port = open_port(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "{} Waiting for sender ({capacity} bytes at {base:#010x}, {:?})... press Ctrl-C to stop",
            style("⏳").yellow(),
            session_config.integrity
        );
    }

    let mut flash = MemoryStorage::new(base, capacity);
    let clock = SystemClock::new();
    let pb = progress_bar(cli);

    let (session, outcome) = Receiver::with_config(&mut port, &mut flash, &clock, session_config)
        .receive_with_progress(capacity, track(&pb));

    let size = match outcome {
        Ok(size) => size,
        Err(err) => {
            pb.abandon();
            return Err(transfer_failure(err));
        },
    };
    pb.finish_and_clear();

    if size == 0 && session.file_name().is_empty() {
        if !cli.quiet {
            eprintln!(
                "{} Sender closed the batch without a file; nothing written",
                style("ℹ").blue()
            );
        }
        return Ok(());
    }

    fs::write(output, flash.image(size))
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} Received {} -> {}",
            style("✓").green(),
            style(session.file_name()).cyan(),
            output.display()
        );
    }
    println!("{} {size}", session.file_name());
    Ok(())
}
