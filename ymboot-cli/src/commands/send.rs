//! Send command: push a file to a YMODEM receiver.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;
use ymboot::protocol::packet::FILE_NAME_MAX;
use ymboot::{SystemClock, Transmitter};

use super::{open_port, progress_bar, track, transfer_failure};
use crate::config::Config;
use crate::{Cli, CliError};

/// Name to announce in the header record.
fn announced_name(file: &Path, name: Option<&str>) -> Result<String, CliError> {
    let name = match name {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                CliError::Usage(format!(
                    "cannot derive a file name from {}; pass --name",
                    file.display()
                ))
            })?,
    };

    if name.is_empty() || name.len() > FILE_NAME_MAX || name.contains('\0') {
        return Err(CliError::Usage(format!(
            "file name must be 1..={FILE_NAME_MAX} bytes without NUL: {name:?}"
        )));
    }
    Ok(name)
}

pub(crate) fn cmd_send(
    cli: &Cli,
    config: &Config,
    file: &Path,
    name: Option<&str>,
    capacity: Option<u32>,
) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let size = u32::try_from(data.len()).map_err(|_| {
        CliError::Usage(format!("{} is too large for a YMODEM transfer", file.display()))
    })?;
    let name = announced_name(file, name)?;

    let mut port = open_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Sending {} ({size} bytes), waiting for receiver...",
            style("📦").cyan(),
            style(&name).cyan()
        );
    }

    let clock = SystemClock::new();
    let mut transmitter = Transmitter::with_config(&mut port, &clock, config.session_config(false));
    if let Some(capacity) = capacity {
        transmitter = transmitter.with_capacity(capacity);
    }

    let pb = progress_bar(cli);
    let outcome = transmitter.transmit_with_progress(&data, &name, size, track(&pb));
    if let Err(err) = outcome {
        pb.abandon();
        return Err(transfer_failure(err));
    }
    pb.finish_and_clear();

    if !cli.quiet {
        eprintln!(
            "{} Sent {} ({:?} trailer)",
            style("✓").green(),
            style(&name).cyan(),
            transmitter.integrity()
        );
    }
    Ok(())
}
