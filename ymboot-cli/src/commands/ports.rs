//! Serial port listing.

use console::style;
use log::warn;
use ymboot::{NativePortEnumerator, PortEnumerator, PortInfo};

fn port_json(port: &PortInfo) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
    })
}

/// List ports to stderr, or as a JSON array on stdout.
pub(crate) fn cmd_list_ports(json: bool) {
    let ports = NativePortEnumerator::list_ports().unwrap_or_else(|e| {
        warn!("Failed to enumerate serial ports: {e}");
        Vec::new()
    });

    if json {
        let entries: Vec<serde_json::Value> = ports
            .iter()
            .map(port_json)
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in &ports {
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            vid_pid,
            product
        );
    }

    if let Ok(Some(auto)) = NativePortEnumerator::auto_detect() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto.name).cyan().bold()
        );
    }
}
