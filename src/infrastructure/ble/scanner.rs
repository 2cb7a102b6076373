//! BLE Scan Utility
//!
//! Thin wrapper around an external scan command (the daemon ships one as
//! `yeelightble scan`). Parses `<mac> <name...>` lines from its stdout.
//! The link engine never calls this; it exists for device discovery from
//! the binary's `scan` subcommand.

use anyhow::Context;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

/// Scan command invoked through the shell; `-t <seconds>` is appended.
pub const DEFAULT_SCAN_COMMAND: &str = "yeelightble scan";

/// One discovered bulb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLight {
    pub mac: String,
    pub name: String,
}

/// Run a scan and return discovered devices, optionally filtered by a
/// case-insensitive name substring.
pub async fn scan(
    command: &str,
    name_filter: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<Vec<ScannedLight>> {
    let rendered = format!("{command} -t {}", timeout.as_secs().max(1));
    info!(command = %rendered, "scanning for devices");

    // Give the scan command a little slack beyond its own timeout flag.
    let output = tokio::time::timeout(
        timeout + Duration::from_secs(5),
        Command::new("sh").arg("-c").arg(&rendered).output(),
    )
    .await
    .context("scan command timed out")?
    .context("scan command failed to run")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_scan_output(&stdout, name_filter))
}

/// Parse scanner stdout. Lines whose first token does not look like a MAC
/// (no `:`) are discarded.
fn parse_scan_output(stdout: &str, name_filter: Option<&str>) -> Vec<ScannedLight> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let mac = parts.next()?;
            if !mac.contains(':') {
                return None;
            }
            Some(ScannedLight {
                mac: mac.to_string(),
                name: parts.collect::<Vec<_>>().join(" "),
            })
        })
        .filter(|device| match name_filter {
            Some(filter) => device
                .name
                .to_lowercase()
                .contains(&filter.to_lowercase()),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mac_and_name_lines() {
        let out = "F8:24:41:00:11:22 Bedside Lamp\nAA:BB:CC:DD:EE:FF candela\n";
        let devices = parse_scan_output(out, None);
        assert_eq!(
            devices,
            vec![
                ScannedLight {
                    mac: "F8:24:41:00:11:22".to_string(),
                    name: "Bedside Lamp".to_string(),
                },
                ScannedLight {
                    mac: "AA:BB:CC:DD:EE:FF".to_string(),
                    name: "candela".to_string(),
                },
            ]
        );
    }

    #[test]
    fn skips_non_mac_lines_and_blanks() {
        let out = "scanning...\n\nF8:24:41:00:11:22 Lamp\ndone\n";
        let devices = parse_scan_output(out, None);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].mac, "F8:24:41:00:11:22");
    }

    #[test]
    fn name_filter_is_case_insensitive() {
        let out = "F8:24:41:00:11:22 Bedside Lamp\nAA:BB:CC:DD:EE:FF candela\n";
        let devices = parse_scan_output(out, Some("CANDELA"));
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].mac, "AA:BB:CC:DD:EE:FF");
    }
}
