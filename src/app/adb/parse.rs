use std::sync::OnceLock;

use regex::Regex;

use crate::app::models::{DeviceEntry, ListeningSocket};

const TRANSPORT_ID_MARKER: &str = "transport_id:";
const LOOPBACK_HOSTS: [&str; 2] = ["0.0.0.0", "127.0.0.1"];

fn split_host_port(value: &str) -> Option<(&str, u16)> {
    // BSD netstat prints `127.0.0.1.5037`.
    let (host, port) = value.rsplit_once(':').or_else(|| value.rsplit_once('.'))?;
    let port = port.parse::<u16>().ok()?;
    Some((host, port))
}

fn parse_owning_pid(token: Option<&&str>) -> Option<u32> {
    let token = token?;
    let digits = token.split('/').next().unwrap_or_default();
    digits.parse::<u32>().ok()
}

/// Parse `netstat -a -n -o -p TCP` (Windows) or `netstat -a -n -p -t` (Linux) output
/// into the TCP listeners bound to `0.0.0.0` or `127.0.0.1`.
pub fn parse_netstat_listening(output: &str) -> Vec<ListeningSocket> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let protocol = tokens.first()?;
            if !protocol.to_ascii_lowercase().starts_with("tcp") {
                return None;
            }
            let state_index = tokens
                .iter()
                .position(|token| *token == "LISTENING" || *token == "LISTEN")?;
            let local = tokens.get(state_index.checked_sub(2)?)?;
            let (host, port) = split_host_port(local)?;
            if !LOOPBACK_HOSTS.contains(&host) {
                return None;
            }
            Some(ListeningSocket {
                protocol: protocol.to_string(),
                local_address: host.to_string(),
                local_port: port,
                owning_pid: parse_owning_pid(tokens.get(state_index + 1)),
            })
        })
        .collect()
}

/// Numeric suffix after the first `:` or `-` of a serial.
///
/// Exact for `127.0.0.1:21503`; the console port for `emulator-5554`.
pub fn parse_serial_port(serial: &str) -> Option<u16> {
    let (_, rest) = serial.split_once([':', '-'])?;
    let token = rest.split([':', '-']).next().unwrap_or_default();
    token.trim().parse::<u16>().ok()
}

/// Parse `adb devices -l`, keeping only entries that carry a transport id.
pub fn parse_adb_devices(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (serial, details) = line.split_once(char::is_whitespace)?;
            let details = details.trim();
            if !details.contains(TRANSPORT_ID_MARKER) {
                return None;
            }
            let transport_id = details
                .split_whitespace()
                .find_map(|token| token.strip_prefix(TRANSPORT_ID_MARKER))
                .map(str::to_string);
            Some(DeviceEntry {
                serial: serial.to_string(),
                details: details.to_string(),
                online: !details.starts_with("offline"),
                transport_id,
                port_hint: parse_serial_port(serial),
            })
        })
        .collect()
}

/// `adb connect` prints `connected to host:port` (or `already connected to`, which
/// does not count as a fresh connection).
fn connect_pattern() -> &'static Regex {
    static CONNECTED: OnceLock<Regex> = OnceLock::new();
    CONNECTED.get_or_init(|| Regex::new(r"(?i)^connected\s+to\s+").expect("connect pattern"))
}

pub fn is_connect_success(stdout: &str) -> bool {
    connect_pattern().is_match(stdout.trim())
}
