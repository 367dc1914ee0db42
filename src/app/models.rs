use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::app::adb::command::AdbCommand;

/// One `LISTEN` row of the OS TCP socket table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListeningSocket {
    pub protocol: String,
    pub local_address: String,
    pub local_port: u16,
    pub owning_pid: Option<u32>,
}

impl ListeningSocket {
    /// `address:port` as handed to `adb connect`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.local_address, self.local_port)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectOutcome {
    Connected,
    Rejected,
    TimedOut,
    SpawnFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub socket: ListeningSocket,
    pub request_pid: Option<u32>,
    pub stdout: String,
    pub stderr: String,
    pub outcome: ConnectOutcome,
}

impl ConnectAttempt {
    pub fn is_connected(&self) -> bool {
        self.outcome == ConnectOutcome::Connected
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceEntry {
    pub serial: String,
    pub details: String,
    pub online: bool,
    pub transport_id: Option<String>,
    /// Numeric suffix of the serial (`ip:PORT` or `emulator-PORT`).
    pub port_hint: Option<u16>,
}

/// Immutable snapshot of an OS process, taken once per discovery run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub exe: Option<String>,
    pub status: String,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessConnection {
    pub exe_name: String,
    pub cmdline: Vec<String>,
    pub pid: u32,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: Option<IpAddr>,
    pub remote_port: Option<u16>,
}

impl ProcessConnection {
    pub fn has_remote(&self) -> bool {
        self.remote_ip.is_some() && self.remote_port.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoOwningPid,
    KernelOwned,
    ProcessGone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Row(ProcessConnection),
    Skipped { pid: Option<u32>, reason: SkipReason },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Connection bound to the serial's own port.
    Exact,
    /// Connection bound one port above the serial's port (emulator console + 1).
    Offset,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectedEndpoint {
    pub endpoint: String,
    pub pid: Option<u32>,
    pub process: Option<ProcessHandle>,
    pub parent: Option<ProcessHandle>,
    pub children: Vec<ProcessHandle>,
    pub cmdline: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub serial: String,
    pub details: String,
    pub online: bool,
    pub tier: MatchTier,
    pub join_port: u16,
    pub pid: u32,
    pub exe_name: String,
    pub process: Option<ProcessHandle>,
    pub parent: Option<ProcessHandle>,
    pub children: Vec<ProcessHandle>,
    pub cmdline: Vec<String>,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub adb: AdbCommand,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub trace_id: String,
    pub discovered_at: String,
    pub listening_sockets: Vec<ListeningSocket>,
    pub connect_attempts: Vec<ConnectAttempt>,
    pub connected_endpoints: Vec<ConnectedEndpoint>,
    pub devices: Vec<DeviceEntry>,
    pub resolved: Vec<ResolvedDevice>,
    pub skipped_connections: BTreeMap<SkipReason, usize>,
}
