pub mod connect;
pub mod connections;
pub mod correlate;
pub mod devices;
pub mod processes;
pub mod sockets;

#[cfg(test)]
mod tests;

use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::app::adb::command::AdbCommand;
use crate::app::adb::locator::{ensure_adb_program, locate_host_tool};
use crate::app::config::DiscoveryConfig;
use crate::app::error::AppError;
use crate::app::models::{ConnectAttempt, ConnectedEndpoint, DiscoveryReport, ResolvedDevice};

use connect::{dispatch_connects, ConnectOptions};
use connections::scan_process_connections;
use correlate::{correlate, Correlation};
use devices::{enumerate_devices, restart_adb_server};
use processes::ProcessTable;
use sockets::collect_listening_sockets;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOptions {
    /// Configured ADB command; empty means `adb` on `PATH`.
    pub adb_path: String,
    pub restart_server: bool,
    pub connect: ConnectOptions,
    /// Bound on each one-shot command (`netstat`, `devices -l`, ...).
    pub command_timeout: Duration,
}

impl DiscoveryOptions {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            adb_path: config.adb.command_path.clone(),
            restart_server: config.connect.restart_server,
            connect: ConnectOptions::from_secs(
                config.connect.connect_timeout_secs,
                config.connect.alive_sleep_secs,
            ),
            command_timeout: Duration::from_secs(config.command.command_timeout_secs.max(1)),
        }
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

pub fn describe_endpoint(table: &ProcessTable, attempt: &ConnectAttempt) -> ConnectedEndpoint {
    let pid = attempt.socket.owning_pid;
    ConnectedEndpoint {
        endpoint: attempt.socket.endpoint(),
        pid,
        process: pid.and_then(|pid| table.handle(pid)),
        parent: pid.and_then(|pid| table.parent(pid)),
        children: pid.map(|pid| table.children(pid)).unwrap_or_default(),
        cmdline: pid
            .and_then(|pid| table.identity(pid))
            .map(|identity| identity.cmdline)
            .unwrap_or_default(),
    }
}

pub fn resolve_device(table: &ProcessTable, adb_program: &str, row: Correlation) -> ResolvedDevice {
    let pid = row.connection.pid;
    ResolvedDevice {
        adb: AdbCommand::new(adb_program, row.device.serial.clone()),
        serial: row.device.serial,
        details: row.device.details,
        online: row.device.online,
        tier: row.tier,
        join_port: row.join_port,
        pid,
        exe_name: row.connection.exe_name,
        process: table.handle(pid),
        parent: table.parent(pid),
        children: table.children(pid),
        cmdline: row.connection.cmdline,
        local_ip: row.connection.local_ip,
        local_port: row.connection.local_port,
    }
}

/// Connects ADB to every local listener that accepts, then maps each attached
/// device to the process owning its bridge socket.
///
/// Only a missing `adb`/`netstat` or a failing `netstat`/`devices -l` run is an
/// error; every other failure just shrinks the report.
pub fn connect_to_all_emulators(
    options: &DiscoveryOptions,
    trace_id: &str,
) -> Result<DiscoveryReport, AppError> {
    let adb_program = ensure_adb_program(&options.adb_path, trace_id)?;
    let netstat = locate_host_tool("netstat", trace_id)?;
    info!(trace_id = %trace_id, adb = %adb_program, "starting emulator discovery");

    if options.restart_server {
        restart_adb_server(&adb_program, options.command_timeout, trace_id);
    }

    let listening_sockets = collect_listening_sockets(&netstat, options.command_timeout, trace_id)?;
    let connect_attempts =
        dispatch_connects(&adb_program, &listening_sockets, &options.connect, trace_id);

    let devices = enumerate_devices(&adb_program, options.command_timeout, trace_id)?;

    let table = ProcessTable::snapshot();
    let connected_endpoints: Vec<ConnectedEndpoint> = connect_attempts
        .iter()
        .filter(|attempt| attempt.is_connected())
        .map(|attempt| describe_endpoint(&table, attempt))
        .collect();

    let scan = scan_process_connections(&table, trace_id);
    let resolved: Vec<ResolvedDevice> = correlate(&devices, &scan.rows)
        .into_iter()
        .map(|row| resolve_device(&table, &adb_program, row))
        .collect();
    info!(
        trace_id = %trace_id,
        devices = devices.len(),
        resolved = resolved.len(),
        "emulator discovery complete"
    );

    Ok(DiscoveryReport {
        trace_id: trace_id.to_string(),
        discovered_at: Utc::now().to_rfc3339(),
        listening_sockets,
        connect_attempts,
        connected_endpoints,
        devices,
        resolved,
        skipped_connections: scan.skipped,
    })
}
