use std::time::Duration;

use tracing::info;

use crate::app::adb::parse::parse_adb_devices;
use crate::app::adb::runner::{adb_args, run_best_effort, run_command_with_timeout};
use crate::app::error::AppError;
use crate::app::models::DeviceEntry;

/// `kill-server` then `start-server`; failures are ignored.
pub fn restart_adb_server(adb_program: &str, timeout: Duration, trace_id: &str) {
    info!(trace_id = %trace_id, "restarting adb server");
    run_best_effort(adb_program, &adb_args(&["kill-server"]), timeout, trace_id);
    run_best_effort(adb_program, &adb_args(&["start-server"]), timeout, trace_id);
}

/// Nudges offline transports, then lists attached devices.
pub fn enumerate_devices(
    adb_program: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<Vec<DeviceEntry>, AppError> {
    run_best_effort(
        adb_program,
        &adb_args(&["reconnect", "offline"]),
        timeout,
        trace_id,
    );
    let output = run_command_with_timeout(
        adb_program,
        &adb_args(&["devices", "-l"]),
        timeout,
        trace_id,
    )?;
    let devices = parse_adb_devices(&output.stdout);
    info!(
        trace_id = %trace_id,
        count = devices.len(),
        online = devices.iter().filter(|device| device.online).count(),
        "enumerated adb devices"
    );
    Ok(devices)
}
