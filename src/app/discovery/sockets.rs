use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::app::adb::parse::parse_netstat_listening;
use crate::app::adb::runner::{adb_args, run_command_with_timeout};
use crate::app::error::AppError;
use crate::app::models::ListeningSocket;

/// list-all, numeric, owning pid, TCP only.
pub fn netstat_args() -> Vec<String> {
    if cfg!(windows) {
        adb_args(&["-a", "-n", "-o", "-p", "TCP"])
    } else if cfg!(target_os = "linux") {
        adb_args(&["-a", "-n", "-p", "-t"])
    } else {
        adb_args(&["-a", "-n", "-p", "tcp"])
    }
}

/// Snapshot of loopback/any-address TCP listeners.
pub fn collect_listening_sockets(
    netstat: &Path,
    timeout: Duration,
    trace_id: &str,
) -> Result<Vec<ListeningSocket>, AppError> {
    let program = netstat.to_string_lossy();
    let output = run_command_with_timeout(&program, &netstat_args(), timeout, trace_id)?;
    if !output.stderr.is_empty() {
        // Linux netstat warns about sockets it cannot attribute without root.
        debug!(trace_id = %trace_id, stderr = %output.stderr, "netstat reported warnings");
    }
    let sockets = parse_netstat_listening(&output.stdout);
    info!(trace_id = %trace_id, count = sockets.len(), "collected listening sockets");
    Ok(sockets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netstat_args_request_numeric_tcp_listing() {
        let args = netstat_args();
        assert!(args.contains(&"-a".to_string()));
        assert!(args.contains(&"-n".to_string()));
        assert!(args.iter().any(|arg| arg.eq_ignore_ascii_case("tcp") || arg == "-t"));
    }

    #[cfg(unix)]
    #[test]
    fn collects_from_a_netstat_lookalike() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().expect("tmp");
        let script = tmp.path().join("netstat");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'tcp        0      0 127.0.0.1:21503         0.0.0.0:*               LISTEN      20064/MEmuHeadless'\necho 'tcp        0      0 10.0.0.2:8080           0.0.0.0:*               LISTEN      77/nginx'\n",
        )
        .expect("write script");
        let mut perms = std::fs::metadata(&script).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).expect("chmod");

        let sockets =
            collect_listening_sockets(&script, Duration::from_secs(10), "trace-n").expect("collect");
        assert_eq!(sockets.len(), 1);
        assert_eq!(sockets[0].endpoint(), "127.0.0.1:21503");
        assert_eq!(sockets[0].owning_pid, Some(20064));
    }
}
