use std::collections::BTreeMap;
use std::net::IpAddr;

use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};
use tracing::{info, warn};

use crate::app::discovery::processes::{ProcessIdentity, ProcessTable};
use crate::app::models::{ProcessConnection, ScanOutcome, SkipReason};

/// A socket as the OS reports it, before process attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSocket {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote: Option<(IpAddr, u16)>,
    pub pids: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionScan {
    pub rows: Vec<ProcessConnection>,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl ConnectionScan {
    pub fn from_outcomes(outcomes: Vec<ScanOutcome>) -> Self {
        let mut scan = ConnectionScan::default();
        for outcome in outcomes {
            match outcome {
                ScanOutcome::Row(row) => scan.rows.push(row),
                ScanOutcome::Skipped { reason, .. } => {
                    *scan.skipped.entry(reason).or_insert(0) += 1;
                }
            }
        }
        scan
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

fn remote_endpoint(addr: IpAddr, port: u16) -> Option<(IpAddr, u16)> {
    if port == 0 && addr.is_unspecified() {
        None
    } else {
        Some((addr, port))
    }
}

/// Reads every TCP and UDP socket with its owning pids. An unreadable table is
/// treated as empty.
pub fn read_socket_table(trace_id: &str) -> Vec<RawSocket> {
    let af_flags = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
    let proto_flags = ProtocolFlags::TCP | ProtocolFlags::UDP;
    let sockets = match get_sockets_info(af_flags, proto_flags) {
        Ok(sockets) => sockets,
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "failed to read socket table");
            return Vec::new();
        }
    };

    sockets
        .into_iter()
        .map(|socket| match socket.protocol_socket_info {
            ProtocolSocketInfo::Tcp(tcp) => RawSocket {
                local_ip: tcp.local_addr,
                local_port: tcp.local_port,
                remote: remote_endpoint(tcp.remote_addr, tcp.remote_port),
                pids: socket.associated_pids,
            },
            ProtocolSocketInfo::Udp(udp) => RawSocket {
                local_ip: udp.local_addr,
                local_port: udp.local_port,
                remote: None,
                pids: socket.associated_pids,
            },
        })
        .collect()
}

/// One outcome per (socket, owning pid). Sockets the OS would not attribute, pid 0,
/// and processes that vanished before lookup become `Skipped`.
pub fn flatten_connections<F>(sockets: Vec<RawSocket>, lookup: F) -> Vec<ScanOutcome>
where
    F: Fn(u32) -> Option<ProcessIdentity>,
{
    let mut outcomes = Vec::with_capacity(sockets.len());
    for socket in sockets {
        if socket.pids.is_empty() {
            outcomes.push(ScanOutcome::Skipped {
                pid: None,
                reason: SkipReason::NoOwningPid,
            });
            continue;
        }
        for pid in socket.pids.iter().copied() {
            if pid == 0 {
                outcomes.push(ScanOutcome::Skipped {
                    pid: Some(0),
                    reason: SkipReason::KernelOwned,
                });
                continue;
            }
            let Some(identity) = lookup(pid) else {
                outcomes.push(ScanOutcome::Skipped {
                    pid: Some(pid),
                    reason: SkipReason::ProcessGone,
                });
                continue;
            };
            outcomes.push(ScanOutcome::Row(ProcessConnection {
                exe_name: identity.name,
                cmdline: identity.cmdline,
                pid,
                local_ip: socket.local_ip,
                local_port: socket.local_port,
                remote_ip: socket.remote.map(|(ip, _)| ip),
                remote_port: socket.remote.map(|(_, port)| port),
            }));
        }
    }
    outcomes
}

pub fn scan_process_connections(table: &ProcessTable, trace_id: &str) -> ConnectionScan {
    let sockets = read_socket_table(trace_id);
    let scan = ConnectionScan::from_outcomes(flatten_connections(sockets, |pid| {
        table.identity(pid)
    }));
    info!(
        trace_id = %trace_id,
        rows = scan.rows.len(),
        skipped = scan.skipped_total(),
        "scanned process connections"
    );
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn identity(name: &str) -> ProcessIdentity {
        ProcessIdentity {
            name: name.to_string(),
            cmdline: vec![name.to_string(), "--instance".to_string(), "Nougat64".to_string()],
        }
    }

    #[test]
    fn remote_endpoint_treats_wildcard_as_missing() {
        assert_eq!(
            remote_endpoint(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            None
        );
        assert_eq!(remote_endpoint(LOOPBACK, 5037), Some((LOOPBACK, 5037)));
    }

    #[test]
    fn flattens_one_row_per_owning_pid() {
        let sockets = vec![RawSocket {
            local_ip: LOOPBACK,
            local_port: 5565,
            remote: Some((LOOPBACK, 50211)),
            pids: vec![7896, 7900],
        }];
        let outcomes = flatten_connections(sockets, |pid| {
            Some(identity(if pid == 7896 { "HD-Player.exe" } else { "helper" }))
        });
        let scan = ConnectionScan::from_outcomes(outcomes);
        assert_eq!(scan.rows.len(), 2);
        assert_eq!(scan.rows[0].pid, 7896);
        assert_eq!(scan.rows[0].exe_name, "HD-Player.exe");
        assert_eq!(scan.rows[0].remote_port, Some(50211));
        assert!(scan.rows[0].has_remote());
        assert_eq!(scan.skipped_total(), 0);
    }

    #[test]
    fn skips_unattributed_kernel_and_vanished_sockets() {
        let base = RawSocket {
            local_ip: LOOPBACK,
            local_port: 5555,
            remote: None,
            pids: vec![],
        };
        let sockets = vec![
            base.clone(),
            RawSocket {
                pids: vec![0],
                ..base.clone()
            },
            RawSocket {
                pids: vec![4242],
                ..base.clone()
            },
            RawSocket {
                pids: vec![4716],
                ..base
            },
        ];
        let outcomes =
            flatten_connections(sockets, |pid| (pid == 4716).then(|| identity("Ld9BoxHeadless.exe")));
        assert!(outcomes.contains(&ScanOutcome::Skipped {
            pid: Some(4242),
            reason: SkipReason::ProcessGone
        }));

        let scan = ConnectionScan::from_outcomes(outcomes);
        assert_eq!(scan.rows.len(), 1);
        assert_eq!(scan.rows[0].pid, 4716);
        assert!(!scan.rows[0].has_remote());
        assert_eq!(scan.skipped.get(&SkipReason::NoOwningPid), Some(&1));
        assert_eq!(scan.skipped.get(&SkipReason::KernelOwned), Some(&1));
        assert_eq!(scan.skipped.get(&SkipReason::ProcessGone), Some(&1));
        assert!(scan.rows.iter().all(|row| row.pid != 0));
    }

    #[test]
    fn preserves_cmdline_order() {
        let sockets = vec![RawSocket {
            local_ip: LOOPBACK,
            local_port: 21503,
            remote: Some((LOOPBACK, 61000)),
            pids: vec![20064],
        }];
        let scan = ConnectionScan::from_outcomes(flatten_connections(sockets, |_| {
            Some(identity("MEmuHeadless.exe"))
        }));
        assert_eq!(
            scan.rows[0].cmdline,
            vec!["MEmuHeadless.exe", "--instance", "Nougat64"]
        );
    }
}
