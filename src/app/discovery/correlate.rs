//! Joins `adb devices` entries to the processes that own their bridge sockets.
//!
//! No source maps a serial to a pid directly. The serial's numeric suffix is
//! matched against the local ports of live connections in two tiers:
//!
//! - `Exact`: a connection is bound to the suffix itself (`127.0.0.1:21503`).
//! - `Offset`: no owner sits on the suffix but one sits one port
//!   above it. Emulators label the console port (`emulator-5554`) while the ADB
//!   bridge listens on console + 1.
//!
//! Candidates are gathered per device: exact-port sockets first, and the +1
//! port only for devices with no socket at all on their exact port. The key is
//! then read back from the owner pool (connections with a remote endpoint):
//! the exact port when the pool has it, otherwise the port above it. The +1
//! rule comes from one emulator family and can mis-join devices whose vendor
//! uses a different layout.

use std::collections::{HashMap, HashSet};

use crate::app::models::{DeviceEntry, MatchTier, ProcessConnection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub device: DeviceEntry,
    pub tier: MatchTier,
    pub join_port: u16,
    pub connection: ProcessConnection,
}

/// Drops later rows repeating an earlier (cmdline, pid, local_port).
pub fn dedup_connections<I>(rows: I) -> Vec<ProcessConnection>
where
    I: IntoIterator<Item = ProcessConnection>,
{
    let mut seen: HashSet<(Vec<String>, u32, u16)> = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert((row.cmdline.clone(), row.pid, row.local_port)))
        .collect()
}

/// Picks the join key for one device from the ports present in the owner pool.
pub fn select_tier(device: &DeviceEntry, pool_ports: &HashSet<u16>) -> Option<(MatchTier, u16)> {
    let port = device.port_hint?;
    if pool_ports.contains(&port) {
        return Some((MatchTier::Exact, port));
    }
    port.checked_add(1).map(|offset| (MatchTier::Offset, offset))
}

/// Inner join of devices to owning connections; online devices first.
///
/// Any connection with a real pid on a device's exact port, listeners
/// included, keeps that device out of the +1 search. Only connections with a
/// remote endpoint can own a device. A join key shared by several devices or
/// several owners yields one row per pair.
pub fn correlate(devices: &[DeviceEntry], connections: &[ProcessConnection]) -> Vec<Correlation> {
    let eligible: Vec<&ProcessConnection> = connections.iter().filter(|row| row.pid != 0).collect();
    let exact_ports: HashSet<u16> = devices.iter().filter_map(|device| device.port_hint).collect();

    let (exact_rows, rest): (Vec<&ProcessConnection>, Vec<&ProcessConnection>) = eligible
        .into_iter()
        .partition(|row| exact_ports.contains(&row.local_port));
    let exact_bound: HashSet<u16> = exact_rows.iter().map(|row| row.local_port).collect();
    let offset_ports: HashSet<u16> = devices
        .iter()
        .filter_map(|device| device.port_hint)
        .filter(|port| !exact_bound.contains(port))
        .filter_map(|port| port.checked_add(1))
        .collect();
    let offset_rows = rest
        .into_iter()
        .filter(|row| offset_ports.contains(&row.local_port));

    let pool = dedup_connections(
        offset_rows
            .chain(exact_rows)
            .filter(|row| row.has_remote())
            .cloned(),
    );
    let pool_ports: HashSet<u16> = pool.iter().map(|row| row.local_port).collect();
    let mut owners_by_port: HashMap<u16, Vec<&ProcessConnection>> = HashMap::new();
    for row in &pool {
        owners_by_port.entry(row.local_port).or_default().push(row);
    }

    let (exact_keyed, offset_keyed): (Vec<_>, Vec<_>) = devices
        .iter()
        .filter_map(|device| {
            select_tier(device, &pool_ports).map(|(tier, key)| (device, tier, key))
        })
        .partition(|(_, tier, _)| *tier == MatchTier::Exact);

    let owners_by_port = &owners_by_port;
    let mut joined: Vec<Correlation> = exact_keyed
        .into_iter()
        .chain(offset_keyed)
        .flat_map(move |(device, tier, key)| {
            owners_by_port
                .get(&key)
                .into_iter()
                .flatten()
                .map(move |owner| Correlation {
                    device: device.clone(),
                    tier,
                    join_port: key,
                    connection: (*owner).clone(),
                })
        })
        .collect();
    joined.sort_by_key(|row| !row.device.online);
    joined
}
