use super::*;

use std::net::{IpAddr, Ipv4Addr};
use std::process::{Child, Command, Stdio};

use crate::app::adb::parse::{parse_adb_devices, parse_netstat_listening};
use crate::app::models::{ConnectOutcome, MatchTier, ProcessConnection};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const DEVICES_OUTPUT: &str = "List of devices attached
127.0.0.1:21503        device product:SM-N975F model:SM_N975F device:SM-N975F transport_id:6
emulator-5554          device product:SM-S908N model:SM_S908N device:star2qltechn transport_id:1
emulator-5556          offline transport_id:2
127.0.0.1:7555         unauthorized
";

fn established(pid: u32, local_port: u16, cmdline: &[&str]) -> ProcessConnection {
    ProcessConnection {
        exe_name: cmdline.first().copied().unwrap_or_default().to_string(),
        cmdline: cmdline.iter().map(|arg| arg.to_string()).collect(),
        pid,
        local_ip: LOOPBACK,
        local_port,
        remote_ip: Some(LOOPBACK),
        remote_port: Some(61_000),
    }
}

fn spawn_script(script: &str) -> std::io::Result<Child> {
    let mut command = if cfg!(windows) {
        let mut command = Command::new("cmd.exe");
        command.args(["/C", script]);
        command
    } else {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    };
    command.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()
}

#[test]
fn ip_serial_resolves_through_exact_port() {
    let devices = parse_adb_devices(DEVICES_OUTPUT);
    let me = std::process::id();
    let rows = vec![established(me, 21503, &["MEmuHeadless.exe", "--comment", "MEmu"])];

    let table = ProcessTable::snapshot();
    let resolved: Vec<ResolvedDevice> = correlate(&devices, &rows)
        .into_iter()
        .map(|row| resolve_device(&table, "adb", row))
        .collect();

    assert_eq!(resolved.len(), 1);
    let device = &resolved[0];
    assert_eq!(device.serial, "127.0.0.1:21503");
    assert_eq!(device.tier, MatchTier::Exact);
    assert_eq!(device.join_port, 21503);
    assert_eq!(device.local_port, 21503);
    assert_eq!(device.cmdline, vec!["MEmuHeadless.exe", "--comment", "MEmu"]);
    assert_eq!(device.process.as_ref().map(|handle| handle.pid), Some(me));
    assert_eq!(device.adb.to_string(), "adb -s 127.0.0.1:21503");
}

#[test]
fn emulator_serial_resolves_through_offset_port() {
    let devices = parse_adb_devices(DEVICES_OUTPUT);
    let rows = vec![established(4716, 5555, &["Ld9BoxHeadless.exe", "--comment", "leidian0"])];

    let joined = correlate(&devices, &rows);
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].device.serial, "emulator-5554");
    assert_eq!(joined[0].tier, MatchTier::Offset);
    assert_eq!(joined[0].join_port, 5555);
}

#[test]
fn every_resolved_device_has_a_candidate_connection() {
    let devices = parse_adb_devices(DEVICES_OUTPUT);
    let rows = vec![
        established(20064, 21503, &["MEmuHeadless.exe"]),
        established(13288, 5557, &["Ld9BoxHeadless.exe", "leidian1"]),
    ];
    let joined = correlate(&devices, &rows);
    assert_eq!(joined.len(), 2);
    for row in &joined {
        assert!(rows
            .iter()
            .any(|conn| conn.local_port == row.join_port && conn.pid == row.connection.pid));
    }
    // The offline emulator resolves too, but sorts last.
    assert_eq!(joined[1].device.serial, "emulator-5556");
    assert!(!joined[1].device.online);
}

#[test]
fn connect_pass_keeps_only_confirmed_listeners() {
    let netstat = "  TCP    127.0.0.1:21503        0.0.0.0:0              LISTENING       20064\n  TCP    127.0.0.1:9999         0.0.0.0:0              LISTENING       31337\n";
    let sockets = parse_netstat_listening(netstat);
    assert_eq!(sockets.len(), 2);

    let options = ConnectOptions {
        connect_timeout: Duration::from_secs(10),
        alive_sleep: Duration::from_millis(50),
    };
    let attempts = connect::dispatch_connects_with(&sockets, &options, "trace-e2e", |socket| {
        if socket.local_port == 21503 {
            spawn_script("echo connected to 127.0.0.1:21503")
        } else {
            spawn_script("echo failed to connect to 127.0.0.1:9999")
        }
    });

    let connected: Vec<_> = attempts.iter().filter(|a| a.is_connected()).collect();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].socket.endpoint(), "127.0.0.1:21503");
    assert_eq!(attempts[1].outcome, ConnectOutcome::Rejected);

    let table = ProcessTable::snapshot();
    let endpoint = describe_endpoint(&table, connected[0]);
    assert_eq!(endpoint.endpoint, "127.0.0.1:21503");
    assert_eq!(endpoint.pid, Some(20064));
}

#[cfg(unix)]
#[test]
fn connect_pass_drops_requests_hung_past_the_deadline() {
    let sockets = parse_netstat_listening(
        "tcp        0      0 127.0.0.1:5555          0.0.0.0:*               LISTEN      4716/Ld9Box\n",
    );
    let options = ConnectOptions {
        connect_timeout: Duration::from_millis(250),
        alive_sleep: Duration::from_millis(50),
    };
    let attempts = connect::dispatch_connects_with(&sockets, &options, "trace-hang", |_| {
        spawn_script("exec sleep 30")
    });
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, ConnectOutcome::TimedOut);
    assert!(attempts.iter().all(|attempt| !attempt.is_connected()));
}

#[test]
fn missing_adb_fails_before_any_work() {
    let options = DiscoveryOptions {
        adb_path: "/this/path/should/not/exist/adb".to_string(),
        ..DiscoveryOptions::default()
    };
    let err = connect_to_all_emulators(&options, "trace-missing").unwrap_err();
    assert_eq!(err.code, "ERR_DEPENDENCY");
    assert_eq!(err.trace_id, "trace-missing");
}

#[test]
fn options_follow_config() {
    let mut config = DiscoveryConfig::default();
    config.adb.command_path = "/opt/adb".to_string();
    config.connect.restart_server = true;
    config.connect.connect_timeout_secs = 4.5;
    config.connect.alive_sleep_secs = 0.5;
    let options = DiscoveryOptions::from_config(&config);
    assert_eq!(options.adb_path, "/opt/adb");
    assert!(options.restart_server);
    assert_eq!(options.connect.connect_timeout, Duration::from_millis(4500));
    assert_eq!(options.connect.alive_sleep, Duration::from_millis(500));
    assert_eq!(options.command_timeout, Duration::from_secs(30));
}
