use std::path::PathBuf;
use std::time::Duration;

use multiadb_lib::app::config::{load_config, load_config_from_path, DiscoveryConfig};
use multiadb_lib::app::discovery::connect::ConnectOptions;
use multiadb_lib::app::discovery::{connect_to_all_emulators, DiscoveryOptions};
use multiadb_lib::app::error::AppError;
use multiadb_lib::app::logging::init_logging;
use multiadb_lib::app::models::{DiscoveryReport, ResolvedDevice};
use tracing::warn;
use uuid::Uuid;

const USAGE: &str = "Usage: multiadb [--adb PATH] [--restart-server] [--connect-timeout SECS] [--alive-sleep SECS] [--config PATH] [--shell SUBCOMMAND] [--json]\n";

#[derive(Debug, Clone, Default)]
struct Args {
    adb: Option<String>,
    restart_server: bool,
    connect_timeout: Option<f64>,
    alive_sleep: Option<f64>,
    config: Option<PathBuf>,
    shell: Option<String>,
    json: bool,
}

fn parse_secs(flag: &str, value: Option<String>) -> Result<f64, String> {
    let value = value.ok_or_else(|| format!("{flag} requires a value"))?;
    let secs = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("{flag} expects seconds, got {value}"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("{flag} must be a positive number of seconds"));
    }
    Ok(secs)
}

fn parse_args<I>(argv: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = Args::default();
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--adb" => {
                let value = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| "--adb requires a value".to_string())?;
                args.adb = Some(value);
            }
            "--restart-server" => {
                args.restart_server = true;
            }
            "--connect-timeout" => {
                args.connect_timeout = Some(parse_secs("--connect-timeout", it.next())?);
            }
            "--alive-sleep" => {
                args.alive_sleep = Some(parse_secs("--alive-sleep", it.next())?);
            }
            "--config" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                args.config = Some(PathBuf::from(value));
            }
            "--shell" => {
                let value = it
                    .next()
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| "--shell requires a value".to_string())?;
                args.shell = Some(value);
            }
            "--json" => {
                args.json = true;
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("Unknown arg: {other}\n{USAGE}")),
        }
    }
    Ok(args)
}

fn apply_overrides(config: &DiscoveryConfig, args: &Args) -> DiscoveryOptions {
    let mut options = DiscoveryOptions::from_config(config);
    if let Some(adb) = &args.adb {
        options.adb_path = adb.clone();
    }
    if args.restart_server {
        options.restart_server = true;
    }
    let timeout = args
        .connect_timeout
        .unwrap_or(config.connect.connect_timeout_secs);
    let alive = args.alive_sleep.unwrap_or(config.connect.alive_sleep_secs);
    options.connect = ConnectOptions::from_secs(timeout, alive.min(timeout));
    options
}

fn print_table(report: &DiscoveryReport) {
    println!(
        "{:<22} {:<7} {:<6} {:<8} {:<22} {:<8} {}",
        "SERIAL", "ONLINE", "TIER", "PID", "PROCESS", "PORT", "COMMAND"
    );
    for device in &report.resolved {
        println!(
            "{:<22} {:<7} {:<6} {:<8} {:<22} {:<8} {}",
            device.serial,
            device.online,
            format!("{:?}", device.tier).to_lowercase(),
            device.pid,
            device.exe_name,
            device.local_port,
            device.adb
        );
    }
    println!(
        "\nlisteners: {}  connected: {}  devices: {}  resolved: {}",
        report.listening_sockets.len(),
        report.connected_endpoints.len(),
        report.devices.len(),
        report.resolved.len()
    );
}

fn render_json(report: &DiscoveryReport, trace_id: &str) -> Result<String, AppError> {
    serde_json::to_string_pretty(report)
        .map_err(|err| AppError::system(format!("Failed to serialize report: {err}"), trace_id))
}

/// Sends the subcommand to each device in turn, waiting for each to exit.
fn fan_out(resolved: &[ResolvedDevice], subcommand: &str, trace_id: &str) -> usize {
    let mut failures = 0usize;
    for device in resolved {
        let status = device
            .adb
            .spawn(subcommand)
            .and_then(|mut child| child.wait());
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                failures += 1;
                warn!(trace_id = %trace_id, serial = %device.serial, code = ?status.code(), "subcommand failed");
            }
            Err(err) => {
                failures += 1;
                warn!(trace_id = %trace_id, serial = %device.serial, error = %err, "subcommand could not start");
            }
        }
        std::thread::sleep(Duration::from_millis(200));
    }
    failures
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let loaded = match &args.config {
        Some(path) => load_config_from_path(path, &trace_id),
        None => load_config(&trace_id),
    };
    let config = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Failed to load config: {err}");
            std::process::exit(1);
        }
    };
    init_logging(&config.logging.log_level);

    let options = apply_overrides(&config, &args);
    let report = match connect_to_all_emulators(&options, &trace_id) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if args.json {
        match render_json(&report, &trace_id) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        }
    } else {
        print_table(&report);
    }

    if let Some(subcommand) = &args.shell {
        let failures = fan_out(&report.resolved, subcommand, &trace_id);
        if failures > 0 {
            eprintln!("{failures} device(s) failed: {subcommand}");
            std::process::exit(1);
        }
    }
}
