use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::{Child, Command, Stdio};

use crate::app::adb::runner::hide_console_window;

/// ADB invocation pinned to one device via `-s <serial>`.
///
/// Holds only the executable path and the serial; every call spawns a fresh process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AdbCommand {
    pub adb_path: String,
    pub serial: String,
}

impl AdbCommand {
    pub fn new(adb_path: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: serial.into(),
        }
    }

    /// Full argument vector for a raw subcommand such as `shell input keyevent KEYCODE_HOME`.
    ///
    /// The subcommand is split on whitespace; there is no shell quoting.
    pub fn args_for(&self, subcommand: &str) -> Vec<String> {
        let mut args = vec!["-s".to_string(), self.serial.clone()];
        args.extend(subcommand.split_whitespace().map(str::to_string));
        args
    }

    /// Unspawned command, for callers that want to wire stdio themselves.
    pub fn command(&self, subcommand: &str) -> Command {
        let mut command = Command::new(&self.adb_path);
        command.args(self.args_for(subcommand));
        hide_console_window(&mut command);
        command
    }

    /// Fire-and-forget: output is discarded, the caller decides whether to wait.
    pub fn spawn(&self, subcommand: &str) -> std::io::Result<Child> {
        self.command(subcommand)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

impl fmt::Display for AdbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -s {}", self.adb_path, self.serial)
    }
}
