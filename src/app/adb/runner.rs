use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::error::AppError;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Keeps console windows from flashing up for every spawned helper on Windows.
pub fn hide_console_window(command: &mut Command) -> &mut Command {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(0x0800_0000);
    }
    command
}

pub fn spawn_piped(program: &str, args: &[String]) -> std::io::Result<Child> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    hide_console_window(&mut command).spawn()
}

/// Reads a pipe to EOF on a helper thread and hands the bytes back over a channel.
///
/// A chatty child blocks once the pipe buffer fills, so every piped stream must be
/// drained while the child is still running.
pub fn drain_pipe<R>(mut reader: R) -> Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        let _ = tx.send(buffer);
    });
    rx
}

/// Collects drained bytes, giving up after `grace` (a grandchild may still hold the pipe).
pub fn collect_pipe(rx: Option<Receiver<Vec<u8>>>, grace: Duration) -> String {
    let bytes = rx
        .and_then(|rx| rx.recv_timeout(grace).ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "running command");
    let mut child = spawn_piped(program, args)
        .map_err(|err| AppError::system(format!("Failed to spawn {program}: {err}"), trace_id))?;

    let stdout_rx = child.stdout.take().map(drain_pipe);
    let stderr_rx = child.stderr.take().map(drain_pipe);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AppError::system(
                        format!("{program} timed out after {}s", timeout.as_secs()),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                return Err(AppError::system(
                    format!("Failed to poll {program}: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let grace = Duration::from_secs(1);
    Ok(CommandOutput {
        stdout: collect_pipe(stdout_rx, grace),
        stderr: collect_pipe(stderr_rx, grace),
        exit_code,
    })
}

/// Runs a command whose result does not matter (`kill-server`, `reconnect offline`).
pub fn run_best_effort(program: &str, args: &[String], timeout: Duration, trace_id: &str) {
    match run_command_with_timeout(program, args, timeout, trace_id) {
        Ok(output) => debug!(
            trace_id = %trace_id,
            args = ?args,
            exit_code = ?output.exit_code,
            "best-effort command finished"
        ),
        Err(err) => warn!(
            trace_id = %trace_id,
            args = ?args,
            error = %err,
            "best-effort command failed; continuing"
        ),
    }
}

pub fn adb_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}
