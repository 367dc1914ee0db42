use std::process::Child;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::app::adb::parse::is_connect_success;
use crate::app::adb::runner::{adb_args, collect_pipe, drain_pipe, spawn_piped};
use crate::app::config::{DEFAULT_ALIVE_SLEEP_SECS, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::app::models::{ConnectAttempt, ConnectOutcome, ListeningSocket};

const EXITED_PIPE_GRACE: Duration = Duration::from_secs(1);
const KILLED_PIPE_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectOptions {
    /// Bound on the whole poll loop, not on each request.
    pub connect_timeout: Duration,
    pub alive_sleep: Duration,
}

impl ConnectOptions {
    pub fn from_secs(connect_timeout_secs: f64, alive_sleep_secs: f64) -> Self {
        Self {
            connect_timeout: secs_or(connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS),
            alive_sleep: secs_or(alive_sleep_secs, DEFAULT_ALIVE_SLEEP_SECS),
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_ALIVE_SLEEP_SECS)
    }
}

fn secs_or(value: f64, fallback: f64) -> Duration {
    if value.is_finite() && value >= 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::from_secs_f64(fallback)
    }
}

struct PendingRequest {
    socket: ListeningSocket,
    child: Option<Child>,
    request_pid: Option<u32>,
    stdout_rx: Option<Receiver<Vec<u8>>>,
    stderr_rx: Option<Receiver<Vec<u8>>>,
    alive: bool,
    timed_out: bool,
    spawn_error: Option<String>,
}

impl PendingRequest {
    fn started(socket: ListeningSocket, mut child: Child) -> Self {
        Self {
            socket,
            request_pid: Some(child.id()),
            stdout_rx: child.stdout.take().map(drain_pipe),
            stderr_rx: child.stderr.take().map(drain_pipe),
            child: Some(child),
            alive: true,
            timed_out: false,
            spawn_error: None,
        }
    }

    fn refresh_alive(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            self.alive = false;
            return false;
        };
        self.alive = matches!(child.try_wait(), Ok(None));
        self.alive
    }

    fn force_kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.alive = false;
        self.timed_out = true;
    }

    /// Kills the request if it is still running; returns whether it was killed.
    fn settle_at_deadline(&mut self) -> bool {
        if !self.refresh_alive() {
            return false;
        }
        self.force_kill();
        true
    }

    fn into_attempt(self) -> ConnectAttempt {
        let grace = if self.timed_out {
            KILLED_PIPE_GRACE
        } else {
            EXITED_PIPE_GRACE
        };
        let stdout = collect_pipe(self.stdout_rx, grace);
        let stderr = match self.spawn_error {
            Some(err) => err,
            None => collect_pipe(self.stderr_rx, grace),
        };
        let outcome = if self.child.is_none() {
            ConnectOutcome::SpawnFailed
        } else if self.timed_out {
            ConnectOutcome::TimedOut
        } else if is_connect_success(&stdout) {
            ConnectOutcome::Connected
        } else {
            ConnectOutcome::Rejected
        };
        ConnectAttempt {
            socket: self.socket,
            request_pid: self.request_pid,
            stdout,
            stderr,
            outcome,
        }
    }
}

/// Fires `adb connect <address:port>` at every listener in parallel.
///
/// Mutates the shared ADB server's transport list. Callers must not run two
/// dispatches against the same server at once.
pub fn dispatch_connects(
    adb_program: &str,
    sockets: &[ListeningSocket],
    options: &ConnectOptions,
    trace_id: &str,
) -> Vec<ConnectAttempt> {
    dispatch_connects_with(sockets, options, trace_id, |socket| {
        spawn_piped(adb_program, &adb_args(&["connect", &socket.endpoint()]))
    })
}

pub fn dispatch_connects_with<F>(
    sockets: &[ListeningSocket],
    options: &ConnectOptions,
    trace_id: &str,
    mut spawn: F,
) -> Vec<ConnectAttempt>
where
    F: FnMut(&ListeningSocket) -> std::io::Result<Child>,
{
    let dispatched_at = Instant::now();
    let mut pending: Vec<PendingRequest> = sockets
        .iter()
        .map(|socket| match spawn(socket) {
            Ok(child) => PendingRequest::started(socket.clone(), child),
            Err(err) => {
                warn!(
                    trace_id = %trace_id,
                    endpoint = %socket.endpoint(),
                    error = %err,
                    "failed to spawn adb connect"
                );
                PendingRequest {
                    socket: socket.clone(),
                    child: None,
                    request_pid: None,
                    stdout_rx: None,
                    stderr_rx: None,
                    alive: false,
                    timed_out: false,
                    spawn_error: Some(err.to_string()),
                }
            }
        })
        .collect();

    let deadline = dispatched_at + options.connect_timeout;
    loop {
        let alive = pending
            .iter_mut()
            .map(PendingRequest::refresh_alive)
            .filter(|alive| *alive)
            .count();
        if alive == 0 {
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        debug!(trace_id = %trace_id, alive, "waiting for adb connect requests");
        std::thread::sleep(options.alive_sleep.min(deadline - now));
    }

    for request in pending.iter_mut().filter(|request| request.alive) {
        if request.settle_at_deadline() {
            warn!(
                trace_id = %trace_id,
                endpoint = %request.socket.endpoint(),
                "adb connect still running at deadline; killed"
            );
        }
    }

    let attempts: Vec<ConnectAttempt> = pending
        .into_iter()
        .map(PendingRequest::into_attempt)
        .collect();
    for attempt in &attempts {
        debug!(
            trace_id = %trace_id,
            endpoint = %attempt.socket.endpoint(),
            outcome = ?attempt.outcome,
            stdout = %attempt.stdout,
            "adb connect finished"
        );
    }
    info!(
        trace_id = %trace_id,
        attempted = attempts.len(),
        connected = attempts.iter().filter(|attempt| attempt.is_connected()).count(),
        elapsed_ms = dispatched_at.elapsed().as_millis() as u64,
        "adb connect pass complete"
    );
    attempts
}
