use chrono::DateTime;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::app::models::ProcessHandle;

/// Name and argv of a live process, the parts a connection row needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub name: String,
    pub cmdline: Vec<String>,
}

/// One `sysinfo` snapshot of every process, shared by all lookups of a run.
pub struct ProcessTable {
    system: System,
}

impl ProcessTable {
    pub fn snapshot() -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        Self { system }
    }

    fn process(&self, pid: u32) -> Option<&Process> {
        self.system.process(Pid::from_u32(pid))
    }

    pub fn identity(&self, pid: u32) -> Option<ProcessIdentity> {
        let process = self.process(pid)?;
        Some(ProcessIdentity {
            name: process.name().to_string_lossy().to_string(),
            cmdline: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect(),
        })
    }

    pub fn handle(&self, pid: u32) -> Option<ProcessHandle> {
        self.process(pid).map(to_handle)
    }

    pub fn parent(&self, pid: u32) -> Option<ProcessHandle> {
        let parent_pid = self.process(pid)?.parent()?;
        self.system.process(parent_pid).map(to_handle)
    }

    /// Direct children only, ordered by pid.
    pub fn children(&self, pid: u32) -> Vec<ProcessHandle> {
        let target = Pid::from_u32(pid);
        let mut children: Vec<ProcessHandle> = self
            .system
            .processes()
            .values()
            .filter(|process| process.thread_kind().is_none())
            .filter(|process| process.parent() == Some(target))
            .map(to_handle)
            .collect();
        children.sort_by_key(|child| child.pid);
        children
    }
}

fn to_handle(process: &Process) -> ProcessHandle {
    ProcessHandle {
        pid: process.pid().as_u32(),
        name: process.name().to_string_lossy().to_string(),
        exe: process.exe().map(|path| path.to_string_lossy().to_string()),
        status: process.status().to_string(),
        started_at: started_at(process.start_time()),
    }
}

fn started_at(epoch_secs: u64) -> Option<String> {
    if epoch_secs == 0 {
        return None;
    }
    let secs = i64::try_from(epoch_secs).ok()?;
    DateTime::from_timestamp(secs, 0).map(|time| time.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_start_time_as_rfc3339() {
        assert_eq!(
            started_at(1_700_000_000).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
        assert_eq!(started_at(0), None);
    }

    #[test]
    fn snapshot_sees_the_current_process() {
        let table = ProcessTable::snapshot();
        let pid = std::process::id();
        let handle = table.handle(pid).expect("current process listed");
        assert_eq!(handle.pid, pid);
        let identity = table.identity(pid).expect("identity");
        assert!(!identity.name.is_empty());
        assert!(table.parent(pid).is_some());
    }

    #[test]
    fn children_include_a_spawned_child() {
        let mut child = if cfg!(windows) {
            std::process::Command::new("cmd.exe")
                .args(["/C", "ping", "127.0.0.1", "-n", "5"])
                .stdout(std::process::Stdio::null())
                .spawn()
                .expect("spawn ping")
        } else {
            std::process::Command::new("sleep")
                .arg("5")
                .spawn()
                .expect("spawn sleep")
        };
        let table = ProcessTable::snapshot();
        let children = table.children(std::process::id());
        let _ = child.kill();
        let _ = child.wait();
        assert!(children.iter().any(|handle| handle.pid == child.id()));
    }

    #[test]
    fn unknown_pid_has_no_handle() {
        let table = ProcessTable::snapshot();
        assert!(table.handle(u32::MAX - 7).is_none());
        assert!(table.children(u32::MAX - 7).is_empty());
    }
}
