use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        "adb".to_string()
    } else {
        normalized
    }
}

fn is_bare_program_name(program: &str) -> bool {
    !program.contains('/') && !program.contains('\\')
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if is_bare_program_name(program) {
        return which::which(program)
            .map(|_| ())
            .map_err(|_| format!("{program} was not found on PATH"));
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}

/// Resolves the configured ADB command and fails fast when it cannot be run.
pub fn ensure_adb_program(config_command_path: &str, trace_id: &str) -> Result<String, AppError> {
    let program = resolve_adb_program(config_command_path);
    validate_adb_program(&program).map_err(|message| AppError::dependency(message, trace_id))?;
    Ok(program)
}

/// Looks up a host tool such as `netstat` on `PATH`.
pub fn locate_host_tool(name: &str, trace_id: &str) -> Result<PathBuf, AppError> {
    which::which(name)
        .map_err(|err| AppError::dependency(format!("{name} not found on PATH: {err}"), trace_id))
}
