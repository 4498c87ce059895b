//! Detaching a command wrapper from the controlling terminal.
//!
//! The parent re-executes the current binary with the same arguments and a
//! marker variable, with all stdio pointed at `/dev/null`, then exits. On Unix
//! the copy starts in a new session, so it has no controlling terminal and
//! survives the terminal hanging up. The re-executed process sees the marker
//! and carries on as the detached child.

use std::ffi::OsString;
use std::process::{Command, Stdio};

use thiserror::Error;

pub const DETACHED_MARKER: &str = "RC_NOTIFY_DETACHED";

#[derive(Debug, Error)]
pub enum DaemonizeError {
    #[error("failed to locate current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("failed to start background process: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detach {
    /// The detached copy was started; this process should exit.
    Parent,
    /// This process is the detached copy.
    Child,
}

pub fn is_detached() -> bool {
    std::env::var_os(DETACHED_MARKER).is_some()
}

pub fn detach() -> Result<Detach, DaemonizeError> {
    if is_detached() {
        return Ok(Detach::Child);
    }

    let exe = std::env::current_exe().map_err(DaemonizeError::CurrentExe)?;
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    let mut cmd = Command::new(exe);
    cmd.args(args)
        .env(DETACHED_MARKER, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    new_session(&mut cmd);

    let child = cmd.spawn().map_err(DaemonizeError::Spawn)?;
    tracing::info!(pid = child.id(), "continuing in background");
    Ok(Detach::Parent)
}

#[cfg(unix)]
fn new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no memory of the parent.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn new_session(_cmd: &mut Command) {}
