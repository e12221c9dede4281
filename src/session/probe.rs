//! Process liveness probing and forced termination.

use std::io;
use std::time::Duration;

/// Interval between liveness polls while waiting for a process to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Check whether a process with the given pid exists.
///
/// Sends the null signal, which performs the permission and existence
/// checks without delivering anything. A zombie child of the current
/// process is reaped first so that it does not read as alive.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    reap_if_child(raw);

    // SAFETY: kill(2) with signal 0 has no side effects on the target.
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else.
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    // No portable probe; assume the recorded process is still running.
    true
}

#[cfg(unix)]
fn reap_if_child(pid: libc::pid_t) {
    let mut status = 0;
    // SAFETY: WNOHANG never blocks; ECHILD for non-children is ignored.
    unsafe {
        libc::waitpid(pid, &mut status, libc::WNOHANG);
    }
}

/// Forcibly terminate a process with SIGTERM.
///
/// A process that has already exited is not an error.
#[cfg(unix)]
pub fn terminate(pid: u32) -> io::Result<()> {
    let raw = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;

    // SAFETY: plain signal delivery to a validated positive pid.
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
pub fn terminate(pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot signal pid {pid} on this platform"),
    ))
}

/// Roughly thirty years; stands in for "never" when a deadline overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `timeout` from now, saturating instead of overflowing.
pub fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Poll until the process exits or `grace` elapses.
///
/// Returns `true` if the process is gone.
pub async fn wait_for_exit(pid: u32, grace: Duration) -> bool {
    let deadline = deadline_after(grace);
    loop {
        if !process_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pids() {
        assert!(!process_alive(0));
        assert!(!process_alive(u32::MAX));
    }

    #[test]
    fn test_exited_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!process_alive(pid));
    }

    #[tokio::test]
    async fn test_terminate_and_wait() {
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(process_alive(pid));

        terminate(pid).unwrap();
        assert!(wait_for_exit(pid, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_huge_grace_does_not_overflow() {
        let far = deadline_after(Duration::from_secs(u64::MAX));
        assert!(far > tokio::time::Instant::now() + Duration::from_secs(86_400));

        // A dead pid returns at once however long the grace.
        assert!(wait_for_exit(u32::MAX, Duration::from_secs(u64::MAX)).await);
    }

    #[test]
    fn test_terminate_missing_process_is_ok() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(terminate(pid).is_ok());
    }
}
