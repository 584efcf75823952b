//! SIGINT wiring and foreground process-group handoff.
//!
//! One `SignalHandler` lives for the REPL session. Each submitted line gets
//! its own cancellation token; Ctrl+C cancels the active one unless a
//! foreground child currently owns the terminal, in which case the kernel
//! delivers the signal to the child's process group and the shell stays out
//! of the way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct SignalHandler {
    ignore_sigint: Arc<AtomicBool>,
    current: Mutex<Option<CancellationToken>>,
}

impl SignalHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ignore_sigint: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        })
    }

    /// Spawn the SIGINT listener task. Must run inside a tokio runtime.
    pub fn install(self: &Arc<Self>) {
        #[cfg(unix)]
        {
            // restoring the foreground group from a background group raises
            // SIGTTOU; the shell must not stop on it
            unsafe {
                let _ = nix::sys::signal::signal(
                    nix::sys::signal::Signal::SIGTTOU,
                    nix::sys::signal::SigHandler::SigIgn,
                );
            }
        }
        let handler = self.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    break;
                }
                if handler.ignore_sigint.load(Ordering::SeqCst) {
                    debug!("SIGINT left to foreground child");
                    continue;
                }
                if let Some(token) = handler.current.lock().unwrap().as_ref() {
                    token.cancel();
                }
            }
        });
    }

    /// Derive the per-submission token observed at every suspension point.
    pub fn begin_submission(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap() = Some(token.clone());
        token
    }

    pub fn end_submission(&self) {
        *self.current.lock().unwrap() = None;
    }

    /// Set while a foreground child owns the terminal.
    pub fn ignore_flag(&self) -> Arc<AtomicBool> {
        self.ignore_sigint.clone()
    }
}

/// Scoped foreground handoff: gives `child_pid`'s process group the
/// controlling terminal and restores the original group when dropped, on
/// every exit path including unwinding.
#[cfg(unix)]
pub struct ForegroundGuard {
    tty: std::fs::File,
    original: nix::unistd::Pid,
    ignore: Option<Arc<AtomicBool>>,
}

#[cfg(unix)]
impl ForegroundGuard {
    /// Returns `None` when there is no controlling terminal (non-interactive
    /// session, tests, CI).
    pub fn hand_over(child_pid: u32, ignore: Option<Arc<AtomicBool>>) -> Option<Self> {
        use std::os::fd::AsFd;

        let tty = std::fs::File::open("/dev/tty").ok()?;
        let original = nix::unistd::tcgetpgrp(tty.as_fd()).ok()?;
        nix::unistd::tcsetpgrp(tty.as_fd(), nix::unistd::Pid::from_raw(child_pid as i32)).ok()?;
        if let Some(flag) = &ignore {
            flag.store(true, Ordering::SeqCst);
        }
        Some(Self {
            tty,
            original,
            ignore,
        })
    }
}

#[cfg(unix)]
impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        use std::os::fd::AsFd;

        let _ = nix::unistd::tcsetpgrp(self.tty.as_fd(), self.original);
        if let Some(flag) = &self.ignore {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submission_token_lifecycle() {
        let handler = SignalHandler::new();
        let token = handler.begin_submission();
        assert!(!token.is_cancelled());

        // what install()'s listener does on Ctrl+C
        if let Some(active) = handler.current.lock().unwrap().as_ref() {
            active.cancel();
        }
        assert!(token.is_cancelled());

        handler.end_submission();
        assert!(handler.current.lock().unwrap().is_none());
    }

    #[test]
    fn test_ignore_flag_shared() {
        let handler = SignalHandler::new();
        let flag = handler.ignore_flag();
        flag.store(true, Ordering::SeqCst);
        assert!(handler.ignore_sigint.load(Ordering::SeqCst));
    }
}
