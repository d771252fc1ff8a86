//! Job control: the per-job cancel token and the control socket location.
//!
//! The job manager creates one `CancelToken` per job and hands clones to the
//! source and sink. They check it at every poll point (between chunks, between
//! status polls, inside sleeps) and stop with `MirrorError::Cancelled`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::MirrorError;

/// Longest uninterrupted sleep inside [`CancelToken::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag. Once set it never resets.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Poll point: `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), MirrorError> {
        if self.is_cancelled() {
            Err(MirrorError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Blocking sleep that wakes early (with `Err(Cancelled)`) when the token is set.
    /// Call from blocking pipeline code only.
    pub fn sleep(&self, duration: Duration) -> Result<(), MirrorError> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Default path for the control socket: `~/.local/state/mirror/control.sock`.
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("mirror")?.get_state_home();
    Ok(dir.join("mirror").join("control.sock"))
}
