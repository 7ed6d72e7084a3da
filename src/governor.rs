//! Deadline and interrupt bookkeeping for one dialog session.
//!
//! Signal handlers only flip an [`AtomicBool`]; the event loop looks at it
//! once per poll tick through [`Governor::check`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, warn};

use crate::error::DialogError;

/// Upper bound on a single wait for input.
pub const POLL_INTERVAL: Duration = Duration::from_millis(70);

#[derive(Debug)]
pub struct Governor {
    deadline: Option<Instant>,
    interrupted: Arc<AtomicBool>,
    sig_ids: Vec<SigId>,
}

impl Governor {
    /// Register SIGINT/SIGTERM observers and start the optional deadline.
    /// A failed registration is logged and the dialog runs without it.
    pub fn arm(timeout: Option<Duration>) -> Self {
        let mut governor = Self::unarmed(timeout);
        for signal in [SIGINT, SIGTERM] {
            match signal_hook::flag::register(signal, Arc::clone(&governor.interrupted)) {
                Ok(id) => governor.sig_ids.push(id),
                Err(err) => warn!(signal, error = %err, "cannot observe signal"),
            }
        }
        governor
    }

    /// Deadline only, no signal observers.
    pub fn unarmed(timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            debug!(?timeout, "dialog deadline armed");
        }
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            interrupted: Arc::new(AtomicBool::new(false)),
            sig_ids: Vec::new(),
        }
    }

    /// Record an interrupt that arrived as a keystroke rather than a signal.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// How long the next input poll may block.
    pub fn next_wait(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_INTERVAL),
            None => POLL_INTERVAL,
        }
    }

    /// `Timeout` once the deadline passed, `FullyCanceled` after an
    /// interrupt. The deadline wins when both happened.
    pub fn check(&self) -> Result<(), DialogError> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DialogError::Timeout);
        }
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(DialogError::FullyCanceled);
        }
        Ok(())
    }
}

impl Drop for Governor {
    fn drop(&mut self) {
        for id in self.sig_ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_governor_passes() {
        let governor = Governor::unarmed(None);
        assert!(governor.check().is_ok());
        assert_eq!(governor.next_wait(), POLL_INTERVAL);
    }

    #[test]
    fn elapsed_deadline_times_out() {
        let governor = Governor::unarmed(Some(Duration::ZERO));
        assert!(matches!(governor.check(), Err(DialogError::Timeout)));
        assert_eq!(governor.next_wait(), Duration::ZERO);
    }

    #[test]
    fn interrupt_cancels() {
        let governor = Governor::unarmed(Some(Duration::from_secs(60)));
        governor.interrupt();
        assert!(matches!(governor.check(), Err(DialogError::FullyCanceled)));
    }

    #[test]
    fn external_flag_is_observed() {
        let governor = Governor::unarmed(None);
        governor.interrupt_flag().store(true, Ordering::SeqCst);
        assert!(matches!(governor.check(), Err(DialogError::FullyCanceled)));
    }
}
