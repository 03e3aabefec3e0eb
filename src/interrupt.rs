use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::error::{Error, Result, Stage};

/// Stops an in-progress plot construction.
///
/// Clones share the cancellation flag, so one can be handed to another thread
/// while the builder polls the other.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up once `timeout` elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self, path: &Path, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                path: path.to_owned(),
                stage,
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::TimedOut {
                path: path.to_owned(),
                stage,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let interrupt = Interrupt::new();
        let handle = interrupt.clone();
        assert!(interrupt.check(Path::new("p"), Stage::Bucketing).is_ok());

        handle.cancel();
        assert!(matches!(
            interrupt.check(Path::new("p"), Stage::Bucketing),
            Err(Error::Cancelled { .. })
        ));
    }

    #[test]
    fn expired_deadline() {
        let interrupt = Interrupt::new().with_timeout(Duration::ZERO);
        assert!(matches!(
            interrupt.check(Path::new("p"), Stage::Sorting),
            Err(Error::TimedOut {
                stage: Stage::Sorting,
                ..
            })
        ));
    }
}
