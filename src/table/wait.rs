//! Bounded spin-then-yield waiting on another process's progress

use std::thread;
use std::time::{Duration, Instant};

const SPIN_LIMIT: u32 = 64;

/// Spin briefly, then yield, until a deadline passes
#[derive(Debug)]
pub(crate) struct SpinWait {
    deadline: Instant,
    spins: u32,
}

impl SpinWait {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            spins: 0,
        }
    }

    /// Back off once. Returns `false` once the deadline has passed.
    pub(crate) fn pause(&mut self) -> bool {
        if self.spins < SPIN_LIMIT {
            self.spins += 1;
            std::hint::spin_loop();
            return true;
        }
        if Instant::now() >= self.deadline {
            return false;
        }
        thread::yield_now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires() {
        let mut wait = SpinWait::new(Duration::from_millis(5));
        let start = Instant::now();
        while wait.pause() {}
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
