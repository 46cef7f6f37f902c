use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// The pool-wide "resume not before" instant.
///
/// One atomic cell shared by every worker models the single upstream quota:
/// when any worker is throttled it pushes the deadline forward and the whole
/// pool waits. Writes are last-writer-wins; a racing worker can shorten a
/// just-extended deadline, which is harmless because the next throttled
/// response extends it again.
#[derive(Debug)]
pub struct SharedBackoff {
    epoch: Instant,
    resume_at_ms: AtomicU64,
}

impl SharedBackoff {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            resume_at_ms: AtomicU64::new(0),
        }
    }

    /// Moves the deadline to `now + wait`.
    pub fn extend(&self, wait: Duration) {
        let resume = self.epoch.elapsed() + wait;
        self.resume_at_ms
            .store(resume.as_millis() as u64, Ordering::Release);
    }

    /// Time left until the deadline, or `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let resume = Duration::from_millis(self.resume_at_ms.load(Ordering::Acquire));
        let now = self.epoch.elapsed();
        resume.checked_sub(now).filter(|left| !left.is_zero())
    }
}

impl Default for SharedBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_backoff_has_no_deadline() {
        let backoff = SharedBackoff::new();
        assert!(backoff.remaining().is_none());
    }

    #[test]
    fn test_extend_sets_deadline() {
        let backoff = SharedBackoff::new();
        backoff.extend(Duration::from_secs(30));

        let left = backoff.remaining().expect("deadline should be set");
        assert!(left <= Duration::from_secs(30));
        assert!(left > Duration::from_secs(29));
    }

    #[test]
    fn test_last_writer_wins() {
        let backoff = SharedBackoff::new();
        backoff.extend(Duration::from_secs(60));
        backoff.extend(Duration::from_secs(1));

        let left = backoff.remaining().expect("deadline should be set");
        assert!(left <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let backoff = SharedBackoff::new();
        backoff.extend(Duration::from_millis(20));
        assert!(backoff.remaining().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(backoff.remaining().is_none());
    }
}
