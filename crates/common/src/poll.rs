use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The watched process is not running
    Absent,
    /// The process is running but the binding is not visible yet
    Pending,
    /// The binding is live
    Ready,
}

/// Bounds for [`wait_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Give up once this much time has passed
    pub timeout: Duration,
    /// Consecutive [`Probe::Absent`] results tolerated before giving up
    pub retry: u32,
    /// Pause between probes
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, retry: u32) -> Self {
        Self {
            timeout,
            retry,
            ..Self::default()
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: 0,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("process not found after {misses} attempts")]
    NotFound { misses: u32 },
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Probe until [`Probe::Ready`], a run of misses longer than
/// `config.retry`, or the timeout.
///
/// The first probe runs immediately; a ready result never sleeps.
pub async fn wait_until<F>(config: PollConfig, mut probe: F) -> Result<(), PollError>
where
    F: FnMut() -> Probe,
{
    let started = Instant::now();
    let mut misses = 0u32;
    loop {
        match probe() {
            Probe::Ready => return Ok(()),
            Probe::Pending => misses = 0,
            Probe::Absent => {
                misses += 1;
                if misses > config.retry {
                    return Err(PollError::NotFound { misses });
                }
            }
        }

        tokio::time::sleep(config.interval).await;
        if started.elapsed() >= config.timeout {
            return Err(PollError::TimedOut(config.timeout));
        }
    }
}
