//! Request pacing shared by every stage that talks to the osu! API.

use std::time::Duration;

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

/// Gate awaited before each rate-limited unit of work (a page, a batch, a round of requests).
/// [`RateLimiter::release`] is called once the unit has completed.
#[async_trait]
pub trait RateLimiter: Send + Sync {
  async fn acquire(&self);

  async fn release(&self) {}
}

/// Lets permits through no closer together than `interval`.  The first permit is immediate.
pub struct FixedInterval {
  interval: Duration,
  last_permit: Mutex<Option<Instant>>,
}

impl FixedInterval {
  pub fn new(interval: Duration) -> Self {
    FixedInterval {
      interval,
      last_permit: Mutex::new(None),
    }
  }

  pub fn from_millis(ms: u64) -> Self { Self::new(Duration::from_millis(ms)) }
}

#[async_trait]
impl RateLimiter for FixedInterval {
  async fn acquire(&self) {
    let mut last_permit = self.last_permit.lock().await;
    if let Some(last) = *last_permit {
      tokio::time::sleep_until(last + self.interval).await;
    }
    *last_permit = Some(Instant::now());
  }
}

/// Waits `delay` after the previous unit *completed* before letting the next one start, so slow
/// units never eat into the gap.  The first permit is immediate.
pub struct FixedDelay {
  delay: Duration,
  last_release: Mutex<Option<Instant>>,
}

impl FixedDelay {
  pub fn new(delay: Duration) -> Self {
    FixedDelay {
      delay,
      last_release: Mutex::new(None),
    }
  }

  pub fn from_millis(ms: u64) -> Self { Self::new(Duration::from_millis(ms)) }
}

#[async_trait]
impl RateLimiter for FixedDelay {
  async fn acquire(&self) {
    let last_release = *self.last_release.lock().await;
    if let Some(last) = last_release {
      tokio::time::sleep_until(last + self.delay).await;
    }
  }

  async fn release(&self) { *self.last_release.lock().await = Some(Instant::now()); }
}

/// No pacing at all.
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
  async fn acquire(&self) {}
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn fixed_interval_spaces_permits() {
    let limiter = FixedInterval::from_millis(800);
    let start = Instant::now();

    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::ZERO);

    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_millis(800));

    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_millis(1600));
  }

  #[tokio::test(start_paused = true)]
  async fn fixed_interval_counts_time_spent_working() {
    let limiter = FixedInterval::from_millis(800);
    let start = Instant::now();

    limiter.acquire().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_millis(800));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let before = Instant::now();
    limiter.acquire().await;
    assert_eq!(before.elapsed(), Duration::ZERO);
  }

  #[tokio::test(start_paused = true)]
  async fn fixed_delay_gap_starts_when_work_completes() {
    let limiter = FixedDelay::from_millis(800);
    let start = Instant::now();

    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::ZERO);
    // a unit of work slower than the delay
    tokio::time::sleep(Duration::from_millis(1000)).await;
    limiter.release().await;

    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_millis(1800));
    tokio::time::sleep(Duration::from_millis(200)).await;
    limiter.release().await;

    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_millis(2800));
  }

  #[tokio::test(start_paused = true)]
  async fn unlimited_never_waits() {
    let start = Instant::now();
    for _ in 0..100 {
      Unlimited.acquire().await;
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
  }
}
