use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
/// Produces short randomised pauses so page interactions are not back-to-back.
pub struct Pacing {
    min_ms: u64,
    max_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacing {
    pub fn new() -> Self {
        Self::between(300, 1200)
    }

    /// Pauses drawn from `min_ms..=max_ms`; bounds are swapped if reversed.
    pub fn between(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// No pauses at all.
    pub fn disabled() -> Self {
        Self::between(0, 0)
    }

    pub fn next_delay(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let ms = OsRng.gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }

    /// Sleep for a random duration within the configured bounds.
    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
