//! Sleeping and randomness seams
//!
//! Backoff, cooldown and pacing all go through [`Sleeper`], and every random
//! choice (user agent, jitter, pacing delay) through [`SharedRng`], so tests
//! can run the pipeline instantly and with a fixed seed.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the Tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Seedable RNG that can be shared behind `&self`
#[derive(Debug)]
pub struct SharedRng {
    inner: Mutex<fastrand::Rng>,
}

impl SharedRng {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Self { inner: Mutex::new(rng) }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut fastrand::Rng) -> T) -> T {
        // A panic while holding the lock cannot leave the RNG in a bad state
        let mut rng = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Uniform value in `[min, max)`; returns `min` when the range is empty
    pub fn uniform(&self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.with_rng(|rng| rng.f64().mul_add(max - min, min))
    }

    /// Uniformly chosen element, `None` for an empty slice
    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.with_rng(|rng| rng.usize(..items.len()));
        items.get(index)
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Seconds from configuration to a `Duration`; negative or NaN becomes zero
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_stays_in_range() {
        let rng = SharedRng::new(Some(42));
        for _ in 0..1_000 {
            let v = rng.uniform(8.0, 15.0);
            assert!((8.0..15.0).contains(&v), "{v}");
        }
        assert_eq!(rng.uniform(2.0, 2.0), 2.0);
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        let a = SharedRng::new(Some(7));
        let b = SharedRng::new(Some(7));
        let pool = ["a", "b", "c", "d"];
        let picks_a: Vec<_> = (0..20).map(|_| a.choose(&pool).copied()).collect();
        let picks_b: Vec<_> = (0..20).map(|_| b.choose(&pool).copied()).collect();
        assert_eq!(picks_a, picks_b);
        assert_eq!(a.choose::<&str>(&[]), None);
    }

    #[test]
    fn seconds_clamps_invalid_values() {
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
        assert_eq!(seconds(-1.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
    }
}
