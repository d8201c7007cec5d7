//! Exponential backoff with jitter for the gateway's engine-stream
//! reconnect loop (spec.md §4.2: "delays `min(maxDelay, initialDelay *
//! 2^attempt) ± jitter*delay`, at most `maxAttempts` attempts").

use std::time::Duration;

use ambonmud_domain::random::RandomSource;
use ambonmud_shared::config::ReconnectConfig;

/// `attempt` is 1-based (the first retry is attempt 1).
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32, rng: &mut dyn RandomSource) -> Duration {
    let base = (config.initial_delay_ms as f64) * 2f64.powi(attempt as i32 - 1);
    let capped = base.min(config.max_delay_ms as f64);
    let jitter_span = capped * config.jitter_factor;
    let jitter = jitter_span * (2.0 * rng.gen_f64() - 1.0);
    let delayed = (capped + jitter).max(0.0);
    Duration::from_millis(delayed.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::random::FixedSequenceRandom;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: 5,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_factor: 0.2,
            stream_verify_ms: 1_000,
        }
    }

    #[test]
    fn delay_doubles_each_attempt_without_jitter() {
        let mut rng = FixedSequenceRandom::constant(0, 0.5);
        assert_eq!(backoff_delay(&config(), 1, &mut rng), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config(), 2, &mut rng), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config(), 3, &mut rng), Duration::from_millis(800));
    }

    #[test]
    fn delay_caps_at_max_delay() {
        let mut rng = FixedSequenceRandom::constant(0, 0.5);
        let delay = backoff_delay(&config(), 10, &mut rng);
        assert_eq!(delay, Duration::from_millis(5_000));
    }

    #[test]
    fn jitter_stays_within_factor_bounds() {
        let cfg = config();
        let mut low = FixedSequenceRandom::constant(0, 0.0);
        let mut high = FixedSequenceRandom::constant(0, 1.0);
        let min_delay = backoff_delay(&cfg, 2, &mut low);
        let max_delay = backoff_delay(&cfg, 2, &mut high);
        assert_eq!(min_delay, Duration::from_millis(320));
        assert_eq!(max_delay, Duration::from_millis(480));
    }
}
