//! The production [`RandomSource`] wired at the gateway's composition root,
//! used only for reconnect-backoff jitter (spec.md §4.2). Mirrors the
//! engine's own `ThreadRandom`; the gateway cannot depend on the engine
//! crate (the dependency runs the other way for Standalone mode), so the
//! small impl is duplicated here rather than shared.

use ambonmud_domain::random::RandomSource;
use rand::Rng;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn gen_range(&mut self, min: i32, max: i32) -> i32 {
        rand::thread_rng().gen_range(min..=max)
    }

    fn gen_f64(&mut self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    fn gen_uuid(&mut self) -> Uuid {
        Uuid::new_v4()
    }
}
