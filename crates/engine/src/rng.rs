//! The production [`RandomSource`] wired at the composition root. The
//! domain crate stays free of a concrete `rand` dependency (injected via the
//! trait only); this is the one place that changes.

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
