//! XP curve and level derivation (spec.md §4.11).

#[derive(Debug, Clone, Copy)]
pub struct XpCurve {
    pub base_xp: f64,
    pub exponent: f64,
    pub linear_xp: f64,
    pub max_level: u32,
}

impl XpCurve {
    /// Total XP required to *reach* level `l` (i.e. `xp_required(1) == 0`).
    pub fn xp_required(&self, level: u32) -> u64 {
        if level <= 1 {
            return 0;
        }
        let l = (level - 1) as f64;
        (self.base_xp * l.powf(self.exponent) + self.linear_xp * l).round() as u64
    }

    /// Binary search for the level matching `xp_total` against the curve.
    pub fn level_for_xp(&self, xp_total: u64) -> u32 {
        let mut lo = 1u32;
        let mut hi = self.max_level;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.xp_required(mid) <= xp_total {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> XpCurve {
        XpCurve {
            base_xp: 100.0,
            exponent: 1.5,
            linear_xp: 50.0,
            max_level: 50,
        }
    }

    #[test]
    fn curve_is_strictly_increasing() {
        let c = curve();
        for level in 2..=c.max_level {
            assert!(
                c.xp_required(level) > c.xp_required(level - 1),
                "level {level} did not strictly increase"
            );
        }
    }

    #[test]
    fn level_for_xp_matches_curve() {
        let c = curve();
        assert_eq!(c.level_for_xp(0), 1);
        let xp_at_5 = c.xp_required(5);
        assert_eq!(c.level_for_xp(xp_at_5), 5);
        assert_eq!(c.level_for_xp(xp_at_5 - 1), 4);
    }

    #[test]
    fn level_never_exceeds_max() {
        let c = curve();
        assert_eq!(c.level_for_xp(u64::MAX), c.max_level);
    }
}
