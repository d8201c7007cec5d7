//! Weighted loot rolls (SPEC_FULL.md §C). Sourced from mob/zone
//! configuration, not hardcoded, so this stays a pure data structure plus a
//! roll function rather than a catalog.

use crate::ids::ItemTemplateId;
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// One rollable item: a template id, its relative weight, and the quantity
/// range to grant if it hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootTable {
    pub entries: Vec<(ItemTemplateId, f64, RangeInclusive<u32>)>,
}

impl LootTable {
    pub fn new(entries: Vec<(ItemTemplateId, f64, RangeInclusive<u32>)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn total_weight(&self) -> f64 {
        self.entries.iter().map(|(_, weight, _)| weight).sum()
    }

    /// Rolls exactly one entry, weighted by `weight`, and a quantity drawn
    /// uniformly from its range. Returns `None` for an empty table or a
    /// table whose weights sum to zero or less.
    pub fn roll(&self, rng: &mut dyn RandomSource) -> Option<(ItemTemplateId, u32)> {
        let total = self.total_weight();
        if self.entries.is_empty() || total <= 0.0 {
            return None;
        }
        let pick = rng.gen_f64() * total;
        let mut cursor = 0.0;
        for (template_id, weight, qty_range) in &self.entries {
            cursor += weight;
            if pick < cursor {
                let qty = if qty_range.start() == qty_range.end() {
                    *qty_range.start()
                } else {
                    rng.gen_range(*qty_range.start() as i32, *qty_range.end() as i32) as u32
                };
                return Some((template_id.clone(), qty));
            }
        }
        // Floating point rounding can leave `pick` just past the last
        // cumulative bound; fall back to the final entry rather than drop
        // the roll.
        self.entries.last().map(|(template_id, _, qty_range)| {
            (template_id.clone(), *qty_range.start())
        })
    }
}
