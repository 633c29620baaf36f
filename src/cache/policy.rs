//! Tag-index cleanup policy.

/// Probability of skipping tag-index compaction when an entry is evicted by a
/// flush.
///
/// Compaction walks every other tag of the evicted entry and drops the entry's
/// back-reference from those buckets. Skipping it saves that work at the price
/// of stale references that stay in memory until their own tag is flushed.
/// Stale references are never used to answer a hit or a query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sloppiness(f64);

impl Sloppiness {
    /// Always compact.
    pub const THOROUGH: Self = Self(0.0);
    /// Never compact.
    pub const LAZY: Self = Self(1.0);

    /// Clamps into `[0, 1]`; NaN means thorough.
    pub fn new(ratio: f64) -> Self {
        if ratio.is_nan() {
            return Self::THOROUGH;
        }
        Self(ratio.clamp(0.0, 1.0))
    }

    pub fn ratio(self) -> f64 {
        self.0
    }

    /// Draw once per evicted entry.
    pub fn skip_compaction(self, rng: &mut fastrand::Rng) -> bool {
        if self.0 <= 0.0 {
            return false;
        }
        if self.0 >= 1.0 {
            return true;
        }
        rng.f64() < self.0
    }
}
