//! Vendor quota snapshot and the upstream quota check.

use serde::{Deserialize, Serialize};

/// A snapshot of one account's quota usage, as reported by the vendor's
/// quota endpoint. `current` is the amount *used so far* against `maximum`,
/// not a remaining balance — `hasQuota` is `current < maximum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quota {
    pub current: f64,
    pub maximum: f64,
}

impl Quota {
    /// Mirrors the vendor's own `hasQuota = current < maximum` predicate.
    pub fn has_quota(&self) -> bool {
        self.current < self.maximum
    }

    pub fn is_exhausted(&self) -> bool {
        !self.has_quota()
    }

    pub fn used_fraction(&self) -> f64 {
        if self.maximum <= 0.0 {
            0.0
        } else {
            (self.current / self.maximum).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_at_or_past_maximum_is_exhausted() {
        let q = Quota { current: 100.0, maximum: 100.0 };
        assert!(q.is_exhausted());
        let q2 = Quota { current: 101.0, maximum: 100.0 };
        assert!(q2.is_exhausted());
    }

    #[test]
    fn current_below_maximum_has_quota() {
        let q = Quota { current: 25.0, maximum: 100.0 };
        assert!(q.has_quota());
        assert!(!q.is_exhausted());
    }

    #[test]
    fn used_fraction_is_bounded() {
        let q = Quota { current: 25.0, maximum: 100.0 };
        assert!((q.used_fraction() - 0.25).abs() < 1e-9);
    }
}
