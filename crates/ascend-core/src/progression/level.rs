//! Level curve.
//!
//! `level = floor(c * sqrt(xp))` with inverse `xp = (level / c)^2`. Both
//! directions are evaluated in floating point, so [`level_from_xp`] snaps its
//! estimate against [`xp_for_level`] to keep the pair exactly consistent at
//! every level boundary.

/// Relative tolerance for treating a squared root as an exact integer.
const INTEGER_SNAP: f64 = 1e-9;

/// Minimum total XP required to reach `level`.
pub fn xp_for_level(level: u32, level_constant: f64) -> u64 {
    if level == 0 {
        return 0;
    }
    let root = level as f64 / level_constant;
    let raw = root * root;
    let nearest = raw.round();
    if (raw - nearest).abs() <= INTEGER_SNAP * nearest.max(1.0) {
        nearest as u64
    } else {
        raw.ceil() as u64
    }
}

/// Level reached with `xp` total experience.
pub fn level_from_xp(xp: u64, level_constant: f64) -> u32 {
    let estimate = (level_constant * (xp as f64).sqrt()).floor();
    let mut level = if estimate.is_finite() && estimate > 0.0 {
        estimate as u32
    } else {
        0
    };

    while level > 0 && xp_for_level(level, level_constant) > xp {
        level -= 1;
    }
    while level < u32::MAX && xp_for_level(level + 1, level_constant) <= xp {
        level += 1;
    }
    level
}

/// XP still needed to reach the level after the one `xp` currently maps to.
pub fn xp_to_next_level(xp: u64, level_constant: f64) -> u64 {
    let level = level_from_xp(xp, level_constant);
    xp_for_level(level.saturating_add(1), level_constant).saturating_sub(xp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const C: f64 = 0.1;

    #[test]
    fn known_levels() {
        assert_eq!(level_from_xp(0, C), 0);
        assert_eq!(level_from_xp(99, C), 0);
        assert_eq!(level_from_xp(100, C), 1);
        assert_eq!(level_from_xp(399, C), 1);
        assert_eq!(level_from_xp(400, C), 2);
        assert_eq!(level_from_xp(900, C), 3);
    }

    #[test]
    fn xp_for_level_matches_formula() {
        assert_eq!(xp_for_level(0, C), 0);
        assert_eq!(xp_for_level(1, C), 100);
        assert_eq!(xp_for_level(3, C), 900);
        assert_eq!(xp_for_level(10, C), 10_000);
    }

    #[test]
    fn xp_to_next_level_counts_remaining() {
        assert_eq!(xp_to_next_level(0, C), 100);
        assert_eq!(xp_to_next_level(150, C), 250);
    }

    #[test]
    fn other_constants_stay_consistent() {
        for c in [0.07, 0.13, 0.25, 0.3] {
            for level in 0..500 {
                assert_eq!(level_from_xp(xp_for_level(level, c), c), level, "c={c}");
            }
        }
    }

    proptest! {
        #[test]
        fn level_boundaries_are_exact(level in 0u32..20_000) {
            let floor = xp_for_level(level, C);
            let next = xp_for_level(level + 1, C);
            prop_assert_eq!(level_from_xp(floor, C), level);
            prop_assert_eq!(level_from_xp(next - 1, C), level);
        }

        #[test]
        fn level_is_monotonic(xp in 0u64..10_000_000, delta in 0u64..10_000) {
            prop_assert!(level_from_xp(xp, C) <= level_from_xp(xp + delta, C));
        }
    }
}
