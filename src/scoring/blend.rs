//! Score Blender (C5). Combines the retrospective composite and the
//! predictive score into the heat score stored as `Lead.priority`.

use crate::scoring::tables::round_half_away_from_zero;

pub const RETROSPECTIVE_WEIGHT: f64 = 0.70;
pub const PREDICTIVE_WEIGHT: f64 = 0.30;

/// `clamp(round(0.70 * retrospective + 0.30 * predictive), 0, 100)`.
pub fn blend(retrospective: u8, predictive: u8) -> u8 {
    let raw =
        RETROSPECTIVE_WEIGHT * retrospective as f64 + PREDICTIVE_WEIGHT * predictive as f64;
    round_half_away_from_zero(raw).clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_blend_to_the_same_value() {
        assert!((blend(80, 80) as i32 - 80).abs() <= 1);
    }

    #[test]
    fn blend_stays_within_min_max_of_inputs_modulo_rounding() {
        for r in [0u8, 20, 50, 75, 100] {
            for p in [0u8, 20, 50, 75, 100] {
                let b = blend(r, p);
                let lo = r.min(p).saturating_sub(1);
                let hi = r.max(p) + 1;
                assert!(b >= lo && b <= hi, "blend({r},{p}) = {b} out of [{lo},{hi}]");
            }
        }
    }

    #[test]
    fn blend_is_bounded() {
        assert_eq!(blend(100, 100), 100);
        assert_eq!(blend(0, 0), 0);
    }
}
