/// Neural-net collaborator (optional, sensor-dependent).
///
/// The net is loaded and owned elsewhere; the core only sees a scalar
/// cloud-probability-like score for a log-reflectance vector.
pub trait CloudProbability {
    fn classify(&self, log_reflectance: &[f32]) -> f32;
}

/// Ordered score boundaries partitioning the net output into tiers.
/// score < AMBIGUOUS: clear; [AMBIGUOUS, SURE): cloud ambiguous;
/// [SURE, SNOW_ICE): cloud sure; >= SNOW_ICE: snow/ice-like.
pub const NN_AMBIGUOUS_BOUND: f32 = 1.35;
pub const NN_SURE_BOUND: f32 = 2.15;
pub const NN_SNOW_ICE_BOUND: f32 = 4.6;

/// Tier of a neural-net score against the ordered boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NnTier {
    Clear,
    CloudAmbiguous,
    CloudSure,
    SnowIce,
}

pub fn tier_of(score: f32) -> NnTier {
    if score >= NN_SNOW_ICE_BOUND {
        NnTier::SnowIce
    } else if score >= NN_SURE_BOUND {
        NnTier::CloudSure
    } else if score >= NN_AMBIGUOUS_BOUND {
        NnTier::CloudAmbiguous
    } else {
        NnTier::Clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_in_order() {
        assert_eq!(tier_of(0.0), NnTier::Clear);
        assert_eq!(tier_of(NN_AMBIGUOUS_BOUND), NnTier::CloudAmbiguous);
        assert_eq!(tier_of(NN_SURE_BOUND), NnTier::CloudSure);
        assert_eq!(tier_of(NN_SNOW_ICE_BOUND), NnTier::SnowIce);
        assert_eq!(tier_of(100.0), NnTier::SnowIce);
    }
}
