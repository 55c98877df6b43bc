use crate::core::sample::PixelSample;
use crate::types::{flags, FlagWord};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Neutral sentinel for indicators a sensor cannot compute (e.g. pressure
/// on sensors without a pressure product). Chosen so that comparisons
/// against the 0.9-class thresholds never trigger spuriously.
pub const UNCERTAIN: f32 = 0.5;

/// Clamp into the unit interval. NaN inputs come out as 0.0 (both `max` and
/// `min` prefer the non-NaN operand), so threshold tests on missing bands
/// fail closed.
#[inline]
pub fn clamp_unit<T: Float>(value: T) -> T {
    value.max(T::zero()).min(T::one())
}

/// Normalized band difference (a - b) / (a + b), clamped to [0,1].
#[inline]
pub fn normalized_difference(a: f32, b: f32) -> f32 {
    clamp_unit((a - b) / (a + b))
}

/// Fixed band layout of a sensor variant. Pure data, shared by reference
/// from the variant implementations.
#[derive(Debug, Clone)]
pub struct SensorSpec {
    pub name: &'static str,
    pub band_count: usize,
    pub btemp_count: usize,
    /// Band center wavelengths in nm, one per reflectance band
    pub wavelengths: &'static [f32],
    /// Number of leading visible bands averaged for brightness
    pub visible_bands: usize,
    /// (nir, swir) band indices for NDSI
    pub ndsi_bands: (usize, usize),
    /// (red, nir) band indices for NDVI
    pub ndvi_bands: (usize, usize),
}

/// Per-sensor threshold constants. Data, not behavior: variants supply a
/// table instead of overriding getters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Reflectance scale dividing the visible-band mean into [0,1]
    pub bright_scale: f32,
    /// Brightness above which a pixel counts as BRIGHT
    pub bright: f32,
    /// Whiteness above which a pixel counts as WHITE
    pub white: f32,
    /// Brightness gate for the whiteness (spectral flatness) path
    pub bright_for_white: f32,
    /// white + bright sum for BRIGHTWHITE
    pub bright_white: f32,
    /// Indicator sum for the sure-cloud decision
    pub cloud: f32,
    /// Margin below the cloud threshold still flagged ambiguous
    pub cloud_ambiguous_margin: f32,
    pub ndsi: f32,
    pub ndvi: f32,
    /// Pressure indicator above which a pixel counts as HIGH
    pub pressure: f32,
    /// Brightness over water above which glint is a risk
    pub glint: f32,
    pub land: f32,
    pub water: f32,
}

/// Continuous indicator values, all in [0,1] (or NaN-free clamps thereof).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Indicators {
    pub bright: f32,
    pub white: f32,
    pub flatness: f32,
    pub ndsi: f32,
    pub ndvi: f32,
    pub pressure: f32,
    pub temperature: f32,
}

/// Result record of the feature-model pass for one pixel: the flag word plus
/// the indicator values that produced it. Nothing sensor-polymorphic leaves
/// the feature model; post-processing reads this record only.
#[derive(Debug, Clone, Copy)]
pub struct PixelClassification {
    pub flags: FlagWord,
    pub indicators: Indicators,
}

/// Per-pixel feature and threshold engine, one implementation per sensor
/// family. Variants supply their constant tables and override only the
/// formulas that differ; the shared derivations live on the trait.
///
/// Every method is a pure function of the populated sample: no I/O, no
/// failure paths. Sensor-undefined indicators return [`UNCERTAIN`].
pub trait PixelFeatures {
    fn spec(&self) -> &'static SensorSpec;
    fn thresholds(&self) -> &Thresholds;

    fn is_invalid(&self, s: &PixelSample) -> bool {
        s.is_invalid()
    }

    /// Mean of the leading visible bands scaled into [0,1].
    fn bright_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let n = self.spec().visible_bands;
        let mean = s.reflectance()[..n].iter().sum::<f32>() / n as f32;
        clamp_unit(mean / self.thresholds().bright_scale)
    }

    /// Spectral flatness: one minus the mean absolute inter-band slope
    /// (reflectance per nm, scaled to per-um), clamped.
    fn spectral_flatness_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let wl = self.spec().wavelengths;
        let r = s.reflectance();
        let mut acc = 0.0f32;
        for i in 0..wl.len() - 1 {
            acc += ((r[i + 1] - r[i]) / (wl[i + 1] - wl[i])).abs();
        }
        let mean_slope = acc / (wl.len() - 1) as f32;
        clamp_unit(1.0 - 1000.0 * mean_slope)
    }

    /// Whiteness: the spectral flatness score, gated by brightness exceeding
    /// the bright-for-white threshold. Dark pixels are never white.
    fn white_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        if self.bright_value(s) > self.thresholds().bright_for_white {
            self.spectral_flatness_value(s)
        } else {
            0.0
        }
    }

    fn ndsi_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let (nir, swir) = self.spec().ndsi_bands;
        normalized_difference(s.refl(nir), s.refl(swir))
    }

    fn ndvi_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let (red, nir) = self.spec().ndvi_bands;
        normalized_difference(s.refl(nir), s.refl(red))
    }

    /// Pressure-height indicator; sensors without a pressure product leave
    /// the default neutral sentinel.
    fn pressure_value(&self, _s: &PixelSample) -> f32 {
        UNCERTAIN
    }

    /// Temperature indicator; sensors without thermal channels leave the
    /// default neutral sentinel.
    fn temperature_value(&self, _s: &PixelSample) -> f32 {
        UNCERTAIN
    }

    /// Land-ness from the instrument's own metadata flag.
    fn a_priori_land_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            UNCERTAIN
        } else if s.a_priori_land {
            1.0
        } else {
            0.0
        }
    }

    fn a_priori_water_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            UNCERTAIN
        } else if s.a_priori_land {
            0.0
        } else {
            1.0
        }
    }

    /// Radiometric land-ness estimate; neutral where the sensor has none.
    fn radiometric_land_value(&self, _s: &PixelSample) -> f32 {
        UNCERTAIN
    }

    fn radiometric_water_value(&self, _s: &PixelSample) -> f32 {
        UNCERTAIN
    }

    /// Sure-cloud decision. Base pattern: the four-indicator sum against the
    /// sensor's cloud threshold; snow wins over cloud.
    fn is_cloud(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || self.is_clear_snow(s) {
            return false;
        }
        let sum = self.white_value(s)
            + self.bright_value(s)
            + self.pressure_value(s)
            + self.temperature_value(s);
        sum > self.thresholds().cloud
    }

    /// Ambiguous-cloud decision: within the margin below the sure threshold.
    fn is_cloud_ambiguous(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || self.is_cloud(s) || self.is_clear_snow(s) {
            return false;
        }
        let t = self.thresholds();
        let sum = self.white_value(s)
            + self.bright_value(s)
            + self.pressure_value(s)
            + self.temperature_value(s);
        sum > t.cloud - t.cloud_ambiguous_margin
    }

    /// Sea-ice detection; only implemented where physically supported.
    fn is_sea_ice(&self, _s: &PixelSample) -> bool {
        false
    }

    // ---- shared derivations -------------------------------------------------

    fn is_bright(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s) && self.bright_value(s) > self.thresholds().bright
    }

    fn is_white(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s) && self.white_value(s) > self.thresholds().white
    }

    fn is_bright_white(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s)
            && self.white_value(s) + self.bright_value(s) > self.thresholds().bright_white
    }

    fn is_high(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s) && self.pressure_value(s) > self.thresholds().pressure
    }

    fn is_land(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s)
            && (s.a_priori_land || self.a_priori_land_value(s) > self.thresholds().land)
    }

    /// Cached resolver decision; not recomputed here.
    fn is_water(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s) && s.is_water
    }

    fn is_clear_snow(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s)
            && self.is_land(s)
            && self.is_bright_white(s)
            && self.ndsi_value(s) > self.thresholds().ndsi
    }

    fn is_clear_land(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || self.is_cloud(s) {
            return false;
        }
        // Prefer the radiometric estimate whenever it is informative.
        match informative(self.radiometric_land_value(s), self.a_priori_land_value(s)) {
            Some(score) => score > self.thresholds().land,
            None => false, // unknown => not clear
        }
    }

    fn is_clear_water(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || self.is_cloud(s) {
            return false;
        }
        match informative(self.radiometric_water_value(s), self.a_priori_water_value(s)) {
            Some(score) => score > self.thresholds().water,
            None => false, // unknown => not clear
        }
    }

    fn is_veg_risk(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s) && self.is_land(s) && self.ndvi_value(s) > self.thresholds().ndvi
    }

    /// Bright, spectrally non-flat water reads as specular sun glint.
    fn is_glint_risk(&self, s: &PixelSample) -> bool {
        !self.is_invalid(s)
            && self.is_water(s)
            && self.bright_value(s) > self.thresholds().glint
            && self.white_value(s) <= self.thresholds().white
    }

    /// Derive the full flag word plus indicator record for one pixel.
    fn classify(&self, s: &PixelSample) -> PixelClassification {
        let indicators = Indicators {
            bright: self.bright_value(s),
            white: self.white_value(s),
            flatness: self.spectral_flatness_value(s),
            ndsi: self.ndsi_value(s),
            ndvi: self.ndvi_value(s),
            pressure: self.pressure_value(s),
            temperature: self.temperature_value(s),
        };

        let mut word: FlagWord = 0;
        if self.is_invalid(s) {
            return PixelClassification {
                flags: flags::INVALID,
                indicators,
            };
        }

        let cloud_sure = self.is_cloud(s);
        let cloud_ambiguous = self.is_cloud_ambiguous(s);
        let cloud = cloud_sure || cloud_ambiguous;

        if cloud {
            word |= flags::CLOUD;
        }
        if cloud_sure {
            word |= flags::CLOUD_SURE;
        }
        if cloud_ambiguous {
            word |= flags::CLOUD_AMBIGUOUS;
        }
        if self.is_land(s) {
            word |= flags::LAND;
        }
        if self.is_water(s) {
            word |= flags::WATER;
        }
        if self.is_sea_ice(s) {
            word |= flags::SEA_ICE;
        }
        if self.is_bright(s) {
            word |= flags::BRIGHT;
        }
        if self.is_white(s) {
            word |= flags::WHITE;
        }
        if self.is_bright_white(s) {
            word |= flags::BRIGHTWHITE;
        }
        if self.is_high(s) {
            word |= flags::HIGH;
        }
        if self.is_veg_risk(s) {
            word |= flags::VEG_RISK;
        }
        if self.is_glint_risk(s) {
            word |= flags::GLINT_RISK;
        }
        if !cloud {
            if self.is_clear_snow(s) {
                word |= flags::CLEAR_SNOW;
            }
            if self.is_clear_land(s) {
                word |= flags::CLEAR_LAND;
            }
            if self.is_clear_water(s) {
                word |= flags::CLEAR_WATER;
            }
        }

        PixelClassification {
            flags: word,
            indicators,
        }
    }
}

/// Pick the radiometric score unless it is the neutral sentinel, then the
/// a-priori score, then nothing.
fn informative(radiometric: f32, a_priori: f32) -> Option<f32> {
    if radiometric != UNCERTAIN {
        Some(radiometric)
    } else if a_priori != UNCERTAIN {
        Some(a_priori)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(-0.5f32), 0.0);
        assert_eq!(clamp_unit(0.25f32), 0.25);
        assert_eq!(clamp_unit(3.0f32), 1.0);
        // NaN fails closed
        assert_eq!(clamp_unit(f32::NAN), 0.0);
    }

    #[test]
    fn test_normalized_difference() {
        assert_abs_diff_eq!(normalized_difference(1025.0, 512.5), 0.33333, epsilon = 1e-4);
        assert_eq!(normalized_difference(0.1, 0.9), 0.0);
    }

    #[test]
    fn test_informative_score_selection() {
        assert_eq!(informative(0.8, 0.0), Some(0.8));
        assert_eq!(informative(UNCERTAIN, 1.0), Some(1.0));
        assert_eq!(informative(UNCERTAIN, UNCERTAIN), None);
        // 0.0 is an informative radiometric answer, not a sentinel
        assert_eq!(informative(0.0, 1.0), Some(0.0));
    }
}
