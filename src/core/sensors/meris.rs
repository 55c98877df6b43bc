use crate::core::features::{clamp_unit, PixelFeatures, SensorSpec, Thresholds, UNCERTAIN};
use crate::core::sample::{Ancillary, PixelSample};
use crate::io::neuralnet::{tier_of, NnTier};

static MERIS_SPEC: SensorSpec = SensorSpec {
    name: "MERIS",
    band_count: 15,
    btemp_count: 0,
    wavelengths: &[
        412.7, 442.6, 489.9, 509.8, 559.7, 619.6, 664.6, 680.8, 708.3, 753.4, 761.5, 778.4, 864.9,
        884.9, 900.0,
    ],
    visible_bands: 5,
    // MERIS carries no SWIR channel; the NDSI accessor is overridden below
    // and these indices are never evaluated.
    ndsi_bands: (12, 13),
    ndvi_bands: (6, 12),
};

/// 865 nm band used for the radiometric land/water estimate.
const B865: usize = 12;

/// Fallback TOA reflectance thresholds when the upstream collaborator did
/// not supply per-scene values.
const DEFAULT_TOA_LAND: f32 = 0.15;
const DEFAULT_TOA_WATER: f32 = 0.08;

/// MERIS feature model (unit-scale TOA reflectances, 15 bands).
#[derive(Debug, Clone)]
pub struct Meris {
    pub thresholds: Thresholds,
}

impl Default for Meris {
    fn default() -> Self {
        Self {
            thresholds: Thresholds {
                bright_scale: 0.25,
                bright: 0.4,
                white: 0.9,
                bright_for_white: 0.8,
                bright_white: 1.5,
                cloud: 2.35,
                cloud_ambiguous_margin: 0.35,
                ndsi: 0.68,
                ndvi: 0.4,
                pressure: 0.9,
                glint: 0.5,
                land: 0.9,
                water: 0.9,
            },
        }
    }
}

impl Meris {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PixelFeatures for Meris {
    fn spec(&self) -> &'static SensorSpec {
        &MERIS_SPEC
    }

    fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// No SWIR channel, so no snow index.
    fn ndsi_value(&self, _s: &PixelSample) -> f32 {
        UNCERTAIN
    }

    /// Pressure-height indicator: surface pressure over land, Rayleigh
    /// scattered pressure over water (glint-robust), normalized so that
    /// low pressure (high altitude) approaches 1.
    fn pressure_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let pressure = if self.is_water(s) {
            s.ancillary(Ancillary::ScatteredPressure)
                .or_else(|| s.ancillary(Ancillary::SurfacePressure))
        } else {
            s.ancillary(Ancillary::SurfacePressure)
        };
        match pressure {
            Some(p) => clamp_unit(1.0 - p / 1000.0),
            None => UNCERTAIN,
        }
    }

    fn radiometric_land_value(&self, s: &PixelSample) -> f32 {
        let r = s.refl(B865);
        if self.is_invalid(s) || r.is_nan() {
            return UNCERTAIN;
        }
        let thresh = s
            .ancillary(Ancillary::ToaLandThreshold)
            .unwrap_or(DEFAULT_TOA_LAND);
        if r > thresh {
            1.0
        } else {
            UNCERTAIN
        }
    }

    fn radiometric_water_value(&self, s: &PixelSample) -> f32 {
        let r = s.refl(B865);
        if self.is_invalid(s) || r.is_nan() {
            return UNCERTAIN;
        }
        let thresh = s
            .ancillary(Ancillary::ToaWaterThreshold)
            .unwrap_or(DEFAULT_TOA_WATER);
        if r < thresh {
            1.0
        } else {
            UNCERTAIN
        }
    }

    /// Without SWIR the snow decision rides on the neural-net snow tier.
    fn is_clear_snow(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || !self.is_land(s) || !self.is_bright_white(s) {
            return false;
        }
        match s.nn_score {
            Some(score) => tier_of(score) == NnTier::SnowIce,
            None => false,
        }
    }

    /// The net score, when present, decides the sure tier; otherwise the
    /// base indicator-sum test applies.
    fn is_cloud(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || self.is_clear_snow(s) {
            return false;
        }
        match s.nn_score {
            Some(score) => tier_of(score) == NnTier::CloudSure,
            None => {
                let sum = self.white_value(s)
                    + self.bright_value(s)
                    + self.pressure_value(s)
                    + self.temperature_value(s);
                sum > self.thresholds.cloud
            }
        }
    }

    fn is_cloud_ambiguous(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || self.is_cloud(s) || self.is_clear_snow(s) {
            return false;
        }
        match s.nn_score {
            Some(score) => tier_of(score) == NnTier::CloudAmbiguous,
            None => {
                let t = &self.thresholds;
                let sum = self.white_value(s)
                    + self.bright_value(s)
                    + self.pressure_value(s)
                    + self.temperature_value(s);
                sum > t.cloud - t.cloud_ambiguous_margin
            }
        }
    }
}
