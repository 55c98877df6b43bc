use crate::core::features::{clamp_unit, PixelFeatures, SensorSpec, Thresholds, UNCERTAIN};
use crate::core::sample::{Ancillary, PixelSample};
use crate::core::sensors::{tasseled_cap4, thermal_falloff};
use crate::io::neuralnet::{tier_of, NnTier};

static SYNERGY_SPEC: SensorSpec = SensorSpec {
    name: "MERIS/AATSR synergy",
    band_count: 19,
    btemp_count: 3,
    wavelengths: &[
        412.7, 442.6, 489.9, 509.8, 559.7, 619.6, 664.6, 680.8, 708.3, 753.4, 761.5, 778.4, 864.9,
        884.9, 900.0, 550.0, 665.0, 865.0, 1610.0,
    ],
    visible_bands: 5,
    ndsi_bands: (17, 18),
    ndvi_bands: (16, 17),
};

/// First AATSR-equivalent band in the collocated layout.
const A_OFFSET: usize = 15;
/// 1.6 um channel used for the direct sea-ice test.
const B1600: usize = 18;
/// 865 nm MERIS band for the radiometric land/water estimate.
const B865: usize = 12;
/// 11 um brightness-temperature channel.
const BT_1100: usize = 1;

const DEFAULT_TOA_LAND: f32 = 0.15;
const DEFAULT_TOA_WATER: f32 = 0.08;
/// Ice is dark at 1.6 um; open water glint and cloud are not.
const SEA_ICE_REFL_1600: f32 = 0.08;

/// Dual-sensor synergy feature model over the collocated MERIS + AATSR
/// band stack (bands 0..15 MERIS, 15..19 AATSR nadir, unit reflectances).
///
/// Pressure comes from the MERIS side, temperature from the AATSR side;
/// the cloud decision ORs four mutually exclusive sub-tests over
/// tasseled-cap combinations of the AATSR subset gated by MERIS-side
/// indicators.
#[derive(Debug, Clone)]
pub struct Synergy {
    pub thresholds: Thresholds,
}

impl Default for Synergy {
    fn default() -> Self {
        Self {
            thresholds: Thresholds {
                bright_scale: 0.25,
                bright: 0.4,
                white: 0.9,
                bright_for_white: 0.8,
                bright_white: 1.5,
                cloud: 2.35,
                cloud_ambiguous_margin: 0.0,
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

impl Synergy {
    pub fn new() -> Self {
        Self::default()
    }

    fn aatsr_tc(&self, s: &PixelSample) -> [f32; 4] {
        let r = s.reflectance();
        tasseled_cap4(&r[A_OFFSET..])
    }

    pub fn is_general_cloud(&self, s: &PixelSample) -> bool {
        let [tc1, _, _, tc4] = self.aatsr_tc(s);
        tc1 > 0.60 && tc4 < 0.02 && self.temperature_value(s) > 0.6
    }

    pub fn is_haze(&self, s: &PixelSample) -> bool {
        if self.is_general_cloud(s) {
            return false;
        }
        let [tc1, tc2, _, _] = self.aatsr_tc(s);
        tc1 > 0.40 && tc2 < 0.10 && self.pressure_value(s) > 0.55
    }

    pub fn is_complex_haze(&self, s: &PixelSample) -> bool {
        if self.is_general_cloud(s) || self.is_haze(s) {
            return false;
        }
        let [tc1, _, tc3, _] = self.aatsr_tc(s);
        tc1 > 0.32 && tc3 < -0.07 && self.bright_value(s) > 0.4
    }

    pub fn is_border_cloud(&self, s: &PixelSample) -> bool {
        if self.is_general_cloud(s) || self.is_haze(s) || self.is_complex_haze(s) {
            return false;
        }
        let [tc1, _, _, _] = self.aatsr_tc(s);
        tc1 > 0.45 && self.spectral_flatness_value(s) > 0.65
    }
}

impl PixelFeatures for Synergy {
    fn spec(&self) -> &'static SensorSpec {
        &SYNERGY_SPEC
    }

    fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Flatness over the MERIS subset only; the collocated wavelength
    /// sequence is not monotonic across the sensor boundary.
    fn spectral_flatness_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let wl = &self.spec().wavelengths[..A_OFFSET];
        let r = s.reflectance();
        let mut acc = 0.0f32;
        for i in 0..wl.len() - 1 {
            acc += ((r[i + 1] - r[i]) / (wl[i + 1] - wl[i])).abs();
        }
        clamp_unit(1.0 - 1000.0 * acc / (wl.len() - 1) as f32)
    }

    /// MERIS-side pressure estimate (see the single-sensor variant).
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

    /// AATSR-side temperature estimate.
    fn temperature_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let bt = s.btemp(BT_1100);
        if bt.is_nan() {
            UNCERTAIN
        } else {
            thermal_falloff(bt)
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

    fn is_cloud(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || self.is_clear_snow(s) {
            return false;
        }
        self.is_general_cloud(s)
            || self.is_haze(s)
            || self.is_complex_haze(s)
            || self.is_border_cloud(s)
    }

    fn is_cloud_ambiguous(&self, _s: &PixelSample) -> bool {
        false
    }

    /// Sea ice from the 1.6 um channel; when the AATSR swath does not cover
    /// the pixel (NaN channel) the neural-net snow/ice tier substitutes.
    fn is_sea_ice(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || !self.is_water(s) {
            return false;
        }
        let r1600 = s.refl(B1600);
        if r1600.is_nan() {
            match s.nn_score {
                Some(score) => tier_of(score) == NnTier::SnowIce,
                None => false,
            }
        } else {
            r1600 < SEA_ICE_REFL_1600 && self.is_bright(s)
        }
    }
}
