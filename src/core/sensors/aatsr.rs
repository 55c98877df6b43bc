use crate::core::features::{PixelFeatures, SensorSpec, Thresholds, UNCERTAIN};
use crate::core::sample::PixelSample;
use crate::core::sensors::thermal_falloff;

static AATSR_SPEC: SensorSpec = SensorSpec {
    name: "AATSR",
    band_count: 4,
    btemp_count: 3,
    // 0.55, 0.665, 0.865, 1.61 um nadir reflectance channels
    wavelengths: &[550.0, 665.0, 865.0, 1610.0],
    visible_bands: 2,
    ndsi_bands: (2, 3),
    ndvi_bands: (1, 2),
};

/// Brightness-temperature channel indices: 3.7, 11, 12 um nadir.
const BT_370: usize = 0;
const BT_1100: usize = 1;
const BT_1200: usize = 2;

/// NDSI bound for the sea-ice masks (looser than the snow bound; sea ice is
/// spectrally dirtier than fresh snow).
const SEA_ICE_NDSI: f32 = 0.4;

/// AATSR feature model. Reflectances in the instrument's scaled units
/// (visible-band mean of ~300 saturates the brightness indicator).
#[derive(Debug, Clone)]
pub struct Aatsr {
    pub thresholds: Thresholds,
}

impl Default for Aatsr {
    fn default() -> Self {
        Self {
            thresholds: Thresholds {
                bright_scale: 300.0,
                bright: 0.4,
                white: 0.9,
                bright_for_white: 0.8,
                bright_white: 1.5,
                cloud: 2.15,
                cloud_ambiguous_margin: 0.3,
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

impl Aatsr {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PixelFeatures for Aatsr {
    fn spec(&self) -> &'static SensorSpec {
        &AATSR_SPEC
    }

    fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Three-segment piecewise-linear falloff of the 11 um channel:
    /// flat 0.99 below 225 K, 0.9 -> 0.41 over 225..290 K, 0.41 -> 0 over
    /// 290..310 K.
    fn temperature_value(&self, s: &PixelSample) -> f32 {
        if self.is_invalid(s) {
            return UNCERTAIN;
        }
        let bt = s.btemp(BT_1100);
        if bt.is_nan() {
            return UNCERTAIN;
        }
        thermal_falloff(bt)
    }

    /// Sea ice over water: five relative brightness-temperature and
    /// reflectance-difference masks, all required.
    fn is_sea_ice(&self, s: &PixelSample) -> bool {
        if self.is_invalid(s) || !self.is_water(s) {
            return false;
        }
        let bt37 = s.btemp(BT_370);
        let bt11 = s.btemp(BT_1100);
        let bt12 = s.btemp(BT_1200);
        // NaN channels fail every comparison, so a missing BT vector can
        // never assert sea ice.
        bt11 < 271.35
            && (bt11 - bt12).abs() < 2.0
            && (bt37 - bt11) < 3.0
            && self.ndsi_value(s) > SEA_ICE_NDSI
            && self.bright_value(s) > self.thresholds.bright
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_with(refl: &[f32]) -> PixelSample {
        let mut s = PixelSample::new(4, 3);
        s.set_reflectance(refl).unwrap();
        s
    }

    #[test]
    fn test_reference_scenario_indicators() {
        // Canonical AATSR scene pixel.
        let s = sample_with(&[450.0, 645.0, 1025.0, 512.5]);
        let a = Aatsr::new();

        assert_abs_diff_eq!(a.spectral_flatness_value(&s), 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(a.bright_value(&s), 1.0, epsilon = 1e-3);
        // Bright enough for the whiteness gate, so white == flatness == 0.
        assert_abs_diff_eq!(a.white_value(&s), 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(a.ndsi_value(&s), 0.333, epsilon = 1e-3);
        assert_abs_diff_eq!(a.ndvi_value(&s), 0.2275, epsilon = 1e-3);
    }

    #[test]
    fn test_temperature_piecewise_segments() {
        let a = Aatsr::new();
        let mut s = sample_with(&[450.0, 645.0, 1025.0, 512.5]);

        s.set_btemp(&[f32::NAN, 200.0, f32::NAN]).unwrap();
        assert_abs_diff_eq!(a.temperature_value(&s), 0.99, epsilon = 1e-3);

        s.set_btemp(&[f32::NAN, 255.0, f32::NAN]).unwrap();
        assert_abs_diff_eq!(a.temperature_value(&s), 0.674, epsilon = 1e-3);

        s.set_btemp(&[f32::NAN, 285.0, f32::NAN]).unwrap();
        assert_abs_diff_eq!(a.temperature_value(&s), 0.448, epsilon = 1e-3);

        // Above the warm segment end the indicator bottoms out at zero.
        s.set_btemp(&[f32::NAN, 320.0, f32::NAN]).unwrap();
        assert_abs_diff_eq!(a.temperature_value(&s), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_btemp_is_neutral() {
        let a = Aatsr::new();
        let s = sample_with(&[450.0, 645.0, 1025.0, 512.5]);
        assert_eq!(a.temperature_value(&s), UNCERTAIN);
    }

    #[test]
    fn test_sea_ice_requires_all_masks() {
        let a = Aatsr::new();
        // Bright, NDSI-positive pixel over freezing water.
        let mut s = sample_with(&[400.0, 380.0, 420.0, 150.0]);
        s.is_water = true;
        s.set_btemp(&[268.0, 267.0, 266.5]).unwrap();
        assert!(a.is_sea_ice(&s));

        // Warm water: first mask fails.
        s.set_btemp(&[278.0, 277.0, 276.5]).unwrap();
        assert!(!a.is_sea_ice(&s));

        // Strong 3.7 um excess (sunlit cloud top) fails the third mask.
        s.set_btemp(&[275.0, 267.0, 266.5]).unwrap();
        assert!(!a.is_sea_ice(&s));

        // Over land the detector is not defined.
        s.set_btemp(&[268.0, 267.0, 266.5]).unwrap();
        s.is_water = false;
        assert!(!a.is_sea_ice(&s));
    }

    #[test]
    fn test_cold_bright_pixel_is_cloud() {
        let a = Aatsr::new();
        // Flat bright spectrum, cold: the indicator sum clears the cloud
        // threshold (0.5 neutral pressure contribution included).
        let mut s = sample_with(&[400.0, 402.0, 404.0, 406.0]);
        s.set_btemp(&[230.0, 230.0, 230.0]).unwrap();
        assert!(a.is_cloud(&s));
        assert!(!a.is_clear_land(&s));
        assert!(!a.is_clear_water(&s));
    }

    #[test]
    fn test_warm_dark_pixel_is_not_cloud() {
        let a = Aatsr::new();
        let mut s = sample_with(&[40.0, 60.0, 90.0, 70.0]);
        s.set_btemp(&[295.0, 294.0, 293.5]).unwrap();
        s.a_priori_land = true;
        assert!(!a.is_cloud(&s));
        assert!(a.is_clear_land(&s));
    }
}
