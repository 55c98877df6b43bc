use crate::core::features::{PixelFeatures, SensorSpec, Thresholds};
use crate::core::sample::PixelSample;
use crate::core::sensors::tasseled_cap4;

static VGT_SPEC: SensorSpec = SensorSpec {
    name: "VGT",
    band_count: 4,
    btemp_count: 0,
    // BLUE, RED, NIR, SWIR band centers
    wavelengths: &[450.0, 645.0, 835.0, 1665.0],
    visible_bands: 2,
    ndsi_bands: (2, 3),
    ndvi_bands: (1, 2),
};

/// VGT / PROBA-V feature model (unit-scale TOA reflectances, 4 bands).
///
/// The cloud decision is an OR of four named sub-tests over tasseled-cap
/// band combinations. Each sub-test excludes all earlier-listed ones, so
/// the sub-tests are mutually exclusive and the OR is order-independent.
#[derive(Debug, Clone)]
pub struct Vgt {
    pub thresholds: Thresholds,
}

impl Default for Vgt {
    fn default() -> Self {
        Self {
            thresholds: Thresholds {
                bright_scale: 0.3,
                bright: 0.4,
                white: 0.9,
                bright_for_white: 0.75,
                bright_white: 1.5,
                // The indicator-sum test is replaced by the sub-tests; the
                // sum threshold only backs the ambiguous margin.
                cloud: 2.15,
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

impl Vgt {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasseled_cap(&self, s: &PixelSample) -> [f32; 4] {
        tasseled_cap4(s.reflectance())
    }

    /// Thick, spectrally bright cloud.
    pub fn is_general_cloud(&self, s: &PixelSample) -> bool {
        let [tc1, _, _, tc4] = self.tasseled_cap(s);
        tc1 > 0.65 && tc4 < 0.025
    }

    /// Semi-transparent haze over vegetation-free ground.
    pub fn is_haze(&self, s: &PixelSample) -> bool {
        if self.is_general_cloud(s) {
            return false;
        }
        let [tc1, tc2, _, tc4] = self.tasseled_cap(s);
        tc1 > 0.42 && tc2 < 0.12 && tc4 < 0.01
    }

    /// Haze with a wet or shadowed background signature.
    pub fn is_complex_haze(&self, s: &PixelSample) -> bool {
        if self.is_general_cloud(s) || self.is_haze(s) {
            return false;
        }
        let [tc1, _, tc3, _] = self.tasseled_cap(s);
        tc1 > 0.35 && tc3 < -0.08 && self.ndvi_value(s) < 0.35
    }

    /// Thin cloud edge: moderately bright but spectrally flat.
    pub fn is_border_cloud(&self, s: &PixelSample) -> bool {
        if self.is_general_cloud(s) || self.is_haze(s) || self.is_complex_haze(s) {
            return false;
        }
        let [tc1, _, _, _] = self.tasseled_cap(s);
        tc1 > 0.5 && self.spectral_flatness_value(s) > 0.7
    }
}

impl PixelFeatures for Vgt {
    fn spec(&self) -> &'static SensorSpec {
        &VGT_SPEC
    }

    fn thresholds(&self) -> &Thresholds {
        &self.thresholds
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

    /// The sub-tests are exhaustive for this sensor; there is no separate
    /// ambiguous band.
    fn is_cloud_ambiguous(&self, _s: &PixelSample) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(refl: &[f32; 4]) -> PixelSample {
        let mut s = PixelSample::new(4, 0);
        s.set_reflectance(refl).unwrap();
        s
    }

    #[test]
    fn test_general_cloud_fires_on_bright_flat_pixel() {
        let v = Vgt::new();
        // Uniform bright spectrum: tc1 = 1.874 * 0.45, tc4 = 0 (the haze
        // axis coefficients cancel on a flat spectrum).
        let s = sample_with(&[0.45, 0.45, 0.45, 0.45]);
        assert!(v.is_general_cloud(&s));
        assert!(v.is_cloud(&s));
        // Exclusion keeps the later sub-tests quiet.
        assert!(!v.is_haze(&s));
        assert!(!v.is_complex_haze(&s));
        assert!(!v.is_border_cloud(&s));
    }

    #[test]
    fn test_sub_tests_are_mutually_exclusive() {
        let v = Vgt::new();
        let pixels: [[f32; 4]; 4] = [
            [0.45, 0.45, 0.45, 0.45], // thick cloud
            [0.30, 0.28, 0.22, 0.10], // haze-like
            [0.08, 0.10, 0.15, 0.30], // clear soil
            [0.05, 0.04, 0.30, 0.12], // vegetation
        ];
        for p in &pixels {
            let s = sample_with(p);
            let fired = [
                v.is_general_cloud(&s),
                v.is_haze(&s),
                v.is_complex_haze(&s),
                v.is_border_cloud(&s),
            ];
            assert!(fired.iter().filter(|f| **f).count() <= 1, "pixel {:?}", p);
        }
    }

    #[test]
    fn test_vegetation_is_not_cloud() {
        let v = Vgt::new();
        let mut s = sample_with(&[0.05, 0.04, 0.30, 0.12]);
        s.a_priori_land = true;
        assert!(!v.is_cloud(&s));
        assert!(v.is_veg_risk(&s));
        assert!(v.is_clear_land(&s));
    }

    #[test]
    fn test_snow_wins_over_cloud() {
        let v = Vgt::new();
        // Bright, flat visible with dark SWIR: high NDSI.
        let mut s = sample_with(&[0.70, 0.72, 0.71, 0.10]);
        s.a_priori_land = true;
        assert!(v.is_clear_snow(&s));
        assert!(!v.is_cloud(&s));
    }
}
