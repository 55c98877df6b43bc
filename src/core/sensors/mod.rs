//! Sensor variants of the feature/threshold engine.
//!
//! A closed set of tagged variants dispatched through [`PixelFeatures`];
//! per-variant constants live in data tables, not overridden getters.

pub mod aatsr;
pub mod meris;
pub mod synergy;
pub mod vgt;

pub use aatsr::Aatsr;
pub use meris::Meris;
pub use synergy::Synergy;
pub use vgt::Vgt;

use crate::core::features::{PixelClassification, PixelFeatures, SensorSpec};
use crate::core::sample::PixelSample;
use serde::{Deserialize, Serialize};

/// Tasseled-cap transform over a BLUE/RED/NIR/SWIR quadruple:
/// brightness, greenness, wetness and haze axes. The haze-axis
/// coefficients cancel on a spectrally flat pixel.
pub(crate) fn tasseled_cap4(r: &[f32]) -> [f32; 4] {
    const BRIGHTNESS: [f32; 4] = [0.332, 0.603, 0.676, 0.263];
    const GREENNESS: [f32; 4] = [-0.283, -0.660, 0.577, 0.388];
    const WETNESS: [f32; 4] = [0.900, 0.428, 0.076, -0.041];
    const HAZE: [f32; 4] = [-0.180, 0.273, -0.481, 0.388];

    let dot = |c: &[f32; 4]| c.iter().zip(r.iter()).map(|(c, r)| c * r).sum::<f32>();
    [dot(&BRIGHTNESS), dot(&GREENNESS), dot(&WETNESS), dot(&HAZE)]
}

/// Three-segment piecewise-linear temperature falloff of an 11 um
/// brightness temperature: flat 0.99 below 225 K, 0.9 -> 0.41 over
/// 225..290 K, 0.41 -> 0 over 290..310 K (clamped).
pub(crate) fn thermal_falloff(bt: f32) -> f32 {
    if bt < 225.0 {
        0.99
    } else if bt < 290.0 {
        0.9 - 0.49 * ((bt - 225.0) / 65.0)
    } else {
        (0.41 * (1.0 - (bt - 290.0) / 20.0)).max(0.0)
    }
}

/// Which sensor family a product comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorKind {
    Meris,
    Aatsr,
    Vgt,
    Synergy,
}

/// The closed set of sensor variants.
#[derive(Debug, Clone)]
pub enum Sensor {
    Meris(Meris),
    Aatsr(Aatsr),
    Vgt(Vgt),
    Synergy(Synergy),
}

impl Sensor {
    pub fn new(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Meris => Sensor::Meris(Meris::new()),
            SensorKind::Aatsr => Sensor::Aatsr(Aatsr::new()),
            SensorKind::Vgt => Sensor::Vgt(Vgt::new()),
            SensorKind::Synergy => Sensor::Synergy(Synergy::new()),
        }
    }

    pub fn features(&self) -> &dyn PixelFeatures {
        match self {
            Sensor::Meris(m) => m,
            Sensor::Aatsr(a) => a,
            Sensor::Vgt(v) => v,
            Sensor::Synergy(s) => s,
        }
    }

    pub fn spec(&self) -> &'static SensorSpec {
        self.features().spec()
    }

    /// Empty sample matching this sensor's band layout.
    pub fn new_sample(&self) -> PixelSample {
        let spec = self.spec();
        PixelSample::new(spec.band_count, spec.btemp_count)
    }

    pub fn classify(&self, sample: &PixelSample) -> PixelClassification {
        self.features().classify(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::flags;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_tasseled_cap_haze_axis_cancels_on_flat_spectrum() {
        let [_, _, _, tc4] = tasseled_cap4(&[0.4, 0.4, 0.4, 0.4]);
        assert_abs_diff_eq!(tc4, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_pixel_gets_only_invalid_flag() {
        for kind in [
            SensorKind::Meris,
            SensorKind::Aatsr,
            SensorKind::Vgt,
            SensorKind::Synergy,
        ] {
            let sensor = Sensor::new(kind);
            let sample = sensor.new_sample();
            let c = sensor.classify(&sample);
            assert_eq!(c.flags, flags::INVALID, "{}", sensor.spec().name);
        }
    }

    #[test]
    fn test_cloud_excludes_clear_flags_for_all_sensors() {
        // A bright, cold, flat pixel reads as cloud on every sensor that can
        // see it; the clear flags must then stay unset.
        let aatsr = Sensor::new(SensorKind::Aatsr);
        let mut s = aatsr.new_sample();
        s.set_reflectance(&[400.0, 402.0, 404.0, 406.0]).unwrap();
        s.set_btemp(&[230.0, 230.0, 230.0]).unwrap();
        let c = aatsr.classify(&s);
        assert!(flags::has(c.flags, flags::CLOUD));
        assert_eq!(c.flags & flags::CLEAR_MASK, 0);
    }
}
