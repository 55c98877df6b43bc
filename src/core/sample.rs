use crate::types::{PixError, PixResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named ancillary inputs supplied by upstream collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ancillary {
    /// Surface pressure in hPa
    SurfacePressure,
    /// Rayleigh-scattering corrected pressure in hPa
    ScatteredPressure,
    /// Cloud-top pressure in hPa
    CloudTopPressure,
    /// TOA reflectance threshold separating land from uncertain
    ToaLandThreshold,
    /// TOA reflectance threshold separating water from uncertain
    ToaWaterThreshold,
    /// Sun zenith angle in radians
    SunZenith,
    /// Sun azimuth angle in radians
    SunAzimuth,
    /// View zenith angle in radians
    ViewZenith,
    /// View azimuth angle in radians
    ViewAzimuth,
}

/// Per-pixel input container, rebuilt for each pixel and never persisted.
///
/// Reflectances are band-indexed in the sensor's native order; NaN marks a
/// saturated or missing band. A pixel is invalid only when *every* band is
/// NaN — a single valid band is enough to count as valid (existing product
/// behavior, preserved literally).
#[derive(Debug, Clone)]
pub struct PixelSample {
    reflectance: Vec<f32>,
    btemp: Option<Vec<f32>>,
    pub ancillary: HashMap<Ancillary, f32>,
    /// Land according to the instrument's own metadata flag
    pub a_priori_land: bool,
    /// Water according to the Land/Water Resolver; must be assigned before
    /// any flag derivation
    pub is_water: bool,
    /// Optional neural-net score computed by the collaborator
    pub nn_score: Option<f32>,
    band_count: usize,
    btemp_count: usize,
}

impl PixelSample {
    /// Create an empty sample for a sensor with the given band layout.
    /// All reflectances start out as NaN (missing).
    pub fn new(band_count: usize, btemp_count: usize) -> Self {
        Self {
            reflectance: vec![f32::NAN; band_count],
            btemp: if btemp_count > 0 {
                Some(vec![f32::NAN; btemp_count])
            } else {
                None
            },
            ancillary: HashMap::new(),
            a_priori_land: false,
            is_water: false,
            nn_score: None,
            band_count,
            btemp_count,
        }
    }

    /// Set the reflectance vector. A length mismatch is a caller bug, not a
    /// data condition, and fails immediately.
    pub fn set_reflectance(&mut self, values: &[f32]) -> PixResult<()> {
        if values.len() != self.band_count {
            return Err(PixError::Configuration(format!(
                "Expected {} reflectance bands, got {}",
                self.band_count,
                values.len()
            )));
        }
        self.reflectance.copy_from_slice(values);
        Ok(())
    }

    /// Set the brightness-temperature vector; same length contract as
    /// [`set_reflectance`](Self::set_reflectance).
    pub fn set_btemp(&mut self, values: &[f32]) -> PixResult<()> {
        if values.len() != self.btemp_count {
            return Err(PixError::Configuration(format!(
                "Expected {} brightness-temperature channels, got {}",
                self.btemp_count,
                values.len()
            )));
        }
        if let Some(bt) = self.btemp.as_mut() {
            bt.copy_from_slice(values);
        }
        Ok(())
    }

    pub fn set_ancillary(&mut self, key: Ancillary, value: f32) {
        self.ancillary.insert(key, value);
    }

    pub fn ancillary(&self, key: Ancillary) -> Option<f32> {
        self.ancillary.get(&key).copied().filter(|v| v.is_finite())
    }

    pub fn reflectance(&self) -> &[f32] {
        &self.reflectance
    }

    /// Reflectance of a single band; NaN for an out-of-layout index so
    /// dependent threshold tests fail closed.
    pub fn refl(&self, band: usize) -> f32 {
        self.reflectance.get(band).copied().unwrap_or(f32::NAN)
    }

    pub fn btemp(&self, channel: usize) -> f32 {
        self.btemp
            .as_ref()
            .and_then(|bt| bt.get(channel))
            .copied()
            .unwrap_or(f32::NAN)
    }

    pub fn has_btemp(&self) -> bool {
        self.btemp.is_some()
    }

    /// Invalid iff all configured reflectance bands are missing.
    pub fn is_invalid(&self) -> bool {
        self.reflectance.iter().all(|r| r.is_nan())
    }

    /// Natural log of the reflectance vector, for the neural-net collaborator.
    pub fn log_reflectance(&self) -> Vec<f32> {
        self.reflectance.iter().map(|r| r.max(1e-6).ln()).collect()
    }
}
