use crate::core::sample::PixelSample;
use crate::io::geocoding::Geocoding;
use crate::io::watermask::{WatermaskSource, WATERMASK_INVALID, WATER_VALUE};
use crate::types::GeoPos;

/// Water-fraction percentage at which a pixel counts as water.
///
/// With the 3x3 subsampling convention, 2 of 9 subpixels being water is
/// sufficient (2/9 = 22.2%, rounded to a fraction byte of >= 23).
pub const WATER_FRACTION_THRESHOLD: u8 = 23;

/// Exact-match resolution of a raw water mask byte.
/// The invalid sentinel yields the a-priori fallback.
pub fn resolve_exact(raw: u8, a_priori_water: bool) -> bool {
    if raw == WATERMASK_INVALID {
        a_priori_water
    } else {
        raw == WATER_VALUE
    }
}

/// Fractional resolution of a water-fraction byte (percent).
/// The invalid sentinel yields the a-priori fallback.
pub fn resolve_fraction(raw: u8, a_priori_water: bool) -> bool {
    if raw == WATERMASK_INVALID {
        a_priori_water
    } else {
        raw >= WATER_FRACTION_THRESHOLD
    }
}

/// Sampling mode of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Point sample, exact water-value match
    Exact,
    /// Footprint fraction against [`WATER_FRACTION_THRESHOLD`]
    Fraction,
}

/// Converts water mask samples into the per-pixel `is_water` boolean.
///
/// The water mask service is an explicit optional handle supplied per call;
/// a missing service degrades to the a-priori land/water flag. The degraded
/// mode is logged once per resolver, not per pixel.
pub struct LandWaterResolver {
    mode: ResolveMode,
    warned_missing: std::sync::atomic::AtomicBool,
}

impl LandWaterResolver {
    pub fn new(mode: ResolveMode) -> Self {
        Self {
            mode,
            warned_missing: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Resolve water-ness at a pixel and write it into the sample.
    ///
    /// Must run before any flag derivation: several flags read the cached
    /// `is_water` decision.
    pub fn assign(
        &self,
        sample: &mut PixelSample,
        watermask: Option<&dyn WatermaskSource>,
        geocoding: &dyn Geocoding,
        x: f64,
        y: f64,
    ) {
        let a_priori_water = !sample.a_priori_land;
        let resolved = match watermask {
            Some(mask) => match self.mode {
                ResolveMode::Exact => match geocoding.pixel_to_geo(x, y) {
                    Some(GeoPos { lat, lon }) => resolve_exact(mask.sample(lat, lon), a_priori_water),
                    None => a_priori_water,
                },
                ResolveMode::Fraction => {
                    resolve_fraction(mask.fraction(geocoding, x, y), a_priori_water)
                }
            },
            None => {
                if !self
                    .warned_missing
                    .swap(true, std::sync::atomic::Ordering::Relaxed)
                {
                    log::warn!(
                        "No water mask service available; falling back to a-priori land/water flags"
                    );
                }
                a_priori_water
            }
        };
        sample.is_water = resolved;
    }
}
