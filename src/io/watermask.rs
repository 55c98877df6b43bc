use crate::io::geocoding::Geocoding;

/// Reserved sentinel returned when the water mask has no coverage at the
/// requested position (e.g. below -60 deg latitude) or the backing
/// classifier failed to initialize.
pub const WATERMASK_INVALID: u8 = 0xFF;

/// Byte value meaning "water" in the exact-match sampling mode.
pub const WATER_VALUE: u8 = 1;

/// Water mask collaborator.
///
/// Both accessors return [`WATERMASK_INVALID`] when coverage is unavailable;
/// callers fall back to the a-priori land/water flag and never treat the
/// sentinel as fatal.
pub trait WatermaskSource {
    /// Raw mask sample at a geographic position (0 = land, 1 = water).
    fn sample(&self, lat: f64, lon: f64) -> u8;

    /// Water fraction in percent (0..=100) for the pixel footprint at
    /// (x, y), subsampled over the footprint (3x3 by convention).
    fn fraction(&self, geocoding: &dyn Geocoding, x: f64, y: f64) -> u8;
}
