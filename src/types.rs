use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Per-pixel classification flag word
pub type FlagWord = u32;

/// 2D raster of classification flag words (row x col)
pub type FlagImage = Array2<FlagWord>;

/// 2D real-valued raster (row x col)
pub type RealImage = Array2<f32>;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Classification flag bits.
///
/// Bit positions are a fixed, numbered enumeration and must stay stable
/// across releases; downstream consumers interpret individual bits by name.
pub mod flags {
    use super::FlagWord;

    pub const INVALID: FlagWord = 1 << 0;
    pub const CLOUD: FlagWord = 1 << 1;
    pub const CLOUD_AMBIGUOUS: FlagWord = 1 << 2;
    pub const CLOUD_SURE: FlagWord = 1 << 3;
    pub const CLOUD_SHADOW: FlagWord = 1 << 4;
    pub const CLOUD_BUFFER: FlagWord = 1 << 5;
    pub const CLEAR_LAND: FlagWord = 1 << 6;
    pub const CLEAR_WATER: FlagWord = 1 << 7;
    pub const CLEAR_SNOW: FlagWord = 1 << 8;
    pub const LAND: FlagWord = 1 << 9;
    pub const WATER: FlagWord = 1 << 10;
    pub const SEA_ICE: FlagWord = 1 << 11;
    pub const BRIGHT: FlagWord = 1 << 12;
    pub const WHITE: FlagWord = 1 << 13;
    pub const BRIGHTWHITE: FlagWord = 1 << 14;
    pub const HIGH: FlagWord = 1 << 15;
    pub const VEG_RISK: FlagWord = 1 << 16;
    pub const GLINT_RISK: FlagWord = 1 << 17;
    pub const COASTLINE: FlagWord = 1 << 18;
    pub const MIXED_PIXEL: FlagWord = 1 << 19;

    /// All cloud-decision bits (excluding shadow and buffer)
    pub const CLOUD_ANY: FlagWord = CLOUD | CLOUD_AMBIGUOUS | CLOUD_SURE;
    /// All clear-surface bits
    pub const CLEAR_MASK: FlagWord = CLEAR_LAND | CLEAR_WATER | CLEAR_SNOW;

    #[inline]
    pub fn has(word: FlagWord, bit: FlagWord) -> bool {
        word & bit != 0
    }

    /// Merge a freshly computed flag word into an existing one.
    /// Bitwise OR, so merging the same word twice is a no-op.
    #[inline]
    pub fn merge(dst: &mut FlagWord, src: FlagWord) {
        *dst |= src;
    }
}

/// Error types for pixel classification
#[derive(Debug, thiserror::Error)]
pub enum PixError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Processing cancelled")]
    Cancelled,
}

/// Result type for classification operations
pub type PixResult<T> = Result<T, PixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bit_positions_are_stable() {
        // The numbered enumeration from the product interface definition.
        assert_eq!(flags::INVALID, 1);
        assert_eq!(flags::CLOUD, 2);
        assert_eq!(flags::CLOUD_AMBIGUOUS, 4);
        assert_eq!(flags::CLOUD_SURE, 8);
        assert_eq!(flags::CLOUD_SHADOW, 16);
        assert_eq!(flags::CLOUD_BUFFER, 32);
        assert_eq!(flags::CLEAR_LAND, 64);
        assert_eq!(flags::CLEAR_WATER, 128);
        assert_eq!(flags::CLEAR_SNOW, 256);
        assert_eq!(flags::LAND, 512);
        assert_eq!(flags::WATER, 1024);
        assert_eq!(flags::SEA_ICE, 2048);
        assert_eq!(flags::BRIGHT, 4096);
        assert_eq!(flags::WHITE, 8192);
        assert_eq!(flags::BRIGHTWHITE, 16384);
        assert_eq!(flags::HIGH, 32768);
        assert_eq!(flags::VEG_RISK, 65536);
        assert_eq!(flags::GLINT_RISK, 131072);
        assert_eq!(flags::COASTLINE, 262144);
        assert_eq!(flags::MIXED_PIXEL, 524288);
    }

    #[test]
    fn test_flag_merge_is_idempotent() {
        let mut word = flags::CLEAR_LAND | flags::LAND;
        flags::merge(&mut word, flags::CLOUD | flags::BRIGHT);
        let once = word;
        flags::merge(&mut word, flags::CLOUD | flags::BRIGHT);
        assert_eq!(word, once);
        assert!(flags::has(word, flags::CLOUD));
        assert!(flags::has(word, flags::CLEAR_LAND));
    }
}
