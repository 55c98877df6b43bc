//! cloudmask: A Fast, Modular Multisensor Cloud and Pixel Classifier
//!
//! This library derives per-pixel classification flags (cloud, snow, water,
//! land, shadow, coastline and quality indicators) from top-of-atmosphere
//! radiometry of medium-resolution optical sensors, with a geometric
//! cloud-shadow locator and a tile consolidation pass.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{flags, FlagImage, FlagWord, GeoPos, PixError, PixResult, RealImage};

pub use crate::core::{
    ClassificationPipeline, ConsolidationConfig, LandWaterResolver, PixelClassification,
    PixelFeatures, PixelSample, ResolveMode, Sensor, SensorKind, TileConsolidator, TileContext,
};

pub use io::{AffineGeocoding, AltitudeAccessor, CloudProbability, Geocoding, WatermaskSource};
