//! Core classification modules

pub mod consolidate;
pub mod features;
pub mod landwater;
pub mod pipeline;
pub mod sample;
pub mod sensors;
pub mod shadow;

// Re-export main types
pub use consolidate::{
    merge_flags, ConsolidationConfig, ShadowGeometryView, TileConsolidator, TileContext,
};
pub use features::{Indicators, PixelClassification, PixelFeatures, SensorSpec, Thresholds};
pub use landwater::{LandWaterResolver, ResolveMode, WATER_FRACTION_THRESHOLD};
pub use pipeline::{ClassificationPipeline, PipelineInputs};
pub use sample::{Ancillary, PixelSample};
pub use sensors::{Sensor, SensorKind};
pub use shadow::{height_from_pressure, ShadowQuery};
