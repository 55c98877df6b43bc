//! Collaborator boundary: geolocation, water mask and neural-net services.
//!
//! The core owns no file formats; everything here is a trait consumed by the
//! classification passes and implemented by the orchestrator.

pub mod geocoding;
pub mod neuralnet;
pub mod watermask;

pub use geocoding::{AffineGeocoding, AltitudeAccessor, DemWindow, Geocoding};
pub use neuralnet::{tier_of, CloudProbability, NnTier};
pub use watermask::{WatermaskSource, WATERMASK_INVALID, WATER_VALUE};
