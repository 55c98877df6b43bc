use crate::core::landwater::LandWaterResolver;
use crate::core::sample::{Ancillary, PixelSample};
use crate::core::sensors::Sensor;
use crate::io::geocoding::Geocoding;
use crate::io::neuralnet::CloudProbability;
use crate::io::watermask::WatermaskSource;
use crate::types::{FlagImage, FlagWord, PixError, PixResult};
use ndarray::{ArrayView2, ArrayView3};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Raster inputs of one feature-pass tile.
///
/// `reflectance` and `btemp` are band-major cubes (band, row, col) in the
/// sensor's native band order. Ancillary rasters are optional per key;
/// missing keys degrade the dependent indicators to their neutral value.
/// Collaborator services are explicit optional handles, never globals.
pub struct PipelineInputs<'a> {
    pub reflectance: ArrayView3<'a, f32>,
    pub btemp: Option<ArrayView3<'a, f32>>,
    pub ancillary: &'a HashMap<Ancillary, ArrayView2<'a, f32>>,
    /// Instrument-metadata land flag per pixel
    pub a_priori_land: Option<ArrayView2<'a, bool>>,
    pub geocoding: &'a (dyn Geocoding + Sync),
    pub watermask: Option<&'a (dyn WatermaskSource + Sync)>,
    pub neural_net: Option<&'a (dyn CloudProbability + Sync)>,
}

impl PipelineInputs<'_> {
    fn validate(&self, sensor: &Sensor) -> PixResult<()> {
        let spec = sensor.spec();
        let (bands, rows, cols) = self.reflectance.dim();
        if bands != spec.band_count {
            return Err(PixError::Configuration(format!(
                "{} expects {} reflectance bands, got {}",
                spec.name, spec.band_count, bands
            )));
        }
        if let Some(bt) = &self.btemp {
            let (channels, brows, bcols) = bt.dim();
            if channels != spec.btemp_count || brows != rows || bcols != cols {
                return Err(PixError::Configuration(format!(
                    "{} expects a {}x{}x{} brightness-temperature cube, got {}x{}x{}",
                    spec.name, spec.btemp_count, rows, cols, channels, brows, bcols
                )));
            }
        }
        for (key, raster) in self.ancillary {
            if raster.dim() != (rows, cols) {
                return Err(PixError::Configuration(format!(
                    "Ancillary raster {:?} does not match the {}x{} tile",
                    key, rows, cols
                )));
            }
        }
        if let Some(land) = &self.a_priori_land {
            if land.dim() != (rows, cols) {
                return Err(PixError::Configuration(
                    "A-priori land raster does not match the tile".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// The per-tile feature pass: builds one [`PixelSample`] per pixel, resolves
/// land/water, consults the optional neural net and derives the flag word
/// through the sensor's feature model.
///
/// Rows are independent, so the pass parallelizes over scanlines when the
/// `parallel` feature is enabled. Cancellation is checked once per scanline.
pub struct ClassificationPipeline {
    sensor: Sensor,
    resolver: LandWaterResolver,
}

impl ClassificationPipeline {
    pub fn new(sensor: Sensor, resolver: LandWaterResolver) -> Self {
        Self { sensor, resolver }
    }

    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    pub fn classify_tile(
        &self,
        inputs: &PipelineInputs<'_>,
        cancel: Option<&AtomicBool>,
    ) -> PixResult<FlagImage> {
        inputs.validate(&self.sensor)?;
        let (_, rows, cols) = inputs.reflectance.dim();
        let start = std::time::Instant::now();
        log::info!(
            "Classifying {}x{} tile with the {} feature model",
            rows,
            cols,
            self.sensor.spec().name
        );

        let process_row = |row: usize| -> PixResult<Vec<FlagWord>> {
            if let Some(token) = cancel {
                if token.load(Ordering::Relaxed) {
                    return Err(PixError::Cancelled);
                }
            }
            let mut words = Vec::with_capacity(cols);
            for col in 0..cols {
                words.push(self.classify_pixel(inputs, row, col)?);
            }
            Ok(words)
        };

        #[cfg(feature = "parallel")]
        let row_words: Vec<Vec<FlagWord>> = (0..rows)
            .into_par_iter()
            .map(process_row)
            .collect::<PixResult<_>>()?;
        #[cfg(not(feature = "parallel"))]
        let row_words: Vec<Vec<FlagWord>> =
            (0..rows).map(process_row).collect::<PixResult<_>>()?;

        let mut flags = FlagImage::zeros((rows, cols));
        for (row, words) in row_words.into_iter().enumerate() {
            for (col, word) in words.into_iter().enumerate() {
                flags[[row, col]] = word;
            }
        }
        log::info!("Feature pass finished in {:.2?}", start.elapsed());
        Ok(flags)
    }

    fn classify_pixel(
        &self,
        inputs: &PipelineInputs<'_>,
        row: usize,
        col: usize,
    ) -> PixResult<FlagWord> {
        let spec = self.sensor.spec();
        let mut sample = self.sensor.new_sample();

        let bands: Vec<f32> = (0..spec.band_count)
            .map(|b| inputs.reflectance[[b, row, col]])
            .collect();
        sample.set_reflectance(&bands)?;
        if let Some(bt) = &inputs.btemp {
            let channels: Vec<f32> = (0..spec.btemp_count).map(|c| bt[[c, row, col]]).collect();
            sample.set_btemp(&channels)?;
        }
        for (key, raster) in inputs.ancillary {
            sample.set_ancillary(*key, raster[[row, col]]);
        }
        if let Some(land) = &inputs.a_priori_land {
            sample.a_priori_land = land[[row, col]];
        }

        self.resolver.assign(
            &mut sample,
            inputs.watermask.map(|w| w as &dyn WatermaskSource),
            inputs.geocoding,
            col as f64,
            row as f64,
        );
        if !sample.is_invalid() {
            if let Some(net) = inputs.neural_net {
                sample.nn_score = Some(net.classify(&sample.log_reflectance()));
            }
        }

        Ok(self.sensor.classify(&sample).flags)
    }
}
