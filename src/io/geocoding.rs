use crate::types::GeoPos;
use ndarray::Array2;

/// Geolocation collaborator: pixel <-> lat/lon transform and altitude lookup.
///
/// Implementations must tolerate coordinates slightly outside the nominal
/// raster (edge tiles) by returning `None` rather than panicking.
pub trait Geocoding {
    /// Geographic position at pixel center (x = col, y = row).
    fn pixel_to_geo(&self, x: f64, y: f64) -> Option<GeoPos>;

    /// Fractional pixel position (x, y) for a geographic position.
    fn geo_to_pixel(&self, geo: GeoPos) -> Option<(f64, f64)>;

    /// Surface altitude in meters at a pixel position.
    fn altitude(&self, x: f64, y: f64) -> Option<f32>;

    /// Whether the geocoding is map-CRS based (as opposed to tie-point
    /// interpolated). Drives the coastline detection mode.
    fn is_crs_based(&self) -> bool {
        false
    }
}

/// Affine (geo-transform driven) geocoding over a north-up grid.
///
/// Latitude decreases with row, longitude increases with column.
#[derive(Debug, Clone)]
pub struct AffineGeocoding {
    pub origin_lat: f64,
    pub origin_lon: f64,
    /// Degrees per pixel, positive
    pub pixel_size: f64,
    pub width: usize,
    pub height: usize,
    /// Optional elevation raster matching the grid
    pub elevation: Option<Array2<f32>>,
    pub crs_based: bool,
}

impl AffineGeocoding {
    pub fn new(origin_lat: f64, origin_lon: f64, pixel_size: f64, width: usize, height: usize) -> Self {
        Self {
            origin_lat,
            origin_lon,
            pixel_size,
            width,
            height,
            elevation: None,
            crs_based: false,
        }
    }

    pub fn with_elevation(mut self, elevation: Array2<f32>) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Slack of one pixel around the nominal raster; edge tiles routinely
    /// ask for coordinates just outside it.
    fn in_tolerant_bounds(&self, x: f64, y: f64) -> bool {
        x >= -1.0 && y >= -1.0 && x <= self.width as f64 + 1.0 && y <= self.height as f64 + 1.0
    }
}

impl Geocoding for AffineGeocoding {
    fn pixel_to_geo(&self, x: f64, y: f64) -> Option<GeoPos> {
        if !self.in_tolerant_bounds(x, y) {
            return None;
        }
        Some(GeoPos::new(
            self.origin_lat - (y + 0.5) * self.pixel_size,
            self.origin_lon + (x + 0.5) * self.pixel_size,
        ))
    }

    fn geo_to_pixel(&self, geo: GeoPos) -> Option<(f64, f64)> {
        let x = (geo.lon - self.origin_lon) / self.pixel_size - 0.5;
        let y = (self.origin_lat - geo.lat) / self.pixel_size - 0.5;
        if !self.in_tolerant_bounds(x, y) {
            return None;
        }
        Some((x, y))
    }

    fn altitude(&self, x: f64, y: f64) -> Option<f32> {
        let dem = self.elevation.as_ref()?;
        let (height, width) = dem.dim();
        let col = x.round();
        let row = y.round();
        if col < 0.0 || row < 0.0 || col as usize >= width || row as usize >= height {
            return None;
        }
        let value = dem[[row as usize, col as usize]];
        if value.is_finite() {
            Some(value)
        } else {
            None
        }
    }

    fn is_crs_based(&self) -> bool {
        self.crs_based
    }
}

/// DEM altitude accessor bounded to a geographic rectangle.
///
/// The shadow locator walks candidate positions through this accessor;
/// lookups outside the rectangle return `None` and end the walk.
pub trait AltitudeAccessor {
    fn altitude_at(&self, geo: GeoPos) -> Option<f32>;
}

/// Altitude accessor backed by an elevation patch covering a lat/lon window.
#[derive(Debug, Clone)]
pub struct DemWindow {
    /// Elevation patch (row 0 = northernmost)
    data: Array2<f32>,
    /// Latitude of the northern edge of the patch
    north_lat: f64,
    /// Longitude of the western edge of the patch
    west_lon: f64,
    /// Degrees per patch cell, positive
    cell_size: f64,
    /// Value marking missing elevation
    nodata: f32,
}

impl DemWindow {
    pub fn new(data: Array2<f32>, north_lat: f64, west_lon: f64, cell_size: f64, nodata: f32) -> Self {
        Self {
            data,
            north_lat,
            west_lon,
            cell_size,
            nodata,
        }
    }

    /// Flat window at a constant elevation, mostly for tests and for
    /// low-relief scenes where no DEM patch was loaded.
    pub fn flat(rows: usize, cols: usize, north_lat: f64, west_lon: f64, cell_size: f64, elevation: f32) -> Self {
        Self::new(
            Array2::from_elem((rows, cols), elevation),
            north_lat,
            west_lon,
            cell_size,
            -32768.0,
        )
    }
}

impl AltitudeAccessor for DemWindow {
    fn altitude_at(&self, geo: GeoPos) -> Option<f32> {
        let row = (self.north_lat - geo.lat) / self.cell_size;
        let col = (geo.lon - self.west_lon) / self.cell_size;
        if row < 0.0 || col < 0.0 {
            return None;
        }
        let (rows, cols) = self.data.dim();
        let (row, col) = (row as usize, col as usize);
        if row >= rows || col >= cols {
            return None;
        }
        let value = self.data[[row, col]];
        if value.is_finite() && value != self.nodata {
            Some(value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_affine_round_trip() {
        let gc = AffineGeocoding::new(50.0, 10.0, 0.01, 100, 100);
        let geo = gc.pixel_to_geo(10.0, 20.0).unwrap();
        let (x, y) = gc.geo_to_pixel(geo).unwrap();
        assert_relative_eq!(x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(y, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_affine_tolerates_slightly_outside() {
        let gc = AffineGeocoding::new(50.0, 10.0, 0.01, 100, 100);
        assert!(gc.pixel_to_geo(-0.5, 0.0).is_some());
        assert!(gc.pixel_to_geo(-50.0, 0.0).is_none());
    }

    #[test]
    fn test_dem_window_bounds() {
        let dem = DemWindow::flat(10, 10, 50.0, 10.0, 0.01, 120.0);
        assert_eq!(dem.altitude_at(GeoPos::new(49.95, 10.05)), Some(120.0));
        assert_eq!(dem.altitude_at(GeoPos::new(50.05, 10.05)), None);
        assert_eq!(dem.altitude_at(GeoPos::new(49.95, 9.95)), None);
        assert_eq!(dem.altitude_at(GeoPos::new(49.85, 10.15)), None);
    }

    #[test]
    fn test_dem_window_nodata_is_none() {
        let mut data = Array2::from_elem((4, 4), 100.0f32);
        data[[1, 1]] = -32768.0;
        let dem = DemWindow::new(data, 50.0, 10.0, 0.01, -32768.0);
        assert_eq!(dem.altitude_at(GeoPos::new(49.985, 10.015)), None);
    }
}
