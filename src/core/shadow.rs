use crate::io::geocoding::AltitudeAccessor;
use crate::types::GeoPos;

/// Mean Earth radius used for meter <-> degree conversion.
pub const EARTH_RADIUS_M: f64 = 6_372_000.0;

/// Convergence bound for the fixed-point iteration, in degrees.
/// Roughly one MERIS RR pixel.
const CONVERGENCE_DEG: f64 = 1.0 / 740.0;

/// Iteration budget for the terrain-intersection search.
const MAX_ROUNDS: usize = 5;

/// Reference sea-level pressure in hPa.
const SEA_LEVEL_PRESSURE: f64 = 1013.25;

/// Cloud-top height in meters from cloud-top pressure via the barometric
/// formula with an 8 km scale height.
pub fn height_from_pressure(pressure_hpa: f64) -> f64 {
    -8000.0 * (pressure_hpa / SEA_LEVEL_PRESSURE).ln()
}

/// One shadow query: sun/view geometry (radians), cloud-top height (m) and
/// the apparent cloud ground position. Consumed entirely by [`locate`].
#[derive(Debug, Clone, Copy)]
pub struct ShadowQuery {
    pub cloud_pos: GeoPos,
    pub sun_zenith: f64,
    pub sun_azimuth: f64,
    pub view_zenith: f64,
    pub view_azimuth: f64,
    pub cloud_height: f64,
}

/// Horizontal displacement of a point `height` meters above `surface_alt`,
/// projected to the ground along a zenith/azimuth direction, as a
/// lat/lon offset at the given latitude.
fn ground_offset(height: f64, surface_alt: f64, zenith: f64, azimuth: f64, lat: f64) -> (f64, f64) {
    let dist = -(height - surface_alt) * zenith.tan();
    let dx = dist * azimuth.sin();
    let dy = dist * azimuth.cos();
    let dlat = (dy / EARTH_RADIUS_M).to_degrees();
    let dlon = (dx / (EARTH_RADIUS_M * lat.to_radians().cos())).to_degrees();
    (dlat, dlon)
}

/// Locate the ground shadow of a cloud pixel.
///
/// First corrects the apparent cloud position for view-geometry parallax,
/// then iterates the sun-geometry projection against the DEM: surface
/// altitude varies with position, so the terrain intersection has no closed
/// form and is solved as a fixed point (at most [`MAX_ROUNDS`] rounds).
///
/// Returns `None` when the iteration leaves the DEM rectangle, hits terrain
/// at or above cloud height, or fails to converge. `None` means "no shadow
/// attributable", not an error; the caller leaves the shadow flag unset.
pub fn locate(query: &ShadowQuery, dem: &dyn AltitudeAccessor) -> Option<GeoPos> {
    // Parallax correction: apparent -> true cloud ground position.
    let apparent = query.cloud_pos;
    let surface_alt = dem.altitude_at(apparent)? as f64;
    if surface_alt >= query.cloud_height {
        return None;
    }
    let (dlat, dlon) = ground_offset(
        query.cloud_height,
        surface_alt,
        query.view_zenith,
        query.view_azimuth,
        apparent.lat,
    );
    let corrected = GeoPos::new(apparent.lat + dlat, apparent.lon + dlon);

    // Fixed-point iteration of the sun projection over the terrain.
    let mut candidate = corrected;
    for _ in 0..MAX_ROUNDS {
        let alt = dem.altitude_at(candidate)? as f64;
        if alt >= query.cloud_height {
            return None;
        }
        let (dlat, dlon) = ground_offset(
            query.cloud_height,
            alt,
            query.sun_zenith,
            query.sun_azimuth,
            candidate.lat,
        );
        let next = GeoPos::new(corrected.lat + dlat, corrected.lon + dlon);
        let converged = (next.lat - candidate.lat).abs() < CONVERGENCE_DEG
            && (next.lon - candidate.lon).abs() < CONVERGENCE_DEG;
        candidate = next;
        if converged {
            let alt = dem.altitude_at(candidate)? as f64;
            if alt >= query.cloud_height {
                return None;
            }
            return Some(candidate);
        }
    }
    None
}
