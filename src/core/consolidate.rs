use crate::core::shadow::{self, height_from_pressure, ShadowQuery};
use crate::io::geocoding::{AltitudeAccessor, Geocoding};
use crate::io::watermask::WATERMASK_INVALID;
use crate::types::{flags, FlagImage, FlagWord, PixError, PixResult};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Tunable parameters of the consolidation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Chebyshev radius of the cloud safety buffer
    pub cloud_buffer_width: usize,
    /// Fraction of 3x3 neighbors that must be cloud for a coastline cloud
    /// pixel to survive refinement
    pub cloud_surround_fraction: f32,
    /// Southern latitude limit of water mask coverage (degrees)
    pub coastline_lat_limit: f64,
    /// Whether to cast cloud shadows
    pub cast_shadows: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            cloud_buffer_width: 2,
            cloud_surround_fraction: 0.7,
            coastline_lat_limit: -58.0,
            cast_shadows: true,
        }
    }
}

/// Per-pixel sun/view geometry and cloud-top pressure over the haloed
/// window, for shadow casting. Angles in radians, pressure in hPa.
pub struct ShadowGeometryView<'a> {
    pub sun_zenith: ArrayView2<'a, f32>,
    pub sun_azimuth: ArrayView2<'a, f32>,
    pub view_zenith: ArrayView2<'a, f32>,
    pub view_azimuth: ArrayView2<'a, f32>,
    pub cloud_top_pressure: ArrayView2<'a, f32>,
}

/// Inputs for consolidating one tile.
///
/// `source_flags` covers the tile's own rectangle plus a halo of
/// un-consolidated neighbor flags; pixel coordinates passed to the
/// geocoding are window-local. The consolidator reads the whole window but
/// writes only the tile's own rectangle, so tile processing order cannot
/// influence the output.
pub struct TileContext<'a> {
    pub source_flags: ArrayView2<'a, FlagWord>,
    /// (rows, cols) offset of the tile's own rectangle inside the window
    pub halo: (usize, usize),
    /// (rows, cols) of the tile's own rectangle
    pub tile_shape: (usize, usize),
    /// Water fraction percent per window pixel; sentinel 0xFF = no coverage
    pub water_fraction: Option<ArrayView2<'a, u8>>,
    pub geocoding: &'a dyn Geocoding,
    pub dem: &'a dyn AltitudeAccessor,
    pub shadow_geometry: Option<ShadowGeometryView<'a>>,
}

impl TileContext<'_> {
    fn validate(&self) -> PixResult<()> {
        let (wrows, wcols) = self.source_flags.dim();
        let (trows, tcols) = self.tile_shape;
        if self.halo.0 + trows > wrows || self.halo.1 + tcols > wcols {
            return Err(PixError::Processing(format!(
                "Tile rectangle {}x{} at halo offset {:?} exceeds window {}x{}",
                trows, tcols, self.halo, wrows, wcols
            )));
        }
        if let Some(wf) = &self.water_fraction {
            if wf.dim() != (wrows, wcols) {
                return Err(PixError::Processing(
                    "Water fraction raster does not match the flag window".to_string(),
                ));
            }
        }
        if let Some(geom) = &self.shadow_geometry {
            for view in [
                &geom.sun_zenith,
                &geom.sun_azimuth,
                &geom.view_zenith,
                &geom.view_azimuth,
                &geom.cloud_top_pressure,
            ] {
                if view.dim() != (wrows, wcols) {
                    return Err(PixError::Processing(
                        "Shadow geometry rasters do not match the flag window".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Merge freshly computed flags into previously existing ones, pixel by
/// pixel (bitwise OR, idempotent). Used where overlapping processing
/// passes write the same tile.
pub fn merge_flags(dst: &mut FlagImage, src: &FlagImage) -> PixResult<()> {
    if dst.dim() != src.dim() {
        return Err(PixError::Processing(format!(
            "Cannot merge {:?} flags into {:?}",
            src.dim(),
            dst.dim()
        )));
    }
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        flags::merge(d, *s);
    }
    Ok(())
}

/// Tile-local post-processing: coastline detection and refinement, cloud
/// buffer growth and shadow casting over a haloed flag window.
pub struct TileConsolidator {
    config: ConsolidationConfig,
}

impl TileConsolidator {
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Consolidate one tile; returns the rewritten flags for the tile's own
    /// rectangle. Cancellation is checked between scanlines only.
    pub fn consolidate(
        &self,
        ctx: &TileContext<'_>,
        cancel: Option<&AtomicBool>,
    ) -> PixResult<FlagImage> {
        ctx.validate()?;
        let (wrows, wcols) = ctx.source_flags.dim();
        let (trows, tcols) = ctx.tile_shape;
        log::debug!(
            "Consolidating {}x{} tile inside {}x{} window (halo {:?})",
            trows,
            tcols,
            wrows,
            wcols,
            ctx.halo
        );

        // Window-wide working copy: coastline refinement must see refined
        // neighbor state consistently, and it derives from the source
        // snapshot alone, so doing it across the whole window keeps the
        // result independent of tile processing order.
        let mut window = ctx.source_flags.to_owned();

        let coastline = self.detect_coastline(ctx);
        for ((row, col), word) in window.indexed_iter_mut() {
            if coastline[[row, col]] {
                *word |= flags::COASTLINE;
            }
            if let Some(wf) = &ctx.water_fraction {
                let f = wf[[row, col]];
                if f > 0 && f < 100 && f != WATERMASK_INVALID {
                    *word |= flags::MIXED_PIXEL;
                }
            }
        }
        self.refine_coastline_clouds(ctx, &mut window, &coastline, cancel)?;

        // The tile's own rectangle of the refined window is the base of the
        // output.
        let mut out = FlagImage::zeros((trows, tcols));
        for row in 0..trows {
            for col in 0..tcols {
                out[[row, col]] = window[[row + ctx.halo.0, col + ctx.halo.1]];
            }
        }

        self.grow_cloud_buffer(ctx, &window, &mut out, cancel)?;
        if self.config.cast_shadows {
            if let Some(geom) = &ctx.shadow_geometry {
                self.cast_shadows(ctx, geom, &window, &mut out, cancel)?;
            }
        }

        // Final cloud decision wins over every clear flag.
        for word in out.iter_mut() {
            if flags::has(*word, flags::CLOUD_ANY) {
                *word &= !flags::CLEAR_MASK;
            }
        }
        Ok(out)
    }

    /// Coastline adjacency per window pixel.
    ///
    /// Plain pixel geocodings compare the neighbor water fractions against
    /// the center; tie-point/CRS geocodings look for genuinely mixed
    /// neighbors inside the (0,100) open interval, limited to latitudes
    /// where the water mask has coverage.
    fn detect_coastline(&self, ctx: &TileContext<'_>) -> ndarray::Array2<bool> {
        let (wrows, wcols) = ctx.source_flags.dim();
        let mut coastline = ndarray::Array2::from_elem((wrows, wcols), false);
        let wf = match &ctx.water_fraction {
            Some(wf) => wf,
            None => return coastline,
        };
        let fraction_diff_mode = !ctx.geocoding.is_crs_based();

        for row in 0..wrows {
            for col in 0..wcols {
                let center = wf[[row, col]];
                if center == WATERMASK_INVALID {
                    continue;
                }
                let mut near = false;
                'neighbors: for dr in -1i64..=1 {
                    for dc in -1i64..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let (nr, nc) = (row as i64 + dr, col as i64 + dc);
                        if nr < 0 || nc < 0 || nr as usize >= wrows || nc as usize >= wcols {
                            continue;
                        }
                        let v = wf[[nr as usize, nc as usize]];
                        if v == WATERMASK_INVALID {
                            continue;
                        }
                        if fraction_diff_mode {
                            if v != center {
                                near = true;
                                break 'neighbors;
                            }
                        } else if v > 0 && v < 100 {
                            let lat = ctx
                                .geocoding
                                .pixel_to_geo(nc as f64, nr as f64)
                                .map(|g| g.lat);
                            if lat.map_or(false, |lat| lat > self.config.coastline_lat_limit) {
                                near = true;
                                break 'neighbors;
                            }
                        }
                    }
                }
                coastline[[row, col]] = near;
            }
        }
        coastline
    }

    /// Near a coastline, mixed land/water spectra fake both snow and cloud:
    /// snow is cleared unconditionally; a cloud flag survives only when the
    /// pixel is surrounded by cloud or some non-coastline neighbor is
    /// independently cloudy.
    fn refine_coastline_clouds(
        &self,
        ctx: &TileContext<'_>,
        window: &mut FlagImage,
        coastline: &ndarray::Array2<bool>,
        cancel: Option<&AtomicBool>,
    ) -> PixResult<()> {
        let (wrows, wcols) = window.dim();
        let source = ctx.source_flags;

        for row in 0..wrows {
            check_cancelled(cancel)?;
            for col in 0..wcols {
                if !coastline[[row, col]] {
                    continue;
                }
                let word = &mut window[[row, col]];
                *word &= !flags::CLEAR_SNOW;
                if !flags::has(*word, flags::CLOUD) {
                    continue;
                }

                let mut neighbors = 0u32;
                let mut cloud_neighbors = 0u32;
                let mut independent_cloud = false;
                for dr in -1i64..=1 {
                    for dc in -1i64..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let (nr, nc) = (row as i64 + dr, col as i64 + dc);
                        if nr < 0 || nc < 0 || nr as usize >= wrows || nc as usize >= wcols {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        neighbors += 1;
                        if flags::has(source[[nr, nc]], flags::CLOUD) {
                            cloud_neighbors += 1;
                            if !coastline[[nr, nc]] {
                                independent_cloud = true;
                            }
                        }
                    }
                }
                let surrounded = neighbors > 0
                    && cloud_neighbors as f32
                        >= self.config.cloud_surround_fraction * neighbors as f32;
                if !surrounded && !independent_cloud {
                    let word = &mut window[[row, col]];
                    *word &= !(flags::CLOUD | flags::CLOUD_SURE | flags::CLOUD_AMBIGUOUS);
                }
            }
        }
        Ok(())
    }

    /// Explicit dilation: CLOUD_BUFFER lands on every non-invalid pixel of
    /// the tile within the configured Chebyshev distance of a cloud pixel.
    /// Buffered pixels do not seed further growth.
    fn grow_cloud_buffer(
        &self,
        ctx: &TileContext<'_>,
        window: &FlagImage,
        out: &mut FlagImage,
        cancel: Option<&AtomicBool>,
    ) -> PixResult<()> {
        let w = self.config.cloud_buffer_width as i64;
        let (wrows, wcols) = window.dim();
        let (trows, tcols) = ctx.tile_shape;

        for row in 0..trows {
            check_cancelled(cancel)?;
            for col in 0..tcols {
                let word = &mut out[[row, col]];
                if flags::has(*word, flags::INVALID) {
                    continue;
                }
                let (wr, wc) = (row + ctx.halo.0, col + ctx.halo.1);
                'search: for dr in -w..=w {
                    for dc in -w..=w {
                        let (nr, nc) = (wr as i64 + dr, wc as i64 + dc);
                        if nr < 0 || nc < 0 || nr as usize >= wrows || nc as usize >= wcols {
                            continue;
                        }
                        if flags::has(window[[nr as usize, nc as usize]], flags::CLOUD) {
                            *word |= flags::CLOUD_BUFFER;
                            break 'search;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Cast a shadow for every cloud pixel of the window. Sources come from
    /// the refined (but never buffer-grown) snapshot; targets are written
    /// only inside the tile's own rectangle, which partitions shadow
    /// ownership across tiles without coordination.
    fn cast_shadows(
        &self,
        ctx: &TileContext<'_>,
        geom: &ShadowGeometryView<'_>,
        window: &FlagImage,
        out: &mut FlagImage,
        cancel: Option<&AtomicBool>,
    ) -> PixResult<()> {
        let (wrows, wcols) = window.dim();
        let (trows, tcols) = ctx.tile_shape;
        let mut cast = 0usize;

        for row in 0..wrows {
            check_cancelled(cancel)?;
            for col in 0..wcols {
                if !flags::has(window[[row, col]], flags::CLOUD) {
                    continue;
                }
                let ctp = geom.cloud_top_pressure[[row, col]];
                if ctp.is_nan() {
                    continue;
                }
                let cloud_pos = match ctx.geocoding.pixel_to_geo(col as f64, row as f64) {
                    Some(pos) => pos,
                    None => continue,
                };
                let query = ShadowQuery {
                    cloud_pos,
                    sun_zenith: geom.sun_zenith[[row, col]] as f64,
                    sun_azimuth: geom.sun_azimuth[[row, col]] as f64,
                    view_zenith: geom.view_zenith[[row, col]] as f64,
                    view_azimuth: geom.view_azimuth[[row, col]] as f64,
                    cloud_height: height_from_pressure(ctp as f64),
                };
                // No shadow attributable is a normal outcome, not an error.
                let shadow_pos = match shadow::locate(&query, ctx.dem) {
                    Some(pos) => pos,
                    None => continue,
                };
                let (sx, sy) = match ctx.geocoding.geo_to_pixel(shadow_pos) {
                    Some(p) => p,
                    None => continue,
                };
                let (sr, sc) = (sy.round() as i64, sx.round() as i64);
                let (tr, tc) = (sr - ctx.halo.0 as i64, sc - ctx.halo.1 as i64);
                if tr < 0 || tc < 0 || tr as usize >= trows || tc as usize >= tcols {
                    continue; // outside this tile's own rectangle
                }
                if sr as usize >= wrows || sc as usize >= wcols {
                    continue;
                }
                if flags::has(window[[sr as usize, sc as usize]], flags::CLOUD) {
                    continue;
                }
                out[[tr as usize, tc as usize]] |= flags::CLOUD_SHADOW;
                cast += 1;
            }
        }
        log::debug!("Cast {} cloud shadows", cast);
        Ok(())
    }
}

fn check_cancelled(cancel: Option<&AtomicBool>) -> PixResult<()> {
    match cancel {
        Some(token) if token.load(Ordering::Relaxed) => Err(PixError::Cancelled),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::geocoding::{AffineGeocoding, DemWindow};
    use ndarray::Array2;

    fn plain_context<'a>(
        source: &'a FlagImage,
        halo: usize,
        tile_shape: (usize, usize),
        geocoding: &'a AffineGeocoding,
        dem: &'a DemWindow,
    ) -> TileContext<'a> {
        TileContext {
            source_flags: source.view(),
            halo: (halo, halo),
            tile_shape,
            water_fraction: None,
            geocoding,
            dem,
            shadow_geometry: None,
        }
    }

    fn fixtures(size: usize) -> (AffineGeocoding, DemWindow) {
        let gc = AffineGeocoding::new(50.0, 10.0, 0.01, size, size);
        let dem = DemWindow::flat(size * 2, size * 2, 51.0, 9.0, 0.01, 0.0);
        (gc, dem)
    }

    #[test]
    fn test_buffer_growth_chebyshev_exact() {
        let (gc, dem) = fixtures(9);
        for width in [0usize, 1, 2, 5] {
            let mut source = FlagImage::zeros((9, 9));
            source[[4, 4]] |= flags::CLOUD;
            let ctx = plain_context(&source, 0, (9, 9), &gc, &dem);
            let consolidator = TileConsolidator::new(ConsolidationConfig {
                cloud_buffer_width: width,
                cast_shadows: false,
                ..Default::default()
            });
            let out = consolidator.consolidate(&ctx, None).unwrap();
            for ((row, col), word) in out.indexed_iter() {
                let dist = (row as i64 - 4).abs().max((col as i64 - 4).abs()) as usize;
                assert_eq!(
                    flags::has(*word, flags::CLOUD_BUFFER),
                    dist <= width,
                    "width {} pixel ({},{})",
                    width,
                    row,
                    col
                );
            }
        }
    }

    #[test]
    fn test_buffer_skips_invalid_pixels() {
        let (gc, dem) = fixtures(5);
        let mut source = FlagImage::zeros((5, 5));
        source[[2, 2]] |= flags::CLOUD;
        source[[2, 3]] |= flags::INVALID;
        let ctx = plain_context(&source, 0, (5, 5), &gc, &dem);
        let out = TileConsolidator::new(ConsolidationConfig {
            cast_shadows: false,
            ..Default::default()
        })
        .consolidate(&ctx, None)
        .unwrap();
        assert!(!flags::has(out[[2, 3]], flags::CLOUD_BUFFER));
        assert!(flags::has(out[[2, 1]], flags::CLOUD_BUFFER));
    }

    #[test]
    fn test_buffer_does_not_propagate_transitively() {
        let (gc, dem) = fixtures(9);
        let mut source = FlagImage::zeros((9, 9));
        source[[0, 0]] |= flags::CLOUD;
        let ctx = plain_context(&source, 0, (9, 9), &gc, &dem);
        let out = TileConsolidator::new(ConsolidationConfig {
            cloud_buffer_width: 1,
            cast_shadows: false,
            ..Default::default()
        })
        .consolidate(&ctx, None)
        .unwrap();
        // Distance 2 from the only cloud: would only be buffered if the
        // dilation fed on freshly buffered pixels.
        assert!(!flags::has(out[[0, 2]], flags::CLOUD_BUFFER));
        assert!(flags::has(out[[1, 1]], flags::CLOUD_BUFFER));
    }

    #[test]
    fn test_buffer_sources_in_halo() {
        let (gc, dem) = fixtures(7);
        let mut source = FlagImage::zeros((7, 7));
        // Cloud in the halo, one pixel left of the tile rectangle.
        source[[3, 1]] |= flags::CLOUD;
        let ctx = plain_context(&source, 2, (3, 3), &gc, &dem);
        let out = TileConsolidator::new(ConsolidationConfig {
            cloud_buffer_width: 2,
            cast_shadows: false,
            ..Default::default()
        })
        .consolidate(&ctx, None)
        .unwrap();
        // Tile pixel (1,0) is window pixel (3,2): Chebyshev distance 1.
        assert!(flags::has(out[[1, 0]], flags::CLOUD_BUFFER));
        assert!(!flags::has(out[[1, 2]], flags::CLOUD_BUFFER));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut dst = FlagImage::zeros((3, 3));
        let mut src = FlagImage::zeros((3, 3));
        src[[1, 1]] = flags::CLOUD | flags::BRIGHT;
        merge_flags(&mut dst, &src).unwrap();
        let once = dst.clone();
        merge_flags(&mut dst, &src).unwrap();
        assert_eq!(dst, once);
    }

    #[test]
    fn test_merge_shape_mismatch_fails() {
        let mut dst = FlagImage::zeros((3, 3));
        let src = FlagImage::zeros((2, 3));
        assert!(merge_flags(&mut dst, &src).is_err());
    }

    #[test]
    fn test_coastline_cloud_without_support_is_cleared() {
        let (gc, dem) = fixtures(5);
        let mut source = FlagImage::zeros((5, 5));
        source[[2, 2]] |= flags::CLOUD | flags::CLOUD_SURE;
        // Water fraction edge through the middle: everything on it is
        // coastline-adjacent.
        let mut wf = Array2::from_elem((5, 5), 0u8);
        for row in 0..5 {
            for col in 3..5 {
                wf[[row, col]] = 100;
            }
        }
        let mut ctx = plain_context(&source, 0, (5, 5), &gc, &dem);
        ctx.water_fraction = Some(wf.view());
        let out = TileConsolidator::new(ConsolidationConfig {
            cast_shadows: false,
            ..Default::default()
        })
        .consolidate(&ctx, None)
        .unwrap();
        assert!(flags::has(out[[2, 2]], flags::COASTLINE));
        assert!(!flags::has(out[[2, 2]], flags::CLOUD));
        assert!(!flags::has(out[[2, 2]], flags::CLOUD_SURE));
        assert!(!flags::has(out[[2, 2]], flags::CLOUD_AMBIGUOUS));
        // No cloud left, so no buffer either.
        assert!(!flags::has(out[[2, 1]], flags::CLOUD_BUFFER));
    }

    #[test]
    fn test_coastline_cloud_with_independent_neighbor_survives() {
        let (gc, dem) = fixtures(7);
        let mut source = FlagImage::zeros((7, 7));
        source[[3, 2]] |= flags::CLOUD;
        // Independent cloud away from the coastline edge.
        source[[3, 1]] |= flags::CLOUD;
        let mut wf = Array2::from_elem((7, 7), 0u8);
        for row in 0..7 {
            for col in 3..7 {
                wf[[row, col]] = 100;
            }
        }
        let mut ctx = plain_context(&source, 0, (7, 7), &gc, &dem);
        ctx.water_fraction = Some(wf.view());
        let out = TileConsolidator::new(ConsolidationConfig {
            cast_shadows: false,
            ..Default::default()
        })
        .consolidate(&ctx, None)
        .unwrap();
        assert!(flags::has(out[[3, 2]], flags::CLOUD));
    }

    #[test]
    fn test_coastline_clears_snow() {
        let (gc, dem) = fixtures(5);
        let mut source = FlagImage::zeros((5, 5));
        source[[2, 2]] |= flags::CLEAR_SNOW;
        source[[4, 4]] |= flags::CLEAR_SNOW;
        let mut wf = Array2::from_elem((5, 5), 0u8);
        wf[[2, 3]] = 60;
        let mut ctx = plain_context(&source, 0, (5, 5), &gc, &dem);
        ctx.water_fraction = Some(wf.view());
        let out = TileConsolidator::new(ConsolidationConfig {
            cast_shadows: false,
            ..Default::default()
        })
        .consolidate(&ctx, None)
        .unwrap();
        assert!(!flags::has(out[[2, 2]], flags::CLEAR_SNOW));
        // Snow away from the coastline is untouched.
        assert!(flags::has(out[[4, 4]], flags::CLEAR_SNOW));
        // The genuinely mixed pixel is marked.
        assert!(flags::has(out[[2, 3]], flags::MIXED_PIXEL));
    }

    #[test]
    fn test_cloud_excludes_clear_after_consolidation() {
        let (gc, dem) = fixtures(5);
        let mut source = FlagImage::zeros((5, 5));
        source[[1, 1]] = flags::CLOUD | flags::CLOUD_SURE | flags::CLEAR_LAND | flags::CLEAR_WATER;
        let ctx = plain_context(&source, 0, (5, 5), &gc, &dem);
        let out = TileConsolidator::new(ConsolidationConfig {
            cast_shadows: false,
            ..Default::default()
        })
        .consolidate(&ctx, None)
        .unwrap();
        assert!(flags::has(out[[1, 1]], flags::CLOUD));
        assert_eq!(out[[1, 1]] & flags::CLEAR_MASK, 0);
    }

    #[test]
    fn test_cancellation_between_scanlines() {
        let (gc, dem) = fixtures(5);
        let source = FlagImage::zeros((5, 5));
        let ctx = plain_context(&source, 0, (5, 5), &gc, &dem);
        let cancel = AtomicBool::new(true);
        let err = TileConsolidator::new(ConsolidationConfig::default())
            .consolidate(&ctx, Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, PixError::Cancelled));
    }
}
