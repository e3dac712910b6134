//! Single-pass raster synthesis from the extended grid
//!
//! One walk over every cell produces four co-registered buffers: RGBA8
//! albedo, R8 quantized height, RGB8 tangent-space normals derived from the
//! height gradient, and an R8 mountain-influence mask. Statistics are
//! accumulated in the same pass. Buffers are resized once to power-of-two
//! dimensions when the grid is not already compliant.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::stats::{BuildStats, StatsAccumulator};
use crate::grid::ExtendedGrid;
use crate::terrain::classify::{Classification, MISSING_ENTRY_COLOR};
use crate::terrain::height::{is_mountainous, normalized_height};

/// Pixel format of one raster buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    R8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::R8 => 1,
        }
    }
}

/// Tightly packed row-major pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RasterBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }

    pub fn put(&mut self, x: u32, y: u32, px: &[u8]) {
        let o = self.offset(x, y);
        self.data[o..o + px.len()].copy_from_slice(px);
    }

    pub fn get(&self, x: u32, y: u32) -> &[u8] {
        let o = self.offset(x, y);
        &self.data[o..o + self.format.bytes_per_pixel()]
    }

    /// Sample with longitude wraparound in x and pole clamping in y.
    pub fn sample_wrapped(&self, x: i64, y: i64) -> &[u8] {
        let x = x.rem_euclid(i64::from(self.width)) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        self.get(x, y)
    }

    /// Nearest-neighbor resize. Deterministic; used once per build to reach
    /// GPU-compliant dimensions.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut out = Self::new(width, height, self.format);
        for y in 0..height {
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(height)) as u32;
            for x in 0..width {
                let sx = (u64::from(x) * u64::from(self.width) / u64::from(width)) as u32;
                let px = self.get(sx, sy);
                let o = out.offset(x, y);
                out.data[o..o + px.len()].copy_from_slice(px);
            }
        }
        out
    }
}

/// Texture wrap intent recorded for consumers: repeat across the date line,
/// clamp at the poles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    Repeat,
    Clamp,
}

/// Parameters controlling raster synthesis
#[derive(Clone, Debug)]
pub struct SynthParams {
    /// Gradient scale for the derived normal map
    pub normal_strength: f32,
    /// Box-smoothing radius (cells) for the mountain-influence mask
    pub mountain_radius: u32,
    /// Normalized height at or above which a cell counts as a peak
    pub peak_threshold: f32,
    /// Resize buffers to power-of-two dimensions when needed
    pub pad_to_pow2: bool,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            normal_strength: 2.0,
            mountain_radius: 2,
            peak_threshold: 0.9,
            pad_to_pow2: true,
        }
    }
}

/// The four co-registered buffers plus build statistics. Immutable after
/// synthesis.
#[derive(Debug, Clone)]
pub struct RasterSet {
    pub color: RasterBuffer,
    pub height: RasterBuffer,
    pub normal: RasterBuffer,
    pub mountain_mask: RasterBuffer,
    pub stats: BuildStats,
    pub wrap_x: WrapMode,
    pub wrap_y: WrapMode,
    /// Grid dimensions before any power-of-two resize
    pub grid_size: (u32, u32),
}

impl RasterSet {
    /// Replace the height buffer with a refined one (same dimensions) and
    /// re-derive the normal map from it, keeping the set co-registered.
    pub fn with_refined_height(mut self, height: RasterBuffer, normal_strength: f32) -> Self {
        debug_assert_eq!((height.width, height.height), (self.height.width, self.height.height));
        self.normal = derive_normals(&height, normal_strength);
        self.height = height;
        self
    }
}

/// Quantize a normalized height to 8 bits with rounding.
pub fn quantize_height(h: f32) -> u8 {
    (h.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Walk the extended grid once and synthesize all four rasters.
pub fn synthesize(
    grid: &ExtendedGrid,
    classification: &Classification,
    params: &SynthParams,
) -> RasterSet {
    let w = grid.width() as u32;
    let h = grid.height() as u32;
    let cells = w as usize * h as usize;

    let mut color = RasterBuffer::new(w, h, PixelFormat::Rgba8);
    let mut height = RasterBuffer::new(w, h, PixelFormat::R8);
    let mut mountain_indicator = vec![0.0f32; cells];
    let mut acc = StatsAccumulator::default();

    for y in 0..h {
        for x in 0..w {
            let token = grid.token_at(x as usize, y as usize);
            let is_water = classification.is_water(token);
            let entry = classification.lookup.get(token);

            let rgb = if is_water {
                classification
                    .palette
                    .color_of(token)
                    .unwrap_or_else(|| classification.palette.primary_color())
            } else {
                entry
                    .and_then(|e| crate::terrain::Rgb::parse(&e.color))
                    .unwrap_or(MISSING_ENTRY_COLOR)
            };

            let h01 = normalized_height(entry, is_water);
            let q = quantize_height(h01);
            color.put(x, y, &[rgb.r, rgb.g, rgb.b, 0xff]);
            height.put(x, y, &[q]);

            if is_mountainous(entry, is_water) {
                mountain_indicator[y as usize * w as usize + x as usize] = 1.0;
            }

            if is_water {
                acc.record_water();
            } else {
                acc.record_land(h01, h01 >= params.peak_threshold, entry.is_none());
            }
        }
    }

    let normal = derive_normals(&height, params.normal_strength);
    let (mountain_mask, coverage) =
        smooth_mountain_mask(&mountain_indicator, w, h, params.mountain_radius);
    let stats = acc.finish(coverage);

    let (tw, th) = if params.pad_to_pow2 {
        (next_pow2(w), next_pow2(h))
    } else {
        (w, h)
    };
    if (tw, th) != (w, h) {
        log::info!(
            "padding rasters {}x{} -> {}x{} for GPU compliance",
            w, h, tw, th
        );
    }

    RasterSet {
        color: color.resized(tw, th),
        height: height.resized(tw, th),
        normal: normal.resized(tw, th),
        mountain_mask: mountain_mask.resized(tw, th),
        stats,
        wrap_x: WrapMode::Repeat,
        wrap_y: WrapMode::Clamp,
        grid_size: (w, h),
    }
}

/// Central-difference gradient of the height buffer, encoded as a
/// tangent-space RGB8 normal. X wraps (longitude), y clamps (poles).
fn derive_normals(height: &RasterBuffer, strength: f32) -> RasterBuffer {
    let mut normal = RasterBuffer::new(height.width, height.height, PixelFormat::Rgb8);
    for y in 0..height.height {
        for x in 0..height.width {
            let xl = height.sample_wrapped(i64::from(x) - 1, i64::from(y))[0] as f32 / 255.0;
            let xr = height.sample_wrapped(i64::from(x) + 1, i64::from(y))[0] as f32 / 255.0;
            let yd = height.sample_wrapped(i64::from(x), i64::from(y) - 1)[0] as f32 / 255.0;
            let yu = height.sample_wrapped(i64::from(x), i64::from(y) + 1)[0] as f32 / 255.0;

            let n = Vec3::new(
                (xl - xr) * strength * 0.5,
                (yd - yu) * strength * 0.5,
                1.0,
            )
            .normalize();

            let encode = |v: f32| ((v * 0.5 + 0.5) * 255.0).round().clamp(0.0, 255.0) as u8;
            normal.put(x, y, &[encode(n.x), encode(n.y), encode(n.z)]);
        }
    }
    normal
}

/// Box-smooth the mountain indicator into an R8 mask. Returns the mask and
/// its coverage ratio (fraction of cells with any influence).
fn smooth_mountain_mask(
    indicator: &[f32],
    w: u32,
    h: u32,
    radius: u32,
) -> (RasterBuffer, f32) {
    let mut mask = RasterBuffer::new(w, h, PixelFormat::R8);
    let r = i64::from(radius);
    let window = ((2 * r + 1) * (2 * r + 1)) as f32;
    let mut touched = 0u64;

    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0f32;
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (i64::from(x) + dx).rem_euclid(i64::from(w)) as usize;
                    let sy = (i64::from(y) + dy).clamp(0, i64::from(h) - 1) as usize;
                    sum += indicator[sy * w as usize + sx];
                }
            }
            let v = (sum / window * 255.0).round().clamp(0.0, 255.0) as u8;
            if v > 0 {
                touched += 1;
            }
            mask.put(x, y, &[v]);
        }
    }

    let coverage = touched as f32 / (w as u64 * h as u64) as f32;
    (mask, coverage)
}

fn next_pow2(v: u32) -> u32 {
    v.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::terrain::Classification;

    const TABLE: &str = r##"{
        "1": {"color": "#ff0000", "description": "mountain"},
        "2": {"color": "#00ff00"},
        "3": {"color": "#0000ff", "height": 0.5},
        "4": {"color": "#113355", "description": "sea"}
    }"##;

    fn fixture() -> (ExtendedGrid, Classification) {
        let (grid, _) = Grid::parse("4x3\n1122\n1133\n2244\n").unwrap();
        let class = Classification::from_sources(
            Some(TABLE),
            Some(r#"{"water": ["4"]}"#),
            None,
        );
        let ext = ExtendedGrid::extend(grid, Some(class.primary_water()), 1).unwrap();
        (ext, class)
    }

    fn no_pad() -> SynthParams {
        SynthParams {
            pad_to_pow2: false,
            ..SynthParams::default()
        }
    }

    #[test]
    fn buffers_are_co_registered() {
        let (ext, class) = fixture();
        let set = synthesize(&ext, &class, &no_pad());
        assert_eq!(set.color.width, 4);
        assert_eq!(set.color.height, 5);
        assert_eq!(set.height.byte_size(), 4 * 5);
        assert_eq!(set.normal.byte_size(), 4 * 5 * 3);
        assert_eq!(set.mountain_mask.byte_size(), 4 * 5);
    }

    #[test]
    fn water_cells_quantize_to_zero() {
        let (ext, class) = fixture();
        let set = synthesize(&ext, &class, &no_pad());
        // Pole rows are all water.
        for x in 0..4 {
            assert_eq!(set.height.get(x, 0)[0], 0);
            assert_eq!(set.height.get(x, 4)[0], 0);
        }
        // '4' cells inside the map are water too (row 1 = source row "2244").
        assert_eq!(set.height.get(2, 1)[0], 0);
        assert_eq!(set.height.get(3, 1)[0], 0);
    }

    #[test]
    fn explicit_height_hint_quantizes_with_rounding() {
        let (ext, class) = fixture();
        let set = synthesize(&ext, &class, &no_pad());
        // '3' has height 0.5 -> round(127.5) = 128. Row 2 = "1133".
        assert_eq!(set.height.get(2, 2)[0], 128);
    }

    #[test]
    fn quantization_round_trip_is_stable() {
        for q in 0..=255u8 {
            let decoded = q as f32 / 255.0;
            assert_eq!(quantize_height(decoded), q);
        }
    }

    #[test]
    fn missing_entry_gets_sentinel_and_counts() {
        let (grid, _) = Grid::parse("1z\nzz\n").unwrap();
        let class = Classification::from_sources(
            Some(TABLE),
            Some(r#"{"water": ["4"]}"#),
            None,
        );
        let ext = ExtendedGrid::extend(grid, Some('4'), 1).unwrap();
        let set = synthesize(&ext, &class, &no_pad());
        assert_eq!(set.stats.missing_entries, 3);
        // 'z' cell in row 1 (source bottom row "zz").
        let px = set.color.get(0, 1);
        assert_eq!(&px[..3], &[0xff, 0x00, 0xff]);
        assert_eq!(px[3], 0xff);
    }

    #[test]
    fn stats_cover_land_only_heights() {
        let (ext, class) = fixture();
        let set = synthesize(&ext, &class, &no_pad());
        let s = &set.stats;
        // Land heights present: mountain (1.0? no — keyword mountain = 0.82),
        // plain 0.18, explicit 0.5.
        assert!(s.min_height > 0.0);
        assert!(s.max_height <= 1.0);
        assert!(s.avg_height >= s.min_height && s.avg_height <= s.max_height);
        // 20 cells total: 8 pole water + 2 map water ('44'), 10 land.
        assert!((s.land_ratio - 0.5).abs() < 1e-6);
        assert!((s.water_ratio - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mountain_mask_spreads_around_mountain_cells() {
        let (ext, class) = fixture();
        let set = synthesize(&ext, &class, &no_pad());
        // '1' cells are mountains (rows 2 and 3); the smoothed mask must be
        // nonzero there and zero far away is not guaranteed on a 4x5 grid,
        // but coverage must be nonzero.
        assert!(set.mountain_mask.get(0, 2)[0] > 0);
        assert!(set.stats.mountain_coverage > 0.0);
    }

    #[test]
    fn pads_to_power_of_two() {
        let (ext, class) = fixture();
        let set = synthesize(&ext, &class, &SynthParams::default());
        assert_eq!((set.color.width, set.color.height), (4, 8));
        assert_eq!(set.grid_size, (4, 5));
        assert_eq!(set.wrap_x, WrapMode::Repeat);
        assert_eq!(set.wrap_y, WrapMode::Clamp);
    }

    #[test]
    fn normals_are_unit_biased_encoding() {
        let (ext, class) = fixture();
        let set = synthesize(&ext, &class, &no_pad());
        // Flat water column (x=2 is water in rows 0 and 1): normal points
        // straight up -> (128, 128, 255).
        let n = set.normal.get(2, 0);
        assert_eq!(n[0], 128);
        assert_eq!(n[1], 128);
        assert_eq!(n[2], 255);
    }

    #[test]
    fn synthesis_is_deterministic() {
        let (ext, class) = fixture();
        let a = synthesize(&ext, &class, &SynthParams::default());
        let b = synthesize(&ext, &class, &SynthParams::default());
        assert_eq!(a.color.data, b.color.data);
        assert_eq!(a.height.data, b.height.data);
        assert_eq!(a.normal.data, b.normal.data);
        assert_eq!(a.mountain_mask.data, b.mountain_mask.data);
        assert_eq!(a.stats, b.stats);
    }
}
