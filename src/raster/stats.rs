//! Build-time statistics accumulated during raster synthesis

use serde::{Deserialize, Serialize};

/// Statistics for one synthesized raster set.
///
/// Height aggregates cover land cells only; ratios are over all cells of the
/// extended grid. `missing_entries` counts every occurrence of a land token
/// with no terrain-table entry — a data-quality signal, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub min_height: f32,
    pub max_height: f32,
    pub avg_height: f32,
    pub land_ratio: f32,
    pub water_ratio: f32,
    pub peak_ratio: f32,
    pub mountain_coverage: f32,
    pub missing_entries: u32,
}

impl Default for BuildStats {
    fn default() -> Self {
        Self {
            min_height: 0.0,
            max_height: 0.0,
            avg_height: 0.0,
            land_ratio: 0.0,
            water_ratio: 1.0,
            peak_ratio: 0.0,
            mountain_coverage: 0.0,
            missing_entries: 0,
        }
    }
}

/// Running accumulator folded over every cell in the synthesis pass.
#[derive(Debug, Default)]
pub(crate) struct StatsAccumulator {
    land_cells: u64,
    water_cells: u64,
    peak_cells: u64,
    missing_entries: u32,
    height_sum: f64,
    min_height: Option<f32>,
    max_height: Option<f32>,
}

impl StatsAccumulator {
    pub fn record_water(&mut self) {
        self.water_cells += 1;
    }

    pub fn record_land(&mut self, height: f32, is_peak: bool, missing_entry: bool) {
        self.land_cells += 1;
        self.height_sum += f64::from(height);
        self.min_height = Some(self.min_height.map_or(height, |m| m.min(height)));
        self.max_height = Some(self.max_height.map_or(height, |m| m.max(height)));
        if is_peak {
            self.peak_cells += 1;
        }
        if missing_entry {
            self.missing_entries += 1;
        }
    }

    pub fn finish(self, mountain_coverage: f32) -> BuildStats {
        let total = (self.land_cells + self.water_cells) as f64;
        let avg = if self.land_cells > 0 {
            (self.height_sum / self.land_cells as f64) as f32
        } else {
            0.0
        };
        BuildStats {
            min_height: self.min_height.unwrap_or(0.0),
            max_height: self.max_height.unwrap_or(0.0),
            avg_height: avg,
            land_ratio: (self.land_cells as f64 / total) as f32,
            water_ratio: (self.water_cells as f64 / total) as f32,
            peak_ratio: (self.peak_cells as f64 / total) as f32,
            mountain_coverage,
            missing_entries: self.missing_entries,
        }
    }
}
