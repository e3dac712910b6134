//! Pipeline configuration
//!
//! One explicit config struct threaded through every component call.
//! Builds and loads are pure functions of their inputs; there is no
//! process-wide "active preset" state.

use crate::raster::SynthParams;
use crate::relief::ReliefParams;

/// Parameters controlling one full build of the texture set
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Quality preset id (participates in the cache key)
    pub preset: String,
    /// Color palette id (participates in the cache key)
    pub palette: String,
    /// Detail-tile UV scale (participates in the cache key)
    pub tile_scale: f32,
    /// Synthetic water rows prepended and appended per pole (>= 1)
    pub pole_padding: usize,
    /// Raster synthesis parameters
    pub synth: SynthParams,
    /// Relief pass parameters
    pub relief: ReliefParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preset: "medium".to_string(),
            palette: "classic".to_string(),
            tile_scale: 8.0,
            pole_padding: 2,
            synth: SynthParams::default(),
            relief: ReliefParams::default(),
        }
    }
}
