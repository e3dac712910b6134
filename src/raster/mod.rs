//! Raster synthesis from classified grids

pub mod stats;
pub mod synth;

pub use stats::BuildStats;
pub use synth::{
    quantize_height, synthesize, PixelFormat, RasterBuffer, RasterSet, SynthParams, WrapMode,
};
