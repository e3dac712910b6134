//! Terrain classification: token tables, water palette, height classes

pub mod classify;
pub mod height;

pub use classify::{Classification, Rgb, TerrainEntry, TerrainLookup, WaterPalette};
pub use height::HeightClass;
