//! Terratex - procedural terrain-texture and progressive-LOD asset pipeline

pub mod core;
pub mod grid;
pub mod terrain;
pub mod raster;
pub mod relief;
pub mod manifest;
pub mod tier;
