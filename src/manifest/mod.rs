//! Content-addressed texture manifests: build-time writer, runtime loader

pub mod builder;
pub mod loader;
pub mod model;

pub use builder::{build, build_mip_chain, cache_key, purge, BuildOutcome};
pub use loader::{
    load_manifest_textures, LoadedDetailVariant, LoadedTexture, LoadedTextureSet, LoaderOptions,
};
pub use model::{
    CompressedEntry, DetailAsset, DetailTile, DetailVariant, FilterMode, MipLevel, SourceInfo,
    TextureEntry, TextureManifest, CORE_TEXTURES,
};
