//! Manifest wire format
//!
//! The manifest is a JSON document describing a content-addressed set of
//! binary raster assets. All asset paths are relative to the manifest's own
//! location so an output tree stays relocatable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::raster::{BuildStats, PixelFormat, WrapMode};

/// Names of the four required core textures, in manifest key order.
pub const CORE_TEXTURES: [&str; 4] = ["color", "height", "normal", "mountainMask"];

/// One raster asset: format, layout, integrity data and an optional explicit
/// mip chain. When `mips` is present it is ordered from level 0 down and
/// level 0 duplicates `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureEntry {
    pub path: String,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub wrap_x: WrapMode,
    pub wrap_y: WrapMode,
    pub filter: FilterMode,
    pub byte_size: u64,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mips: Option<Vec<MipLevel>>,
}

/// One level of an explicit mip chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MipLevel {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub sha256: String,
}

/// Sampling filter intent recorded for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Linear,
    Nearest,
}

/// Compressed-container variant of a logical texture. Always advertised
/// alongside a raw entry, never instead of one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedEntry {
    pub path: String,
    /// Container codec identifier (currently always `"lz4"`)
    pub codec: String,
    pub byte_size: u64,
    pub sha256: String,
}

/// One albedo+normal pair of a detail tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailVariant {
    pub albedo: DetailAsset,
    pub normal: DetailAsset,
}

/// A detail-tile sub-asset with the same compressed/raw duality as core
/// textures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailAsset {
    pub raw: TextureEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed: Option<CompressedEntry>,
}

/// A named detail tile: one or more albedo+normal variant pairs blended into
/// base terrain shading near specific features.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailTile {
    pub variants: Vec<DetailVariant>,
}

/// Provenance of the source map this set was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    /// Map source identity (URL or path) as given to the build
    pub map: String,
    /// Extended-grid width, before the power-of-two resize
    pub width: u32,
    /// Extended-grid height (pole rows included), before the power-of-two
    /// resize
    pub height: u32,
}

/// Root manifest document. Immutable once written; identified by the
/// content-addressed `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureManifest {
    /// Content-addressed cache key over the build inputs
    pub id: String,
    pub preset: String,
    pub palette: String,
    pub source: SourceInfo,
    /// Informational only; never part of the cache key
    pub generated_at: String,
    pub textures: BTreeMap<String, TextureEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub compressed: BTreeMap<String, CompressedEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detail_tiles: BTreeMap<String, DetailTile>,
    pub stats: BuildStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let entry = TextureEntry {
            path: "height.bin".to_string(),
            format: PixelFormat::R8,
            width: 8,
            height: 8,
            wrap_x: WrapMode::Repeat,
            wrap_y: WrapMode::Clamp,
            filter: FilterMode::Linear,
            byte_size: 64,
            sha256: "ab".repeat(32),
            mips: None,
        };
        let manifest = TextureManifest {
            id: "deadbeef00112233".to_string(),
            preset: "medium".to_string(),
            palette: "classic".to_string(),
            source: SourceInfo {
                map: "maps/world.txt".to_string(),
                width: 8,
                height: 8,
            },
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            textures: BTreeMap::from([("height".to_string(), entry)]),
            compressed: BTreeMap::new(),
            detail_tiles: BTreeMap::new(),
            stats: BuildStats::default(),
        };

        let json = serde_json::to_string_pretty(&manifest).unwrap();
        assert!(json.contains("\"generatedAt\""));
        assert!(json.contains("\"byteSize\""));
        let back: TextureManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, manifest.id);
        assert_eq!(back.textures["height"].path, "height.bin");
    }

    #[test]
    fn unknown_optional_sections_default_empty() {
        let json = r##"{
            "id": "k", "preset": "p", "palette": "c",
            "source": {"map": "m", "width": 1, "height": 1},
            "generatedAt": "t",
            "textures": {},
            "stats": {
                "minHeight": 0.0, "maxHeight": 0.0, "avgHeight": 0.0,
                "landRatio": 0.0, "waterRatio": 1.0, "peakRatio": 0.0,
                "mountainCoverage": 0.0, "missingEntries": 0
            }
        }"##;
        let m: TextureManifest = serde_json::from_str(json).unwrap();
        assert!(m.compressed.is_empty());
        assert!(m.detail_tiles.is_empty());
    }
}
