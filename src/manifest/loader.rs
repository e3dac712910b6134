//! Runtime manifest loading with compressed/raw fallback
//!
//! All asset paths resolve relative to the manifest's own location. Per
//! texture the loader tries the compressed container first (when present,
//! preferred and supported) and falls back to the raw mip chain on any
//! failure; compressed failures degrade, they never propagate. Only two
//! things are fatal: the manifest document itself being unreadable, and a
//! required core texture with no usable source at all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::task::JoinSet;

use super::builder::sha256_hex;
use super::model::{CompressedEntry, DetailAsset, TextureEntry, TextureManifest, CORE_TEXTURES};
use crate::core::error::{Error, Result};
use crate::raster::{PixelFormat, WrapMode};

/// Loader behavior switches.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Attempt compressed containers before raw entries
    pub prefer_compressed: bool,
    /// Capability probe result for the compressed container codec
    pub compressed_supported: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            prefer_compressed: true,
            compressed_supported: true,
        }
    }
}

/// One loaded texture with its explicit mip chain, level 0 first.
#[derive(Debug, Clone)]
pub struct LoadedTexture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub wrap_x: WrapMode,
    pub wrap_y: WrapMode,
    pub mips: Vec<Vec<u8>>,
    pub from_compressed: bool,
}

impl LoadedTexture {
    pub fn byte_size(&self) -> u64 {
        self.mips.iter().map(|m| m.len() as u64).sum()
    }

    /// Create a GPU texture with the explicit mip chain supplied level by
    /// level. Mipmaps are never regenerated on the GPU, so LOD content stays
    /// bit-exact. RGB8 data is expanded to RGBA8 since wgpu has no
    /// three-channel 8-bit format.
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> wgpu::Texture {
        let (wgpu_format, bpp) = match self.format {
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => (wgpu::TextureFormat::Rgba8Unorm, 4),
            PixelFormat::R8 => (wgpu::TextureFormat::R8Unorm, 1),
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: self.mips.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, data) in self.mips.iter().enumerate() {
            let w = (self.width >> level).max(1);
            let h = (self.height >> level).max(1);
            let expanded;
            let bytes: &[u8] = if self.format == PixelFormat::Rgb8 {
                expanded = rgb_to_rgba(data);
                &expanded
            } else {
                data
            };
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(w * bpp),
                    rows_per_image: Some(h),
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
        }
        texture
    }
}

fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        out.extend_from_slice(px);
        out.push(0xff);
    }
    out
}

/// A loaded albedo+normal detail variant.
#[derive(Debug, Clone)]
pub struct LoadedDetailVariant {
    pub albedo: LoadedTexture,
    pub normal: LoadedTexture,
}

/// Runtime materialization of one manifest. Superseded, never mutated, on
/// tier upgrade.
#[derive(Debug, Clone)]
pub struct LoadedTextureSet {
    pub manifest_id: String,
    pub textures: HashMap<String, LoadedTexture>,
    pub detail_tiles: HashMap<String, Vec<LoadedDetailVariant>>,
    pub total_bytes: u64,
    pub used_compressed: bool,
}

/// Fetch a manifest and every texture it references.
///
/// Core texture and detail-tile fetches all run concurrently; the result is
/// ready only once each has completed or definitively fallen back.
pub async fn load_manifest_textures(
    manifest_path: &Path,
    opts: &LoaderOptions,
) -> Result<LoadedTextureSet> {
    let text = tokio::fs::read_to_string(manifest_path)
        .await
        .map_err(|e| Error::ManifestFetch(format!("{}: {}", manifest_path.display(), e)))?;
    let manifest: TextureManifest = serde_json::from_str(&text)
        .map_err(|e| Error::ManifestFetch(format!("{}: {}", manifest_path.display(), e)))?;

    // Asset paths are relative to the manifest, not the working directory.
    let base = manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut core_tasks: JoinSet<(String, Result<LoadedTexture>)> = JoinSet::new();
    for name in CORE_TEXTURES {
        let Some(entry) = manifest.textures.get(name) else {
            return Err(Error::Asset(name.to_string()));
        };
        let entry = entry.clone();
        let compressed = manifest.compressed.get(name).cloned();
        let base = base.clone();
        let opts = opts.clone();
        let name = name.to_string();
        core_tasks.spawn(async move {
            let result = load_texture(&base, &name, &entry, compressed.as_ref(), &opts).await;
            (name, result)
        });
    }

    let mut tile_tasks: JoinSet<(String, usize, Option<LoadedDetailVariant>)> = JoinSet::new();
    for (tile_name, tile) in &manifest.detail_tiles {
        for (index, variant) in tile.variants.iter().enumerate() {
            let albedo = variant.albedo.clone();
            let normal = variant.normal.clone();
            let base = base.clone();
            let opts = opts.clone();
            let tile_name = tile_name.clone();
            tile_tasks.spawn(async move {
                let loaded = load_detail_variant(&base, &tile_name, &albedo, &normal, &opts).await;
                (tile_name, index, loaded)
            });
        }
    }

    let mut textures = HashMap::new();
    while let Some(joined) = core_tasks.join_next().await {
        let (name, result) =
            joined.map_err(|e| Error::Asset(format!("loader task panicked: {}", e)))?;
        textures.insert(name, result?);
    }

    // Keep variants ordered as the manifest declared them.
    let mut variants_by_tile: HashMap<String, Vec<(usize, LoadedDetailVariant)>> = HashMap::new();
    while let Some(joined) = tile_tasks.join_next().await {
        let (tile_name, index, loaded) =
            joined.map_err(|e| Error::Asset(format!("loader task panicked: {}", e)))?;
        if let Some(variant) = loaded {
            variants_by_tile
                .entry(tile_name)
                .or_default()
                .push((index, variant));
        }
    }
    let mut detail_tiles = HashMap::new();
    for (tile_name, mut variants) in variants_by_tile {
        variants.sort_by_key(|(index, _)| *index);
        detail_tiles.insert(
            tile_name,
            variants.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
        );
    }
    for tile_name in manifest.detail_tiles.keys() {
        if !detail_tiles.contains_key(tile_name) {
            log::warn!("detail tile '{}' has no usable variants, omitting", tile_name);
        }
    }

    let total_bytes = textures.values().map(LoadedTexture::byte_size).sum::<u64>()
        + detail_tiles
            .values()
            .flatten()
            .map(|v| v.albedo.byte_size() + v.normal.byte_size())
            .sum::<u64>();
    let used_compressed = textures.values().any(|t| t.from_compressed)
        || detail_tiles
            .values()
            .flatten()
            .any(|v| v.albedo.from_compressed || v.normal.from_compressed);

    log::info!(
        "loaded manifest {}: {} textures, {} detail tiles, {} bytes, compressed={}",
        manifest.id,
        textures.len(),
        detail_tiles.len(),
        total_bytes,
        used_compressed
    );

    Ok(LoadedTextureSet {
        manifest_id: manifest.id,
        textures,
        detail_tiles,
        total_bytes,
        used_compressed,
    })
}

/// Load one logical texture: compressed first when eligible, raw otherwise.
/// Compressed failures degrade to raw; raw failure is fatal for the texture.
async fn load_texture(
    base: &Path,
    name: &str,
    entry: &TextureEntry,
    compressed: Option<&CompressedEntry>,
    opts: &LoaderOptions,
) -> Result<LoadedTexture> {
    if let Some(compressed) = compressed {
        if opts.prefer_compressed && opts.compressed_supported {
            match load_compressed(base, entry, compressed).await {
                Ok(mips) => {
                    return Ok(loaded(entry, mips, true));
                }
                Err(e) => {
                    log::warn!(
                        "compressed load of '{}' failed ({}), falling back to raw",
                        name, e
                    );
                }
            }
        }
    }

    match load_raw(base, entry).await {
        Ok(mips) => Ok(loaded(entry, mips, false)),
        Err(e) => {
            log::error!("raw load of '{}' failed: {}", name, e);
            Err(Error::Asset(name.to_string()))
        }
    }
}

fn loaded(entry: &TextureEntry, mips: Vec<Vec<u8>>, from_compressed: bool) -> LoadedTexture {
    LoadedTexture {
        width: entry.width,
        height: entry.height,
        format: entry.format,
        wrap_x: entry.wrap_x,
        wrap_y: entry.wrap_y,
        mips,
        from_compressed,
    }
}

/// Expected per-level byte sizes for an entry, level 0 first.
fn expected_level_sizes(entry: &TextureEntry) -> Vec<usize> {
    let bpp = entry.format.bytes_per_pixel();
    match &entry.mips {
        Some(mips) => mips
            .iter()
            .map(|m| m.width as usize * m.height as usize * bpp)
            .collect(),
        None => vec![entry.width as usize * entry.height as usize * bpp],
    }
}

/// Read and unpack a compressed container into a mip chain. Any mismatch is
/// an error so the caller can fall back to raw.
async fn load_compressed(
    base: &Path,
    entry: &TextureEntry,
    compressed: &CompressedEntry,
) -> std::result::Result<Vec<Vec<u8>>, String> {
    if compressed.codec != "lz4" {
        return Err(format!("unsupported codec '{}'", compressed.codec));
    }
    let path = base.join(&compressed.path);
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    verify_asset(&data, compressed.byte_size, &compressed.sha256, &compressed.path)?;

    let unpacked = lz4_flex::decompress_size_prepended(&data)
        .map_err(|e| format!("{}: {}", compressed.path, e))?;

    let sizes = expected_level_sizes(entry);
    if unpacked.len() != sizes.iter().sum::<usize>() {
        return Err(format!(
            "{}: container holds {} bytes, expected {}",
            compressed.path,
            unpacked.len(),
            sizes.iter().sum::<usize>()
        ));
    }

    let mut mips = Vec::with_capacity(sizes.len());
    let mut offset = 0;
    for size in sizes {
        mips.push(unpacked[offset..offset + size].to_vec());
        offset += size;
    }
    Ok(mips)
}

/// Fetch the raw entry. Declared mip levels are fetched concurrently and
/// assembled in order.
async fn load_raw(
    base: &Path,
    entry: &TextureEntry,
) -> std::result::Result<Vec<Vec<u8>>, String> {
    let levels: Vec<(String, u64, String)> = match &entry.mips {
        Some(mips) => mips
            .iter()
            .map(|m| (m.path.clone(), m.byte_size, m.sha256.clone()))
            .collect(),
        None => vec![(entry.path.clone(), entry.byte_size, entry.sha256.clone())],
    };

    let mut tasks: JoinSet<(usize, std::result::Result<Vec<u8>, String>)> = JoinSet::new();
    for (level, (rel, byte_size, sha256)) in levels.into_iter().enumerate() {
        let path = base.join(&rel);
        tasks.spawn(async move {
            let result = match tokio::fs::read(&path).await {
                Ok(data) => verify_asset(&data, byte_size, &sha256, &rel).map(|_| data),
                Err(e) => Err(format!("{}: {}", path.display(), e)),
            };
            (level, result)
        });
    }

    let mut mips: Vec<Option<Vec<u8>>> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (level, result) = joined.map_err(|e| format!("fetch task panicked: {}", e))?;
        if mips.len() <= level {
            mips.resize(level + 1, None);
        }
        mips[level] = Some(result?);
    }
    // Every level index was spawned exactly once, so a hole here is a bug,
    // not a recoverable condition.
    Ok(mips
        .into_iter()
        .map(|m| m.expect("every spawned mip level joined"))
        .collect())
}

fn verify_asset(
    data: &[u8],
    byte_size: u64,
    sha256: &str,
    what: &str,
) -> std::result::Result<(), String> {
    if data.len() as u64 != byte_size {
        return Err(format!(
            "{}: size mismatch ({} != {})",
            what,
            data.len(),
            byte_size
        ));
    }
    if sha256_hex(data) != sha256 {
        return Err(format!("{}: content hash mismatch", what));
    }
    Ok(())
}

/// Load one detail variant; either sub-asset failing drops the variant.
async fn load_detail_variant(
    base: &Path,
    tile_name: &str,
    albedo: &DetailAsset,
    normal: &DetailAsset,
    opts: &LoaderOptions,
) -> Option<LoadedDetailVariant> {
    let albedo_name = format!("{}:albedo", tile_name);
    let normal_name = format!("{}:normal", tile_name);
    let (albedo, normal) = tokio::join!(
        load_texture(base, &albedo_name, &albedo.raw, albedo.compressed.as_ref(), opts),
        load_texture(base, &normal_name, &normal.raw, normal.compressed.as_ref(), opts),
    );
    match (albedo, normal) {
        (Ok(albedo), Ok(normal)) => Some(LoadedDetailVariant { albedo, normal }),
        (a, n) => {
            for e in [a.err(), n.err()].into_iter().flatten() {
                log::warn!("detail variant of '{}' dropped: {}", tile_name, e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PipelineConfig;
    use crate::grid::{ExtendedGrid, Grid};
    use crate::manifest::builder::{build, BuildOutcome};
    use crate::raster::{synthesize, RasterSet, SynthParams};
    use crate::terrain::Classification;
    use std::fs;

    const TABLE: &str = r##"{
        "1": {"color": "#ff0000", "description": "mountain"},
        "2": {"color": "#00ff00"},
        "4": {"color": "#113355", "description": "sea"}
    }"##;

    fn raster_fixture() -> RasterSet {
        let (grid, _) = Grid::parse("1122\n1122\n2244\n").unwrap();
        let class =
            Classification::from_sources(Some(TABLE), Some(r#"{"water": ["4"]}"#), None);
        let ext = ExtendedGrid::extend(grid, Some('4'), 1).unwrap();
        synthesize(&ext, &class, &SynthParams::default())
    }

    fn build_fixture(dir: &Path) -> PathBuf {
        let set = raster_fixture();
        let outcome = build(&set, &PipelineConfig::default(), "maps/w.txt", dir, false).unwrap();
        match outcome {
            BuildOutcome::Built { manifest_path, .. } => manifest_path,
            BuildOutcome::Skipped { .. } => panic!("fresh dir cannot be a cache hit"),
        }
    }

    #[tokio::test]
    async fn loads_all_core_textures_with_mips() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = build_fixture(dir.path());

        let set = load_manifest_textures(&manifest_path, &LoaderOptions::default())
            .await
            .unwrap();
        assert_eq!(set.textures.len(), 4);
        assert!(set.used_compressed);
        assert!(set.total_bytes > 0);

        let height = &set.textures["height"];
        // 4x5 grid pads to 4x8; chain runs down to 1x1.
        assert_eq!((height.width, height.height), (4, 8));
        assert_eq!(height.mips.len(), 4);
        assert_eq!(height.mips[0].len(), 4 * 8);
        assert_eq!(height.mips.last().unwrap().len(), 1);
    }

    // Plain #[test]: device acquisition blocks on pollster and must not run
    // inside a tokio runtime.
    #[test]
    fn upload_supplies_declared_mip_chain() {
        let Some(ctx) = crate::relief::ReliefContext::headless() else {
            log::warn!("no GPU adapter available, skipping upload test");
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let manifest_path = build_fixture(dir.path());
        let set = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(load_manifest_textures(&manifest_path, &LoaderOptions::default()))
            .unwrap();

        let height = &set.textures["height"];
        let texture = height.upload(&ctx.device, &ctx.queue, "height");
        assert_eq!(texture.mip_level_count(), height.mips.len() as u32);
        assert_eq!(texture.size().width, height.width);
        assert_eq!(texture.size().height, height.height);
        assert_eq!(texture.format(), wgpu::TextureFormat::R8Unorm);

        // RGB8 source expands to a four-channel GPU format.
        let normal = &set.textures["normal"];
        assert_eq!(normal.format, PixelFormat::Rgb8);
        let texture = normal.upload(&ctx.device, &ctx.queue, "normal");
        assert_eq!(texture.mip_level_count(), normal.mips.len() as u32);
        assert_eq!(texture.format(), wgpu::TextureFormat::Rgba8Unorm);
    }

    #[tokio::test]
    async fn compressed_and_raw_agree() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = build_fixture(dir.path());

        let compressed = load_manifest_textures(&manifest_path, &LoaderOptions::default())
            .await
            .unwrap();
        let raw = load_manifest_textures(
            &manifest_path,
            &LoaderOptions {
                prefer_compressed: false,
                compressed_supported: true,
            },
        )
        .await
        .unwrap();

        assert!(compressed.used_compressed);
        assert!(!raw.used_compressed);
        for name in CORE_TEXTURES {
            assert_eq!(compressed.textures[name].mips, raw.textures[name].mips);
        }
    }

    #[tokio::test]
    async fn corrupted_compressed_falls_back_to_raw() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = build_fixture(dir.path());
        let asset_dir = manifest_path.parent().unwrap();

        // Corrupt every compressed container in the tree.
        let manifest: TextureManifest =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        for entry in manifest.compressed.values() {
            fs::write(asset_dir.join(&entry.path), b"garbage").unwrap();
        }
        for tile in manifest.detail_tiles.values() {
            for variant in &tile.variants {
                for asset in [&variant.albedo, &variant.normal] {
                    if let Some(c) = &asset.compressed {
                        fs::write(asset_dir.join(&c.path), b"garbage").unwrap();
                    }
                }
            }
        }

        let set = load_manifest_textures(&manifest_path, &LoaderOptions::default())
            .await
            .unwrap();
        assert!(!set.used_compressed);
        assert_eq!(set.textures.len(), 4);
    }

    #[tokio::test]
    async fn unsupported_compression_uses_raw() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = build_fixture(dir.path());

        let set = load_manifest_textures(
            &manifest_path,
            &LoaderOptions {
                prefer_compressed: true,
                compressed_supported: false,
            },
        )
        .await
        .unwrap();
        assert!(!set.used_compressed);
    }

    #[tokio::test]
    async fn missing_core_raw_with_corrupt_compressed_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = build_fixture(dir.path());
        let asset_dir = manifest_path.parent().unwrap();

        let manifest: TextureManifest =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        fs::write(asset_dir.join(&manifest.compressed["height"].path), b"x").unwrap();
        for mip in manifest.textures["height"].mips.as_ref().unwrap() {
            fs::remove_file(asset_dir.join(&mip.path)).unwrap();
        }

        let err = load_manifest_textures(&manifest_path, &LoaderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Asset(name) if name == "height"));
    }

    #[tokio::test]
    async fn broken_detail_tile_is_omitted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = build_fixture(dir.path());
        let asset_dir = manifest_path.parent().unwrap();

        let manifest: TextureManifest =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        let rock = &manifest.detail_tiles["rock"];
        for variant in &rock.variants {
            for asset in [&variant.albedo, &variant.normal] {
                fs::remove_file(asset_dir.join(&asset.raw.path)).unwrap();
                if let Some(c) = &asset.compressed {
                    fs::remove_file(asset_dir.join(&c.path)).unwrap();
                }
            }
        }

        let set = load_manifest_textures(&manifest_path, &LoaderOptions::default())
            .await
            .unwrap();
        assert!(!set.detail_tiles.contains_key("rock"));
        assert!(set.detail_tiles.contains_key("snow"));
    }

    #[tokio::test]
    async fn asset_paths_resolve_relative_to_manifest() {
        // Manifest in a nested directory; run from elsewhere entirely.
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("generated").join("nested");
        fs::create_dir_all(&out).unwrap();
        let manifest_path = build_fixture(&out);
        assert!(manifest_path.starts_with(&out));

        let set = load_manifest_textures(&manifest_path, &LoaderOptions::default())
            .await
            .unwrap();
        assert_eq!(set.textures.len(), 4);
    }

    #[tokio::test]
    async fn missing_manifest_is_manifest_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest_textures(
            &dir.path().join("absent").join("manifest.json"),
            &LoaderOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ManifestFetch(_)));

        fs::write(dir.path().join("manifest.json"), "not json").unwrap();
        let err = load_manifest_textures(
            &dir.path().join("manifest.json"),
            &LoaderOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ManifestFetch(_)));
    }
}
