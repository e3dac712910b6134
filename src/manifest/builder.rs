//! Offline manifest build: serialization, mip chains, content addressing
//!
//! Build output lives under `<out>/<cache key>/`. The cache key is a stable
//! hash over the build inputs, so rebuilding with identical inputs finds the
//! existing manifest and skips all work. `manifest.json` is written last;
//! a directory without one is a partial build and is rebuilt.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use noise::{NoiseFn, Perlin};
use sha2::{Digest, Sha256};

use super::model::{
    CompressedEntry, DetailAsset, DetailTile, DetailVariant, FilterMode, MipLevel, SourceInfo,
    TextureEntry, TextureManifest,
};
use crate::core::config::PipelineConfig;
use crate::core::error::Result;
use crate::raster::{PixelFormat, RasterBuffer, RasterSet, WrapMode};
use crate::terrain::Rgb;

/// Edge length of generated detail tiles.
const DETAIL_TILE_SIZE: u32 = 64;

/// Outcome of one build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Assets and manifest were written under this key.
    Built { key: String, manifest_path: PathBuf },
    /// A manifest already existed under this key; nothing was written.
    Skipped { key: String },
}

impl BuildOutcome {
    pub fn key(&self) -> &str {
        match self {
            BuildOutcome::Built { key, .. } | BuildOutcome::Skipped { key } => key,
        }
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Stable cache key over the build inputs.
///
/// Covers map identity and dimensions, preset, palette and tile scale.
/// `generated_at` never participates, so re-running an identical build is a
/// cache hit.
pub fn cache_key(
    map_source: &str,
    map_width: u32,
    map_height: u32,
    preset: &str,
    palette: &str,
    tile_scale: f32,
) -> String {
    let canonical = format!(
        "map={}\nw={}\nh={}\npreset={}\npalette={}\ntileScale={}\n",
        map_source, map_width, map_height, preset, palette, tile_scale
    );
    sha256_hex(canonical.as_bytes())[..16].to_string()
}

/// Build the on-disk asset tree and manifest for a raster set.
///
/// Idempotent per cache key: when `<out>/<key>/manifest.json` already exists
/// and `force` is off, returns `Skipped` without touching the filesystem.
pub fn build(
    raster_set: &RasterSet,
    config: &PipelineConfig,
    map_source: &str,
    out_dir: &Path,
    force: bool,
) -> Result<BuildOutcome> {
    let (grid_w, grid_h) = raster_set.grid_size;
    let key = cache_key(
        map_source,
        grid_w,
        grid_h,
        &config.preset,
        &config.palette,
        config.tile_scale,
    );
    let asset_dir = out_dir.join(&key);
    let manifest_path = asset_dir.join("manifest.json");

    if manifest_path.exists() && !force {
        log::info!("manifest {} already built, skipping", key);
        return Ok(BuildOutcome::Skipped { key });
    }

    fs::create_dir_all(asset_dir.join("detail"))?;

    let mut textures = BTreeMap::new();
    let mut compressed = BTreeMap::new();
    let core: [(&str, &RasterBuffer); 4] = [
        ("color", &raster_set.color),
        ("height", &raster_set.height),
        ("normal", &raster_set.normal),
        ("mountainMask", &raster_set.mountain_mask),
    ];
    for (name, buffer) in core {
        let (entry, lz4) = write_texture(&asset_dir, name, buffer, raster_set)?;
        textures.insert(name.to_string(), entry);
        compressed.insert(name.to_string(), lz4);
    }

    let detail_tiles = write_detail_tiles(&asset_dir, config)?;

    let manifest = TextureManifest {
        id: key.clone(),
        preset: config.preset.clone(),
        palette: config.palette.clone(),
        source: SourceInfo {
            map: map_source.to_string(),
            width: grid_w,
            height: grid_h,
        },
        generated_at: unix_timestamp(),
        textures,
        compressed,
        detail_tiles,
        stats: raster_set.stats.clone(),
    };

    // Written last: its presence marks the build complete.
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    log::info!("built manifest {} at {}", key, manifest_path.display());

    Ok(BuildOutcome::Built { key, manifest_path })
}

/// Delete a previously generated output tree without running the pipeline.
pub fn purge(out_dir: &Path) -> Result<()> {
    if out_dir.exists() {
        fs::remove_dir_all(out_dir)?;
        log::info!("purged {}", out_dir.display());
    } else {
        log::info!("nothing to purge at {}", out_dir.display());
    }
    Ok(())
}

/// Serialize one raster as an explicit mip chain plus an LZ4 container.
fn write_texture(
    asset_dir: &Path,
    name: &str,
    buffer: &RasterBuffer,
    raster_set: &RasterSet,
) -> Result<(TextureEntry, CompressedEntry)> {
    let chain = build_mip_chain(buffer);

    let mut mips = Vec::with_capacity(chain.len());
    let mut concatenated = Vec::new();
    for (level, mip) in chain.iter().enumerate() {
        let file = if level == 0 {
            format!("{}.bin", name)
        } else {
            format!("{}_mip{}.bin", name, level)
        };
        fs::write(asset_dir.join(&file), &mip.data)?;
        mips.push(MipLevel {
            path: file,
            width: mip.width,
            height: mip.height,
            byte_size: mip.data.len() as u64,
            sha256: sha256_hex(&mip.data),
        });
        concatenated.extend_from_slice(&mip.data);
    }

    // The compressed container carries the whole mip chain; level sizes are
    // implied by the declared dimensions and format.
    let lz4 = lz4_flex::compress_prepend_size(&concatenated);
    let lz4_file = format!("{}.lz4", name);
    fs::write(asset_dir.join(&lz4_file), &lz4)?;

    let entry = TextureEntry {
        path: mips[0].path.clone(),
        format: buffer.format,
        width: buffer.width,
        height: buffer.height,
        wrap_x: raster_set.wrap_x,
        wrap_y: raster_set.wrap_y,
        filter: FilterMode::Linear,
        byte_size: mips[0].byte_size,
        sha256: mips[0].sha256.clone(),
        mips: Some(mips),
    };
    let compressed = CompressedEntry {
        path: lz4_file,
        codec: "lz4".to_string(),
        byte_size: lz4.len() as u64,
        sha256: sha256_hex(&lz4),
    };
    Ok((entry, compressed))
}

/// Full mip chain, level 0 first, halving down to 1x1 with a 2x2 box filter.
pub fn build_mip_chain(buffer: &RasterBuffer) -> Vec<RasterBuffer> {
    let mut chain = vec![buffer.clone()];
    while chain.last().is_some_and(|m| m.width > 1 || m.height > 1) {
        let next = downsample(chain.last().unwrap());
        chain.push(next);
    }
    chain
}

fn downsample(src: &RasterBuffer) -> RasterBuffer {
    let w = (src.width / 2).max(1);
    let h = (src.height / 2).max(1);
    let bpp = src.format.bytes_per_pixel();
    let mut out = RasterBuffer::new(w, h, src.format);
    for y in 0..h {
        for x in 0..w {
            let x0 = 2 * x;
            let y0 = 2 * y;
            let x1 = (x0 + 1).min(src.width - 1);
            let y1 = (y0 + 1).min(src.height - 1);
            let mut px = [0u8; 4];
            for c in 0..bpp {
                let sum = u32::from(src.get(x0, y0)[c])
                    + u32::from(src.get(x1, y0)[c])
                    + u32::from(src.get(x0, y1)[c])
                    + u32::from(src.get(x1, y1)[c]);
                px[c] = ((sum + 2) / 4) as u8;
            }
            out.put(x, y, &px[..bpp]);
        }
    }
    out
}

/// Generate and write the built-in detail tiles: rock and snow albedo+normal
/// pairs blended near mountains by consumers. Two variants per tile, all
/// derived deterministically from the relief seed.
fn write_detail_tiles(
    asset_dir: &Path,
    config: &PipelineConfig,
) -> Result<BTreeMap<String, DetailTile>> {
    let tiles = [
        (
            "rock",
            Rgb { r: 0x5a, g: 0x52, b: 0x4c },
            Rgb { r: 0x8a, g: 0x84, b: 0x7c },
        ),
        (
            "snow",
            Rgb { r: 0xde, g: 0xe2, b: 0xe8 },
            Rgb { r: 0xff, g: 0xff, b: 0xff },
        ),
    ];

    let mut out = BTreeMap::new();
    for (tile_index, (name, base, accent)) in tiles.iter().enumerate() {
        let mut variants = Vec::new();
        for variant in 0..2u32 {
            let seed = config
                .relief
                .seed
                .wrapping_add(1000 * (tile_index as u32 + 1))
                .wrapping_add(variant);
            let (albedo, normal) =
                generate_detail_tile(seed, config.tile_scale, *base, *accent);

            let albedo_asset =
                write_detail_asset(asset_dir, &format!("{}_{}_albedo", name, variant), &albedo)?;
            let normal_asset =
                write_detail_asset(asset_dir, &format!("{}_{}_normal", name, variant), &normal)?;
            variants.push(DetailVariant {
                albedo: albedo_asset,
                normal: normal_asset,
            });
        }
        out.insert((*name).to_string(), DetailTile { variants });
    }
    Ok(out)
}

fn write_detail_asset(
    asset_dir: &Path,
    stem: &str,
    buffer: &RasterBuffer,
) -> Result<DetailAsset> {
    let raw_file = format!("detail/{}.bin", stem);
    fs::write(asset_dir.join(&raw_file), &buffer.data)?;

    let lz4 = lz4_flex::compress_prepend_size(&buffer.data);
    let lz4_file = format!("detail/{}.lz4", stem);
    fs::write(asset_dir.join(&lz4_file), &lz4)?;

    Ok(DetailAsset {
        raw: TextureEntry {
            path: raw_file,
            format: buffer.format,
            width: buffer.width,
            height: buffer.height,
            wrap_x: WrapMode::Repeat,
            wrap_y: WrapMode::Repeat,
            filter: FilterMode::Linear,
            byte_size: buffer.data.len() as u64,
            sha256: sha256_hex(&buffer.data),
            mips: None,
        },
        compressed: Some(CompressedEntry {
            path: lz4_file,
            codec: "lz4".to_string(),
            byte_size: lz4.len() as u64,
            sha256: sha256_hex(&lz4),
        }),
    })
}

/// Seeded high-frequency tile pair: fractal value field colors the albedo
/// between base and accent, the same field drives the normal map.
fn generate_detail_tile(
    seed: u32,
    tile_scale: f32,
    base: Rgb,
    accent: Rgb,
) -> (RasterBuffer, RasterBuffer) {
    let field = Perlin::new(seed);
    let size = DETAIL_TILE_SIZE;
    let freq = f64::from(tile_scale.max(1.0));

    let mut values = vec![0.0f32; (size * size) as usize];
    for y in 0..size {
        for x in 0..size {
            let u = f64::from(x) / f64::from(size);
            let v = f64::from(y) / f64::from(size);
            let mut sum = 0.0;
            let mut amp = 1.0;
            let mut f = freq;
            for _ in 0..3 {
                sum += amp * field.get([u * f, v * f]);
                amp *= 0.5;
                f *= 2.0;
            }
            values[(y * size + x) as usize] = ((sum / 1.75 + 1.0) * 0.5) as f32;
        }
    }

    let mut albedo = RasterBuffer::new(size, size, PixelFormat::Rgba8);
    let mut normal = RasterBuffer::new(size, size, PixelFormat::Rgb8);
    let lerp = |a: u8, b: u8, t: f32| (f32::from(a) + (f32::from(b) - f32::from(a)) * t)
        .round()
        .clamp(0.0, 255.0) as u8;
    for y in 0..size {
        for x in 0..size {
            let t = values[(y * size + x) as usize].clamp(0.0, 1.0);
            albedo.put(
                x,
                y,
                &[
                    lerp(base.r, accent.r, t),
                    lerp(base.g, accent.g, t),
                    lerp(base.b, accent.b, t),
                    0xff,
                ],
            );

            let at = |xx: i64, yy: i64| {
                let xx = xx.rem_euclid(i64::from(size)) as u32;
                let yy = yy.rem_euclid(i64::from(size)) as u32;
                values[(yy * size + xx) as usize]
            };
            let dx = at(i64::from(x) - 1, i64::from(y)) - at(i64::from(x) + 1, i64::from(y));
            let dy = at(i64::from(x), i64::from(y) - 1) - at(i64::from(x), i64::from(y) + 1);
            let n = glam::Vec3::new(dx * 2.0, dy * 2.0, 1.0).normalize();
            let enc = |v: f32| ((v * 0.5 + 0.5) * 255.0).round().clamp(0.0, 255.0) as u8;
            normal.put(x, y, &[enc(n.x), enc(n.y), enc(n.z)]);
        }
    }
    (albedo, normal)
}

fn unix_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}", secs)
}
