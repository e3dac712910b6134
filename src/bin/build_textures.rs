//! Texture build binary — turns a map grid into a content-addressed asset set.
//!
//! Usage: cargo run --release --bin build_textures -- [OPTIONS]
//!
//! Options:
//!   --map-url <PATH>      Map source (text grid, optional WxH header)
//!   --terrain <PATH>      Terrain table JSON (optional)
//!   --water <PATH>        Water-token list JSON (optional)
//!   --water-colors <PATH> Water-color override JSON (optional)
//!   --out <DIR>           Output directory (default: "generated")
//!   --preset <ID>         Quality preset id (default: "medium")
//!   --palette <ID>        Palette id (default: "classic")
//!   --seed <SEED>         Relief noise seed (default: 1337)
//!   --tile-scale <SCALE>  Detail-tile scale (default: 8.0)
//!   --force               Rebuild even on a cache hit
//!   --purge               Delete the output tree and exit
//!   --cpu                 Skip GPU probing, run the relief pass on the CPU
//!
//! Output structure:
//!   <out>/<cache key>/
//!     manifest.json        # texture layout, provenance, stats
//!     color.bin ...        # raw rasters + explicit mip chains
//!     color.lz4 ...        # compressed containers
//!     detail/              # rock/snow detail tile variants

use std::path::PathBuf;
use std::process::ExitCode;

use terratex::core::PipelineConfig;
use terratex::grid::{ExtendedGrid, Grid};
use terratex::manifest::{self, BuildOutcome};
use terratex::raster;
use terratex::relief::{self, ReliefContext};
use terratex::terrain::Classification;

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let out_dir = PathBuf::from(parse_str_arg(&args, "--out").unwrap_or_else(|| "generated".to_string()));

    if has_flag(&args, "--purge") {
        return match manifest::purge(&out_dir) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("purge failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(map_source) = parse_str_arg(&args, "--map-url") else {
        eprintln!("--map-url <path> is required (see --help text at the top of this file)");
        return ExitCode::FAILURE;
    };

    let mut config = PipelineConfig::default();
    if let Some(preset) = parse_str_arg(&args, "--preset") {
        config.preset = preset;
    }
    if let Some(palette) = parse_str_arg(&args, "--palette") {
        config.palette = palette;
    }
    if let Some(seed) = parse_u32_arg(&args, "--seed") {
        config.relief.seed = seed;
    }
    if let Some(scale) = parse_f32_arg(&args, "--tile-scale") {
        config.tile_scale = scale;
    }
    let force = has_flag(&args, "--force");
    let cpu_only = has_flag(&args, "--cpu");

    match run_build(&args, &map_source, &config, &out_dir, force, cpu_only) {
        Ok(outcome) => {
            match outcome {
                BuildOutcome::Built { key, manifest_path } => {
                    println!("built {} -> {}", key, manifest_path.display());
                }
                BuildOutcome::Skipped { key } => {
                    println!("cache hit for {}, nothing to do (use --force to rebuild)", key);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("build failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_build(
    args: &[String],
    map_source: &str,
    config: &PipelineConfig,
    out_dir: &std::path::Path,
    force: bool,
    cpu_only: bool,
) -> terratex::core::error::Result<BuildOutcome> {
    let runtime = tokio::runtime::Runtime::new()?;

    let map_text = std::fs::read_to_string(map_source)?;

    let terrain_path = parse_str_arg(args, "--terrain").map(PathBuf::from);
    let water_path = parse_str_arg(args, "--water").map(PathBuf::from);
    let overrides_path = parse_str_arg(args, "--water-colors").map(PathBuf::from);
    let classification = runtime.block_on(Classification::load(
        terrain_path.as_deref(),
        water_path.as_deref(),
        overrides_path.as_deref(),
    ));

    let (grid, warnings) = Grid::parse(&map_text)?;
    log::info!(
        "parsed {}x{} grid ({} warnings)",
        grid.width(),
        grid.height(),
        warnings.len()
    );
    let extended = ExtendedGrid::extend(
        grid,
        Some(classification.primary_water()),
        config.pole_padding,
    )?;

    let set = raster::synthesize(&extended, &classification, &config.synth);
    log::info!(
        "synthesized {}x{} rasters: land {:.1}%, missing entries {}",
        set.color.width,
        set.color.height,
        set.stats.land_ratio * 100.0,
        set.stats.missing_entries
    );

    let ctx = if cpu_only { None } else { ReliefContext::headless() };
    if ctx.is_none() {
        log::info!("relief pass running on CPU");
    }
    let refined = relief::apply(ctx.as_ref(), &set.height, &config.relief);
    let set = set.with_refined_height(refined, config.synth.normal_strength);

    manifest::build(&set, config, map_source, out_dir, force)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_str_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_u32_arg(args: &[String], name: &str) -> Option<u32> {
    parse_str_arg(args, name).and_then(|v| v.parse().ok())
}

fn parse_f32_arg(args: &[String], name: &str) -> Option<f32> {
    parse_str_arg(args, name).and_then(|v| v.parse().ok())
}
