//! Height-field relief refinement
//!
//! Perturbs the synthesized height buffer with domain-warped fractal noise.
//! Runs on the GPU when a context is available; headless builds use the CPU
//! implementation so build-time manifests still carry refined heights.

pub mod cpu;
pub mod gpu;

pub use gpu::ReliefContext;

use crate::raster::RasterBuffer;

/// Parameters controlling the relief pass
#[derive(Clone, Debug)]
pub struct ReliefParams {
    /// Blend strength of the fractal term into the base height
    pub amplitude: f32,
    /// Base noise frequency (doubles per octave)
    pub frequency: f32,
    /// Domain-warp offset magnitude in UV units
    pub warp: f32,
    /// Fractal octave count
    pub octaves: u32,
    /// Noise seed; same seed + input always gives identical output
    pub seed: u32,
}

impl Default for ReliefParams {
    fn default() -> Self {
        Self {
            amplitude: 0.22,
            frequency: 5.0,
            warp: 0.3,
            octaves: 5,
            seed: 1337,
        }
    }
}

/// Apply the relief pass to an R8 height buffer, returning a refined buffer
/// of identical dimensions and format.
///
/// Never fails: without a context (or when the GPU path errors) the CPU
/// implementation runs instead. The caller's context is only borrowed; the
/// pass creates and drops its own transient resources and never disposes of
/// the device or queue.
pub fn apply(
    ctx: Option<&ReliefContext>,
    base: &RasterBuffer,
    params: &ReliefParams,
) -> RasterBuffer {
    if params.octaves == 0 || params.amplitude == 0.0 {
        return base.clone();
    }
    match ctx {
        Some(ctx) => match gpu::apply(ctx, base, params) {
            Ok(out) => out,
            Err(e) => {
                log::warn!("GPU relief pass failed ({}), falling back to CPU", e);
                cpu::apply(base, params)
            }
        },
        None => cpu::apply(base, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{PixelFormat, RasterBuffer};

    fn ramp(w: u32, h: u32) -> RasterBuffer {
        let mut buf = RasterBuffer::new(w, h, PixelFormat::R8);
        for y in 0..h {
            for x in 0..w {
                buf.put(x, y, &[((x * 255) / w.max(1)) as u8]);
            }
        }
        buf
    }

    #[test]
    fn zero_octaves_is_passthrough() {
        let base = ramp(16, 8);
        let params = ReliefParams {
            octaves: 0,
            ..ReliefParams::default()
        };
        assert_eq!(apply(None, &base, &params).data, base.data);
    }

    #[test]
    fn zero_amplitude_is_passthrough() {
        let base = ramp(16, 8);
        let params = ReliefParams {
            amplitude: 0.0,
            ..ReliefParams::default()
        };
        assert_eq!(apply(None, &base, &params).data, base.data);
    }

    #[test]
    fn output_dimensions_and_format_match_input() {
        let base = ramp(32, 16);
        let out = apply(None, &base, &ReliefParams::default());
        assert_eq!(out.width, 32);
        assert_eq!(out.height, 16);
        assert_eq!(out.format, PixelFormat::R8);
        assert_eq!(out.byte_size(), base.byte_size());
    }
}
