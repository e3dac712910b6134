//! CPU relief implementation
//!
//! Same structure as the compute shader: seeded warp fields offset the
//! sampling coordinate, a bounded fractal sum is blended into the base
//! height. Built on seeded Perlin fields, so values differ from the GPU
//! lattice hash, but each backend is bit-deterministic for a given seed.

use noise::{NoiseFn, Perlin};

use super::ReliefParams;
use crate::raster::{quantize_height, PixelFormat, RasterBuffer};

// Seed offsets for the two warp axes.
const WARP_X_SALT: u32 = 0x51ed_270b;
const WARP_Y_SALT: u32 = 0x9e37_79b9;

/// Apply the relief pass on the CPU. Input must be an R8 height buffer.
pub fn apply(base: &RasterBuffer, params: &ReliefParams) -> RasterBuffer {
    debug_assert_eq!(base.format, PixelFormat::R8);

    let warp_x = Perlin::new(params.seed ^ WARP_X_SALT);
    let warp_y = Perlin::new(params.seed ^ WARP_Y_SALT);
    let octave_fields: Vec<Perlin> = (0..params.octaves)
        .map(|o| Perlin::new(params.seed.wrapping_add(o)))
        .collect();

    let w = base.width;
    let h = base.height;
    let mut out = RasterBuffer::new(w, h, PixelFormat::R8);

    for y in 0..h {
        for x in 0..w {
            let u = (x as f64 + 0.5) / f64::from(w);
            let v = (y as f64 + 0.5) / f64::from(h);
            let freq = f64::from(params.frequency);

            let wx = f64::from(params.warp) * warp_x.get([u * freq, v * freq]);
            let wy = f64::from(params.warp) * warp_y.get([u * freq, v * freq]);
            let (su, sv) = (u + wx, v + wy);

            let mut amp = 1.0f64;
            let mut f = freq;
            let mut sum = 0.0f64;
            let mut norm = 0.0f64;
            for field in &octave_fields {
                sum += amp * field.get([su * f, sv * f]);
                norm += amp;
                amp *= 0.5;
                f *= 2.0;
            }
            let n = if norm > 0.0 { sum / norm } else { 0.0 };

            let base_h = f64::from(base.get(x, y)[0]) / 255.0;
            let refined = base_h + f64::from(params.amplitude) * n;
            out.put(x, y, &[quantize_height(refined as f32)]);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_base() -> RasterBuffer {
        let mut buf = RasterBuffer::new(32, 32, PixelFormat::R8);
        for y in 0..32 {
            for x in 0..32 {
                buf.put(x, y, &[((x * 7 + y * 13) % 256) as u8]);
            }
        }
        buf
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let base = noisy_base();
        let params = ReliefParams::default();
        let a = apply(&base, &params);
        let b = apply(&base, &params);
        assert_eq!(a.data, b.data);
        // The pass actually does something at default amplitude.
        assert_ne!(a.data, base.data);
    }

    #[test]
    fn different_seeds_diverge() {
        let base = noisy_base();
        let a = apply(&base, &ReliefParams { seed: 1, ..ReliefParams::default() });
        let b = apply(&base, &ReliefParams { seed: 2, ..ReliefParams::default() });
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn values_stay_in_byte_range_and_near_base() {
        let base = noisy_base();
        let params = ReliefParams {
            amplitude: 0.1,
            ..ReliefParams::default()
        };
        let out = apply(&base, &params);
        for (i, (&o, &b)) in out.data.iter().zip(base.data.iter()).enumerate() {
            // amplitude 0.1 bounds the fractal term to ~26 quantized units
            // before clamping.
            let delta = (i32::from(o) - i32::from(b)).abs();
            assert!(delta <= 27, "pixel {} moved {} units", i, delta);
        }
    }
}
