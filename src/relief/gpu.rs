//! GPU relief compute pass
//!
//! Transient resources (shader module, pipeline, buffers) are created per
//! invocation and dropped when it returns. The context is only ever
//! borrowed: this module never disposes of a device or queue it did not
//! create. `ReliefContext::headless` is the one place that creates its own.

use bytemuck::{Pod, Zeroable};

use super::ReliefParams;
use crate::core::error::{Error, Result};
use crate::raster::{quantize_height, PixelFormat, RasterBuffer};

const WORKGROUP_SIZE: u32 = 16;

/// Shared device/queue pair the relief pass executes on.
///
/// May wrap a caller-owned rendering context; dropping this struct releases
/// only this handle's reference, never the underlying device.
pub struct ReliefContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl ReliefContext {
    /// Wrap an existing device/queue (wgpu handles are internally
    /// reference-counted, so this is a cheap clone, not a transfer of
    /// ownership).
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Create a headless context for build-time use.
    ///
    /// Returns `None` when no adapter or device is available; callers degrade
    /// to the CPU implementation instead of failing the build.
    pub fn headless() -> Option<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = match pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        )) {
            Ok(adapter) => adapter,
            Err(e) => {
                log::warn!("no GPU adapter for relief pass: {:?}", e);
                return None;
            }
        };

        let (device, queue) = match pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("relief_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: Default::default(),
                trace: Default::default(),
            },
        )) {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("GPU device request failed for relief pass: {}", e);
                return None;
            }
        };

        log::info!("relief pass running on {}", adapter.get_info().name);
        Some(Self { device, queue })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ReliefUniforms {
    width: u32,
    height: u32,
    octaves: u32,
    seed: u32,
    amplitude: f32,
    frequency: f32,
    warp: f32,
    _pad: f32,
}

/// Run the relief shader over an R8 height buffer and read the result back.
pub fn apply(ctx: &ReliefContext, base: &RasterBuffer, params: &ReliefParams) -> Result<RasterBuffer> {
    debug_assert_eq!(base.format, PixelFormat::R8);
    let device = &ctx.device;
    let queue = &ctx.queue;

    let texels = base.width as usize * base.height as usize;
    let buffer_size = (texels * std::mem::size_of::<f32>()) as u64;

    let uniforms = ReliefUniforms {
        width: base.width,
        height: base.height,
        octaves: params.octaves,
        seed: params.seed,
        amplitude: params.amplitude,
        frequency: params.frequency,
        warp: params.warp,
        _pad: 0.0,
    };

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("relief_shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/relief.wgsl").into()),
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("relief_uniforms"),
        size: std::mem::size_of::<ReliefUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let input_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("relief_input"),
        size: buffer_size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("relief_output"),
        size: buffer_size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("relief_staging"),
        size: buffer_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let heights: Vec<f32> = base.data.iter().map(|&b| f32::from(b) / 255.0).collect();
    queue.write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    queue.write_buffer(&input_buffer, 0, bytemuck::cast_slice(&heights));

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("relief_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("relief_bind_group"),
        layout: &bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: input_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: output_buffer.as_entire_binding(),
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("relief_pipeline_layout"),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("relief_pipeline"),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("relief_encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("relief_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            base.width.div_ceil(WORKGROUP_SIZE),
            base.height.div_ceil(WORKGROUP_SIZE),
            1,
        );
    }
    encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, buffer_size);
    queue.submit(Some(encoder.finish()));

    // Readback
    let slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::PollType::Wait { submission_index: None, timeout: None });

    rx.recv()
        .map_err(|_| Error::Gpu("relief readback channel closed".to_string()))?
        .map_err(|e| Error::Gpu(format!("relief readback map failed: {:?}", e)))?;

    let mut out = RasterBuffer::new(base.width, base.height, PixelFormat::R8);
    {
        let data = slice.get_mapped_range();
        let refined: &[f32] = bytemuck::cast_slice(&data);
        for (dst, &h) in out.data.iter_mut().zip(refined.iter()) {
            *dst = quantize_height(h);
        }
    }
    staging_buffer.unmap();

    Ok(out)
}
