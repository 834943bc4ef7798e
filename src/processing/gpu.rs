//! wgpu compute backend.
//!
//! Frames stay on the CPU; each pass uploads its inputs as storage buffers,
//! dispatches one kernel from `shaders/mask_effects.wgsl` and reads the result
//! back. A failed dispatch falls back to the CPU implementation of the same
//! pass.

use std::sync::{Arc, Mutex, OnceLock, mpsc};

use anyhow::{Context, Result, anyhow};
use bytemuck::{Pod, Zeroable, cast_slice};
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::error::EffectError;
use crate::frame::Frame;
use crate::mask::MaskAsset;

use super::backend::{BlurAxis, BlurPassUniforms, MaskUniforms, RenderBackend};
use super::cpu::CpuBackend;
use super::sampling::{rgba_to_f32, write_f32};

static CONTEXT: OnceLock<Result<Arc<Mutex<GpuContext>>, String>> = OnceLock::new();

const WORKGROUP: u32 = 16;

fn instance() -> Result<Arc<Mutex<GpuContext>>, String> {
    CONTEXT
        .get_or_init(|| {
            GpuContext::new()
                .map(Mutex::new)
                .map(Arc::new)
                .map_err(|err| format!("{err:#}"))
        })
        .clone()
}

/// Backend running every pass as a compute dispatch on the shared device.
pub struct WgpuBackend {
    ctx: Arc<Mutex<GpuContext>>,
    fallback: CpuBackend,
}

impl WgpuBackend {
    /// # Errors
    /// Returns [`EffectError::UnsupportedEffect`] when no adapter or device
    /// can be created.
    pub fn new() -> Result<Self, EffectError> {
        let ctx = instance().map_err(|reason| EffectError::UnsupportedEffect {
            backend: "wgpu-compute",
            reason,
        })?;
        Ok(Self {
            ctx,
            fallback: CpuBackend,
        })
    }

    fn dispatch(&self, job: Job, dst: &mut Frame) -> Result<()> {
        let mut guard = self
            .ctx
            .lock()
            .map_err(|_| anyhow!("gpu context mutex poisoned"))?;
        let out = guard.run(&job)?;
        drop(guard);
        write_f32(dst.image_mut(), &out);
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu-compute"
    }

    fn resample(&self, src: &Frame, dst: &mut Frame) -> Result<(), EffectError> {
        let job = Job::new(Kernel::Resample, src, dst);
        match self.dispatch(job, dst) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("wgpu resample fallback: {err:?}");
                self.fallback.resample(src, dst)
            }
        }
    }

    fn blur_pass(
        &self,
        src: &Frame,
        dst: &mut Frame,
        uniforms: &BlurPassUniforms,
    ) -> Result<(), EffectError> {
        let mut job = Job::new(Kernel::BlurPass, src, dst);
        job.uniform.axis = match uniforms.axis {
            BlurAxis::Vertical => 0,
            BlurAxis::Horizontal => 1,
        };
        job.uniform.offset = uniforms.offset;
        match self.dispatch(job, dst) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("wgpu blur fallback: {err:?}");
                self.fallback.blur_pass(src, dst, uniforms)
            }
        }
    }

    fn composite_blur(
        &self,
        source: &Frame,
        blurred: &Frame,
        mask: &MaskAsset,
        dst: &mut Frame,
        uniforms: &MaskUniforms,
    ) -> Result<(), EffectError> {
        let mut job = Job::new(Kernel::CompositeBlur, blurred, dst).with_mask(mask, uniforms);
        job.base = Some(rgba_to_f32(source.image()));
        job.uniform.base_size = [source.width(), source.height()];
        match self.dispatch(job, dst) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("wgpu blur composite fallback: {err:?}");
                self.fallback
                    .composite_blur(source, blurred, mask, dst, uniforms)
            }
        }
    }

    fn composite_opaque(
        &self,
        source: &Frame,
        mask: &MaskAsset,
        dst: &mut Frame,
        uniforms: &MaskUniforms,
    ) -> Result<(), EffectError> {
        let job = Job::new(Kernel::CompositeOpaque, source, dst).with_mask(mask, uniforms);
        match self.dispatch(job, dst) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("wgpu opaque composite fallback: {err:?}");
                self.fallback.composite_opaque(source, mask, dst, uniforms)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Resample,
    BlurPass,
    CompositeBlur,
    CompositeOpaque,
}

impl Kernel {
    const ALL: [Self; 4] = [
        Self::Resample,
        Self::BlurPass,
        Self::CompositeBlur,
        Self::CompositeOpaque,
    ];

    const fn entry_point(self) -> &'static str {
        match self {
            Self::Resample => "resample",
            Self::BlurPass => "blur_pass",
            Self::CompositeBlur => "composite_blur",
            Self::CompositeOpaque => "composite_opaque",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

struct Job {
    kernel: Kernel,
    uniform: PassUniform,
    src: Vec<f32>,
    mask: Option<Vec<f32>>,
    base: Option<Vec<f32>>,
}

impl Job {
    fn new(kernel: Kernel, src: &Frame, dst: &Frame) -> Self {
        Self {
            kernel,
            uniform: PassUniform {
                src_size: [src.width(), src.height()],
                dst_size: [dst.width(), dst.height()],
                ..PassUniform::zeroed()
            },
            src: rgba_to_f32(src.image()),
            mask: None,
            base: None,
        }
    }

    fn with_mask(mut self, mask: &MaskAsset, uniforms: &MaskUniforms) -> Self {
        self.mask = Some(rgba_to_f32(mask.image()));
        self.uniform.mask_size = [mask.width(), mask.height()];
        self.uniform.scale = uniforms.scale;
        self.uniform.trans = uniforms.trans;
        self.uniform.color = uniforms.color;
        self.uniform.invert = u32::from(uniforms.invert);
        self.uniform.mask_value = uniforms.value;
        self.uniform.mask_spread = uniforms.spread;
        self
    }

    fn dst_len(&self) -> usize {
        self.uniform.dst_size[0] as usize * self.uniform.dst_size[1] as usize * 4
    }
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: Vec<wgpu::ComputePipeline>,
    layout: wgpu::BindGroupLayout,
    placeholder: wgpu::Buffer,
    max_binding_size: u64,
}

impl GpuContext {
    fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("request wgpu adapter")?;
        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("mask-effects-device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("request wgpu device")?;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mask-effects"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mask_effects.wgsl").into()),
        });
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mask-effects-layout"),
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
                storage(1, true),
                storage(2, false),
                storage(3, true),
                storage(4, true),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mask-effects-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipelines = Kernel::ALL
            .iter()
            .map(|kernel| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kernel.entry_point()),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(kernel.entry_point()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
            })
            .collect();
        let placeholder = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mask-effects-placeholder"),
            contents: cast_slice(&[0.0f32; 4]),
            usage: wgpu::BufferUsages::STORAGE,
        });
        debug!(adapter = ?adapter.get_info().name, "created wgpu compute context");
        Ok(Self {
            device,
            queue,
            pipelines,
            layout,
            placeholder,
            max_binding_size: u64::from(limits.max_storage_buffer_binding_size),
        })
    }

    fn storage_buffer(&self, label: &str, data: &[f32]) -> Result<wgpu::Buffer> {
        let size = std::mem::size_of_val(data) as u64;
        if size > self.max_binding_size {
            return Err(anyhow!(
                "{label} needs {size} bytes, device limit is {}",
                self.max_binding_size
            ));
        }
        Ok(self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE,
            }))
    }

    fn run(&mut self, job: &Job) -> Result<Vec<f32>> {
        let [width, height] = job.uniform.dst_size;
        let out_size = (job.dst_len() * std::mem::size_of::<f32>()) as u64;
        if out_size == 0 {
            return Err(anyhow!("empty destination"));
        }
        if out_size > self.max_binding_size {
            return Err(anyhow!("destination exceeds storage binding limit"));
        }
        let src = self.storage_buffer("effect-src", &job.src)?;
        let mask = job
            .mask
            .as_deref()
            .map(|data| self.storage_buffer("effect-mask", data))
            .transpose()?;
        let base = job
            .base
            .as_deref()
            .map(|data| self.storage_buffer("effect-base", data))
            .transpose()?;
        let dst = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("effect-dst"),
            size: out_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("effect-readback"),
            size: out_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("effect-uniform"),
                contents: cast_slice(&[job.uniform]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("effect-bind"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: dst.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: mask.as_ref().unwrap_or(&self.placeholder).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: base.as_ref().unwrap_or(&self.placeholder).as_entire_binding(),
                },
            ],
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("effect-command"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(job.kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines[job.kernel.index()]);
            pass.set_bind_group(0, &bind, &[]);
            pass.dispatch_workgroups(width.div_ceil(WORKGROUP), height.div_ceil(WORKGROUP), 1);
        }
        encoder.copy_buffer_to_buffer(&dst, 0, &readback, 0, out_size);
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        let _ = self.device.poll(wgpu::PollType::Wait);
        receiver
            .recv()
            .context("receive map result")?
            .context("map buffer for read")?;
        let data = slice.get_mapped_range();
        let out = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        readback.unmap();
        Ok(out)
    }
}

/// Mirrors `Params` in the WGSL module; 96 bytes, no implicit padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PassUniform {
    src_size: [u32; 2],
    dst_size: [u32; 2],
    mask_size: [u32; 2],
    base_size: [u32; 2],
    scale: [f32; 2],
    trans: [f32; 2],
    color: [f32; 4],
    axis: u32,
    invert: u32,
    offset: f32,
    mask_value: f32,
    mask_spread: f32,
    _pad: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layout_matches_wgsl() {
        assert_eq!(std::mem::size_of::<PassUniform>(), 96);
        assert_eq!(std::mem::offset_of!(PassUniform, color), 48);
        assert_eq!(std::mem::offset_of!(PassUniform, axis), 64);
        assert_eq!(std::mem::offset_of!(PassUniform, mask_spread), 80);
    }

    #[test]
    fn kernels_index_their_pipelines() {
        for (idx, kernel) in Kernel::ALL.iter().enumerate() {
            assert_eq!(kernel.index(), idx);
        }
    }

    #[test]
    fn shader_declares_every_entry_point() {
        let source = include_str!("shaders/mask_effects.wgsl");
        for kernel in Kernel::ALL {
            assert!(source.contains(&format!("fn {}(", kernel.entry_point())));
        }
    }
}
