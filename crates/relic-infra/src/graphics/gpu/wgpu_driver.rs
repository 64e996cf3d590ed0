// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A [`GpuDriver`] on top of wgpu, rendering offscreen.
//!
//! Transfer buffers are host memory: uploads reach device buffers and
//! textures through queue writes at the next submission, which keeps them
//! ordered before the frame that uses them. Readbacks go through a
//! row-padded mappable buffer that [`GpuDriver::read_transfer`] resolves.

use super::driver::{
    BufferHandle, BufferUsage, DrawUniforms, GpuCommand, GpuDriver, GpuFence, LightBlock,
    Pipeline, TextureHandle,
};
use crate::graphics::SamplerDesc;
use crate::raster::{Filter, Wrap};
use anyhow::{anyhow, bail, Context};
use relic_core::renderer::{Rect, RendererConfig};
use relic_core::scene::Vertex;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const SHADER: &str = r#"
struct Draw {
    mvp: mat4x4<f32>,
    world: mat4x4<f32>,
    normal_rows: array<vec4<f32>, 3>,
    color: vec4<f32>,
    eye_shininess: vec4<f32>,
    flags: vec4<u32>,
};

struct Light {
    color: vec4<f32>,
    position: vec4<f32>,
    direction: vec4<f32>,
};

struct Lights {
    lights: array<Light, 3>,
    count: vec4<u32>,
};

@group(0) @binding(0) var<uniform> draw: Draw;
@group(0) @binding(1) var<uniform> lights: Lights;
@group(1) @binding(0) var tex: texture_2d<f32>;
@group(1) @binding(1) var samp: sampler;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) @interpolate(flat) flat_color: vec4<f32>,
    @location(2) uv: vec2<f32>,
};

fn safe_normalize(v: vec3<f32>) -> vec3<f32> {
    let len = length(v);
    if (len < 1e-6) {
        return vec3<f32>(0.0);
    }
    return v / len;
}

fn shade(p: vec3<f32>, n: vec3<f32>) -> vec4<f32> {
    let base = draw.color;
    let shininess = draw.eye_shininess.w;
    let to_eye = safe_normalize(draw.eye_shininess.xyz - p);
    var diffuse = vec3<f32>(0.0);
    var specular = vec3<f32>(0.0);
    for (var i = 0u; i < min(lights.count.x, 3u); i = i + 1u) {
        let light = lights.lights[i];
        let directional = light.direction.w != 0.0;
        if (!directional && light.position.w == 0.0) {
            diffuse = diffuse + light.color.rgb;
            continue;
        }
        var l = safe_normalize(light.position.xyz - p);
        if (directional) {
            l = safe_normalize(-light.direction.xyz);
        }
        let n_dot_l = max(dot(n, l), 0.0);
        diffuse = diffuse + light.color.rgb * n_dot_l;
        if (directional && shininess > 0.0 && n_dot_l > 0.0) {
            let h = safe_normalize(l + to_eye);
            specular = specular + light.color.rgb * pow(max(dot(n, h), 0.0), shininess);
        }
    }
    return vec4<f32>(clamp(diffuse * base.rgb + specular, vec3<f32>(0.0), vec3<f32>(1.0)), base.a);
}

@vertex
fn vs_scene(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
) -> VertexOut {
    let world = draw.world * vec4<f32>(position, 1.0);
    let n = safe_normalize(
        normal.x * draw.normal_rows[0].xyz
        + normal.y * draw.normal_rows[1].xyz
        + normal.z * draw.normal_rows[2].xyz
    );
    let color = shade(world.xyz, n);
    var out: VertexOut;
    out.position = draw.mvp * vec4<f32>(position, 1.0);
    // Reversed depth.
    out.position.z = out.position.w - out.position.z;
    out.color = color;
    out.flat_color = color;
    out.uv = uv;
    return out;
}

@vertex
fn vs_ui(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
) -> VertexOut {
    var out: VertexOut;
    out.position = draw.mvp * vec4<f32>(position, 1.0);
    out.color = draw.color;
    out.flat_color = draw.color;
    out.uv = uv;
    return out;
}

fn bayer(p: vec2<u32>) -> f32 {
    let m = array<f32, 16>(0.0, 8.0, 2.0, 10.0, 12.0, 4.0, 14.0, 6.0,
                           3.0, 11.0, 1.0, 9.0, 15.0, 7.0, 13.0, 5.0);
    return m[(p.y % 4u) * 4u + (p.x % 4u)] / 16.0 - 0.5;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    var color = in.color;
    if (draw.flags.y != 0u) {
        color = in.flat_color;
    }
    if (draw.flags.x != 0u) {
        color = color * textureSample(tex, samp, in.uv);
    }
    if (draw.flags.z != 0u) {
        let t = bayer(vec2<u32>(in.position.xy));
        let levels = vec3<f32>(31.0, 63.0, 31.0);
        color = vec4<f32>(clamp(round(color.rgb * levels + t) / levels, vec3<f32>(0.0), vec3<f32>(1.0)), color.a);
    }
    return color;
}
"#;

#[derive(Debug)]
struct TransferBuffer {
    host: Vec<u8>,
    readback: Option<Readback>,
}

#[derive(Debug)]
struct Readback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
}

#[derive(Debug)]
enum DeviceBuffer {
    Device(wgpu::Buffer),
    Transfer(TransferBuffer),
}

#[derive(Debug)]
struct DeviceTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

#[derive(Debug)]
struct Targets {
    color: wgpu::Texture,
    depth: wgpu::Texture,
    /// Single-sampled copy of `color` when multisampling.
    resolve: Option<wgpu::Texture>,
    present: wgpu::Texture,
    width: u32,
    height: u32,
}

/// A headless wgpu device.
#[derive(Debug)]
pub struct WgpuDriver {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<Pipeline, wgpu::RenderPipeline>,
    uniform_alignment: u64,
    buffers: HashMap<u32, DeviceBuffer>,
    textures: HashMap<u32, DeviceTexture>,
    next_handle: u32,
    targets: Option<Targets>,
    sample_count: u32,
    dither: bool,
    submitted: u64,
    completed: Arc<AtomicU64>,
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::Repeat => wgpu::AddressMode::Repeat,
        Wrap::Clamp => wgpu::AddressMode::ClampToEdge,
    }
}

fn align_to(n: u64, alignment: u64) -> u64 {
    n.div_ceil(alignment) * alignment
}

fn padded(data: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    let len = align_to(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT) as usize;
    if len == data.len() {
        std::borrow::Cow::Borrowed(data)
    } else {
        let mut owned = data.to_vec();
        owned.resize(len, 0);
        std::borrow::Cow::Owned(owned)
    }
}

impl WgpuDriver {
    /// Requests an adapter and device and builds the pipelines.
    pub fn new(config: &RendererConfig) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| anyhow!("no suitable graphics adapter: {e}"))?;
        let info = adapter.get_info();
        if info.device_type == wgpu::DeviceType::Cpu && !config.software_fallback {
            bail!("adapter \"{}\" is a software rasterizer", info.name);
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Relic Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
            ..Default::default()
        }))
        .context("failed to create logical device")?;
        device.on_uncaptured_error(Box::new(|e| {
            log::error!("wgpu uncaptured error: {e:?}");
        }));
        log::info!("wgpu device on \"{}\" ({:?})", info.name, info.backend);

        let supports = |format: wgpu::TextureFormat, count: u32| {
            adapter
                .get_texture_format_features(format)
                .flags
                .sample_count_supported(count)
        };
        let sample_count = if config.msaa_samples > 1
            && supports(COLOR_FORMAT, config.msaa_samples)
            && supports(DEPTH_FORMAT, config.msaa_samples)
        {
            config.msaa_samples
        } else {
            1
        };

        let uniform_entry = |binding: u32, size: usize| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size as u64),
            },
            count: None,
        };
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Relic Uniforms"),
            entries: &[
                uniform_entry(0, std::mem::size_of::<DrawUniforms>()),
                uniform_entry(1, std::mem::size_of::<LightBlock>()),
            ],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Relic Texture"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let mut driver = Self {
            uniform_alignment: device.limits().min_uniform_buffer_offset_alignment as u64,
            device,
            queue,
            adapter_name: info.name,
            uniform_layout,
            texture_layout,
            pipelines: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            next_handle: 1,
            targets: None,
            sample_count,
            dither: config.dither,
            submitted: 0,
            completed: Arc::new(AtomicU64::new(0)),
        };
        driver.build_pipelines();
        Ok(driver)
    }

    fn build_pipelines(&mut self) {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Relic Shader"),
                source: wgpu::ShaderSource::Wgsl(SHADER.into()),
            });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Relic Pipeline Layout"),
                bind_group_layouts: &[&self.uniform_layout, &self.texture_layout],
                ..Default::default()
            });
        let attributes = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        };

        for pipeline in [Pipeline::Opaque, Pipeline::Transparent, Pipeline::Ui] {
            let (entry, depth_compare, depth_write, blend, cull) = match pipeline {
                Pipeline::Opaque => ("vs_scene", wgpu::CompareFunction::Greater, true, None, Some(wgpu::Face::Back)),
                Pipeline::Transparent => (
                    "vs_scene",
                    wgpu::CompareFunction::Greater,
                    false,
                    Some(wgpu::BlendState::ALPHA_BLENDING),
                    Some(wgpu::Face::Back),
                ),
                Pipeline::Ui => (
                    "vs_ui",
                    wgpu::CompareFunction::Always,
                    false,
                    Some(wgpu::BlendState::ALPHA_BLENDING),
                    None,
                ),
            };
            let render_pipeline = self
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&format!("Relic {pipeline:?}")),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &module,
                        entry_point: Some(entry),
                        buffers: std::slice::from_ref(&vertex_layout),
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &module,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: COLOR_FORMAT,
                            blend,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        front_face: wgpu::FrontFace::Cw,
                        cull_mode: cull,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: depth_write,
                        depth_compare,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState {
                        count: self.sample_count,
                        ..Default::default()
                    },
                    multiview: None,
                    cache: None,
                });
            self.pipelines.insert(pipeline, render_pipeline);
        }
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn transfer(&self, buffer: BufferHandle) -> Option<&TransferBuffer> {
        match self.buffers.get(&buffer.0)? {
            DeviceBuffer::Transfer(t) => Some(t),
            DeviceBuffer::Device(_) => None,
        }
    }

    fn device_buffer(&self, buffer: BufferHandle) -> Option<&wgpu::Buffer> {
        match self.buffers.get(&buffer.0)? {
            DeviceBuffer::Device(b) => Some(b),
            DeviceBuffer::Transfer(_) => None,
        }
    }

    /// Lays out every draw's uniforms and every light block in one buffer.
    /// Returns the bind group and, per command, the dynamic offsets.
    fn stage_uniforms(&mut self, commands: &[GpuCommand]) -> (wgpu::BindGroup, Vec<[u32; 2]>) {
        let align = self.uniform_alignment;
        let mut bytes = Vec::new();
        let mut push = |data: &[u8]| {
            let offset = align_to(bytes.len() as u64, align);
            bytes.resize(offset as usize, 0);
            bytes.extend_from_slice(data);
            offset as u32
        };
        let mut light_offset = push(bytemuck::bytes_of(&LightBlock::default()));
        let mut offsets = Vec::with_capacity(commands.len());
        let mut dither = self.dither;
        for command in commands {
            let mut draw_offset = 0;
            match command {
                GpuCommand::BindLights(block) => light_offset = push(bytemuck::bytes_of(block)),
                GpuCommand::SetDither(d) => dither = *d,
                GpuCommand::Draw(call) => {
                    let mut uniforms = call.uniforms;
                    uniforms.flags[2] = dither as u32;
                    draw_offset = push(bytemuck::bytes_of(&uniforms));
                }
                _ => {}
            }
            offsets.push([draw_offset, light_offset]);
        }
        if bytes.len() < std::mem::size_of::<DrawUniforms>() {
            bytes.resize(std::mem::size_of::<DrawUniforms>(), 0);
        }
        let size = align_to(bytes.len() as u64, align).max(std::mem::size_of::<DrawUniforms>() as u64);
        bytes.resize(size as usize, 0);
        self.dither = dither;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Relic Frame Uniforms"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&buffer, 0, &bytes);
        let binding = |size: usize| wgpu::BufferBinding {
            buffer: &buffer,
            offset: 0,
            size: NonZeroU64::new(size as u64),
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Relic Frame Uniforms"),
            layout: &self.uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(binding(std::mem::size_of::<DrawUniforms>())),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(binding(std::mem::size_of::<LightBlock>())),
                },
            ],
        });
        (bind_group, offsets)
    }
}

impl GpuDriver for WgpuDriver {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> anyhow::Result<BufferHandle> {
        if size == 0 {
            bail!("zero-sized {usage:?} buffer");
        }
        let buffer = match usage {
            BufferUsage::Transfer => DeviceBuffer::Transfer(TransferBuffer {
                host: vec![0; size as usize],
                readback: None,
            }),
            BufferUsage::Vertex | BufferUsage::Index => {
                let kind = if usage == BufferUsage::Vertex {
                    wgpu::BufferUsages::VERTEX
                } else {
                    wgpu::BufferUsages::INDEX
                };
                DeviceBuffer::Device(self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Relic Geometry"),
                    size: align_to(size, wgpu::COPY_BUFFER_ALIGNMENT),
                    usage: kind | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }))
            }
        };
        let handle = self.allocate_handle();
        self.buffers.insert(handle, buffer);
        Ok(BufferHandle(handle))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(&buffer.0) {
            Some(DeviceBuffer::Device(b)) => b.destroy(),
            Some(DeviceBuffer::Transfer(_)) => {}
            None => log::warn!("wgpu: double free of {buffer:?}"),
        }
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        sampler: SamplerDesc,
    ) -> anyhow::Result<TextureHandle> {
        if width == 0 || height == 0 {
            bail!("zero-sized texture {width}x{height}");
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Relic Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let wrap = address_mode(sampler.wrap);
        let filter = filter_mode(sampler.filter);
        // Anisotropy above 1 requires linear filtering on every stage.
        let (mipmap_filter, anisotropy_clamp) = match sampler.filter {
            Filter::Linear if sampler.anisotropy > 1 => {
                (wgpu::MipmapFilterMode::Linear, sampler.anisotropy)
            }
            _ => (wgpu::MipmapFilterMode::Nearest, 1),
        };
        let gpu_sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Relic Sampler"),
            address_mode_u: wrap,
            address_mode_v: wrap,
            address_mode_w: wrap,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter,
            anisotropy_clamp,
            ..Default::default()
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Relic Texture"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&gpu_sampler),
                },
            ],
        });
        let handle = self.allocate_handle();
        self.textures.insert(
            handle,
            DeviceTexture {
                texture,
                bind_group,
                width,
                height,
            },
        );
        Ok(TextureHandle(handle))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture.0) {
            Some(t) => t.texture.destroy(),
            None => log::warn!("wgpu: double free of {texture:?}"),
        }
    }

    fn write_transfer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let Some(DeviceBuffer::Transfer(transfer)) = self.buffers.get_mut(&buffer.0) else {
            bail!("{buffer:?} is not a transfer buffer");
        };
        let start = offset as usize;
        transfer
            .host
            .get_mut(start..start + data.len())
            .ok_or_else(|| anyhow!("write of {} bytes overflows {buffer:?}", data.len()))?
            .copy_from_slice(data);
        Ok(())
    }

    fn read_transfer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    ) -> anyhow::Result<Vec<u8>> {
        let Some(DeviceBuffer::Transfer(transfer)) = self.buffers.get_mut(&buffer.0) else {
            bail!("{buffer:?} is not a transfer buffer");
        };
        if let Some(readback) = transfer.readback.take() {
            let slice = readback.buffer.slice(..);
            let (tx, rx) = std::sync::mpsc::channel();
            slice.map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
            if let Err(e) = self.device.poll(wgpu::PollType::Wait) {
                log::warn!("wgpu: poll during readback failed: {e:?}");
            }
            rx.recv()
                .context("readback callback dropped")?
                .map_err(|e| anyhow!("failed to map readback buffer: {e:?}"))?;
            {
                let mapped = slice.get_mapped_range();
                let row = readback.width as usize * 4;
                for y in 0..readback.height as usize {
                    let src = y * readback.padded_row as usize;
                    let dst = y * row;
                    if let Some(out) = transfer.host.get_mut(dst..dst + row) {
                        out.copy_from_slice(&mapped[src..src + row]);
                    }
                }
            }
            readback.buffer.unmap();
        }
        let start = offset as usize;
        transfer
            .host
            .get(start..start + len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| anyhow!("read of {len} bytes overflows {buffer:?}"))
    }

    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn resize_targets(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            bail!("zero-sized render target {width}x{height}");
        }
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let multisampled = self.sample_count > 1;
        let make = |label: &str, format, usage, sample_count| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        let targets = Targets {
            color: make(
                "Relic Color",
                COLOR_FORMAT,
                if multisampled {
                    wgpu::TextureUsages::RENDER_ATTACHMENT
                } else {
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC
                },
                self.sample_count,
            ),
            depth: make(
                "Relic Depth",
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
                self.sample_count,
            ),
            resolve: multisampled.then(|| {
                make(
                    "Relic Resolve",
                    COLOR_FORMAT,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    1,
                )
            }),
            present: make(
                "Relic Present",
                COLOR_FORMAT,
                wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
                1,
            ),
            width,
            height,
        };
        self.targets = Some(targets);
        Ok(())
    }

    fn submit(&mut self, commands: Vec<GpuCommand>) -> GpuFence {
        self.submitted += 1;
        let fence = GpuFence(self.submitted);
        let Some((color_view, depth_view, resolve_view, target_size)) =
            self.targets.as_ref().map(|t| {
                (
                    t.color.create_view(&wgpu::TextureViewDescriptor::default()),
                    t.depth.create_view(&wgpu::TextureViewDescriptor::default()),
                    t.resolve
                        .as_ref()
                        .map(|r| r.create_view(&wgpu::TextureViewDescriptor::default())),
                    (t.width, t.height),
                )
            })
        else {
            log::error!("wgpu: submission before render targets exist");
            return fence;
        };

        let (uniforms, offsets) = self.stage_uniforms(&commands);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Relic Frame"),
            });
        let mut pass: Option<wgpu::RenderPass<'static>> = None;
        let mut readbacks = Vec::new();

        for (command, [draw_offset, light_offset]) in commands.iter().zip(offsets) {
            match command {
                GpuCommand::CopyBufferToBuffer {
                    src,
                    src_offset,
                    dst,
                    size,
                } => {
                    let start = *src_offset as usize;
                    let data = self
                        .transfer(*src)
                        .and_then(|t| t.host.get(start..start + *size as usize));
                    match (data, self.device_buffer(*dst)) {
                        (Some(data), Some(buffer)) => {
                            self.queue.write_buffer(buffer, 0, &padded(data))
                        }
                        _ => log::warn!("wgpu: invalid copy {src:?} -> {dst:?}"),
                    }
                }
                GpuCommand::CopyBufferToTexture {
                    src,
                    src_offset,
                    dst,
                } => {
                    let Some(texture) = self.textures.get(&dst.0) else {
                        continue;
                    };
                    let start = *src_offset as usize;
                    let len = texture.width as usize * texture.height as usize * 4;
                    let Some(data) = self.transfer(*src).and_then(|t| t.host.get(start..start + len))
                    else {
                        log::warn!("wgpu: texture copy from {src:?} out of range");
                        continue;
                    };
                    self.queue.write_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: &texture.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        data,
                        wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(texture.width * 4),
                            rows_per_image: None,
                        },
                        wgpu::Extent3d {
                            width: texture.width,
                            height: texture.height,
                            depth_or_array_layers: 1,
                        },
                    );
                }
                GpuCommand::BeginPass { clear } => {
                    pass = None;
                    let (color_load, depth_load) = match clear {
                        Some([r, g, b, a]) => (
                            wgpu::LoadOp::Clear(wgpu::Color {
                                r: *r as f64,
                                g: *g as f64,
                                b: *b as f64,
                                a: *a as f64,
                            }),
                            wgpu::LoadOp::Clear(0.0),
                        ),
                        None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
                    };
                    let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Relic Pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &color_view,
                            depth_slice: None,
                            resolve_target: resolve_view.as_ref(),
                            ops: wgpu::Operations {
                                load: color_load,
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view: &depth_view,
                            depth_ops: Some(wgpu::Operations {
                                load: depth_load,
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }),
                        ..Default::default()
                    });
                    pass = Some(render_pass.forget_lifetime());
                }
                GpuCommand::SetPipeline(pipeline) => {
                    if let (Some(pass), Some(p)) = (pass.as_mut(), self.pipelines.get(pipeline)) {
                        pass.set_pipeline(p);
                    }
                }
                GpuCommand::SetScissor(rect) => {
                    if let Some(pass) = pass.as_mut() {
                        let (w, h) = target_size;
                        let r = rect.unwrap_or(Rect::new(0, 0, w as i32, h as i32));
                        let x0 = r.x.clamp(0, w as i32) as u32;
                        let y0 = r.y.clamp(0, h as i32) as u32;
                        let x1 = (r.x + r.w).clamp(0, w as i32) as u32;
                        let y1 = (r.y + r.h).clamp(0, h as i32) as u32;
                        pass.set_scissor_rect(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0));
                    }
                }
                GpuCommand::BindLights(_) | GpuCommand::SetDither(_) => {}
                GpuCommand::Draw(call) => {
                    let (Some(pass), Some(vb), Some(ib), Some(texture)) = (
                        pass.as_mut(),
                        self.device_buffer(call.vertex_buffer),
                        self.device_buffer(call.index_buffer),
                        self.textures.get(&call.texture.0),
                    ) else {
                        log::warn!("wgpu: draw skipped, missing pass or resources");
                        continue;
                    };
                    pass.set_bind_group(0, &uniforms, &[draw_offset, light_offset]);
                    pass.set_bind_group(1, &texture.bind_group, &[]);
                    pass.set_vertex_buffer(0, vb.slice(..));
                    pass.set_index_buffer(ib.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(0..call.index_count, 0, 0..1);
                }
                GpuCommand::EndPass => pass = None,
                GpuCommand::Present => {
                    pass = None;
                    if let Some(t) = self.targets.as_ref() {
                        encoder.copy_texture_to_texture(
                            t.resolve.as_ref().unwrap_or(&t.color).as_image_copy(),
                            t.present.as_image_copy(),
                            t.present.size(),
                        );
                    }
                }
                GpuCommand::CopyPresentToBuffer { rect, dst } => {
                    pass = None;
                    let Some(t) = self.targets.as_ref() else {
                        continue;
                    };
                    let x = rect.x.clamp(0, t.width as i32) as u32;
                    let y = rect.y.clamp(0, t.height as i32) as u32;
                    let width = (rect.w.max(0) as u32).min(t.width - x);
                    let height = (rect.h.max(0) as u32).min(t.height - y);
                    if width == 0 || height == 0 {
                        continue;
                    }
                    let padded_row =
                        align_to(width as u64 * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64) as u32;
                    let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("Relic Readback"),
                        size: padded_row as u64 * height as u64,
                        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                        mapped_at_creation: false,
                    });
                    encoder.copy_texture_to_buffer(
                        wgpu::TexelCopyTextureInfo {
                            texture: &t.present,
                            mip_level: 0,
                            origin: wgpu::Origin3d { x, y, z: 0 },
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::TexelCopyBufferInfo {
                            buffer: &buffer,
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: 0,
                                bytes_per_row: Some(padded_row),
                                rows_per_image: None,
                            },
                        },
                        wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                    );
                    readbacks.push((
                        *dst,
                        Readback {
                            buffer,
                            width,
                            height,
                            padded_row,
                        },
                    ));
                }
            }
        }
        drop(pass);

        self.queue.submit(std::iter::once(encoder.finish()));
        let completed = self.completed.clone();
        let id = fence.0;
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(id, Ordering::AcqRel);
        });
        for (dst, readback) in readbacks {
            if let Some(DeviceBuffer::Transfer(t)) = self.buffers.get_mut(&dst.0) {
                t.readback = Some(readback);
            }
        }
        fence
    }

    fn wait(&mut self, fence: GpuFence, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.completed.load(Ordering::Acquire) >= fence.0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
                log::warn!("wgpu: poll failed: {e:?}");
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
