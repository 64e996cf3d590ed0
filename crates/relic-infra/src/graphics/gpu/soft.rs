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

//! A headless [`GpuDriver`] that executes command lists on the CPU.
//!
//! Submissions run synchronously, so every fence is signalled by the time
//! [`GpuDriver::submit`] returns. The hang switch stops execution and
//! signalling to exercise timeout paths.

use super::driver::{
    BufferHandle, BufferUsage, DrawCall, GpuCommand, GpuDriver, GpuFence, LightBlock, Pipeline,
    TextureHandle,
};
use crate::graphics::common::{clear_rgba, mat3_from_padded, ProgrammableDraw};
use crate::graphics::SamplerDesc;
use crate::raster::{CullMode, DepthTest, RasterState, RenderTarget, TextureImage};
use anyhow::{anyhow, bail};
use relic_core::math::{Vec3, Vec4};
use relic_core::renderer::Rect;
use relic_core::scene::Vertex;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug)]
struct SoftBuffer {
    usage: BufferUsage,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct SoftTexture {
    width: u32,
    height: u32,
    sampler: SamplerDesc,
    image: Option<TextureImage>,
}

/// CPU implementation of the unified GPU command model.
#[derive(Debug)]
pub struct SoftGpuDriver {
    buffers: HashMap<u32, SoftBuffer>,
    textures: HashMap<u32, SoftTexture>,
    next_handle: u32,
    target: RenderTarget,
    present: RenderTarget,
    submitted: u64,
    completed: u64,
    hung: Rc<Cell<bool>>,
    pipeline: Pipeline,
    scissor: Option<Rect>,
    lights: LightBlock,
    dither: bool,
}

impl SoftGpuDriver {
    /// Creates a driver with 1×1 targets; the renderer sizes them.
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            textures: HashMap::new(),
            next_handle: 1,
            target: RenderTarget::new(1, 1),
            present: RenderTarget::new(1, 1),
            submitted: 0,
            completed: 0,
            hung: Rc::new(Cell::new(false)),
            pipeline: Pipeline::Opaque,
            scissor: None,
            lights: LightBlock::default(),
            dither: false,
        }
    }

    /// A switch that, while set, stops the device from executing or
    /// signalling anything.
    pub fn hang_handle(&self) -> Rc<Cell<bool>> {
        self.hung.clone()
    }

    /// Number of live buffers.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Sampler settings of every live texture.
    pub fn texture_samplers(&self) -> Vec<SamplerDesc> {
        self.textures.values().map(|t| t.sampler).collect()
    }

    /// The last presented image.
    pub fn presented(&self) -> &RenderTarget {
        &self.present
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn raster_state(&self, flat: bool) -> RasterState {
        let base = RasterState {
            flat,
            dither: self.dither,
            scissor: self.scissor,
            ..RasterState::default()
        };
        match self.pipeline {
            Pipeline::Opaque => RasterState {
                depth_test: DepthTest::Greater,
                reverse_z: true,
                ..base
            },
            Pipeline::Transparent => RasterState {
                depth_test: DepthTest::Greater,
                depth_write: false,
                reverse_z: true,
                blend: true,
                ..base
            },
            Pipeline::Ui => RasterState {
                depth_test: DepthTest::Always,
                depth_write: false,
                blend: true,
                cull: CullMode::None,
                ..base
            },
        }
    }

    fn execute(&mut self, command: GpuCommand) {
        match command {
            GpuCommand::CopyBufferToBuffer {
                src,
                src_offset,
                dst,
                size,
            } => {
                let Some(data) = self.slice(src, src_offset, size as usize) else {
                    log::warn!("Soft GPU: copy from {src:?} out of range");
                    return;
                };
                match self.buffers.get_mut(&dst.0) {
                    Some(buffer) if buffer.bytes.len() >= data.len() => {
                        buffer.bytes[..data.len()].copy_from_slice(&data);
                    }
                    _ => log::warn!("Soft GPU: copy into {dst:?} out of range"),
                }
            }
            GpuCommand::CopyBufferToTexture {
                src,
                src_offset,
                dst,
            } => {
                let Some((width, height, sampler)) = self
                    .textures
                    .get(&dst.0)
                    .map(|t| (t.width, t.height, t.sampler))
                else {
                    return;
                };
                let len = width as usize * height as usize * 4;
                let image = self
                    .slice(src, src_offset, len)
                    .and_then(|bytes| TextureImage::from_rgba(width, height, &bytes));
                if let (Some(mut image), Some(texture)) = (image, self.textures.get_mut(&dst.0)) {
                    image.filter = sampler.filter;
                    image.wrap = sampler.wrap;
                    texture.image = Some(image);
                }
            }
            GpuCommand::BeginPass { clear } => {
                if let Some([r, g, b, _]) = clear {
                    self.target.clear_color(clear_rgba(r, g, b));
                    // Reversed depth: 0 is the far plane.
                    self.target.clear_depth(0.0);
                }
            }
            GpuCommand::SetPipeline(pipeline) => self.pipeline = pipeline,
            GpuCommand::SetScissor(rect) => self.scissor = rect,
            GpuCommand::BindLights(block) => self.lights = block,
            GpuCommand::SetDither(dither) => self.dither = dither,
            GpuCommand::Draw(call) => self.draw(&call),
            GpuCommand::EndPass => self.scissor = None,
            GpuCommand::Present => self.present.copy_from(&self.target),
            GpuCommand::CopyPresentToBuffer { rect, dst } => {
                let (_, _, pixels) = self.present.read_rect(rect);
                if let Some(buffer) = self.buffers.get_mut(&dst.0) {
                    let n = pixels.len().min(buffer.bytes.len());
                    buffer.bytes[..n].copy_from_slice(&pixels[..n]);
                }
            }
        }
    }

    fn slice(&self, buffer: BufferHandle, offset: u64, len: usize) -> Option<Vec<u8>> {
        let bytes = &self.buffers.get(&buffer.0)?.bytes;
        let start = offset as usize;
        bytes.get(start..start.checked_add(len)?).map(<[u8]>::to_vec)
    }

    fn draw(&mut self, call: &DrawCall) {
        let (Some(vb), Some(ib)) = (
            self.buffers.get(&call.vertex_buffer.0),
            self.buffers.get(&call.index_buffer.0),
        ) else {
            log::warn!("Soft GPU: draw references a freed buffer");
            return;
        };
        let vertex_size = std::mem::size_of::<Vertex>();
        let vertices: Vec<Vertex> =
            bytemuck::pod_collect_to_vec(&vb.bytes[..vb.bytes.len() / vertex_size * vertex_size]);
        let indices: Vec<u16> = bytemuck::pod_collect_to_vec(&ib.bytes[..ib.bytes.len() / 2 * 2]);
        let count = (call.index_count as usize).min(indices.len());

        let u = &call.uniforms;
        let state = self.raster_state(u.flat());
        let lights = (self.pipeline != Pipeline::Ui).then(|| self.lights.active());
        let draw = ProgrammableDraw {
            vertices: &vertices,
            indices: &indices[..count],
            model_view_projection: u.model_view_projection,
            world: u.world,
            normal_matrix: mat3_from_padded(&u.normal_matrix),
            eye: Vec3::new(u.eye_shininess[0], u.eye_shininess[1], u.eye_shininess[2]),
            color: Vec4::new(u.color[0], u.color[1], u.color[2], u.color[3]),
            shininess: u.shininess(),
            lights,
        };
        let texture = if u.textured() {
            self.textures
                .get(&call.texture.0)
                .and_then(|t| t.image.as_ref())
        } else {
            None
        };
        draw.execute(&mut self.target, &state, texture);
    }
}

impl Default for SoftGpuDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDriver for SoftGpuDriver {
    fn name(&self) -> &str {
        "software"
    }

    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> anyhow::Result<BufferHandle> {
        if size == 0 {
            bail!("zero-sized {usage:?} buffer");
        }
        let handle = self.allocate_handle();
        self.buffers.insert(
            handle,
            SoftBuffer {
                usage,
                bytes: vec![0; size as usize],
            },
        );
        Ok(BufferHandle(handle))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            log::warn!("Soft GPU: double free of {buffer:?}");
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
        let handle = self.allocate_handle();
        self.textures.insert(
            handle,
            SoftTexture {
                width,
                height,
                sampler,
                image: None,
            },
        );
        Ok(TextureHandle(handle))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_none() {
            log::warn!("Soft GPU: double free of {texture:?}");
        }
    }

    fn write_transfer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let entry = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| anyhow!("unknown buffer {buffer:?}"))?;
        if entry.usage != BufferUsage::Transfer {
            bail!("{buffer:?} is not a transfer buffer");
        }
        let start = offset as usize;
        let dst = entry
            .bytes
            .get_mut(start..start + data.len())
            .ok_or_else(|| anyhow!("write of {} bytes overflows {buffer:?}", data.len()))?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn read_transfer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    ) -> anyhow::Result<Vec<u8>> {
        self.slice(buffer, offset, len)
            .ok_or_else(|| anyhow!("read of {len} bytes overflows {buffer:?}"))
    }

    fn sample_count(&self) -> u32 {
        1
    }

    fn resize_targets(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            bail!("zero-sized render target {width}x{height}");
        }
        self.target.resize(width, height);
        self.present.resize(width, height);
        Ok(())
    }

    fn submit(&mut self, commands: Vec<GpuCommand>) -> GpuFence {
        self.submitted += 1;
        if self.hung.get() {
            log::trace!("Soft GPU: submission {} dropped by a hung device", self.submitted);
            return GpuFence(self.submitted);
        }
        for command in commands {
            self.execute(command);
        }
        self.completed = self.submitted;
        GpuFence(self.submitted)
    }

    fn wait(&mut self, fence: GpuFence, _timeout: Duration) -> bool {
        fence.0 <= self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gpu::driver::DrawUniforms;
    use relic_core::math::{Mat4, Rgba8, Vec2};

    fn upload(driver: &mut SoftGpuDriver, usage: BufferUsage, bytes: &[u8]) -> BufferHandle {
        let transfer = driver.create_buffer(BufferUsage::Transfer, bytes.len() as u64).unwrap();
        driver.write_transfer(transfer, 0, bytes).unwrap();
        let dst = driver.create_buffer(usage, bytes.len() as u64).unwrap();
        driver.submit(vec![GpuCommand::CopyBufferToBuffer {
            src: transfer,
            src_offset: 0,
            dst,
            size: bytes.len() as u64,
        }]);
        driver.destroy_buffer(transfer);
        dst
    }

    #[test]
    fn test_transfer_round_trip_and_bounds() {
        let mut driver = SoftGpuDriver::new();
        let buffer = driver.create_buffer(BufferUsage::Transfer, 8).unwrap();
        driver.write_transfer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(driver.read_transfer(buffer, 4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(driver.write_transfer(buffer, 6, &[0; 4]).is_err());
        let vertex = driver.create_buffer(BufferUsage::Vertex, 8).unwrap();
        assert!(driver.write_transfer(vertex, 0, &[0]).is_err());
        assert!(driver.create_buffer(BufferUsage::Index, 0).is_err());
    }

    #[test]
    fn test_hung_device_never_signals() {
        let mut driver = SoftGpuDriver::new();
        let hang = driver.hang_handle();
        let ok = driver.submit(Vec::new());
        assert!(driver.wait(ok, Duration::ZERO));
        hang.set(true);
        let stuck = driver.submit(Vec::new());
        assert!(!driver.wait(stuck, Duration::from_millis(1)));
    }

    #[test]
    fn test_ui_draw_fills_scissor_and_presents() {
        let mut driver = SoftGpuDriver::new();
        driver.resize_targets(8, 8).unwrap();
        let quad = [
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::Z, Vec2::ZERO),
        ];
        let vb = upload(&mut driver, BufferUsage::Vertex, bytemuck::cast_slice(&quad));
        let ib = upload(&mut driver, BufferUsage::Index, bytemuck::cast_slice(&[0u16, 1, 2, 0, 2, 3]));
        let mut uniforms = DrawUniforms::ui(Mat4::IDENTITY, [1.0, 0.0, 0.0, 1.0]);
        uniforms.flags[0] = 0;
        driver.submit(vec![
            GpuCommand::BeginPass {
                clear: Some([0.0, 0.0, 0.0, 1.0]),
            },
            GpuCommand::SetPipeline(Pipeline::Ui),
            GpuCommand::SetScissor(Some(Rect::new(0, 0, 4, 4))),
            GpuCommand::Draw(DrawCall {
                vertex_buffer: vb,
                index_buffer: ib,
                index_count: 6,
                texture: TextureHandle(0),
                uniforms,
            }),
            GpuCommand::EndPass,
            GpuCommand::Present,
        ]);
        assert_eq!(driver.presented().count_not(Rgba8::BLACK), 16);
        assert_eq!(driver.presented().pixel(1, 1), Rgba8::new(255, 0, 0, 255));
    }
}
