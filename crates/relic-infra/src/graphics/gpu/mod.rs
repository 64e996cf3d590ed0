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

//! The unified GPU backend: a command/transfer-buffer device model with
//! frames in flight, fenced deferred deletion and reversed depth.

mod driver;
mod renderer;
mod soft;
#[cfg(feature = "wgpu")]
mod wgpu_driver;

pub use driver::{
    BufferHandle, BufferUsage, DrawCall, DrawUniforms, GpuCommand, GpuDriver, GpuFence,
    LightBlock, Pipeline, TextureHandle, MAX_GPU_LIGHTS,
};
pub use renderer::{GpuRenderer, INITIAL_TRANSFER_SIZE};
pub use soft::SoftGpuDriver;
#[cfg(feature = "wgpu")]
pub use wgpu_driver::WgpuDriver;
