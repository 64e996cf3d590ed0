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

//! # Relic Core
//!
//! A retained-mode 3D scene graph: frames, meshes, lights and textures,
//! the viewport logic that turns them into draws, and the [`Renderer`]
//! contract every backend implements.
//!
//! [`Renderer`]: renderer::Renderer

#![warn(missing_docs)]

pub mod context;
pub mod device;
pub mod math;
pub mod object;
pub mod renderer;
pub mod scene;
pub mod status;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use context::RmContext;
pub use device::Device;
pub use status::{RmError, RmResult, Status};
pub use viewport::Viewport;
