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

//! The four renderer families and the factory that selects between them.
//!
//! ```text
//! gpu    GpuRenderer<D: GpuDriver>      command/transfer buffers, fences
//! tile   TileRenderer<D: TileDriver>    explicit memory, notifications
//! fixed  FixedRenderer<D: FixedDevice>  CPU transform and lighting
//! gl1    Gl11Renderer<G: Gl11>          fixed-function GL state machine
//! ```

mod common;
pub mod fixed;
pub mod gl1;
pub mod gpu;
pub mod selector;
pub mod tile;

pub use common::SamplerDesc;
