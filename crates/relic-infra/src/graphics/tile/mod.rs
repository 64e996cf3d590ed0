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

//! The tile GPU backend: explicit device memory, scenes and notifications.

mod driver;
mod renderer;
mod soft;

pub use driver::{
    FragmentProgram, MemoryBlock, MemorySpan, Notification, PlaneVertex, SceneUniforms, TileDraw,
    TileDriver, TileLight, TileLightBlock, TileTexture, TileTextureFormat, FRAGMENT_BUFFER_COUNT,
    MAX_TILE_LIGHTS, PALETTE_ALIGNMENT, VERTEX_BUFFER_COUNT,
};
pub use renderer::{TileRenderer, QUADS_PER_FRAME};
pub use soft::{SoftTileDriver, DEFAULT_MEMORY_BUDGET};
