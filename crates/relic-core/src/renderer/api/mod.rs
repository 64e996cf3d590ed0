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

//! Data types and helpers shared by the viewport and every renderer.

pub mod backend;
pub mod cache;
pub mod common;
pub mod frame_ring;
pub mod geometry;
pub mod settings;
pub mod ui;

pub use self::backend::{BackendInfo, BackendKind};
pub use self::cache::{CacheKey, Lookup, ResourceCache};
pub use self::common::*;
pub use self::frame_ring::FrameRing;
pub use self::geometry::{flatten, GroupGeometry, MAX_U16_VERTICES};
pub use self::settings::RendererConfig;
