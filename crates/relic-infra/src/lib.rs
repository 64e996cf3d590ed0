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

//! # Relic Infra
//!
//! Concrete rendering backends for the Relic scene graph.
//!
//! Every backend pairs a renderer that implements
//! [`relic_core::renderer::Renderer`] with a driver trait describing the
//! device it talks to. Each driver trait has a headless software
//! implementation built on [`raster`], so every backend can be constructed
//! and tested without a GPU. [`graphics::selector::BackendRegistry`] wires
//! them into the scene graph's renderer factory.

#![warn(missing_docs)]

pub mod graphics;
pub mod logging;
pub mod raster;

pub use graphics::selector::BackendRegistry;
