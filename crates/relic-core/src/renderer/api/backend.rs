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

//! Backend families.

use serde::{Deserialize, Serialize};

/// The family of a rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// A unified command/transfer-buffer GPU API.
    UnifiedGpu,
    /// A tile-based mobile GPU with explicit memory management.
    TileGpu,
    /// A legacy fixed-function 3D device fed pre-transformed vertices.
    FixedFunction,
    /// A fixed-function OpenGL 1.x pipeline.
    OpenGl1,
}

impl BackendKind {
    /// Every backend kind, in default preference order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::UnifiedGpu,
        BackendKind::TileGpu,
        BackendKind::FixedFunction,
        BackendKind::OpenGl1,
    ];

    /// A short human-readable name.
    pub const fn label(self) -> &'static str {
        match self {
            BackendKind::UnifiedGpu => "Unified GPU",
            BackendKind::TileGpu => "Tile GPU",
            BackendKind::FixedFunction => "Fixed-function device",
            BackendKind::OpenGl1 => "OpenGL 1.1",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A backend a factory is able to construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    /// The backend family.
    pub kind: BackendKind,
    /// Driver description, e.g. "software" or an adapter name.
    pub driver: String,
}
