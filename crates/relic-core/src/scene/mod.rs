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

//! The retained-mode scene graph: frames, meshes, lights, materials and textures.
//!
//! All objects are reference-counted handles. Cloning a handle shares the
//! object; equality compares identity.

pub mod collection;
pub mod frame;
pub mod light;
pub mod material;
pub mod mesh;
pub mod surface;
pub mod texture;

pub use collection::Collection;
pub use frame::{CombineType, Frame, MaterialMode, WeakFrame};
pub use light::{Light, LightType};
pub use material::Material;
pub use mesh::{GroupInfo, Mesh, MeshGroup, Vertex};
pub use surface::{PixelFormat, Surface};
pub use texture::Texture;

use crate::object::{Object, ObjectCore};

/// Shading quality of a mesh group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderQuality {
    /// Edges only. Rendered as Gouraud by every backend.
    Wireframe,
    /// Flat shading without lighting.
    UnlitFlat,
    /// One normal per face.
    Flat,
    /// Per-vertex normals, interpolated colour.
    Gouraud,
    /// Per-pixel lighting where the backend supports it.
    Phong,
}

/// How texture coordinates are interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureMapping {
    /// Screen-space linear interpolation.
    Linear,
    /// Perspective-correct interpolation.
    PerspectiveCorrect,
}

/// Something a frame can display: a mesh, or another frame used as an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Visual {
    /// Geometry.
    Mesh(Mesh),
    /// A frame whose subtree is drawn under the referencing frame.
    Frame(Frame),
}

impl Visual {
    /// Returns the object state of the underlying object.
    pub fn core(&self) -> &ObjectCore {
        match self {
            Visual::Mesh(m) => m.core(),
            Visual::Frame(f) => f.core(),
        }
    }
}

impl From<Mesh> for Visual {
    fn from(mesh: Mesh) -> Self {
        Visual::Mesh(mesh)
    }
}

impl From<&Mesh> for Visual {
    fn from(mesh: &Mesh) -> Self {
        Visual::Mesh(mesh.clone())
    }
}

impl From<Frame> for Visual {
    fn from(frame: Frame) -> Self {
        Visual::Frame(frame)
    }
}

impl From<&Frame> for Visual {
    fn from(frame: &Frame) -> Self {
        Visual::Frame(frame.clone())
    }
}
