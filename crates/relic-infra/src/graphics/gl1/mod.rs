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

//! The OpenGL 1.1 backend: a fixed-function GL command surface.

mod driver;
mod renderer;
mod soft;

pub use driver::{
    ortho_matrix, ArraySource, Capability, ClientArrays, Gl11, GlBuffer, GlLight, GlMaterial,
    GlTexture, MatrixMode, ShadeModel, TexParam, MAX_GL_LIGHTS, VBO_EXTENSION,
};
pub use renderer::Gl11Renderer;
pub use soft::SoftGl;
