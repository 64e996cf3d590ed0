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

use crate::math::{FColor, Mat4, Plane};
use crate::renderer::api::*;
use crate::renderer::error::{RenderError, ResourceError};
use crate::scene::{Mesh, Surface, Texture};

/// Trait representing a rendering backend.
///
/// A frame is driven as `push_lights`, `begin_frame`, any number of
/// `submit_draw`, optionally `enable_transparency` followed by the blended
/// draws, then `finalize_frame`. `flip` presents it. The first `clear`,
/// `begin_frame` or `draw_2d_image` after a flip opens the scene.
pub trait Renderer: std::fmt::Debug {
    /// A human-readable backend name.
    fn name(&self) -> &str;

    /// The backend family.
    fn kind(&self) -> BackendKind;

    /// Render target width in pixels.
    fn width(&self) -> u32;

    /// Render target height in pixels.
    fn height(&self) -> u32;

    /// Sets the lights used by the next frame.
    fn push_lights(&mut self, lights: &[SceneLight]);

    /// Sets the projection matrix and the clip distances it was built from.
    fn set_projection(&mut self, projection: &Mat4, front: f32, back: f32);

    /// Sets the view-space frustum planes, for backends that cull per group.
    fn set_frustum_planes(&mut self, planes: &[Plane; 6]);

    /// Returns the cache id of a texture, uploading or refreshing it as needed.
    fn get_texture_id(
        &mut self,
        texture: &Texture,
        is_ui: bool,
        scale_x: f32,
        scale_y: f32,
    ) -> Result<u32, ResourceError>;

    /// Returns the cache id of a mesh group, uploading or refreshing it as needed.
    fn get_mesh_id(&mut self, mesh: &Mesh, group: usize) -> Result<u32, ResourceError>;

    /// Opens the 3D pass and uploads the light list.
    fn begin_frame(&mut self) -> Result<(), RenderError>;

    /// Switches the rest of the frame to blended, depth-read-only drawing.
    fn enable_transparency(&mut self);

    /// Draws a cached mesh group. Unknown ids are skipped.
    fn submit_draw(&mut self, mesh_id: u32, params: &DrawParams, appearance: &Appearance);

    /// Closes the 3D pass.
    fn finalize_frame(&mut self) -> Result<(), RenderError>;

    /// Resizes the render target.
    fn resize(&mut self, width: u32, height: u32, transform: ViewportTransform);

    /// Clears colour and depth.
    fn clear(&mut self, r: f32, g: f32, b: f32);

    /// Presents the frame and recycles the next buffer index.
    fn flip(&mut self) -> Result<(), RenderError>;

    /// Draws the `src` part of a UI texture into `dst`, both in virtual pixels.
    fn draw_2d_image(&mut self, texture_id: u32, src: Rect, dst: Rect, color: FColor);

    /// Reads the presented image back into `target`, cropping the letterbox.
    fn download(&mut self, target: &mut Surface) -> Result<(), RenderError>;

    /// Enables or disables dithering.
    fn set_dither(&mut self, dither: bool);

    /// Activity counters.
    fn stats(&self) -> FrameStats;
}
