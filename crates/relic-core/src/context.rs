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

//! The context: the factory for every scene object, device and viewport.

use crate::device::Device;
use crate::renderer::{BackendKind, Renderer, RendererConfig, RendererFactory};
use crate::scene::{Frame, Light, LightType, Material, Mesh, Surface, Texture};
use crate::status::{RmError, RmResult};
use crate::viewport::Viewport;
use std::rc::Rc;

/// Creates scene objects and wires devices to renderers.
///
/// The context owns the renderer configuration and, optionally, a
/// [`RendererFactory`]. Devices created through the factory get a recreate
/// hook that selects a fresh renderer after device loss.
pub struct RmContext {
    config: RendererConfig,
    factory: Option<Rc<dyn RendererFactory>>,
}

impl RmContext {
    /// Creates a context without a renderer factory.
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            factory: None,
        }
    }

    /// Creates a context that builds renderers through `factory`.
    pub fn with_factory(config: RendererConfig, factory: Rc<dyn RendererFactory>) -> Self {
        Self {
            config,
            factory: Some(factory),
        }
    }

    /// The renderer configuration.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Creates a frame, attached to `parent` when given.
    pub fn create_frame(&self, parent: Option<&Frame>) -> RmResult<Frame> {
        let frame = Frame::new();
        if let Some(parent) = parent {
            parent.add_child(&frame)?;
        }
        Ok(frame)
    }

    /// Creates an empty mesh.
    pub fn create_mesh(&self) -> Mesh {
        Mesh::new()
    }

    /// Creates a light with an `0xAARRGGBB` colour.
    pub fn create_light(&self, kind: LightType, argb: u32) -> Light {
        Light::new(kind, argb)
    }

    /// Creates a light from float channels.
    pub fn create_light_rgb(&self, kind: LightType, r: f32, g: f32, b: f32) -> Light {
        Light::new_rgb(kind, r, g, b)
    }

    /// Creates a material with the given specular power.
    pub fn create_material(&self, power: f32) -> Material {
        Material::new(power)
    }

    /// Creates a texture over `surface`.
    pub fn create_texture(&self, surface: Surface) -> Texture {
        Texture::new(surface)
    }

    /// Wraps an already constructed renderer in a device at the configured
    /// virtual resolution.
    pub fn create_device(&self, renderer: Box<dyn Renderer>) -> Device {
        Device::new(
            self.config.virtual_width,
            self.config.virtual_height,
            renderer,
            &self.config,
        )
    }

    /// Selects a renderer through the factory and wraps it in a device.
    ///
    /// Returns the device and the backend that was chosen.
    pub fn create_device_from_factory(
        &self,
        window_width: u32,
        window_height: u32,
    ) -> RmResult<(Device, BackendKind)> {
        let factory = self.factory.clone().ok_or_else(|| {
            log::error!("No renderer factory installed on this context.");
            RmError::GenericFailure
        })?;
        if window_width == 0 || window_height == 0 {
            return Err(RmError::InvalidParameter);
        }

        let selection = factory
            .select(&self.config, window_width, window_height)
            .map_err(|err| {
                log::error!("Renderer selection failed: {err}");
                RmError::GenericFailure
            })?;
        log::info!(
            "Device created on {:?} after {} ms (attempted {:?}).",
            selection.kind,
            selection.selection_time_ms,
            selection.attempted_backends
        );

        let device = self.create_device(selection.renderer);
        device.set_recreate_hook(move |width, height, config| {
            factory
                .select(config, width, height)
                .map(|selection| selection.renderer)
                .map_err(|err| log::error!("Renderer recreation failed: {err}"))
                .ok()
        });
        Ok((device, selection.kind))
    }

    /// Creates a viewport on `device`.
    pub fn create_viewport(
        &self,
        device: &Device,
        camera: Option<&Frame>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> RmResult<Viewport> {
        device.create_viewport(camera, x, y, width, height)
    }
}

impl Default for RmContext {
    fn default() -> Self {
        Self::new(RendererConfig::default())
    }
}

impl std::fmt::Debug for RmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmContext")
            .field("config", &self.config)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::BackendInfo;
    use crate::testing::RecordingRenderer;
    use std::cell::{Cell, RefCell};

    /// Builds recording renderers for one backend kind only.
    struct OnlyFactory {
        kind: BackendKind,
        created: Cell<u32>,
        lose_next: Rc<Cell<bool>>,
        buffer_counts: RefCell<Vec<u32>>,
    }

    impl RendererFactory for OnlyFactory {
        fn enumerate(&self) -> Vec<BackendInfo> {
            vec![BackendInfo {
                kind: self.kind,
                driver: "recording".to_string(),
            }]
        }

        fn create(
            &self,
            kind: BackendKind,
            width: u32,
            height: u32,
            config: &RendererConfig,
        ) -> Option<Box<dyn Renderer>> {
            if kind != self.kind {
                return None;
            }
            self.created.set(self.created.get() + 1);
            self.buffer_counts.borrow_mut().push(config.buffer_count);
            let mut renderer = RecordingRenderer::new(width, height);
            renderer.lose_device_on_flip = self.lose_next.clone();
            Some(Box::new(renderer))
        }
    }

    fn factory(kind: BackendKind) -> Rc<OnlyFactory> {
        Rc::new(OnlyFactory {
            kind,
            created: Cell::new(0),
            lose_next: Rc::new(Cell::new(false)),
            buffer_counts: RefCell::new(Vec::new()),
        })
    }

    #[test]
    fn test_create_frame_attaches_to_parent() {
        let ctx = RmContext::default();
        let root = ctx.create_frame(None).unwrap();
        let child = ctx.create_frame(Some(&root)).unwrap();
        assert_eq!(child.parent(), Some(root.clone()));
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_device_from_factory_falls_back_in_order() {
        let factory = factory(BackendKind::FixedFunction);
        let ctx = RmContext::with_factory(RendererConfig::default(), factory.clone());
        let (device, kind) = ctx.create_device_from_factory(800, 600).unwrap();
        assert_eq!(kind, BackendKind::FixedFunction);
        assert_eq!(device.window_size(), (800, 600));
        assert_eq!((device.width(), device.height()), (640, 480));
        assert_eq!(factory.created.get(), 1);
    }

    #[test]
    fn test_device_from_factory_without_match_fails() {
        let config = RendererConfig {
            backends: vec![BackendKind::UnifiedGpu],
            ..RendererConfig::default()
        };
        let ctx = RmContext::with_factory(config, factory(BackendKind::OpenGl1));
        assert_eq!(
            ctx.create_device_from_factory(640, 480).unwrap_err(),
            RmError::GenericFailure
        );
        assert_eq!(
            RmContext::default()
                .create_device_from_factory(640, 480)
                .unwrap_err(),
            RmError::GenericFailure
        );
    }

    #[test]
    fn test_factory_device_recovers_from_device_loss() {
        let factory = factory(BackendKind::TileGpu);
        let ctx = RmContext::with_factory(RendererConfig::default(), factory.clone());
        let (device, _) = ctx.create_device_from_factory(640, 480).unwrap();
        let camera = ctx.create_frame(None).unwrap();
        let viewport = ctx
            .create_viewport(&device, Some(&camera), 0, 0, 640, 480)
            .unwrap();

        device.set_buffer_count(3).unwrap();
        factory.lose_next.set(true);
        assert_eq!(device.flip(), Err(RmError::GenericFailure));
        assert_eq!(factory.created.get(), 2);
        assert_eq!(*factory.buffer_counts.borrow(), vec![2, 3]);
        assert!(device.has_renderer());

        let root = ctx.create_frame(None).unwrap();
        viewport.render(&root).unwrap();
        device.flip().unwrap();
    }
}
