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

//! The device: owner of the active renderer and the presentation settings.
//!
//! The game draws at a fixed virtual resolution. The device maps it into the
//! window with a uniform scale and centred letterbox bars, and forwards
//! presentation calls to the renderer. When the renderer reports a lost
//! device, the device tears it down, asks its recreate hook for a
//! replacement and restores the state the old one carried.

use crate::math::FColor;
use crate::object::{Object, ObjectCore};
use crate::renderer::{
    error::RenderError, FrameStats, Rect, Renderer, RendererConfig, ViewportTransform,
};
use crate::scene::{Frame, RenderQuality, Surface, Texture};
use crate::status::{RmError, RmResult};
use crate::viewport::Viewport;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Builds a replacement renderer of the given window size after device loss.
///
/// The configuration carries the device's current settings, so buffer count,
/// multisampling and dither changes reach the new renderer.
pub type RecreateHook = Box<dyn FnMut(u32, u32, &RendererConfig) -> Option<Box<dyn Renderer>>>;

/// Multisample counts a device accepts.
pub const MSAA_SAMPLE_COUNTS: [u32; 4] = [1, 2, 4, 8];

/// Texture filtering requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureQuality {
    /// Nearest-texel sampling.
    Nearest,
    /// Bilinear sampling.
    Linear,
}

/// Transparency handling requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Alpha-blended transparency.
    BlendedTransparency,
    /// Blended transparency with back-to-front sorting.
    SortedTransparency,
}

pub(crate) struct DeviceShared {
    core: ObjectCore,
    pub(crate) renderer: RefCell<Option<Box<dyn Renderer>>>,
    recreate: RefCell<Option<RecreateHook>>,
    virtual_width: u32,
    virtual_height: u32,
    window_size: Cell<(u32, u32)>,
    transform: Cell<ViewportTransform>,
    viewports: RefCell<Vec<Viewport>>,
    config: RendererConfig,
    buffer_count: Cell<u32>,
    msaa_samples: Cell<u32>,
    dither: Cell<bool>,
    quality: Cell<RenderQuality>,
    shades: Cell<u32>,
    texture_quality: Cell<TextureQuality>,
    render_mode: Cell<RenderMode>,
}

impl DeviceShared {
    /// Runs `f` against the active renderer.
    pub(crate) fn with_renderer<R>(&self, f: impl FnOnce(&mut dyn Renderer) -> R) -> RmResult<R> {
        let mut slot = self.renderer.borrow_mut();
        let renderer = slot.as_deref_mut().ok_or(RmError::GenericFailure)?;
        Ok(f(renderer))
    }

    /// Maps a renderer result to a status, recovering from device loss.
    pub(crate) fn check<T>(&self, result: Result<T, RenderError>) -> RmResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(RenderError::DeviceLost) => {
                log::error!("Graphics device lost; recreating the renderer.");
                self.recover();
                Err(RmError::GenericFailure)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn renderer_size(&self) -> Option<(u32, u32)> {
        self.renderer
            .borrow()
            .as_ref()
            .map(|r| (r.width(), r.height()))
    }

    /// The configuration a replacement renderer is built from.
    fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            buffer_count: self.buffer_count.get(),
            msaa_samples: self.msaa_samples.get(),
            dither: self.dither.get(),
            ..self.config.clone()
        }
    }

    fn recover(&self) {
        drop(self.renderer.borrow_mut().take());
        let (width, height) = self.window_size.get();
        let config = self.renderer_config();
        let replacement = self
            .recreate
            .borrow_mut()
            .as_mut()
            .and_then(|hook| hook(width, height, &config));
        match replacement {
            Some(renderer) => {
                log::info!("Recreated renderer \"{}\".", renderer.name());
                self.renderer.replace(Some(renderer));
                self.apply_window_size(width, height);
                let dither = self.dither.get();
                let _ = self.with_renderer(|r| r.set_dither(dither));
            }
            None => log::error!("No replacement renderer available; the device stays lost."),
        }
    }

    fn apply_window_size(&self, width: u32, height: u32) {
        let transform =
            ViewportTransform::fit(width, height, self.virtual_width, self.virtual_height);
        self.window_size.set((width, height));
        self.transform.set(transform);
        let _ = self.with_renderer(|r| {
            r.resize(width, height, transform);
            r.clear(0.0, 0.0, 0.0);
        });
        let viewports = self.viewports.borrow().clone();
        for viewport in viewports {
            viewport.update_projection();
        }
    }
}

/// A presentation device.
#[derive(Clone)]
pub struct Device(Rc<DeviceShared>);

impl Device {
    /// Wraps a renderer whose current size is the window size.
    pub fn new(
        virtual_width: u32,
        virtual_height: u32,
        renderer: Box<dyn Renderer>,
        config: &RendererConfig,
    ) -> Self {
        let window = (renderer.width(), renderer.height());
        let shared = Rc::new(DeviceShared {
            core: ObjectCore::new(),
            renderer: RefCell::new(Some(renderer)),
            recreate: RefCell::new(None),
            virtual_width: virtual_width.max(1),
            virtual_height: virtual_height.max(1),
            window_size: Cell::new(window),
            transform: Cell::new(ViewportTransform::IDENTITY),
            viewports: RefCell::new(Vec::new()),
            config: config.clone(),
            buffer_count: Cell::new(config.buffer_count.max(1)),
            msaa_samples: Cell::new(if MSAA_SAMPLE_COUNTS.contains(&config.msaa_samples) {
                config.msaa_samples
            } else {
                1
            }),
            dither: Cell::new(config.dither),
            quality: Cell::new(RenderQuality::Gouraud),
            shades: Cell::new(256),
            texture_quality: Cell::new(TextureQuality::Linear),
            render_mode: Cell::new(RenderMode::BlendedTransparency),
        });
        shared.apply_window_size(window.0, window.1);
        let dither = config.dither;
        let _ = shared.with_renderer(|r| r.set_dither(dither));
        Device(shared)
    }

    /// Installs the hook used to rebuild the renderer after device loss.
    pub fn set_recreate_hook(
        &self,
        hook: impl FnMut(u32, u32, &RendererConfig) -> Option<Box<dyn Renderer>> + 'static,
    ) {
        self.0.recreate.replace(Some(Box::new(hook)));
    }

    /// Virtual resolution width.
    pub fn width(&self) -> u32 {
        self.0.virtual_width
    }

    /// Virtual resolution height.
    pub fn height(&self) -> u32 {
        self.0.virtual_height
    }

    /// Window size in pixels.
    pub fn window_size(&self) -> (u32, u32) {
        self.0.window_size.get()
    }

    /// The current virtual-to-window mapping.
    pub fn viewport_transform(&self) -> ViewportTransform {
        self.0.transform.get()
    }

    /// Whether a renderer is installed.
    pub fn has_renderer(&self) -> bool {
        self.0.renderer.borrow().is_some()
    }

    /// The active renderer's name.
    pub fn renderer_name(&self) -> RmResult<String> {
        self.0.with_renderer(|r| r.name().to_string())
    }

    /// The active renderer's counters.
    pub fn stats(&self) -> RmResult<FrameStats> {
        self.0.with_renderer(|r| r.stats())
    }

    /// Resizes the window, refreshing the renderer and every viewport.
    pub fn resize(&self, window_width: u32, window_height: u32) -> RmResult<()> {
        if window_width == 0 || window_height == 0 {
            return Err(RmError::InvalidParameter);
        }
        self.0.apply_window_size(window_width, window_height);
        Ok(())
    }

    /// Sets the number of frames in flight. Takes effect on the next renderer.
    pub fn set_buffer_count(&self, count: u32) -> RmResult<()> {
        if count == 0 {
            return Err(RmError::InvalidParameter);
        }
        self.0.buffer_count.set(count);
        Ok(())
    }

    /// Number of frames in flight.
    pub fn buffer_count(&self) -> u32 {
        self.0.buffer_count.get()
    }

    /// Sets the multisample count. Takes effect on the next renderer.
    pub fn set_msaa_samples(&self, samples: u32) -> RmResult<()> {
        if !MSAA_SAMPLE_COUNTS.contains(&samples) {
            return Err(RmError::InvalidParameter);
        }
        self.0.msaa_samples.set(samples);
        Ok(())
    }

    /// The multisample count requested for renderers.
    pub fn msaa_samples(&self) -> u32 {
        self.0.msaa_samples.get()
    }

    /// The configuration the next renderer is built with: the device's
    /// creation settings updated with its current buffer count,
    /// multisampling and dither.
    pub fn renderer_config(&self) -> RendererConfig {
        self.0.renderer_config()
    }

    /// Enables or disables dithering.
    pub fn set_dither(&self, dither: bool) -> RmResult<()> {
        self.0.dither.set(dither);
        self.0.with_renderer(|r| r.set_dither(dither))
    }

    /// Whether dithering is enabled.
    pub fn dither(&self) -> bool {
        self.0.dither.get()
    }

    /// Sets the default shading quality.
    pub fn set_quality(&self, quality: RenderQuality) {
        self.0.quality.set(quality);
    }

    /// The default shading quality.
    pub fn quality(&self) -> RenderQuality {
        self.0.quality.get()
    }

    /// Sets the number of colour shades.
    pub fn set_shades(&self, shades: u32) -> RmResult<()> {
        if shades == 0 {
            return Err(RmError::InvalidParameter);
        }
        self.0.shades.set(shades);
        Ok(())
    }

    /// The number of colour shades.
    pub fn shades(&self) -> u32 {
        self.0.shades.get()
    }

    /// Sets the texture filtering quality.
    pub fn set_texture_quality(&self, quality: TextureQuality) {
        self.0.texture_quality.set(quality);
    }

    /// The texture filtering quality.
    pub fn texture_quality(&self) -> TextureQuality {
        self.0.texture_quality.get()
    }

    /// Sets the transparency mode.
    pub fn set_render_mode(&self, mode: RenderMode) {
        self.0.render_mode.set(mode);
    }

    /// The transparency mode.
    pub fn render_mode(&self) -> RenderMode {
        self.0.render_mode.get()
    }

    /// Creates a viewport of `width`×`height` virtual pixels looking through `camera`.
    pub fn create_viewport(
        &self,
        camera: Option<&Frame>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> RmResult<Viewport> {
        if width == 0 || height == 0 {
            return Err(RmError::InvalidParameter);
        }
        if x != 0 || y != 0 {
            log::debug!("Viewport origin ({x}, {y}) ignored; viewports cover the device.");
        }
        let viewport = Viewport::new(&self.0, width, height, camera);
        self.0.viewports.borrow_mut().push(viewport.clone());
        Ok(viewport)
    }

    /// The viewports created on this device.
    pub fn viewports(&self) -> Vec<Viewport> {
        self.0.viewports.borrow().clone()
    }

    /// Removes a viewport from the device's list.
    pub fn delete_viewport(&self, viewport: &Viewport) -> RmResult<()> {
        let mut viewports = self.0.viewports.borrow_mut();
        let index = viewports
            .iter()
            .position(|v| v == viewport)
            .ok_or(RmError::NotFound)?;
        viewports.remove(index);
        Ok(())
    }

    /// Maps a window point to virtual coordinates.
    pub fn convert_window_to_render(&self, x: f32, y: f32) -> (f32, f32) {
        self.0.transform.get().to_render(x, y)
    }

    /// Maps a virtual point to window coordinates.
    pub fn convert_render_to_window(&self, x: f32, y: f32) -> (f32, f32) {
        self.0.transform.get().to_window(x, y)
    }

    /// Draws part of a texture as a 2D overlay. Texture failures skip the draw.
    pub fn draw_2d_image(
        &self,
        texture: &Texture,
        src: Rect,
        dst: Rect,
        color: FColor,
    ) -> RmResult<()> {
        let scale = self.0.transform.get().scale;
        let scale_x = if src.w > 0 { dst.w as f32 / src.w as f32 } else { 1.0 } * scale;
        let scale_y = if src.h > 0 { dst.h as f32 / src.h as f32 } else { 1.0 } * scale;
        self.0.with_renderer(|r| {
            match r.get_texture_id(texture, true, scale_x, scale_y) {
                Ok(id) => r.draw_2d_image(id, src, dst, color),
                Err(err) => log::warn!("Skipping 2D image: {err}"),
            }
        })
    }

    /// Clears the whole target to a colour given as `0xAARRGGBB`.
    pub fn clear(&self, argb: u32) -> RmResult<()> {
        let c = FColor::from_argb(argb);
        self.0.with_renderer(|r| r.clear(c.r, c.g, c.b))
    }

    /// Presents the current frame.
    pub fn flip(&self) -> RmResult<()> {
        let result = self.0.with_renderer(|r| r.flip())?;
        self.0.check(result)
    }

    /// Presents the current frame.
    pub fn update(&self) -> RmResult<()> {
        self.flip()
    }

    /// Reads the presented image into `target`, scaled to its size.
    pub fn download(&self, target: &mut Surface) -> RmResult<()> {
        let result = self.0.with_renderer(|r| r.download(target))?;
        self.0.check(result)
    }
}

impl Object for Device {
    fn core(&self) -> &ObjectCore {
        &self.0.core
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("virtual_width", &self.0.virtual_width)
            .field("virtual_height", &self.0.virtual_height)
            .field("window_size", &self.0.window_size.get())
            .field("has_renderer", &self.has_renderer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, CallLog, RecordingRenderer};

    fn device(window_w: u32, window_h: u32) -> (Device, CallLog, Rc<Cell<bool>>) {
        let renderer = RecordingRenderer::new(window_w, window_h);
        let log = renderer.log.clone();
        let lose = renderer.lose_device_on_flip.clone();
        let device = Device::new(640, 480, Box::new(renderer), &RendererConfig::default());
        (device, log, lose)
    }

    #[test]
    fn test_new_device_sizes_renderer_and_letterboxes() {
        let (device, log, _) = device(800, 480);
        let transform = device.viewport_transform();
        assert_eq!(transform.scale, 1.0);
        assert_eq!(transform.offset_x, 80.0);
        assert_eq!(device.convert_window_to_render(80.0, 0.0), (0.0, 0.0));
        assert_eq!(device.convert_render_to_window(640.0, 480.0), (720.0, 480.0));
        assert!(matches!(log.borrow().first(), Some(Call::Resize(800, 480, _))));
    }

    #[test]
    fn test_resize_refreshes_viewport_projection() {
        let (device, log, _) = device(640, 480);
        let viewport = device.create_viewport(None, 0, 0, 640, 480).unwrap();
        assert!((viewport.projection_matrix().m[0][0] - 2.0).abs() < 1e-5);

        log.borrow_mut().clear();
        device.resize(1280, 480).unwrap();
        let narrowed = viewport.projection_matrix();
        assert!((narrowed.m[0][0] - 1.0).abs() < 1e-5);
        assert!(log
            .borrow()
            .iter()
            .any(|c| matches!(c, Call::SetProjection(m) if *m == narrowed)));
        assert_eq!(device.resize(0, 10), Err(RmError::InvalidParameter));
    }

    #[test]
    fn test_device_lost_recreates_renderer() {
        let (device, _, lose) = device(640, 480);
        device.set_dither(true).unwrap();
        let _viewport = device.create_viewport(None, 0, 0, 640, 480).unwrap();

        let replacement_log: Rc<RefCell<Option<CallLog>>> = Rc::new(RefCell::new(None));
        let sink = replacement_log.clone();
        device.set_recreate_hook(move |w, h, _| {
            let renderer = RecordingRenderer::new(w, h);
            sink.replace(Some(renderer.log.clone()));
            Some(Box::new(renderer) as Box<dyn Renderer>)
        });

        lose.set(true);
        assert_eq!(device.flip(), Err(RmError::GenericFailure));
        assert!(device.has_renderer());

        let calls = replacement_log.borrow().clone().unwrap();
        let calls = calls.borrow();
        assert!(matches!(calls.first(), Some(Call::Resize(640, 480, _))));
        assert!(calls.iter().any(|c| matches!(c, Call::SetProjection(_))));
        assert!(calls.contains(&Call::SetDither(true)));
        drop(calls);
        device.flip().unwrap();
    }

    #[test]
    fn test_replacement_renderer_gets_current_settings() {
        let (device, _, lose) = device(640, 480);
        device.set_buffer_count(3).unwrap();
        device.set_msaa_samples(4).unwrap();
        device.set_dither(true).unwrap();

        let seen: Rc<RefCell<Option<RendererConfig>>> = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        device.set_recreate_hook(move |w, h, config| {
            sink.replace(Some(config.clone()));
            Some(Box::new(RecordingRenderer::new(w, h)) as Box<dyn Renderer>)
        });

        lose.set(true);
        assert_eq!(device.flip(), Err(RmError::GenericFailure));
        let config = seen.borrow().clone().unwrap();
        assert_eq!(config.buffer_count, 3);
        assert_eq!(config.msaa_samples, 4);
        assert!(config.dither);
        assert_eq!(config.virtual_width, 640);
        assert_eq!(device.renderer_config(), config);
    }

    #[test]
    fn test_device_lost_without_hook_stays_lost() {
        let (device, _, lose) = device(640, 480);
        lose.set(true);
        assert_eq!(device.flip(), Err(RmError::GenericFailure));
        assert!(!device.has_renderer());
        assert_eq!(device.flip(), Err(RmError::GenericFailure));
        assert_eq!(device.renderer_name(), Err(RmError::GenericFailure));
    }

    #[test]
    fn test_settings_validate_and_persist() {
        let (device, _, _) = device(640, 480);
        assert_eq!(device.set_buffer_count(0), Err(RmError::InvalidParameter));
        assert_eq!(device.set_msaa_samples(3), Err(RmError::InvalidParameter));
        assert_eq!(device.set_shades(0), Err(RmError::InvalidParameter));
        device.set_buffer_count(3).unwrap();
        device.set_shades(16).unwrap();
        device.set_texture_quality(TextureQuality::Nearest);
        device.set_render_mode(RenderMode::SortedTransparency);
        device.set_quality(RenderQuality::Flat);
        assert_eq!(device.buffer_count(), 3);
        assert_eq!(device.shades(), 16);
        assert_eq!(device.texture_quality(), TextureQuality::Nearest);
        assert_eq!(device.render_mode(), RenderMode::SortedTransparency);
        assert_eq!(device.quality(), RenderQuality::Flat);
    }

    #[test]
    fn test_viewport_list_management() {
        let (device, _, _) = device(640, 480);
        assert_eq!(
            device.create_viewport(None, 0, 0, 0, 480).unwrap_err(),
            RmError::InvalidParameter
        );
        let viewport = device.create_viewport(None, 10, 10, 320, 240).unwrap();
        assert_eq!(device.viewports(), vec![viewport.clone()]);
        device.delete_viewport(&viewport).unwrap();
        assert_eq!(device.delete_viewport(&viewport), Err(RmError::NotFound));
    }

    #[test]
    fn test_draw_2d_image_and_clear_reach_renderer() {
        let (device, log, _) = device(640, 480);
        let texture = Texture::new(Surface::new_rgba(4, 4));
        log.borrow_mut().clear();
        device
            .draw_2d_image(
                &texture,
                Rect::new(0, 0, 4, 4),
                Rect::new(10, 10, 8, 8),
                FColor::WHITE,
            )
            .unwrap();
        device.clear(0xFF00_00FF).unwrap();
        let calls = log.borrow();
        assert!(matches!(
            calls.first(),
            Some(Call::Draw2d(_, src, dst)) if *src == Rect::new(0, 0, 4, 4) && dst.w == 8
        ));
        assert_eq!(calls.get(1), Some(&Call::Clear(0.0, 0.0, 1.0)));
    }
}
