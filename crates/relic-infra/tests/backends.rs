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

//! Whole scenes driven through every software backend.

use relic_core::math::{FColor, Mat4, Rgba8, Vec2, Vec3};
use relic_core::renderer::{
    BackendInfo, BackendKind, Rect, Renderer, RendererConfig, RendererFactory,
};
use relic_core::scene::{Frame, Light, LightType, Mesh, RenderQuality, Surface, Texture, Vertex};
use relic_core::{Device, RmContext, RmError, Viewport};
use relic_infra::graphics::fixed::{FixedRenderer, SoftFixedDevice};
use relic_infra::BackendRegistry;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const RED: u32 = 0xFFFF_0000;

fn config() -> RendererConfig {
    RendererConfig {
        virtual_width: WIDTH,
        virtual_height: HEIGHT,
        ..RendererConfig::default()
    }
}

fn device(kind: BackendKind, window_width: u32, window_height: u32) -> Device {
    relic_infra::logging::init_for_tests();
    let renderer = BackendRegistry::new()
        .create(kind, window_width, window_height, &config())
        .unwrap_or_else(|| panic!("{kind} failed to construct"));
    RmContext::new(config()).create_device(renderer)
}

/// A red unit quad at the origin, front-facing for a camera looking down +z.
fn quad(quality: RenderQuality) -> Mesh {
    let mesh = Mesh::new();
    let g = mesh.add_group(4, 2, 3, &[0, 1, 2, 0, 2, 3]).unwrap();
    let n = Vec3::new(0.0, 0.0, -1.0);
    mesh.set_vertices(
        g,
        0,
        &[
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), n, Vec2::ZERO),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), n, Vec2::ZERO),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), n, Vec2::ZERO),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), n, Vec2::ZERO),
        ],
    )
    .unwrap();
    mesh.set_group_color(g, RED).unwrap();
    mesh.set_group_quality(g, quality).unwrap();
    mesh
}

struct Scene {
    root: Frame,
    viewport: Viewport,
}

fn scene(device: &Device, mesh: &Mesh) -> Scene {
    let root = Frame::new();
    root.add_light(&Light::new(LightType::Ambient, 0xFFFF_FFFF)).unwrap();
    let model = Frame::new();
    model.add_visual(mesh).unwrap();
    root.add_child(&model).unwrap();

    let camera = Frame::new();
    camera.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
    let viewport = device
        .create_viewport(Some(&camera), 0, 0, WIDTH, HEIGHT)
        .unwrap();
    Scene { root, viewport }
}

fn render(device: &Device, scene: &Scene) {
    scene.viewport.clear().unwrap();
    scene.viewport.render(&scene.root).unwrap();
    device.flip().unwrap();
}

fn download(device: &Device) -> Surface {
    let mut out = Surface::new_rgba(WIDTH, HEIGHT);
    device.download(&mut out).unwrap();
    out
}

#[test]
fn test_quad_renders_on_every_backend() {
    for kind in BackendKind::ALL {
        for (quality, vertices) in [(RenderQuality::Gouraud, 4), (RenderQuality::Flat, 6)] {
            let device = device(kind, WIDTH, HEIGHT);
            let mesh = quad(quality);
            let scene = scene(&device, &mesh);
            render(&device, &scene);

            let stats = device.stats().unwrap();
            assert_eq!(stats.draw_calls, 1, "{kind} {quality:?}");
            assert_eq!(stats.triangles, 2, "{kind} {quality:?}");
            assert_eq!(stats.last_draw_vertex_count, vertices, "{kind} {quality:?}");

            let image = download(&device);
            let center = image.pixel(WIDTH / 2, HEIGHT / 2);
            assert_eq!(center, Rgba8::new(255, 0, 0, 255), "{kind} {quality:?}");
            assert_eq!(image.pixel(0, 0), Rgba8::BLACK, "{kind} {quality:?}");
        }
    }
}

#[test]
fn test_download_crops_letterbox_on_every_backend() {
    let texture = Texture::new(Surface::filled(4, 4, Rgba8::WHITE));
    for kind in BackendKind::ALL {
        let device = device(kind, WIDTH + 16, HEIGHT);
        assert_eq!(device.viewport_transform().offset_x, 8.0, "{kind}");
        device.clear(0xFF00_0000).unwrap();
        device
            .draw_2d_image(
                &texture,
                Rect::new(0, 0, 4, 4),
                Rect::new(0, 0, WIDTH as i32, HEIGHT as i32),
                FColor::WHITE,
            )
            .unwrap();
        device.flip().unwrap();

        let image = download(&device);
        assert_eq!(image.pixel(0, 0), Rgba8::WHITE, "{kind}");
        assert_eq!(image.pixel(WIDTH - 1, HEIGHT - 1), Rgba8::WHITE, "{kind}");
    }
}

#[test]
fn test_resident_bytes_return_to_zero_after_release() {
    for kind in BackendKind::ALL {
        let device = device(kind, WIDTH, HEIGHT);
        let texture = Texture::new(Surface::filled(8, 8, Rgba8::WHITE));
        let mesh = quad(RenderQuality::Gouraud);
        mesh.set_group_texture(0, Some(&texture)).unwrap();
        let scene = scene(&device, &mesh);
        render(&device, &scene);
        assert!(device.stats().unwrap().resident_bytes > 0, "{kind}");

        drop(scene);
        drop(mesh);
        drop(texture);
        // Enough flips for every frame in flight to retire.
        for _ in 0..4 {
            device.flip().unwrap();
        }
        assert_eq!(device.stats().unwrap().resident_bytes, 0, "{kind}");
    }
}

#[test]
fn test_resident_bytes_balance_over_refresh_cycles() {
    const CYCLES: u32 = 5;
    for kind in BackendKind::ALL {
        let device = device(kind, WIDTH, HEIGHT);
        for cycle in 0..CYCLES {
            let texture = Texture::new(Surface::filled(8, 8, Rgba8::WHITE));
            let mesh = quad(RenderQuality::Gouraud);
            mesh.set_group_texture(0, Some(&texture)).unwrap();
            let scene = scene(&device, &mesh);
            render(&device, &scene);

            let vertices = mesh.vertices(0, 0, 4).unwrap();
            mesh.set_vertices(0, 0, &vertices).unwrap();
            texture.changed(true, false);
            render(&device, &scene);

            texture.replace_surface(Surface::filled(16, 4, Rgba8::WHITE));
            render(&device, &scene);
            assert!(device.stats().unwrap().resident_bytes > 0, "{kind} cycle {cycle}");

            drop(scene);
            drop(mesh);
            drop(texture);
            for _ in 0..4 {
                device.flip().unwrap();
            }
            assert_eq!(device.stats().unwrap().resident_bytes, 0, "{kind} cycle {cycle}");
        }
        let stats = device.stats().unwrap();
        assert_eq!(stats.texture_uploads, 3 * CYCLES, "{kind}");
        assert_eq!(stats.mesh_uploads, 2 * CYCLES, "{kind}");
    }
}

/// Builds fixed-function renderers whose devices can be lost on demand.
#[derive(Default)]
struct LosableFactory {
    handles: RefCell<Vec<Rc<Cell<bool>>>>,
}

impl RendererFactory for LosableFactory {
    fn enumerate(&self) -> Vec<BackendInfo> {
        vec![BackendInfo {
            kind: BackendKind::FixedFunction,
            driver: "software".to_string(),
        }]
    }

    fn create(
        &self,
        kind: BackendKind,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> Option<Box<dyn Renderer>> {
        if kind != BackendKind::FixedFunction {
            return None;
        }
        let device = SoftFixedDevice::new();
        self.handles.borrow_mut().push(device.lose_handle());
        let renderer = FixedRenderer::new(device, width, height, config).ok()?;
        Some(Box::new(renderer))
    }
}

#[test]
fn test_lost_device_is_recreated_through_the_factory() {
    let factory = Rc::new(LosableFactory::default());
    let ctx = RmContext::with_factory(config(), factory.clone());
    let (device, kind) = ctx.create_device_from_factory(WIDTH, HEIGHT).unwrap();
    assert_eq!(kind, BackendKind::FixedFunction);

    let mesh = quad(RenderQuality::Gouraud);
    let scene = scene(&device, &mesh);
    render(&device, &scene);

    factory.handles.borrow()[0].set(true);
    assert_eq!(device.flip(), Err(RmError::GenericFailure));
    assert_eq!(factory.handles.borrow().len(), 2);
    assert!(device.has_renderer());

    render(&device, &scene);
    let image = download(&device);
    assert_eq!(image.pixel(WIDTH / 2, HEIGHT / 2), Rgba8::new(255, 0, 0, 255));
}
