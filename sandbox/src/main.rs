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

//! Renders a lit, textured, spinning quad on every available backend and
//! logs what each one produced.

use anyhow::Context;
use relic_core::math::{Mat4, Rgba8, Vec2, Vec3};
use relic_core::renderer::{BackendKind, RendererConfig};
use relic_core::scene::{
    CombineType, LightType, Mesh, RenderQuality, Surface, Texture, Vertex,
};
use relic_core::RmContext;
use relic_infra::BackendRegistry;
use std::rc::Rc;

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;
const FRAMES: u32 = 8;

fn checker_texture() -> Texture {
    let mut surface = Surface::new_rgba(8, 8);
    for y in 0..8 {
        for x in 0..8 {
            let color = if (x + y) % 2 == 0 {
                Rgba8::WHITE
            } else {
                Rgba8::new(40, 90, 200, 255)
            };
            surface.put_pixel(x, y, color);
        }
    }
    Texture::new(surface)
}

fn textured_quad(texture: &Texture) -> anyhow::Result<Mesh> {
    let mesh = Mesh::new();
    let group = mesh.add_group(4, 2, 3, &[0, 1, 2, 0, 2, 3])?;
    let n = Vec3::new(0.0, 0.0, -1.0);
    mesh.set_vertices(
        group,
        0,
        &[
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), n, Vec2::new(0.0, 1.0)),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), n, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), n, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), n, Vec2::new(1.0, 1.0)),
        ],
    )?;
    mesh.set_group_color(group, 0xFFFF_FFFF)?;
    mesh.set_group_quality(group, RenderQuality::Gouraud)?;
    mesh.set_group_texture(group, Some(texture))?;
    Ok(mesh)
}

fn run(kind: BackendKind, config: &RendererConfig) -> anyhow::Result<()> {
    let registry = Rc::new(BackendRegistry::only(&[kind]));
    let ctx = RmContext::with_factory(
        RendererConfig {
            backends: vec![kind],
            ..config.clone()
        },
        registry,
    );
    let (device, chosen) = ctx
        .create_device_from_factory(WINDOW_WIDTH, WINDOW_HEIGHT)
        .with_context(|| format!("no device for {kind}"))?;
    log::info!("Rendering on {chosen} ({}).", device.renderer_name()?);

    let root = ctx.create_frame(None)?;
    root.set_scene_background(0xFF10_1018);
    root.add_light(&ctx.create_light(LightType::Ambient, 0xFF40_4040))?;
    let sun = ctx.create_frame(Some(&root))?;
    sun.add_light(&ctx.create_light(LightType::Directional, 0xFFC0_C0C0))?;

    let texture = checker_texture();
    let mesh = textured_quad(&texture)?;
    let model = ctx.create_frame(Some(&root))?;
    model.add_visual(&mesh)?;

    let camera = ctx.create_frame(None)?;
    camera.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -4.0)));
    let viewport = ctx.create_viewport(
        &device,
        Some(&camera),
        0,
        0,
        config.virtual_width,
        config.virtual_height,
    )?;

    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.1;
        model.add_transform(CombineType::Replace, Mat4::from_rotation_y(angle))?;
        viewport.clear()?;
        viewport.render(&root)?;
        device.flip()?;
    }

    let stats = device.stats()?;
    log::info!(
        "{chosen}: frame {} with {} draws, {} triangles, {} bytes resident.",
        stats.frame_number,
        stats.draw_calls,
        stats.triangles,
        stats.resident_bytes
    );

    let mut image = Surface::new_rgba(config.virtual_width, config.virtual_height);
    device.download(&mut image)?;
    let center = image.pixel(config.virtual_width / 2, config.virtual_height / 2);
    log::info!("{chosen}: centre pixel {center:?}.");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    relic_infra::logging::init();

    let config = RendererConfig::default();
    for kind in BackendKind::ALL {
        if let Err(err) = run(kind, &config) {
            log::error!("{kind} failed: {err:#}");
        }
    }
    Ok(())
}
