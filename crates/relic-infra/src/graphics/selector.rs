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

//! The renderer factory that wires every backend into the scene graph.
//!
//! [`BackendRegistry`] implements [`RendererFactory`], so the context's
//! `select` walks the configured preference list and falls back to the next
//! backend whenever construction fails.

use super::fixed::{FixedRenderer, SoftFixedDevice};
use super::gl1::{Gl11Renderer, SoftGl};
use super::gpu::{GpuRenderer, SoftGpuDriver};
use super::tile::{SoftTileDriver, TileRenderer};
use relic_core::renderer::{BackendInfo, BackendKind, Renderer, RendererConfig, RendererFactory};

/// Constructs renderers for every backend this crate ships.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    available: Vec<BackendKind>,
}

impl BackendRegistry {
    /// A registry offering every backend.
    pub fn new() -> Self {
        Self {
            available: BackendKind::ALL.to_vec(),
        }
    }

    /// A registry restricted to `kinds`, e.g. to force a fallback.
    pub fn only(kinds: &[BackendKind]) -> Self {
        Self {
            available: BackendKind::ALL
                .into_iter()
                .filter(|k| kinds.contains(k))
                .collect(),
        }
    }

    fn driver_name(kind: BackendKind) -> &'static str {
        match kind {
            #[cfg(feature = "wgpu")]
            BackendKind::UnifiedGpu => "wgpu",
            _ => "software",
        }
    }

    #[cfg(feature = "wgpu")]
    fn create_gpu(width: u32, height: u32, config: &RendererConfig) -> anyhow::Result<Box<dyn Renderer>> {
        use super::gpu::WgpuDriver;
        match WgpuDriver::new(config) {
            Ok(driver) => Ok(Box::new(GpuRenderer::new(driver, width, height, config)?)),
            Err(err) if config.software_fallback => {
                log::warn!("wgpu unavailable ({err:#}), using the software GPU driver");
                Ok(Box::new(GpuRenderer::new(SoftGpuDriver::new(), width, height, config)?))
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(not(feature = "wgpu"))]
    fn create_gpu(width: u32, height: u32, config: &RendererConfig) -> anyhow::Result<Box<dyn Renderer>> {
        Ok(Box::new(GpuRenderer::new(SoftGpuDriver::new(), width, height, config)?))
    }

    fn try_create(
        kind: BackendKind,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> anyhow::Result<Box<dyn Renderer>> {
        anyhow::ensure!(width > 0 && height > 0, "zero-sized window {width}x{height}");
        Ok(match kind {
            BackendKind::UnifiedGpu => Self::create_gpu(width, height, config)?,
            BackendKind::TileGpu => Box::new(TileRenderer::new(
                SoftTileDriver::new(),
                width,
                height,
                config,
            )?),
            BackendKind::FixedFunction => Box::new(FixedRenderer::new(
                SoftFixedDevice::new(),
                width,
                height,
                config,
            )?),
            BackendKind::OpenGl1 => Box::new(Gl11Renderer::new(
                SoftGl::new(width, height),
                width,
                height,
                config,
            )?),
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererFactory for BackendRegistry {
    fn enumerate(&self) -> Vec<BackendInfo> {
        self.available
            .iter()
            .map(|&kind| BackendInfo {
                kind,
                driver: Self::driver_name(kind).to_string(),
            })
            .collect()
    }

    fn create(
        &self,
        kind: BackendKind,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> Option<Box<dyn Renderer>> {
        if !self.available.contains(&kind) {
            log::debug!("{kind} is not offered by this registry");
            return None;
        }
        Self::try_create(kind, width, height, config)
            .map_err(|err| log::warn!("{kind} backend failed to initialize: {err:#}"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_in_preference_order() {
        let kinds: Vec<_> = BackendRegistry::new().enumerate().iter().map(|b| b.kind).collect();
        assert_eq!(kinds, BackendKind::ALL.to_vec());
        let kinds: Vec<_> = BackendRegistry::only(&[BackendKind::OpenGl1, BackendKind::TileGpu])
            .enumerate()
            .iter()
            .map(|b| b.kind)
            .collect();
        assert_eq!(kinds, vec![BackendKind::TileGpu, BackendKind::OpenGl1]);
    }

    #[test]
    fn test_every_backend_constructs() {
        let registry = BackendRegistry::new();
        let config = RendererConfig::default();
        for kind in [BackendKind::TileGpu, BackendKind::FixedFunction, BackendKind::OpenGl1] {
            let renderer = registry.create(kind, 320, 240, &config).unwrap();
            assert_eq!(renderer.kind(), kind);
            assert_eq!((renderer.width(), renderer.height()), (320, 240));
        }
    }

    #[test]
    fn test_zero_size_fails_construction() {
        let registry = BackendRegistry::new();
        let config = RendererConfig::default();
        assert!(registry.create(BackendKind::FixedFunction, 0, 240, &config).is_none());
    }

    #[test]
    fn test_select_falls_back_to_offered_backend() {
        let registry = BackendRegistry::only(&[BackendKind::FixedFunction]);
        let selection = registry
            .select(&RendererConfig::default(), 320, 240)
            .unwrap();
        assert_eq!(selection.kind, BackendKind::FixedFunction);
        assert_eq!(
            selection.attempted_backends,
            vec![BackendKind::UnifiedGpu, BackendKind::TileGpu, BackendKind::FixedFunction]
        );
    }
}
