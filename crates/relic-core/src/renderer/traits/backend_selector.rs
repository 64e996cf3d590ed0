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

use super::renderer::Renderer;
use crate::renderer::api::{BackendInfo, BackendKind, RendererConfig};
use crate::renderer::error::RenderError;
use std::time::Instant;

/// The outcome of a successful [`RendererFactory::select`].
#[derive(Debug)]
pub struct RendererSelection {
    /// The constructed renderer.
    pub renderer: Box<dyn Renderer>,
    /// The backend that succeeded.
    pub kind: BackendKind,
    /// Time spent selecting, in milliseconds.
    pub selection_time_ms: u64,
    /// Every backend tried, in order, including the successful one.
    pub attempted_backends: Vec<BackendKind>,
}

/// A trait for a system that constructs renderers and picks one by preference.
///
/// A concrete implementation lives in `relic-infra`.
pub trait RendererFactory {
    /// Lists the backends this factory can construct, in preference order.
    fn enumerate(&self) -> Vec<BackendInfo>;

    /// Constructs a renderer of the given kind. Returns `None` when the
    /// backend cannot be initialized on this system.
    fn create(
        &self,
        kind: BackendKind,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> Option<Box<dyn Renderer>>;

    /// Tries each backend of `config.backends` in order and returns the first
    /// that initializes.
    fn select(
        &self,
        config: &RendererConfig,
        width: u32,
        height: u32,
    ) -> Result<RendererSelection, RenderError> {
        let start_time = Instant::now();
        let mut attempted_backends = Vec::new();

        log::info!("Starting renderer selection process...");

        for &kind in &config.backends {
            attempted_backends.push(kind);

            log::info!("Attempting to initialize {kind:?} backend...");

            match self.create(kind, width, height, config) {
                Some(renderer) => {
                    log::info!(
                        "Successfully selected {:?} backend: \"{}\"",
                        kind,
                        renderer.name()
                    );
                    return Ok(RendererSelection {
                        renderer,
                        kind,
                        selection_time_ms: start_time.elapsed().as_millis() as u64,
                        attempted_backends,
                    });
                }
                None => {
                    log::warn!("Failed to initialize {kind:?} backend.");
                    continue;
                }
            }
        }

        Err(RenderError::InitializationFailed(format!(
            "All backend attempts failed. Attempted: {attempted_backends:?}"
        )))
    }
}
