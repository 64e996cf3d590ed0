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

//! Renderer configuration.

use super::backend::BackendKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by backend selection and the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Backends to try, most preferred first.
    pub backends: Vec<BackendKind>,
    /// Width of the virtual resolution the game draws in.
    pub virtual_width: u32,
    /// Height of the virtual resolution.
    pub virtual_height: u32,
    /// Number of frames in flight.
    pub buffer_count: u32,
    /// Multisample count. The unified GPU backend falls back to 1 when the
    /// adapter lacks it; the other backends always render single-sampled.
    pub msaa_samples: u32,
    /// Anisotropic filtering cap for scene textures on the unified GPU
    /// backend.
    pub anisotropy: f32,
    /// How long a fence or notification wait may block before the device is
    /// considered lost.
    pub fence_timeout_ms: u64,
    /// Whether drivers may fall back to a software implementation.
    pub software_fallback: bool,
    /// Initial dither state.
    pub dither: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backends: BackendKind::ALL.to_vec(),
            virtual_width: 640,
            virtual_height: 480,
            buffer_count: 2,
            msaa_samples: 1,
            anisotropy: 1.0,
            fence_timeout_ms: 1000,
            software_fallback: true,
            dither: false,
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&content)?)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The fence timeout as a [`Duration`].
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.backends[0], BackendKind::UnifiedGpu);
        assert_eq!((config.virtual_width, config.virtual_height), (640, 480));
        assert_eq!(config.buffer_count, 2);
        assert_eq!(config.fence_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            RendererConfig::from_json_str(r#"{ "backends": ["OpenGl1"], "dither": true }"#)
                .unwrap();
        assert_eq!(config.backends, vec![BackendKind::OpenGl1]);
        assert!(config.dither);
        assert_eq!(config.buffer_count, 2);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(RendererConfig::from_json_str(r#"{ "vsync": true }"#).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = RendererConfig::default();
        config.msaa_samples = 4;
        let json = config.to_json_string().unwrap();
        assert_eq!(RendererConfig::from_json_str(&json).unwrap(), config);
    }
}
