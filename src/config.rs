// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and key is optional. A missing file yields the defaults; a
// malformed file is reported and also falls back to the defaults.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::input::Key;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub camera: CameraConfig,
    pub shaders: ShaderConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Engine".to_string(),
            width: 1024,
            height: 768,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl GraphicsConfig {
    /// Preferred present mode. The swapchain builder falls back to FIFO when
    /// the surface does not offer it.
    pub fn preferred_present_mode(&self) -> vk::PresentModeKHR {
        match self.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            other => {
                log::warn!("Unknown present mode '{}', preferring MAILBOX", other);
                vk::PresentModeKHR::MAILBOX
            }
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    /// Read static buffers back after upload and compare with the source data
    pub verify_uploads: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "cube_engine.log".to_string(),
            show_fps: true,
            verify_uploads: false,
        }
    }
}

/// Initial camera placement and tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    /// Degrees
    pub yaw: f32,
    /// Degrees
    pub pitch: f32,
    /// World units per second
    pub speed: f32,
    /// Degrees per pixel of mouse travel
    pub sensitivity: f32,
    /// Vertical field of view in degrees
    pub zoom: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 3.0],
            yaw: -90.0,
            pitch: 0.0,
            speed: 2.5,
            sensitivity: 0.1,
            zoom: 45.0,
        }
    }
}

/// Compiled SPIR-V locations, relative to the working directory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/cube.vert.spv"),
            fragment: PathBuf::from("shaders/cube.frag.spv"),
        }
    }
}

/// Control key bindings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub capture_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            capture_key: "M".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

/// Control bindings resolved to keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    pub fullscreen: Key,
    pub capture: Key,
    pub quit: Key,
}

impl ControlsConfig {
    pub fn bindings(&self) -> KeyBindings {
        KeyBindings {
            fullscreen: resolve_key(&self.fullscreen_key, Key::F11),
            capture: resolve_key(&self.capture_key, Key::M),
            quit: resolve_key(&self.quit_key, Key::Escape),
        }
    }
}

fn resolve_key(name: &str, fallback: Key) -> Key {
    Key::from_name(name).unwrap_or_else(|| {
        log::warn!("Unknown key '{}', using {:?}", name, fallback);
        fallback
    })
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 768);
        assert_eq!(config.window.title, "Vulkan Engine");
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.camera.zoom, 45.0);
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/cube.vert.spv"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            [window]
            width = 800

            [camera]
            speed = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 768);
        assert_eq!(config.camera.speed, 5.0);
        assert_eq!(config.camera.sensitivity, 0.1);
    }

    #[test]
    fn present_mode_names_map_to_vulkan() {
        let mut graphics = GraphicsConfig::default();
        assert_eq!(graphics.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);

        graphics.present_mode = "FIFO".to_string();
        assert_eq!(graphics.preferred_present_mode(), vk::PresentModeKHR::FIFO);

        graphics.present_mode = "warp-speed".to_string();
        assert_eq!(graphics.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Config::from_toml("[window\nwidth = ").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config.window.width, 1024);
    }

    #[test]
    fn control_bindings_resolve_with_fallback() {
        let controls = ControlsConfig {
            fullscreen_key: "F11".to_string(),
            capture_key: "nonsense".to_string(),
            quit_key: "q".to_string(),
        };
        let bindings = controls.bindings();
        assert_eq!(bindings.fullscreen, Key::F11);
        assert_eq!(bindings.capture, Key::M);
        assert_eq!(bindings.quit, Key::Q);
    }
}
