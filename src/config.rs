// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// The editor runs without any config file; config.toml only overrides the
// defaults below. A malformed file is reported and ignored.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
    pub assets: AssetsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkscene".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Requested MSAA sample count; clamped to what the device supports
    pub msaa_samples: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.1, 0.2, 0.3, 1.0],
            max_frames_in_flight: 2,
            msaa_samples: 4,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            show_fps: true,
        }
    }
}

/// Camera control tuning
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// World units per second
    pub move_speed: f32,
    /// Degrees per second per pixel of mouse travel
    pub mouse_sensitivity: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            move_speed: 2.5,
            mouse_sensitivity: 6.0,
        }
    }
}

/// Asset locations. Missing assets fall back to procedural content.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub model: Option<PathBuf>,
    pub skybox_dir: Option<PathBuf>,
    pub shader_dir: PathBuf,
    pub hot_reload: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            model: None,
            skybox_dir: None,
            shader_dir: PathBuf::from("shaders"),
            hot_reload: true,
        }
    }
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

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Log filter for env_logger; unknown names mean `info`
    pub fn log_filter(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.assets.shader_dir, PathBuf::from("shaders"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graphics]\nmsaa_samples = 8\npresent_mode = \"mailbox\"").unwrap();
        writeln!(file, "[assets]\nmodel = \"scene.gltf\"").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.graphics.msaa_samples, 8);
        assert_eq!(config.present_mode(), ash::vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.assets.model, Some(PathBuf::from("scene.gltf")));
        assert_eq!(config.window.title, "vkscene");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window\nwidth = ").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn unknown_values_fall_back() {
        let mut config = Config::default();
        config.graphics.present_mode = "vsync-please".into();
        config.debug.log_level = "chatty".into();
        assert_eq!(config.present_mode(), ash::vk::PresentModeKHR::FIFO);
        assert_eq!(config.log_filter(), log::LevelFilter::Info);
    }
}
