// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Everything the engine needs to know before initialization lives here:
// window geometry, requested layers/extensions, swapchain and rasterization
// preferences. The engine copies what it needs at startup and never reads
// the config again.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub capabilities: CapabilityConfig,
    pub device: DeviceConfig,
    pub swapchain: SwapchainConfig,
    pub pipeline: PipelineConfig,
    pub frames: FrameConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Triangle Engine".to_string(),
            x: 64,
            y: 64,
            width: 640,
            height: 480,
        }
    }
}

/// Requested layers and extensions, in the order they are enabled.
///
/// Validation layers are only requested when `debug.validation_layers` is on.
/// Surface and debug-utils instance extensions are added on top of
/// `instance_extensions` automatically.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub validation_layers: Vec<String>,
    pub instance_extensions: Vec<String>,
    pub device_extensions: Vec<String>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            validation_layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            instance_extensions: Vec::new(),
            device_extensions: vec!["VK_KHR_swapchain".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelection {
    /// First suitable device in enumeration order
    #[default]
    FirstSuitable,
    /// Discrete over integrated over anything else
    PreferDiscrete,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub selection: DeviceSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceFormat {
    B8g8r8a8Srgb,
    B8g8r8a8Unorm,
    R8g8b8a8Srgb,
    R8g8b8a8Unorm,
}

impl SurfaceFormat {
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::B8g8r8a8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::B8g8r8a8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::R8g8b8a8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::R8g8b8a8Unorm => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    SrgbNonlinear,
}

impl ColorSpace {
    pub fn to_vk(self) -> vk::ColorSpaceKHR {
        match self {
            Self::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

impl PresentMode {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

/// Swapchain negotiation preferences
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SwapchainConfig {
    pub surface_format: SurfaceFormat,
    pub color_space: ColorSpace,
    /// Tried in order; FIFO is the fallback since it is always available.
    pub present_modes: Vec<PresentMode>,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            surface_format: SurfaceFormat::B8g8r8a8Srgb,
            color_space: ColorSpace::SrgbNonlinear,
            present_modes: vec![PresentMode::Mailbox],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            Self::Fill => vk::PolygonMode::FILL,
            Self::Line => vk::PolygonMode::LINE,
            Self::Point => vk::PolygonMode::POINT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Front => vk::CullModeFlags::FRONT,
            Self::Back => vk::CullModeFlags::BACK,
            Self::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            Self::Clockwise => vk::FrontFace::CLOCKWISE,
            Self::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

/// Pipeline settings: shader blobs and fixed-function rasterization
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub clear_color: [f32; 4],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: PathBuf::from("shaders/vert.spv"),
            fragment_shader: PathBuf::from("shaders/frag.spv"),
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Clockwise,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Frame pacing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub max_frames_in_flight: usize,
    /// Fence watchdog. Unset means wait forever.
    pub fence_timeout_ms: Option<u64>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            fence_timeout_ms: None,
        }
    }
}

impl FrameConfig {
    /// Fence timeout in nanoseconds, as Vulkan wants it
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms
            .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load `config.toml`, falling back to defaults.
    ///
    /// Runs before the logger exists, so a load error is handed back for the
    /// caller to report once logging is up.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default("config.toml")
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
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

        config.validate()?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            anyhow::bail!(
                "window size must be non-zero, got {}x{}",
                self.window.width,
                self.window.height
            );
        }
        if self.frames.max_frames_in_flight == 0 {
            anyhow::bail!("frames.max_frames_in_flight must be at least 1");
        }
        Ok(())
    }

    /// Validation only in debug builds, and only if the config asks for it
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_fixed_triangle_setup() {
        let config = Config::default();
        assert_eq!(config.frames.max_frames_in_flight, 2);
        assert_eq!(config.capabilities.device_extensions, vec!["VK_KHR_swapchain"]);
        assert_eq!(config.pipeline.cull_mode.to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(config.pipeline.front_face.to_vk(), vk::FrontFace::CLOCKWISE);
        assert_eq!(config.device.selection, DeviceSelection::FirstSuitable);
        assert_eq!(config.frames.fence_timeout_ns(), u64::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 800

            [swapchain]
            present_modes = ["immediate", "mailbox"]

            [device]
            selection = "prefer_discrete"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 480);
        assert_eq!(
            config.swapchain.present_modes,
            vec![PresentMode::Immediate, PresentMode::Mailbox]
        );
        assert_eq!(config.swapchain.surface_format, SurfaceFormat::B8g8r8a8Srgb);
        assert_eq!(config.device.selection, DeviceSelection::PreferDiscrete);
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let parsed: std::result::Result<Config, _> = toml::from_str(
            r#"
            [pipeline]
            cull_mode = "sideways"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_frames_in_flight_is_invalid() {
        let mut config = Config::default();
        config.frames.max_frames_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn fence_timeout_converts_to_nanoseconds() {
        let frames = FrameConfig {
            max_frames_in_flight: 2,
            fence_timeout_ms: Some(250),
        };
        assert_eq!(frames.fence_timeout_ns(), 250_000_000);
    }

    #[test]
    fn load_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[capabilities]\nvalidation_layers = [\"LayerX\"]\n\n[frames]\nfence_timeout_ms = 1000"
        )
        .unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.capabilities.validation_layers, vec!["LayerX"]);
        assert_eq!(config.frames.fence_timeout_ms, Some(1000));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.window.title, "Triangle Engine");
    }

    #[test]
    fn malformed_file_falls_back_with_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window\nwidth = 800").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());

        let (config, error) = Config::load_or_default(file.path());
        assert_eq!(config.window.width, 640);
        let message = format!("{:#}", error.expect("parse error is reported"));
        assert!(message.contains("Failed to parse config file"), "{message}");
    }

    #[test]
    fn absent_file_has_no_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let (config, error) = Config::load_or_default(dir.path().join("absent.toml"));
        assert!(error.is_none());
        assert_eq!(config.frames.max_frames_in_flight, 2);
    }

    #[test]
    fn invalid_file_reports_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\nwidth = 0").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }
}
