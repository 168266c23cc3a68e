//! Application configuration.

use std::time::Duration;

use uengine_gpu::RendererConfig;
use uengine_platform::PlatformConfig;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Clear color of the swapchain pass.
    pub clear_color: [f32; 4],
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "uengine".to_string(),
            width: 1200,
            height: 600,
            validation: cfg!(debug_assertions),
            clear_color: RendererConfig::default().clear_color,
            target_fps: None,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the target FPS.
    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Apply overrides from the process command line.
    #[must_use]
    pub fn from_args(self) -> Self {
        self.with_args(std::env::args().skip(1))
    }

    /// Apply `--width`, `--height`, `--fps`, `--validation` and
    /// `--no-validation`. Unknown flags and unparsable values are ignored.
    #[must_use]
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<I::Item> = args.into_iter().collect();
        let value = |i: usize| args.get(i + 1).and_then(|v| v.as_ref().parse::<u32>().ok());

        let mut i = 0;
        while i < args.len() {
            match args[i].as_ref() {
                "--width" => {
                    if let Some(v) = value(i).filter(|&v| v > 0) {
                        self.width = v;
                        i += 1;
                    }
                }
                "--height" => {
                    if let Some(v) = value(i).filter(|&v| v > 0) {
                        self.height = v;
                        i += 1;
                    }
                }
                "--fps" => {
                    if let Some(v) = value(i) {
                        self.target_fps = (v > 0).then_some(v);
                        i += 1;
                    }
                }
                "--validation" => self.validation = true,
                "--no-validation" => self.validation = false,
                _ => {}
            }
            i += 1;
        }
        self
    }

    /// Minimum frame duration implied by `target_fps`.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }

    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            ..PlatformConfig::default()
        }
    }

    pub const fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            clear_color: self.clear_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_open_a_1200_by_600_window() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (1200, 600));
        assert_eq!(config.validation, cfg!(debug_assertions));
        assert_eq!(config.target_fps, None);
        assert_eq!(config.clear_color, RendererConfig::default().clear_color);
    }

    #[test]
    fn builder_sets_fields() {
        let config = AppConfig::new("Editor")
            .with_size(800, 400)
            .with_validation(false)
            .with_clear_color([0.1, 0.1, 0.1, 1.0])
            .with_target_fps(60);
        assert_eq!(config.title, "Editor");
        assert_eq!((config.width, config.height), (800, 400));
        assert!(!config.validation);
        assert_eq!(config.renderer_config().clear_color, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(config.platform_config().title, "Editor");
        assert_eq!(config.platform_config().width, 800);
    }

    #[test]
    fn args_override_config() {
        let config = AppConfig::default()
            .with_validation(false)
            .with_args(["--width", "1024", "--height", "768", "--validation", "--fps", "30"]);
        assert_eq!((config.width, config.height), (1024, 768));
        assert!(config.validation);
        assert_eq!(config.target_fps, Some(30));

        let config = config.with_args(["--no-validation", "--fps", "0"]);
        assert!(!config.validation);
        assert_eq!(config.target_fps, None);
    }

    #[test]
    fn bad_args_are_ignored() {
        let config = AppConfig::default().with_args(["--width", "wide", "--height", "0", "--bogus", "--fps"]);
        assert_eq!((config.width, config.height), (1200, 600));
        assert_eq!(config.target_fps, None);
    }

    #[test]
    fn frame_time_follows_target_fps() {
        assert!(AppConfig::default().target_frame_time().is_none());
        let frame = AppConfig::default().with_target_fps(50).target_frame_time().unwrap();
        assert_relative_eq!(frame.as_secs_f64(), 0.02);
    }
}
