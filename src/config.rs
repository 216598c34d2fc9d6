// src/config.rs

//! Display configuration.
//!
//! A [`DisplayConfig`] is built once at startup (defaults, a JSON file, or
//! code) and handed by value to [`crate::display::Display`]. It is checked
//! against the opened device when the loop starts, before anything is
//! allocated or mapped.
//!
//! ```json
//! {
//!   "device_path": "/dev/fb1",
//!   "width": "auto",
//!   "height": 240,
//!   "pixel_format": "RGB565",
//!   "double_buffered": true,
//!   "fps": 10
//! }
//! ```

use crate::device::linux::DEFAULT_DEVICE_PATH;
use crate::device::DeviceGeometry;
use crate::error::ConfigError;
use crate::pixels::{PixelFormat, PixelLayout};
use log::debug;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the device path.
pub const FRAMEBUFFER_ENV: &str = "FRAMEBUFFER";

/// A requested width or height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawDimension", into = "RawDimension")]
pub enum Dimension {
    /// Use whatever the device reports.
    #[default]
    Auto,
    Pixels(u32),
}

impl Dimension {
    /// The effective size on a device of size `device`; `None` if it does not fit.
    fn resolve(self, device: u32) -> Option<u32> {
        match self {
            Dimension::Auto => Some(device),
            Dimension::Pixels(px) if px <= device => Some(px),
            Dimension::Pixels(_) => None,
        }
    }
}

// JSON form: the string "auto" or a pixel count.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawDimension {
    Keyword(String),
    Pixels(u32),
}

impl TryFrom<RawDimension> for Dimension {
    type Error = String;

    fn try_from(raw: RawDimension) -> Result<Self, Self::Error> {
        match raw {
            RawDimension::Keyword(k) if k.eq_ignore_ascii_case("auto") => Ok(Dimension::Auto),
            RawDimension::Keyword(k) => Err(format!(
                "expected \"auto\" or a pixel count, found \"{}\"",
                k
            )),
            RawDimension::Pixels(px) => Ok(Dimension::Pixels(px)),
        }
    }
}

impl From<Dimension> for RawDimension {
    fn from(dim: Dimension) -> Self {
        match dim {
            Dimension::Auto => RawDimension::Keyword("auto".to_string()),
            Dimension::Pixels(px) => RawDimension::Pixels(px),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub device_path: PathBuf,
    pub width: Dimension,
    pub height: Dimension,
    /// `None` picks a format matching the device.
    pub pixel_format: Option<PixelFormat>,
    /// Draw offscreen and copy on blit. When false, drawing goes straight
    /// to the screen and blits do nothing.
    pub double_buffered: bool,
    /// Forced presentation rate. `blit()` then only marks the frame dirty.
    pub fps: Option<u32>,
    /// Paint the screen black when the loop stops cleanly.
    pub clear_on_exit: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            width: Dimension::Auto,
            height: Dimension::Auto,
            pixel_format: None,
            double_buffered: true,
            fps: None,
            clear_on_exit: false,
        }
    }
}

impl DisplayConfig {
    /// Defaults, with the device path taken from `$FRAMEBUFFER` if set.
    pub fn from_env() -> Self {
        Self::default().with_framebuffer_override(std::env::var_os(FRAMEBUFFER_ENV))
    }

    fn with_framebuffer_override(mut self, value: Option<OsString>) -> Self {
        if let Some(path) = value.filter(|v| !v.is_empty()) {
            debug!("Using {} from ${}", Path::new(&path).display(), FRAMEBUFFER_ENV);
            self.device_path = PathBuf::from(path);
        }
        self
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Device-independent checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == Dimension::Pixels(0) {
            return Err(ConfigError::ZeroDimension { axis: "width" });
        }
        if self.height == Dimension::Pixels(0) {
            return Err(ConfigError::ZeroDimension { axis: "height" });
        }
        if self.fps == Some(0) {
            return Err(ConfigError::ZeroFps);
        }
        Ok(())
    }

    /// Checks this config against an opened device and returns the geometry
    /// and pixel format the surfaces will use.
    ///
    /// The geometry keeps the device's stride and buffer length so surfaces
    /// stay byte-compatible with device memory; only the visible area
    /// shrinks when fixed dimensions are requested.
    pub fn resolve(
        &self,
        device: DeviceGeometry,
        layout: &PixelLayout,
    ) -> Result<(DeviceGeometry, PixelFormat), ConfigError> {
        self.validate()?;

        let exceeds = || ConfigError::ExceedsDevice {
            requested: (
                match self.width {
                    Dimension::Auto => device.width,
                    Dimension::Pixels(px) => px,
                },
                match self.height {
                    Dimension::Auto => device.height,
                    Dimension::Pixels(px) => px,
                },
            ),
            device: (device.width, device.height),
        };
        let width = self.width.resolve(device.width).ok_or_else(exceeds)?;
        let height = self.height.resolve(device.height).ok_or_else(exceeds)?;

        let format = match self.pixel_format {
            Some(format) if format.is_supported_by(device.bits_per_pixel, layout) => format,
            Some(format) => {
                return Err(ConfigError::UnsupportedPixelFormat {
                    format,
                    bits_per_pixel: device.bits_per_pixel,
                })
            }
            None => PixelFormat::negotiate(device.bits_per_pixel, layout).ok_or(
                ConfigError::NoMatchingPixelFormat {
                    bits_per_pixel: device.bits_per_pixel,
                },
            )?,
        };

        Ok((device.with_visible_size(width, height), format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn rgb565_device() -> (DeviceGeometry, PixelLayout) {
        (
            DeviceGeometry::packed(160, 120, 16),
            PixelFormat::Rgb565.layout(),
        )
    }

    #[test]
    fn defaults_match_a_console_framebuffer() {
        let config = DisplayConfig::default();
        assert_eq!(config.device_path, PathBuf::from("/dev/fb0"));
        assert_eq!(config.width, Dimension::Auto);
        assert!(config.double_buffered);
        assert_eq!(config.fps, None);
        assert!(!config.clear_on_exit);
    }

    #[test]
    fn json_accepts_auto_and_pixel_counts() {
        let config: DisplayConfig = serde_json::from_str(
            r#"{"device_path": "/dev/fb1", "width": "auto", "height": 100,
                "pixel_format": "RGBA32", "double_buffered": false}"#,
        )
        .unwrap();
        assert_eq!(config.device_path, PathBuf::from("/dev/fb1"));
        assert_eq!(config.width, Dimension::Auto);
        assert_eq!(config.height, Dimension::Pixels(100));
        assert_eq!(config.pixel_format, Some(PixelFormat::Argb8888));
        assert!(!config.double_buffered);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["width"], "auto");
        assert_eq!(json["height"], 100);
    }

    #[test]
    fn json_rejects_unknown_dimension_keywords() {
        let err = serde_json::from_str::<DisplayConfig>(r#"{"width": "full"}"#).unwrap_err();
        assert!(err.to_string().contains("auto"));
    }

    #[test]
    fn validate_rejects_zero_values() {
        let zero_width = DisplayConfig {
            width: Dimension::Pixels(0),
            ..Default::default()
        };
        assert!(matches!(
            zero_width.validate(),
            Err(ConfigError::ZeroDimension { axis: "width" })
        ));

        let zero_fps = DisplayConfig {
            fps: Some(0),
            ..Default::default()
        };
        assert!(matches!(zero_fps.validate(), Err(ConfigError::ZeroFps)));
    }

    #[test]
    fn auto_resolves_to_device_geometry_and_format() {
        let (device, layout) = rgb565_device();
        let (geometry, format) = DisplayConfig::default().resolve(device, &layout).unwrap();
        assert_eq!(geometry, device);
        assert_eq!(format, PixelFormat::Rgb565);
    }

    #[test]
    fn fixed_dimensions_shrink_the_visible_area_only() {
        let (device, layout) = rgb565_device();
        let config = DisplayConfig {
            width: Dimension::Pixels(100),
            height: Dimension::Pixels(50),
            ..Default::default()
        };
        let (geometry, _) = config.resolve(device, &layout).unwrap();
        assert_eq!((geometry.width, geometry.height), (100, 50));
        assert_eq!(geometry.stride, 320);
        assert_eq!(geometry.length, device.length);
    }

    #[test]
    fn oversize_dimensions_exceed_the_device() {
        let (device, layout) = rgb565_device();
        let config = DisplayConfig {
            height: Dimension::Pixels(480),
            ..Default::default()
        };
        match config.resolve(device, &layout) {
            Err(ConfigError::ExceedsDevice { requested, device }) => {
                assert_eq!(requested, (160, 480));
                assert_eq!(device, (160, 120));
            }
            other => panic!("expected ExceedsDevice, got {:?}", other),
        }
    }

    #[test]
    fn unsupported_pixel_format_is_rejected() {
        let (device, layout) = rgb565_device();
        let config = DisplayConfig {
            pixel_format: Some(PixelFormat::Argb8888),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(device, &layout),
            Err(ConfigError::UnsupportedPixelFormat {
                format: PixelFormat::Argb8888,
                bits_per_pixel: 16
            })
        ));
    }

    #[test]
    fn unknown_depth_has_no_matching_format() {
        let device = DeviceGeometry::packed(64, 64, 8);
        assert!(matches!(
            DisplayConfig::default().resolve(device, &PixelLayout::default()),
            Err(ConfigError::NoMatchingPixelFormat { bits_per_pixel: 8 })
        ));
    }

    #[test]
    fn framebuffer_override_replaces_device_path() {
        let config =
            DisplayConfig::default().with_framebuffer_override(Some(OsString::from("/dev/fb2")));
        assert_eq!(config.device_path, PathBuf::from("/dev/fb2"));

        let unchanged = DisplayConfig::default().with_framebuffer_override(Some(OsString::new()));
        assert_eq!(unchanged.device_path, PathBuf::from("/dev/fb0"));
    }

    #[test]
    fn load_reads_and_validates_files() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("fbtft-config-{}.json", std::process::id()));
        fs::write(&good, r#"{"fps": 15, "clear_on_exit": true}"#).unwrap();
        let config = DisplayConfig::load(&good).unwrap();
        assert_eq!(config.fps, Some(15));
        assert!(config.clear_on_exit);
        assert!(config.double_buffered);

        fs::write(&good, r#"{"fps": 0}"#).unwrap();
        assert!(matches!(DisplayConfig::load(&good), Err(ConfigError::ZeroFps)));

        fs::write(&good, "not json").unwrap();
        assert!(matches!(
            DisplayConfig::load(&good),
            Err(ConfigError::Parse { .. })
        ));
        fs::remove_file(&good).unwrap();

        assert!(matches!(
            DisplayConfig::load(dir.join("fbtft-missing-config.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
