// src/error.rs
//! Error taxonomy for device access, configuration and the presentation loop.
//!
//! Nothing here is retried automatically. Every error surfaces to the direct
//! caller; the presentation loop releases its device on every exit path.

use crate::device::DeviceGeometry;
use crate::display::LoopState;
use crate::pixels::PixelFormat;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Failures opening, querying, mapping or releasing a framebuffer device.
#[derive(Debug)]
pub enum DeviceError {
    /// The device node could not be opened read/write.
    Open { path: PathBuf, source: io::Error },
    /// A screen-info ioctl failed.
    Query {
        path: PathBuf,
        request: &'static str,
        source: io::Error,
    },
    /// The device reported a zero width or height.
    ZeroDimensions { path: PathBuf, width: u32, height: u32 },
    /// The reported stride or buffer length cannot hold the visible area.
    InconsistentGeometry { path: PathBuf, geometry: DeviceGeometry },
    /// mmap of the pixel buffer was rejected.
    Map {
        path: PathBuf,
        length: usize,
        source: io::Error,
    },
    /// munmap or close failed during release.
    Release { path: PathBuf, source: io::Error },
    /// The handle was already closed.
    Closed { path: PathBuf },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Open { path, source } => {
                write!(f, "failed to open framebuffer {}: {}", path.display(), source)
            }
            DeviceError::Query {
                path,
                request,
                source,
            } => write!(f, "{} failed on {}: {}", request, path.display(), source),
            DeviceError::ZeroDimensions {
                path,
                width,
                height,
            } => write!(
                f,
                "framebuffer {} reports zero dimensions ({}x{})",
                path.display(),
                width,
                height
            ),
            DeviceError::InconsistentGeometry { path, geometry } => write!(
                f,
                "framebuffer {} reports inconsistent geometry {:?}",
                path.display(),
                geometry
            ),
            DeviceError::Map {
                path,
                length,
                source,
            } => write!(
                f,
                "failed to map {} bytes of {}: {}",
                length,
                path.display(),
                source
            ),
            DeviceError::Release { path, source } => {
                write!(f, "failed to release {}: {}", path.display(), source)
            }
            DeviceError::Closed { path } => {
                write!(f, "framebuffer {} is already closed", path.display())
            }
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Open { source, .. }
            | DeviceError::Query { source, .. }
            | DeviceError::Map { source, .. }
            | DeviceError::Release { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Invalid or unsupported configuration, detected before any surface exists.
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: io::Error },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A fixed width or height of zero.
    ZeroDimension { axis: &'static str },
    /// `fps` was set to zero.
    ZeroFps,
    /// The requested area is larger than the device.
    ExceedsDevice {
        requested: (u32, u32),
        device: (u32, u32),
    },
    /// The device cannot show the requested pixel format.
    UnsupportedPixelFormat {
        format: PixelFormat,
        bits_per_pixel: u32,
    },
    /// No known pixel format matches the device.
    NoMatchingPixelFormat { bits_per_pixel: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::ZeroDimension { axis } => write!(f, "{} must be non-zero", axis),
            ConfigError::ZeroFps => write!(f, "fps must be non-zero when set"),
            ConfigError::ExceedsDevice { requested, device } => write!(
                f,
                "requested {}x{} exceeds device {}x{}",
                requested.0, requested.1, device.0, device.1
            ),
            ConfigError::UnsupportedPixelFormat {
                format,
                bits_per_pixel,
            } => write!(
                f,
                "pixel format {} is not supported by a {} bpp device",
                format, bits_per_pixel
            ),
            ConfigError::NoMatchingPixelFormat { bits_per_pixel } => write!(
                f,
                "no supported pixel format matches a {} bpp device",
                bits_per_pixel
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Two surfaces that were supposed to be paired do not share a geometry.
///
/// Surfaces are paired at construction and never resized, so this is a
/// programming error rather than a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryMismatchError {
    pub source_geometry: DeviceGeometry,
    pub source_format: PixelFormat,
    pub target_geometry: DeviceGeometry,
    pub target_format: PixelFormat,
}

impl fmt::Display for GeometryMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "surface geometry mismatch: {}x{} {} stride {} ({} bytes) vs {}x{} {} stride {} ({} bytes)",
            self.source_geometry.width,
            self.source_geometry.height,
            self.source_format,
            self.source_geometry.stride,
            self.source_geometry.length,
            self.target_geometry.width,
            self.target_geometry.height,
            self.target_format,
            self.target_geometry.stride,
            self.target_geometry.length,
        )
    }
}

impl std::error::Error for GeometryMismatchError {}

/// Application drawing code failed during a loop step.
#[derive(Debug)]
pub struct DrawCallbackError {
    /// Name the failing task was registered under.
    pub task: String,
    pub source: anyhow::Error,
}

impl fmt::Display for DrawCallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "draw task '{}' failed: {:#}", self.task, self.source)
    }
}

impl std::error::Error for DrawCallbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Everything the presentation loop can fail with.
#[derive(Debug)]
pub enum DisplayError {
    Device(DeviceError),
    Config(ConfigError),
    GeometryMismatch(GeometryMismatchError),
    DrawCallback(DrawCallbackError),
    /// The readiness monitor or another scheduler facility failed.
    EventLoop(anyhow::Error),
    /// `run()` was called on a loop that is not in the `Created` state.
    NotRunnable(LoopState),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::Device(e) => write!(f, "device error: {}", e),
            DisplayError::Config(e) => write!(f, "configuration error: {}", e),
            DisplayError::GeometryMismatch(e) => write!(f, "{}", e),
            DisplayError::DrawCallback(e) => write!(f, "{}", e),
            DisplayError::EventLoop(e) => write!(f, "event loop error: {:#}", e),
            DisplayError::NotRunnable(state) => {
                write!(f, "presentation loop cannot run from state {:?}", state)
            }
        }
    }
}

impl std::error::Error for DisplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DisplayError::Device(e) => Some(e),
            DisplayError::Config(e) => Some(e),
            DisplayError::GeometryMismatch(e) => Some(e),
            DisplayError::DrawCallback(e) => Some(e),
            DisplayError::EventLoop(e) => Some(&**e),
            DisplayError::NotRunnable(_) => None,
        }
    }
}

impl From<DeviceError> for DisplayError {
    fn from(err: DeviceError) -> Self {
        DisplayError::Device(err)
    }
}

impl From<ConfigError> for DisplayError {
    fn from(err: ConfigError) -> Self {
        DisplayError::Config(err)
    }
}

impl From<GeometryMismatchError> for DisplayError {
    fn from(err: GeometryMismatchError) -> Self {
        DisplayError::GeometryMismatch(err)
    }
}

impl From<DrawCallbackError> for DisplayError {
    fn from(err: DrawCallbackError) -> Self {
        DisplayError::DrawCallback(err)
    }
}
