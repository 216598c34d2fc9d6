// src/lib.rs

//! Double-buffered drawing on Linux framebuffer devices.
//!
//! - [`device`]: opens an fbdev node, reads its geometry, maps its memory.
//! - [`surface`]: back/front surfaces and the full-frame blit.
//! - [`display`]: the presentation loop and the per-step [`display::Frame`].
//! - [`scheduler`]: the single-threaded cooperative scheduler under it.
//! - [`widgets`] and [`transition`]: small animation helpers.

pub mod config;
pub mod device;
pub mod display;
pub mod error;
pub mod os;
pub mod pixels;
pub mod scheduler;
pub mod surface;
pub mod transition;
pub mod widgets;

pub use config::{Dimension, DisplayConfig};
pub use device::{DeviceGeometry, FramebufferDevice, LinuxFramebuffer, MemoryFramebuffer};
pub use display::{BoxedTask, Display, Frame, LoopState, TaskSpawner};
pub use error::{ConfigError, DeviceError, DisplayError, DrawCallbackError, GeometryMismatchError};
pub use pixels::PixelFormat;
pub use scheduler::{StopHandle, TaskId, TaskStatus};
