// src/device/memory.rs

//! Headless in-memory framebuffer.
//!
//! Stands in for a real device when running without hardware and in tests.
//! The "screen" bytes survive `close()` so callers can inspect what was last
//! presented, and the device counts map/close calls for assertions.

use crate::device::{DeviceGeometry, FramebufferDevice};
use crate::error::DeviceError;
use crate::pixels::{PixelFormat, PixelLayout};
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};

pub struct MemoryFramebuffer {
    name: PathBuf,
    geometry: DeviceGeometry,
    layout: PixelLayout,
    screen: Vec<u8>,
    open: bool,
    mapped: bool,
    reject_map: bool,
    map_calls: usize,
    close_calls: usize,
}

impl MemoryFramebuffer {
    /// A device with the given geometry and channel layout, screen zeroed.
    pub fn new(geometry: DeviceGeometry, layout: PixelLayout) -> Result<Self, DeviceError> {
        let name = PathBuf::from("memory");
        geometry.validate(&name)?;
        info!(
            "MemoryFramebuffer: {}x{} @ {} bpp, stride {}",
            geometry.width, geometry.height, geometry.bits_per_pixel, geometry.stride
        );
        Ok(Self {
            name,
            geometry,
            layout,
            screen: vec![0u8; geometry.length],
            open: true,
            mapped: false,
            reject_map: false,
            map_calls: 0,
            close_calls: 0,
        })
    }

    /// A packed device showing `format` natively.
    pub fn with_format(width: u32, height: u32, format: PixelFormat) -> Result<Self, DeviceError> {
        Self::new(
            DeviceGeometry::packed(width, height, format.bits_per_pixel()),
            format.layout(),
        )
    }

    /// Makes every later `map_memory()` fail like a busy device would.
    pub fn reject_mapping(mut self) -> Self {
        self.reject_map = true;
        self
    }

    /// Current screen contents, readable even after close.
    pub fn screen(&self) -> &[u8] {
        &self.screen
    }

    /// Bytes of one visible row, or `None` below the visible area.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.geometry.height {
            return None;
        }
        let start = self.geometry.offset(0, y);
        self.screen
            .get(start..start + self.geometry.width as usize * self.geometry.bytes_per_pixel())
    }

    /// Bytes of pixel (x, y), or `None` outside the visible area.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        let start = self.geometry.offset(x, y);
        self.screen.get(start..start + self.geometry.bytes_per_pixel())
    }

    /// Number of successful mappings.
    pub fn map_calls(&self) -> usize {
        self.map_calls
    }

    /// Number of `close()` calls, including no-op repeats.
    pub fn close_calls(&self) -> usize {
        self.close_calls
    }
}

impl FramebufferDevice for MemoryFramebuffer {
    fn path(&self) -> &Path {
        &self.name
    }

    fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }

    fn layout(&self) -> PixelLayout {
        self.layout
    }

    fn map_memory(&mut self) -> Result<&mut [u8], DeviceError> {
        if !self.open {
            return Err(DeviceError::Closed {
                path: self.name.clone(),
            });
        }
        if !self.mapped {
            if self.reject_map {
                return Err(DeviceError::Map {
                    path: self.name.clone(),
                    length: self.geometry.length,
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                });
            }
            self.mapped = true;
            self.map_calls += 1;
            debug!("MemoryFramebuffer: mapped {} bytes", self.screen.len());
        }
        Ok(&mut self.screen)
    }

    fn is_mapped(&self) -> bool {
        self.mapped
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.close_calls += 1;
        if !self.open {
            return Ok(());
        }
        self.mapped = false;
        self.open = false;
        info!("MemoryFramebuffer: closed");
        Ok(())
    }
}
