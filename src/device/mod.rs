// src/device/mod.rs
//! Framebuffer device adapter.
//!
//! A [`FramebufferDevice`] turns an OS pixel-buffer device into a geometry
//! plus a raw writable memory region. This is the only layer that touches
//! OS device state; everything above it works on in-memory surfaces.
//!
//! ## Lifecycle
//! 1. Open (`LinuxFramebuffer::open`, `MemoryFramebuffer::new`): geometry
//!    is queried once and cached for the lifetime of the handle.
//! 2. `map_memory()`: exposes the pixel buffer, sized to `geometry().length`.
//! 3. `close()`: unmaps and releases. Idempotent.

pub mod linux;
pub mod memory;

pub use linux::LinuxFramebuffer;
pub use memory::MemoryFramebuffer;

use crate::error::DeviceError;
use crate::pixels::PixelLayout;
use std::path::Path;

/// Size and memory layout of a framebuffer.
///
/// Invariants (checked by [`DeviceGeometry::validate`]):
/// `stride >= width * bytes_per_pixel` and `length >= stride * height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceGeometry {
    /// Visible width in pixels.
    pub width: u32,
    /// Visible height in pixels.
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes per row, including any alignment padding.
    pub stride: usize,
    /// Total length of the pixel buffer in bytes.
    pub length: usize,
}

impl DeviceGeometry {
    /// A tightly packed geometry with no row padding.
    pub fn packed(width: u32, height: u32, bits_per_pixel: u32) -> Self {
        let stride = width as usize * bytes_for_bits(bits_per_pixel);
        Self {
            width,
            height,
            bits_per_pixel,
            stride,
            length: stride * height as usize,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        bytes_for_bits(self.bits_per_pixel)
    }

    /// Bytes actually covered by visible rows.
    pub fn frame_len(&self) -> usize {
        self.stride * self.height as usize
    }

    /// Byte offset of pixel (x, y).
    pub fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * self.bytes_per_pixel()
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.bits_per_pixel > 0
            && self.stride >= self.width as usize * self.bytes_per_pixel()
            && self.length >= self.frame_len()
    }

    /// Checks the stride and length invariants for a device at `path`.
    pub fn validate(&self, path: &Path) -> Result<(), DeviceError> {
        if self.width == 0 || self.height == 0 {
            return Err(DeviceError::ZeroDimensions {
                path: path.to_path_buf(),
                width: self.width,
                height: self.height,
            });
        }
        if !self.is_valid() {
            return Err(DeviceError::InconsistentGeometry {
                path: path.to_path_buf(),
                geometry: *self,
            });
        }
        Ok(())
    }

    /// Same memory layout, restricted to a smaller visible area.
    pub fn with_visible_size(&self, width: u32, height: u32) -> Self {
        Self {
            width: width.min(self.width),
            height: height.min(self.height),
            ..*self
        }
    }
}

fn bytes_for_bits(bits: u32) -> usize {
    bits.div_ceil(8) as usize
}

/// An open pixel-buffer device.
///
/// Implementations own their OS resources exclusively and release them on
/// `close()` or drop.
pub trait FramebufferDevice {
    /// Path or name the device was opened from, for diagnostics.
    fn path(&self) -> &Path;

    /// Geometry read when the device was opened. Never re-queried.
    fn geometry(&self) -> DeviceGeometry;

    /// Colour channel layout reported by the device.
    fn layout(&self) -> PixelLayout;

    /// Maps the pixel buffer on first use and returns it.
    ///
    /// Later calls return the same region without remapping.
    fn map_memory(&mut self) -> Result<&mut [u8], DeviceError>;

    fn is_mapped(&self) -> bool;

    fn is_open(&self) -> bool;

    /// Unmaps and releases the device. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn packed_geometry_has_no_padding() {
        let g = DeviceGeometry::packed(160, 120, 16);
        assert_eq!(g.stride, 320);
        assert_eq!(g.length, 320 * 120);
        assert_eq!(g.bytes_per_pixel(), 2);
        assert_eq!(g.offset(10, 10), 10 * 320 + 20);
        assert!(g.is_valid());
    }

    #[test]
    fn validate_rejects_zero_and_short_strides() {
        let path = Path::new("/dev/fb9");
        let zero = DeviceGeometry::packed(0, 120, 16);
        assert!(matches!(
            zero.validate(path),
            Err(DeviceError::ZeroDimensions { width: 0, .. })
        ));

        let short = DeviceGeometry {
            stride: 100,
            ..DeviceGeometry::packed(160, 120, 16)
        };
        assert!(matches!(
            short.validate(path),
            Err(DeviceError::InconsistentGeometry { .. })
        ));

        let truncated = DeviceGeometry {
            length: 320,
            ..DeviceGeometry::packed(160, 120, 16)
        };
        assert!(truncated.validate(path).is_err());
    }

    #[test]
    fn visible_size_keeps_memory_layout() {
        let g = DeviceGeometry::packed(320, 240, 32);
        let sub = g.with_visible_size(100, 50);
        assert_eq!((sub.width, sub.height), (100, 50));
        assert_eq!(sub.stride, g.stride);
        assert_eq!(sub.length, g.length);
        assert!(sub.is_valid());
    }
}
