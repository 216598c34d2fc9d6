// src/pixels.rs
//! Pixel formats understood by the presentation layer.
//!
//! Framebuffer devices describe their pixels with a bit depth plus one
//! bitfield per colour channel (see `fb_var_screeninfo`). A [`PixelFormat`]
//! is the encoding we write into surfaces; [`PixelFormat::negotiate`] picks
//! one that matches what the device reports.
//!
//! All multi-byte pixels are stored little-endian, which is what fbdev
//! drivers expose on the hosts this crate targets.

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position and width of one colour channel inside a pixel word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct BitField {
    pub offset: u32,
    pub length: u32,
}

impl BitField {
    pub const fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }
}

/// Channel layout reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PixelLayout {
    pub red: BitField,
    pub green: BitField,
    pub blue: BitField,
    pub transp: BitField,
}

impl PixelLayout {
    /// Some drivers leave every bitfield zeroed; only the depth is meaningful then.
    pub fn is_unspecified(&self) -> bool {
        self.red.length == 0 && self.green.length == 0 && self.blue.length == 0
    }
}

/// Pixel encodings a surface can be drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 16 bits: rrrrrggg gggbbbbb.
    #[serde(rename = "RGB565", alias = "rgb565")]
    Rgb565,
    /// 32 bits, upper byte unused (written as zero).
    #[serde(rename = "XRGB8888", alias = "RGB24", alias = "xrgb8888")]
    Xrgb8888,
    /// 32 bits with an opaque alpha byte.
    #[serde(rename = "ARGB8888", alias = "RGBA32", alias = "ARGB32", alias = "argb8888")]
    Argb8888,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 3] = [
        PixelFormat::Rgb565,
        PixelFormat::Xrgb8888,
        PixelFormat::Argb8888,
    ];

    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgb565 => 16,
            PixelFormat::Xrgb8888 | PixelFormat::Argb8888 => 32,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        (self.bits_per_pixel() / 8) as usize
    }

    /// Canonical channel layout of this format.
    pub fn layout(self) -> PixelLayout {
        match self {
            PixelFormat::Rgb565 => PixelLayout {
                red: BitField::new(11, 5),
                green: BitField::new(5, 6),
                blue: BitField::new(0, 5),
                transp: BitField::default(),
            },
            PixelFormat::Xrgb8888 => PixelLayout {
                red: BitField::new(16, 8),
                green: BitField::new(8, 8),
                blue: BitField::new(0, 8),
                transp: BitField::default(),
            },
            PixelFormat::Argb8888 => PixelLayout {
                red: BitField::new(16, 8),
                green: BitField::new(8, 8),
                blue: BitField::new(0, 8),
                transp: BitField::new(24, 8),
            },
        }
    }

    /// Whether a device reporting `bits_per_pixel` and `layout` can show this format.
    ///
    /// The alpha channel is never checked: the panel ignores it either way.
    pub fn is_supported_by(self, bits_per_pixel: u32, layout: &PixelLayout) -> bool {
        if bits_per_pixel != self.bits_per_pixel() {
            return false;
        }
        if layout.is_unspecified() {
            return true;
        }
        let own = self.layout();
        own.red == layout.red && own.green == layout.green && own.blue == layout.blue
    }

    /// First format the device can show. Formats with an alpha byte are
    /// preferred when the device advertises a transparency channel.
    pub fn negotiate(bits_per_pixel: u32, layout: &PixelLayout) -> Option<PixelFormat> {
        if layout.transp.length > 0 && PixelFormat::Argb8888.is_supported_by(bits_per_pixel, layout)
        {
            return Some(PixelFormat::Argb8888);
        }
        Self::ALL
            .into_iter()
            .find(|format| format.is_supported_by(bits_per_pixel, layout))
    }

    /// Encodes a colour into `out`, which must be `bytes_per_pixel()` long.
    #[inline]
    pub fn encode_into(self, color: Rgb888, out: &mut [u8]) {
        match self {
            PixelFormat::Rgb565 => out.copy_from_slice(&rgb565(color).to_le_bytes()),
            PixelFormat::Xrgb8888 => out.copy_from_slice(&xrgb8888(color, 0x00).to_le_bytes()),
            PixelFormat::Argb8888 => out.copy_from_slice(&xrgb8888(color, 0xff).to_le_bytes()),
        }
    }

    /// Encodes a colour into a small stack buffer; only the first
    /// `bytes_per_pixel()` bytes are meaningful.
    pub fn encode(self, color: Rgb888) -> EncodedPixel {
        let mut bytes = [0u8; 4];
        let len = self.bytes_per_pixel();
        self.encode_into(color, &mut bytes[..len]);
        EncodedPixel { bytes, len }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Xrgb8888 => "XRGB8888",
            PixelFormat::Argb8888 => "ARGB8888",
        };
        f.write_str(name)
    }
}

/// One pixel in device byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPixel {
    bytes: [u8; 4],
    len: usize,
}

impl EncodedPixel {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

fn rgb565(color: Rgb888) -> u16 {
    let r = (color.r() as u16 >> 3) & 0x1f;
    let g = (color.g() as u16 >> 2) & 0x3f;
    let b = (color.b() as u16 >> 3) & 0x1f;
    (r << 11) | (g << 5) | b
}

fn xrgb8888(color: Rgb888, alpha: u8) -> u32 {
    u32::from_be_bytes([alpha, color.r(), color.g(), color.b()])
}
