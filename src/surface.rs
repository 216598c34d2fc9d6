// src/surface.rs
//! Drawing surfaces and the double-buffer blit.
//!
//! A [`Surface`] is pixel storage plus the geometry and format needed to
//! address it. Two kinds exist per running display:
//!
//! - the **back** surface owns a heap buffer (`Surface<Vec<u8>>`), see
//!   [`create_back_surface`];
//! - the **front** surface is a non-owning view over mapped device memory
//!   (`Surface<&mut [u8]>`), see [`bind_front_surface`]. Writes to it are
//!   visible on the panel immediately.
//!
//! Surfaces implement embedded-graphics' `DrawTarget`, which is the drawing
//! context handed to user code. Colours are `Rgb888` and are encoded into the
//! surface's pixel format as they are written.

use crate::device::DeviceGeometry;
use crate::error::GeometryMismatchError;
use crate::pixels::PixelFormat;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use std::convert::Infallible;

/// The drawing context given to draw code: a mutable view over either surface.
pub type Canvas<'a> = Surface<&'a mut [u8]>;

pub struct Surface<B> {
    buffer: B,
    geometry: DeviceGeometry,
    format: PixelFormat,
}

/// Allocates an offscreen surface matching `geometry` exactly.
///
/// The contents start zeroed, which is not guaranteed to be any particular
/// colour in every format; paint or clear before the first blit.
pub fn create_back_surface(geometry: DeviceGeometry, format: PixelFormat) -> Surface<Vec<u8>> {
    Surface {
        buffer: vec![0u8; geometry.length],
        geometry,
        format,
    }
}

/// Wraps mapped device memory as a surface without copying.
///
/// Fails if the region is too small to hold `geometry.length` bytes.
pub fn bind_front_surface(
    region: &mut [u8],
    geometry: DeviceGeometry,
    format: PixelFormat,
) -> Result<Canvas<'_>, GeometryMismatchError> {
    if region.len() < geometry.length {
        let actual = DeviceGeometry {
            length: region.len(),
            ..geometry
        };
        return Err(GeometryMismatchError {
            source_geometry: geometry,
            source_format: format,
            target_geometry: actual,
            target_format: format,
        });
    }
    Ok(Surface {
        buffer: &mut region[..geometry.length],
        geometry,
        format,
    })
}

/// Copies every byte of `back` into `front`.
///
/// Both surfaces must share width, height, stride, length and pixel format;
/// otherwise nothing is written and a [`GeometryMismatchError`] is returned.
pub fn blit<S, T>(back: &Surface<S>, front: &mut Surface<T>) -> Result<(), GeometryMismatchError>
where
    S: AsRef<[u8]>,
    T: AsRef<[u8]> + AsMut<[u8]>,
{
    if back.geometry != front.geometry || back.format != front.format {
        return Err(GeometryMismatchError {
            source_geometry: back.geometry,
            source_format: back.format,
            target_geometry: front.geometry,
            target_format: front.format,
        });
    }
    front.buffer.as_mut().copy_from_slice(back.buffer.as_ref());
    Ok(())
}

impl<B> Surface<B> {
    pub fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

impl<B: AsRef<[u8]>> Surface<B> {
    pub fn bytes(&self) -> &[u8] {
        self.buffer.as_ref()
    }

    /// Encoded bytes of pixel (x, y), or `None` outside the visible area.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        let start = self.geometry.offset(x, y);
        self.buffer
            .as_ref()
            .get(start..start + self.format.bytes_per_pixel())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Surface<B> {
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut()
    }

    /// Reborrows this surface as a drawing context.
    pub fn as_canvas(&mut self) -> Canvas<'_> {
        Surface {
            buffer: self.buffer.as_mut(),
            geometry: self.geometry,
            format: self.format,
        }
    }

    /// Paints the whole visible area with one colour.
    pub fn fill(&mut self, color: Rgb888) {
        let area = Rectangle::new(Point::zero(), self.size());
        self.fill_rect(&area, color);
    }

    fn fill_rect(&mut self, area: &Rectangle, color: Rgb888) {
        let area = area.intersection(&Rectangle::new(Point::zero(), self.size()));
        if area.size.width == 0 || area.size.height == 0 {
            return;
        }
        let encoded = self.format.encode(color);
        let pixel = encoded.as_bytes();
        let bpp = pixel.len();
        let x = area.top_left.x as u32;
        let run = area.size.width as usize * bpp;
        let geometry = self.geometry;
        let buffer = self.buffer.as_mut();
        for y in area.top_left.y as u32..area.top_left.y as u32 + area.size.height {
            let start = geometry.offset(x, y);
            for chunk in buffer[start..start + run].chunks_exact_mut(bpp) {
                chunk.copy_from_slice(pixel);
            }
        }
    }
}

impl<B> OriginDimensions for Surface<B> {
    fn size(&self) -> Size {
        Size::new(self.geometry.width, self.geometry.height)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> DrawTarget for Surface<B> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let width = self.geometry.width as i32;
        let height = self.geometry.height as i32;
        let bpp = self.format.bytes_per_pixel();
        let format = self.format;
        let geometry = self.geometry;
        let buffer = self.buffer.as_mut();
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 || x >= width || y >= height {
                continue;
            }
            let offset = geometry.offset(x as u32, y as u32);
            format.encode_into(color, &mut buffer[offset..offset + bpp]);
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_rect(area, color);
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::PrimitiveStyle;
    use test_log::test;

    fn rgb565(width: u32, height: u32) -> DeviceGeometry {
        DeviceGeometry::packed(width, height, 16)
    }

    #[test]
    fn back_surface_matches_geometry_exactly() {
        for geometry in [
            rgb565(160, 120),
            DeviceGeometry {
                stride: 352,
                length: 352 * 120 + 64,
                ..rgb565(160, 120)
            },
            DeviceGeometry::packed(1, 1, 32),
        ] {
            let format = if geometry.bits_per_pixel == 16 {
                PixelFormat::Rgb565
            } else {
                PixelFormat::Argb8888
            };
            let back = create_back_surface(geometry, format);
            assert_eq!(back.geometry(), geometry);
            assert_eq!(back.bytes().len(), geometry.length);
        }
    }

    #[test]
    fn back_surface_matches_every_padded_geometry() {
        for format in [PixelFormat::Rgb565, PixelFormat::Argb8888] {
            let bpp = format.bits_per_pixel();
            for width in (1..=97).step_by(8) {
                for height in (1..=65).step_by(16) {
                    for padding in [0usize, 2, 4, 64] {
                        for slack in [0usize, 4096] {
                            let packed = DeviceGeometry::packed(width, height, bpp);
                            let stride = packed.stride + padding;
                            let geometry = DeviceGeometry {
                                stride,
                                length: stride * height as usize + slack,
                                ..packed
                            };
                            assert!(geometry.is_valid(), "{:?}", geometry);
                            let back = create_back_surface(geometry, format);
                            assert_eq!(back.geometry(), geometry);
                            assert_eq!(back.format(), format);
                            assert_eq!(back.bytes().len(), geometry.length, "{:?}", geometry);
                            assert!(back.bytes().iter().all(|&b| b == 0));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn blit_copies_bytes_and_is_idempotent() {
        let geometry = rgb565(32, 8);
        let mut back = create_back_surface(geometry, PixelFormat::Rgb565);
        Rectangle::new(Point::new(3, 2), Size::new(5, 4))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut back)
            .unwrap();

        let mut memory = vec![0x55u8; geometry.length];
        let mut front = bind_front_surface(&mut memory, geometry, PixelFormat::Rgb565).unwrap();
        blit(&back, &mut front).unwrap();
        assert_eq!(front.bytes(), back.bytes());

        let snapshot = front.bytes().to_vec();
        blit(&back, &mut front).unwrap();
        assert_eq!(front.bytes(), snapshot.as_slice());
    }

    #[test]
    fn blit_with_mismatched_geometry_leaves_front_untouched() {
        let mut back = create_back_surface(rgb565(128, 128), PixelFormat::Rgb565);
        back.fill(Rgb888::WHITE);

        let front_geometry = rgb565(160, 120);
        let mut memory = vec![0x11u8; front_geometry.length];
        let mut front =
            bind_front_surface(&mut memory, front_geometry, PixelFormat::Rgb565).unwrap();

        let err = blit(&back, &mut front).unwrap_err();
        assert_eq!(err.source_geometry, rgb565(128, 128));
        assert_eq!(err.target_geometry, front_geometry);
        assert!(front.bytes().iter().all(|&b| b == 0x11));
    }

    #[test]
    fn blit_rejects_format_mismatch() {
        let geometry = DeviceGeometry::packed(4, 4, 32);
        let back = create_back_surface(geometry, PixelFormat::Xrgb8888);
        let mut memory = vec![0u8; geometry.length];
        let mut front = bind_front_surface(&mut memory, geometry, PixelFormat::Argb8888).unwrap();
        assert!(blit(&back, &mut front).is_err());
    }

    #[test]
    fn front_binding_requires_enough_memory() {
        let geometry = rgb565(10, 10);
        let mut short = vec![0u8; geometry.length - 1];
        assert!(bind_front_surface(&mut short, geometry, PixelFormat::Rgb565).is_err());
    }

    #[test]
    fn drawing_respects_stride_padding_and_clips() {
        let geometry = DeviceGeometry {
            stride: 24,
            length: 24 * 4,
            ..rgb565(8, 4)
        };
        let mut back = create_back_surface(geometry, PixelFormat::Rgb565);
        Rectangle::new(Point::new(-2, -2), Size::new(20, 20))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::BLUE))
            .draw(&mut back)
            .unwrap();
        for y in 0..4 {
            let row = &back.bytes()[y * 24..(y + 1) * 24];
            assert!(row[..16].chunks(2).all(|px| px == [0x1f, 0x00]));
            assert!(row[16..].iter().all(|&b| b == 0), "padding must stay untouched");
        }
        assert_eq!(back.pixel(8, 0), None);
    }

    #[test]
    fn canvas_writes_through_to_owner() {
        let geometry = rgb565(4, 4);
        let mut back = create_back_surface(geometry, PixelFormat::Rgb565);
        {
            let mut canvas = back.as_canvas();
            Pixel(Point::new(1, 1), Rgb888::GREEN).draw(&mut canvas).unwrap();
        }
        assert_eq!(back.pixel(1, 1), Some(&[0xe0, 0x07][..]));
    }
}
