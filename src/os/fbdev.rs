// src/os/fbdev.rs

//! Minimal binding of `linux/fb.h`: the two screen-info structs and the
//! ioctls that fill them. The structs are complete so the kernel never
//! writes past the end of our buffers.

use libc::{c_char, c_ulong};
use std::io;
use std::os::unix::io::RawFd;

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

nix::ioctl_read_bad!(fbioget_vscreeninfo, FBIOGET_VSCREENINFO, FbVarScreenInfo);
nix::ioctl_read_bad!(fbioget_fscreeninfo, FBIOGET_FSCREENINFO, FbFixScreenInfo);

/// `struct fb_bitfield`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FbBitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

/// `struct fb_var_screeninfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FbVarScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: FbBitfield,
    pub green: FbBitfield,
    pub blue: FbBitfield,
    pub transp: FbBitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FbFixScreenInfo {
    pub id: [c_char; 16],
    pub smem_start: c_ulong,
    pub smem_len: u32,
    pub type_: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

impl Default for FbFixScreenInfo {
    fn default() -> Self {
        // SAFETY: plain-old-data, all-zero is a valid bit pattern.
        unsafe { std::mem::zeroed() }
    }
}

impl FbFixScreenInfo {
    /// Driver identification string, e.g. "fb_ili9340".
    pub fn id(&self) -> String {
        let bytes: Vec<u8> = self
            .id
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

pub fn var_screen_info(fd: RawFd) -> io::Result<FbVarScreenInfo> {
    let mut info = FbVarScreenInfo::default();
    // SAFETY: `info` is a correctly sized fb_var_screeninfo.
    unsafe { fbioget_vscreeninfo(fd, &mut info) }.map_err(io::Error::from)?;
    Ok(info)
}

pub fn fix_screen_info(fd: RawFd) -> io::Result<FbFixScreenInfo> {
    let mut info = FbFixScreenInfo::default();
    // SAFETY: `info` is a correctly sized fb_fix_screeninfo.
    unsafe { fbioget_fscreeninfo(fd, &mut info) }.map_err(io::Error::from)?;
    Ok(info)
}
