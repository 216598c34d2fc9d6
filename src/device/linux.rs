// src/device/linux.rs

//! Linux fbdev implementation of [`FramebufferDevice`].

use crate::device::{DeviceGeometry, FramebufferDevice};
use crate::error::DeviceError;
use crate::os::fbdev;
use crate::pixels::{BitField, PixelLayout};
use log::{debug, info, warn};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::io;
use std::num::NonZeroUsize;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Default console framebuffer.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/fb0";

/// A shared, writable mapping of device memory. Unmapped on drop.
struct MappedRegion {
    ptr: NonNull<c_void>,
    len: usize,
}

impl MappedRegion {
    fn map(file: &File, len: usize) -> nix::Result<Self> {
        let length = NonZeroUsize::new(len).ok_or(nix::errno::Errno::EINVAL)?;
        // SAFETY: fresh shared mapping of an fd we own; no Rust object aliases it.
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                0,
            )?
        };
        Ok(Self { ptr, len })
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is `len` bytes, readable and writable, and lives
        // as long as `self`; `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }

    /// Unmaps explicitly so the caller sees the error.
    fn unmap(self) -> nix::Result<()> {
        let region = std::mem::ManuallyDrop::new(self);
        // SAFETY: ptr/len come from a successful mmap and are unmapped once.
        unsafe { munmap(region.ptr, region.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: as in `unmap`; reached only when `unmap` was not called.
        if let Err(e) = unsafe { munmap(self.ptr, self.len) } {
            warn!("munmap of {} bytes failed in drop: {}", self.len, e);
        }
    }
}

/// An open `/dev/fbN` device.
pub struct LinuxFramebuffer {
    path: PathBuf,
    driver_id: String,
    file: Option<File>,
    mapping: Option<MappedRegion>,
    geometry: DeviceGeometry,
    layout: PixelLayout,
}

impl LinuxFramebuffer {
    /// Opens the device read/write and reads its geometry.
    ///
    /// Fails if the node cannot be opened, either screen-info ioctl fails,
    /// or the reported geometry is empty or self-inconsistent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| DeviceError::Open {
                path: path.clone(),
                source,
            })?;
        let fd = file.as_raw_fd();

        let var = fbdev::var_screen_info(fd).map_err(|source| DeviceError::Query {
            path: path.clone(),
            request: "FBIOGET_VSCREENINFO",
            source,
        })?;
        let fix = fbdev::fix_screen_info(fd).map_err(|source| DeviceError::Query {
            path: path.clone(),
            request: "FBIOGET_FSCREENINFO",
            source,
        })?;

        let geometry = DeviceGeometry {
            width: var.xres,
            height: var.yres,
            bits_per_pixel: var.bits_per_pixel,
            stride: fix.line_length as usize,
            length: fix.smem_len as usize,
        };
        geometry.validate(&path)?;

        let layout = PixelLayout {
            red: BitField::new(var.red.offset, var.red.length),
            green: BitField::new(var.green.offset, var.green.length),
            blue: BitField::new(var.blue.offset, var.blue.length),
            transp: BitField::new(var.transp.offset, var.transp.length),
        };
        let driver_id = fix.id();

        info!(
            "Opened framebuffer {} ({}): {}x{} @ {} bpp, stride {}, {} bytes",
            path.display(),
            driver_id,
            geometry.width,
            geometry.height,
            geometry.bits_per_pixel,
            geometry.stride,
            geometry.length
        );
        debug!("Framebuffer {} channel layout: {:?}", path.display(), layout);

        Ok(Self {
            path,
            driver_id,
            file: Some(file),
            mapping: None,
            geometry,
            layout,
        })
    }

    /// Driver identification string from the fixed screen info.
    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }
}

impl FramebufferDevice for LinuxFramebuffer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }

    fn layout(&self) -> PixelLayout {
        self.layout
    }

    fn map_memory(&mut self) -> Result<&mut [u8], DeviceError> {
        let file = self.file.as_ref().ok_or_else(|| DeviceError::Closed {
            path: self.path.clone(),
        })?;
        if self.mapping.is_none() {
            let region = MappedRegion::map(file, self.geometry.length).map_err(|errno| {
                DeviceError::Map {
                    path: self.path.clone(),
                    length: self.geometry.length,
                    source: io::Error::from(errno),
                }
            })?;
            debug!(
                "Mapped {} bytes of {}",
                self.geometry.length,
                self.path.display()
            );
            self.mapping = Some(region);
        }
        match self.mapping.as_mut() {
            Some(region) => Ok(region.as_mut_slice()),
            None => Err(DeviceError::Closed {
                path: self.path.clone(),
            }),
        }
    }

    fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let unmapped = match self.mapping.take() {
            Some(region) => region.unmap().map_err(|errno| DeviceError::Release {
                path: self.path.clone(),
                source: io::Error::from(errno),
            }),
            None => Ok(()),
        };
        drop(file);
        info!("Closed framebuffer {}", self.path.display());
        unmapped
    }
}

impl Drop for LinuxFramebuffer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to release {} in drop: {}", self.path.display(), e);
        }
    }
}
