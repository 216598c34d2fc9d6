// src/os/wake.rs

//! Self-pipe that lets another thread interrupt a blocked epoll wait.
//!
//! The read end sits in the scheduler's [`ReadinessMonitor`]; any clone of
//! the [`Waker`] can write a byte to it. Both ends live as long as the last
//! clone, so a late `wake()` never writes into a pipe without a reader.
//!
//! [`ReadinessMonitor`]: crate::os::epoll::ReadinessMonitor

use anyhow::{Context, Result};
use log::{debug, trace};
use std::ffi::c_void;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

#[derive(Debug)]
struct WakePipe {
    read: OwnedFd,
    write: OwnedFd,
}

#[derive(Debug, Clone)]
pub struct Waker(Arc<WakePipe>);

impl Waker {
    pub fn new() -> Result<Self> {
        let (read, write) = create_pipe().context("Failed to create wake pipe")?;
        debug!(
            "Waker created (read fd {}, write fd {})",
            read.as_raw_fd(),
            write.as_raw_fd()
        );
        Ok(Self(Arc::new(WakePipe { read, write })))
    }

    /// The fd to watch for readability.
    pub fn read_fd(&self) -> RawFd {
        self.0.read.as_raw_fd()
    }

    /// Makes the read end readable. A full pipe already is, so EAGAIN is fine.
    pub fn wake(&self) {
        let buf = [1u8];
        let ret = unsafe { libc::write(self.0.write.as_raw_fd(), buf.as_ptr() as *const c_void, 1) };
        if ret < 0 {
            trace!("Waker: write skipped: {}", io::Error::last_os_error());
        }
    }

    /// Empties the pipe so the next wait blocks again.
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.0.read.as_raw_fd(),
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }

    /// True when both wakers write into the same pipe.
    pub fn same_pipe(&self, other: &Waker) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn create_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds: [RawFd; 2] = [0; 2];
    unsafe {
        if libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])))
    }
}
