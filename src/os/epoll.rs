// src/os/epoll.rs

//! Readiness monitor for the scheduler's fd watches, built on raw `libc`
//! epoll calls. Watches are level-triggered and keyed by a caller token.

use anyhow::{Context, Result};
use bitflags::bitflags;
use log::{debug, trace, warn};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

const MAX_EVENTS_BUFFER_SIZE: usize = 16;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EpollFlags: u32 {
        const EPOLLIN = libc::EPOLLIN as u32;
        const EPOLLPRI = libc::EPOLLPRI as u32;
        const EPOLLERR = libc::EPOLLERR as u32;
        const EPOLLHUP = libc::EPOLLHUP as u32;
        const EPOLLRDHUP = libc::EPOLLRDHUP as u32;
    }
}

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub flags: EpollFlags,
}

#[derive(Debug)]
pub struct ReadinessMonitor {
    epoll_fd: RawFd,
    event_buffer: [libc::epoll_event; MAX_EVENTS_BUFFER_SIZE],
}

impl ReadinessMonitor {
    pub fn new() -> Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd == -1 {
            return Err(io::Error::last_os_error())
                .context("Failed to create epoll instance (epoll_create1)");
        }
        debug!("ReadinessMonitor created with epoll_fd: {}", epoll_fd);
        Ok(Self {
            epoll_fd,
            event_buffer: [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS_BUFFER_SIZE],
        })
    }

    /// Starts reporting `fd` as `token` whenever it is readable.
    pub fn watch_readable(&self, fd: RawFd, token: u64) -> Result<()> {
        let flags = EpollFlags::EPOLLIN | EpollFlags::EPOLLPRI | EpollFlags::EPOLLRDHUP;
        let mut event = libc::epoll_event {
            events: flags.bits(),
            u64: token,
        };
        if unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut event) } == -1 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("Failed to add fd {} to epoll (token: {})", fd, token));
        }
        trace!("Watching fd {} as token {}", fd, token);
        Ok(())
    }

    pub fn unwatch(&self, fd: RawFd) -> Result<()> {
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        if unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, &mut event) } == -1 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("Failed to delete fd {} from epoll", fd));
        }
        trace!("Stopped watching fd {}", fd);
        Ok(())
    }

    /// Blocks until a watched fd is ready or `timeout` passes (`None` waits
    /// indefinitely). An interrupted wait returns no events.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<Readiness>> {
        let timeout_ms = match timeout {
            // Round up so a sub-millisecond wait does not spin.
            Some(t) => t.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };
        let num_events = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                self.event_buffer.as_mut_ptr(),
                MAX_EVENTS_BUFFER_SIZE as libc::c_int,
                timeout_ms,
            )
        };

        if num_events == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("epoll_wait interrupted (EINTR)");
                return Ok(Vec::new());
            }
            return Err(err).context("epoll_wait failed in ReadinessMonitor");
        }

        trace!("epoll_wait returned {} events", num_events);
        Ok(self.event_buffer[..num_events as usize]
            .iter()
            .map(|event| Readiness {
                token: event.u64,
                flags: EpollFlags::from_bits_truncate(event.events),
            })
            .collect())
    }
}

impl Drop for ReadinessMonitor {
    fn drop(&mut self) {
        if unsafe { libc::close(self.epoll_fd) } == -1 {
            warn!(
                "Failed to close epoll_fd {}: {}",
                self.epoll_fd,
                io::Error::last_os_error()
            );
        } else {
            debug!("Closed epoll_fd {}", self.epoll_fd);
        }
    }
}
