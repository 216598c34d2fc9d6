// src/os/signals.rs

//! Termination signals delivered through a `signalfd`, so a Ctrl-C becomes
//! an ordinary readable fd the scheduler can watch instead of an
//! asynchronous interruption in the middle of a frame.

use anyhow::{Context, Result};
use log::{debug, info};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use std::os::unix::io::{AsRawFd, RawFd};

pub struct StopSignals {
    fd: SignalFd,
}

impl StopSignals {
    /// Routes SIGINT and SIGTERM to a signalfd.
    pub fn install() -> Result<Self> {
        Self::for_signals(&[Signal::SIGINT, Signal::SIGTERM])
    }

    /// Blocks `signals` for the calling thread and routes them to a signalfd.
    ///
    /// Threads spawned afterwards inherit the mask.
    pub fn for_signals(signals: &[Signal]) -> Result<Self> {
        let mut mask = SigSet::empty();
        for signal in signals {
            mask.add(*signal);
        }
        mask.thread_block()
            .with_context(|| format!("Failed to block {:?}", signals))?;
        let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
            .context("Failed to create signalfd")?;
        debug!("Routing {:?} to signalfd {}", signals, fd.as_raw_fd());
        Ok(Self { fd })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Reads every pending signal; returns the last one received, if any.
    pub fn drain(&mut self) -> Result<Option<Signal>> {
        let mut last = None;
        while let Some(info) = self.fd.read_signal().context("Failed to read signalfd")? {
            let signal = Signal::try_from(info.ssi_signo as libc::c_int)
                .context("signalfd delivered an unknown signal number")?;
            info!("Received {}", signal);
            last = Some(signal);
        }
        Ok(last)
    }
}
