// src/display/mod.rs
//! The presentation loop.
//!
//! A [`Display`] owns a framebuffer device and runs application tasks on a
//! cooperative [`Scheduler`]. Each task step gets a [`Frame`] to draw on;
//! the loop decides what reaches the screen once the step returns.
//!
//! ## State machine
//! `Created → Running → Stopped`. `Stopped` is terminal: the device is
//! closed on every exit path from [`Display::run`], including errors.
//!
//! ## Step protocol
//! 1. The scheduler hands out the next ready task.
//! 2. A `Frame` is bound to the back surface (or the front surface when
//!    single-buffered) and the task runs to completion.
//! 3. On `Ok`, requested blits are applied. On `Err`, nothing is presented,
//!    the loop stops and the error is returned as a [`DrawCallbackError`].
//! 4. Stop requests are checked before the next step.

mod frame;

pub use frame::Frame;

use crate::config::DisplayConfig;
use crate::device::{DeviceGeometry, FramebufferDevice, LinuxFramebuffer};
use crate::error::{DisplayError, DrawCallbackError};
use crate::os::signals::StopSignals;
use crate::pixels::PixelFormat;
use crate::scheduler::{Scheduler, StopHandle, TaskId, TaskStatus};
use crate::surface::{self, Canvas, Surface};
use anyhow::Result;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use frame::PresentRequest;
use log::{debug, error, info, trace, warn};
use std::time::Duration;

/// A unit of work for the presentation loop.
pub type BoxedTask = Box<dyn FnMut(&mut Frame<'_>) -> Result<TaskStatus>>;

const DRAW_TASK: &str = "draw";
const PRESENTER_TASK: &str = "fps-presenter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Created,
    Running,
    Stopped,
}

/// Something tasks can be registered with: the display before it runs, or
/// a frame while it does.
pub trait TaskSpawner {
    /// Forced frame rate of the display, if any.
    fn fps(&self) -> Option<u32>;

    /// Registers `task` to run now, or after `delay`.
    fn spawn_task(&mut self, name: &str, delay: Option<Duration>, task: BoxedTask) -> TaskId;

    fn cancel_task(&mut self, id: TaskId) -> bool;
}

pub struct Display<D: FramebufferDevice> {
    config: DisplayConfig,
    device: D,
    state: LoopState,
    stop: StopHandle,
    scheduler: Scheduler<BoxedTask>,
}

impl Display<LinuxFramebuffer> {
    /// Opens the framebuffer at `config.device_path`.
    pub fn open(config: DisplayConfig) -> Result<Self, DisplayError> {
        config.validate()?;
        let device = LinuxFramebuffer::open(&config.device_path)?;
        Ok(Self::with_device(config, device))
    }
}

impl<D: FramebufferDevice> Display<D> {
    /// Wraps an already opened device.
    pub fn with_device(config: DisplayConfig, device: D) -> Self {
        Self {
            config,
            device,
            state: LoopState::Created,
            stop: StopHandle::new(),
            scheduler: Scheduler::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// A handle that can stop the loop from anywhere, including other threads.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stops the loop at the next step boundary. A running step is never
    /// interrupted.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Registers a task to run once the loop starts, after the draw callback.
    pub fn spawn(&mut self, name: &str, task: BoxedTask) -> TaskId {
        self.scheduler.spawn(name, task)
    }

    pub fn call_later(&mut self, delay: Duration, name: &str, task: BoxedTask) -> TaskId {
        self.scheduler.call_later(delay, name, task)
    }

    /// Runs `task` whenever `fd` is readable. The caller keeps `fd` open for
    /// as long as the watch is registered.
    pub fn watch_fd(
        &mut self,
        fd: std::os::unix::io::RawFd,
        name: &str,
        task: BoxedTask,
    ) -> Result<TaskId, DisplayError> {
        self.scheduler
            .watch_fd(fd, name, task)
            .map_err(DisplayError::EventLoop)
    }

    /// Stops the loop cleanly when one of `signals` arrives.
    ///
    /// The watch task owns `signals`, so the fd stays open exactly as long
    /// as it is watched.
    pub fn stop_on(&mut self, mut signals: StopSignals) -> Result<TaskId, DisplayError> {
        let fd = signals.raw_fd();
        self.watch_fd(
            fd,
            "stop-signals",
            Box::new(move |frame: &mut Frame<'_>| match signals.drain()? {
                Some(signal) => {
                    info!("Display: {} received, stopping", signal);
                    frame.request_stop();
                    Ok(TaskStatus::Done)
                }
                None => Ok(TaskStatus::Yield),
            }),
        )
    }

    /// Runs the loop until it is stopped, runs out of work, or fails.
    ///
    /// `draw` is the first task to run. It can register further tasks on
    /// the frame it gets.
    pub fn run<F>(&mut self, mut draw: F) -> Result<(), DisplayError>
    where
        F: FnMut(&mut Frame<'_>) -> Result<()> + 'static,
    {
        if self.state != LoopState::Created {
            return Err(DisplayError::NotRunnable(self.state));
        }

        // Nothing is mapped or allocated before the config is accepted.
        let (geometry, format) = match self
            .config
            .resolve(self.device.geometry(), &self.device.layout())
        {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Display: rejecting configuration: {}", e);
                if let Err(release) = self.teardown() {
                    warn!("Display: release failed after error: {}", release);
                }
                return Err(e.into());
            }
        };
        info!(
            "Display: {}x{} {} on {} ({})",
            geometry.width,
            geometry.height,
            format,
            self.device.path().display(),
            if self.config.double_buffered {
                "double-buffered"
            } else {
                "direct"
            }
        );

        // The draw callback goes first, ahead of anything registered earlier.
        self.scheduler.spawn_first(
            DRAW_TASK,
            Box::new(move |frame: &mut Frame<'_>| {
                draw(frame)?;
                Ok(TaskStatus::Done)
            }),
        );
        if let Some(fps) = self.config.fps {
            let interval = Duration::from_secs_f64(1.0 / fps as f64);
            self.scheduler
                .call_later(interval, PRESENTER_TASK, presenter(interval));
        }

        self.state = LoopState::Running;
        let outcome = self.present(geometry, format);
        self.state = LoopState::Stopped;

        let released = self.teardown();
        match (outcome, released) {
            (Err(e), Err(release)) => {
                warn!("Display: release failed after error: {}", release);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(release)) => Err(release),
            (Ok(()), Ok(())) => {
                info!("Display: stopped");
                Ok(())
            }
        }
    }

    /// The Running state: maps the device and drives the scheduler.
    fn present(&mut self, geometry: DeviceGeometry, format: PixelFormat) -> Result<(), DisplayError> {
        let double_buffered = self.config.double_buffered;
        let fps = self.config.fps;
        let clear_on_exit = self.config.clear_on_exit;

        let memory = self.device.map_memory()?;
        let mut front = surface::bind_front_surface(memory, geometry, format)?;
        let mut back = double_buffered.then(|| surface::create_back_surface(geometry, format));
        debug!(
            "Display: front bound ({} bytes, stride {})",
            geometry.length, geometry.stride
        );

        let scheduler = &mut self.scheduler;
        let stop = &self.stop;
        let mut dirty = false;

        while let Some(mut scheduled) = scheduler.next(stop).map_err(DisplayError::EventLoop)? {
            let canvas: Canvas<'_> = match back.as_mut() {
                Some(back) => back.as_canvas(),
                None => front.as_canvas(),
            };
            let mut frame = Frame::new(canvas, fps, double_buffered, &mut *scheduler, stop);
            let result = (scheduled.task)(&mut frame);
            let request = frame.finish();

            let status = match result {
                Ok(status) => status,
                Err(source) => {
                    error!("Display: task '{}' failed: {:#}", scheduled.name, source);
                    stop.request_stop();
                    return Err(DrawCallbackError {
                        task: scheduled.name,
                        source,
                    }
                    .into());
                }
            };
            if let Some(back) = back.as_ref() {
                apply_present_request(request, &mut dirty, back, &mut front)?;
            }
            scheduler.complete(scheduled, status);
        }

        if clear_on_exit {
            debug!("Display: clearing screen");
            front.fill(Rgb888::BLACK);
        }
        trace!("Display: {} steps run", scheduler.steps());
        Ok(())
    }

    /// Drops pending tasks and closes the device. Safe to call repeatedly.
    fn teardown(&mut self) -> Result<(), DisplayError> {
        self.scheduler.clear();
        self.state = LoopState::Stopped;
        self.device.close().map_err(|e| {
            error!("Display: failed to close {}: {}", self.device.path().display(), e);
            DisplayError::from(e)
        })
    }
}

impl<D: FramebufferDevice> TaskSpawner for Display<D> {
    fn fps(&self) -> Option<u32> {
        self.config.fps
    }

    fn spawn_task(&mut self, name: &str, delay: Option<Duration>, task: BoxedTask) -> TaskId {
        match delay {
            Some(delay) => self.call_later(delay, name, task),
            None => self.spawn(name, task),
        }
    }

    fn cancel_task(&mut self, id: TaskId) -> bool {
        self.scheduler.cancel(id)
    }
}

/// Applies what a successful step asked for. Only used when double-buffered.
fn apply_present_request(
    request: PresentRequest,
    dirty: &mut bool,
    back: &Surface<Vec<u8>>,
    front: &mut Canvas<'_>,
) -> Result<(), DisplayError> {
    if request.immediate {
        surface::blit(back, front)?;
        *dirty = false;
        trace!("Display: blit");
    } else if request.dirty {
        *dirty = true;
    }
    if request.flush && *dirty {
        surface::blit(back, front)?;
        *dirty = false;
        trace!("Display: blit on presenter tick");
    }
    Ok(())
}

/// Periodic task that presents the back surface when it was marked dirty.
/// It ends once it is the only task left, so an idle display still exits.
fn presenter(interval: Duration) -> BoxedTask {
    Box::new(move |frame: &mut Frame<'_>| {
        frame.flush();
        if frame.pending_tasks() == 0 {
            Ok(TaskStatus::Done)
        } else {
            Ok(TaskStatus::Sleep(interval))
        }
    })
}

#[cfg(test)]
mod tests;
