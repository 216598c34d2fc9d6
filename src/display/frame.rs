// src/display/frame.rs
//! The drawing context handed to each task step.

use crate::device::DeviceGeometry;
use crate::display::{BoxedTask, TaskSpawner};
use crate::scheduler::{Scheduler, StopHandle, TaskId};
use crate::surface::Canvas;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::trace;
use std::convert::Infallible;
use std::time::{Duration, Instant};

/// What a step asked to have presented once it returns successfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PresentRequest {
    /// Copy back to front now, fps or not.
    pub immediate: bool,
    /// Copy on the next presenter tick.
    pub dirty: bool,
    /// This step is the presenter tick.
    pub flush: bool,
}

/// A drawing context valid for one task step.
///
/// Draws go to the back surface, or straight to the screen when the display
/// is single-buffered. Nothing reaches the screen until the step returns
/// `Ok` and a blit was requested; an erroring step is never presented.
pub struct Frame<'a> {
    canvas: Canvas<'a>,
    now: Instant,
    fps: Option<u32>,
    double_buffered: bool,
    scheduler: &'a mut Scheduler<BoxedTask>,
    stop: &'a StopHandle,
    request: PresentRequest,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(
        canvas: Canvas<'a>,
        fps: Option<u32>,
        double_buffered: bool,
        scheduler: &'a mut Scheduler<BoxedTask>,
        stop: &'a StopHandle,
    ) -> Self {
        Self {
            canvas,
            now: Instant::now(),
            fps,
            double_buffered,
            scheduler,
            stop,
            request: PresentRequest::default(),
        }
    }

    /// The surface being drawn on.
    pub fn canvas(&mut self) -> &mut Canvas<'a> {
        &mut self.canvas
    }

    /// Effective geometry of the display.
    pub fn geometry(&self) -> DeviceGeometry {
        self.canvas.geometry()
    }

    /// When this step started.
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn fps(&self) -> Option<u32> {
        self.fps
    }

    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    /// Presents the back surface.
    ///
    /// Without a forced frame rate the copy happens as soon as this step
    /// returns. With one, the back surface is only marked dirty and the next
    /// presenter tick copies it.
    pub fn blit(&mut self) {
        if self.fps.is_some() {
            self.request.dirty = true;
        } else {
            self.request.immediate = true;
        }
    }

    /// Presents the back surface once this step returns, ignoring any
    /// forced frame rate.
    pub fn blit_now(&mut self) {
        self.request.immediate = true;
    }

    /// Fills the whole surface with `color` and presents it.
    pub fn blank(&mut self, color: Rgb888) {
        self.canvas.fill(color);
        self.blit_now();
    }

    pub fn spawn(&mut self, name: &str, task: BoxedTask) -> TaskId {
        self.scheduler.spawn(name, task)
    }

    pub fn call_later(&mut self, delay: Duration, name: &str, task: BoxedTask) -> TaskId {
        self.scheduler.call_later(delay, name, task)
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Stops the loop after this step. The step itself still completes and
    /// its blit requests are honoured.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Tasks still registered besides the one running.
    pub(crate) fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    pub(crate) fn flush(&mut self) {
        self.request.flush = true;
    }

    pub(crate) fn finish(self) -> PresentRequest {
        trace!("frame finished: {:?}", self.request);
        self.request
    }
}

impl TaskSpawner for Frame<'_> {
    fn fps(&self) -> Option<u32> {
        self.fps
    }

    fn spawn_task(&mut self, name: &str, delay: Option<Duration>, task: BoxedTask) -> TaskId {
        match delay {
            Some(delay) => self.call_later(delay, name, task),
            None => self.spawn(name, task),
        }
    }

    fn cancel_task(&mut self, id: TaskId) -> bool {
        self.cancel(id)
    }
}

impl OriginDimensions for Frame<'_> {
    fn size(&self) -> Size {
        self.canvas.size()
    }
}

impl DrawTarget for Frame<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.canvas.draw_iter(pixels)
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.canvas.fill_solid(area, color)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.canvas.clear(color)
    }
}
