// src/widgets/mod.rs
//! Animated widgets driven by the presentation loop.
//!
//! A widget is plain state plus a [`AnimatedWidget::tick`] that draws its
//! next frame. [`start`] turns it into a scheduler task: every tick that
//! redraws requests a blit, then the task sleeps for whatever interval the
//! widget asked for (never shorter than one frame at the display's forced
//! fps).
//!
//! ```ignore
//! display.run(|frame| {
//!     frame.clear(Rgb888::CSS_GRAY)?;
//!     let icon = BlinkIcon::new(Point::new(10, 10), Size::new(70, 70), draw_circle);
//!     widgets::start(icon, frame);
//!     frame.blit();
//!     Ok(())
//! })
//! ```

pub mod blink_icon;
pub mod marquee;

pub use blink_icon::{BlinkIcon, Icon};
pub use marquee::Marquee;

use crate::display::{Frame, TaskSpawner};
use crate::scheduler::{TaskId, TaskStatus};
use crate::surface::Canvas;
use log::debug;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Interval used when neither the widget nor the display specify one.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one widget tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Something was drawn and should be presented.
    pub redrawn: bool,
    /// Delay before the next tick.
    pub next: Duration,
}

pub trait AnimatedWidget {
    /// Draws the frame for `now`, if anything changed.
    fn tick(&mut self, canvas: &mut Canvas<'_>, now: Instant) -> Tick;

    /// Puts the animation back at its first frame. Called on restart.
    fn reset(&mut self) {}
}

/// Picks the delay between two widget frames.
///
/// With a forced fps there is no point ticking faster than the presenter.
pub fn frame_interval(fps: Option<u32>, requested: Option<Duration>) -> Duration {
    let frame = fps
        .filter(|&fps| fps > 0)
        .map(|fps| Duration::from_secs_f64(1.0 / fps as f64));
    match (frame, requested) {
        (Some(frame), Some(requested)) => requested.max(frame),
        (Some(frame), None) => frame,
        (None, Some(requested)) => requested,
        (None, None) => DEFAULT_FRAME_INTERVAL,
    }
}

#[derive(Debug, Default)]
struct RunState {
    stopped: Cell<bool>,
    /// Bumped on restart; a task from an older run ends at its next wake-up.
    generation: Cell<u64>,
    task: Cell<TaskId>,
}

/// Shared access to a running widget. Clones control the same widget.
pub struct WidgetHandle<W> {
    widget: Rc<RefCell<W>>,
    state: Rc<RunState>,
}

impl<W> WidgetHandle<W> {
    /// Stops the widget at its next wake-up. What it last drew stays on screen.
    pub fn stop(&self) {
        self.state.stopped.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.get()
    }

    /// Changes the widget in place, e.g. its colours. Takes effect on the
    /// next tick.
    pub fn update<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.widget.borrow_mut())
    }

    pub fn task_id(&self) -> TaskId {
        self.state.task.get()
    }
}

impl<W: AnimatedWidget + 'static> WidgetHandle<W> {
    /// Resets the widget and schedules it again from its first frame,
    /// whether or not it was stopped. Returns the new task id.
    pub fn restart<S>(&self, spawner: &mut S) -> TaskId
    where
        S: TaskSpawner + ?Sized,
    {
        // Fails harmlessly when the old task already ended or is running.
        spawner.cancel_task(self.state.task.get());
        self.state.generation.set(self.state.generation.get() + 1);
        self.state.stopped.set(false);
        self.widget.borrow_mut().reset();
        schedule(self, spawner)
    }
}

impl<W> Clone for WidgetHandle<W> {
    fn clone(&self) -> Self {
        Self {
            widget: Rc::clone(&self.widget),
            state: Rc::clone(&self.state),
        }
    }
}

/// Schedules `widget` to tick right away and then on its own cadence.
pub fn start<W, S>(widget: W, spawner: &mut S) -> WidgetHandle<W>
where
    W: AnimatedWidget + 'static,
    S: TaskSpawner + ?Sized,
{
    let handle = WidgetHandle {
        widget: Rc::new(RefCell::new(widget)),
        state: Rc::new(RunState::default()),
    };
    schedule(&handle, spawner);
    handle
}

fn schedule<W, S>(handle: &WidgetHandle<W>, spawner: &mut S) -> TaskId
where
    W: AnimatedWidget + 'static,
    S: TaskSpawner + ?Sized,
{
    let fps = spawner.fps();
    let widget = Rc::clone(&handle.widget);
    let state = Rc::clone(&handle.state);
    let generation = state.generation.get();
    let name = std::any::type_name::<W>()
        .rsplit("::")
        .next()
        .unwrap_or("widget")
        .to_string();
    let task = spawner.spawn_task(
        &name,
        None,
        Box::new(move |frame: &mut Frame<'_>| {
            if state.stopped.get() || state.generation.get() != generation {
                return Ok(TaskStatus::Done);
            }
            let now = frame.now();
            let tick = widget.borrow_mut().tick(frame.canvas(), now);
            if tick.redrawn {
                frame.blit();
            }
            Ok(TaskStatus::Sleep(frame_interval(fps, Some(tick.next))))
        }),
    );
    handle.state.task.set(task);
    debug!("Started widget '{}' as task #{} (run {})", name, task, generation);
    task
}
