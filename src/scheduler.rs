// src/scheduler.rs
//! Single-threaded cooperative scheduler.
//!
//! One ready queue, a timer table ordered by deadline, and a table of fd
//! watches backed by epoll. Tasks are never preempted: a task runs until it
//! returns a [`TaskStatus`], which says when it wants to run again.
//!
//! The scheduler is generic over the task type so the presentation loop can
//! run tasks with whatever context it builds per step. The caller drives it:
//!
//! ```ignore
//! while let Some(mut scheduled) = scheduler.next(&stop)? {
//!     let status = (scheduled.task)(&mut context)?;
//!     scheduler.complete(scheduled, status);
//! }
//! ```
//!
//! ## Ordering
//! - Ready tasks run in FIFO order.
//! - Timers become ready in deadline order; equal deadlines keep
//!   registration order.
//! - Stop requests are only observed in `next()`, i.e. between steps. A
//!   `next()` blocked waiting for timers or fds is woken through the stop
//!   handle's wake pipe.

use crate::os::epoll::ReadinessMonitor;
use crate::os::wake::Waker;
use anyhow::Result;
use log::{debug, trace};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub type TaskId = u64;

/// Epoll token of the wake pipe. Task ids start at 1.
const WAKE_TOKEN: u64 = 0;

/// What a task wants after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Run again after every other ready task has had a turn.
    Yield,
    /// Run again once the duration has passed.
    Sleep(Duration),
    /// Remove the task.
    Done,
}

#[derive(Debug, Default)]
struct StopState {
    requested: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

/// Cloneable, thread-safe stop request flag.
///
/// Arming it never interrupts a running task; the scheduler notices it the
/// next time it is asked for work. A scheduler blocked in `next()` on this
/// handle is woken, so a stop from another thread takes effect at once.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<StopState>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.requested.store(true, AtomicOrdering::SeqCst);
        let waker = self.0.waker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(waker) = waker.as_ref() {
            waker.wake();
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.requested.load(AtomicOrdering::SeqCst)
    }

    /// Routes later stop requests to `waker`. The last scheduler to wait on
    /// this handle is the one woken.
    fn attach(&self, waker: &Waker) {
        let mut slot = self.0.waker.lock().unwrap_or_else(PoisonError::into_inner);
        if !slot.as_ref().is_some_and(|current| current.same_pipe(waker)) {
            *slot = Some(waker.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Queue,
    Watch(RawFd),
}

/// A task taken out of the scheduler to be run. Hand it back with
/// [`Scheduler::complete`].
pub struct Scheduled<T> {
    pub id: TaskId,
    pub name: String,
    pub task: T,
    origin: Origin,
}

struct Entry<T> {
    id: TaskId,
    name: String,
    task: T,
}

struct Timer<T> {
    deadline: Instant,
    seq: u64,
    entry: Entry<T>,
}

// Reversed so BinaryHeap pops the earliest deadline first.
impl<T> Ord for Timer<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Timer<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Timer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for Timer<T> {}

struct Watch<T> {
    fd: RawFd,
    name: String,
    /// `None` while the task is out running.
    task: Option<T>,
}

pub struct Scheduler<T> {
    ready: VecDeque<Scheduled<T>>,
    timers: BinaryHeap<Timer<T>>,
    watches: HashMap<TaskId, Watch<T>>,
    monitor: Option<ReadinessMonitor>,
    waker: Option<Waker>,
    next_id: TaskId,
    next_seq: u64,
    steps: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            timers: BinaryHeap::new(),
            watches: HashMap::new(),
            monitor: None,
            waker: None,
            next_id: 1,
            next_seq: 0,
            steps: 0,
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Queues a task to run as soon as possible.
    pub fn spawn(&mut self, name: impl Into<String>, task: T) -> TaskId {
        let id = self.allocate_id();
        let name = name.into();
        trace!("spawn #{} '{}'", id, name);
        self.ready.push_back(Scheduled {
            id,
            name,
            task,
            origin: Origin::Queue,
        });
        id
    }

    /// Queues a task ahead of everything already ready.
    pub fn spawn_first(&mut self, name: impl Into<String>, task: T) -> TaskId {
        let id = self.allocate_id();
        let name = name.into();
        trace!("spawn_first #{} '{}'", id, name);
        self.ready.push_front(Scheduled {
            id,
            name,
            task,
            origin: Origin::Queue,
        });
        id
    }

    /// Queues a task to run once `delay` has passed.
    pub fn call_later(&mut self, delay: Duration, name: impl Into<String>, task: T) -> TaskId {
        let id = self.allocate_id();
        let name = name.into();
        trace!("call_later #{} '{}' in {:?}", id, name, delay);
        self.push_timer(Instant::now() + delay, Entry { id, name, task });
        id
    }

    /// Runs `task` every time `fd` becomes readable, until it returns
    /// [`TaskStatus::Done`] or is cancelled. The caller keeps ownership of
    /// the fd and must keep it open while watched.
    pub fn watch_fd(&mut self, fd: RawFd, name: impl Into<String>, task: T) -> Result<TaskId> {
        if self.monitor.is_none() {
            self.monitor = Some(ReadinessMonitor::new()?);
        }
        let id = self.allocate_id();
        if let Some(monitor) = self.monitor.as_ref() {
            monitor.watch_readable(fd, id)?;
        }
        let name = name.into();
        debug!("watch #{} '{}' on fd {}", id, name, fd);
        self.watches.insert(
            id,
            Watch {
                fd,
                name,
                task: Some(task),
            },
        );
        Ok(id)
    }

    /// Removes a pending task. Returns false if it was not found, which
    /// includes a task cancelling itself while it runs.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if let Some(watch) = self.watches.remove(&id) {
            self.unwatch(watch.fd);
            // It may already be queued by a readiness event. A watch task
            // taken out to run is dropped when it completes.
            self.ready.retain(|s| s.id != id);
            trace!("cancel watch #{} '{}'", id, watch.name);
            return true;
        }
        let before = self.ready.len();
        self.ready.retain(|s| s.id != id);
        if self.ready.len() != before {
            return true;
        }
        let before = self.timers.len();
        self.timers.retain(|t| t.entry.id != id);
        self.timers.len() != before
    }

    /// True when nothing is ready, sleeping, or watching.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.timers.is_empty() && self.watches.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.ready.len() + self.timers.len() + self.watches.len()
    }

    /// Number of tasks handed out so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Drops every task and watch.
    pub fn clear(&mut self) {
        self.ready.clear();
        self.timers.clear();
        let fds: Vec<RawFd> = self.watches.values().map(|w| w.fd).collect();
        for fd in fds {
            self.unwatch(fd);
        }
        self.watches.clear();
    }

    /// Blocks until a task is ready and hands it out.
    ///
    /// Returns `None` when a stop has been requested or when there is no
    /// work left at all. Otherwise waits on epoll for the next timer, a
    /// watched fd, or a stop request from any thread.
    pub fn next(&mut self, stop: &StopHandle) -> Result<Option<Scheduled<T>>> {
        loop {
            if stop.is_stop_requested() {
                debug!("Scheduler: stop requested");
                return Ok(None);
            }
            self.promote_due_timers(Instant::now());
            if let Some(scheduled) = self.ready.pop_front() {
                self.steps += 1;
                trace!("run #{} '{}'", scheduled.id, scheduled.name);
                return Ok(Some(scheduled));
            }
            if self.is_idle() {
                debug!("Scheduler: no work left");
                return Ok(None);
            }
            let timeout = self
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()));
            self.arm_stop_waker(stop)?;
            // A stop armed before the waker was attached did not wake anyone.
            if stop.is_stop_requested() {
                continue;
            }
            self.wait(timeout)?;
        }
    }

    /// Returns a task handed out by `next()` along with what it asked for.
    pub fn complete(&mut self, scheduled: Scheduled<T>, status: TaskStatus) {
        let Scheduled {
            id,
            name,
            task,
            origin,
        } = scheduled;
        match origin {
            Origin::Watch(fd) => match status {
                TaskStatus::Done => {
                    if self.watches.remove(&id).is_some() {
                        self.unwatch(fd);
                    }
                    trace!("watch #{} '{}' done", id, name);
                }
                TaskStatus::Yield | TaskStatus::Sleep(_) => {
                    // Cancelled while running: the entry is gone, drop the task.
                    if let Some(watch) = self.watches.get_mut(&id) {
                        watch.task = Some(task);
                    }
                }
            },
            Origin::Queue => match status {
                TaskStatus::Yield => self.ready.push_back(Scheduled {
                    id,
                    name,
                    task,
                    origin,
                }),
                TaskStatus::Sleep(delay) => {
                    self.push_timer(Instant::now() + delay, Entry { id, name, task })
                }
                TaskStatus::Done => trace!("#{} '{}' done", id, name),
            },
        }
    }

    fn push_timer(&mut self, deadline: Instant, entry: Entry<T>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Timer {
            deadline,
            seq,
            entry,
        });
    }

    fn promote_due_timers(&mut self, now: Instant) {
        while self.timers.peek().is_some_and(|t| t.deadline <= now) {
            if let Some(Timer { entry, .. }) = self.timers.pop() {
                self.ready.push_back(Scheduled {
                    id: entry.id,
                    name: entry.name,
                    task: entry.task,
                    origin: Origin::Queue,
                });
            }
        }
    }

    fn arm_stop_waker(&mut self, stop: &StopHandle) -> Result<()> {
        if self.monitor.is_none() {
            self.monitor = Some(ReadinessMonitor::new()?);
        }
        if self.waker.is_none() {
            let waker = Waker::new()?;
            if let Some(monitor) = self.monitor.as_ref() {
                monitor.watch_readable(waker.read_fd(), WAKE_TOKEN)?;
            }
            self.waker = Some(waker);
        }
        if let Some(waker) = self.waker.as_ref() {
            stop.attach(waker);
        }
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<()> {
        let Some(monitor) = self.monitor.as_mut() else {
            return Ok(());
        };
        for readiness in monitor.wait(timeout)? {
            let id = readiness.token;
            if id == WAKE_TOKEN {
                if let Some(waker) = self.waker.as_ref() {
                    waker.drain();
                }
                continue;
            }
            if let Some(watch) = self.watches.get_mut(&id) {
                if let Some(task) = watch.task.take() {
                    self.ready.push_back(Scheduled {
                        id,
                        name: watch.name.clone(),
                        task,
                        origin: Origin::Watch(watch.fd),
                    });
                }
            }
        }
        Ok(())
    }

    fn unwatch(&mut self, fd: RawFd) {
        if let Some(monitor) = self.monitor.as_ref() {
            if let Err(e) = monitor.unwatch(fd) {
                debug!("Scheduler: {:#}", e);
            }
        }
    }
}
