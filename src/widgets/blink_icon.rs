// src/widgets/blink_icon.rs
//! An icon that is alternately drawn and painted over.

use crate::surface::Canvas;
use crate::widgets::{AnimatedWidget, Tick};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use std::time::{Duration, Instant};

/// Something that can draw itself scaled into a box.
pub trait Icon {
    fn draw(&self, canvas: &mut Canvas<'_>, area: Rectangle);
}

impl<F> Icon for F
where
    F: Fn(&mut Canvas<'_>, Rectangle),
{
    fn draw(&self, canvas: &mut Canvas<'_>, area: Rectangle) {
        self(canvas, area)
    }
}

pub struct BlinkIcon {
    icon: Box<dyn Icon>,
    area: Rectangle,
    background: Rgb888,
    on_time: Duration,
    off_time: Duration,
    visible: bool,
}

impl BlinkIcon {
    /// Blinks `icon` inside the box at `top_left`, half a second on and half
    /// a second off over a white background.
    pub fn new(top_left: Point, size: Size, icon: impl Icon + 'static) -> Self {
        Self {
            icon: Box::new(icon),
            area: Rectangle::new(top_left, size),
            background: Rgb888::WHITE,
            on_time: Duration::from_millis(500),
            off_time: Duration::from_millis(500),
            visible: false,
        }
    }

    /// Colour used to erase the icon.
    pub fn with_background(mut self, background: Rgb888) -> Self {
        self.background = background;
        self
    }

    pub fn with_timing(mut self, on_time: Duration, off_time: Duration) -> Self {
        self.on_time = on_time;
        self.off_time = off_time;
        self
    }

    pub fn set_background(&mut self, background: Rgb888) {
        self.background = background;
    }

    pub fn area(&self) -> Rectangle {
        self.area
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl AnimatedWidget for BlinkIcon {
    fn tick(&mut self, canvas: &mut Canvas<'_>, _now: Instant) -> Tick {
        if self.visible {
            self.area
                .into_styled(PrimitiveStyle::with_fill(self.background))
                .draw(canvas)
                .ok();
            self.visible = false;
            Tick {
                redrawn: true,
                next: self.off_time,
            }
        } else {
            self.icon.draw(canvas, self.area);
            self.visible = true;
            Tick {
                redrawn: true,
                next: self.on_time,
            }
        }
    }

    fn reset(&mut self) {
        self.visible = false;
    }
}
