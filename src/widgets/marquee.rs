// src/widgets/marquee.rs
//! Scrolling single-line text.
//!
//! Text that fits its box is drawn once and only redrawn when a colour
//! changes. Longer text scrolls as `text + "   " + text`, by whole
//! characters or, in smooth mode, by pixels. The scroll offset follows an
//! [`Easing`] over one cycle, then starts over.

use crate::surface::Canvas;
use crate::transition::Easing;
use crate::widgets::{AnimatedWidget, Tick};
use embedded_graphics::mono_font::{ascii::FONT_6X10, MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use std::time::{Duration, Instant};

const SEPARATOR: &str = "   ";

pub struct Marquee {
    text: String,
    area: Rectangle,
    font: &'static MonoFont<'static>,
    text_color: Rgb888,
    background: Rgb888,
    /// Characters, or pixels when smooth, advanced per frame.
    step: u32,
    interval: Duration,
    easing: Easing,
    smooth: bool,
    offset: u32,
    cycle_start: Option<Instant>,
    dirty: bool,
}

impl Marquee {
    /// A marquee with a 6x10 font, white text on black, scrolling one
    /// character every 50 ms.
    pub fn new(text: impl Into<String>, top_left: Point, size: Size) -> Self {
        Self {
            text: text.into(),
            area: Rectangle::new(top_left, size),
            font: &FONT_6X10,
            text_color: Rgb888::WHITE,
            background: Rgb888::BLACK,
            step: 1,
            interval: Duration::from_millis(50),
            easing: Easing::LINEAR,
            smooth: false,
            offset: 0,
            cycle_start: None,
            dirty: true,
        }
    }

    pub fn with_font(mut self, font: &'static MonoFont<'static>) -> Self {
        self.font = font;
        self.dirty = true;
        self
    }

    pub fn with_colors(mut self, text_color: Rgb888, background: Rgb888) -> Self {
        self.text_color = text_color;
        self.background = background;
        self.dirty = true;
        self
    }

    /// Scroll speed: `step` units every `interval`. A zero step is treated as one.
    pub fn with_speed(mut self, step: u32, interval: Duration) -> Self {
        self.step = step.max(1);
        self.interval = interval;
        self
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Scroll by pixels instead of whole characters.
    pub fn smooth(mut self, smooth: bool) -> Self {
        self.smooth = smooth;
        self
    }

    pub fn set_text_color(&mut self, color: Rgb888) {
        if color != self.text_color {
            self.text_color = color;
            self.dirty = true;
        }
    }

    pub fn set_background(&mut self, color: Rgb888) {
        if color != self.background {
            self.background = color;
            self.dirty = true;
        }
    }

    /// Replaces the text and restarts scrolling.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.offset = 0;
        self.cycle_start = None;
        self.dirty = true;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current scroll offset, in characters or pixels.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    fn advance(&self) -> u32 {
        self.font.character_size.width + self.font.character_spacing
    }

    fn text_width(&self) -> u32 {
        self.text.chars().count() as u32 * self.advance()
    }

    /// True when the text does not fit the box.
    pub fn scrolls(&self) -> bool {
        self.text_width() > self.area.size.width
    }

    /// Offset at which the looped text repeats itself.
    fn cycle_units(&self) -> u32 {
        let chars = (self.text.chars().count() + SEPARATOR.len()) as u32;
        if self.smooth {
            chars * self.advance()
        } else {
            chars
        }
    }

    /// Time for one full cycle at the configured speed.
    pub fn cycle_duration(&self) -> Duration {
        self.interval * self.cycle_units() / self.step
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        self.area
            .into_styled(PrimitiveStyle::with_fill(self.background))
            .draw(canvas)
            .ok();

        let style = MonoTextStyle::new(self.font, self.text_color);
        let glyph_height = self.font.character_size.height;
        let y = self.area.top_left.y
            + (self.area.size.height.saturating_sub(glyph_height) / 2) as i32;
        let mut clipped = canvas.clipped(&self.area);

        if !self.scrolls() {
            Text::with_baseline(&self.text, Point::new(self.area.top_left.x, y), style, Baseline::Top)
                .draw(&mut clipped)
                .ok();
            return;
        }

        let looped = format!("{}{}{}", self.text, SEPARATOR, self.text);
        if self.smooth {
            let x = self.area.top_left.x - self.offset as i32;
            Text::with_baseline(&looped, Point::new(x, y), style, Baseline::Top)
                .draw(&mut clipped)
                .ok();
        } else {
            // One extra character so a partly visible glyph still shows.
            let visible = (self.area.size.width / self.advance().max(1)) as usize + 1;
            let shown: String = looped
                .chars()
                .skip(self.offset as usize)
                .take(visible)
                .collect();
            Text::with_baseline(&shown, Point::new(self.area.top_left.x, y), style, Baseline::Top)
                .draw(&mut clipped)
                .ok();
        }
    }

    fn update_offset(&mut self, now: Instant) {
        let start = *self.cycle_start.get_or_insert(now);
        let cycle = self.cycle_duration();
        let mut elapsed = now.saturating_duration_since(start);
        if elapsed > cycle || cycle.is_zero() {
            self.cycle_start = Some(now);
            elapsed = Duration::ZERO;
        }
        let progress = if cycle.is_zero() {
            0.0
        } else {
            elapsed.as_secs_f64() / cycle.as_secs_f64()
        };
        let units = self.cycle_units() as f64;
        self.offset = (units * self.easing.apply(progress)).round().clamp(0.0, units) as u32;
    }
}

impl AnimatedWidget for Marquee {
    fn tick(&mut self, canvas: &mut Canvas<'_>, now: Instant) -> Tick {
        let scrolls = self.scrolls();
        let redrawn = self.dirty || scrolls;
        if redrawn {
            self.draw(canvas);
        }
        if scrolls {
            // Position for the next frame.
            self.update_offset(now);
        }
        self.dirty = false;
        Tick {
            redrawn,
            next: self.interval,
        }
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.cycle_start = None;
        self.dirty = true;
    }
}
