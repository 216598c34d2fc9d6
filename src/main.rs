// src/main.rs

//! `fbtft [simple|widgets] [config.json]`
//!
//! Demo driver for the presentation loop. The device path comes from the
//! config file, else `$FRAMEBUFFER`, else `/dev/fb0`. Ctrl-C stops cleanly.

use anyhow::{bail, Context};
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::pixelcolor::{Rgb888, WebColors};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, PrimitiveStyle, Rectangle};
use fbtft::os::signals::StopSignals;
use fbtft::surface::Canvas;
use fbtft::transition::{Ease, Easing, Transition};
use fbtft::widgets::{self, BlinkIcon, Marquee};
use fbtft::{Display, DisplayConfig, Frame};
use log::info;
use std::time::Duration;

const GREY: Rgb888 = Rgb888::new(0x80, 0x80, 0x80);
const INSET: u32 = 50;

#[derive(Debug, Clone, Copy)]
enum Demo {
    Simple,
    Widgets,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let mut args = std::env::args().skip(1);
    let demo = match args.next().as_deref() {
        None | Some("simple") => Demo::Simple,
        Some("widgets") => Demo::Widgets,
        Some(other) => bail!("unknown demo '{}' (expected 'simple' or 'widgets')", other),
    };
    let config = match args.next() {
        Some(path) => DisplayConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => DisplayConfig::from_env(),
    };
    info!("Starting {:?} demo on {}", demo, config.device_path.display());

    let mut display = Display::open(config).context("Failed to open display")?;
    let signals = StopSignals::install().context("Failed to install signal handling")?;
    display
        .stop_on(signals)
        .context("Failed to watch for stop signals")?;

    match demo {
        Demo::Simple => display.run(draw_simple),
        Demo::Widgets => display.run(draw_widgets),
    }
    .context("Display loop failed")?;

    info!("Bye");
    Ok(())
}

/// Grey background with a red rectangle inset from every edge.
fn draw_simple(frame: &mut Frame<'_>) -> anyhow::Result<()> {
    frame.clear(GREY)?;
    let size = frame.size();
    let inner = Size::new(
        size.width.saturating_sub(2 * INSET),
        size.height.saturating_sub(2 * INSET),
    );
    Rectangle::new(Point::new(INSET as i32, INSET as i32), inner)
        .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
        .draw(frame)?;
    frame.blit();
    Ok(())
}

fn draw_circle(canvas: &mut Canvas<'_>, area: Rectangle) {
    let diameter = area.size.width.min(area.size.height);
    Circle::new(area.top_left, diameter)
        .into_styled(PrimitiveStyle::with_fill(Rgb888::CSS_ORANGE))
        .draw(canvas)
        .ok();
}

fn draw_widgets(frame: &mut Frame<'_>) -> anyhow::Result<()> {
    frame.clear(GREY)?;

    let icon = BlinkIcon::new(Point::new(10, 10), Size::new(70, 70), draw_circle)
        .with_background(GREY)
        .with_timing(Duration::from_millis(200), Duration::from_millis(800));
    widgets::start(icon, frame);

    let width = frame.size().width.saturating_sub(20);
    let marquee = Marquee::new(
        "Double-buffered framebuffer drawing from Rust",
        Point::new(10, 90),
        Size::new(width, 24),
    )
    .with_font(&FONT_10X20)
    .with_colors(Rgb888::WHITE, Rgb888::CSS_DARK_SLATE_GRAY)
    .with_easing(Easing::new(Transition::Sine, Ease::InOut))
    .smooth(true)
    .with_speed(2, Duration::from_millis(40));
    widgets::start(marquee, frame);

    frame.blit();
    Ok(())
}
