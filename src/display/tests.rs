// src/display/tests.rs

use super::*;
use crate::config::Dimension;
use crate::device::MemoryFramebuffer;
use crate::error::{ConfigError, DeviceError};
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use test_log::test;

const RED_565: [u8; 2] = [0x00, 0xf8];
const WHITE_565: [u8; 2] = [0xff, 0xff];
const BLACK_565: [u8; 2] = [0x00, 0x00];

fn rgb565_display(config: DisplayConfig) -> Display<MemoryFramebuffer> {
    let device = MemoryFramebuffer::with_format(160, 120, PixelFormat::Rgb565).unwrap();
    Display::with_device(config, device)
}

fn all_pixels(device: &MemoryFramebuffer, expected: [u8; 2]) -> bool {
    device.screen().chunks_exact(2).all(|px| px == expected)
}

#[test]
fn red_square_reaches_the_screen_only_through_blit() {
    let mut display = rgb565_display(DisplayConfig::default());
    display
        .run(|frame| {
            frame.blank(Rgb888::BLACK);
            Rectangle::new(Point::new(10, 10), Size::new(50, 50))
                .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
                .draw(frame)?;
            frame.blit();
            Ok(())
        })
        .unwrap();

    let device = display.device();
    assert_eq!(display.state(), LoopState::Stopped);
    assert!(!device.is_open());
    for y in 0..120u32 {
        for x in 0..160u32 {
            let inside = (10..60).contains(&x) && (10..60).contains(&y);
            let expected = if inside { RED_565 } else { BLACK_565 };
            assert_eq!(device.pixel(x, y), Some(&expected[..]), "pixel ({}, {})", x, y);
        }
    }
    assert_eq!(&device.screen()[10 * 320 + 20..10 * 320 + 24], [0x00, 0xf8, 0x00, 0xf8]);
}

#[test]
fn drawing_without_blit_is_not_presented() {
    let mut display = rgb565_display(DisplayConfig::default());
    display
        .run(|frame| {
            frame.clear(Rgb888::WHITE)?;
            Ok(())
        })
        .unwrap();
    assert!(all_pixels(display.device(), BLACK_565));
}

#[test]
fn unsupported_pixel_format_fails_before_mapping() {
    let mut display = rgb565_display(DisplayConfig {
        pixel_format: Some(PixelFormat::Argb8888),
        ..Default::default()
    });
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    let err = display
        .run(move |_| {
            flag.set(true);
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        DisplayError::Config(ConfigError::UnsupportedPixelFormat { .. })
    ));
    assert!(!ran.get());
    assert_eq!(display.device().map_calls(), 0);
    assert!(!display.device().is_open());
    assert_eq!(display.state(), LoopState::Stopped);
}

#[test]
fn oversize_geometry_is_a_config_error() {
    let mut display = rgb565_display(DisplayConfig {
        width: Dimension::Pixels(320),
        ..Default::default()
    });
    let err = display.run(|_| Ok(())).unwrap_err();
    assert!(matches!(
        err,
        DisplayError::Config(ConfigError::ExceedsDevice {
            requested: (320, 120),
            device: (160, 120)
        })
    ));
    assert_eq!(display.device().map_calls(), 0);
}

#[test]
fn failing_task_stops_the_loop_and_keeps_the_last_good_frame() {
    let mut display = rgb565_display(DisplayConfig::default());
    let after_failure = Rc::new(Cell::new(false));
    let witness = after_failure.clone();
    display.spawn(
        "late",
        Box::new(move |_: &mut Frame<'_>| {
            witness.set(true);
            Ok(TaskStatus::Done)
        }),
    );

    let err = display
        .run(|frame| {
            frame.blank(Rgb888::WHITE);
            frame.spawn(
                "explode",
                Box::new(|frame: &mut Frame<'_>| {
                    frame.clear(Rgb888::RED)?;
                    frame.blit_now();
                    anyhow::bail!("render failed")
                }),
            );
            Ok(())
        })
        .unwrap_err();

    match err {
        DisplayError::DrawCallback(e) => {
            assert_eq!(e.task, "explode");
            assert!(e.source.to_string().contains("render failed"));
        }
        other => panic!("expected a draw callback error, got {:?}", other),
    }
    // "late" was queued before "explode" and ran; nothing runs after the failure.
    assert!(after_failure.get());
    let device = display.device();
    assert!(!device.is_open());
    assert_eq!(device.close_calls(), 1);
    assert!(all_pixels(device, WHITE_565));
}

#[test]
fn failing_draw_callback_presents_nothing() {
    let mut display = rgb565_display(DisplayConfig::default());
    let err = display
        .run(|frame| {
            frame.blank(Rgb888::RED);
            Err(anyhow::anyhow!("no fonts"))
        })
        .unwrap_err();
    assert!(matches!(err, DisplayError::DrawCallback(ref e) if e.task == "draw"));
    assert!(all_pixels(display.device(), BLACK_565));
}

#[test]
fn request_stop_closes_the_device_once() {
    let mut display = rgb565_display(DisplayConfig::default());
    let steps = Rc::new(Cell::new(0u32));
    let counter = steps.clone();
    display
        .run(move |frame| {
            let counter = counter.clone();
            frame.spawn(
                "spin",
                Box::new(move |frame: &mut Frame<'_>| {
                    counter.set(counter.get() + 1);
                    if counter.get() == 3 {
                        frame.request_stop();
                    }
                    Ok(TaskStatus::Yield)
                }),
            );
            Ok(())
        })
        .unwrap();

    assert_eq!(steps.get(), 3);
    assert_eq!(display.state(), LoopState::Stopped);
    let device = display.device_mut();
    assert!(!device.is_open());
    assert_eq!(device.close_calls(), 1);
    device.close().unwrap();
    assert_eq!(device.close_calls(), 2);
}

#[test]
fn stop_requested_from_a_handle_before_run_skips_all_tasks() {
    let mut display = rgb565_display(DisplayConfig::default());
    display.stop_handle().request_stop();
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    display
        .run(move |_| {
            flag.set(true);
            Ok(())
        })
        .unwrap();
    assert!(!ran.get());
    assert!(!display.device().is_open());
}

#[test]
fn run_twice_is_refused() {
    let mut display = rgb565_display(DisplayConfig::default());
    display.run(|_| Ok(())).unwrap();
    let err = display.run(|_| Ok(())).unwrap_err();
    assert!(matches!(err, DisplayError::NotRunnable(LoopState::Stopped)));
    assert_eq!(display.device().close_calls(), 1);
}

#[test]
fn rejected_mapping_is_a_device_error_and_still_closes() {
    let device = MemoryFramebuffer::with_format(32, 32, PixelFormat::Rgb565)
        .unwrap()
        .reject_mapping();
    let mut display = Display::with_device(DisplayConfig::default(), device);
    let err = display.run(|_| Ok(())).unwrap_err();
    assert!(matches!(err, DisplayError::Device(DeviceError::Map { .. })));
    assert!(!display.device().is_open());
}

#[test]
fn single_buffered_drawing_is_immediately_visible() {
    let mut display = rgb565_display(DisplayConfig {
        double_buffered: false,
        ..Default::default()
    });
    display
        .run(|frame| {
            assert!(!frame.is_double_buffered());
            frame.clear(Rgb888::RED)?;
            Ok(())
        })
        .unwrap();
    assert!(all_pixels(display.device(), RED_565));
}

#[test]
fn clear_on_exit_blanks_the_screen() {
    let mut display = rgb565_display(DisplayConfig {
        clear_on_exit: true,
        ..Default::default()
    });
    display
        .run(|frame| {
            frame.blank(Rgb888::WHITE);
            Ok(())
        })
        .unwrap();
    assert!(all_pixels(display.device(), BLACK_565));
}

#[test]
fn draw_callback_runs_before_tasks_registered_earlier() {
    let mut display = rgb565_display(DisplayConfig::default());
    let order = Rc::new(RefCell::new(Vec::new()));
    let early = order.clone();
    display.spawn(
        "early",
        Box::new(move |_: &mut Frame<'_>| {
            early.borrow_mut().push("early");
            Ok(TaskStatus::Done)
        }),
    );
    let draw = order.clone();
    display
        .run(move |frame| {
            assert_eq!(frame.geometry(), DeviceGeometry::packed(160, 120, 16));
            draw.borrow_mut().push("draw");
            Ok(())
        })
        .unwrap();
    assert_eq!(*order.borrow(), vec!["draw", "early"]);
}

#[test]
fn forced_fps_presents_on_the_presenter_tick() {
    let mut display = rgb565_display(DisplayConfig {
        fps: Some(100),
        ..Default::default()
    });
    display
        .run(|frame| {
            assert_eq!(frame.fps(), Some(100));
            frame.clear(Rgb888::RED)?;
            frame.blit();
            Ok(())
        })
        .unwrap();
    // The presenter flushed the dirty frame before the loop went idle.
    assert!(all_pixels(display.device(), RED_565));
}

#[test]
fn present_requests_follow_the_dirty_mark() {
    let geometry = DeviceGeometry::packed(4, 4, 16);
    let mut back = surface::create_back_surface(geometry, PixelFormat::Rgb565);
    back.fill(Rgb888::WHITE);
    let mut memory = vec![0u8; geometry.length];
    let mut front = surface::bind_front_surface(&mut memory, geometry, PixelFormat::Rgb565).unwrap();
    let mut dirty = false;

    let marked = PresentRequest {
        dirty: true,
        ..Default::default()
    };
    apply_present_request(marked, &mut dirty, &back, &mut front).unwrap();
    assert!(dirty);
    assert!(front.bytes().iter().all(|&b| b == 0));

    let tick = PresentRequest {
        flush: true,
        ..Default::default()
    };
    apply_present_request(tick, &mut dirty, &back, &mut front).unwrap();
    assert!(!dirty);
    assert_eq!(front.bytes(), back.bytes());

    back.fill(Rgb888::RED);
    let immediate = PresentRequest {
        immediate: true,
        ..Default::default()
    };
    apply_present_request(immediate, &mut dirty, &back, &mut front).unwrap();
    assert_eq!(front.bytes(), back.bytes());

    // A tick with nothing dirty copies nothing.
    back.fill(Rgb888::BLUE);
    apply_present_request(tick, &mut dirty, &back, &mut front).unwrap();
    assert_ne!(front.bytes(), back.bytes());
}

#[test]
fn stop_signal_watch_stops_the_loop() {
    use nix::sys::signal::{raise, Signal};

    let mut display = rgb565_display(DisplayConfig::default());
    let signals = StopSignals::for_signals(&[Signal::SIGUSR1]).unwrap();
    display.stop_on(signals).unwrap();
    display
        .run(|frame| {
            frame.blank(Rgb888::WHITE);
            raise(Signal::SIGUSR1)?;
            Ok(())
        })
        .unwrap();
    assert!(all_pixels(display.device(), WHITE_565));
    assert!(!display.device().is_open());
}

#[test]
fn stop_handle_from_another_thread_ends_a_loop_waiting_on_fds() {
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    let mut display = rgb565_display(DisplayConfig::default());
    // Nothing is ever written, so only the stop can end the loop.
    let (_writer, reader) = UnixStream::pair().unwrap();
    display
        .watch_fd(
            reader.as_raw_fd(),
            "silent",
            Box::new(|_: &mut Frame<'_>| Ok(TaskStatus::Done)),
        )
        .unwrap();

    let stop = display.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        stop.request_stop();
    });
    let started = Instant::now();
    display
        .run(|frame| {
            frame.blank(Rgb888::WHITE);
            Ok(())
        })
        .unwrap();
    stopper.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(display.state(), LoopState::Stopped);
    assert!(all_pixels(display.device(), WHITE_565));
    assert!(!display.device().is_open());
}
