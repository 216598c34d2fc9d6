// src/transition.rs
//! Easing curves for animations.
//!
//! Maps animation progress in `[0, 1]` to a position, usually also in
//! `[0, 1]` (Back and Elastic overshoot). The curves are the classic
//! mootools `Fx.Transitions` set:
//!
//! - `In` applies the curve as is: `f(p)`
//! - `Out` runs it backwards: `1 - f(1 - p)`
//! - `InOut` runs it forwards for the first half, backwards for the second.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transition {
    #[default]
    Linear,
    /// p²
    Quad,
    /// p³
    Cubic,
    /// p⁴
    Quart,
    /// p⁵
    Quint,
    /// p⁶
    Pow,
    Expo,
    Circ,
    Sine,
    /// Pulls back before moving towards the target.
    Back,
    Bounce,
    Elastic,
}

impl Transition {
    /// The raw curve (ease-in form). `p` is expected in `[0, 1]`.
    pub fn curve(self, p: f64) -> f64 {
        match self {
            Transition::Linear => p,
            Transition::Quad => p.powi(2),
            Transition::Cubic => p.powi(3),
            Transition::Quart => p.powi(4),
            Transition::Quint => p.powi(5),
            Transition::Pow => p.powi(6),
            Transition::Expo => 2f64.powf(8.0 * (p - 1.0)),
            Transition::Circ => 1.0 - p.acos().sin(),
            Transition::Sine => 1.0 - (p * PI / 2.0).cos(),
            Transition::Back => p.powi(2) * (2.618 * p - 1.618),
            Transition::Bounce => bounce(p),
            Transition::Elastic => 2f64.powf(10.0 * (p - 1.0)) * (20.0 * (p - 1.0) * PI / 3.0).cos(),
        }
    }
}

fn bounce(p: f64) -> f64 {
    let mut a = 0.0;
    let mut b = 1.0;
    // Terminates for any p in [0, 1]: the threshold (7 - 4a) / 11 falls below 0.
    loop {
        if p >= (7.0 - 4.0 * a) / 11.0 {
            return b * b - ((11.0 - 6.0 * a - 11.0 * p) / 4.0).powi(2);
        }
        a += b;
        b /= 2.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ease {
    #[default]
    In,
    Out,
    InOut,
}

/// A transition curve with an ease direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Easing {
    pub transition: Transition,
    pub ease: Ease,
}

impl Easing {
    pub const LINEAR: Easing = Easing {
        transition: Transition::Linear,
        ease: Ease::In,
    };

    pub const fn new(transition: Transition, ease: Ease) -> Self {
        Self { transition, ease }
    }

    /// Position for `progress`, which is clamped to `[0, 1]`.
    pub fn apply(&self, progress: f64) -> f64 {
        let p = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        let f = |x: f64| self.transition.curve(x);
        match self.ease {
            Ease::In => f(p),
            Ease::Out => 1.0 - f(1.0 - p),
            Ease::InOut => {
                if p <= 0.5 {
                    f(2.0 * p) / 2.0
                } else {
                    (2.0 - f(2.0 * (1.0 - p))) / 2.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const ALL: [Transition; 12] = [
        Transition::Linear,
        Transition::Quad,
        Transition::Cubic,
        Transition::Quart,
        Transition::Quint,
        Transition::Pow,
        Transition::Expo,
        Transition::Circ,
        Transition::Sine,
        Transition::Back,
        Transition::Bounce,
        Transition::Elastic,
    ];

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn curves_end_at_one() {
        for t in ALL {
            assert!(close(t.curve(1.0), 1.0), "{:?} at 1 = {}", t, t.curve(1.0));
        }
    }

    #[test]
    fn curves_start_near_zero() {
        for t in ALL {
            assert!(t.curve(0.0).abs() < 0.01, "{:?} at 0 = {}", t, t.curve(0.0));
        }
    }

    #[test]
    fn polynomial_values() {
        assert!(close(Transition::Quad.curve(0.5), 0.25));
        assert!(close(Transition::Cubic.curve(0.5), 0.125));
        assert!(close(Transition::Pow.curve(0.5), 1.0 / 64.0));
        assert!(close(Transition::Sine.curve(1.0 / 3.0), 1.0 - (PI / 6.0).cos()));
    }

    #[test]
    fn back_overshoots_below_zero() {
        assert!(Transition::Back.curve(0.3) < 0.0);
    }

    #[test]
    fn bounce_segments() {
        // First segment is the parabola 1 - ((11 - 11p) / 4)² for p >= 7/11.
        assert!(close(Transition::Bounce.curve(0.8), 1.0 - ((11.0 - 8.8) / 4.0f64).powi(2)));
        // p = 0.5 lands in the second segment (a = 1, b = 0.5).
        assert!(close(Transition::Bounce.curve(0.5), 0.25 - ((5.0 - 5.5) / 4.0f64).powi(2)));
    }

    #[test]
    fn ease_directions() {
        let quad = |ease| Easing::new(Transition::Quad, ease);
        assert!(close(quad(Ease::In).apply(0.5), 0.25));
        assert!(close(quad(Ease::Out).apply(0.5), 0.75));
        assert!(close(quad(Ease::InOut).apply(0.25), 0.125));
        assert!(close(quad(Ease::InOut).apply(0.5), 0.5));
        assert!(close(quad(Ease::InOut).apply(0.75), 0.875));
        for ease in [Ease::In, Ease::Out, Ease::InOut] {
            assert!(close(quad(ease).apply(1.0), 1.0));
            assert!(close(quad(ease).apply(0.0), 0.0));
        }
    }

    #[test]
    fn progress_is_clamped() {
        let easing = Easing::new(Transition::Bounce, Ease::Out);
        assert!(close(easing.apply(-3.0), easing.apply(0.0)));
        assert!(close(easing.apply(7.5), 1.0));
        assert!(close(Easing::LINEAR.apply(f64::NAN), 0.0));
    }
}
