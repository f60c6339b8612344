//! Animation steps
//!
//! Each effect is a value holding its own algorithm state. The engine installs
//! at most one of them and advances it once per timer tick. Installing a fresh
//! value is what resets blink phase, breathe direction and scroll offset.

use std::time::Duration;

use crate::color::{self, ColorSample, OFF};

/// What the engine should do after a step has run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Commit the buffer and keep ticking
    Render,
    /// Clear the display, uninstall the step and stop the timer
    Finished,
}

/// Effect requested by a state binding.
///
/// `C` is the sample type of the variant: an RGB color for addressable LEDs,
/// a brightness percentage for the PWM LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectRequest<C> {
    SolidColor(C),
    Blink {
        color: C,
        interval: Duration,
    },
    Breathe {
        low: C,
        high: C,
        interval: Duration,
    },
    Scroll {
        low: C,
        high: C,
        length: usize,
        interval: Duration,
    },
    FadeOut {
        interval: Duration,
    },
    TurnOff,
}

/// Kind of the animation currently installed in an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Blink,
    Breathe,
    Scroll,
    FadeOut,
}

/// The single installed animation step
#[derive(Debug, Clone)]
pub(crate) enum Animation {
    Blink(Blink),
    Breathe(Breathe),
    Scroll(Scroll),
    FadeOut(FadeOut),
}

impl Animation {
    pub(crate) const fn kind(&self) -> EffectKind {
        match self {
            Self::Blink(_) => EffectKind::Blink,
            Self::Breathe(_) => EffectKind::Breathe,
            Self::Scroll(_) => EffectKind::Scroll,
            Self::FadeOut(_) => EffectKind::FadeOut,
        }
    }

    /// Paint the frame shown the moment the effect is installed.
    /// Returns `false` when the effect keeps the current buffer as its first frame.
    pub(crate) fn first_frame(&mut self, pixels: &mut [ColorSample]) -> bool {
        match self {
            Self::Blink(blink) => {
                pixels.fill(blink.color);
                true
            }
            Self::Breathe(breathe) => {
                pixels.fill(breathe.current);
                true
            }
            Self::Scroll(scroll) => {
                scroll.paint(pixels);
                true
            }
            Self::FadeOut(_) => false,
        }
    }

    pub(crate) fn advance(&mut self, pixels: &mut [ColorSample]) -> StepOutcome {
        match self {
            Self::Blink(blink) => blink.advance(pixels),
            Self::Breathe(breathe) => breathe.advance(pixels),
            Self::Scroll(scroll) => scroll.advance(pixels),
            Self::FadeOut(fade) => fade.advance(pixels),
        }
    }
}

/// Alternate between the color and off, starting with the color shown
#[derive(Debug, Clone)]
pub(crate) struct Blink {
    color: ColorSample,
    on: bool,
    /// Toggles left for a counted blink; `None` blinks until superseded
    remaining: Option<u32>,
}

impl Blink {
    pub(crate) const fn new(color: ColorSample) -> Self {
        Self {
            color,
            on: true,
            remaining: None,
        }
    }

    /// Blink `times` times and finish dark. The first on-phase is the
    /// installed frame, so each blink after it costs two toggles.
    pub(crate) const fn counted(color: ColorSample, times: u32) -> Self {
        Self {
            color,
            on: true,
            remaining: Some(times.saturating_mul(2).saturating_sub(1)),
        }
    }

    fn advance(&mut self, pixels: &mut [ColorSample]) -> StepOutcome {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                pixels.fill(OFF);
                return StepOutcome::Finished;
            }
        }
        self.on = !self.on;
        pixels.fill(if self.on { self.color } else { OFF });
        StepOutcome::Render
    }
}

/// Triangular dimming between two colors.
///
/// Every channel moves one unit per tick toward the current bound. The
/// direction only flips once all channels sit on the bound together, so
/// channels with a short range wait for the others instead of bouncing early.
#[derive(Debug, Clone)]
pub(crate) struct Breathe {
    low: ColorSample,
    high: ColorSample,
    current: ColorSample,
    rising: bool,
}

impl Breathe {
    pub(crate) const fn new(low: ColorSample, high: ColorSample) -> Self {
        Self {
            low,
            high,
            current: low,
            rising: true,
        }
    }

    fn advance(&mut self, pixels: &mut [ColorSample]) -> StepOutcome {
        let bound = if self.rising { self.high } else { self.low };
        self.current = color::step_toward(self.current, bound);
        if self.current == bound {
            self.rising = !self.rising;
        }
        pixels.fill(self.current);
        StepOutcome::Render
    }
}

/// A window of `length` lit pixels travelling around the ring
#[derive(Debug, Clone)]
pub(crate) struct Scroll {
    low: ColorSample,
    high: ColorSample,
    length: usize,
    offset: usize,
}

impl Scroll {
    pub(crate) const fn new(low: ColorSample, high: ColorSample, length: usize) -> Self {
        Self {
            low,
            high,
            length,
            offset: 0,
        }
    }

    fn paint(&self, pixels: &mut [ColorSample]) {
        let count = pixels.len();
        if count == 0 {
            return;
        }
        pixels.fill(self.low);
        for i in 0..self.length.min(count) {
            pixels[(self.offset + i) % count] = self.high;
        }
    }

    fn advance(&mut self, pixels: &mut [ColorSample]) -> StepOutcome {
        if !pixels.is_empty() {
            self.offset = (self.offset + 1) % pixels.len();
        }
        self.paint(pixels);
        StepOutcome::Render
    }
}

/// Halve everything each tick until the strip is dark
#[derive(Debug, Clone, Default)]
pub(crate) struct FadeOut;

impl FadeOut {
    #[allow(clippy::unused_self)]
    fn advance(&mut self, pixels: &mut [ColorSample]) -> StepOutcome {
        let mut all_off = true;
        for pixel in pixels.iter_mut() {
            *pixel = color::halve(*pixel);
            all_off &= color::is_off(*pixel);
        }
        if all_off {
            StepOutcome::Finished
        } else {
            StepOutcome::Render
        }
    }
}

/// Convenience constructor used by the engine for each request kind
pub(crate) fn animation_for(request: &EffectRequest<ColorSample>) -> Option<(Animation, Duration)> {
    match *request {
        EffectRequest::Blink { color, interval } => Some((Animation::Blink(Blink::new(color)), interval)),
        EffectRequest::Breathe { low, high, interval } => {
            Some((Animation::Breathe(Breathe::new(low, high)), interval))
        }
        EffectRequest::Scroll {
            low,
            high,
            length,
            interval,
        } => Some((Animation::Scroll(Scroll::new(low, high, length)), interval)),
        EffectRequest::FadeOut { interval } => Some((Animation::FadeOut(FadeOut), interval)),
        EffectRequest::SolidColor(_) | EffectRequest::TurnOff => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::rgb;

    fn run(animation: &mut Animation, pixels: &mut [ColorSample], ticks: usize) {
        for _ in 0..ticks {
            animation.advance(pixels);
        }
    }

    #[test]
    fn test_blink_starts_on_then_alternates() {
        let red = rgb(10, 0, 0);
        let mut pixels = [OFF; 3];
        let mut blink = Animation::Blink(Blink::new(red));

        assert!(blink.first_frame(&mut pixels));
        assert_eq!(pixels, [red; 3]);

        blink.advance(&mut pixels);
        assert_eq!(pixels, [OFF; 3]);

        blink.advance(&mut pixels);
        assert_eq!(pixels, [red; 3]);
    }

    #[test]
    fn test_counted_blink_finishes_dark() {
        let red = rgb(10, 0, 0);
        let mut pixels = [OFF; 2];
        let mut blink = Animation::Blink(Blink::counted(red, 2));
        assert!(blink.first_frame(&mut pixels));
        assert_eq!(pixels, [red; 2]);

        let outcomes: Vec<_> = (0..3)
            .map(|_| {
                let outcome = blink.advance(&mut pixels);
                (outcome, pixels[0])
            })
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (StepOutcome::Render, OFF),
                (StepOutcome::Render, red),
                (StepOutcome::Finished, OFF),
            ]
        );
    }

    #[test]
    fn test_single_counted_blink_is_one_tick() {
        let mut pixels = [OFF; 1];
        let mut blink = Animation::Blink(Blink::counted(rgb(1, 1, 1), 1));
        blink.first_frame(&mut pixels);
        assert_eq!(blink.advance(&mut pixels), StepOutcome::Finished);
        assert_eq!(pixels, [OFF]);
    }

    #[test]
    fn test_breathe_reaches_high_then_returns_to_low() {
        let low = rgb(0, 0, 0);
        let high = rgb(10, 10, 10);
        let mut pixels = [OFF; 2];
        let mut breathe = Animation::Breathe(Breathe::new(low, high));
        breathe.first_frame(&mut pixels);

        run(&mut breathe, &mut pixels, 10);
        assert_eq!(pixels, [high; 2]);

        run(&mut breathe, &mut pixels, 10);
        assert_eq!(pixels, [low; 2]);

        // And back up again
        run(&mut breathe, &mut pixels, 1);
        assert_eq!(pixels, [rgb(1, 1, 1); 2]);
    }

    #[test]
    fn test_breathe_flips_only_when_all_channels_reach_bound() {
        // Red has a range of 2, blue a range of 5
        let low = rgb(0, 0, 0);
        let high = rgb(2, 0, 5);
        let mut pixels = [OFF; 1];
        let mut breathe = Animation::Breathe(Breathe::new(low, high));

        run(&mut breathe, &mut pixels, 3);
        // Red has topped out but blue is still rising, so red holds instead of falling
        assert_eq!(pixels[0], rgb(2, 0, 3));

        run(&mut breathe, &mut pixels, 2);
        assert_eq!(pixels[0], high);

        run(&mut breathe, &mut pixels, 1);
        assert_eq!(pixels[0], rgb(1, 0, 4));
    }

    #[test]
    fn test_breathe_with_inverted_bounds_still_ping_pongs() {
        let low = rgb(4, 0, 0);
        let high = rgb(2, 0, 0);
        let mut pixels = [OFF; 1];
        let mut breathe = Animation::Breathe(Breathe::new(low, high));

        run(&mut breathe, &mut pixels, 2);
        assert_eq!(pixels[0], high);
        run(&mut breathe, &mut pixels, 2);
        assert_eq!(pixels[0], low);
    }

    #[test]
    fn test_scroll_wraps_around_ring() {
        let low = rgb(0, 0, 1);
        let high = rgb(0, 0, 9);
        let mut pixels = [OFF; 6];
        let mut scroll = Animation::Scroll(Scroll::new(low, high, 3));
        scroll.first_frame(&mut pixels);

        for offset in 0..6 {
            for (i, pixel) in pixels.iter().enumerate() {
                let lit = (0..3).any(|j| (offset + j) % 6 == i);
                let expected = if lit { high } else { low };
                assert_eq!(*pixel, expected, "offset {offset}, pixel {i}");
            }
            scroll.advance(&mut pixels);
        }
    }

    #[test]
    fn test_scroll_longer_than_ring_lights_everything() {
        let high = rgb(5, 5, 5);
        let mut pixels = [OFF; 4];
        let mut scroll = Animation::Scroll(Scroll::new(OFF, high, 10));
        scroll.first_frame(&mut pixels);
        assert_eq!(pixels, [high; 4]);
        scroll.advance(&mut pixels);
        assert_eq!(pixels, [high; 4]);
    }

    #[test]
    fn test_fade_out_halves_until_dark() {
        let mut pixels = [rgb(200, 100, 7), rgb(1, 0, 0)];
        let mut fade = Animation::FadeOut(FadeOut);
        assert!(!fade.first_frame(&mut pixels));
        assert_eq!(pixels[0], rgb(200, 100, 7));

        assert_eq!(fade.advance(&mut pixels), StepOutcome::Render);
        assert_eq!(pixels, [rgb(100, 50, 3), OFF]);

        // 100 -> 50 -> 25 -> 12 -> 6 -> 3 -> 1 -> 0
        let outcomes: Vec<_> = (0..7).map(|_| fade.advance(&mut pixels)).collect();
        assert_eq!(outcomes.last(), Some(&StepOutcome::Finished));
        assert!(outcomes[..6].iter().all(|o| *o == StepOutcome::Render));
        assert_eq!(pixels, [OFF; 2]);
    }

    #[test]
    fn test_fade_out_on_dark_strip_finishes_immediately() {
        let mut pixels = [OFF; 3];
        let mut fade = Animation::FadeOut(FadeOut);
        assert_eq!(fade.advance(&mut pixels), StepOutcome::Finished);
    }

    #[test]
    fn test_solid_requests_have_no_animation() {
        assert!(animation_for(&EffectRequest::SolidColor(rgb(1, 2, 3))).is_none());
        assert!(animation_for(&EffectRequest::<ColorSample>::TurnOff).is_none());
        let (animation, interval) = animation_for(&EffectRequest::FadeOut {
            interval: Duration::from_millis(50),
        })
        .unwrap();
        assert_eq!(animation.kind(), EffectKind::FadeOut);
        assert_eq!(interval, Duration::from_millis(50));
    }
}
