//! Color samples and the per-channel arithmetic used by the effects

pub use rgb::RGB8;

/// One pixel's intensity channels
pub type ColorSample = RGB8;

/// All channels at zero intensity
pub const OFF: ColorSample = RGB8::new(0, 0, 0);

/// Build a sample from its red, green, and blue channels.
#[must_use]
pub const fn rgb(r: u8, g: u8, b: u8) -> ColorSample {
    RGB8::new(r, g, b)
}

/// Halve every channel, rounding toward zero.
#[must_use]
pub const fn halve(color: ColorSample) -> ColorSample {
    RGB8::new(color.r / 2, color.g / 2, color.b / 2)
}

#[must_use]
pub const fn is_off(color: ColorSample) -> bool {
    color.r == 0 && color.g == 0 && color.b == 0
}

/// Move every channel one unit toward `target`. Channels already at the target stay put.
#[must_use]
pub fn step_toward(color: ColorSample, target: ColorSample) -> ColorSample {
    RGB8::new(
        step_channel(color.r, target.r),
        step_channel(color.g, target.g),
        step_channel(color.b, target.b),
    )
}

fn step_channel(value: u8, target: u8) -> u8 {
    match value.cmp(&target) {
        std::cmp::Ordering::Less => value + 1,
        std::cmp::Ordering::Greater => value - 1,
        std::cmp::Ordering::Equal => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halve_rounds_toward_zero() {
        assert_eq!(halve(rgb(255, 3, 1)), rgb(127, 1, 0));
        assert_eq!(halve(OFF), OFF);
    }

    #[test]
    fn test_step_toward_moves_each_channel_independently() {
        let stepped = step_toward(rgb(0, 10, 5), rgb(3, 2, 5));
        assert_eq!(stepped, rgb(1, 9, 5));
    }

    #[test]
    fn test_step_toward_handles_channel_extremes() {
        assert_eq!(step_toward(rgb(254, 1, 0), rgb(255, 0, 0)), rgb(255, 0, 0));
        assert_eq!(step_toward(rgb(255, 0, 0), rgb(255, 0, 0)), rgb(255, 0, 0));
    }
}
