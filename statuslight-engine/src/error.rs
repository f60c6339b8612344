use std::time::Duration;

use derive_more::{Display, Error};

/// Errors reported by the engine, its hardware capabilities, and the LED variants.
///
/// Effect calls are fire-and-forget, so most of these end up in a `warn!` rather
/// than being returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum EngineError {
    /// A pixel index outside the strip
    #[display("pixel index {index} out of range for {len} pixels")]
    InvalidArgument { index: usize, len: usize },
    /// Timers cannot run with a zero period
    #[display("invalid timer interval {_0:?}")]
    InvalidInterval(#[error(not(source))] Duration),
    #[display("timer error: {_0}")]
    Timer(#[error(not(source))] String),
    #[display("pixel sink error: {_0}")]
    Sink(#[error(not(source))] String),
    /// Timer, sink, or PWM resource could not be created
    #[display("LED resource unavailable: {_0}")]
    ResourceUnavailable(#[error(not(source))] String),
}
