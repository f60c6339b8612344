//! Pixel sink capability
//!
//! A sink owns a physical LED resource. Writes land in a staging buffer and only
//! reach the hardware on [`PixelSink::commit`], which is a single transaction.

use crate::color::ColorSample;
use crate::error::EngineError;

pub trait PixelSink: Send + 'static {
    /// Number of physical pixels. Fixed for the lifetime of the sink.
    fn pixel_count(&self) -> usize;

    /// Stage one pixel. No hardware I/O happens here.
    ///
    /// # Errors
    /// [`EngineError::InvalidArgument`] if `index` is outside the strip.
    fn set_pixel(&mut self, index: usize, color: ColorSample) -> Result<(), EngineError>;

    /// Zero every staged pixel.
    fn clear(&mut self);

    /// Push the staged pixels to the hardware. May block for the transfer.
    ///
    /// # Errors
    /// Returns [`EngineError::Sink`] when the hardware write fails.
    fn commit(&mut self) -> Result<(), EngineError>;
}

/// Check `index` against `len`, shared by sink implementations.
pub fn check_index(index: usize, len: usize) -> Result<(), EngineError> {
    if index < len {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument { index, len })
    }
}
