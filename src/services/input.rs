use crate::metrics::PerformanceMetrics;
use crate::models::ClickResult;
use crate::platform::PointerInput;
use std::sync::Arc;
use std::time::Instant;

/// Issues synthetic left clicks at logical screen coordinates.
pub struct InputSynthesizer {
    pointer: Arc<dyn PointerInput>,
    metrics: Arc<PerformanceMetrics>,
}

impl InputSynthesizer {
    pub fn new(pointer: Arc<dyn PointerInput>, metrics: Arc<PerformanceMetrics>) -> Self {
        Self { pointer, metrics }
    }

    /// Convert logical coordinates to device coordinates.
    pub fn to_device(&self, x: i32, y: i32) -> (i32, i32) {
        let ratio = self.pointer.device_pixel_ratio();
        let ratio = if ratio.is_finite() && ratio > 0.0 { ratio } else { 1.0 };
        (
            (f64::from(x) * ratio).round() as i32,
            (f64::from(y) * ratio).round() as i32,
        )
    }

    /// Move, press and release the left button at (`x`, `y`).
    ///
    /// Latency is recorded whether or not the click succeeds.
    pub fn click(&self, x: i32, y: i32) -> ClickResult {
        let started = Instant::now();
        let (dx, dy) = self.to_device(x, y);

        let outcome = self
            .pointer
            .move_to(dx, dy)
            .and_then(|()| self.pointer.press_left())
            .and_then(|()| self.pointer.release_left());

        let click_time = started.elapsed();
        let result = match outcome {
            Ok(()) => {
                tracing::info!("Clicked ({}, {}) -> device ({}, {}) in {:?}", x, y, dx, dy, click_time);
                ClickResult {
                    success: true,
                    target: (x, y),
                    actual: Some((dx, dy)),
                    click_time,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Click at ({}, {}) failed: {}", x, y, e);
                ClickResult {
                    success: false,
                    target: (x, y),
                    actual: None,
                    click_time,
                    error: Some(e.to_string()),
                }
            }
        };

        self.metrics
            .record_click(click_time, result.success, result.error.as_deref());
        result
    }
}
