use crate::platform::{CaptureError, InputError, PointerInput, ScreenCapture};
use image::{DynamicImage, GrayImage, RgbaImage};
use rdev::{Button, EventType, simulate};
use std::thread;
use std::time::Duration;

/// Pause between synthetic events so the OS registers each one.
const EVENT_SPACING: Duration = Duration::from_millis(20);

fn primary_monitor() -> Result<xcap::Monitor, CaptureError> {
    let monitors = xcap::Monitor::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            return Ok(monitor);
        }
        fallback.get_or_insert(monitor);
    }
    fallback.ok_or(CaptureError::NoMonitor)
}

/// Captures the primary monitor through `xcap`.
pub struct DesktopCapture;

impl DesktopCapture {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DesktopCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCapture for DesktopCapture {
    fn capture_screen(&self) -> Result<GrayImage, CaptureError> {
        let monitor = primary_monitor()?;
        let frame = monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        let (width, height) = (frame.width(), frame.height());
        let rgba = RgbaImage::from_raw(width, height, frame.into_raw())
            .ok_or_else(|| CaptureError::Backend("frame buffer size mismatch".to_string()))?;

        Ok(DynamicImage::ImageRgba8(rgba).into_luma8())
    }

    fn scale_factor(&self) -> f64 {
        primary_monitor()
            .ok()
            .and_then(|m| m.scale_factor().ok())
            .map(f64::from)
            .unwrap_or(1.0)
    }
}

/// Synthesizes mouse events through `rdev`.
pub struct DesktopPointer {
    device_pixel_ratio: f64,
}

impl DesktopPointer {
    /// Pointer using the primary monitor's scale factor as pixel ratio.
    pub fn new() -> Self {
        Self {
            device_pixel_ratio: DesktopCapture.scale_factor(),
        }
    }

    fn send(event: &EventType) -> Result<(), rdev::SimulateError> {
        let result = simulate(event);
        thread::sleep(EVENT_SPACING);
        result
    }
}

impl Default for DesktopPointer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerInput for DesktopPointer {
    fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    fn move_to(&self, x: i32, y: i32) -> Result<(), InputError> {
        Self::send(&EventType::MouseMove {
            x: f64::from(x),
            y: f64::from(y),
        })
        .map_err(|e| InputError::Move {
            x,
            y,
            message: format!("{:?}", e),
        })
    }

    fn press_left(&self) -> Result<(), InputError> {
        Self::send(&EventType::ButtonPress(Button::Left))
            .map_err(|e| InputError::Button(format!("press: {:?}", e)))
    }

    fn release_left(&self) -> Result<(), InputError> {
        Self::send(&EventType::ButtonRelease(Button::Left))
            .map_err(|e| InputError::Button(format!("release: {:?}", e)))
    }
}
