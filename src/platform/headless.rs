use crate::platform::{CaptureError, InputError, PointerInput, ScreenCapture};
use image::GrayImage;

/// Placeholder capture for platforms without a game client; every capture
/// fails softly so the visual path reports "not found".
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
        Err(CaptureError::Unsupported)
    }

    fn scale_factor(&self) -> f64 {
        1.0
    }
}

/// Placeholder pointer; clicks fail with [`InputError::Unsupported`].
pub struct DesktopPointer;

impl DesktopPointer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DesktopPointer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerInput for DesktopPointer {
    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }

    fn move_to(&self, _x: i32, _y: i32) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }

    fn press_left(&self) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }

    fn release_left(&self) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }
}
