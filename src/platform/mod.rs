//! Capability seams between the engine and the operating system.
//!
//! The detection services only talk to these traits, so the whole pipeline can
//! be driven by fakes in tests. Real adapters:
//! - [`SystemProcessQuery`] / [`SystemResources`]: process liveness and self
//!   resource usage via `sysinfo`
//! - [`DesktopCapture`] / [`DesktopPointer`]: screen capture and synthetic
//!   input on Windows, unsupported stubs elsewhere

#[cfg(windows)]
mod desktop;
#[cfg(not(windows))]
mod headless;
mod process;

#[cfg(windows)]
pub use desktop::{DesktopCapture, DesktopPointer};
#[cfg(not(windows))]
pub use headless::{DesktopCapture, DesktopPointer};
pub use process::{ResourceSample, SystemProcessQuery, SystemResources};

use image::GrayImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No monitor available for capture")]
    NoMonitor,

    #[error("Screen capture failed: {0}")]
    Backend(String),

    #[error("Screen capture is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Pointer move to ({x}, {y}) failed: {message}")]
    Move { x: i32, y: i32, message: String },

    #[error("Mouse button event failed: {0}")]
    Button(String),

    #[error("Synthetic input is not supported on this platform")]
    Unsupported,
}

/// Whether a process is still alive.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessQuery: Send + Sync {
    fn is_process_running(&self, pid: u32) -> bool;
}

/// Source of grayscale screen frames.
#[cfg_attr(test, mockall::automock)]
pub trait ScreenCapture: Send + Sync {
    /// Capture the primary display in physical pixels.
    fn capture_screen(&self) -> Result<GrayImage, CaptureError>;

    /// Physical pixels per logical pixel of the captured display.
    fn scale_factor(&self) -> f64;
}

/// Synthetic pointer input.
#[cfg_attr(test, mockall::automock)]
pub trait PointerInput: Send + Sync {
    /// Ratio applied to logical coordinates before moving the pointer.
    fn device_pixel_ratio(&self) -> f64;

    fn move_to(&self, x: i32, y: i32) -> Result<(), InputError>;

    fn press_left(&self) -> Result<(), InputError>;

    fn release_left(&self) -> Result<(), InputError>;
}
