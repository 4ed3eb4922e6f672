use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rectangle on the captured screen, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with a `width` x `height` image, `None` when disjoint.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<ScreenRegion> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clamped = ScreenRegion {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        (!clamped.is_empty()).then_some(clamped)
    }
}

/// Outcome of a single template search.
///
/// The peak confidence is always reported, whether or not it cleared the
/// threshold; `found` is exactly `confidence >= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatchResult {
    pub found: bool,
    /// Top-left corner of the best match, in full-screen coordinates.
    pub location: (i32, i32),
    pub confidence: f64,
    pub threshold: f64,
    /// Template size at the matched scale.
    pub matched_size: (u32, u32),
    pub scale: f64,
    #[serde(skip)]
    pub detection_time: Duration,
}

impl TemplateMatchResult {
    /// Build a result from a peak score, deciding `found` against `threshold`.
    pub fn evaluate(
        location: (i32, i32),
        confidence: f64,
        threshold: f64,
        matched_size: (u32, u32),
        scale: f64,
    ) -> Self {
        Self {
            found: confidence >= threshold,
            location,
            confidence,
            threshold,
            matched_size,
            scale,
            detection_time: Duration::ZERO,
        }
    }

    /// A search that produced no candidate at all.
    pub fn not_found(threshold: f64) -> Self {
        Self {
            found: false,
            location: (0, 0),
            confidence: 0.0,
            threshold,
            matched_size: (0, 0),
            scale: 1.0,
            detection_time: Duration::ZERO,
        }
    }

    pub fn with_detection_time(mut self, detection_time: Duration) -> Self {
        self.detection_time = detection_time;
        self
    }

    /// Center of the matched area, the point to click.
    pub fn center(&self) -> (i32, i32) {
        (
            self.location.0 + (self.matched_size.0 / 2) as i32,
            self.location.1 + (self.matched_size.1 / 2) as i32,
        )
    }
}

/// Outcome of a synthetic click.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickResult {
    pub success: bool,
    /// Requested position in logical coordinates.
    pub target: (i32, i32),
    /// Position after DPI adjustment, when the pointer moved.
    pub actual: Option<(i32, i32)>,
    pub click_time: Duration,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_against_threshold() {
        let result = TemplateMatchResult::evaluate((10, 20), 0.82, 0.8, (40, 20), 1.0);
        assert!(result.found);

        let result = TemplateMatchResult::evaluate((10, 20), 0.82, 0.85, (40, 20), 1.0);
        assert!(!result.found);
        assert_eq!(result.confidence, 0.82);
    }

    #[test]
    fn test_center_of_match() {
        let result = TemplateMatchResult::evaluate((100, 50), 0.9, 0.8, (40, 20), 1.0);
        assert_eq!(result.center(), (120, 60));
    }

    #[test]
    fn test_region_clamping() {
        let region = ScreenRegion::new(50, 50, 100, 100);
        assert_eq!(region.clamp_to(120, 80), Some(ScreenRegion::new(50, 50, 70, 30)));
        assert_eq!(region.clamp_to(40, 40), None);
        assert!(ScreenRegion::new(0, 0, 0, 10).is_empty());
    }
}
