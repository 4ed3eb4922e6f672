//! Locating the ready-check accept button on screen.
//!
//! Scores are zero-mean normalized cross-correlation (1.0 for an exact
//! match, 0.0 for flat or uncorrelated areas). Large searches run coarse to
//! fine: a downsampled pass proposes a few candidates which are then refined
//! at full resolution around each candidate.

use crate::metrics::PerformanceMetrics;
use crate::models::config::{MATCH_THRESHOLD_RANGE, MAX_SCALE_STEPS, UI_SCALE_RANGE};
use crate::models::{ScaleRange, ScreenRegion, TemplateMatchResult};
use crate::platform::ScreenCapture;
use camino::Utf8Path;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::rect::Rect;
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Templates must be strictly larger than this in both dimensions.
pub const MIN_TEMPLATE_SIDE: u32 = 10;

/// Coarse passes keep the downsampled template at least this tall and wide.
const MIN_COARSE_SIDE: u32 = 8;
const MAX_PYRAMID_FACTOR: u32 = 4;
const COARSE_CANDIDATES: usize = 3;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Match threshold {0} outside {MATCH_THRESHOLD_RANGE:?}")]
    InvalidThreshold(f64),

    #[error("UI scale factor {0} outside {UI_SCALE_RANGE:?}")]
    InvalidScale(f64),

    #[error("Template {width}x{height} is too small (must exceed {MIN_TEMPLATE_SIDE}x{MIN_TEMPLATE_SIDE})")]
    TemplateTooSmall { width: u32, height: u32 },

    #[error("Failed to load template {path}: {message}")]
    TemplateLoad { path: String, message: String },
}

/// Built-in accept-button template: a bright rounded panel with a darker
/// border and a label band.
pub fn synthetic_accept_template() -> GrayImage {
    let mut template = GrayImage::from_pixel(120, 40, Luma([24]));
    draw_filled_rect_mut(&mut template, Rect::at(4, 4).of_size(112, 32), Luma([168]));
    draw_hollow_rect_mut(&mut template, Rect::at(2, 2).of_size(116, 36), Luma([96]));
    draw_filled_rect_mut(&mut template, Rect::at(30, 16).of_size(60, 8), Luma([236]));
    template
}

fn window_sum(integral: &Image<Luma<u64>>, x: u32, y: u32, width: u32, height: u32) -> u64 {
    let a = integral.get_pixel(x, y)[0];
    let b = integral.get_pixel(x + width, y)[0];
    let c = integral.get_pixel(x, y + height)[0];
    let d = integral.get_pixel(x + width, y + height)[0];
    (d + a) - (b + c)
}

/// Zero-mean normalized cross-correlation of `template` at every offset.
///
/// Returns `None` when the template does not fit or has no contrast.
fn zncc_map(area: &GrayImage, template: &GrayImage) -> Option<Image<Luma<f32>>> {
    let (aw, ah) = area.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > aw || th > ah {
        return None;
    }

    let n = f64::from(tw) * f64::from(th);
    let (t_sum, t_sq_sum) = template.pixels().fold((0.0, 0.0), |(sum, sq), p| {
        let v = f64::from(p[0]);
        (sum + v, sq + v * v)
    });
    let t_mean = t_sum / n;
    let t_energy = t_sq_sum - t_sum * t_mean;
    if t_energy <= f64::EPSILON {
        return None;
    }

    let mut scores = match_template(area, template, MatchTemplateMethod::CrossCorrelation);
    let sums: Image<Luma<u64>> = integral_image(area);
    let squares: Image<Luma<u64>> = integral_squared_image(area);

    for (x, y, score) in scores.enumerate_pixels_mut() {
        let w_sum = window_sum(&sums, x, y, tw, th) as f64;
        let w_sq = window_sum(&squares, x, y, tw, th) as f64;
        let w_energy = w_sq - w_sum * w_sum / n;

        let zncc = if w_energy <= 1e-6 {
            0.0
        } else {
            (f64::from(score[0]) - w_sum * t_mean) / (w_energy.sqrt() * t_energy.sqrt())
        };
        score[0] = if zncc.is_finite() { zncc.clamp(-1.0, 1.0) as f32 } else { 0.0 };
    }

    Some(scores)
}

/// Best offset and score in a score map; non-finite scores count as 0.
fn peak(scores: &Image<Luma<f32>>) -> Option<(u32, u32, f64)> {
    let mut best: Option<(u32, u32, f64)> = None;
    for (x, y, score) in scores.enumerate_pixels() {
        let value = if score[0].is_finite() { f64::from(score[0]) } else { 0.0 };
        if best.is_none_or(|(_, _, b)| value > b) {
            best = Some((x, y, value));
        }
    }
    best
}

/// Up to `count` strongest peaks at least `min_dx`/`min_dy` apart.
fn top_peaks(scores: &Image<Luma<f32>>, count: usize, min_dx: u32, min_dy: u32) -> Vec<(u32, u32)> {
    let mut ranked: Vec<(u32, u32, f32)> = scores
        .enumerate_pixels()
        .map(|(x, y, s)| (x, y, if s[0].is_finite() { s[0] } else { 0.0 }))
        .collect();
    ranked.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut picked: Vec<(u32, u32)> = Vec::with_capacity(count);
    for (x, y, _) in ranked {
        let far_enough = picked
            .iter()
            .all(|&(px, py)| x.abs_diff(px) >= min_dx || y.abs_diff(py) >= min_dy);
        if far_enough {
            picked.push((x, y));
            if picked.len() == count {
                break;
            }
        }
    }
    picked
}

fn pyramid_factor(template: &GrayImage) -> u32 {
    let shortest = template.width().min(template.height());
    (shortest / MIN_COARSE_SIDE).clamp(1, MAX_PYRAMID_FACTOR)
}

/// Best match of `template` anywhere in `area`, as (x, y, score).
fn locate_in(area: &GrayImage, template: &GrayImage) -> Option<(u32, u32, f64)> {
    let factor = pyramid_factor(template);
    let (aw, ah) = area.dimensions();
    let (tw, th) = template.dimensions();

    if factor <= 1 || aw / factor < tw / factor || ah / factor < th / factor {
        return zncc_map(area, template).as_ref().and_then(peak);
    }

    let coarse_area = imageops::resize(area, aw / factor, ah / factor, FilterType::Triangle);
    let coarse_template = imageops::resize(template, tw / factor, th / factor, FilterType::Triangle);
    let Some(coarse) = zncc_map(&coarse_area, &coarse_template) else {
        return zncc_map(area, template).as_ref().and_then(peak);
    };

    let margin = factor * 2;
    let mut best: Option<(u32, u32, f64)> = None;
    for (cx, cy) in top_peaks(&coarse, COARSE_CANDIDATES, coarse_template.width(), coarse_template.height()) {
        let x0 = (cx * factor).saturating_sub(margin);
        let y0 = (cy * factor).saturating_sub(margin);
        let x1 = (cx * factor + tw + margin).min(aw);
        let y1 = (cy * factor + th + margin).min(ah);

        let window = imageops::crop_imm(area, x0, y0, x1 - x0, y1 - y0).to_image();
        if let Some((x, y, score)) = zncc_map(&window, template).as_ref().and_then(peak) {
            if best.is_none_or(|(_, _, b)| score > b) {
                best = Some((x0 + x, y0 + y, score));
            }
        }
    }
    best
}

fn scaled_template(template: &GrayImage, scale: f64) -> Option<Cow<'_, GrayImage>> {
    if (scale - 1.0).abs() < 1e-9 {
        return Some(Cow::Borrowed(template));
    }
    let width = (f64::from(template.width()) * scale).round() as u32;
    let height = (f64::from(template.height()) * scale).round() as u32;
    if width < 2 || height < 2 {
        return None;
    }
    Some(Cow::Owned(imageops::resize(template, width, height, FilterType::Triangle)))
}

/// Search `screen` (optionally restricted to `region`) for `template` resized
/// by `scale`.
pub fn match_template_at_scale(
    screen: &GrayImage,
    template: &GrayImage,
    region: Option<ScreenRegion>,
    scale: f64,
    threshold: f64,
) -> TemplateMatchResult {
    let (sw, sh) = screen.dimensions();
    if sw == 0 || sh == 0 {
        return TemplateMatchResult::not_found(threshold);
    }

    let (area, offset) = match region {
        Some(region) => match region.clamp_to(sw, sh) {
            Some(r) => (
                Cow::Owned(imageops::crop_imm(screen, r.x, r.y, r.width, r.height).to_image()),
                (r.x, r.y),
            ),
            None => return TemplateMatchResult::not_found(threshold),
        },
        None => (Cow::Borrowed(screen), (0, 0)),
    };

    let Some(template) = scaled_template(template, scale) else {
        return TemplateMatchResult::not_found(threshold);
    };

    match locate_in(&area, &template) {
        Some((x, y, score)) => TemplateMatchResult::evaluate(
            ((x + offset.0) as i32, (y + offset.1) as i32),
            score.max(0.0),
            threshold,
            template.dimensions(),
            scale,
        ),
        None => TemplateMatchResult::not_found(threshold),
    }
}

/// Scales swept by a multi-scale search. 1.0 is always included, so a
/// multi-scale search never scores below the single-scale one. Sweeps finer
/// than [`MAX_SCALE_STEPS`] are spread evenly over the same range instead.
pub fn scale_steps(range: &ScaleRange) -> Vec<f64> {
    if range.step <= 0.0 || range.min > range.max {
        return vec![1.0];
    }
    let count = range.step_count().min(MAX_SCALE_STEPS);
    let step = if count == range.step_count() {
        range.step
    } else {
        (range.max - range.min) / (count - 1) as f64
    };
    let mut scales: Vec<f64> = (0..count)
        .map(|i| range.min + i as f64 * step)
        .collect();
    if !scales.iter().any(|s| (s - 1.0).abs() < 1e-9) {
        scales.push(1.0);
    }
    scales
}

/// Run [`match_template_at_scale`] for every scale and keep the best score.
pub fn match_template_multi_scale(
    screen: &GrayImage,
    template: &GrayImage,
    region: Option<ScreenRegion>,
    base_scale: f64,
    range: &ScaleRange,
    threshold: f64,
) -> TemplateMatchResult {
    let mut best = TemplateMatchResult::not_found(threshold);
    for scale in scale_steps(range) {
        let result = match_template_at_scale(screen, template, region, base_scale * scale, threshold);
        if result.confidence > best.confidence {
            best = result;
        }
    }
    best
}

/// Finds the accept button on captured frames.
pub struct VisualDetector {
    capture: Arc<dyn ScreenCapture>,
    template: GrayImage,
    threshold: f64,
    ui_scale_factor: f64,
    multi_scale: Option<ScaleRange>,
    search_region: Option<ScreenRegion>,
    metrics: Arc<PerformanceMetrics>,
    attempts: u64,
    detections: u64,
    last_detection_time: Duration,
}

impl VisualDetector {
    /// Detector using the built-in template and default threshold.
    pub fn new(capture: Arc<dyn ScreenCapture>, metrics: Arc<PerformanceMetrics>) -> Self {
        Self {
            capture,
            template: synthetic_accept_template(),
            threshold: DEFAULT_THRESHOLD,
            ui_scale_factor: 1.0,
            multi_scale: None,
            search_region: None,
            metrics,
            attempts: 0,
            detections: 0,
            last_detection_time: Duration::ZERO,
        }
    }

    pub fn set_template(&mut self, template: GrayImage) -> Result<(), VisionError> {
        let (width, height) = template.dimensions();
        if width <= MIN_TEMPLATE_SIDE || height <= MIN_TEMPLATE_SIDE {
            return Err(VisionError::TemplateTooSmall { width, height });
        }
        self.template = template;
        Ok(())
    }

    /// Load a template image from disk (any format `image` decodes).
    pub fn load_template(&mut self, path: &Utf8Path) -> Result<(), VisionError> {
        let template = image::open(path)
            .map_err(|e| VisionError::TemplateLoad {
                path: path.to_string(),
                message: e.to_string(),
            })?
            .into_luma8();
        self.set_template(template)?;
        tracing::info!(
            "Loaded accept-button template {} ({}x{})",
            path,
            self.template.width(),
            self.template.height()
        );
        Ok(())
    }

    pub fn template(&self) -> &GrayImage {
        &self.template
    }

    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), VisionError> {
        if !MATCH_THRESHOLD_RANGE.contains(&threshold) {
            return Err(VisionError::InvalidThreshold(threshold));
        }
        self.threshold = threshold;
        Ok(())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_ui_scale_factor(&mut self, scale: f64) -> Result<(), VisionError> {
        if !UI_SCALE_RANGE.contains(&scale) {
            return Err(VisionError::InvalidScale(scale));
        }
        self.ui_scale_factor = scale;
        Ok(())
    }

    pub fn set_multi_scale(&mut self, range: Option<ScaleRange>) {
        self.multi_scale = range;
    }

    pub fn set_search_region(&mut self, region: Option<ScreenRegion>) {
        self.search_region = region;
    }

    /// Physical-to-logical ratio of the captured display.
    pub fn capture_scale_factor(&self) -> f64 {
        self.capture.scale_factor()
    }

    /// Grab a frame; failures and empty frames yield `None`.
    pub fn capture(&self) -> Option<GrayImage> {
        match self.capture.capture_screen() {
            Ok(frame) if frame.width() > 0 && frame.height() > 0 => Some(frame),
            Ok(_) => {
                tracing::debug!("Screen capture returned an empty frame");
                None
            }
            Err(e) => {
                tracing::debug!("Screen capture failed: {}", e);
                None
            }
        }
    }

    /// Search a frame with the current settings. Pure; no metrics.
    pub fn locate(&self, screen: &GrayImage) -> TemplateMatchResult {
        match &self.multi_scale {
            Some(range) => match_template_multi_scale(
                screen,
                &self.template,
                self.search_region,
                self.ui_scale_factor,
                range,
                self.threshold,
            ),
            None => match_template_at_scale(
                screen,
                &self.template,
                self.search_region,
                self.ui_scale_factor,
                self.threshold,
            ),
        }
    }

    /// Capture a frame and search it, recording latency and accuracy.
    pub fn find_accept_button(&mut self) -> TemplateMatchResult {
        let started = Instant::now();
        let result = match self.capture() {
            Some(screen) => self.locate(&screen),
            None => TemplateMatchResult::not_found(self.threshold),
        };
        let elapsed = started.elapsed();

        self.attempts += 1;
        if result.found {
            self.detections += 1;
        }
        self.last_detection_time = elapsed;
        self.metrics.record_detection_latency(elapsed);

        tracing::debug!(
            "Accept button search: found={} confidence={:.3} threshold={:.2} in {:?}",
            result.found,
            result.confidence,
            result.threshold,
            elapsed
        );

        result.with_detection_time(elapsed)
    }

    /// Share of searches that found the button.
    pub fn detection_accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.detections as f64 / self.attempts as f64
        }
    }

    pub fn last_detection_time(&self) -> Duration {
        self.last_detection_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CaptureError, MockScreenCapture};
    use proptest::prelude::*;

    /// Deterministic textured background.
    fn noisy_screen(width: u32, height: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(73) ^ y.wrapping_mul(151) ^ seed).wrapping_mul(2_654_435_761) >> 24;
            Luma([(v % 120) as u8])
        })
    }

    fn embed(screen: &mut GrayImage, template: &GrayImage, x: u32, y: u32) {
        imageops::replace(screen, template, i64::from(x), i64::from(y));
    }

    fn detector_with(frame: Result<GrayImage, ()>) -> VisualDetector {
        let mut capture = MockScreenCapture::new();
        capture
            .expect_capture_screen()
            .returning(move || frame.clone().map_err(|_| CaptureError::NoMonitor));
        capture.expect_scale_factor().return_const(1.0);
        VisualDetector::new(Arc::new(capture), Arc::new(PerformanceMetrics::new()))
    }

    #[test]
    fn test_exact_embedding_found() {
        let template = synthetic_accept_template();
        let mut screen = noisy_screen(400, 300, 7);
        embed(&mut screen, &template, 150, 200);

        let result = match_template_at_scale(&screen, &template, None, 1.0, 0.8);
        assert!(result.found);
        assert!(result.confidence > 0.99, "confidence {}", result.confidence);
        assert_eq!(result.location, (150, 200));
        assert_eq!(result.center(), (210, 220));
    }

    #[test]
    fn test_black_screen_not_found() {
        let screen = GrayImage::new(400, 300);
        let result = match_template_at_scale(&screen, &synthetic_accept_template(), None, 1.0, 0.8);
        assert!(!result.found);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_region_offsets_location() {
        let template = synthetic_accept_template();
        let mut screen = noisy_screen(400, 300, 3);
        embed(&mut screen, &template, 220, 120);

        let region = ScreenRegion::new(200, 100, 180, 100);
        let result = match_template_at_scale(&screen, &template, Some(region), 1.0, 0.8);
        assert!(result.found);
        assert_eq!(result.location, (220, 120));
    }

    #[test]
    fn test_template_larger_than_region() {
        let screen = noisy_screen(400, 300, 1);
        let region = ScreenRegion::new(0, 0, 50, 20);
        let result =
            match_template_at_scale(&screen, &synthetic_accept_template(), Some(region), 1.0, 0.8);
        assert!(!result.found);
    }

    #[test]
    fn test_multi_scale_recovers_scaled_button() {
        let template = synthetic_accept_template();
        let scaled = imageops::resize(&template, 144, 48, FilterType::Triangle);
        let mut screen = noisy_screen(500, 300, 11);
        embed(&mut screen, &scaled, 100, 120);

        let single = match_template_at_scale(&screen, &template, None, 1.0, 0.8);
        let multi =
            match_template_multi_scale(&screen, &template, None, 1.0, &ScaleRange::default(), 0.8);

        assert!(multi.confidence >= single.confidence);
        assert!(multi.found);
        assert!((multi.scale - 1.2).abs() < 1e-6);
        assert_eq!(multi.matched_size, (144, 48));
    }

    #[test]
    fn test_scale_steps_include_unity() {
        let steps = scale_steps(&ScaleRange::default());
        assert_eq!(steps.len(), 5);
        assert!(steps.iter().any(|s| (s - 1.0).abs() < 1e-9));

        let steps = scale_steps(&ScaleRange {
            min: 0.75,
            max: 1.25,
            step: 0.2,
        });
        assert!(steps.iter().any(|s| (s - 1.0).abs() < 1e-9));

        let steps = scale_steps(&ScaleRange {
            min: 1.5,
            max: 2.0,
            step: 0.25,
        });
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().any(|s| (s - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_scale_steps_are_bounded() {
        let steps = scale_steps(&ScaleRange {
            min: 0.5,
            max: 2.0,
            step: 0.0001,
        });
        assert!(steps.len() <= MAX_SCALE_STEPS + 1);
        assert!((steps[0] - 0.5).abs() < 1e-9);
        assert!(steps.iter().all(|s| *s <= 2.0 + 1e-9));
        assert!(steps.iter().any(|s| (s - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_threshold_and_scale_validation() {
        let mut detector = detector_with(Ok(GrayImage::new(10, 10)));
        assert!(detector.set_threshold(0.5).is_err());
        assert!(detector.set_threshold(0.96).is_err());
        assert!(detector.set_threshold(0.85).is_ok());
        assert!(detector.set_ui_scale_factor(0.4).is_err());
        assert!(detector.set_ui_scale_factor(1.5).is_ok());
        assert!(matches!(
            detector.set_template(GrayImage::new(10, 40)),
            Err(VisionError::TemplateTooSmall { .. })
        ));
    }

    #[test]
    fn test_capture_failure_is_soft() {
        let mut detector = detector_with(Err(()));
        let result = detector.find_accept_button();
        assert!(!result.found);
        assert_eq!(detector.detection_accuracy(), 0.0);
    }

    #[test]
    fn test_find_accept_button_tracks_accuracy() {
        let mut screen = noisy_screen(400, 300, 5);
        embed(&mut screen, &synthetic_accept_template(), 40, 60);
        let mut detector = detector_with(Ok(screen));

        assert!(detector.find_accept_button().found);
        assert_eq!(detector.detection_accuracy(), 1.0);
    }

    proptest! {
        #[test]
        fn prop_threshold_monotonic(seed in 0u32..1000, low in 0.6f64..0.95, high in 0.6f64..0.95) {
            let (low, high) = if low <= high { (low, high) } else { (high, low) };
            let screen = noisy_screen(200, 120, seed);
            let template = synthetic_accept_template();

            let at_high = match_template_at_scale(&screen, &template, None, 1.0, high);
            let at_low = match_template_at_scale(&screen, &template, None, 1.0, low);
            prop_assert_eq!(at_high.confidence, at_low.confidence);
            prop_assert!(!at_high.found || at_low.found);
        }
    }
}
