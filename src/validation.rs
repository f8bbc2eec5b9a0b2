//! Frame validation utilities for test pattern verification.
//!
//! This module provides functions to validate that decoded frames contain
//! expected test patterns. Useful for integration testing with virtual cameras.

use crate::traits::RgbFrame;

/// Expected RGB values for SMPTE color bars (8 bars).
///
/// These are the integer BT.601 conversions of the YUV values used by the
/// mock device's color bar pattern, which also match vivid's 100% bars.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (255, 255, 255), // White
    (255, 255, 0),   // Yellow
    (0, 255, 255),   // Cyan
    (0, 255, 1),     // Green
    (255, 0, 254),   // Magenta
    (255, 0, 0),     // Red
    (0, 0, 255),     // Blue
    (0, 0, 0),       // Black
];

/// Tolerance for RGB color matching (accounts for encoder rounding).
const COLOR_TOLERANCE: u8 = 15;

/// Validation failure description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Validates that a frame contains the SMPTE color bar pattern.
///
/// Samples the center of each of the 8 vertical stripes on the middle row.
pub fn validate_color_bars(frame: &RgbFrame) -> Result<()> {
    let bar_width = frame.width / 8;
    let center_y = frame.height / 2;

    for (bar_idx, expected_rgb) in (0u32..).zip(SMPTE_COLOR_BARS.iter()) {
        let sample_x = (bar_idx * bar_width) + (bar_width / 2);

        let actual_rgb = frame.pixel_at(sample_x, center_y).ok_or_else(|| {
            ValidationError(format!("Failed to get pixel at ({sample_x}, {center_y})"))
        })?;

        if !colors_match(actual_rgb, *expected_rgb, COLOR_TOLERANCE) {
            return Err(ValidationError(format!(
                "Color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected_rgb:?}, got RGB{actual_rgb:?}"
            )));
        }
    }

    Ok(())
}

/// Validates that a frame contains a horizontal gradient pattern.
///
/// Luminance along the middle row must not decrease from left to right and
/// must change by at least 50 overall.
pub fn validate_gradient(frame: &RgbFrame) -> Result<()> {
    let center_y = frame.height / 2;

    // Sample every 10 pixels to check for monotonic increase
    let mut first_luminance: Option<f32> = None;
    let mut prev_luminance: Option<f32> = None;

    for x in (0..frame.width).step_by(10) {
        let (r, g, b) = frame.pixel_at(x, center_y).ok_or_else(|| {
            ValidationError(format!("Failed to get pixel at ({x}, {center_y})"))
        })?;

        // Luminance (Y' in Rec. 601)
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        if let Some(prev) = prev_luminance {
            if luminance < prev - 1.0 {
                return Err(ValidationError(format!(
                    "Gradient not monotonically increasing at x={x}: \
                     luminance {luminance} < previous {prev}"
                )));
            }
        }

        first_luminance.get_or_insert(luminance);
        prev_luminance = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first_luminance, prev_luminance) {
        let luminance_change = last - first;
        if luminance_change < 50.0 {
            return Err(ValidationError(format!(
                "Insufficient luminance change for gradient: {luminance_change} \
                 (expected at least 50.0)"
            )));
        }
    }

    Ok(())
}

/// Validates that frame sequence numbers increment by 1 with no gaps.
pub fn validate_frame_sequence(frames: &[RgbFrame]) -> Result<()> {
    if frames.is_empty() {
        return Err(ValidationError(
            "Cannot validate empty frame sequence".to_owned(),
        ));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        if let [prev, curr] = pair {
            let prev_seq = prev.metadata.sequence;
            let curr_seq = curr.metadata.sequence;

            if curr_seq != prev_seq.wrapping_add(1) {
                return Err(ValidationError(format!(
                    "Frame sequence gap at index {}: expected {}, got {curr_seq}",
                    i + 1,
                    prev_seq.wrapping_add(1)
                )));
            }
        }
    }

    Ok(())
}

/// Check whether two RGB colors match within a per-channel tolerance.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u8) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    ar.abs_diff(er) <= tolerance && ag.abs_diff(eg) <= tolerance && ab.abs_diff(eb) <= tolerance
}
