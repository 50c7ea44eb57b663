//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images:
//!
//! 1. [`plan_scale`] turns display constraints into target dimensions.
//! 2. [`quantize`] rounds the target width up to the configured increment so
//!    that many display sizes share one derivative.
//! 3. [`halving_steps`] plans the intermediate sizes of a progressive downscale.

use crate::types::{Dimensions, DisplayConstraints};

/// Compute the display size of an image under `constraints`.
///
/// - No constrained axis (both maxima ≤ 0) → the original, unchanged.
/// - `allow_enlarge == false` and every constrained axis already fits → the
///   original (never upscale).
/// - Otherwise scale uniformly by the smaller factor of the constrained axes,
///   rounding half-up. Each axis is at least one pixel.
///
/// # Examples
/// ```
/// # use wiki_imaging::imaging::plan_scale;
/// # use wiki_imaging::types::{Dimensions, DisplayConstraints};
/// let target = plan_scale(Dimensions::new(800, 400), &DisplayConstraints::new(200, 200));
/// assert_eq!(target, Dimensions::new(200, 100));
/// ```
pub fn plan_scale(original: Dimensions, constraints: &DisplayConstraints) -> Dimensions {
    let max_w = constraints.max_width;
    let max_h = constraints.max_height;
    if (max_w <= 0 && max_h <= 0) || !original.is_known() {
        return original;
    }

    if !constraints.allow_enlarge {
        let width_fits = max_w <= 0 || max_w as u32 >= original.width;
        let height_fits = max_h <= 0 || max_h as u32 >= original.height;
        if width_fits && height_fits {
            return original;
        }
    }

    let width_factor = (max_w > 0).then(|| max_w as f64 / original.width as f64);
    let height_factor = (max_h > 0).then(|| max_h as f64 / original.height as f64);
    let factor = match (width_factor, height_factor) {
        (Some(w), Some(h)) => w.min(h),
        (Some(w), None) => w,
        (None, Some(h)) => h,
        (None, None) => return original,
    };

    Dimensions::new(
        scale_axis(original.width, factor),
        scale_axis(original.height, factor),
    )
}

fn scale_axis(length: u32, factor: f64) -> u32 {
    let scaled = (length as f64 * factor).round();
    (scaled.min(u32::MAX as f64) as u32).max(1)
}

/// Outcome of [`quantize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantized {
    /// Size of the derivative to produce (or of the original).
    pub dimensions: Dimensions,
    /// `false` when the original should be served as-is.
    pub resized: bool,
}

/// Round `target`'s width up to a multiple of `increment`.
///
/// If the rounded width reaches the original width, no derivative is worth
/// producing and the original dimensions are returned with `resized: false`.
/// The quantized height follows the original's aspect ratio, not the
/// (already rounded) target's.
///
/// An `increment` of zero or less disables derivatives altogether: the
/// original is served and the browser scales it to the display size.
pub fn quantize(original: Dimensions, target: Dimensions, increment: i32) -> Quantized {
    let keep_original = Quantized {
        dimensions: original,
        resized: false,
    };
    if !original.is_known() || increment <= 0 {
        return keep_original;
    }

    let increment = increment as u64;
    let quantized_width = (target.width as u64).div_ceil(increment) * increment;
    if quantized_width >= original.width as u64 {
        return keep_original;
    }

    let quantized_height =
        (quantized_width as f64 * original.height as f64 / original.width as f64).round() as u32;
    Quantized {
        dimensions: Dimensions::new(quantized_width as u32, quantized_height.max(1)),
        resized: true,
    }
}

/// Intermediate sizes of a progressive downscale from `source` to `target`.
///
/// Each step halves both axes (rounding up) without undershooting the target
/// on either axis, so no single step shrinks an axis by more than half. An
/// axis that must grow jumps straight to its target. The last element is
/// always `target`; the list is empty when `source == target`.
pub fn halving_steps(source: Dimensions, target: Dimensions) -> Vec<Dimensions> {
    fn next(current: u32, target: u32) -> u32 {
        if current > target {
            current.div_ceil(2).max(target)
        } else {
            target
        }
    }

    let mut steps = Vec::new();
    let mut current = source;
    while current != target {
        current = Dimensions::new(
            next(current.width, target.width),
            next(current.height, target.height),
        );
        steps.push(current);
    }
    steps
}
