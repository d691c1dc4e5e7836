//! Palette coloring of scalar data.
//!
//! Each element is colored independently: sign filtering, palette lookup on
//! the normalized value, then the threshold test. Large inputs are split
//! across the rayon pool; output is identical to the sequential path.

use crate::mapping::{PaletteColorMapping, PaletteThresholdTest, PaletteThresholdType};
use crate::palette::{Palette, Rgba};
use crate::statistics::ScalarStatistics;
use rayon::prelude::*;
use tracing::trace;

/// Scalars above this value count as positive
pub const SMALL_POSITIVE: f32 = 0.00001;
/// Scalars below this value count as negative
pub const SMALL_NEGATIVE: f32 = -0.00001;

/// Element count above which coloring runs in parallel
pub const PARALLEL_THRESHOLD: usize = 10_000;

/// Threshold failures just inside the positive mapped bound
pub const POSITIVE_THRESHOLD_GREEN: Rgba = [115.0 / 255.0, 1.0, 180.0 / 255.0, 1.0];
/// Threshold failures just inside the negative mapped bound
pub const NEGATIVE_THRESHOLD_GREEN: Rgba = [180.0 / 255.0, 1.0, 115.0 / 255.0, 1.0];

/// Alpha of an element that is not drawn in float output
const INVALID_ALPHA: f32 = -1.0;

/// A single RGBA output channel
///
/// Floats are stored as-is. Bytes are scaled by 255 and truncated, and any
/// alpha that is not positive becomes 0.
pub trait RgbaComponent: Copy + Send + Sync {
    fn from_channel(value: f32) -> Self;
    fn from_alpha(value: f32) -> Self;
}

impl RgbaComponent for f32 {
    #[inline]
    fn from_channel(value: f32) -> Self {
        value
    }

    #[inline]
    fn from_alpha(value: f32) -> Self {
        value
    }
}

impl RgbaComponent for u8 {
    #[inline]
    fn from_channel(value: f32) -> Self {
        (value * 255.0) as u8
    }

    #[inline]
    fn from_alpha(value: f32) -> Self {
        if value > 0.0 { (value * 255.0) as u8 } else { 0 }
    }
}

#[inline]
pub(crate) fn store_rgba<T: RgbaComponent>(out: &mut [T], rgba: Rgba) {
    out[0] = T::from_channel(rgba[0]);
    out[1] = T::from_channel(rgba[1]);
    out[2] = T::from_channel(rgba[2]);
    out[3] = T::from_alpha(rgba[3]);
}

/// Color `scalars` into float RGBA, four values per element
///
/// `thresholds` supplies the per-element value tested against the threshold
/// bounds. Elements that are filtered out or fail the threshold get alpha -1.
///
/// # Panics
/// When `thresholds` is not the length of `scalars` or `rgba` is not four
/// times that length
pub fn color_scalars<S: ScalarStatistics + ?Sized>(
    statistics: &S,
    mapping: &PaletteColorMapping,
    palette: &Palette,
    scalars: &[f32],
    thresholds: &[f32],
    rgba: &mut [f32],
    ignore_thresholding: bool,
) {
    color_scalars_into(
        statistics,
        mapping,
        palette,
        scalars,
        thresholds,
        rgba,
        ignore_thresholding,
    );
}

/// Byte variant of [`color_scalars`]; hidden elements get alpha 0
pub fn color_scalars_bytes<S: ScalarStatistics + ?Sized>(
    statistics: &S,
    mapping: &PaletteColorMapping,
    palette: &Palette,
    scalars: &[f32],
    thresholds: &[f32],
    rgba: &mut [u8],
    ignore_thresholding: bool,
) {
    color_scalars_into(
        statistics,
        mapping,
        palette,
        scalars,
        thresholds,
        rgba,
        ignore_thresholding,
    );
}

/// Inputs shared by every element of one coloring pass
struct ColoringPass<'a> {
    mapping: &'a PaletteColorMapping,
    palette: &'a Palette,
    most_positive_color: Rgba,
    most_negative_color: Rgba,
    check_threshold: bool,
    threshold_minimum: f32,
    threshold_maximum: f32,
    show_green: bool,
}

impl<'a> ColoringPass<'a> {
    fn new(mapping: &'a PaletteColorMapping, palette: &'a Palette, ignore_thresholding: bool) -> Self {
        let threshold_type = mapping.threshold_type;
        Self {
            mapping,
            palette,
            most_positive_color: palette.color(1.0, mapping.interpolate_palette),
            most_negative_color: palette.color(-1.0, mapping.interpolate_palette),
            check_threshold: !ignore_thresholding && threshold_type != PaletteThresholdType::Off,
            threshold_minimum: mapping.threshold_minimum(threshold_type),
            threshold_maximum: mapping.threshold_maximum(threshold_type),
            show_green: mapping.show_threshold_failure_in_green
                && threshold_type == PaletteThresholdType::Mapped,
        }
    }

    fn color(&self, scalar: f32, normalized: f32, threshold: f32) -> Rgba {
        let mut rgba = [0.0, 0.0, 0.0, INVALID_ALPHA];

        let mut normalized = normalized;
        let shown = if scalar > SMALL_POSITIVE {
            self.mapping.display_positive_data
        } else if scalar < SMALL_NEGATIVE {
            self.mapping.display_negative_data
        } else {
            normalized = 0.0;
            self.mapping.display_zero_data
        };
        if !shown {
            return rgba;
        }

        let color = if normalized >= 1.0 {
            self.most_positive_color
        } else if normalized <= -1.0 {
            self.most_negative_color
        } else {
            self.palette.color(normalized, self.mapping.interpolate_palette)
        };
        if color[3] > 0.0 {
            rgba = color;
        }

        if self.check_threshold && !self.passes_threshold(threshold) {
            rgba[3] = INVALID_ALPHA;
            if self.show_green {
                if let Some(green) = self.threshold_failure_green(threshold) {
                    rgba = green;
                }
            }
        }
        rgba
    }

    fn passes_threshold(&self, threshold: f32) -> bool {
        match self.mapping.threshold_test {
            PaletteThresholdTest::ShowOutside => {
                threshold > self.threshold_maximum || threshold < self.threshold_minimum
            }
            PaletteThresholdTest::ShowInside => {
                threshold >= self.threshold_minimum && threshold <= self.threshold_maximum
            }
        }
    }

    fn threshold_failure_green(&self, threshold: f32) -> Option<Rgba> {
        let mapping = self.mapping;
        if threshold > 0.0
            && threshold < mapping.threshold_mapped_maximum
            && threshold > mapping.threshold_mapped_average_area_maximum
        {
            Some(POSITIVE_THRESHOLD_GREEN)
        } else if threshold < 0.0
            && threshold > mapping.threshold_mapped_minimum
            && threshold < mapping.threshold_mapped_average_area_minimum
        {
            Some(NEGATIVE_THRESHOLD_GREEN)
        } else {
            None
        }
    }
}

fn color_scalars_into<S, T>(
    statistics: &S,
    mapping: &PaletteColorMapping,
    palette: &Palette,
    scalars: &[f32],
    thresholds: &[f32],
    rgba: &mut [T],
    ignore_thresholding: bool,
) where
    S: ScalarStatistics + ?Sized,
    T: RgbaComponent,
{
    assert_eq!(
        scalars.len(),
        thresholds.len(),
        "threshold buffer must match scalar count"
    );
    assert_eq!(
        rgba.len(),
        scalars.len() * 4,
        "rgba buffer must hold four components per scalar"
    );
    if scalars.is_empty() {
        return;
    }

    let mut normalized = vec![0f32; scalars.len()];
    mapping.map_data_to_palette_normalized(statistics, scalars, &mut normalized);
    let pass = ColoringPass::new(mapping, palette, ignore_thresholding);

    if scalars.len() > PARALLEL_THRESHOLD {
        trace!(
            "Coloring {} scalars in parallel with palette '{}'",
            scalars.len(),
            palette.name()
        );
        rgba.par_chunks_mut(4)
            .enumerate()
            .for_each(|(i, out)| {
                store_rgba(out, pass.color(scalars[i], normalized[i], thresholds[i]));
            });
    } else {
        for (i, out) in rgba.chunks_mut(4).enumerate() {
            store_rgba(out, pass.color(scalars[i], normalized[i], thresholds[i]));
        }
    }
}
