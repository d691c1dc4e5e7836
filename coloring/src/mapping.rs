use crate::error::{ColoringError, Result};
use crate::statistics::ScalarStatistics;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Normalized value for data between zero and the least positive bound
const NEAR_ZERO_POSITIVE: f32 = 0.00001;
const NEAR_ZERO_NEGATIVE: f32 = -0.00001;

/// How the four scale bounds are chosen
#[derive(
    Display, EnumString, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default,
)]
pub enum PaletteScaleMode {
    /// Raw extremes of the data
    AutoScale,
    /// Percentiles of the data
    #[default]
    AutoScalePercentage,
    /// Fixed user values
    User,
}

#[derive(
    Display, EnumString, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default,
)]
pub enum PaletteThresholdType {
    #[default]
    Off,
    Normal,
    Mapped,
    MappedAverageArea,
}

/// Which side of the threshold bounds is shown
#[derive(
    Display, EnumString, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default,
)]
pub enum PaletteThresholdTest {
    /// Pass when the threshold value is outside [min, max]
    #[default]
    ShowOutside,
    /// Pass when the threshold value is inside [min, max]
    ShowInside,
}

/// Data values mapped to palette positions -1, -0, +0, +1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleBounds {
    pub most_negative: f32,
    pub least_negative: f32,
    pub least_positive: f32,
    pub most_positive: f32,
}

/// Configuration for coloring scalar data with a palette
///
/// # Example
///
/// ```rust
/// use neuro_coloring::{PaletteColorMapping, PaletteScaleMode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mapping = PaletteColorMapping::builder()
///     .scale_mode(PaletteScaleMode::User)
///     .user_scale_negative_maximum(-1.0)
///     .user_scale_positive_maximum(1.0)
///     .display_zero_data(true)
///     .build()?;
/// assert!(mapping.interpolate_palette);
/// # Ok(())
/// # }
/// ```
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(default)]
#[serde(default)]
pub struct PaletteColorMapping {
    pub scale_mode: PaletteScaleMode,

    pub auto_scale_percentage_negative_maximum: f32,
    pub auto_scale_percentage_negative_minimum: f32,
    pub auto_scale_percentage_positive_minimum: f32,
    pub auto_scale_percentage_positive_maximum: f32,

    pub user_scale_negative_maximum: f32,
    pub user_scale_negative_minimum: f32,
    pub user_scale_positive_minimum: f32,
    pub user_scale_positive_maximum: f32,

    pub interpolate_palette: bool,
    pub display_positive_data: bool,
    pub display_negative_data: bool,
    pub display_zero_data: bool,

    pub threshold_type: PaletteThresholdType,
    pub threshold_test: PaletteThresholdTest,
    pub threshold_normal_minimum: f32,
    pub threshold_normal_maximum: f32,
    pub threshold_mapped_minimum: f32,
    pub threshold_mapped_maximum: f32,
    pub threshold_mapped_average_area_minimum: f32,
    pub threshold_mapped_average_area_maximum: f32,
    /// Recolor MAPPED threshold failures in the narrow band between the
    /// mapped and average-area bounds
    pub show_threshold_failure_in_green: bool,

    #[builder(setter(into))]
    pub selected_palette_name: String,
}

impl Default for PaletteColorMapping {
    fn default() -> Self {
        Self {
            scale_mode: PaletteScaleMode::AutoScalePercentage,
            auto_scale_percentage_negative_maximum: 98.0,
            auto_scale_percentage_negative_minimum: 2.0,
            auto_scale_percentage_positive_minimum: 2.0,
            auto_scale_percentage_positive_maximum: 98.0,
            user_scale_negative_maximum: -100.0,
            user_scale_negative_minimum: 0.0,
            user_scale_positive_minimum: 0.0,
            user_scale_positive_maximum: 100.0,
            interpolate_palette: true,
            display_positive_data: true,
            display_negative_data: true,
            display_zero_data: false,
            threshold_type: PaletteThresholdType::Off,
            threshold_test: PaletteThresholdTest::ShowOutside,
            threshold_normal_minimum: -1.0,
            threshold_normal_maximum: 1.0,
            threshold_mapped_minimum: -1.0,
            threshold_mapped_maximum: 1.0,
            threshold_mapped_average_area_minimum: -1.0,
            threshold_mapped_average_area_maximum: 1.0,
            show_threshold_failure_in_green: false,
            selected_palette_name: "Gray_Interp".to_string(),
        }
    }
}

impl PaletteColorMapping {
    pub fn builder() -> PaletteColorMappingBuilder {
        PaletteColorMappingBuilder::default()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mapping: Self = serde_json::from_str(json)?;
        mapping.validate()?;
        Ok(mapping)
    }

    /// Check that every bound pair is finite and ordered
    pub fn validate(&self) -> Result<()> {
        let pairs = [
            (
                "threshold normal",
                self.threshold_normal_minimum,
                self.threshold_normal_maximum,
            ),
            (
                "threshold mapped",
                self.threshold_mapped_minimum,
                self.threshold_mapped_maximum,
            ),
            (
                "threshold mapped average area",
                self.threshold_mapped_average_area_minimum,
                self.threshold_mapped_average_area_maximum,
            ),
            (
                "user scale",
                self.user_scale_negative_maximum,
                self.user_scale_positive_maximum,
            ),
        ];
        for (label, min, max) in pairs {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(ColoringError::invalid_configuration(format!(
                    "{label} bounds [{min}, {max}] are not an ordered finite range"
                )));
            }
        }
        let percentages = [
            self.auto_scale_percentage_negative_maximum,
            self.auto_scale_percentage_negative_minimum,
            self.auto_scale_percentage_positive_minimum,
            self.auto_scale_percentage_positive_maximum,
        ];
        if let Some(bad) = percentages.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(ColoringError::invalid_configuration(format!(
                "auto scale percentage {bad} is outside [0, 100]"
            )));
        }
        Ok(())
    }

    /// Resolve the four scale bounds for the active scale mode
    pub fn scale_bounds<S: ScalarStatistics + ?Sized>(&self, statistics: &S) -> ScaleBounds {
        match self.scale_mode {
            PaletteScaleMode::AutoScale => ScaleBounds {
                most_negative: statistics.most_negative_value(),
                least_negative: statistics.least_negative_value(),
                least_positive: statistics.least_positive_value(),
                most_positive: statistics.most_positive_value(),
            },
            PaletteScaleMode::AutoScalePercentage => ScaleBounds {
                most_negative: statistics
                    .negative_percentile(self.auto_scale_percentage_negative_maximum),
                least_negative: statistics
                    .negative_percentile(self.auto_scale_percentage_negative_minimum),
                least_positive: statistics
                    .positive_percentile(self.auto_scale_percentage_positive_minimum),
                most_positive: statistics
                    .positive_percentile(self.auto_scale_percentage_positive_maximum),
            },
            PaletteScaleMode::User => ScaleBounds {
                most_negative: self.user_scale_negative_maximum,
                least_negative: self.user_scale_negative_minimum,
                least_positive: self.user_scale_positive_minimum,
                most_positive: self.user_scale_positive_maximum,
            },
        }
    }

    /// Map data values into palette space [-1, 1]
    ///
    /// Positive data between zero and the least positive bound maps just above
    /// zero; negative data mirrors this. Exact zero maps to zero.
    ///
    /// # Panics
    /// When `scalars` and `normalized` differ in length
    pub fn map_data_to_palette_normalized<S: ScalarStatistics + ?Sized>(
        &self,
        statistics: &S,
        scalars: &[f32],
        normalized: &mut [f32],
    ) {
        assert_eq!(
            scalars.len(),
            normalized.len(),
            "scalar and normalized buffers must have equal length"
        );
        let bounds = self.scale_bounds(statistics);
        let positive_span = nonzero((bounds.most_positive - bounds.least_positive).abs());
        let negative_span = nonzero((bounds.most_negative - bounds.least_negative).abs());

        for (out, &scalar) in normalized.iter_mut().zip(scalars) {
            let value = if scalar > 0.0 {
                if scalar >= bounds.least_positive {
                    (scalar - bounds.least_positive) / positive_span
                } else {
                    NEAR_ZERO_POSITIVE
                }
            } else if scalar < 0.0 {
                if scalar <= bounds.least_negative {
                    (scalar - bounds.least_negative) / negative_span
                } else {
                    NEAR_ZERO_NEGATIVE
                }
            } else {
                0.0
            };
            *out = value.clamp(-1.0, 1.0);
        }
    }

    /// Lower threshold bound for `threshold_type`
    pub fn threshold_minimum(&self, threshold_type: PaletteThresholdType) -> f32 {
        match threshold_type {
            PaletteThresholdType::Off | PaletteThresholdType::Normal => {
                self.threshold_normal_minimum
            }
            PaletteThresholdType::Mapped => self.threshold_mapped_minimum,
            PaletteThresholdType::MappedAverageArea => self.threshold_mapped_average_area_minimum,
        }
    }

    pub fn threshold_maximum(&self, threshold_type: PaletteThresholdType) -> f32 {
        match threshold_type {
            PaletteThresholdType::Off | PaletteThresholdType::Normal => {
                self.threshold_normal_maximum
            }
            PaletteThresholdType::Mapped => self.threshold_mapped_maximum,
            PaletteThresholdType::MappedAverageArea => self.threshold_mapped_average_area_maximum,
        }
    }
}

fn nonzero(span: f32) -> f32 {
    if span == 0.0 { 1.0 } else { span }
}
