//! # neuro-coloring
//!
//! Converts per-vertex or per-voxel data into RGBA colors.
//!
//! - **Palettes**: control points over the normalized range [-1, 1], with
//!   stepped or interpolated lookup and a registry of built-in palettes
//! - **Mapping**: [`PaletteColorMapping`] selects how data is scaled into
//!   palette space, which signs are drawn, and how thresholding works
//! - **Scalar coloring**: [`color_scalars`] and [`color_scalars_bytes`] color
//!   a whole data array, in parallel for large inputs
//! - **Label coloring**: integer keys looked up in a [`LabelTable`]
//! - **Outlines**: reduce colored slices to region boundaries
//!
//! ## Quick Start
//!
//! ```rust
//! use neuro_coloring::{
//!     DescriptiveStatistics, PaletteColorMapping, PaletteScaleMode, color_scalars,
//!     palette_by_name,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = [-2.0, 0.5, 4.0];
//! let statistics = DescriptiveStatistics::from_values(&data);
//! let mapping = PaletteColorMapping::builder()
//!     .scale_mode(PaletteScaleMode::AutoScale)
//!     .build()?;
//! let palette = palette_by_name(&mapping.selected_palette_name)?;
//!
//! let mut rgba = vec![0f32; data.len() * 4];
//! color_scalars(&statistics, &mapping, palette, &data, &data, &mut rgba, false);
//! assert_eq!(&rgba[8..12], &[1.0, 1.0, 1.0, 1.0]);
//! # Ok(())
//! # }
//! ```
//!
//! Hidden elements are marked by alpha: -1 in float output, 0 in byte output.

pub mod error;
pub mod label;
pub mod mapping;
pub mod outline;
pub mod palette;
pub mod scalar;
pub mod statistics;


pub use error::{ColoringError, Result};
pub use label::{
    Label, LabelIndex, LabelTable, color_float_indices, color_float_indices_bytes,
    color_indices, color_indices_bytes,
};
pub use mapping::{
    PaletteColorMapping, PaletteColorMappingBuilder, PaletteScaleMode, PaletteThresholdTest,
    PaletteThresholdType, ScaleBounds,
};
pub use outline::{convert_image_to_outline, convert_to_outline};
pub use palette::{
    Palette, PaletteControlPoint, Rgba, TRANSPARENT, palette_by_name, palette_names,
};
pub use scalar::{
    NEGATIVE_THRESHOLD_GREEN, PARALLEL_THRESHOLD, POSITIVE_THRESHOLD_GREEN, RgbaComponent,
    SMALL_NEGATIVE, SMALL_POSITIVE, color_scalars, color_scalars_bytes,
};
pub use statistics::{DescriptiveStatistics, ScalarStatistics};
