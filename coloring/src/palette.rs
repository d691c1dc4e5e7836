//! Palettes: ordered color control points over the normalized range [-1, 1].

use crate::error::{ColoringError, Result};
use colorgrad::Gradient;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Red, green, blue, alpha with components in [0, 1]
pub type Rgba = [f32; 4];

/// Fully transparent; alpha 0 marks "no color"
pub const TRANSPARENT: Rgba = [0.0, 0.0, 0.0, 0.0];

/// A palette position and the color applied there
///
/// `color` of `None` is the "none" color: values landing on it are not drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteControlPoint {
    pub position: f32,
    pub color: Option<[f32; 3]>,
}

impl PaletteControlPoint {
    pub const fn new(position: f32, color: [f32; 3]) -> Self {
        Self {
            position,
            color: Some(color),
        }
    }

    pub const fn none(position: f32) -> Self {
        Self {
            position,
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    name: String,
    /// Sorted by descending position
    points: Vec<PaletteControlPoint>,
}

impl Palette {
    /// # Errors
    /// `InvalidPalette` when there are no points or a position is not a
    /// finite value in [-1, 1]
    pub fn new(name: impl Into<String>, mut points: Vec<PaletteControlPoint>) -> Result<Self> {
        let name = name.into();
        if points.is_empty() {
            return Err(ColoringError::invalid_palette(name, "no control points"));
        }
        if let Some(bad) = points
            .iter()
            .find(|p| !p.position.is_finite() || !(-1.0..=1.0).contains(&p.position))
        {
            return Err(ColoringError::invalid_palette(
                name,
                format!("position {} is outside [-1, 1]", bad.position),
            ));
        }
        points.sort_by(|a, b| b.position.total_cmp(&a.position));
        Ok(Self { name, points })
    }

    /// Sample a continuous gradient at `samples` evenly spaced positions
    ///
    /// Gradient domain [0, 1] is stretched over palette positions [-1, 1].
    pub fn from_gradient<G: Gradient>(
        name: impl Into<String>,
        gradient: &G,
        samples: usize,
    ) -> Result<Self> {
        let name = name.into();
        if samples < 2 {
            return Err(ColoringError::invalid_palette(
                name,
                "a gradient needs at least two samples",
            ));
        }
        let points = (0..samples)
            .map(|i| {
                let t = i as f32 / (samples - 1) as f32;
                let color = gradient.at(t);
                PaletteControlPoint::new(t * 2.0 - 1.0, [color.r, color.g, color.b])
            })
            .collect();
        Self::new(name, points)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[PaletteControlPoint] {
        &self.points
    }

    /// Color for a normalized value
    ///
    /// The value is clamped to [-1, 1]. The control point at or above the
    /// value supplies the color; with `interpolate` it is blended linearly
    /// with the next point below. "None" points produce `TRANSPARENT`.
    pub fn color(&self, normalized: f32, interpolate: bool) -> Rgba {
        let value = normalized.clamp(-1.0, 1.0);
        let index = self
            .points
            .iter()
            .skip(1)
            .position(|p| value > p.position)
            .unwrap_or(self.points.len() - 1);

        let above = self.points[index];
        let Some(above_color) = above.color else {
            return TRANSPARENT;
        };
        if interpolate {
            if let Some(below) = self.points.get(index + 1) {
                if let Some(below_color) = below.color {
                    let span = above.position - below.position;
                    if span != 0.0 {
                        let weight = (value - below.position) / span;
                        return [
                            below_color[0] + (above_color[0] - below_color[0]) * weight,
                            below_color[1] + (above_color[1] - below_color[1]) * weight,
                            below_color[2] + (above_color[2] - below_color[2]) * weight,
                            1.0,
                        ];
                    }
                }
            }
        }
        [above_color[0], above_color[1], above_color[2], 1.0]
    }
}

static BUILT_IN_PALETTES: Lazy<Vec<Palette>> = Lazy::new(|| {
    let mut palettes = Vec::new();
    if let Ok(gray) = Palette::new(
        "Gray_Interp",
        vec![
            PaletteControlPoint::new(1.0, [1.0, 1.0, 1.0]),
            PaletteControlPoint::new(-1.0, [0.0, 0.0, 0.0]),
        ],
    ) {
        palettes.push(gray);
    }
    if let Ok(gray_positive) = Palette::new(
        "Gray_Interp_Positive",
        vec![
            PaletteControlPoint::new(1.0, [1.0, 1.0, 1.0]),
            PaletteControlPoint::new(0.0, [0.0, 0.0, 0.0]),
            PaletteControlPoint::none(0.0),
        ],
    ) {
        palettes.push(gray_positive);
    }
    let sampled = [
        Palette::from_gradient("Viridis", &colorgrad::preset::viridis(), 64),
        Palette::from_gradient("Plasma", &colorgrad::preset::plasma(), 64),
        Palette::from_gradient("Inferno", &colorgrad::preset::inferno(), 64),
        Palette::from_gradient("Magma", &colorgrad::preset::magma(), 64),
        Palette::from_gradient("Turbo", &colorgrad::preset::turbo(), 64),
    ];
    palettes.extend(sampled.into_iter().flatten());
    debug!("Loaded {} built-in palettes", palettes.len());
    palettes
});

/// Look up a built-in palette by name
pub fn palette_by_name(name: &str) -> Result<&'static Palette> {
    BUILT_IN_PALETTES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ColoringError::unknown_palette(name))
}

pub fn palette_names() -> impl Iterator<Item = &'static str> {
    BUILT_IN_PALETTES.iter().map(|p| p.name.as_str())
}
