//! Label table lookups for integer-keyed data.

use crate::palette::Rgba;
use crate::scalar::{RgbaComponent, store_rgba};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub key: i32,
    pub name: String,
    pub rgba: Rgba,
}

impl Label {
    pub fn new(key: i32, name: impl Into<String>, rgba: Rgba) -> Self {
        Self {
            key,
            name: name.into(),
            rgba,
        }
    }
}

/// Labels indexed by key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelTable {
    labels: FxHashMap<i32, Label>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a label, returning any label previously stored under its key
    pub fn insert(&mut self, label: Label) -> Option<Label> {
        self.labels.insert(label.key, label)
    }

    pub fn label(&self, key: i32) -> Option<&Label> {
        self.labels.get(&key)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<Label> for LabelTable {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(|label| (label.key, label)).collect(),
        }
    }
}

/// Data that can address a label table
pub trait LabelIndex: Copy {
    fn label_key(self) -> i32;
}

impl LabelIndex for i32 {
    fn label_key(self) -> i32 {
        self
    }
}

impl LabelIndex for f32 {
    /// Truncates toward zero
    fn label_key(self) -> i32 {
        self as i32
    }
}

fn color_labels<I: LabelIndex, T: RgbaComponent>(table: &LabelTable, indices: &[I], rgba: &mut [T]) {
    assert_eq!(
        rgba.len(),
        indices.len() * 4,
        "rgba buffer must hold four components per index"
    );
    for (out, index) in rgba.chunks_mut(4).zip(indices) {
        let color = match table.label(index.label_key()) {
            Some(label) if label.rgba[3] > 0.0 => label.rgba,
            _ => [0.0; 4],
        };
        store_rgba(out, color);
    }
}

/// Color integer label keys; unknown or transparent labels get alpha 0
pub fn color_indices(table: &LabelTable, indices: &[i32], rgba: &mut [f32]) {
    color_labels(table, indices, rgba);
}

/// Color float-encoded label keys
pub fn color_float_indices(table: &LabelTable, indices: &[f32], rgba: &mut [f32]) {
    color_labels(table, indices, rgba);
}

pub fn color_indices_bytes(table: &LabelTable, indices: &[i32], rgba: &mut [u8]) {
    color_labels(table, indices, rgba);
}

pub fn color_float_indices_bytes(table: &LabelTable, indices: &[f32], rgba: &mut [u8]) {
    color_labels(table, indices, rgba);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LabelTable {
        [
            Label::new(1, "cortex", [1.0, 0.0, 0.0, 1.0]),
            Label::new(2, "hidden", [0.0, 1.0, 0.0, 0.0]),
            Label::new(-3, "negative key", [0.0, 0.0, 1.0, 0.5]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_known_unknown_and_transparent() {
        let mut rgba = [9f32; 16];
        color_indices(&table(), &[1, 2, 7, -3], &mut rgba);
        assert_eq!(&rgba[0..4], &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(&rgba[4..8], &[0.0; 4]);
        assert_eq!(&rgba[8..12], &[0.0; 4]);
        assert_eq!(&rgba[12..16], &[0.0, 0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_float_indices_truncate() {
        let mut rgba = [0f32; 8];
        color_float_indices(&table(), &[1.9, -3.7], &mut rgba);
        assert_eq!(rgba[0], 1.0);
        assert_eq!(rgba[6], 1.0);
    }

    #[test]
    fn test_byte_output() {
        let mut rgba = [0u8; 8];
        color_indices_bytes(&table(), &[-3, 5], &mut rgba);
        assert_eq!(&rgba[0..4], &[0, 0, 255, 127]);
        assert_eq!(&rgba[4..8], &[0, 0, 0, 0]);

        color_float_indices_bytes(&table(), &[1.2, 2.0], &mut rgba);
        assert_eq!(&rgba[0..4], &[255, 0, 0, 255]);
        assert_eq!(rgba[7], 0);
    }

    #[test]
    fn test_table_insert_and_serde() {
        let mut table = table();
        assert_eq!(table.len(), 3);
        let replaced = table.insert(Label::new(1, "renamed", [1.0; 4]));
        assert_eq!(replaced.map(|l| l.name), Some("cortex".to_string()));
        assert_eq!(table.label(1).unwrap().name, "renamed");

        let json = serde_json::to_string(&table).unwrap();
        let restored: LabelTable = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, table);
    }
}
