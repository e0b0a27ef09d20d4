//! Rendering of evaluation results to image files.

pub mod font;
pub mod heatmap;

pub use heatmap::{HeatmapLabels, draw_confusion_matrix, render_confusion_matrix};
