//! Confusion-matrix heatmap rendering.

use crate::error::MlError;
use crate::report::font::{draw_text, draw_text_vertical, text_height, text_width};
use crate::training::metrics::ConfusionMatrix;
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

const CELL: u32 = 120;
const MARGIN_LEFT: u32 = 150;
const MARGIN_TOP: u32 = 70;
const MARGIN_BOTTOM: u32 = 100;
const MARGIN_RIGHT: u32 = 30;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([33, 33, 33]);
const GRID: Rgb<u8> = Rgb([255, 255, 255]);
/// Ends of the blue ramp, lightest first.
const BLUE_LOW: [f64; 3] = [247.0, 251.0, 255.0];
const BLUE_HIGH: [f64; 3] = [8.0, 48.0, 107.0];

/// Text shown around the matrix.
#[derive(Debug, Clone)]
pub struct HeatmapLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

impl Default for HeatmapLabels {
    fn default() -> Self {
        Self {
            title: "Confusion Matrix".to_string(),
            x_label: "Predicted".to_string(),
            y_label: "Actual".to_string(),
        }
    }
}

/// Map an intensity in [0, 1] onto the blue ramp.
pub fn blues(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let mut px = [0u8; 3];
    for (i, c) in px.iter_mut().enumerate() {
        *c = (BLUE_LOW[i] + (BLUE_HIGH[i] - BLUE_LOW[i]) * t).round() as u8;
    }
    Rgb(px)
}

/// Draw the annotated heatmap into a new image.
pub fn draw_confusion_matrix(
    cm: &ConfusionMatrix,
    class_names: &[String],
    labels: &HeatmapLabels,
) -> Result<RgbImage, MlError> {
    let k = cm.n_classes() as u32;
    if k == 0 {
        return Err(MlError::render("confusion matrix has no classes"));
    }
    if class_names.len() != cm.n_classes() {
        return Err(MlError::render(format!(
            "{} class names for a {k}x{k} matrix",
            class_names.len()
        )));
    }

    let width = MARGIN_LEFT + k * CELL + MARGIN_RIGHT;
    let height = MARGIN_TOP + k * CELL + MARGIN_BOTTOM;
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let max = cm.max_count().max(1) as f64;

    for actual in 0..k {
        for predicted in 0..k {
            let count = cm.get(actual as usize, predicted as usize);
            let t = count as f64 / max;
            let x0 = MARGIN_LEFT + predicted * CELL;
            let y0 = MARGIN_TOP + actual * CELL;
            fill_rect(&mut img, x0, y0, CELL, CELL, blues(t));

            let text = count.to_string();
            let ink = if t > 0.5 { BACKGROUND } else { INK };
            let scale = 4;
            draw_text(
                &mut img,
                (x0 + CELL.saturating_sub(text_width(&text, scale)) / 2) as i64,
                (y0 + (CELL - text_height(scale)) / 2) as i64,
                &text,
                scale,
                ink,
            );
        }
    }

    for i in 0..=k {
        let offset = i * CELL;
        fill_rect(&mut img, MARGIN_LEFT + offset, MARGIN_TOP, 1, k * CELL, GRID);
        fill_rect(&mut img, MARGIN_LEFT, MARGIN_TOP + offset, k * CELL, 1, GRID);
    }

    let tick_scale = 2;
    for (i, name) in class_names.iter().enumerate() {
        let i = i as u32;
        let name_w = text_width(name, tick_scale) as i64;
        // x ticks under each column
        draw_text(
            &mut img,
            (MARGIN_LEFT + i * CELL + CELL / 2) as i64 - name_w / 2,
            (MARGIN_TOP + k * CELL + 12) as i64,
            name,
            tick_scale,
            INK,
        );
        // y ticks left of each row, rotated like the axis title
        draw_text_vertical(
            &mut img,
            (MARGIN_LEFT - 12 - text_height(tick_scale)) as i64,
            (MARGIN_TOP + i * CELL + CELL / 2) as i64 - name_w / 2,
            name,
            tick_scale,
            INK,
        );
    }

    let axis_scale = 3;
    let grid_center_x = (MARGIN_LEFT + k * CELL / 2) as i64;
    let grid_center_y = (MARGIN_TOP + k * CELL / 2) as i64;
    draw_text(
        &mut img,
        grid_center_x - text_width(&labels.x_label, axis_scale) as i64 / 2,
        (height - MARGIN_BOTTOM / 2) as i64,
        &labels.x_label,
        axis_scale,
        INK,
    );
    draw_text_vertical(
        &mut img,
        24,
        grid_center_y - text_width(&labels.y_label, axis_scale) as i64 / 2,
        &labels.y_label,
        axis_scale,
        INK,
    );
    draw_text(
        &mut img,
        grid_center_x - text_width(&labels.title, axis_scale) as i64 / 2,
        (MARGIN_TOP / 2) as i64 - text_height(axis_scale) as i64 / 2,
        &labels.title,
        axis_scale,
        INK,
    );

    Ok(img)
}

/// Render the heatmap and write it as PNG, replacing any existing file.
pub fn render_confusion_matrix(
    cm: &ConfusionMatrix,
    class_names: &[String],
    path: &Path,
) -> Result<(), MlError> {
    let img = draw_confusion_matrix(cm, class_names, &HeatmapLabels::default())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    img.save_with_format(path, ImageFormat::Png)?;
    tracing::debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "Wrote confusion matrix image"
    );
    Ok(())
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}
