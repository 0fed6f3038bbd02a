// src/image_analysis.rs
//
// Per-frame bubble segmentation: grayscale, fixed-threshold binarization,
// external contours, blob areas. The binarization cut is a constant; it is
// never recomputed per frame.

use crate::calibration;
use crate::types::FrameMeasurement;
use anyhow::Result;
use opencv::{
    core::{self, Mat, Vector},
    imgproc,
    prelude::*,
};

/// Fixed binarization cut. Intensities above this are foreground.
pub const BUBBLE_INTENSITY_THRESHOLD: f64 = 1.0;

/// Convert a BGR frame to a single-channel intensity image.
fn to_grayscale(frame: &Mat) -> Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(gray)
}

/// Binarize a grayscale image at the fixed threshold.
fn binarize(gray: &Mat) -> Result<Mat> {
    let mut binary = Mat::default();
    imgproc::threshold(
        gray,
        &mut binary,
        BUBBLE_INTENSITY_THRESHOLD,
        255.0,
        imgproc::THRESH_BINARY,
    )?;
    Ok(binary)
}

/// Areas of all external contours, in pixel units and detection order.
/// Nested contours are not separate bubbles and are never retrieved.
pub fn extract_contour_areas(binary: &Mat) -> Result<Vec<f64>> {
    let mut contours: Vector<Vector<core::Point>> = Vector::new();
    imgproc::find_contours(
        binary,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        core::Point::new(0, 0),
    )?;

    let mut areas = Vec::with_capacity(contours.len());
    for contour in contours.iter() {
        areas.push(imgproc::contour_area(&contour, false)?);
    }
    Ok(areas)
}

/// The external-contour search returns the whole-frame background/border
/// artifact as its first contour; it is not a bubble. A frame with no
/// contours at all has nothing to drop.
pub fn drop_border_artifact(mut areas: Vec<f64>) -> Vec<f64> {
    if !areas.is_empty() {
        areas.remove(0);
    }
    areas
}

/// Segment one color frame into blob pixel areas. May be empty.
pub fn extract_blob_areas(frame: &Mat) -> Result<Vec<f64>> {
    let gray = to_grayscale(frame)?;
    let binary = binarize(&gray)?;
    let areas = extract_contour_areas(&binary)?;
    Ok(drop_border_artifact(areas))
}

/// Measure one sampled frame. Statistics are computed on the converted areas
/// so rounding behavior matches direct computation in physical units.
pub fn measure_frame(frame_index: u64, frame: &Mat, scale: f64) -> Result<FrameMeasurement> {
    let areas_px = extract_blob_areas(frame)?;
    let areas = calibration::to_physical(&areas_px, scale);

    Ok(FrameMeasurement {
        frame_index,
        bubble_count: areas.len(),
        mean_area: calibration::mean(&areas),
        area_std_dev: calibration::population_std_dev(&areas),
    })
}
