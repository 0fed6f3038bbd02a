// src/calibration.rs
//
// Pixel areas scale with the square of the linear calibration factor, so the
// conversion to physical units is 1/scale². A scale that was never set
// (<= 0) converts with factor 1 instead of failing.

/// Conversion factor applied to pixel areas.
pub fn scale_factor(scale: f64) -> f64 {
    if scale > 0.0 {
        1.0 / (scale * scale)
    } else {
        1.0
    }
}

/// Convert pixel areas to physical-unit areas.
pub fn to_physical(areas_px: &[f64], scale: f64) -> Vec<f64> {
    let factor = scale_factor(scale);
    areas_px.iter().map(|a| a * factor).collect()
}

/// Inverse transform: physical-unit areas back to pixel areas.
pub fn to_pixels(areas_phys: &[f64], scale: f64) -> Vec<f64> {
    let factor = scale_factor(scale);
    areas_phys.iter().map(|a| a / factor).collect()
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for an empty slice.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
