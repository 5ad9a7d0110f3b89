//! Camera intrinsics from lens metadata.

/// Focal length in pixels of a frame `frame_width` pixels wide.
///
/// `zoom` is the effective zoom ratio; digital zoom crops the sensor, so it
/// scales the pixel focal length linearly. Returns `None` when any physical
/// quantity is non-positive or non-finite.
pub fn focal_length_pixels(
    focal_length_mm: f32,
    sensor_width_mm: f32,
    frame_width: u32,
    zoom: f32,
) -> Option<f32> {
    let positive = |v: f32| v.is_finite() && v > 0.0;
    if !positive(focal_length_mm) || !positive(sensor_width_mm) || !positive(zoom) {
        return None;
    }
    if frame_width == 0 {
        return None;
    }
    let pixels_per_mm = frame_width as f32 / sensor_width_mm;
    Some(focal_length_mm * pixels_per_mm * zoom)
}
