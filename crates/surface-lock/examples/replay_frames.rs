//! Replay recorded marker detections through an [`OverlaySession`].
//!
//! ```text
//! cargo run -p surface-lock --example replay_frames -- frames.json [session.json]
//! ```
//!
//! `frames.json` is a JSON array of `MarkerResult`s. Without arguments a short
//! synthetic sequence (sheet seen head-on, then tilted and partly covered) is
//! replayed instead. One JSON report line is printed per frame.

use std::{env, fs, path::Path};

use nalgebra::Point2;
use serde::Serialize;
use surface_lock::render::{render_matrix, ManualAdjustment, Viewport};
use surface_lock::{DetectedMarker, FrameOutput, MarkerResult, OverlaySession, SessionParams};

#[cfg(not(feature = "tracing"))]
use log::{info, LevelFilter};
#[cfg(feature = "tracing")]
use tracing::info;

const SHEET_OFFSETS: [(f32, f32); 4] = [
    (-200.0, -283.0),
    (200.0, -283.0),
    (200.0, 283.0),
    (-200.0, 283.0),
];

#[derive(Debug, Serialize)]
struct FrameReport {
    index: usize,
    markers: usize,
    #[serde(flatten)]
    output: FrameOutput,
    render_matrix: [f32; 9],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(not(feature = "tracing"))]
    surface_lock::core::init_from_env(LevelFilter::Info)?;

    #[cfg(feature = "tracing")]
    surface_lock::init_tracing(false);

    run()
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info"))]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let frames = match args.next() {
        Some(path) => load_frames(Path::new(&path))?,
        None => synthetic_frames(),
    };
    let params = match args.next() {
        Some(path) => SessionParams::from_json_file(path)?,
        None => SessionParams::default(),
    };
    info!("replaying {} frames", frames.len());

    let mut session = OverlaySession::new(params)?;
    let view = Viewport::new(1080.0, 1920.0);
    let adjust = ManualAdjustment::default();

    for (index, frame) in frames.iter().enumerate() {
        let output = session.process(frame);
        let matrix = render_matrix(&output, &adjust, &view, true);
        let report = FrameReport {
            index,
            markers: frame.marker_count(),
            output,
            render_matrix: matrix.values(),
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    if let Some(f) = session.focal_length() {
        info!("focal length at end of replay: {f:.1}px");
    }
    Ok(())
}

fn load_frames(path: &Path) -> Result<Vec<MarkerResult>, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn synthetic_frames() -> Vec<MarkerResult> {
    let (cx, cy, f) = (640.0_f32, 360.0_f32, 900.0_f32);
    let sheet = |tilt_deg: f32| -> [Point2<f32>; 4] {
        let (sin_t, cos_t) = tilt_deg.to_radians().sin_cos();
        SHEET_OFFSETS.map(|(dx, dy)| {
            let depth = f - dy * sin_t;
            Point2::new(cx + dx * f / depth, cy + dy * cos_t * f / depth)
        })
    };
    let frame = |corners: [Point2<f32>; 4], visible: &[usize], t_ms: i64| {
        let markers = visible
            .iter()
            .map(|&i| {
                let mut quad = [corners[i]; 4];
                for (k, q) in quad.iter_mut().enumerate() {
                    if k != i {
                        *q += (corners[k] - corners[i]).normalize() * 20.0;
                    }
                }
                DetectedMarker::new(i as i32, corners[i]).with_corners(quad)
            })
            .collect();
        MarkerResult {
            detection_time_ms: t_ms,
            ..MarkerResult::new(markers).with_frame_size(1280, 720)
        }
    };

    let mut frames = Vec::new();
    for k in 0..5 {
        frames.push(frame(sheet(0.0), &[0, 1, 2, 3], 8 + k));
    }
    for k in 0..10 {
        frames.push(frame(sheet(2.0 * k as f32), &[0, 1, 2, 3], 8));
    }
    for visible in [&[0, 1, 2][..], &[0, 1], &[1], &[]] {
        for _ in 0..3 {
            frames.push(frame(sheet(18.0), visible, 6));
        }
    }
    frames
}
