use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Point2;
use std::hint::black_box;
use surface_lock_core::{
    correct_aspect_ratio, estimate_focal_length, solve_affine, solve_constrained_homography,
    solve_homography,
};

const CX: f32 = 640.0;
const CY: f32 = 360.0;

fn a4() -> [Point2<f32>; 4] {
    [
        Point2::new(0.0, 0.0),
        Point2::new(210.0, 0.0),
        Point2::new(210.0, 297.0),
        Point2::new(0.0, 297.0),
    ]
}

const SHEET_OFFSETS: [(f32, f32); 4] = [
    (-200.0, -283.0),
    (200.0, -283.0),
    (200.0, 283.0),
    (-200.0, 283.0),
];

// Centered 400x566 px sheet tilted about the horizontal axis.
fn tilted_sheet(f: f32, tilt_deg: f32) -> [Point2<f32>; 4] {
    let (sin_t, cos_t) = tilt_deg.to_radians().sin_cos();
    SHEET_OFFSETS.map(|(dx, dy)| {
        let depth = f - dy * sin_t;
        Point2::new(CX + dx * f / depth, CY + dy * cos_t * f / depth)
    })
}

fn bench_solvers(c: &mut Criterion) {
    let paper = a4();
    let frame = tilted_sheet(800.0, 20.0);

    c.bench_function("solve_homography_4pt", |b| {
        b.iter(|| solve_homography(black_box(&paper), black_box(&frame)))
    });
    c.bench_function("solve_affine_3pt", |b| {
        b.iter(|| solve_affine(black_box(&paper[..3]), black_box(&frame[..3])))
    });
    c.bench_function("estimate_focal_length", |b| {
        b.iter(|| estimate_focal_length(black_box(&paper), black_box(&frame), CX, CY))
    });
    c.bench_function("correct_aspect_ratio", |b| {
        b.iter(|| correct_aspect_ratio(black_box(&frame), black_box(&frame), 800.0, CX, CY))
    });

    let mut group = c.benchmark_group("constrained_homography");
    for tilt in [0.0_f32, 10.0, 20.0, 30.0] {
        let frame = tilted_sheet(800.0, tilt);
        group.bench_with_input(BenchmarkId::from_parameter(tilt), &frame, |b, frame| {
            b.iter(|| {
                solve_constrained_homography(
                    black_box(&paper[1..]),
                    black_box(&frame[1..]),
                    800.0,
                    CX,
                    CY,
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solvers);
criterion_main!(benches);
