//! Row-major 3×3 planar transform construction and composition.
//!
//! All matrices act on column vectors, so `compose(&[t, s])` applies `s` first
//! and `t` second, matching the mathematical product `t · s`.

use crate::Homography;

pub fn identity() -> Homography {
    Homography::IDENTITY
}

pub fn translate(tx: f32, ty: f32) -> Homography {
    Homography::new([
        1.0, 0.0, tx, //
        0.0, 1.0, ty, //
        0.0, 0.0, 1.0,
    ])
}

/// Uniform scale about the origin.
pub fn scale(s: f32) -> Homography {
    scale_xy(s, s)
}

pub fn scale_xy(sx: f32, sy: f32) -> Homography {
    Homography::new([
        sx, 0.0, 0.0, //
        0.0, sy, 0.0, //
        0.0, 0.0, 1.0,
    ])
}

/// Counter-clockwise rotation by `degrees` about the origin.
pub fn rotate(degrees: f32) -> Homography {
    let rad = (degrees as f64).to_radians();
    let c = rad.cos() as f32;
    let s = rad.sin() as f32;
    Homography::new([
        c, -s, 0.0, //
        s, c, 0.0, //
        0.0, 0.0, 1.0,
    ])
}

/// Standard matrix product `a · b`.
pub fn multiply(a: &Homography, b: &Homography) -> Homography {
    let (a, b) = (&a.m, &b.m);
    let mut r = [0.0_f32; 9];
    for row in 0..3 {
        for col in 0..3 {
            r[row * 3 + col] = a[row * 3] * b[col]
                + a[row * 3 + 1] * b[3 + col]
                + a[row * 3 + 2] * b[6 + col];
        }
    }
    Homography::new(r)
}

/// Left fold `m1 · m2 · … · mk`. An empty list composes to the identity.
pub fn compose(matrices: &[Homography]) -> Homography {
    match matrices.split_first() {
        Some((first, rest)) => rest.iter().fold(*first, |acc, m| multiply(&acc, m)),
        None => identity(),
    }
}
