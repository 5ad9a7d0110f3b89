//! Planar geometry for anchoring an overlay to a sheet of paper seen by a camera.
//!
//! This crate is purely numeric: it knows nothing about markers, frames or
//! tracking state. It provides
//!
//! - a small Gauss–Jordan solver ([`solve_linear_system`]),
//! - row-major 3×3 transforms ([`Homography`], [`transform`]),
//! - 4-point homography and 3-point affine estimation,
//! - focal-length self-calibration, focal-constrained 3-point homographies
//!   and aspect-ratio correction ([`calibration`]),
//! - a bounded 2-D Newton solver ([`newton`]).
//!
//! Inputs and outputs are `f32` pixel/paper coordinates; all estimation runs in `f64`.

pub mod calibration;
mod homography;
mod intrinsics;
mod linalg;
mod logger;
pub mod newton;
pub mod transform;

pub use calibration::{correct_aspect_ratio, estimate_focal_length, solve_constrained_homography};
pub use homography::{solve_affine, solve_homography, Homography, DETERMINANT_BAND};
pub use intrinsics::focal_length_pixels;
pub use linalg::{solve_fixed, solve_linear_system, SINGULAR_PIVOT_EPS};
pub use newton::{NewtonError, NewtonParams, NewtonSolution};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV_VAR};
