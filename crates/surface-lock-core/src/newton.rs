//! Bounded Newton–Raphson root finding in two unknowns.
//!
//! The Jacobian is estimated by forward finite differences, so the residual
//! only has to be evaluable, not differentiable in closed form.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Settings for [`solve_2d`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonParams {
    /// Maximum number of Newton steps.
    pub max_iters: usize,
    /// Forward-difference step for the Jacobian estimate.
    pub fd_step: f64,
    /// Stop early once both residual components are below this.
    pub converge_tol: f64,
    /// Final acceptance threshold on both residual components.
    pub accept_tol: f64,
    /// Jacobian determinants below this (in magnitude) abort the solve.
    pub min_jacobian_det: f64,
    /// Abort as soon as either unknown leaves `[-bound, bound]`.
    pub max_abs: Option<f64>,
}

impl Default for NewtonParams {
    fn default() -> Self {
        Self {
            max_iters: 50,
            fd_step: 1e-8,
            converge_tol: 1e-10,
            accept_tol: 1e-4,
            min_jacobian_det: 1e-20,
            max_abs: None,
        }
    }
}

/// Why a Newton solve was abandoned.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NewtonError {
    #[error("jacobian is singular at iteration {iteration} (det={det:.3e})")]
    SingularJacobian { iteration: usize, det: f64 },
    #[error("iterate left the bounded region at iteration {iteration} ({x:.3e}, {y:.3e})")]
    Diverged { iteration: usize, x: f64, y: f64 },
    #[error("residual ({r0:.3e}, {r1:.3e}) above tolerance after {iterations} iterations")]
    NotConverged { iterations: usize, r0: f64, r1: f64 },
}

/// Accepted root.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewtonSolution {
    pub x: Vector2<f64>,
    pub residual: Vector2<f64>,
    pub iterations: usize,
}

/// Find `x` with `f(x) ≈ 0`, starting from `x0`.
pub fn solve_2d<F>(
    f: F,
    x0: Vector2<f64>,
    params: &NewtonParams,
) -> Result<NewtonSolution, NewtonError>
where
    F: Fn(Vector2<f64>) -> Vector2<f64>,
{
    let eps = params.fd_step;
    let mut x = x0;
    let mut iterations = 0;

    for iteration in 0..params.max_iters {
        let r = f(x);
        if r.x.abs() < params.converge_tol && r.y.abs() < params.converge_tol {
            break;
        }

        let r_dx = f(x + Vector2::new(eps, 0.0));
        let r_dy = f(x + Vector2::new(0.0, eps));
        let jac = Matrix2::from_columns(&[(r_dx - r) / eps, (r_dy - r) / eps]);

        let det = jac.determinant();
        if det.is_nan() || det.abs() < params.min_jacobian_det {
            return Err(NewtonError::SingularJacobian { iteration, det });
        }

        // Explicit 2x2 inverse, already guarded by the determinant check above.
        let step = Vector2::new(
            jac[(1, 1)] * r.x - jac[(0, 1)] * r.y,
            -jac[(1, 0)] * r.x + jac[(0, 0)] * r.y,
        ) / det;
        x -= step;
        iterations = iteration + 1;

        if let Some(bound) = params.max_abs {
            if x.x.abs() > bound || x.y.abs() > bound {
                return Err(NewtonError::Diverged {
                    iteration,
                    x: x.x,
                    y: x.y,
                });
            }
        }
    }

    let residual = f(x);
    if residual.x.abs() < params.accept_tol && residual.y.abs() < params.accept_tol {
        Ok(NewtonSolution {
            x,
            residual,
            iterations,
        })
    } else {
        Err(NewtonError::NotConverged {
            iterations,
            r0: residual.x,
            r1: residual.y,
        })
    }
}
