//! Four-corner multilateration inside a square block
//!
//! Corners sit at A = (0, L), B = (L, L), C = (0, 0), D = (L, 0). The solver
//! minimises the sum of squared circle-equation residuals
//!
//! `f(x, y) = sum_i [ (x - cx_i)^2 + (y - cy_i)^2 - d_i^2 ]^2`
//!
//! with BFGS and an Armijo backtracking line search, starting from the block
//! centre. Iterations run in coordinates divided by `L` so the tolerances do
//! not depend on the block size; the reported residual is in meters^4.

use crate::core::{Corner, CORNERS_PER_BLOCK};
use crate::validation::error::{DivergenceCause, PositioningError, Result};
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// BFGS minimiser for the four-corner objective
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSolver {
    /// Hard cap on BFGS iterations
    pub max_iterations: usize,
    /// Convergence threshold on the normalised gradient norm
    pub gradient_tolerance: f64,
    /// Normalised objective below which the fit is exact
    pub objective_tolerance: f64,
    /// Sufficient-decrease constant for the line search
    pub armijo_constant: f64,
    /// Smallest step length tried before the line search gives up
    pub min_step: f64,
}

/// Converged solver output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockSolution {
    pub x: f64,
    pub y: f64,
    /// Final objective value in meters^4
    pub residual: f64,
    pub iterations: usize,
    /// Final gradient norm in normalised units
    pub gradient_norm: f64,
}

impl Default for BlockSolver {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gradient_tolerance: 1e-7,
            objective_tolerance: 1e-20,
            armijo_constant: 1e-4,
            min_step: 1e-12,
        }
    }
}

/// Objective in block-local units, for diagnostics and tests
pub fn objective(side_length: f64, distances: [f64; CORNERS_PER_BLOCK], x: f64, y: f64) -> f64 {
    let point = Vector2::new(x, y);
    Corner::ALL
        .iter()
        .zip(distances.iter())
        .map(|(corner, d)| {
            let r = (point - corner.local_position(side_length)).norm_squared() - d * d;
            r * r
        })
        .sum()
}

/// Objective and gradient on the unit square
struct CornerFit {
    corners: [Vector2<f64>; CORNERS_PER_BLOCK],
    squared_ranges: [f64; CORNERS_PER_BLOCK],
}

impl CornerFit {
    fn normalized(side_length: f64, distances: [f64; CORNERS_PER_BLOCK]) -> Self {
        Self {
            corners: Corner::ALL.map(|corner| corner.local_position(1.0)),
            squared_ranges: distances.map(|d| (d / side_length).powi(2)),
        }
    }

    fn value(&self, p: &Vector2<f64>) -> f64 {
        self.corners
            .iter()
            .zip(self.squared_ranges.iter())
            .map(|(c, d2)| {
                let r = (p - c).norm_squared() - d2;
                r * r
            })
            .sum()
    }

    fn gradient(&self, p: &Vector2<f64>) -> Vector2<f64> {
        self.corners
            .iter()
            .zip(self.squared_ranges.iter())
            .fold(Vector2::zeros(), |acc, (c, d2)| {
                let diff = p - c;
                let r = diff.norm_squared() - d2;
                acc + diff * (4.0 * r)
            })
    }
}

impl BlockSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Solve from the block centre
    pub fn solve(&self, side_length: f64, distances: [f64; CORNERS_PER_BLOCK]) -> Result<BlockSolution> {
        let centre = Vector2::new(side_length / 2.0, side_length / 2.0);
        self.solve_from(side_length, distances, centre)
    }

    /// Solve from an explicit block-local starting point
    pub fn solve_from(
        &self,
        side_length: f64,
        distances: [f64; CORNERS_PER_BLOCK],
        initial_guess: Vector2<f64>,
    ) -> Result<BlockSolution> {
        Self::check_inputs(side_length, &distances, &initial_guess)?;

        let fit = CornerFit::normalized(side_length, distances);
        let scale4 = side_length.powi(4);

        let mut point = initial_guess / side_length;
        let mut value = fit.value(&point);
        let mut gradient = fit.gradient(&point);
        let mut inverse_hessian = Matrix2::<f64>::identity();

        let diverged = |iterations: usize, gradient_norm: f64, value: f64, cause: DivergenceCause| {
            debug!(iterations, gradient_norm, objective = value * scale4, %cause, "block solve diverged");
            PositioningError::SolverDivergence {
                iterations,
                gradient_norm,
                objective: value * scale4,
                cause,
            }
        };

        for iteration in 0..=self.max_iterations {
            if !value.is_finite() {
                return Err(diverged(iteration, f64::NAN, value, DivergenceCause::NonFiniteObjective));
            }

            let gradient_norm = gradient.norm();
            if gradient_norm <= self.gradient_tolerance || value <= self.objective_tolerance {
                let solution = point * side_length;
                return Ok(BlockSolution {
                    x: solution.x,
                    y: solution.y,
                    residual: value * scale4,
                    iterations: iteration,
                    gradient_norm,
                });
            }

            if iteration == self.max_iterations {
                return Err(diverged(iteration, gradient_norm, value, DivergenceCause::IterationBudget));
            }

            let mut direction = -(inverse_hessian * gradient);
            let mut slope = gradient.dot(&direction);
            if slope >= 0.0 {
                // Lost positive definiteness; restart from steepest descent
                inverse_hessian = Matrix2::identity();
                direction = -gradient;
                slope = -gradient_norm * gradient_norm;
            }

            let (next_point, next_value) = match self.line_search(&fit, &point, value, &direction, slope) {
                Some(accepted) => accepted,
                None => {
                    return Err(diverged(iteration, gradient_norm, value, DivergenceCause::LineSearchFailed));
                }
            };

            let next_gradient = fit.gradient(&next_point);
            let s = next_point - point;
            let y = next_gradient - gradient;
            let sy = s.dot(&y);

            // Curvature condition; skip the update otherwise
            if sy > 1e-12 * s.norm() * y.norm() {
                if iteration == 0 {
                    inverse_hessian = Matrix2::identity() * (sy / y.norm_squared());
                }
                let rho = 1.0 / sy;
                let left = Matrix2::identity() - (s * y.transpose()) * rho;
                inverse_hessian = left * inverse_hessian * left.transpose() + (s * s.transpose()) * rho;
            }

            point = next_point;
            value = next_value;
            gradient = next_gradient;
        }

        // The loop always returns on its last pass
        Err(diverged(self.max_iterations, gradient.norm(), value, DivergenceCause::IterationBudget))
    }

    fn line_search(
        &self,
        fit: &CornerFit,
        point: &Vector2<f64>,
        value: f64,
        direction: &Vector2<f64>,
        slope: f64,
    ) -> Option<(Vector2<f64>, f64)> {
        let mut step = 1.0;
        while step >= self.min_step {
            let candidate = point + direction * step;
            let candidate_value = fit.value(&candidate);
            if candidate_value.is_finite() && candidate_value <= value + self.armijo_constant * step * slope {
                return Some((candidate, candidate_value));
            }
            step *= 0.5;
        }
        None
    }

    fn check_inputs(
        side_length: f64,
        distances: &[f64; CORNERS_PER_BLOCK],
        initial_guess: &Vector2<f64>,
    ) -> Result<()> {
        if !side_length.is_finite() || side_length <= 0.0 {
            return Err(PositioningError::InvalidSolverInput {
                reason: format!("side length {} must be positive and finite", side_length),
            });
        }
        if let Some((corner, d)) = Corner::ALL
            .iter()
            .zip(distances.iter())
            .find(|(_, d)| !d.is_finite() || **d < 0.0)
        {
            return Err(PositioningError::InvalidSolverInput {
                reason: format!("distance {} to {:?} corner must be finite and non-negative", d, corner),
            });
        }
        if !initial_guess.x.is_finite() || !initial_guess.y.is_finite() {
            return Err(PositioningError::InvalidSolverInput {
                reason: "initial guess must be finite".to_string(),
            });
        }
        Ok(())
    }
}
